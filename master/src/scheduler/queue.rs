use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use common::{
    FailureInfo, FinishInfo, FinishKind, SchedulerError, SchedulerSnapshot, Task, TaskName,
    TaskStatus, TaskType, WorkerId,
};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use super::affinity::resolve_source;
use super::pool::WorkerPool;
use super::{Master, SchedulerEvent};

const COMPONENT: &str = "QueueScheduler";

/// Tarea ya asignada, junto con el worker que la está corriendo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InFlight {
    pub task: Task,
    pub worker_id: WorkerId,
}

/// Scheduler FIFO con una sola clase de prioridad: las REDUCING van antes
/// que las PRODUCING.
///
/// Estado:
/// - `queued_tasks`: tareas sin asignar
/// - `waiting_tasks`: tareas asignadas, por nombre
/// - `pool`: workers libres / ocupados
pub struct QueueScheduler<M> {
    master: M,
    queued_tasks: VecDeque<Task>,
    waiting_tasks: HashMap<TaskName, InFlight>,
    pool: WorkerPool,
    // un único suscriptor: registrar otro reemplaza al anterior
    subscriber: Option<UnboundedSender<SchedulerEvent>>,
}

impl<M: Master> QueueScheduler<M> {
    pub fn new(master: M) -> Self {
        Self {
            master,
            queued_tasks: VecDeque::new(),
            waiting_tasks: HashMap::new(),
            pool: WorkerPool::new(),
            subscriber: None,
        }
    }

    pub fn master(&self) -> &M {
        &self.master
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub fn queued_tasks(&self) -> impl Iterator<Item = &Task> {
        self.queued_tasks.iter()
    }

    pub fn waiting_tasks(&self) -> &HashMap<TaskName, InFlight> {
        &self.waiting_tasks
    }

    /// Encola una tarea nueva.
    /// PRODUCING va al final; REDUCING va detrás de las REDUCING ya encoladas,
    /// o sea antes de cualquier PRODUCING.
    pub fn create_task(&mut self, task: Task) -> Result<(), SchedulerError> {
        if self.waiting_tasks.contains_key(&task.name)
            || self.queued_tasks.iter().any(|t| t.name == task.name)
        {
            return Err(SchedulerError::DuplicateTask(task.name));
        }

        debug!("encolando tarea {} ({})", task.name, task.kind);

        match task.kind {
            TaskType::Producing => self.queued_tasks.push_back(task),
            TaskType::Reducing => {
                let pos = self
                    .queued_tasks
                    .iter()
                    .position(|t| t.kind != TaskType::Reducing)
                    .unwrap_or(self.queued_tasks.len());
                self.queued_tasks.insert(pos, task);
            }
        }

        debug_assert_eq!(self.check_invariants(), Ok(()));
        Ok(())
    }

    /// Empareja tareas en cola con workers libres hasta agotar una de las
    /// dos listas. Al terminar avisa al suscriptor.
    /// Devuelve cuántas asignaciones hizo en esta pasada.
    pub fn schedule(&mut self) -> usize {
        let mut assigned = 0;

        while !self.queued_tasks.is_empty() && self.pool.unused_len() > 0 {
            let Some(mut task) = self.queued_tasks.pop_front() else {
                break;
            };
            let Some(worker_id) = self.pool.acquire(task.kind) else {
                self.queued_tasks.push_front(task);
                break;
            };

            resolve_source(&self.master, &mut task);

            info!(
                "asignando tarea {} ({}) al worker {}",
                task.name, task.kind, worker_id
            );

            let name = task.name.clone();
            let entry = self
                .waiting_tasks
                .entry(name)
                .or_insert(InFlight { task, worker_id });
            self.master.run_task(&entry.worker_id, &entry.task);

            assigned += 1;
        }

        self.notify_state_change();
        debug_assert_eq!(self.check_invariants(), Ok(()));
        assigned
    }

    /// Sincroniza el pool con `master.workers()`.
    ///
    /// Si un worker ocupado desapareció, su tarea sale de `waiting_tasks`
    /// y se devuelve como perdida (se da por fallida, no se reencola).
    pub fn update_workers(&mut self) -> Vec<InFlight> {
        let registry: HashSet<WorkerId> = self.master.workers().into_keys().collect();
        let vanished = self.pool.reconcile(&registry);

        let mut orphaned: Vec<TaskName> = self
            .waiting_tasks
            .iter()
            .filter(|(_, inflight)| vanished.contains(&inflight.worker_id))
            .map(|(name, _)| name.clone())
            .collect();
        orphaned.sort();

        let mut lost = Vec::with_capacity(orphaned.len());
        for name in orphaned {
            if let Some(inflight) = self.waiting_tasks.remove(&name) {
                warn!(
                    "worker {} ya no está registrado; tarea {} se da por fallida",
                    inflight.worker_id, name
                );
                lost.push(inflight);
            }
        }

        debug_assert_eq!(self.check_invariants(), Ok(()));
        lost
    }

    /// Una tarea terminó bien: libera su worker y vuelve a despachar.
    pub fn dispatch_finish(&mut self, info: FinishInfo) {
        if info.kind != FinishKind::Task {
            debug!("fin de tipo {:?} ignorado por el scheduler", info.kind);
            return;
        }

        self.release(&info.task.name, Some(&info.worker_id));
        self.schedule();
    }

    /// Una tarea falló, asignada o no. Nunca se reintenta.
    pub fn dispatch_failed(&mut self, info: FailureInfo) {
        self.release(&info.task_name, info.worker_id.as_deref());
        self.schedule();
    }

    /// Saca la tarea de `waiting_tasks` y devuelve al pool el worker que la
    /// tenía. Tolera nombres desconocidos (eventos duplicados o viejos).
    fn release(&mut self, task_name: &str, reported_worker: Option<&str>) -> Option<InFlight> {
        let Some(inflight) = self.waiting_tasks.remove(task_name) else {
            debug!("tarea {} no está en vuelo; evento ignorado", task_name);
            return None;
        };

        if let Some(reported) = reported_worker {
            if reported != inflight.worker_id {
                warn!(
                    "tarea {} reportada por {} pero estaba asignada a {}",
                    task_name, reported, inflight.worker_id
                );
            }
        }

        if !self.pool.release(&inflight.worker_id) {
            debug!(
                "worker {} ya no estaba ocupado al liberar la tarea {}",
                inflight.worker_id, task_name
            );
        }

        Some(inflight)
    }

    /// Registra el suscriptor de cambios de estado (reemplaza al anterior).
    pub fn on_state_change(&mut self, subscriber: UnboundedSender<SchedulerEvent>) {
        self.subscriber = Some(subscriber);
    }

    fn notify_state_change(&mut self) {
        let Some(subscriber) = &self.subscriber else {
            return;
        };
        if subscriber
            .send(SchedulerEvent::StateChanged(self.current_state()))
            .is_err()
        {
            debug!("suscriptor de estado cerrado, se descarta");
            self.subscriber = None;
        }
    }

    /// Estados de los workers ordenados por nombre de worker.
    pub fn current_state(&self) -> SchedulerSnapshot {
        SchedulerSnapshot {
            workers: self.pool.statuses().into_values().collect(),
        }
    }

    pub fn task_status(&self) -> TaskStatus {
        TaskStatus {
            waiting: self.queued_tasks.len(),
            running: self.waiting_tasks.len(),
        }
    }

    pub fn log_status(&self) -> String {
        let line = format!(
            "{} tasks waiting, {} tasks running, {} / {} workers free",
            self.queued_tasks.len(),
            self.waiting_tasks.len(),
            self.pool.unused_len(),
            self.pool.total(),
        );
        self.master.log(COMPONENT, &line);
        line
    }

    /// Nombres de ejecución presentes en la cola o en vuelo (para debug).
    pub fn execution_names(&self) -> BTreeSet<String> {
        self.waiting_tasks
            .values()
            .map(|inflight| &inflight.task)
            .chain(self.queued_tasks.iter())
            .filter_map(|task| task.execution.clone())
            .collect()
    }

    pub fn check_invariants(&self) -> Result<(), SchedulerError> {
        self.pool.check().map_err(SchedulerError::InvariantViolation)?;

        if self.waiting_tasks.len() != self.pool.used_len() {
            return Err(SchedulerError::InvariantViolation(format!(
                "{} tareas en vuelo pero {} workers ocupados",
                self.waiting_tasks.len(),
                self.pool.used_len()
            )));
        }

        for (name, inflight) in &self.waiting_tasks {
            match self.pool.used().get(&inflight.worker_id) {
                Some(kind) if *kind == inflight.task.kind => {}
                _ => {
                    return Err(SchedulerError::InvariantViolation(format!(
                        "tarea {} en vuelo sin worker ocupado {}",
                        name, inflight.worker_id
                    )))
                }
            }
        }

        if let Some(task) = self
            .queued_tasks
            .iter()
            .find(|t| self.waiting_tasks.contains_key(&t.name))
        {
            return Err(SchedulerError::InvariantViolation(format!(
                "tarea {} en cola y en vuelo a la vez",
                task.name
            )));
        }

        Ok(())
    }
}
