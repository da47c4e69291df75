// master/src/cluster.rs

use chrono::{DateTime, Utc};
use common::{
    Task, TaskName, TaskType, WorkerDescriptor, WorkerId, WorkerMetrics, WorkerRegisterRequest,
};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::{Duration, SystemTime},
};
use tracing::{info, warn};

use crate::scheduler::Master;

#[derive(Debug, Clone)]
pub struct WorkerMeta {
    pub hostname: String,
    pub descriptor: WorkerDescriptor,
    pub registered_at: DateTime<Utc>,
    pub last_heartbeat: SystemTime,
    pub dead: bool,

    // tarea despachada y cuándo se despachó
    pub current_task: Option<(Task, SystemTime)>,
    // despachada pero el worker todavía no la pasó a buscar
    pub pending: Option<Task>,

    // Métricas
    pub tasks_started: u64,
    pub tasks_succeeded: u64,
    pub tasks_failed: u64,
    pub total_task_time_ms: u64,

    pub last_cpu_percent: Option<f32>,
    pub last_mem_bytes: Option<u64>,
}

#[derive(Debug, Default)]
struct Registry {
    workers: HashMap<WorkerId, WorkerMeta>,
    // sesión -> workers que tienen sus recursos en caché
    cache: HashMap<String, Vec<WorkerId>>,
    rr_cursor: HashMap<String, usize>,
}

/// Registro de workers del master. Es lo que el scheduler ve como `Master`.
/// Clonar comparte el mismo registro.
#[derive(Clone, Default)]
pub struct Cluster {
    inner: Arc<Mutex<Registry>>,
}

impl Cluster {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register(&self, worker_id: WorkerId, req: WorkerRegisterRequest) {
        let mut reg = self.lock();
        info!(
            "worker registrado: {} ({} en {}:{}, recursos en {})",
            worker_id, req.hostname, req.host, req.port, req.resource_port
        );
        reg.workers.insert(
            worker_id,
            WorkerMeta {
                hostname: req.hostname,
                descriptor: WorkerDescriptor {
                    host: req.host,
                    port: req.port,
                    resource_port: req.resource_port,
                },
                registered_at: Utc::now(),
                last_heartbeat: SystemTime::now(),
                dead: false,
                current_task: None,
                pending: None,
                tasks_started: 0,
                tasks_succeeded: 0,
                tasks_failed: 0,
                total_task_time_ms: 0,
                last_cpu_percent: None,
                last_mem_bytes: None,
            },
        );
    }

    /// Devuelve false si el worker no existe o ya fue dado por muerto.
    pub fn heartbeat(&self, worker_id: &str, cpu_percent: Option<f32>, mem_bytes: Option<u64>) -> bool {
        let mut reg = self.lock();
        match reg.workers.get_mut(worker_id) {
            Some(meta) if !meta.dead => {
                meta.last_heartbeat = SystemTime::now();
                if cpu_percent.is_some() {
                    meta.last_cpu_percent = cpu_percent;
                }
                if mem_bytes.is_some() {
                    meta.last_mem_bytes = mem_bytes;
                }
                true
            }
            _ => false,
        }
    }

    /// El worker pasa a buscar su próxima tarea. None si no hay nada o si el
    /// worker no está vivo.
    pub fn take_task(&self, worker_id: &str) -> Option<Task> {
        let mut reg = self.lock();
        match reg.workers.get_mut(worker_id) {
            Some(meta) if !meta.dead => {
                meta.last_heartbeat = SystemTime::now();
                meta.pending.take()
            }
            _ => None,
        }
    }

    /// Cierra la tarea actual del worker, actualiza métricas y devuelve la
    /// tarea completa si coincide con `task_name`.
    pub fn complete_task(&self, worker_id: &str, task_name: &str, success: bool) -> Option<Task> {
        let mut reg = self.lock();
        let meta = reg.workers.get_mut(worker_id)?;

        let matches = matches!(&meta.current_task, Some((t, _)) if t.name == task_name);
        if !matches {
            warn!(
                "worker {} reportó la tarea {} pero no es su tarea actual",
                worker_id, task_name
            );
            return None;
        }
        let (task, started_at) = meta.current_task.take()?;
        meta.pending = None;

        let duration_ms: u64 = started_at
            .elapsed()
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        meta.total_task_time_ms += duration_ms;
        if success {
            meta.tasks_succeeded += 1;
        } else {
            meta.tasks_failed += 1;
        }

        // un PRODUCING con recursos que terminó bien deja la sesión en caché
        if success && task.kind == TaskType::Producing && task.session.resources {
            let holders = reg.cache.entry(task.session.name.clone()).or_default();
            if !holders.iter().any(|w| w == worker_id) {
                holders.push(worker_id.to_string());
            }
        }

        Some(task)
    }

    /// Falla explícita: saca la tarea del worker que la tiene (pendiente o en
    /// curso) para que no se entregue ni se acepte su resultado.
    /// Devuelve el worker que la tenía, si había alguno.
    pub fn fail_task(&self, task_name: &str, worker_id: Option<&str>) -> Option<WorkerId> {
        let mut reg = self.lock();

        let holder = reg
            .workers
            .iter()
            .find(|(wid, meta)| {
                worker_id.map_or(true, |w| w == wid.as_str())
                    && matches!(&meta.current_task, Some((t, _)) if t.name == task_name)
            })
            .map(|(wid, _)| wid.clone())?;

        let meta = reg.workers.get_mut(&holder)?;
        if let Some((_, started_at)) = meta.current_task.take() {
            meta.total_task_time_ms += started_at
                .elapsed()
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0);
        }
        if matches!(&meta.pending, Some(t) if t.name == task_name) {
            meta.pending = None;
        }
        meta.tasks_failed += 1;

        warn!("tarea {} retirada del worker {} por falla", task_name, holder);
        Some(holder)
    }

    /// Marca como muertos los workers sin heartbeat hace más de `timeout`.
    /// Devuelve los ids recién marcados.
    pub fn mark_dead_workers(&self, timeout: Duration) -> Vec<WorkerId> {
        let now = SystemTime::now();
        let mut reg = self.lock();

        let mut newly_dead = Vec::new();
        for (worker_id, meta) in reg.workers.iter_mut() {
            if meta.dead {
                continue;
            }
            if let Ok(elapsed) = now.duration_since(meta.last_heartbeat) {
                if elapsed > timeout {
                    meta.dead = true;
                    warn!(
                        "marcando worker {} como DEAD (sin heartbeat hace {:?})",
                        worker_id, elapsed
                    );
                    newly_dead.push(worker_id.clone());
                }
            }
        }

        for worker_id in &newly_dead {
            if let Some(meta) = reg.workers.get_mut(worker_id) {
                meta.pending = None;
            }
            for holders in reg.cache.values_mut() {
                holders.retain(|w| w != worker_id);
            }
        }
        reg.cache.retain(|_, holders| !holders.is_empty());

        newly_dead
    }

    /// Borra del registro los workers muertos cuyo último heartbeat es más
    /// viejo que `retention`. Hasta entonces siguen visibles en las métricas.
    pub fn prune_dead_workers(&self, retention: Duration) -> Vec<WorkerId> {
        let now = SystemTime::now();
        let mut reg = self.lock();

        let mut pruned: Vec<WorkerId> = reg
            .workers
            .iter()
            .filter(|(_, meta)| {
                meta.dead
                    && now
                        .duration_since(meta.last_heartbeat)
                        .map_or(false, |elapsed| elapsed > retention)
            })
            .map(|(worker_id, _)| worker_id.clone())
            .collect();
        pruned.sort();

        for worker_id in &pruned {
            reg.workers.remove(worker_id);
            info!("worker {} eliminado del registro", worker_id);
        }
        pruned
    }

    pub fn metrics(&self) -> Vec<WorkerMetrics> {
        let now = SystemTime::now();
        let reg = self.lock();

        let mut out: Vec<WorkerMetrics> = reg
            .workers
            .iter()
            .map(|(wid, meta)| {
                let avg_ms = if meta.tasks_succeeded > 0 {
                    Some(meta.total_task_time_ms as f64 / meta.tasks_succeeded as f64)
                } else {
                    None
                };

                WorkerMetrics {
                    worker_id: wid.clone(),
                    hostname: meta.hostname.clone(),
                    host: meta.descriptor.host.clone(),
                    port: meta.descriptor.port,
                    resource_port: meta.descriptor.resource_port,
                    dead: meta.dead,
                    registered_at: meta.registered_at,
                    last_heartbeat_secs_ago: now
                        .duration_since(meta.last_heartbeat)
                        .unwrap_or_default()
                        .as_secs(),
                    current_task: meta
                        .current_task
                        .as_ref()
                        .map(|(t, _)| t.name.clone()),
                    tasks_started: meta.tasks_started,
                    tasks_succeeded: meta.tasks_succeeded,
                    tasks_failed: meta.tasks_failed,
                    avg_task_ms: avg_ms,
                    last_cpu_percent: meta.last_cpu_percent,
                    last_mem_bytes: meta.last_mem_bytes,
                }
            })
            .collect();

        out.sort_by(|a, b| a.worker_id.cmp(&b.worker_id));
        out
    }

    pub fn cached_holders(&self, session_name: &str) -> Vec<WorkerId> {
        self.lock()
            .cache
            .get(session_name)
            .cloned()
            .unwrap_or_default()
    }

    pub fn current_task_name(&self, worker_id: &str) -> Option<TaskName> {
        self.lock()
            .workers
            .get(worker_id)
            .and_then(|m| m.current_task.as_ref().map(|(t, _)| t.name.clone()))
    }
}

impl Master for Cluster {
    fn run_task(&self, worker_id: &str, task: &Task) {
        let mut reg = self.lock();

        match reg.workers.get_mut(worker_id) {
            Some(meta) if !meta.dead => {
                meta.current_task = Some((task.clone(), SystemTime::now()));
                meta.pending = Some(task.clone());
                meta.tasks_started += 1;
            }
            _ => {
                // el próximo update_workers lo va a dar por perdido
                warn!(
                    "no se pudo despachar la tarea {}: worker {} no disponible",
                    task.name, worker_id
                );
            }
        }
    }

    fn workers(&self) -> HashMap<WorkerId, WorkerDescriptor> {
        self.lock()
            .workers
            .iter()
            .filter(|(_, meta)| !meta.dead)
            .map(|(id, meta)| (id.clone(), meta.descriptor.clone()))
            .collect()
    }

    fn next_cached_worker(&self, session_name: &str) -> Option<WorkerDescriptor> {
        let mut reg = self.lock();
        let Registry {
            workers,
            cache,
            rr_cursor,
            ..
        } = &mut *reg;

        let holders: Vec<&WorkerId> = cache
            .get(session_name)?
            .iter()
            .filter(|w| workers.get(*w).is_some_and(|m| !m.dead))
            .collect();
        if holders.is_empty() {
            return None;
        }

        let cursor = rr_cursor.entry(session_name.to_string()).or_insert(0);
        let chosen = holders[*cursor % holders.len()];
        *cursor = cursor.wrapping_add(1);

        workers.get(chosen).map(|m| m.descriptor.clone())
    }
}
