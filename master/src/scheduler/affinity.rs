use common::{Task, TaskSource, TaskType};
use tracing::debug;

use super::Master;

/// Si la tarea es PRODUCING y su sesión usa recursos, intenta que el worker
/// asignado baje los datos de otro worker que ya los tenga en caché.
/// Sin acierto, `source` queda vacío y se usa el almacenamiento externo.
///
/// Sólo redirige el origen de datos: no influye en qué worker corre la tarea.
pub fn resolve_source<M: Master + ?Sized>(master: &M, task: &mut Task) {
    if task.kind != TaskType::Producing || !task.session.resources {
        return;
    }

    match master.next_cached_worker(&task.session.name) {
        Some(worker) => {
            debug!(
                "tarea {}: recursos de la sesión {} en caché en {}:{}",
                task.name, task.session.name, worker.host, worker.resource_port
            );
            task.source = Some(TaskSource::from(&worker));
        }
        None => {
            debug!(
                "tarea {}: sin caché para la sesión {}, se usará almacenamiento externo",
                task.name, task.session.name
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{Session, WorkerDescriptor, WorkerId};
    use std::{cell::Cell, collections::HashMap};

    struct Oracle {
        hit: Option<WorkerDescriptor>,
        lookups: Cell<usize>,
    }

    impl Master for Oracle {
        fn run_task(&self, _worker_id: &str, _task: &Task) {}

        fn workers(&self) -> HashMap<WorkerId, WorkerDescriptor> {
            HashMap::new()
        }

        fn next_cached_worker(&self, _session_name: &str) -> Option<WorkerDescriptor> {
            self.lookups.set(self.lookups.get() + 1);
            self.hit.clone()
        }
    }

    fn cached() -> WorkerDescriptor {
        WorkerDescriptor {
            host: "cache-host".to_string(),
            port: 7000,
            resource_port: 7001,
        }
    }

    fn task(kind: TaskType, resources: bool) -> Task {
        Task::new(
            "t",
            kind,
            Session {
                name: "sess".to_string(),
                resources,
            },
        )
    }

    #[test]
    fn producing_task_with_hit_gets_cached_source() {
        let oracle = Oracle { hit: Some(cached()), lookups: Cell::new(0) };
        let mut t = task(TaskType::Producing, true);

        resolve_source(&oracle, &mut t);

        assert_eq!(
            t.source,
            Some(TaskSource {
                host: "cache-host".to_string(),
                port: 7000,
                resource_port: 7001,
            })
        );
    }

    #[test]
    fn producing_task_with_miss_keeps_source_unset() {
        let oracle = Oracle { hit: None, lookups: Cell::new(0) };
        let mut t = task(TaskType::Producing, true);

        resolve_source(&oracle, &mut t);

        assert!(t.source.is_none());
        assert_eq!(oracle.lookups.get(), 1);
    }

    #[test]
    fn reducing_task_is_never_resolved() {
        let oracle = Oracle { hit: Some(cached()), lookups: Cell::new(0) };
        let mut t = task(TaskType::Reducing, true);

        resolve_source(&oracle, &mut t);

        assert!(t.source.is_none());
        assert_eq!(oracle.lookups.get(), 0);
    }

    #[test]
    fn session_without_resources_skips_lookup() {
        let oracle = Oracle { hit: Some(cached()), lookups: Cell::new(0) };
        let mut t = task(TaskType::Producing, false);

        resolve_source(&oracle, &mut t);

        assert!(t.source.is_none());
        assert_eq!(oracle.lookups.get(), 0);
    }
}
