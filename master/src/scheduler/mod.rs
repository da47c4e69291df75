//! Núcleo de despacho: cola de tareas, pool de workers y afinidad de recursos.
//!
//! El scheduler no es thread-safe por sí mismo: el dueño (ver `AppState`)
//! garantiza que nunca se llamen dos entry points a la vez.

pub mod affinity;
pub mod pool;
pub mod queue;

use std::collections::HashMap;

use common::{SchedulerSnapshot, Task, WorkerDescriptor, WorkerId};
use tracing::info;

pub use queue::{InFlight, QueueScheduler};

/// Lo que el scheduler necesita del master.
pub trait Master {
    /// Despacha la tarea al worker. No espera resultado: el fin llega
    /// después como `dispatch_finish` / `dispatch_failed`.
    fn run_task(&self, worker_id: &str, task: &Task);

    /// Registro vigente de workers vivos.
    fn workers(&self) -> HashMap<WorkerId, WorkerDescriptor>;

    /// Algún worker que ya tenga en caché los recursos de la sesión.
    fn next_cached_worker(&self, session_name: &str) -> Option<WorkerDescriptor>;

    fn log(&self, component: &str, message: &str) {
        info!(component, "{}", message);
    }
}

/// Mensajes que el scheduler emite hacia su (único) suscriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerEvent {
    /// `schedule()` no pudo avanzar más: cola vacía o sin workers libres
    StateChanged(SchedulerSnapshot),
}
