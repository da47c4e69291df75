use thiserror::Error;

use crate::task::TaskName;

/// Errores de contrato del scheduler.
/// Los fallos de tareas no pasan por acá: se reportan con `FailureInfo`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    #[error("tipo de tarea desconocido: {0}")]
    UnknownTaskKind(String),

    #[error("ya existe una tarea en cola o en vuelo con nombre {0}")]
    DuplicateTask(TaskName),

    #[error("invariante del scheduler roto: {0}")]
    InvariantViolation(String),
}
