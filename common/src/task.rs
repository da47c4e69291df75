use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::error::SchedulerError;
use crate::worker::{WorkerDescriptor, WorkerId};

pub type TaskName = String;

/// Tipo de tarea. Sólo existen estas dos variantes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskType {
    /// Genera datos intermedios (opcionalmente a partir de recursos de sesión)
    Producing,
    /// Agrega datos ya producidos; se despacha antes que las PRODUCING
    Reducing,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Producing => "PRODUCING",
            TaskType::Reducing => "REDUCING",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PRODUCING" => Ok(TaskType::Producing),
            "REDUCING" => Ok(TaskType::Reducing),
            other => Err(SchedulerError::UnknownTaskKind(other.to_string())),
        }
    }
}

/// Sesión lógica a la que pertenece la tarea.
/// `name` se usa como clave para buscar workers con los recursos en caché.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub name: String,
    #[serde(default)]
    pub resources: bool,
}

/// Endpoint desde donde el worker asignado debe bajar los datos.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSource {
    pub host: String,
    pub port: u16,
    pub resource_port: u16,
}

impl From<&WorkerDescriptor> for TaskSource {
    fn from(worker: &WorkerDescriptor) -> Self {
        TaskSource {
            host: worker.host.clone(),
            port: worker.port,
            resource_port: worker.resource_port,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub name: TaskName,
    #[serde(rename = "type")]
    pub kind: TaskType,
    pub session: Session,

    /// Nombre de la ejecución que generó la tarea (sólo para debug)
    #[serde(default)]
    pub execution: Option<String>,

    /// Sólo se llena si hay un worker con los recursos de la sesión en caché
    #[serde(default)]
    pub source: Option<TaskSource>,
}

impl Task {
    pub fn new(name: impl Into<TaskName>, kind: TaskType, session: Session) -> Self {
        Task {
            name: name.into(),
            kind,
            session,
            execution: None,
            source: None,
        }
    }
}

/// Forma "cruda" de una tarea tal como llega por HTTP.
/// El tipo viene como string libre y se valida al convertir a `Task`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRequest {
    pub name: TaskName,
    #[serde(rename = "type")]
    pub kind: String,
    pub session: Session,
    #[serde(default)]
    pub execution: Option<String>,
}

impl TryFrom<TaskRequest> for Task {
    type Error = SchedulerError;

    fn try_from(req: TaskRequest) -> Result<Self, Self::Error> {
        let kind = req.kind.parse::<TaskType>()?;
        Ok(Task {
            name: req.name,
            kind,
            session: req.session,
            execution: req.execution,
            source: None,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskAccepted {
    pub name: TaskName,
    pub status: TaskStatus,
}

/// Conteos expuestos hacia afuera: `waiting` = en cola, `running` = asignadas.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub waiting: usize,
    pub running: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinishKind {
    Task,
    Session,
}

/// Evento de fin de ejecución reportado por el master.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinishInfo {
    #[serde(rename = "type")]
    pub kind: FinishKind,
    pub worker_id: WorkerId,
    pub task: Task,
}

/// Evento de fallo. `worker_id` es None si la tarea falló antes de asignarse.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureInfo {
    #[serde(default)]
    pub worker_id: Option<WorkerId>,
    pub task_name: TaskName,
}
