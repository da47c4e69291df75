pub mod error;
pub mod task;
pub mod worker;

pub use error::SchedulerError;
pub use task::{
    FailureInfo, FinishInfo, FinishKind, Session, Task, TaskAccepted, TaskName, TaskRequest,
    TaskSource, TaskStatus, TaskType,
};
pub use worker::{
    SchedulerSnapshot, TaskAssignmentRequest, TaskAssignmentResponse, TaskCompleteRequest,
    TaskCompleteResponse, WorkerDescriptor, WorkerHeartbeatRequest, WorkerHeartbeatResponse,
    WorkerId, WorkerMetrics, WorkerRegisterRequest, WorkerRegisterResponse, WorkerStatus,
};
