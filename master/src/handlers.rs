use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use common::{
    FailureInfo, FinishInfo, FinishKind, SchedulerError, SchedulerSnapshot, Task, TaskAccepted,
    TaskAssignmentRequest, TaskAssignmentResponse, TaskCompleteRequest, TaskCompleteResponse,
    TaskRequest, TaskStatus, WorkerHeartbeatRequest, WorkerHeartbeatResponse, WorkerMetrics,
    WorkerRegisterRequest, WorkerRegisterResponse,
};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::monitor::reconcile_workers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/tasks", post(create_task))
        .route("/api/v1/tasks/status", get(task_status))
        .route("/api/v1/tasks/failed", post(fail_task))
        .route("/api/v1/tasks/next", post(next_task))
        .route("/api/v1/tasks/complete", post(complete_task))
        .route("/api/v1/scheduler/state", get(scheduler_state))
        .route("/api/v1/workers", get(list_workers))
        .route("/api/v1/workers/register", post(register_worker))
        .route("/api/v1/workers/heartbeat", post(worker_heartbeat))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn error_status(err: &SchedulerError) -> StatusCode {
    match err {
        SchedulerError::UnknownTaskKind(_) => StatusCode::BAD_REQUEST,
        SchedulerError::DuplicateTask(_) => StatusCode::CONFLICT,
        SchedulerError::InvariantViolation(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/* ---------------- handlers HTTP ---------------- */

async fn health() -> &'static str {
    "ok"
}

// Encola una tarea y despacha todo lo que se pueda
async fn create_task(
    State(state): State<AppState>,
    Json(req): Json<TaskRequest>,
) -> Result<Json<TaskAccepted>, (StatusCode, String)> {
    let task = Task::try_from(req).map_err(|e| {
        warn!("tarea rechazada: {}", e);
        (error_status(&e), e.to_string())
    })?;
    let name = task.name.clone();

    let mut scheduler = state.scheduler();
    scheduler.create_task(task).map_err(|e| {
        warn!("tarea rechazada: {}", e);
        (error_status(&e), e.to_string())
    })?;
    scheduler.schedule();

    Ok(Json(TaskAccepted {
        name,
        status: scheduler.task_status(),
    }))
}

async fn task_status(State(state): State<AppState>) -> Json<TaskStatus> {
    Json(state.scheduler().task_status())
}

// Falla explícita de una tarea (asignada o no)
async fn fail_task(
    State(state): State<AppState>,
    Json(info): Json<FailureInfo>,
) -> Json<TaskStatus> {
    info!(
        "tarea {} marcada como fallida (worker={:?})",
        info.task_name, info.worker_id
    );
    // primero el cluster: la tarea no se entrega ni se acepta su resultado
    state
        .cluster
        .fail_task(&info.task_name, info.worker_id.as_deref());

    let mut scheduler = state.scheduler();
    scheduler.dispatch_failed(info);
    Json(scheduler.task_status())
}

// El worker pasa a buscar la tarea que le despachó el scheduler
async fn next_task(
    State(state): State<AppState>,
    Json(req): Json<TaskAssignmentRequest>,
) -> Json<TaskAssignmentResponse> {
    let task = state.cluster.take_task(&req.worker_id);
    if let Some(ref t) = task {
        info!(
            "worker {} retira la tarea {} ({}, source={:?})",
            req.worker_id, t.name, t.kind, t.source
        );
    }
    Json(TaskAssignmentResponse { task })
}

// Worker reporta que terminó una tarea (bien o mal)
async fn complete_task(
    State(state): State<AppState>,
    Json(req): Json<TaskCompleteRequest>,
) -> Result<Json<TaskCompleteResponse>, StatusCode> {
    // primero el cluster (métricas + caché), después el scheduler
    let task = state
        .cluster
        .complete_task(&req.worker_id, &req.task_name, req.success)
        .ok_or(StatusCode::NOT_FOUND)?;

    let mut scheduler = state.scheduler();
    if req.success {
        info!("worker {} terminó la tarea {}", req.worker_id, task.name);
        scheduler.dispatch_finish(FinishInfo {
            kind: FinishKind::Task,
            worker_id: req.worker_id,
            task,
        });
    } else {
        warn!("worker {} falló la tarea {}", req.worker_id, task.name);
        scheduler.dispatch_failed(FailureInfo {
            worker_id: Some(req.worker_id),
            task_name: task.name,
        });
    }

    Ok(Json(TaskCompleteResponse { ok: true }))
}

async fn scheduler_state(State(state): State<AppState>) -> Json<SchedulerSnapshot> {
    Json(state.scheduler().current_state())
}

async fn list_workers(State(state): State<AppState>) -> Json<Vec<WorkerMetrics>> {
    Json(state.cluster.metrics())
}

// Registra un worker nuevo y lo pone a disposición del scheduler
async fn register_worker(
    State(state): State<AppState>,
    Json(req): Json<WorkerRegisterRequest>,
) -> Json<WorkerRegisterResponse> {
    let worker_id = uuid::Uuid::new_v4().to_string();

    state.cluster.register(worker_id.clone(), req);
    reconcile_workers(&state);

    Json(WorkerRegisterResponse { worker_id })
}

async fn worker_heartbeat(
    State(state): State<AppState>,
    Json(req): Json<WorkerHeartbeatRequest>,
) -> Result<Json<WorkerHeartbeatResponse>, StatusCode> {
    if state
        .cluster
        .heartbeat(&req.worker_id, req.cpu_percent, req.mem_bytes)
    {
        Ok(Json(WorkerHeartbeatResponse { ok: true }))
    } else {
        Err(StatusCode::NOT_FOUND)
    }
}
