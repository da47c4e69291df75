use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

use crate::scheduler::SchedulerEvent;
use crate::state::AppState;

/// Loop de tolerancia a fallos:
/// - marca workers muertos (sin heartbeat)
/// - sincroniza el scheduler con el registro y vuelve a despachar
/// - borra los muertos que pasaron `dead_retention`
pub async fn monitor_workers(
    state: AppState,
    heartbeat_timeout: Duration,
    dead_retention: Duration,
    interval: Duration,
) {
    loop {
        tokio::time::sleep(interval).await;

        // ya estaban fuera del scheduler, no hace falta reconciliar
        state.cluster.prune_dead_workers(dead_retention);

        let dead = state.cluster.mark_dead_workers(heartbeat_timeout);
        if dead.is_empty() {
            continue;
        }

        reconcile_workers(&state);
    }
}

/// Actualiza los pools del scheduler contra el registro y despacha lo que
/// se pueda. Las tareas de workers desaparecidos se dan por fallidas.
/// Devuelve cuántas asignaciones nuevas hubo.
pub fn reconcile_workers(state: &AppState) -> usize {
    let mut scheduler = state.scheduler();

    for lost in scheduler.update_workers() {
        warn!(
            "tarea {} ({}) perdida junto con el worker {}",
            lost.task.name, lost.task.kind, lost.worker_id
        );
    }

    scheduler.schedule()
}

/// Loga el estado del scheduler cada `interval`.
pub async fn log_status_loop(state: AppState, interval: Duration) {
    loop {
        tokio::time::sleep(interval).await;

        let scheduler = state.scheduler();
        scheduler.log_status();
        debug!("ejecuciones activas: {:?}", scheduler.execution_names());
    }
}

/// Suscriptor de cambios de estado del scheduler.
pub async fn watch_state_changes(mut events: UnboundedReceiver<SchedulerEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            SchedulerEvent::StateChanged(snapshot) => {
                debug!("estado del scheduler: {:?}", snapshot.workers);
            }
        }
    }
    info!("canal de estado del scheduler cerrado");
}
