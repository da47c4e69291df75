use anyhow::{Context, Result};
use common::{
    Task, TaskAssignmentRequest, TaskAssignmentResponse, TaskCompleteRequest, TaskType,
    WorkerHeartbeatRequest, WorkerId, WorkerRegisterRequest, WorkerRegisterResponse,
};
use reqwest::{Client, StatusCode};
use std::{future::Future, sync::Arc, time::Duration};
use sysinfo::{CpuExt, System, SystemExt};
use tokio::{
    sync::watch,
    time::{interval, sleep, MissedTickBehavior},
};
use tracing::{info, warn};

use crate::config::WorkerConfig;

/// De dónde saca los datos una tarea.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSource {
    /// otro worker ya tiene los recursos de la sesión (host:resource_port)
    CachedWorker(String),
    /// no hay caché: se bajan del almacenamiento externo
    ExternalStorage,
    /// la tarea no usa recursos de sesión
    NoResources,
}

pub fn data_source(task: &Task) -> DataSource {
    match (&task.source, task.kind, task.session.resources) {
        (Some(src), _, _) => DataSource::CachedWorker(format!("{}:{}", src.host, src.resource_port)),
        (None, TaskType::Producing, true) => DataSource::ExternalStorage,
        _ => DataSource::NoResources,
    }
}

/// Loop principal del worker.
/// - Se registra en el master.
/// - Lanza los heartbeats periódicos (con CPU / memoria) en su propia tarea,
///   así siguen saliendo mientras se ejecuta una tarea larga.
/// - Pide la tarea que el scheduler le despachó, la ejecuta y reporta.
/// Si el master no lo reconoce (404 en heartbeat), se vuelve a registrar.
pub async fn run(config: WorkerConfig) -> Result<()> {
    let client = Client::new();

    let hostname = hostname::get()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string();

    let worker_id = register(&client, &config, &hostname).await?;
    // el id puede cambiar si el master nos olvida y hay que re-registrarse
    let (id_tx, id_rx) = watch::channel(worker_id);
    let id_tx = Arc::new(id_tx);

    // System para leer CPU y memoria
    let mut sys = System::new_all();
    let (hb_client, hb_config) = (client.clone(), config.clone());
    tokio::spawn(heartbeat_loop(config.heartbeat_interval, move || {
        sys.refresh_cpu();
        sys.refresh_memory();
        let cpu_percent = sys.global_cpu_info().cpu_usage();
        // used_memory devuelve KB -> lo pasamos a bytes
        let mem_bytes = sys.used_memory() * 1024;

        beat(
            hb_client.clone(),
            hb_config.clone(),
            hostname.clone(),
            id_tx.clone(),
            cpu_percent,
            mem_bytes,
        )
    }));

    loop {
        let worker_id = id_rx.borrow().clone();

        // --------- Pedir tarea ---------
        let task = match next_task(&client, &config, &worker_id).await {
            Ok(task) => task,
            Err(e) => {
                warn!("error pidiendo tarea al master: {:?}", e);
                sleep(config.poll_interval).await;
                continue;
            }
        };

        let Some(task) = task else {
            sleep(config.poll_interval).await;
            continue;
        };

        info!(
            "tengo tarea {} ({}, sesión {})",
            task.name, task.kind, task.session.name
        );

        let success = match execute(&task, &config).await {
            Ok(()) => {
                info!("terminé tarea {} correctamente", task.name);
                true
            }
            Err(e) => {
                warn!("error procesando tarea {}: {:?}", task.name, e);
                false
            }
        };

        // Reportar al master que terminamos
        let complete_url = format!("{}/api/v1/tasks/complete", config.master_url);
        if let Err(e) = client
            .post(&complete_url)
            .json(&TaskCompleteRequest {
                worker_id: worker_id.clone(),
                task_name: task.name.clone(),
                success,
            })
            .send()
            .await
        {
            warn!("no se pudo reportar la tarea {}: {:?}", task.name, e);
        }
    }
}

/// Llama a `beat` cada `period`, para siempre. La primera vuelta es inmediata.
pub async fn heartbeat_loop<F, Fut>(period: Duration, mut beat: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    // interval() no acepta un periodo cero
    let mut ticker = interval(period.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        beat().await;
    }
}

// Un heartbeat. Ante un 404 se re-registra y publica el id nuevo.
async fn beat(
    client: Client,
    config: WorkerConfig,
    hostname: String,
    id_tx: Arc<watch::Sender<WorkerId>>,
    cpu_percent: f32,
    mem_bytes: u64,
) {
    let worker_id = id_tx.borrow().clone();

    match heartbeat(&client, &config, &worker_id, cpu_percent, mem_bytes).await {
        Ok(true) => {}
        Ok(false) => {
            warn!("el master no reconoce al worker {}, re-registrando", worker_id);
            match register(&client, &config, &hostname).await {
                Ok(id) => {
                    id_tx.send_replace(id);
                }
                Err(e) => warn!("error re-registrando: {:?}", e),
            }
        }
        Err(e) => warn!("error enviando heartbeat: {:?}", e),
    }
}

async fn register(client: &Client, config: &WorkerConfig, hostname: &str) -> Result<WorkerId> {
    let register_url = format!("{}/api/v1/workers/register", config.master_url);
    let res = client
        .post(&register_url)
        .json(&WorkerRegisterRequest {
            hostname: hostname.to_string(),
            host: config.host.clone(),
            port: config.port,
            resource_port: config.resource_port,
        })
        .send()
        .await
        .with_context(|| format!("registrando worker en {}", register_url))?;

    let WorkerRegisterResponse { worker_id } = res.error_for_status()?.json().await?;
    info!(
        "worker {} registrado contra {} ({}:{}, recursos en {})",
        worker_id, config.master_url, config.host, config.port, config.resource_port
    );
    Ok(worker_id)
}

/// Ok(false) si el master respondió 404 (worker desconocido o dado por muerto).
async fn heartbeat(
    client: &Client,
    config: &WorkerConfig,
    worker_id: &str,
    cpu_percent: f32,
    mem_bytes: u64,
) -> Result<bool> {
    let hb_url = format!("{}/api/v1/workers/heartbeat", config.master_url);
    let res = client
        .post(&hb_url)
        .json(&WorkerHeartbeatRequest {
            worker_id: worker_id.to_string(),
            cpu_percent: Some(cpu_percent),
            mem_bytes: Some(mem_bytes),
        })
        .send()
        .await?;

    if res.status() == StatusCode::NOT_FOUND {
        return Ok(false);
    }
    res.error_for_status()?;
    Ok(true)
}

async fn next_task(client: &Client, config: &WorkerConfig, worker_id: &str) -> Result<Option<Task>> {
    let assign_url = format!("{}/api/v1/tasks/next", config.master_url);
    let res = client
        .post(&assign_url)
        .json(&TaskAssignmentRequest {
            worker_id: worker_id.to_string(),
        })
        .send()
        .await?;

    let assignment: TaskAssignmentResponse = res.error_for_status()?.json().await?;
    Ok(assignment.task)
}

/// Ejecución simulada: resuelve el origen de datos y "trabaja" un rato.
async fn execute(task: &Task, config: &WorkerConfig) -> Result<()> {
    match data_source(task) {
        DataSource::CachedWorker(addr) => {
            info!("tarea {}: recursos desde el worker {}", task.name, addr)
        }
        DataSource::ExternalStorage => {
            info!("tarea {}: recursos desde almacenamiento externo", task.name)
        }
        DataSource::NoResources => {}
    }

    info!("simulando trabajo por {:?}...", config.task_duration);
    sleep(config.task_duration).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{Session, TaskSource};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::Instant;

    fn task(kind: TaskType, resources: bool) -> Task {
        Task::new(
            "t",
            kind,
            Session {
                name: "s".to_string(),
                resources,
            },
        )
    }

    #[test]
    fn cached_source_wins() {
        let mut t = task(TaskType::Producing, true);
        t.source = Some(TaskSource {
            host: "10.0.0.2".to_string(),
            port: 9100,
            resource_port: 9101,
        });

        assert_eq!(
            data_source(&t),
            DataSource::CachedWorker("10.0.0.2:9101".to_string())
        );
    }

    #[test]
    fn producing_with_resources_and_no_cache_uses_external_storage() {
        assert_eq!(
            data_source(&task(TaskType::Producing, true)),
            DataSource::ExternalStorage
        );
    }

    #[test]
    fn reducing_or_resource_less_tasks_need_nothing() {
        assert_eq!(
            data_source(&task(TaskType::Reducing, true)),
            DataSource::NoResources
        );
        assert_eq!(
            data_source(&task(TaskType::Producing, false)),
            DataSource::NoResources
        );
    }

    #[tokio::test]
    async fn execute_finishes_after_configured_duration() {
        let mut config = WorkerConfig::from_lookup(|_| None);
        config.task_duration = Duration::from_millis(5);

        let start = Instant::now();
        execute(&task(TaskType::Producing, true), &config).await.unwrap();

        assert!(start.elapsed() >= config.task_duration);
    }

    #[tokio::test]
    async fn heartbeats_keep_going_while_a_task_runs() {
        let beats = Arc::new(AtomicUsize::new(0));
        let counter = beats.clone();
        let handle = tokio::spawn(heartbeat_loop(Duration::from_millis(10), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        }));

        let mut config = WorkerConfig::from_lookup(|_| None);
        config.task_duration = Duration::from_millis(100);
        execute(&task(TaskType::Producing, true), &config).await.unwrap();
        handle.abort();

        assert!(beats.load(Ordering::SeqCst) >= 3);
    }
}
