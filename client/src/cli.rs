use anyhow::{bail, Result};
use clap::{Parser, Subcommand, ValueEnum};
use common::{
    FailureInfo, SchedulerSnapshot, Session, TaskAccepted, TaskRequest, TaskStatus, WorkerMetrics,
};
use reqwest::Client;

#[derive(Parser)]
#[command(name = "client")]
#[command(about = "CLI simple para hablar con el master")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum Kind {
    Producing,
    Reducing,
}

impl Kind {
    fn as_wire(&self) -> &'static str {
        match self {
            Kind::Producing => "PRODUCING",
            Kind::Reducing => "REDUCING",
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Envía una tarea nueva al scheduler
    Submit {
        #[arg(value_name = "NOMBRE")]
        name: String,

        #[arg(long, value_enum, default_value = "producing")]
        kind: Kind,

        /// Sesión a la que pertenece la tarea
        #[arg(long, default_value = "default")]
        session: String,

        /// La sesión usa recursos (habilita la afinidad de caché)
        #[arg(long)]
        resources: bool,

        /// Nombre de la ejecución (sólo informativo)
        #[arg(long)]
        execution: Option<String>,
    },
    /// Conteo de tareas en cola / en vuelo
    Status,
    /// Estado de cada worker según el scheduler
    State,
    /// Lista los workers registrados con sus métricas
    Workers,
    /// Marca una tarea como fallida
    Fail {
        #[arg(value_name = "NOMBRE")]
        task_name: String,

        #[arg(long)]
        worker: Option<String>,
    },
}

pub async fn run(cli: Cli, client: &Client, base_url: &str) -> Result<()> {
    match cli.command {
        Commands::Submit {
            name,
            kind,
            session,
            resources,
            execution,
        } => {
            let url = format!("{}/api/v1/tasks", base_url);
            let req = TaskRequest {
                name,
                kind: kind.as_wire().to_string(),
                session: Session {
                    name: session,
                    resources,
                },
                execution,
            };
            let resp = client.post(&url).json(&req).send().await?;

            if !resp.status().is_success() {
                let status = resp.status();
                let msg = resp.text().await.unwrap_or_default();
                bail!("el master rechazó la tarea ({}): {}", status, msg);
            }

            let accepted: TaskAccepted = resp.json().await?;
            println!("Tarea encolada:");
            println!("  nombre: {}", accepted.name);
            print_status(&accepted.status);
        }
        Commands::Status => {
            let url = format!("{}/api/v1/tasks/status", base_url);
            let status: TaskStatus = client.get(&url).send().await?.json().await?;
            print_status(&status);
        }
        Commands::State => {
            let url = format!("{}/api/v1/scheduler/state", base_url);
            let snapshot: SchedulerSnapshot = client.get(&url).send().await?.json().await?;

            if snapshot.workers.is_empty() {
                println!("No hay workers en el scheduler");
            }
            for (i, status) in snapshot.workers.iter().enumerate() {
                println!("  #{:<3} {:?}", i, status);
            }
        }
        Commands::Workers => {
            let url = format!("{}/api/v1/workers", base_url);
            let workers: Vec<WorkerMetrics> = client.get(&url).send().await?.json().await?;

            if workers.is_empty() {
                println!("No hay workers registrados");
            }
            for w in workers {
                println!("Worker {} ({})", w.worker_id, w.hostname);
                println!("  endpoint: {}:{} (recursos {})", w.host, w.port, w.resource_port);
                println!("  dead: {}", w.dead);
                println!("  último heartbeat hace: {}s", w.last_heartbeat_secs_ago);
                println!("  tarea actual: {}", w.current_task.as_deref().unwrap_or("-"));
                println!(
                    "  tareas: iniciadas={} ok={} fallidas={}",
                    w.tasks_started, w.tasks_succeeded, w.tasks_failed
                );
                if let Some(avg) = w.avg_task_ms {
                    println!("  promedio por tarea: {:.1} ms", avg);
                }
                if let (Some(cpu), Some(mem)) = (w.last_cpu_percent, w.last_mem_bytes) {
                    println!("  cpu: {:.1}%  mem: {} MB", cpu, mem / (1024 * 1024));
                }
            }
        }
        Commands::Fail { task_name, worker } => {
            let url = format!("{}/api/v1/tasks/failed", base_url);
            let status: TaskStatus = client
                .post(&url)
                .json(&FailureInfo {
                    worker_id: worker,
                    task_name,
                })
                .send()
                .await?
                .json()
                .await?;
            print_status(&status);
        }
    }

    Ok(())
}

fn print_status(status: &TaskStatus) {
    println!("  en cola: {}", status.waiting);
    println!("  en vuelo: {}", status.running);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submit_parses_kind_and_flags() {
        let cli = Cli::try_parse_from([
            "client", "submit", "t1", "--kind", "reducing", "--session", "s1", "--resources",
        ])
        .unwrap();

        match cli.command {
            Commands::Submit {
                name,
                kind,
                session,
                resources,
                execution,
            } => {
                assert_eq!(name, "t1");
                assert_eq!(kind.as_wire(), "REDUCING");
                assert_eq!(session, "s1");
                assert!(resources);
                assert!(execution.is_none());
            }
            _ => panic!("se esperaba Submit"),
        }
    }

    #[test]
    fn submit_rejects_unknown_kind() {
        assert!(Cli::try_parse_from(["client", "submit", "t1", "--kind", "mapping"]).is_err());
    }

    #[test]
    fn fail_accepts_optional_worker() {
        let cli = Cli::try_parse_from(["client", "fail", "t1"]).unwrap();
        assert!(matches!(cli.command, Commands::Fail { worker: None, .. }));
    }
}
