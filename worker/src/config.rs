use std::{env, str::FromStr, time::Duration};

/// Configuración del worker, leída de variables de entorno.
/// - En Docker: MASTER_URL=http://master:8080
/// - Local: default http://localhost:8080
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub master_url: String,
    pub host: String,
    pub port: u16,
    pub resource_port: u16,
    pub task_duration: Duration,
    pub poll_interval: Duration,
    pub heartbeat_interval: Duration,
}

impl WorkerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            master_url: lookup("MASTER_URL")
                .unwrap_or_else(|| "http://localhost:8080".to_string())
                .trim_end_matches('/')
                .to_string(),
            host: lookup("WORKER_HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port: parse_or(&lookup, "WORKER_PORT", 9100),
            resource_port: parse_or(&lookup, "WORKER_RESOURCE_PORT", 9101),
            task_duration: Duration::from_millis(parse_or(&lookup, "TASK_DURATION_MS", 2000)),
            poll_interval: Duration::from_millis(parse_or(&lookup, "POLL_INTERVAL_MS", 1000)),
            heartbeat_interval: Duration::from_secs(parse_or(
                &lookup,
                "HEARTBEAT_INTERVAL_SECS",
                5,
            )),
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    lookup(key)
        .and_then(|raw| raw.trim().parse::<T>().ok())
        .unwrap_or(default)
}
