use std::{env, str::FromStr, time::Duration};

use tracing::warn;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_HEARTBEAT_TIMEOUT_SECS: u64 = 20;
const DEFAULT_MONITOR_INTERVAL_SECS: u64 = 5;
const DEFAULT_STATUS_LOG_INTERVAL_SECS: u64 = 30;
const DEFAULT_DEAD_WORKER_RETENTION_SECS: u64 = 300;

pub const DEFAULT_LOG_FILTER: &str = "master=debug,tower_http=info";

/// Configuración del master, leída de variables de entorno.
#[derive(Debug, Clone)]
pub struct MasterConfig {
    pub bind_addr: String,
    pub heartbeat_timeout: Duration,
    pub monitor_interval: Duration,
    pub status_log_interval: Duration,
    // cuánto queda un worker muerto en el registro antes de borrarlo
    pub dead_worker_retention: Duration,
}

impl MasterConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Igual que `from_env` pero con una función de búsqueda inyectable.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            bind_addr: lookup("MASTER_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            heartbeat_timeout: Duration::from_secs(parse_or(
                &lookup,
                "WORKER_HEARTBEAT_TIMEOUT_SECS",
                DEFAULT_HEARTBEAT_TIMEOUT_SECS,
            )),
            monitor_interval: Duration::from_secs(parse_or(
                &lookup,
                "MONITOR_INTERVAL_SECS",
                DEFAULT_MONITOR_INTERVAL_SECS,
            )),
            status_log_interval: Duration::from_secs(parse_or(
                &lookup,
                "STATUS_LOG_INTERVAL_SECS",
                DEFAULT_STATUS_LOG_INTERVAL_SECS,
            )),
            dead_worker_retention: Duration::from_secs(parse_or(
                &lookup,
                "DEAD_WORKER_RETENTION_SECS",
                DEFAULT_DEAD_WORKER_RETENTION_SECS,
            )),
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Copy,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse::<T>().unwrap_or_else(|_| {
            warn!("valor inválido para {}: {:?}, se usa el default", key, raw);
            default
        }),
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let cfg = MasterConfig::from_lookup(lookup_from(&[]));

        assert_eq!(cfg.bind_addr, "0.0.0.0:8080");
        assert_eq!(cfg.heartbeat_timeout, Duration::from_secs(20));
        assert_eq!(cfg.monitor_interval, Duration::from_secs(5));
        assert_eq!(cfg.status_log_interval, Duration::from_secs(30));
        assert_eq!(cfg.dead_worker_retention, Duration::from_secs(300));
    }

    #[test]
    fn values_are_read_from_lookup() {
        let cfg = MasterConfig::from_lookup(lookup_from(&[
            ("MASTER_BIND_ADDR", "127.0.0.1:9999"),
            ("WORKER_HEARTBEAT_TIMEOUT_SECS", " 7 "),
            ("MONITOR_INTERVAL_SECS", "1"),
            ("DEAD_WORKER_RETENTION_SECS", "60"),
        ]));

        assert_eq!(cfg.bind_addr, "127.0.0.1:9999");
        assert_eq!(cfg.heartbeat_timeout, Duration::from_secs(7));
        assert_eq!(cfg.monitor_interval, Duration::from_secs(1));
        assert_eq!(cfg.dead_worker_retention, Duration::from_secs(60));
    }

    #[test]
    fn invalid_numbers_fall_back_to_default() {
        let cfg = MasterConfig::from_lookup(lookup_from(&[(
            "STATUS_LOG_INTERVAL_SECS",
            "muchos",
        )]));

        assert_eq!(cfg.status_log_interval, Duration::from_secs(30));
    }
}
