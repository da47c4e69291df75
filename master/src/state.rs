// master/src/state.rs

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::cluster::Cluster;
use crate::scheduler::QueueScheduler;

#[derive(Clone)]
pub struct AppState {
    pub cluster: Cluster,
    // el mutex serializa los entry points del scheduler: nunca corren dos a la vez
    pub scheduler: Arc<Mutex<QueueScheduler<Cluster>>>,
}

impl AppState {
    pub fn new() -> Self {
        let cluster = Cluster::new();
        Self {
            scheduler: Arc::new(Mutex::new(QueueScheduler::new(cluster.clone()))),
            cluster,
        }
    }

    /// Orden de locks: scheduler -> cluster. Nunca llamar esto con el
    /// registro del cluster tomado.
    pub fn scheduler(&self) -> MutexGuard<'_, QueueScheduler<Cluster>> {
        self.scheduler.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
