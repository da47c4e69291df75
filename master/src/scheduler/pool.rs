use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use common::{TaskType, WorkerId, WorkerStatus};

/// Partición de los workers conocidos en libres (`unused`) y ocupados (`used`).
/// Un worker nunca está en los dos lados a la vez.
#[derive(Debug, Default, Clone)]
pub struct WorkerPool {
    unused: VecDeque<WorkerId>,
    used: HashMap<WorkerId, TaskType>,
}

impl WorkerPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unused(&self) -> &VecDeque<WorkerId> {
        &self.unused
    }

    pub fn used(&self) -> &HashMap<WorkerId, TaskType> {
        &self.used
    }

    pub fn unused_len(&self) -> usize {
        self.unused.len()
    }

    pub fn used_len(&self) -> usize {
        self.used.len()
    }

    pub fn total(&self) -> usize {
        self.unused.len() + self.used.len()
    }

    pub fn is_tracked(&self, worker_id: &str) -> bool {
        self.used.contains_key(worker_id) || self.unused.iter().any(|w| w == worker_id)
    }

    /// Saca el primer worker libre (orden de inserción) y lo marca ocupado.
    pub fn acquire(&mut self, kind: TaskType) -> Option<WorkerId> {
        let worker_id = self.unused.pop_front()?;
        self.used.insert(worker_id.clone(), kind);
        Some(worker_id)
    }

    /// Devuelve un worker ocupado al final de la lista de libres.
    /// Si no estaba ocupado no hace nada y devuelve false.
    pub fn release(&mut self, worker_id: &str) -> bool {
        if self.used.remove(worker_id).is_none() {
            return false;
        }
        self.unused.push_back(worker_id.to_string());
        true
    }

    /// Sincroniza el pool con el registro del master:
    /// - agrega como libres los workers nuevos
    /// - descarta los que ya no aparecen
    ///
    /// Devuelve los workers ocupados que desaparecieron, para que el
    /// llamador limpie sus tareas en vuelo.
    pub fn reconcile(&mut self, registry: &HashSet<WorkerId>) -> Vec<WorkerId> {
        let mut added: Vec<&WorkerId> = registry
            .iter()
            .filter(|w| !self.is_tracked(w))
            .collect();
        // el registro es un set; ordenamos para que el pool sea determinista
        added.sort();
        self.unused.extend(added.into_iter().cloned());

        let mut vanished: Vec<WorkerId> = self
            .used
            .keys()
            .filter(|w| !registry.contains(*w))
            .cloned()
            .collect();
        vanished.sort();
        for worker_id in &vanished {
            self.used.remove(worker_id);
        }

        self.unused.retain(|w| registry.contains(w));

        vanished
    }

    /// Estado por worker, ordenado por nombre.
    pub fn statuses(&self) -> BTreeMap<&str, WorkerStatus> {
        let mut out = BTreeMap::new();
        for worker_id in &self.unused {
            out.insert(worker_id.as_str(), WorkerStatus::Unused);
        }
        for (worker_id, kind) in &self.used {
            out.insert(worker_id.as_str(), WorkerStatus::from(*kind));
        }
        out
    }

    /// Disjunción entre pools y ausencia de duplicados en `unused`.
    pub fn check(&self) -> Result<(), String> {
        let mut seen = HashSet::new();
        for worker_id in &self.unused {
            if !seen.insert(worker_id) {
                return Err(format!("worker {} duplicado en la lista de libres", worker_id));
            }
            if self.used.contains_key(worker_id) {
                return Err(format!("worker {} está libre y ocupado a la vez", worker_id));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(ids: &[&str]) -> HashSet<WorkerId> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn reconcile_adds_new_workers_as_unused() {
        let mut pool = WorkerPool::new();

        let vanished = pool.reconcile(&registry(&["w2", "w1"]));

        assert!(vanished.is_empty());
        let mut unused: Vec<_> = pool.unused().iter().cloned().collect();
        unused.sort();
        assert_eq!(unused, vec!["w1", "w2"]);
        assert_eq!(pool.used_len(), 0);
    }

    #[test]
    fn reconcile_is_idempotent() {
        let mut pool = WorkerPool::new();
        let reg = registry(&["w1", "w2", "w3"]);
        pool.reconcile(&reg);
        pool.acquire(TaskType::Reducing);

        let unused_before = pool.unused().clone();
        let used_before = pool.used().clone();

        let vanished = pool.reconcile(&reg);

        assert!(vanished.is_empty());
        assert_eq!(pool.unused(), &unused_before);
        assert_eq!(pool.used(), &used_before);
    }

    #[test]
    fn reconcile_drops_missing_workers_and_reports_busy_ones() {
        let mut pool = WorkerPool::new();
        pool.reconcile(&registry(&["w1", "w2", "w3"]));
        let busy = pool.acquire(TaskType::Producing).unwrap();
        assert_eq!(busy, "w1");

        let vanished = pool.reconcile(&registry(&["w3"]));

        assert_eq!(vanished, vec!["w1".to_string()]);
        assert_eq!(pool.unused(), &["w3".to_string()]);
        assert!(pool.used().is_empty());
        assert!(!pool.is_tracked("w2"));
    }

    #[test]
    fn acquire_and_release_keep_pools_disjoint() {
        let mut pool = WorkerPool::new();
        pool.reconcile(&registry(&["a", "b"]));

        let first = pool.acquire(TaskType::Reducing).unwrap();
        assert!(pool.used().contains_key(&first));
        assert!(pool.check().is_ok());

        assert!(pool.release(&first));
        // segunda liberación: no-op
        assert!(!pool.release(&first));

        assert_eq!(pool.unused_len(), 2);
        assert_eq!(pool.used_len(), 0);
        assert!(pool.check().is_ok());
    }

    #[test]
    fn idle_workers_are_handed_out_in_fifo_order() {
        let mut pool = WorkerPool::new();
        pool.reconcile(&registry(&["a", "b", "c"]));

        assert_eq!(pool.acquire(TaskType::Producing).as_deref(), Some("a"));
        assert!(pool.release("a"));
        // "a" vuelve al final: primero salen los que esperaban
        assert_eq!(pool.acquire(TaskType::Reducing).as_deref(), Some("b"));
        assert_eq!(pool.acquire(TaskType::Reducing).as_deref(), Some("c"));
        assert_eq!(pool.acquire(TaskType::Producing).as_deref(), Some("a"));
        assert!(pool.acquire(TaskType::Producing).is_none());
    }

    #[test]
    fn acquire_on_empty_pool_returns_none() {
        let mut pool = WorkerPool::new();
        assert!(pool.acquire(TaskType::Producing).is_none());
    }

    #[test]
    fn statuses_are_sorted_by_worker_name() {
        let mut pool = WorkerPool::new();
        pool.reconcile(&registry(&["c", "a", "b"]));
        // el primero libre es "a" porque los nuevos se agregan ordenados
        pool.acquire(TaskType::Producing);

        let statuses: Vec<_> = pool.statuses().into_iter().collect();
        assert_eq!(
            statuses,
            vec![
                ("a", WorkerStatus::Producing),
                ("b", WorkerStatus::Unused),
                ("c", WorkerStatus::Unused),
            ]
        );
    }
}
