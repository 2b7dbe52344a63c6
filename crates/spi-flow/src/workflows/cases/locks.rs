use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::domain::CaseId;

type Registry = HashMap<CaseId, Arc<Mutex<()>>>;

/// Registry of per-case exclusive locks. Mutations of a case and of its documents run under
/// the case's lock; different cases never contend.
///
/// An entry lives only while some caller holds a handle for that case, so ids that never
/// resolve to a case leave nothing behind.
#[derive(Debug, Default)]
pub(crate) struct CaseLocks {
    locks: Mutex<Registry>,
}

impl CaseLocks {
    pub(crate) fn handle(&self, case_id: &CaseId) -> CaseLock<'_> {
        let lock = self.registry().entry(case_id.clone()).or_default().clone();
        CaseLock {
            owner: self,
            case_id: case_id.clone(),
            lock,
        }
    }

    #[cfg(test)]
    pub(crate) fn tracked(&self) -> usize {
        self.registry().len()
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub(crate) struct CaseLock<'a> {
    owner: &'a CaseLocks,
    case_id: CaseId,
    lock: Arc<Mutex<()>>,
}

impl CaseLock<'_> {
    /// The guarded value is `()`, so a poisoned lock carries no broken state.
    pub(crate) fn acquire(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for CaseLock<'_> {
    fn drop(&mut self) {
        // Handles are only cloned under the registry mutex, so the count is stable here.
        let mut registry = self.owner.registry();
        let last_holder = registry
            .get(&self.case_id)
            .is_some_and(|entry| Arc::ptr_eq(entry, &self.lock) && Arc::strong_count(entry) == 2);
        if last_holder {
            registry.remove(&self.case_id);
        }
    }
}
