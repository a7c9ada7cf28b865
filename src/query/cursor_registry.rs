use crate::query::runner::Runner;
use std::collections::HashSet;
use std::sync::Mutex;
use tracing::warn;

/// The set of runners currently registered against one collection, so that
/// invalidation events (drops, index builds) can reach them.
pub struct CursorRegistry {
    runners: Mutex<HashSet<u64>>,
}

impl CursorRegistry {
    pub fn new() -> Self {
        CursorRegistry {
            runners: Mutex::new(HashSet::new()),
        }
    }

    pub fn register_runner(&self, runner: &Runner) {
        let mut runners = self
            .runners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        runners.insert(runner.id());
    }

    pub fn deregister_runner(&self, runner: &Runner) {
        let mut runners = self
            .runners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !runners.remove(&runner.id()) {
            warn!(runner_id = runner.id(), "deregistering unknown runner");
        }
    }

    pub fn contains(&self, runner: &Runner) -> bool {
        self.runners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(&runner.id())
    }

    pub fn registered_count(&self) -> usize {
        self.runners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

impl Default for CursorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Scoped registration of a runner with its collection's cursor registry.
///
/// Registers on construction and deregisters on drop, including unwinding.
/// A runner without a collection (EOF) is a no-op in both directions.
pub struct ScopedRunnerRegistration<'a> {
    runner: &'a Runner,
}

impl<'a> ScopedRunnerRegistration<'a> {
    pub fn new(runner: &'a Runner) -> Self {
        if let Some(collection) = runner.collection() {
            collection.cursor_registry().register_runner(runner);
        }
        ScopedRunnerRegistration { runner }
    }
}

impl Drop for ScopedRunnerRegistration<'_> {
    fn drop(&mut self) {
        if let Some(collection) = self.runner.collection() {
            collection.cursor_registry().deregister_runner(self.runner);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CollectionCatalogEntry;
    use crate::query::runner::RunnerKind;

    #[test]
    fn test_register_is_idempotent_per_scope() {
        let registry = CursorRegistry::new();
        let runner = Runner::new("t.c", None, None, RunnerKind::Eof);

        registry.register_runner(&runner);
        registry.register_runner(&runner);
        assert_eq!(registry.registered_count(), 1);

        registry.deregister_runner(&runner);
        assert_eq!(registry.registered_count(), 0);
    }

    #[test]
    fn test_scoped_registration_restores_registry() {
        let collection = CollectionCatalogEntry::for_namespace("t.c");
        let runner = Runner::new("t.c", Some(collection.clone()), None, RunnerKind::Eof);

        assert_eq!(collection.cursor_registry().registered_count(), 0);
        {
            let _registration = ScopedRunnerRegistration::new(&runner);
            assert!(collection.cursor_registry().contains(&runner));
        }
        assert_eq!(collection.cursor_registry().registered_count(), 0);
    }

    #[test]
    fn test_scoped_registration_skips_eof_runner() {
        let runner = Runner::new("t.c", None, None, RunnerKind::Eof);
        // no collection: construction and drop are both no-ops
        let registration = ScopedRunnerRegistration::new(&runner);
        drop(registration);
    }

    #[test]
    fn test_scope_survives_unwinding() {
        let collection = CollectionCatalogEntry::for_namespace("t.c");
        let runner = Runner::new("t.c", Some(collection.clone()), None, RunnerKind::Eof);

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _registration = ScopedRunnerRegistration::new(&runner);
            panic!("boom");
        }));
        assert!(result.is_err());
        assert_eq!(collection.cursor_registry().registered_count(), 0);
    }
}
