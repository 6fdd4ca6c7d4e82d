//! Observer hooks invoked synchronously before a decoded package is
//! handed back to the caller (§4.8).
//!
//! Two kinds exist: `EnvChangeHook` reacts to server-driven environment
//! changes (packet size, character set, database, language), and
//! `EEDHook` reacts to extended-error-data informational messages. Both
//! run inline on the task decoding the package, so a hook that blocks
//! blocks the connection -- callers doing anything non-trivial should
//! hand off to their own task.

use std::sync::Arc;

use crate::package::envchange::{EnvChangePackage, EnvChangeType};
use crate::package::error::EedPackage;

/// Reacts to an `EnvChange` package as it's decoded.
pub trait EnvChangeHook: Send + Sync {
    fn on_env_change(&self, change: &EnvChangePackage);
}

/// Reacts to an `EED` (extended error data, informational) package.
pub trait EedHook: Send + Sync {
    fn on_eed(&self, eed: &EedPackage);
}

/// A hook that logs env changes and EED messages through `tracing`, the
/// driver's own default so nothing is silently dropped if the caller
/// registers no hooks of their own.
#[derive(Debug, Default)]
pub struct TracingHook;

impl EnvChangeHook for TracingHook {
    fn on_env_change(&self, change: &EnvChangePackage) {
        tracing::debug!(kind = ?change.kind, old = %change.old_value, new = %change.new_value, "env change");
    }
}

impl EedHook for TracingHook {
    fn on_eed(&self, eed: &EedPackage) {
        tracing::info!(number = eed.diagnostic.number, message = %eed.diagnostic.message, "server message");
    }
}

/// Immutable, built-once registry of hooks, shared across a connection's
/// logical channels via `Arc`.
#[derive(Clone, Default)]
pub struct HookRegistry {
    env_change: Arc<Vec<Box<dyn EnvChangeHook>>>,
    eed: Arc<Vec<Box<dyn EedHook>>>,
}

impl HookRegistry {
    pub fn new(env_change: Vec<Box<dyn EnvChangeHook>>, eed: Vec<Box<dyn EedHook>>) -> Self {
        HookRegistry {
            env_change: Arc::new(env_change),
            eed: Arc::new(eed),
        }
    }

    /// The driver's default registry: a single `TracingHook` on each
    /// channel, so a caller that registers nothing still gets visibility.
    pub fn with_tracing_defaults() -> Self {
        HookRegistry::new(
            vec![Box::new(TracingHook)],
            vec![Box::new(TracingHook)],
        )
    }

    pub fn fire_env_change(&self, change: &EnvChangePackage) {
        for hook in self.env_change.iter() {
            hook.on_env_change(change);
        }
    }

    pub fn fire_eed(&self, eed: &EedPackage) {
        for hook in self.eed.iter() {
            hook.on_eed(eed);
        }
    }
}

impl std::fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookRegistry")
            .field("env_change_count", &self.env_change.len())
            .field("eed_count", &self.eed.len())
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct CountingHook(Arc<AtomicUsize>);

    impl EnvChangeHook for CountingHook {
        fn on_env_change(&self, _change: &EnvChangePackage) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn registers_and_fires_multiple_hooks() {
        let counter = Arc::new(AtomicUsize::new(0));
        let registry = HookRegistry::new(
            vec![
                Box::new(CountingHook(counter.clone())),
                Box::new(CountingHook(counter.clone())),
            ],
            vec![],
        );
        let change = EnvChangePackage {
            kind: EnvChangeType::Database,
            old_value: "master".into(),
            new_value: "pubs2".into(),
        };
        registry.fire_env_change(&change);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    struct RecordingEedHook(Mutex<Vec<i32>>);

    impl EedHook for RecordingEedHook {
        fn on_eed(&self, eed: &EedPackage) {
            self.0.lock().unwrap().push(eed.diagnostic.number);
        }
    }

    #[test]
    fn eed_hook_sees_diagnostic_number() {
        let recorder = Arc::new(RecordingEedHook(Mutex::new(Vec::new())));
        struct Wrapper(Arc<RecordingEedHook>);
        impl EedHook for Wrapper {
            fn on_eed(&self, eed: &EedPackage) {
                self.0.on_eed(eed)
            }
        }
        let registry = HookRegistry::new(vec![], vec![Box::new(Wrapper(recorder.clone()))]);
        let eed = EedPackage {
            diagnostic: crate::error::ServerDiagnostic {
                number: 5701,
                state: 1,
                severity: 10,
                message: "Changed database context".into(),
                server_name: "SYBASE".into(),
                proc_name: String::new(),
                line: 0,
            },
        };
        registry.fire_eed(&eed);
        assert_eq!(recorder.0.lock().unwrap().as_slice(), &[5701]);
    }
}
