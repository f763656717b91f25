//! Connector registry (C15): lazily-instantiated named shared resources.
//! A factory is registered up front; the instance itself is only built
//! (and connected) the first time a plugin actually asks for it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use domain::error::{ErrorContext, SupervisorError};
use host_api::Connector;

type Factory = Arc<dyn Fn() -> Arc<dyn Connector> + Send + Sync>;

enum Slot {
    Factory(Factory),
    /// `connect()` was attempted and failed; further `get()` calls return
    /// the same failure without retrying (§4.15: "a failed init is
    /// remembered and suppresses retries for that name").
    Failed(String),
    Ready(Arc<dyn Connector>),
}

#[derive(Default)]
pub struct ConnectorRegistry {
    slots: Mutex<HashMap<String, Slot>>,
}

impl ConnectorRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add(&self, name: impl Into<String>, factory: Factory) {
        self.slots.lock().unwrap().insert(name.into(), Slot::Factory(factory));
    }

    /// Registers an already-constructed, externally managed connector
    /// (§4.15 `register`) — skips the lazy factory path entirely.
    pub fn register(&self, name: impl Into<String>, instance: Arc<dyn Connector>) {
        self.slots.lock().unwrap().insert(name.into(), Slot::Ready(instance));
    }

    /// Resolves `name`, running the factory and `connect()` on first use
    /// and caching the result. Returns `None` for an unknown name or one
    /// whose connection previously failed.
    pub async fn get(&self, name: &str) -> Option<Arc<dyn Connector>> {
        let factory = {
            let mut slots = self.slots.lock().unwrap();
            match slots.get(name) {
                Some(Slot::Ready(instance)) => return Some(instance.clone()),
                Some(Slot::Failed(_)) => return None,
                Some(Slot::Factory(factory)) => {
                    let factory = factory.clone();
                    slots.remove(name);
                    factory
                }
                None => return None,
            }
        };

        let instance = factory();
        match instance.connect().await {
            Ok(()) => {
                self.slots.lock().unwrap().insert(name.to_string(), Slot::Ready(instance.clone()));
                Some(instance)
            }
            Err(err) => {
                tracing::warn!(connector = name, error = %err, "connector init failed, will not retry");
                self.slots.lock().unwrap().insert(name.to_string(), Slot::Failed(err.to_string()));
                None
            }
        }
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.slots.lock().unwrap().contains_key(name)
    }

    /// Calls `disconnect()` on every instantiated connector, collecting
    /// errors rather than stopping at the first one (§4.15/§5: "other
    /// connectors still get their chance to shut down").
    pub async fn disconnect_all(&self) -> Vec<SupervisorError> {
        let instances: Vec<Arc<dyn Connector>> = {
            let slots = self.slots.lock().unwrap();
            slots
                .values()
                .filter_map(|slot| match slot {
                    Slot::Ready(instance) => Some(instance.clone()),
                    _ => None,
                })
                .collect()
        };

        let mut errors = Vec::new();
        for instance in instances {
            if let Err(err) = instance.disconnect().await {
                tracing::warn!(connector = instance.name(), error = %err, "connector disconnect failed");
                errors.push(err);
            }
        }
        errors
    }
}

pub fn registration_error(name: &str, message: impl Into<String>) -> SupervisorError {
    SupervisorError::InvalidState { message: format!("connector '{name}': {}", message.into()), context: ErrorContext::new() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct FakeConnector {
        name: String,
        connected: AtomicBool,
        connect_calls: AtomicUsize,
        fail_connect: bool,
    }

    #[async_trait]
    impl Connector for FakeConnector {
        fn name(&self) -> &str {
            &self.name
        }
        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }
        async fn connect(&self) -> Result<(), SupervisorError> {
            self.connect_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_connect {
                return Err(SupervisorError::InvalidState { message: "boom".to_string(), context: ErrorContext::new() });
            }
            self.connected.store(true, Ordering::SeqCst);
            Ok(())
        }
        async fn disconnect(&self) -> Result<(), SupervisorError> {
            self.connected.store(false, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn get_is_lazy_and_caches_the_instance() {
        let registry = ConnectorRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        registry.add(
            "db",
            Arc::new(move || {
                calls_clone.fetch_add(1, Ordering::SeqCst);
                Arc::new(FakeConnector {
                    name: "db".to_string(),
                    connected: AtomicBool::new(false),
                    connect_calls: AtomicUsize::new(0),
                    fail_connect: false,
                }) as Arc<dyn Connector>
            }),
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0, "factory must not run until get()");

        let a = registry.get("db").await.unwrap();
        let b = registry.get("db").await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1, "second get() must reuse the cached instance");
        assert!(a.is_connected());
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn a_failed_connector_is_not_retried() {
        let registry = ConnectorRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        registry.add(
            "flaky",
            Arc::new(move || {
                calls_clone.fetch_add(1, Ordering::SeqCst);
                Arc::new(FakeConnector {
                    name: "flaky".to_string(),
                    connected: AtomicBool::new(false),
                    connect_calls: AtomicUsize::new(0),
                    fail_connect: true,
                }) as Arc<dyn Connector>
            }),
        );

        assert!(registry.get("flaky").await.is_none());
        assert!(registry.get("flaky").await.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 1, "a failed init suppresses retries");
    }

    #[tokio::test]
    async fn disconnect_all_visits_every_instantiated_connector() {
        let registry = ConnectorRegistry::new();
        registry.add(
            "a",
            Arc::new(|| {
                Arc::new(FakeConnector { name: "a".to_string(), connected: AtomicBool::new(false), connect_calls: AtomicUsize::new(0), fail_connect: false })
                    as Arc<dyn Connector>
            }),
        );
        registry.add(
            "b",
            Arc::new(|| {
                Arc::new(FakeConnector { name: "b".to_string(), connected: AtomicBool::new(false), connect_calls: AtomicUsize::new(0), fail_connect: false })
                    as Arc<dyn Connector>
            }),
        );
        let a = registry.get("a").await.unwrap();
        let _b = registry.get("b").await.unwrap();

        let errors = registry.disconnect_all().await;
        assert!(errors.is_empty());
        assert!(!a.is_connected());
    }
}
