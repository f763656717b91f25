//! Typed event emitter (C9): a listener registry keyed by [`EventKind`].
//! Handlers run synchronously, in registration order, from whichever
//! task calls [`EventBus::emit`] — the single logical event loop
//! discipline (§5) is the caller's responsibility, not this crate's.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use domain::error::{ErrorContext, SupervisorError};
use domain::event::{Event, EventKind};
use tokio::sync::oneshot;
use tokio::time;

pub type HandlerResult = Result<(), SupervisorError>;
pub type Handler = Arc<dyn Fn(&Event) -> HandlerResult + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    handler: Handler,
    once: bool,
}

#[derive(Default)]
struct Registry {
    by_kind: HashMap<EventKind, Vec<Subscription>>,
}

pub struct EventBus {
    registry: Mutex<Registry>,
    next_id: AtomicU64,
}

/// Returned by [`EventBus::on`]/[`once`]. Dropping it does nothing —
/// call [`Unsubscribe::call`] (or let the subscription manager in
/// `plugin-host` own it) to actually remove the handler.
pub struct Unsubscribe {
    bus: Weak<EventBus>,
    kind: EventKind,
    id: SubscriptionId,
}

impl Unsubscribe {
    pub fn call(self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.off(self.kind, self.id);
        }
    }
}

impl EventBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            registry: Mutex::new(Registry::default()),
            next_id: AtomicU64::new(0),
        })
    }

    fn register(self: &Arc<Self>, kind: EventKind, handler: Handler, once: bool) -> Unsubscribe {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.registry
            .lock()
            .unwrap()
            .by_kind
            .entry(kind)
            .or_default()
            .push(Subscription { id, handler, once });
        Unsubscribe {
            bus: Arc::downgrade(self),
            kind,
            id,
        }
    }

    pub fn on(
        self: &Arc<Self>,
        kind: EventKind,
        handler: impl Fn(&Event) -> HandlerResult + Send + Sync + 'static,
    ) -> Unsubscribe {
        self.register(kind, Arc::new(handler), false)
    }

    pub fn once(
        self: &Arc<Self>,
        kind: EventKind,
        handler: impl Fn(&Event) -> HandlerResult + Send + Sync + 'static,
    ) -> Unsubscribe {
        self.register(kind, Arc::new(handler), true)
    }

    pub fn off(&self, kind: EventKind, id: SubscriptionId) {
        if let Some(subs) = self.registry.lock().unwrap().by_kind.get_mut(&kind) {
            subs.retain(|s| s.id != id);
        }
    }

    /// Dispatches `event` to every handler registered for its kind, in
    /// registration order. A handler that returns `Err` is logged and
    /// does not stop the remaining handlers from running (§4.9).
    pub fn emit(&self, event: Event) {
        let kind = event.kind();
        let handlers: Vec<Handler> = {
            let mut registry = self.registry.lock().unwrap();
            let Some(subs) = registry.by_kind.get_mut(&kind) else {
                return;
            };
            let handlers: Vec<Handler> = subs.iter().map(|s| s.handler.clone()).collect();
            subs.retain(|s| !s.once);
            handlers
        };
        for handler in handlers {
            if let Err(err) = handler(&event) {
                tracing::error!(
                    kind = %kind,
                    code = err.code(),
                    message = %err,
                    "event handler failed"
                );
            }
        }
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.registry
            .lock()
            .unwrap()
            .by_kind
            .get(&kind)
            .map_or(0, |v| v.len())
    }

    /// Resolves with the next event of `kind`, or fails with a
    /// `COMMAND_TIMEOUT`-shaped error (reused here as the generic
    /// "deadline elapsed" signal) if `timeout` elapses first, or with
    /// `CANCELLED`-equivalent if `cancel` fires first.
    pub async fn wait_for(
        self: &Arc<Self>,
        kind: EventKind,
        timeout: Option<Duration>,
        cancel: Option<oneshot::Receiver<()>>,
    ) -> Result<Event, SupervisorError> {
        let (tx, rx) = oneshot::channel();
        let tx = Mutex::new(Some(tx));
        let unsubscribe = self.once(kind, move |event| {
            if let Some(tx) = tx.lock().unwrap().take() {
                let _ = tx.send(event.clone());
            }
            Ok(())
        });

        let result = match (timeout, cancel) {
            (Some(duration), Some(cancel)) => {
                tokio::select! {
                    event = rx => event.map_err(|_| wait_cancelled()),
                    _ = time::sleep(duration) => Err(wait_timeout()),
                    _ = cancel => Err(wait_cancelled()),
                }
            }
            (Some(duration), None) => {
                tokio::select! {
                    event = rx => event.map_err(|_| wait_cancelled()),
                    _ = time::sleep(duration) => Err(wait_timeout()),
                }
            }
            (None, Some(cancel)) => {
                tokio::select! {
                    event = rx => event.map_err(|_| wait_cancelled()),
                    _ = cancel => Err(wait_cancelled()),
                }
            }
            (None, None) => rx.await.map_err(|_| wait_cancelled()),
        };

        unsubscribe.call();
        result
    }
}

fn wait_timeout() -> SupervisorError {
    let mut context = ErrorContext::new();
    context.insert("reason".to_string(), "TIMEOUT".to_string());
    SupervisorError::InvalidState {
        message: "waitFor timed out".to_string(),
        context,
    }
}

fn wait_cancelled() -> SupervisorError {
    let mut context = ErrorContext::new();
    context.insert("reason".to_string(), "CANCELLED".to_string());
    SupervisorError::InvalidState {
        message: "waitFor cancelled".to_string(),
        context,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::event::{ChatChannel, ChatMessage};
    use std::sync::atomic::AtomicUsize;

    fn sample_chat() -> Event {
        Event::ChatMessage(ChatMessage {
            channel: ChatChannel::All,
            player_name: "Tester".to_string(),
            message: "hi".to_string(),
            eos_id: None,
            steam_id: None,
        })
    }

    #[test]
    fn handlers_fire_in_registration_order() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let order_a = order.clone();
        let order_b = order.clone();
        bus.on(EventKind::ChatMessage, move |_| {
            order_a.lock().unwrap().push("a");
            Ok(())
        });
        bus.on(EventKind::ChatMessage, move |_| {
            order_b.lock().unwrap().push("b");
            Ok(())
        });
        bus.emit(sample_chat());
        assert_eq!(*order.lock().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn a_failing_handler_does_not_block_the_next_one() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        bus.on(EventKind::ChatMessage, |_| {
            Err(SupervisorError::InvalidState {
                message: "boom".to_string(),
                context: ErrorContext::new(),
            })
        });
        bus.on(EventKind::ChatMessage, move |_| {
            calls_clone.fetch_add(1, Ordering::Relaxed);
            Ok(())
        });
        bus.emit(sample_chat());
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn once_handler_only_fires_a_single_time() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        bus.once(EventKind::ChatMessage, move |_| {
            calls_clone.fetch_add(1, Ordering::Relaxed);
            Ok(())
        });
        bus.emit(sample_chat());
        bus.emit(sample_chat());
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn off_removes_a_handler() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let unsubscribe = bus.on(EventKind::ChatMessage, move |_| {
            calls_clone.fetch_add(1, Ordering::Relaxed);
            Ok(())
        });
        unsubscribe.call();
        bus.emit(sample_chat());
        assert_eq!(calls.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn wait_for_resolves_with_the_next_matching_event() {
        let bus = EventBus::new();
        let bus_clone = bus.clone();
        tokio::spawn(async move {
            time::sleep(Duration::from_millis(10)).await;
            bus_clone.emit(sample_chat());
        });
        let event = bus.wait_for(EventKind::ChatMessage, Some(Duration::from_secs(1)), None).await.unwrap();
        assert_eq!(event.kind(), EventKind::ChatMessage);
    }

    #[tokio::test]
    async fn wait_for_times_out_without_a_matching_event() {
        let bus = EventBus::new();
        let result = bus.wait_for(EventKind::ChatMessage, Some(Duration::from_millis(20)), None).await;
        assert!(result.is_err());
        assert_eq!(bus.listener_count(EventKind::ChatMessage), 0);
    }
}
