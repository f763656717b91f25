//! Subscription manager (C13): per-plugin bookkeeping of event
//! subscriptions, intervals and timeouts, so `unmount` can release
//! everything a plugin registered regardless of what the plugin itself
//! does on the way out.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use domain::error::{ErrorContext, PluginErrorKind, SupervisorError};
use domain::event::EventKind;
use event_bus::EventBus;
use host_api::{EventHandler, EventsHandle, TimerCallback, TimersHandle, Unsubscribe};
use tokio::task::JoinHandle;
use tokio::time;

use crate::circuit_breaker::CircuitBreaker;

#[derive(Debug, Clone, Copy, Default)]
pub struct CleanupCounts {
    pub subscriptions: usize,
    pub intervals: usize,
    pub timeouts: usize,
}

struct Timer {
    handle: JoinHandle<()>,
}

/// Owns every subscription, interval and timeout a single plugin
/// instance registered. `cleanup()` is the only place these are ever torn
/// down in bulk; the plugin manager calls it unconditionally during
/// unmount, independent of whatever `Plugin::unmount` itself returned.
pub struct SubscriptionManager {
    plugin_name: String,
    bus: Arc<EventBus>,
    breaker: Arc<CircuitBreaker>,
    subscriptions: Mutex<HashMap<u64, event_bus::Unsubscribe>>,
    intervals: Mutex<HashMap<u64, Timer>>,
    timeouts: Mutex<HashMap<u64, Timer>>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl SubscriptionManager {
    pub fn new(plugin_name: impl Into<String>, bus: Arc<EventBus>, breaker: Arc<CircuitBreaker>) -> Arc<Self> {
        Arc::new(Self {
            plugin_name: plugin_name.into(),
            bus,
            breaker,
            subscriptions: Mutex::new(HashMap::new()),
            intervals: Mutex::new(HashMap::new()),
            timeouts: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        })
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Wraps a plugin's handler so a circuit-open plugin never sees the
    /// event (§4.18: "plugins with open circuits are blocked from
    /// receiving event invocations") and every failure is translated into
    /// a `PluginError{kind: EVENT}` that feeds the breaker.
    fn guarded(&self, handler: EventHandler) -> event_bus::Handler {
        let breaker = self.breaker.clone();
        let plugin_name = self.plugin_name.clone();
        Arc::new(move |event| {
            if !breaker.allow() {
                return Ok(());
            }
            match handler(event) {
                Ok(()) => {
                    breaker.record_success();
                    Ok(())
                }
                Err(err) => {
                    breaker.record_failure();
                    let mut context = ErrorContext::new();
                    context.insert("cause".to_string(), err.to_string());
                    Err(SupervisorError::PluginError {
                        kind: PluginErrorKind::Event,
                        plugin: plugin_name.clone(),
                        message: "event handler failed".to_string(),
                        context,
                    })
                }
            }
        })
    }

    /// Invoked by every subscription's returned `Unsubscribe` AND by
    /// [`cleanup`] — tracking survives either path without double-free.
    fn untrack_subscription(self: &Arc<Self>, id: u64) {
        self.subscriptions.lock().unwrap().remove(&id);
    }

    fn untrack_timer(self: &Arc<Self>, bucket: &Mutex<HashMap<u64, Timer>>, id: u64) -> Option<Timer> {
        bucket.lock().unwrap().remove(&id)
    }

    /// Tears down every tracked subscription, interval and timeout.
    /// Unsubscribe errors are swallowed (they are infallible closures
    /// here, but the contract per §4.13 is that cleanup never itself
    /// fails). Further tracking attempts after this point are rejected.
    pub fn cleanup(&self) -> CleanupCounts {
        self.closed.store(true, Ordering::Release);

        let subs: Vec<_> = self.subscriptions.lock().unwrap().drain().collect();
        let subscriptions = subs.len();
        for (_, unsub) in subs {
            unsub.call();
        }

        let intervals_drained: Vec<_> = self.intervals.lock().unwrap().drain().collect();
        let intervals = intervals_drained.len();
        for (_, timer) in intervals_drained {
            timer.handle.abort();
        }

        let timeouts_drained: Vec<_> = self.timeouts.lock().unwrap().drain().collect();
        let timeouts = timeouts_drained.len();
        for (_, timer) in timeouts_drained {
            timer.handle.abort();
        }

        CleanupCounts { subscriptions, intervals, timeouts }
    }

    pub fn active_subscription_count(&self) -> usize {
        self.subscriptions.lock().unwrap().len()
    }

    pub fn active_interval_count(&self) -> usize {
        self.intervals.lock().unwrap().len()
    }

    pub fn active_timeout_count(&self) -> usize {
        self.timeouts.lock().unwrap().len()
    }
}

impl EventsHandle for Arc<SubscriptionManager> {
    fn on(&self, kind: EventKind, handler: EventHandler) -> Unsubscribe {
        if self.closed.load(Ordering::Acquire) {
            return Box::new(|| {});
        }
        let id = self.next_id();
        let unsub = self.bus.on(kind, move_fn(self.guarded(handler)));
        self.subscriptions.lock().unwrap().insert(id, unsub);
        let this = self.clone();
        Box::new(move || this.untrack_subscription(id))
    }

    fn once(&self, kind: EventKind, handler: EventHandler) -> Unsubscribe {
        if self.closed.load(Ordering::Acquire) {
            return Box::new(|| {});
        }
        let id = self.next_id();
        let unsub = self.bus.once(kind, move_fn(self.guarded(handler)));
        self.subscriptions.lock().unwrap().insert(id, unsub);
        let this = self.clone();
        Box::new(move || this.untrack_subscription(id))
    }
}

/// `event_bus::EventBus::on` takes an `impl Fn`, not an `event_bus::Handler`
/// directly — this adapts one to the other without an extra indirection
/// layer at every call site.
fn move_fn(handler: event_bus::Handler) -> impl Fn(&domain::event::Event) -> Result<(), SupervisorError> + Send + Sync + 'static {
    move |event| handler(event)
}

impl TimersHandle for Arc<SubscriptionManager> {
    fn set_interval(&self, period: Duration, callback: TimerCallback) -> Unsubscribe {
        if self.closed.load(Ordering::Acquire) {
            return Box::new(|| {});
        }
        let id = self.next_id();
        let plugin_name = self.plugin_name.clone();
        let breaker = self.breaker.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = time::interval(period);
            loop {
                ticker.tick().await;
                if !breaker.allow() {
                    continue;
                }
                match callback() {
                    Ok(()) => breaker.record_success(),
                    Err(err) => {
                        breaker.record_failure();
                        tracing::warn!(plugin = %plugin_name, error = %err, "plugin interval callback failed");
                    }
                }
            }
        });
        self.intervals.lock().unwrap().insert(id, Timer { handle });
        let this = self.clone();
        Box::new(move || {
            if let Some(timer) = this.untrack_timer(&this.intervals, id) {
                timer.handle.abort();
            }
        })
    }

    fn set_timeout(&self, delay: Duration, callback: TimerCallback) -> Unsubscribe {
        if self.closed.load(Ordering::Acquire) {
            return Box::new(|| {});
        }
        let id = self.next_id();
        let plugin_name = self.plugin_name.clone();
        let breaker = self.breaker.clone();
        let this_for_task = self.clone();
        let handle = tokio::spawn(async move {
            time::sleep(delay).await;
            if breaker.allow() {
                match callback() {
                    Ok(()) => breaker.record_success(),
                    Err(err) => {
                        breaker.record_failure();
                        tracing::warn!(plugin = %plugin_name, error = %err, "plugin timeout callback failed");
                    }
                }
            }
            // A fired timeout auto-removes itself from tracking (§4.13).
            this_for_task.timeouts.lock().unwrap().remove(&id);
        });
        self.timeouts.lock().unwrap().insert(id, Timer { handle });
        let this = self.clone();
        Box::new(move || {
            if let Some(timer) = this.untrack_timer(&this.timeouts, id) {
                timer.handle.abort();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::CircuitBreakerConfig;
    use domain::event::{ChatChannel, ChatMessage, Event};
    use std::sync::atomic::AtomicUsize;

    fn sample_chat() -> Event {
        Event::ChatMessage(ChatMessage {
            channel: ChatChannel::All,
            player_name: "P".to_string(),
            message: "hi".to_string(),
            eos_id: None,
            steam_id: None,
        })
    }

    fn manager() -> Arc<SubscriptionManager> {
        let bus = EventBus::new();
        let breaker = Arc::new(CircuitBreaker::new(CircuitBreakerConfig::default()));
        SubscriptionManager::new("test-plugin", bus, breaker)
    }

    #[tokio::test]
    async fn cleanup_removes_subscriptions_intervals_and_timeouts() {
        let mgr = manager();
        mgr.on(EventKind::ChatMessage, Arc::new(|_| Ok(())));
        mgr.set_interval(Duration::from_millis(50), Arc::new(|| Ok(())));
        mgr.set_timeout(Duration::from_secs(10), Arc::new(|| Ok(())));

        assert_eq!(mgr.active_subscription_count(), 1);
        assert_eq!(mgr.active_interval_count(), 1);
        assert_eq!(mgr.active_timeout_count(), 1);

        let counts = mgr.cleanup();
        assert_eq!(counts.subscriptions, 1);
        assert_eq!(counts.intervals, 1);
        assert_eq!(counts.timeouts, 1);
        assert_eq!(mgr.active_subscription_count(), 0);
        assert_eq!(mgr.active_interval_count(), 0);
        assert_eq!(mgr.active_timeout_count(), 0);
    }

    #[tokio::test]
    async fn calling_unsubscribe_removes_a_single_entry() {
        let mgr = manager();
        let unsub = mgr.on(EventKind::ChatMessage, Arc::new(|_| Ok(())));
        assert_eq!(mgr.active_subscription_count(), 1);
        unsub();
        assert_eq!(mgr.active_subscription_count(), 0);
    }

    #[tokio::test]
    async fn handler_failures_trip_the_breaker_and_suppress_further_dispatch() {
        let bus = EventBus::new();
        let breaker = Arc::new(CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 2,
            reset_timeout: Duration::from_secs(60),
            success_threshold: 2,
        }));
        let mgr = SubscriptionManager::new("flaky", bus.clone(), breaker.clone());
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        mgr.on(
            EventKind::ChatMessage,
            Arc::new(move |_| {
                calls_clone.fetch_add(1, Ordering::Relaxed);
                Err(SupervisorError::InvalidState {
                    message: "boom".to_string(),
                    context: ErrorContext::new(),
                })
            }),
        );

        bus.emit(sample_chat());
        bus.emit(sample_chat());
        assert_eq!(calls.load(Ordering::Relaxed), 2);

        // breaker now open: the handler must not be invoked a third time.
        bus.emit(sample_chat());
        assert_eq!(calls.load(Ordering::Relaxed), 2);
    }
}
