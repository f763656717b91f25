//! Update scheduler (C10): named periodic tasks with no domain
//! dependency — the orchestrator registers `playerList`/`squadList`/
//! `layerInfo`/`adminList` against this crate, but nothing here knows
//! about players or squads.
//!
//! Each registered task owns a fixed-period ticking loop; a tick that
//! lands while the previous invocation is still in flight is skipped
//! rather than queued, and bumps that task's `overlapped` counter
//! instead (§4.10, Property 8).

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::Rng;
use tokio::sync::oneshot;
use tokio::time;

pub type TaskResult = Result<(), String>;
pub type TaskFn = Arc<dyn Fn() -> Pin<Box<dyn Future<Output = TaskResult> + Send>> + Send + Sync>;

/// Wraps a closure returning an async block into a [`TaskFn`], so
/// callers don't have to box/pin futures by hand at every call site.
pub fn task_fn<F, Fut>(f: F) -> TaskFn
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = TaskResult> + Send + 'static,
{
    Arc::new(move || Box::pin(f()))
}

#[derive(Debug)]
pub enum SchedulerError {
    DuplicateTask(String),
    UnknownTask(String),
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerError::DuplicateTask(name) => write!(f, "task already registered: {name}"),
            SchedulerError::UnknownTask(name) => write!(f, "no such task: {name}"),
        }
    }
}

impl std::error::Error for SchedulerError {}

#[derive(Debug, Clone, Default)]
pub struct TaskStats {
    pub invocations: u64,
    pub failures: u64,
    pub overlapped: u64,
    pub last_duration: Option<Duration>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TaskConfig {
    pub name: String,
    pub interval: Duration,
    pub enabled: bool,
    /// Fraction (0.0–1.0) of `interval` applied as symmetric random
    /// jitter around each tick. Zero disables jitter entirely.
    pub jitter: f64,
}

impl TaskConfig {
    pub fn new(name: impl Into<String>, interval: Duration) -> Self {
        Self {
            name: name.into(),
            interval,
            enabled: true,
            jitter: 0.0,
        }
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

fn jittered(interval: Duration, jitter: f64) -> Duration {
    if jitter <= 0.0 {
        return interval;
    }
    let base = interval.as_secs_f64();
    let delta = base * jitter;
    let offset = rand::rng().random_range(-delta..=delta);
    Duration::from_secs_f64((base + offset).max(0.0))
}

struct TaskEntry {
    enabled: Arc<AtomicBool>,
    stats: Arc<Mutex<TaskStats>>,
    cancel: oneshot::Sender<()>,
    handle: tokio::task::JoinHandle<()>,
}

/// Owns a set of named periodic tasks. Generic over the work each task
/// performs — it knows nothing about the game server, only about
/// running closures on a schedule.
pub struct Scheduler {
    tasks: Mutex<HashMap<String, TaskEntry>>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Registers `execute` under `config.name`. The first invocation
    /// happens after `config.interval` elapses, never immediately.
    pub fn register(&self, config: TaskConfig, execute: TaskFn) -> Result<(), SchedulerError> {
        let mut tasks = self.tasks.lock().unwrap();
        if tasks.contains_key(&config.name) {
            return Err(SchedulerError::DuplicateTask(config.name));
        }

        let enabled = Arc::new(AtomicBool::new(config.enabled));
        let busy = Arc::new(AtomicBool::new(false));
        let stats = Arc::new(Mutex::new(TaskStats::default()));
        let (cancel_tx, cancel_rx) = oneshot::channel();

        let handle = tokio::spawn(run_loop(
            config.name.clone(),
            config.interval,
            config.jitter,
            enabled.clone(),
            busy,
            stats.clone(),
            execute,
            cancel_rx,
        ));

        tasks.insert(
            config.name.clone(),
            TaskEntry {
                enabled,
                stats,
                cancel: cancel_tx,
                handle,
            },
        );
        Ok(())
    }

    pub fn set_enabled(&self, name: &str, enabled: bool) -> Result<(), SchedulerError> {
        let tasks = self.tasks.lock().unwrap();
        let entry = tasks.get(name).ok_or_else(|| SchedulerError::UnknownTask(name.to_string()))?;
        entry.enabled.store(enabled, Ordering::Release);
        Ok(())
    }

    pub fn stats(&self, name: &str) -> Result<TaskStats, SchedulerError> {
        let tasks = self.tasks.lock().unwrap();
        let entry = tasks.get(name).ok_or_else(|| SchedulerError::UnknownTask(name.to_string()))?;
        Ok(entry.stats.lock().unwrap().clone())
    }

    pub fn task_names(&self) -> Vec<String> {
        self.tasks.lock().unwrap().keys().cloned().collect()
    }

    /// Cancels a single task immediately; any invocation already in
    /// flight keeps running detached, its result discarded.
    pub fn cancel(&self, name: &str) -> Result<(), SchedulerError> {
        let mut tasks = self.tasks.lock().unwrap();
        let entry = tasks.remove(name).ok_or_else(|| SchedulerError::UnknownTask(name.to_string()))?;
        let _ = entry.cancel.send(());
        entry.handle.abort();
        Ok(())
    }

    /// Cancels every task's scheduling loop immediately. Does not await
    /// in-flight executions — they complete on their own and their
    /// results are simply never observed (§5 "stopAll awaits no
    /// in-flight executions").
    pub fn stop_all(&self) {
        let mut tasks = self.tasks.lock().unwrap();
        for (_, entry) in tasks.drain() {
            let _ = entry.cancel.send(());
            entry.handle.abort();
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_loop(
    name: String,
    interval: Duration,
    jitter: f64,
    enabled: Arc<AtomicBool>,
    busy: Arc<AtomicBool>,
    stats: Arc<Mutex<TaskStats>>,
    execute: TaskFn,
    mut cancel: oneshot::Receiver<()>,
) {
    loop {
        let delay = jittered(interval, jitter);
        tokio::select! {
            _ = time::sleep(delay) => {}
            _ = &mut cancel => return,
        }

        if !enabled.load(Ordering::Acquire) {
            continue;
        }

        if busy.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_err() {
            stats.lock().unwrap().overlapped += 1;
            tracing::debug!(task = %name, "tick skipped, previous invocation still running");
            continue;
        }

        let execute = execute.clone();
        let stats = stats.clone();
        let busy = busy.clone();
        let name = name.clone();
        tokio::spawn(async move {
            let start = std::time::Instant::now();
            let result = (execute)().await;
            let duration = start.elapsed();
            let mut guard = stats.lock().unwrap();
            guard.invocations += 1;
            guard.last_duration = Some(duration);
            match result {
                Ok(()) => guard.last_error = None,
                Err(message) => {
                    guard.failures += 1;
                    tracing::warn!(task = %name, error = %message, "scheduled task failed");
                    guard.last_error = Some(message);
                }
            }
            drop(guard);
            busy.store(false, Ordering::Release);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn task_does_not_fire_before_the_first_interval_elapses() {
        let scheduler = Scheduler::new();
        let invocations = Arc::new(AtomicUsize::new(0));
        let invocations_clone = invocations.clone();

        scheduler
            .register(
                TaskConfig::new("t", Duration::from_millis(100)),
                task_fn(move || {
                    let invocations = invocations_clone.clone();
                    async move {
                        invocations.fetch_add(1, Ordering::Relaxed);
                        Ok(())
                    }
                }),
            )
            .unwrap();

        time::advance(Duration::from_millis(50)).await;
        settle().await;
        assert_eq!(invocations.load(Ordering::Relaxed), 0);

        time::advance(Duration::from_millis(60)).await;
        settle().await;
        assert_eq!(invocations.load(Ordering::Relaxed), 1);

        scheduler.stop_all();
    }

    /// Property 8 — overlapping invocations are never in flight
    /// simultaneously; a tick that lands mid-execution is skipped and
    /// counted, not queued.
    #[tokio::test(start_paused = true)]
    async fn overlapping_tick_is_skipped_and_counted_rather_than_queued() {
        let scheduler = Scheduler::new();
        let gate = Arc::new(Notify::new());
        let gate_clone = gate.clone();
        let invocations = Arc::new(AtomicUsize::new(0));
        let invocations_clone = invocations.clone();

        scheduler
            .register(
                TaskConfig::new("t", Duration::from_millis(100)),
                task_fn(move || {
                    let gate = gate_clone.clone();
                    let invocations = invocations_clone.clone();
                    async move {
                        invocations.fetch_add(1, Ordering::Relaxed);
                        gate.notified().await;
                        Ok(())
                    }
                }),
            )
            .unwrap();

        time::advance(Duration::from_millis(100)).await;
        settle().await;
        assert_eq!(invocations.load(Ordering::Relaxed), 1);

        time::advance(Duration::from_millis(100)).await;
        settle().await;
        assert_eq!(invocations.load(Ordering::Relaxed), 1, "second tick must not start while the first is in flight");
        assert_eq!(scheduler.stats("t").unwrap().overlapped, 1);

        gate.notify_one();
        settle().await;
        scheduler.stop_all();
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_task_does_not_invoke() {
        let scheduler = Scheduler::new();
        let invocations = Arc::new(AtomicUsize::new(0));
        let invocations_clone = invocations.clone();
        scheduler
            .register(
                TaskConfig::new("t", Duration::from_millis(50)).disabled(),
                task_fn(move || {
                    let invocations = invocations_clone.clone();
                    async move {
                        invocations.fetch_add(1, Ordering::Relaxed);
                        Ok(())
                    }
                }),
            )
            .unwrap();

        time::advance(Duration::from_millis(200)).await;
        settle().await;
        assert_eq!(invocations.load(Ordering::Relaxed), 0);
        scheduler.stop_all();
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let scheduler = Scheduler::new();
        let register = || scheduler.register(TaskConfig::new("dup", Duration::from_secs(1)), task_fn(|| async { Ok(()) }));
        register().unwrap();
        assert!(matches!(register(), Err(SchedulerError::DuplicateTask(_))));
        scheduler.stop_all();
    }

    #[tokio::test]
    async fn stats_lookup_fails_for_an_unknown_task() {
        let scheduler = Scheduler::new();
        assert!(matches!(scheduler.stats("missing"), Err(SchedulerError::UnknownTask(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn failures_are_recorded_without_stopping_future_ticks() {
        let scheduler = Scheduler::new();
        scheduler
            .register(
                TaskConfig::new("t", Duration::from_millis(50)),
                task_fn(|| async { Err("boom".to_string()) }),
            )
            .unwrap();

        time::advance(Duration::from_millis(50)).await;
        settle().await;
        let stats = scheduler.stats("t").unwrap();
        assert_eq!(stats.invocations, 1);
        assert_eq!(stats.failures, 1);
        assert_eq!(stats.last_error.as_deref(), Some("boom"));
        scheduler.stop_all();
    }
}
