//! Bounded drop-oldest queue (C6) sitting between the log reader and the
//! rule parser. The reader never blocks on a slow parser: once the queue
//! is full, the oldest buffered line is evicted to make room for the
//! newest one.

use std::collections::VecDeque;
use std::sync::Arc;

/// Cheap-to-clone snapshot of the counters exposed by [`BoundedQueue`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub total_enqueued: u64,
    pub total_dequeued: u64,
    pub total_dropped: u64,
    pub current_depth: usize,
    pub max_size: usize,
    pub peak_depth: usize,
}

pub trait HighWaterCallback: Fn(usize) + Send + Sync {}
impl<T: Fn(usize) + Send + Sync> HighWaterCallback for T {}

pub trait DropCallback: Fn(usize) + Send + Sync {}
impl<T: Fn(usize) + Send + Sync> DropCallback for T {}

pub struct BoundedQueueConfig {
    pub max_size: usize,
    /// Fraction of `max_size`, default 0.8.
    pub high_water_mark: f64,
    pub on_high_water_mark: Option<Arc<dyn HighWaterCallback>>,
    pub on_drop: Option<Arc<dyn DropCallback>>,
}

impl BoundedQueueConfig {
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            high_water_mark: 0.8,
            on_high_water_mark: None,
            on_drop: None,
        }
    }
}

/// A FIFO of at most `max_size` items. `enqueue` always admits the new
/// item; when full, the oldest item is dropped first (§4.6). The
/// high-water callback fires once per ascending crossing of the
/// threshold and re-arms once depth falls back below it.
pub struct BoundedQueue<T> {
    items: VecDeque<T>,
    config: BoundedQueueConfig,
    armed: bool,
    stats: QueueStats,
}

impl<T> BoundedQueue<T> {
    pub fn new(config: BoundedQueueConfig) -> Self {
        let max_size = config.max_size;
        Self {
            items: VecDeque::with_capacity(max_size.min(1024)),
            config,
            armed: true,
            stats: QueueStats {
                max_size,
                ..Default::default()
            },
        }
    }

    fn high_water_threshold(&self) -> usize {
        ((self.config.max_size as f64) * self.config.high_water_mark).ceil() as usize
    }

    fn check_high_water(&mut self) {
        let threshold = self.high_water_threshold();
        let depth = self.items.len();
        if self.armed && depth >= threshold {
            self.armed = false;
            if let Some(cb) = &self.config.on_high_water_mark {
                cb(depth);
            }
        } else if !self.armed && depth < threshold {
            self.armed = true;
        }
    }

    fn drop_oldest(&mut self, count: usize) {
        for _ in 0..count {
            if self.items.pop_front().is_some() {
                self.stats.total_dropped += 1;
            }
        }
        if let Some(cb) = &self.config.on_drop {
            if count > 0 {
                cb(count);
            }
        }
    }

    pub fn enqueue(&mut self, item: T) {
        if self.config.max_size == 0 {
            return;
        }
        if self.items.len() >= self.config.max_size {
            self.drop_oldest(1);
        }
        self.items.push_back(item);
        self.stats.total_enqueued += 1;
        self.stats.current_depth = self.items.len();
        self.stats.peak_depth = self.stats.peak_depth.max(self.stats.current_depth);
        self.check_high_water();
    }

    /// Admits a batch. Room is made by dropping from the front first;
    /// if the incoming batch alone still exceeds capacity, the batch's
    /// own leading items are dropped too (§4.6).
    pub fn enqueue_many(&mut self, batch: impl IntoIterator<Item = T>) {
        let mut batch: VecDeque<T> = batch.into_iter().collect();
        if self.config.max_size == 0 {
            return;
        }
        if batch.len() > self.config.max_size {
            let excess = batch.len() - self.config.max_size;
            for _ in 0..excess {
                batch.pop_front();
                self.stats.total_dropped += 1;
            }
            if let Some(cb) = &self.config.on_drop {
                cb(excess);
            }
        }
        let room = self.config.max_size.saturating_sub(self.items.len());
        if batch.len() > room {
            self.drop_oldest(batch.len() - room);
        }
        let admitted = batch.len();
        self.items.extend(batch);
        self.stats.total_enqueued += admitted as u64;
        self.stats.current_depth = self.items.len();
        self.stats.peak_depth = self.stats.peak_depth.max(self.stats.current_depth);
        self.check_high_water();
    }

    pub fn dequeue(&mut self) -> Option<T> {
        let item = self.items.pop_front();
        if item.is_some() {
            self.stats.total_dequeued += 1;
            self.stats.current_depth = self.items.len();
            self.check_high_water();
        }
        item
    }

    pub fn dequeue_many(&mut self, max: usize) -> Vec<T> {
        let mut out = Vec::with_capacity(max.min(self.items.len()));
        for _ in 0..max {
            match self.items.pop_front() {
                Some(item) => out.push(item),
                None => break,
            }
        }
        self.stats.total_dequeued += out.len() as u64;
        self.stats.current_depth = self.items.len();
        self.check_high_water();
        out
    }

    pub fn stats(&self) -> QueueStats {
        self.stats
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// S5 — bounded queue drop-oldest.
    #[test]
    fn drops_oldest_when_over_capacity() {
        let mut queue = BoundedQueue::new(BoundedQueueConfig::new(3));
        for item in ["a", "b", "c", "d"] {
            queue.enqueue(item);
        }
        assert_eq!(queue.dequeue(), Some("b"));
        assert_eq!(queue.dequeue(), Some("c"));
        assert_eq!(queue.dequeue(), Some("d"));
        assert_eq!(queue.stats().total_dropped, 1);
    }

    /// Property 3: totalEnqueued == totalDequeued + totalDropped + currentDepth.
    #[test]
    fn accounting_invariant_holds_across_mixed_operations() {
        let mut queue = BoundedQueue::new(BoundedQueueConfig::new(4));
        for i in 0..10 {
            queue.enqueue(i);
            if i % 3 == 0 {
                queue.dequeue();
            }
        }
        let stats = queue.stats();
        assert_eq!(
            stats.total_enqueued,
            stats.total_dequeued + stats.total_dropped + stats.current_depth as u64
        );
    }

    /// Property 4: currentDepth never exceeds max_size and retains the
    /// last-enqueued window.
    #[test]
    fn never_exceeds_max_size_and_keeps_the_tail_window() {
        let mut queue = BoundedQueue::new(BoundedQueueConfig::new(3));
        for i in 0..20 {
            queue.enqueue(i);
            assert!(queue.len() <= 3);
        }
        let remaining = queue.dequeue_many(10);
        assert_eq!(remaining, vec![17, 18, 19]);
    }

    #[test]
    fn high_water_callback_fires_once_per_ascending_crossing() {
        let fires = Arc::new(AtomicUsize::new(0));
        let fires_clone = fires.clone();
        let mut config = BoundedQueueConfig::new(10);
        config.high_water_mark = 0.8;
        config.on_high_water_mark = Some(Arc::new(move |_depth| {
            fires_clone.fetch_add(1, Ordering::Relaxed);
        }));
        let mut queue = BoundedQueue::new(config);
        for i in 0..8 {
            queue.enqueue(i);
        }
        assert_eq!(fires.load(Ordering::Relaxed), 1);
        queue.enqueue(8);
        assert_eq!(fires.load(Ordering::Relaxed), 1, "stays armed-off while above threshold");

        queue.dequeue_many(5);
        queue.enqueue(9);
        queue.enqueue(10);
        queue.enqueue(11);
        queue.enqueue(12);
        assert_eq!(fires.load(Ordering::Relaxed), 2, "re-arms after dropping below threshold");
    }

    #[test]
    fn enqueue_many_drops_from_front_then_from_the_incoming_batch() {
        let mut queue = BoundedQueue::new(BoundedQueueConfig::new(3));
        queue.enqueue("a");
        queue.enqueue_many(["b", "c", "d", "e"]);
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.dequeue_many(3), vec!["c", "d", "e"]);
    }
}
