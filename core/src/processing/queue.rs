use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Slots per aligner channel queue.
pub const CHANNEL_QUEUE_CAPACITY: usize = 8;

/// What a producer experiences when the queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backpressure {
    /// The producer waits until a slot frees up. Nothing is dropped.
    Blocking,
    /// The producer waits at most `wait`, then gets its item back.
    DropOnFull { wait: Duration },
}

/// Result of handing an item to a queue.
#[derive(Debug, PartialEq, Eq)]
pub enum Offer<T> {
    Accepted,
    Dropped(T),
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    #[error("queue closed")]
    Closed,
}

struct QueueState<T> {
    items: VecDeque<T>,
    open: bool,
    // Bumped on every close so waiters from an earlier session never resume into a new one.
    epoch: u64,
}

impl<T> QueueState<T> {
    fn cancelled(&self, epoch: u64) -> bool {
        !self.open || self.epoch != epoch
    }
}

/// Fixed-capacity FIFO shared between producer and consumer threads.
///
/// `close` empties the queue and wakes every blocked producer and consumer,
/// which then observe [`QueueError::Closed`].
pub struct ChannelQueue<T> {
    state: Mutex<QueueState<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
    policy: Backpressure,
}

impl<T> ChannelQueue<T> {
    pub fn new(capacity: usize, policy: Backpressure) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity),
                open: true,
                epoch: 0,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
            policy,
        }
    }

    pub fn blocking(capacity: usize) -> Self {
        Self::new(capacity, Backpressure::Blocking)
    }

    pub fn dropping(capacity: usize, wait: Duration) -> Self {
        Self::new(capacity, Backpressure::DropOnFull { wait })
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueues according to the queue's backpressure policy.
    pub fn push(&self, item: T) -> Result<Offer<T>, QueueError> {
        match self.policy {
            Backpressure::Blocking => self.put(item).map(|()| Offer::Accepted),
            Backpressure::DropOnFull { wait } => self.offer(item, wait),
        }
    }

    /// Enqueues, waiting as long as it takes for a free slot.
    pub fn put(&self, item: T) -> Result<(), QueueError> {
        let mut state = self.lock();
        let epoch = state.epoch;
        loop {
            if state.cancelled(epoch) {
                return Err(QueueError::Closed);
            }
            if state.items.len() < self.capacity {
                state.items.push_back(item);
                self.not_empty.notify_one();
                return Ok(());
            }
            state = self
                .not_full
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Enqueues if a slot frees up within `wait`, otherwise hands the item back.
    pub fn offer(&self, item: T, wait: Duration) -> Result<Offer<T>, QueueError> {
        let deadline = Instant::now() + wait;
        let mut state = self.lock();
        let epoch = state.epoch;
        loop {
            if state.cancelled(epoch) {
                return Err(QueueError::Closed);
            }
            if state.items.len() < self.capacity {
                state.items.push_back(item);
                self.not_empty.notify_one();
                return Ok(Offer::Accepted);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(Offer::Dropped(item));
            }
            let (guard, _) = self
                .not_full
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
        }
    }

    /// Dequeues the oldest item, waiting until one arrives or the queue closes.
    pub fn take(&self) -> Result<T, QueueError> {
        let mut state = self.lock();
        let epoch = state.epoch;
        loop {
            if state.cancelled(epoch) {
                return Err(QueueError::Closed);
            }
            if let Some(item) = state.items.pop_front() {
                self.not_full.notify_one();
                return Ok(item);
            }
            state = self
                .not_empty
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Dequeues the oldest item if one arrives within `wait`.
    pub fn take_timeout(&self, wait: Duration) -> Result<Option<T>, QueueError> {
        let deadline = Instant::now() + wait;
        let mut state = self.lock();
        let epoch = state.epoch;
        loop {
            if state.cancelled(epoch) {
                return Err(QueueError::Closed);
            }
            if let Some(item) = state.items.pop_front() {
                self.not_full.notify_one();
                return Ok(Some(item));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let (guard, _) = self
                .not_empty
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
        }
    }

    /// Discards queued items and cancels every blocked caller. Returns how many items were discarded.
    pub fn close(&self) -> usize {
        let discarded = {
            let mut state = self.lock();
            state.open = false;
            state.epoch = state.epoch.wrapping_add(1);
            let discarded = state.items.len();
            state.items.clear();
            discarded
        };
        self.not_empty.notify_all();
        self.not_full.notify_all();
        discarded
    }

    pub fn reopen(&self) {
        self.lock().open = true;
    }

    pub fn is_open(&self) -> bool {
        self.lock().open
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> Backpressure {
        self.policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn queue_preserves_fifo_order() {
        let queue = ChannelQueue::blocking(4);
        for value in 1..=3 {
            queue.put(value).unwrap();
        }
        assert_eq!(queue.take().unwrap(), 1);
        assert_eq!(queue.take().unwrap(), 2);
        assert_eq!(queue.take().unwrap(), 3);
    }

    #[test]
    fn blocking_put_waits_for_free_slot() {
        let queue = Arc::new(ChannelQueue::blocking(2));
        queue.put(1).unwrap();
        queue.put(2).unwrap();

        let delivered = Arc::new(AtomicBool::new(false));
        let producer = {
            let queue = queue.clone();
            let delivered = delivered.clone();
            thread::spawn(move || {
                let outcome = queue.push(3);
                delivered.store(true, Ordering::SeqCst);
                outcome
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!delivered.load(Ordering::SeqCst));
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.take().unwrap(), 1);
        assert_eq!(producer.join().unwrap(), Ok(Offer::Accepted));
        assert!(delivered.load(Ordering::SeqCst));
        assert_eq!(queue.take().unwrap(), 2);
        assert_eq!(queue.take().unwrap(), 3);
    }

    #[test]
    fn drop_on_full_hands_item_back_after_wait() {
        let queue = ChannelQueue::dropping(1, Duration::from_millis(20));
        assert_eq!(queue.push("first"), Ok(Offer::Accepted));

        let started = Instant::now();
        assert_eq!(queue.push("second"), Ok(Offer::Dropped("second")));
        assert!(started.elapsed() >= Duration::from_millis(20));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn close_wakes_blocked_consumer() {
        let queue: Arc<ChannelQueue<u32>> = Arc::new(ChannelQueue::blocking(2));
        let consumer = {
            let queue = queue.clone();
            thread::spawn(move || queue.take())
        };

        thread::sleep(Duration::from_millis(20));
        queue.close();
        assert_eq!(consumer.join().unwrap(), Err(QueueError::Closed));
    }

    #[test]
    fn close_wakes_blocked_producer_and_discards_items() {
        let queue = Arc::new(ChannelQueue::blocking(1));
        queue.put(7).unwrap();
        let producer = {
            let queue = queue.clone();
            thread::spawn(move || queue.put(8))
        };

        thread::sleep(Duration::from_millis(20));
        assert_eq!(queue.close(), 1);
        assert_eq!(producer.join().unwrap(), Err(QueueError::Closed));
        assert!(queue.is_empty());
    }

    #[test]
    fn closed_queue_accepts_again_after_reopen() {
        let queue = ChannelQueue::blocking(2);
        queue.close();
        assert_eq!(queue.put(1), Err(QueueError::Closed));
        assert_eq!(queue.take_timeout(Duration::from_millis(1)), Err(QueueError::Closed));

        queue.reopen();
        queue.put(2).unwrap();
        assert_eq!(queue.take_timeout(Duration::from_millis(1)), Ok(Some(2)));
        assert_eq!(queue.take_timeout(Duration::from_millis(1)), Ok(None));
    }
}
