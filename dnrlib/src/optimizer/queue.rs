use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use std::collections::VecDeque;

#[derive(Debug)]
struct QueueState<T> {
    items: VecDeque<T>,
    closed: bool,
    pushed: usize,
    /// Items pushed out by newer ones while the queue was full.
    dropped: usize,
    /// Items skipped because a newer one was already waiting.
    coalesced: usize,
}

/// Counters of a [`CandidateQueue`].
#[derive(Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    pub pushed: usize,
    pub dropped: usize,
    pub coalesced: usize,
}

/// Bounded hand-off from one producer that never blocks to one consumer that only wants the
/// latest item.
#[derive(Debug)]
pub struct CandidateQueue<T> {
    state: Mutex<QueueState<T>>,
    available: Condvar,
    capacity: usize,
}

impl<T> CandidateQueue<T> {
    pub fn new(capacity: usize) -> Self {
        CandidateQueue {
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity.max(1)),
                closed: false,
                pushed: 0,
                dropped: 0,
                coalesced: 0,
            }),
            available: Condvar::new(),
            capacity: capacity.max(1),
        }
    }

    /// Add an item, dropping the oldest one if the queue is full.
    /// Returns false if the queue is closed.
    pub fn push(&self, item: T) -> bool {
        let mut state = self.state.lock();
        if state.closed {
            return false;
        }
        if state.items.len() >= self.capacity {
            state.items.pop_front();
            state.dropped += 1;
        }
        state.items.push_back(item);
        state.pushed += 1;
        drop(state);
        self.available.notify_one();
        true
    }

    /// Block until an item is available and return the most recent one, discarding the others.
    /// Returns None once the queue is closed and empty.
    pub fn pop_latest(&self) -> Option<T> {
        let mut state = self.state.lock();
        loop {
            if let Some(latest) = state.items.pop_back() {
                let skipped = state.items.len();
                state.items.clear();
                state.coalesced += skipped;
                return Some(latest);
            }
            if state.closed {
                return None;
            }
            self.available.wait(&mut state);
        }
    }

    /// Reject further pushes and wake the consumer. Waiting items can still be popped.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.available.notify_all();
    }

    pub fn stats(&self) -> QueueStats {
        let state = self.state.lock();
        QueueStats {
            pushed: state.pushed,
            dropped: state.dropped,
            coalesced: state.coalesced,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn pops_only_the_latest() {
        let queue = CandidateQueue::new(4);
        for i in 0..3 {
            assert!(queue.push(i));
        }
        assert_eq!(queue.pop_latest(), Some(2));
        assert_eq!(
            queue.stats(),
            QueueStats {
                pushed: 3,
                dropped: 0,
                coalesced: 2
            }
        );
    }

    #[test]
    fn full_queue_drops_the_oldest() {
        let queue = CandidateQueue::new(2);
        for i in 0..5 {
            queue.push(i);
        }
        assert_eq!(queue.stats().dropped, 3);
        queue.close();
        assert!(!queue.push(9));
        assert_eq!(queue.pop_latest(), Some(4));
        assert_eq!(queue.pop_latest(), None);
    }

    #[test]
    fn consumer_wakes_up_on_close() {
        let queue = Arc::new(CandidateQueue::<usize>::new(1));
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                let mut seen = Vec::new();
                while let Some(item) = queue.pop_latest() {
                    seen.push(item);
                }
                seen
            })
        };
        queue.push(1);
        queue.close();
        let seen = consumer.join().unwrap();
        assert_eq!(seen, vec![1]);
    }
}
