//! Async event queue underlying both per-endpoint queue disciplines.
//!
//! The stock channel types cannot express everything the two disciplines
//! need from one primitive: the inbound side wants blocking enqueue with
//! backpressure plus selective discard for barge-in, the outbound side wants
//! non-blocking enqueue with drop-oldest eviction. This queue provides all
//! of them over one `VecDeque` guarded by a mutex and a pair of notifiers.
//!
//! Every enqueued event is stamped with a per-queue monotonic sequence,
//! starting at 1. Waiting operations are cancel-safe: an item is only
//! removed once the caller's future actually completes.

use crate::event::StreamEvent;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};

#[derive(Debug)]
struct QueueState {
    items: VecDeque<(u64, Arc<StreamEvent>)>,
    next_seq: u64,
    evicted: u64,
}

/// FIFO queue of [`StreamEvent`]s with optional capacity.
#[derive(Debug)]
pub struct EventQueue {
    state: Mutex<QueueState>,
    capacity: Option<usize>,
    not_empty: Notify,
    not_full: Notify,
}

impl EventQueue {
    /// Creates a queue holding at most `capacity` events.
    pub fn bounded(capacity: usize) -> Self {
        Self::with_capacity(Some(capacity))
    }

    /// Creates a queue with no capacity limit.
    pub fn unbounded() -> Self {
        Self::with_capacity(None)
    }

    /// Creates a queue with the given capacity; `None` means unbounded.
    pub fn with_capacity(capacity: Option<usize>) -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                next_seq: 1,
                evicted: 0,
            }),
            capacity,
            not_empty: Notify::new(),
            not_full: Notify::new(),
        }
    }

    fn has_space(&self, len: usize) -> bool {
        match self.capacity {
            Some(cap) => len < cap,
            None => true,
        }
    }

    /// Enqueues, waiting for space when the queue is full. Returns the
    /// sequence stamped on the event.
    ///
    /// This is the backpressure path: it never drops and never errors on a
    /// full queue. Callers that must remain stoppable race this against a
    /// [`StopSignal`](crate::signal::StopSignal).
    pub async fn push_wait(&self, event: Arc<StreamEvent>) -> u64 {
        let notified = self.not_full.notified();
        tokio::pin!(notified);
        loop {
            notified.as_mut().enable();
            {
                let mut state = self.state.lock().await;
                if self.has_space(state.items.len()) {
                    let seq = state.next_seq;
                    state.next_seq += 1;
                    state.items.push_back((seq, event));
                    drop(state);
                    self.not_empty.notify_one();
                    return seq;
                }
            }
            notified.as_mut().await;
            notified.set(self.not_full.notified());
        }
    }

    /// Enqueues without waiting; when full, the oldest queued event is
    /// evicted to make room. Returns the evicted event, if any.
    pub async fn push_evict(&self, event: Arc<StreamEvent>) -> Option<Arc<StreamEvent>> {
        let mut state = self.state.lock().await;
        let evicted = if !self.has_space(state.items.len()) {
            state.evicted += 1;
            state.items.pop_front().map(|(_, e)| e)
        } else {
            None
        };
        let seq = state.next_seq;
        state.next_seq += 1;
        state.items.push_back((seq, event));
        drop(state);
        self.not_empty.notify_one();
        evicted
    }

    /// Dequeues the next event, waiting until one is available.
    pub async fn pop(&self) -> (u64, Arc<StreamEvent>) {
        let notified = self.not_empty.notified();
        tokio::pin!(notified);
        loop {
            notified.as_mut().enable();
            {
                let mut state = self.state.lock().await;
                if let Some(item) = state.items.pop_front() {
                    drop(state);
                    self.not_full.notify_one();
                    return item;
                }
            }
            notified.as_mut().await;
            notified.set(self.not_empty.notified());
        }
    }

    /// Dequeues without waiting.
    pub async fn try_pop(&self) -> Option<(u64, Arc<StreamEvent>)> {
        let item = self.state.lock().await.items.pop_front();
        if item.is_some() {
            self.not_full.notify_one();
        }
        item
    }

    /// Sequence of the most recently enqueued event, or 0 if none yet.
    pub async fn latest_seq(&self) -> u64 {
        self.state.lock().await.next_seq - 1
    }

    /// Discards every queued event with sequence at or below `marker`.
    /// Returns the number discarded.
    pub async fn discard_through(&self, marker: u64) -> usize {
        let mut state = self.state.lock().await;
        let before = state.items.len();
        state.items.retain(|(seq, _)| *seq > marker);
        let discarded = before - state.items.len();
        drop(state);
        if discarded > 0 {
            self.not_full.notify_one();
        }
        discarded
    }

    /// Discards every queued event. Returns the number discarded.
    pub async fn clear(&self) -> usize {
        let mut state = self.state.lock().await;
        let discarded = state.items.len();
        state.items.clear();
        drop(state);
        if discarded > 0 {
            self.not_full.notify_one();
        }
        discarded
    }

    /// Number of queued events.
    pub async fn len(&self) -> usize {
        self.state.lock().await.items.len()
    }

    /// True when nothing is queued.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Number of events evicted by [`push_evict`](Self::push_evict) so far.
    pub async fn evicted(&self) -> u64 {
        self.state.lock().await.evicted
    }

    /// The configured capacity; `None` means unbounded.
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }
}
