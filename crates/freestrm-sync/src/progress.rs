//! Progress bus of one run
//!
//! Keeps the most recent records in a bounded ring buffer and fans every new
//! record out to live subscribers. A subscriber first receives the buffered
//! history, then live records; its stream ends right after a terminal record
//! (`done`, or an error without a file path). Once a terminal record has been
//! published the bus is closed and further records are dropped.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use freestrm_core::domain::progress::ProgressEvent;
use tokio::sync::mpsc;

/// Receiving end of a subscription
pub type ProgressReceiver = mpsc::UnboundedReceiver<ProgressEvent>;

#[derive(Debug)]
struct BusState {
    log: VecDeque<ProgressEvent>,
    subscribers: Vec<mpsc::UnboundedSender<ProgressEvent>>,
    closed: bool,
}

#[derive(Debug)]
pub struct ProgressBus {
    capacity: usize,
    state: Mutex<BusState>,
}

impl ProgressBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(BusState {
                log: VecDeque::new(),
                subscribers: Vec::new(),
                closed: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Publish `event`. Returns `false` when the bus is already closed.
    pub fn publish(&self, event: ProgressEvent) -> bool {
        let mut state = self.lock();
        if state.closed {
            return false;
        }
        if state.log.len() == self.capacity {
            state.log.pop_front();
        }
        state.log.push_back(event.clone());
        state.subscribers.retain(|tx| tx.send(event.clone()).is_ok());

        if event.is_terminal() {
            state.closed = true;
            // Dropping the senders ends every stream after this record.
            state.subscribers.clear();
        }
        true
    }

    /// Publish a terminal record unless one was already published.
    pub fn finish(&self, event: ProgressEvent) -> bool {
        debug_assert!(event.is_terminal());
        self.publish(event)
    }

    /// Subscribe: buffered history first, then live records.
    pub fn subscribe(&self) -> ProgressReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.lock();
        for event in &state.log {
            let _ = tx.send(event.clone());
        }
        if !state.closed {
            state.subscribers.push(tx);
        }
        rx
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Snapshot of the buffered records.
    pub fn history(&self) -> Vec<ProgressEvent> {
        self.lock().log.iter().cloned().collect()
    }

    /// Most recent record, if any.
    pub fn last(&self) -> Option<ProgressEvent> {
        self.lock().log.back().cloned()
    }
}
