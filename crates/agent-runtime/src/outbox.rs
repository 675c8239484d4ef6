//! Outgoing event queue shared by the HTTP tracing backends.
//!
//! Closed traces are queued here until the next flush. A batch taken for
//! delivery goes back to the front of the queue unless it is marked
//! delivered, so a failed request or a flush future dropped mid-request
//! loses nothing. The queue is capped; the oldest events go first.

use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::Value;

pub const DEFAULT_OUTBOX_CAPACITY: usize = 10_000;

pub struct Outbox {
    backend: &'static str,
    capacity: usize,
    pending: Mutex<Vec<Value>>,
}

impl Outbox {
    pub fn new(backend: &'static str, capacity: usize) -> Self {
        Self {
            backend,
            capacity: capacity.max(1),
            pending: Mutex::new(Vec::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Value>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of queued events
    pub fn pending(&self) -> usize {
        self.lock().len()
    }

    /// Queue events behind whatever is already pending
    pub fn push(&self, events: impl IntoIterator<Item = Value>) {
        let mut pending = self.lock();
        pending.extend(events);
        self.trim(&mut pending);
    }

    /// Take everything pending for delivery
    pub fn begin(&self) -> Option<InFlight<'_>> {
        let events = std::mem::take(&mut *self.lock());
        if events.is_empty() {
            return None;
        }
        Some(InFlight {
            outbox: self,
            events,
            delivered: false,
        })
    }

    fn requeue(&self, events: Vec<Value>) {
        let mut pending = self.lock();
        let newer = std::mem::replace(&mut *pending, events);
        pending.extend(newer);
        self.trim(&mut pending);
        tracing::debug!(backend = self.backend, events = pending.len(), "Undelivered events requeued");
    }

    fn trim(&self, pending: &mut Vec<Value>) {
        if pending.len() > self.capacity {
            let dropped = pending.len() - self.capacity;
            pending.drain(..dropped);
            tracing::warn!(backend = self.backend, dropped, "Tracing outbox full; oldest events dropped");
        }
    }
}

/// A batch on its way out
pub struct InFlight<'a> {
    outbox: &'a Outbox,
    events: Vec<Value>,
    delivered: bool,
}

impl InFlight<'_> {
    pub fn events(&self) -> &[Value] {
        &self.events
    }

    pub fn delivered(mut self) {
        self.delivered = true;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.delivered {
            self.outbox.requeue(std::mem::take(&mut self.events));
        }
    }
}
