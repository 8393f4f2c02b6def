//! Bounded request queue with admission control.
//!
//! # Responsibilities
//! - Hold accepted requests in FIFO order until a worker takes them
//! - Refuse work with a 503 when full or stopping
//! - Wake workers on readiness and on stop
//!
//! # Design Decisions
//! - One `Mutex` guards the deque and every flag; one `Condvar` carries both signals
//! - Enqueue never blocks on a full queue
//! - Readiness wins over stop until the queue is halted, so accepted work drains
//! - A generation number ties workers to the run that spawned them

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard};
#[cfg(test)]
use std::time::Duration;

use crate::http::context::RequestContext;
use crate::http::response;
use crate::observability::metrics;

/// Outcome of an enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Accepted,
    Rejected,
}

/// What a waiting worker should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    Ready,
    Stop,
}

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<RequestContext>,
    ready: bool,
    stopping: bool,
    halted: bool,
    generation: u64,
}

/// Bounded FIFO shared by the listener (producer) and the workers (consumers).
#[derive(Debug)]
pub struct RequestQueue {
    capacity: usize,
    state: Mutex<QueueState>,
    signal: Condvar,
}

impl RequestQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(QueueState {
                // Nothing is admitted before the first open.
                stopping: true,
                ..QueueState::default()
            }),
            signal: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().expect("request queue mutex poisoned")
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().pending.is_empty()
    }

    /// Start admitting requests for a new run. Returns the run's generation.
    pub fn open(&self) -> u64 {
        let mut state = self.lock();
        state.generation += 1;
        state.stopping = false;
        state.halted = false;
        state.ready = !state.pending.is_empty();
        state.generation
    }

    /// Admit a request, or finalize it with 503 when the queue is full or stopping.
    pub fn enqueue(&self, ctx: RequestContext) -> Admission {
        let mut state = self.lock();
        if state.stopping || state.pending.len() >= self.capacity {
            let stopping = state.stopping;
            drop(state);
            tracing::debug!(
                request_id = %ctx.request_id(),
                path = %ctx.path(),
                stopping,
                "Request rejected"
            );
            reject(ctx);
            return Admission::Rejected;
        }

        state.pending.push_back(ctx);
        state.ready = true;
        metrics::record_queue_depth(state.pending.len());
        drop(state);

        self.signal.notify_one();
        Admission::Accepted
    }

    /// Pop the oldest request. Clears readiness once the queue runs empty.
    pub fn dequeue(&self) -> Option<RequestContext> {
        let mut state = self.lock();
        let ctx = state.pending.pop_front();
        if state.pending.is_empty() {
            state.ready = false;
        }
        metrics::record_queue_depth(state.pending.len());
        ctx
    }

    /// Block until there is work or the run identified by `generation` must end.
    pub fn wait_ready(&self, generation: u64) -> Wake {
        let mut state = self.lock();
        loop {
            if let Some(wake) = Self::wake_for(&state, generation) {
                return wake;
            }
            state = self
                .signal
                .wait(state)
                .expect("request queue mutex poisoned");
        }
    }

    /// As `wait_ready`, giving up after `timeout` with `None`.
    #[cfg(test)]
    fn wait_ready_timeout(&self, generation: u64, timeout: Duration) -> Option<Wake> {
        let state = self.lock();
        let (state, _) = self
            .signal
            .wait_timeout_while(state, timeout, |state| Self::wake_for(state, generation).is_none())
            .expect("request queue mutex poisoned");
        Self::wake_for(&state, generation)
    }

    fn wake_for(state: &QueueState, generation: u64) -> Option<Wake> {
        if state.halted || state.generation != generation {
            return Some(Wake::Stop);
        }
        if state.ready {
            return Some(Wake::Ready);
        }
        if state.stopping {
            return Some(Wake::Stop);
        }
        None
    }

    /// Stop admitting. Workers finish what is queued, then exit.
    pub fn signal_stop(&self) {
        self.lock().stopping = true;
        self.signal.notify_all();
    }

    /// Stop admitting and release every waiting worker immediately.
    pub fn halt(&self) {
        {
            let mut state = self.lock();
            state.stopping = true;
            state.halted = true;
        }
        self.signal.notify_all();
    }

    /// Remove every still-queued request.
    pub fn drain(&self) -> Vec<RequestContext> {
        let mut state = self.lock();
        state.ready = false;
        let drained: Vec<_> = state.pending.drain(..).collect();
        metrics::record_queue_depth(0);
        drained
    }

    /// Drain and answer every leftover request with 503. Returns how many there were.
    pub fn reject_remaining(&self) -> usize {
        let drained = self.drain();
        let count = drained.len();
        for ctx in drained {
            reject(ctx);
        }
        count
    }
}

fn reject(mut ctx: RequestContext) {
    metrics::record_rejected();
    let outcome = response::service_unavailable(&mut ctx).and_then(|()| ctx.finish());
    if let Err(e) = outcome {
        tracing::debug!(request_id = %ctx.request_id(), error = %e, "Could not deliver 503");
    }
}
