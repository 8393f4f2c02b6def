//! Start and stop sequencing.
//!
//! # Responsibilities
//! - Enforce the state machine (`Stopped → Starting → Running → Stopping → Stopped`)
//! - Start: hooks, route preparation, listener, workers, hooks; roll back on failure
//! - Stop: hooks, graceful drain for half the budget, forced close, detach stragglers
//!
//! # Design Decisions
//! - Every wait is bounded by `deadline - now`, clamped at zero
//! - The listener is only closed after the graceful phase; until then new requests get 503
//! - Workers that outlive the deadline are detached; their generation keeps them out of later runs

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::schema::BaseUrl;
use crate::dispatch::queue::RequestQueue;
use crate::dispatch::worker::{Dispatcher, WorkerPool};
use crate::error::ServerError;
use crate::http::context::RequestContext;
use crate::lifecycle::hooks::{HookError, HookStage, Hooks};
use crate::lifecycle::shutdown::ShutdownDeadline;
use crate::lifecycle::state::{ServerState, StateCell};
use crate::net::listener::{Listener, RequestSink};

/// Budget for joining workers after a failed start.
const ROLLBACK_JOIN: Duration = Duration::from_secs(5);

/// Everything a start needs once routes are sealed.
pub struct StartPlan {
    pub base_url: BaseUrl,
    pub threads: usize,
    pub dispatcher: Arc<Dispatcher>,
}

/// Outcome of one stop call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StopReport {
    /// Workers that exited during the graceful phase.
    pub graceful: usize,
    /// Workers that exited after the listener was closed.
    pub forced: usize,
    /// Workers detached at the deadline.
    pub abandoned: usize,
    /// Queued requests answered with 503.
    pub rejected: usize,
    pub elapsed: Duration,
}

/// Coordinates the listener, the request queue and the worker pool.
pub struct Lifecycle {
    state: StateCell,
    hooks: Hooks,
    listener: Box<dyn Listener>,
    queue: Arc<RequestQueue>,
    pool: WorkerPool,
    last_stop: Option<StopReport>,
}

impl Lifecycle {
    pub fn new(listener: Box<dyn Listener>, queue_capacity: usize) -> Self {
        Self {
            state: StateCell::new(),
            hooks: Hooks::new(),
            listener,
            queue: Arc::new(RequestQueue::new(queue_capacity)),
            pool: WorkerPool::new(),
            last_stop: None,
        }
    }

    pub fn state(&self) -> ServerState {
        self.state.get()
    }

    /// Shared view of the state for other threads.
    pub fn state_cell(&self) -> StateCell {
        self.state.clone()
    }

    pub fn queue(&self) -> &Arc<RequestQueue> {
        &self.queue
    }

    pub fn listener(&self) -> &dyn Listener {
        self.listener.as_ref()
    }

    pub fn last_stop(&self) -> Option<StopReport> {
        self.last_stop
    }

    fn require_stopped(&self, operation: &'static str) -> Result<(), ServerError> {
        match self.state.get() {
            ServerState::Stopped => Ok(()),
            state => Err(ServerError::State { operation, state }),
        }
    }

    /// Swap the listener. Only while stopped.
    pub fn replace_listener(&mut self, listener: Box<dyn Listener>) -> Result<(), ServerError> {
        self.require_stopped("replace the listener")?;
        self.listener = listener;
        Ok(())
    }

    /// Swap the queue for one of a different capacity. Only while stopped.
    pub fn resize_queue(&mut self, capacity: usize) -> Result<(), ServerError> {
        self.require_stopped("change the queue capacity")?;
        self.queue = Arc::new(RequestQueue::new(capacity));
        Ok(())
    }

    pub fn add_hook<F>(&mut self, stage: HookStage, hook: F)
    where
        F: FnMut() -> Result<(), HookError> + Send + 'static,
    {
        self.hooks.add(stage, hook);
    }

    /// Start serving. `prepare` runs after the `before_start` hooks and seals routes.
    pub fn start<P>(&mut self, prepare: P) -> Result<(), ServerError>
    where
        P: FnOnce() -> Result<StartPlan, ServerError>,
    {
        self.require_stopped("start")?;
        self.state.set(ServerState::Starting);

        match self.try_start(prepare) {
            Ok(()) => {
                self.state.set(ServerState::Running);
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "Start failed, rolling back");
                self.rollback();
                self.state.set(ServerState::Stopped);
                Err(e)
            }
        }
    }

    fn try_start<P>(&mut self, prepare: P) -> Result<(), ServerError>
    where
        P: FnOnce() -> Result<StartPlan, ServerError>,
    {
        self.hooks.fire(HookStage::BeforeStart)?;
        let plan = prepare()?;

        let generation = self.queue.open();
        let queue = Arc::clone(&self.queue);
        let sink: RequestSink = Arc::new(move |ctx: RequestContext| {
            queue.enqueue(ctx);
        });
        self.listener.open(&plan.base_url, sink)?;

        for _ in 0..plan.threads {
            self.pool
                .spawn_worker(Arc::clone(&self.queue), Arc::clone(&plan.dispatcher), generation)
                .map_err(ServerError::WorkerSpawn)?;
        }

        tracing::info!(
            base_url = %plan.base_url,
            workers = plan.threads,
            queue_capacity = self.queue.capacity(),
            generation,
            "Server started"
        );
        self.hooks.fire(HookStage::AfterStart)?;
        Ok(())
    }

    fn rollback(&mut self) {
        self.queue.halt();
        self.listener.close();
        let remaining = self.pool.join_until(Instant::now().checked_add(ROLLBACK_JOIN));
        if remaining > 0 {
            self.pool.abandon();
        }
        self.queue.reject_remaining();
    }

    /// Stop serving within `timeout`. Does nothing unless running.
    pub fn stop(&mut self, timeout: Duration) -> Result<(), ServerError> {
        if self.state.get() != ServerState::Running {
            return Ok(());
        }
        let deadline = ShutdownDeadline::start(timeout);
        self.state.set(ServerState::Stopping);

        if let Err(e) = self.hooks.fire(HookStage::BeforeStop) {
            self.state.set(ServerState::Running);
            return Err(e.into());
        }

        tracing::info!(timeout_ms = timeout.as_millis() as u64, workers = self.pool.len(), "Stopping server");
        let workers = self.pool.len();
        self.queue.signal_stop();

        let after_graceful = self.pool.join_until(deadline.graceful_deadline());
        self.queue.halt();
        self.listener.close();

        let mut after_forced = after_graceful;
        if after_graceful > 0 {
            tracing::info!(
                workers = after_graceful,
                remaining_ms = ShutdownDeadline::remaining(deadline.deadline()).map(|d| d.as_millis() as u64),
                "Waiting for unresponsive workers"
            );
            after_forced = self.pool.join_until(deadline.deadline());
        }
        let abandoned = self.pool.abandon();
        let rejected = self.queue.reject_remaining();

        let report = StopReport {
            graceful: workers - after_graceful,
            forced: after_graceful - after_forced,
            abandoned,
            rejected,
            elapsed: deadline.elapsed(),
        };
        self.last_stop = Some(report);
        self.state.set(ServerState::Stopped);
        tracing::info!(
            graceful = report.graceful,
            forced = report.forced,
            abandoned = report.abandoned,
            rejected = report.rejected,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Server stopped"
        );

        self.hooks.fire(HookStage::AfterStop)?;
        Ok(())
    }
}
