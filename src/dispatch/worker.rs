//! Request processing and the worker threads that drive it.
//!
//! # Responsibilities
//! - Resolve a request to a route handler, a static file or a 404
//! - Contain handler errors and panics to the request that caused them
//! - Finalize every response exactly once
//! - Run a fixed set of OS threads pulling from the request queue
//!
//! # Design Decisions
//! - Workers are plain named threads; handlers are synchronous and may block
//! - A failure while writing the 500 degrades to setting the bare status
//! - Joining uses deadlines; a worker that will not return is detached, not killed

use axum::http::{header, Method, StatusCode};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::config::runtime::{RuntimeSettings, SharedSettings};
use crate::dispatch::queue::{RequestQueue, Wake};
use crate::dispatch::static_files;
use crate::http::context::RequestContext;
use crate::http::response;
use crate::observability::metrics;
use crate::routing::router::{HandlerError, HandlerResult, RouteTable};

const JOIN_POLL: Duration = Duration::from_millis(5);

/// Processes single requests against a sealed route table.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    routes: RouteTable,
    settings: Arc<SharedSettings>,
}

impl Dispatcher {
    pub fn new(routes: RouteTable, settings: Arc<SharedSettings>) -> Self {
        Self { routes, settings }
    }

    /// Process one request to completion. Never panics on handler failure.
    pub fn dispatch(&self, mut ctx: RequestContext, worker: usize) {
        let span = tracing::info_span!(
            "request",
            request_id = %ctx.request_id(),
            method = %ctx.method(),
            path = %ctx.path(),
            worker,
        );
        let _enter = span.enter();

        let settings = self.settings.load();
        if let Some(server) = settings.server_header.as_deref() {
            if let Err(e) = ctx.response_mut().set_header(header::SERVER.as_str(), server) {
                tracing::warn!(error = %e, "Could not apply Server header");
            }
        }

        match catch_unwind(AssertUnwindSafe(|| self.route(&mut ctx, &settings))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Handler failed");
                metrics::record_handler_failure("error");
                fail(&mut ctx);
            }
            Err(panic) => {
                tracing::error!(panic = %panic_message(panic.as_ref()), "Handler panicked");
                metrics::record_handler_failure("panic");
                fail(&mut ctx);
            }
        }

        let status = ctx.response().status();
        if !ctx.response().is_finished() {
            if let Err(e) = ctx.finish() {
                tracing::debug!(error = %e, "Response not delivered");
            }
        }
        metrics::record_request(ctx.method().as_str(), status.as_u16(), ctx.elapsed());
        tracing::debug!(status = status.as_u16(), elapsed_ms = ctx.elapsed().as_millis() as u64, "Request finished");
    }

    fn route(&self, ctx: &mut RequestContext, settings: &RuntimeSettings) -> HandlerResult {
        if let Some((entry, matched)) = self.routes.resolve(ctx.method(), ctx.path()) {
            tracing::trace!(pattern = %entry.pattern.as_str(), "Route matched");
            return (entry.invoker)(ctx, &matched);
        }

        if ctx.method() == Method::GET {
            if let Some(file) = static_files::resolve(&settings.web_root, &settings.dir_index, ctx.path()) {
                return response::send_file(ctx, &file).map_err(HandlerError::from);
            }
        }

        response::not_found(ctx)?;
        Ok(())
    }
}

fn fail(ctx: &mut RequestContext) {
    let written = ctx
        .response_mut()
        .reset()
        .and_then(|()| response::internal_server_error(ctx));
    if let Err(nested) = written {
        tracing::warn!(error = %nested, "Nested failure: could not serve 500");
        ctx.response_mut().force_status(StatusCode::INTERNAL_SERVER_ERROR);
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

struct Worker {
    name: String,
    handle: JoinHandle<()>,
}

/// Fixed set of worker threads for one run of the server.
#[derive(Default)]
pub struct WorkerPool {
    workers: Vec<Worker>,
}

impl WorkerPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn one more worker bound to the queue's `generation`.
    pub fn spawn_worker(
        &mut self,
        queue: Arc<RequestQueue>,
        dispatcher: Arc<Dispatcher>,
        generation: u64,
    ) -> std::io::Result<()> {
        let id = self.workers.len();
        let name = format!("dispatch-worker-{id}");
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || run(id, &queue, &dispatcher, generation))?;
        self.workers.push(Worker { name, handle });
        Ok(())
    }

    /// Workers not yet joined.
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Join every worker that exits before `deadline` (`None` waits for all of them).
    /// Returns how many are still running.
    pub fn join_until(&mut self, deadline: Option<Instant>) -> usize {
        loop {
            let (finished, running): (Vec<_>, Vec<_>) =
                self.workers.drain(..).partition(|w| w.handle.is_finished());
            self.workers = running;
            for worker in finished {
                if worker.handle.join().is_err() {
                    tracing::warn!(worker = %worker.name, "Worker thread panicked");
                }
            }

            if self.workers.is_empty() {
                return 0;
            }
            let mut pause = JOIN_POLL;
            if let Some(deadline) = deadline {
                let now = Instant::now();
                if now >= deadline {
                    return self.workers.len();
                }
                pause = pause.min(deadline - now);
            }
            thread::sleep(pause);
        }
    }

    /// Detach every worker still running. Returns how many were abandoned.
    pub fn abandon(&mut self) -> usize {
        let abandoned = self.workers.len();
        for worker in self.workers.drain(..) {
            tracing::warn!(worker = %worker.name, "Abandoning unresponsive worker thread");
        }
        if abandoned > 0 {
            metrics::record_workers_abandoned(abandoned);
        }
        abandoned
    }
}

fn run(id: usize, queue: &RequestQueue, dispatcher: &Dispatcher, generation: u64) {
    tracing::debug!(worker = id, generation, "Worker started");
    loop {
        if queue.wait_ready(generation) == Wake::Stop {
            break;
        }
        let Some(ctx) = queue.dequeue() else {
            continue;
        };
        dispatcher.dispatch(ctx, id);
    }
    tracing::debug!(worker = id, generation, "Worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::ResponseHandle;
    use crate::routing::matcher::{RouteMatch, RouteMethod};
    use crate::routing::router::invoker;
    use axum::http::Request;
    use bytes::Bytes;
    use std::path::Path;

    fn settings(web_root: &Path) -> Arc<SharedSettings> {
        Arc::new(SharedSettings::new(RuntimeSettings {
            server_header: Some("Ponies/1.0".into()),
            web_root: web_root.to_path_buf(),
            dir_index: "index.html".into(),
        }))
    }

    fn request(method: Method, path: &str) -> (RequestContext, ResponseHandle) {
        let request = Request::builder().method(method).uri(path).body(Bytes::new()).unwrap();
        RequestContext::from_request(request)
    }

    fn dispatcher(web_root: &Path) -> Dispatcher {
        let mut table = RouteTable::new();
        table
            .add(
                Method::GET.into(),
                "/hello/(?<name>[^/]+)",
                invoker(|ctx: &mut RequestContext, m: &RouteMatch| -> HandlerResult {
                    let name = m.value("name")?.to_string();
                    ctx.response_mut().send_text(&format!("hello, {name}"))?;
                    Ok(())
                }),
            )
            .unwrap();
        table
            .add(
                RouteMethod::Any,
                "/fail",
                invoker(|ctx: &mut RequestContext, _m: &RouteMatch| -> HandlerResult {
                    ctx.response_mut().set_header("x-partial", "yes")?;
                    ctx.response_mut().send_bytes("text/html", "<p>half")?;
                    Err("boom".into())
                }),
            )
            .unwrap();
        table
            .add(
                RouteMethod::Any,
                "/panic",
                invoker(|ctx: &mut RequestContext, _m: &RouteMatch| -> HandlerResult {
                    ctx.response_mut().write(b"partial")?;
                    panic!("handler blew up");
                }),
            )
            .unwrap();
        table
            .add(
                RouteMethod::Any,
                "/finished-then-fail",
                invoker(|ctx: &mut RequestContext, _m: &RouteMatch| -> HandlerResult {
                    ctx.response_mut().send_text("done")?;
                    ctx.finish()?;
                    Err("late failure".into())
                }),
            )
            .unwrap();
        table.seal();
        Dispatcher::new(table, settings(web_root))
    }

    #[test]
    fn route_handler_runs() {
        let root = tempfile::tempdir().unwrap();
        let (ctx, handle) = request(Method::GET, "/hello/world");
        dispatcher(root.path()).dispatch(ctx, 0);

        let response = handle.wait().unwrap();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.text(), "hello, world");
        assert_eq!(response.headers.get(header::SERVER).unwrap(), "Ponies/1.0");
    }

    #[test]
    fn static_fallback_and_not_found() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("subdir")).unwrap();
        std::fs::write(root.path().join("subdir/file1.txt"), b"exact bytes\n").unwrap();
        let dispatcher = dispatcher(root.path());

        let (ctx, handle) = request(Method::GET, "/subdir/file1.txt");
        dispatcher.dispatch(ctx, 0);
        let response = handle.wait().unwrap();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(&response.body[..], b"exact bytes\n");

        let (ctx, handle) = request(Method::POST, "/subdir/file1.txt");
        dispatcher.dispatch(ctx, 0);
        assert_eq!(handle.wait().unwrap().status, StatusCode::NOT_FOUND);

        let (ctx, handle) = request(Method::GET, "/subdir");
        dispatcher.dispatch(ctx, 0);
        assert_eq!(handle.wait().unwrap().status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn failures_become_500_and_next_request_succeeds() {
        let root = tempfile::tempdir().unwrap();
        let dispatcher = dispatcher(root.path());

        for path in ["/fail", "/panic"] {
            let (ctx, handle) = request(Method::GET, path);
            dispatcher.dispatch(ctx, 0);
            let response = handle.wait().unwrap();
            assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(response.text(), "Internal Server Error");
            assert!(response.headers.get("x-partial").is_none());
            assert_eq!(response.headers[header::CONTENT_TYPE], "text/plain; charset=utf-8");
            assert_eq!(response.headers[header::SERVER], "Ponies/1.0");
        }

        let (ctx, handle) = request(Method::GET, "/hello/again");
        dispatcher.dispatch(ctx, 0);
        assert_eq!(handle.wait().unwrap().text(), "hello, again");
    }

    #[test]
    fn failure_after_finish_keeps_delivered_response() {
        let root = tempfile::tempdir().unwrap();
        let (ctx, handle) = request(Method::GET, "/finished-then-fail");
        dispatcher(root.path()).dispatch(ctx, 0);

        let response = handle.wait().unwrap();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.text(), "done");
    }

    #[test]
    fn pool_drains_queue_then_exits() {
        let root = tempfile::tempdir().unwrap();
        let queue = Arc::new(RequestQueue::new(16));
        let generation = queue.open();
        let dispatcher = Arc::new(dispatcher(root.path()));

        let mut pool = WorkerPool::new();
        for _ in 0..3 {
            pool.spawn_worker(queue.clone(), dispatcher.clone(), generation).unwrap();
        }
        assert_eq!(pool.len(), 3);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let (ctx, handle) = request(Method::GET, &format!("/hello/{i}"));
                queue.enqueue(ctx);
                handle
            })
            .collect();
        queue.signal_stop();

        let remaining = pool.join_until(Some(Instant::now() + Duration::from_secs(5)));
        assert_eq!(remaining, 0);
        for (i, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.wait().unwrap().text(), format!("hello, {i}"));
        }
    }

    #[test]
    fn stuck_worker_is_abandoned() {
        let root = tempfile::tempdir().unwrap();
        let queue = Arc::new(RequestQueue::new(4));
        let generation = queue.open();

        let mut table = RouteTable::new();
        table
            .add(
                RouteMethod::Any,
                "/slow",
                invoker(|_ctx: &mut RequestContext, _m: &RouteMatch| -> HandlerResult {
                    thread::sleep(Duration::from_millis(500));
                    Ok(())
                }),
            )
            .unwrap();
        table.seal();
        let dispatcher = Arc::new(Dispatcher::new(table, settings(root.path())));

        let mut pool = WorkerPool::new();
        pool.spawn_worker(queue.clone(), dispatcher, generation).unwrap();
        let (ctx, _handle) = request(Method::GET, "/slow");
        queue.enqueue(ctx);
        thread::sleep(Duration::from_millis(50));
        queue.halt();

        let started = Instant::now();
        assert_eq!(pool.join_until(Some(Instant::now() + Duration::from_millis(50))), 1);
        assert!(started.elapsed() < Duration::from_millis(400));
        assert_eq!(pool.abandon(), 1);
        assert!(pool.is_empty());
    }
}
