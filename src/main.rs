//! dispatch-server binary.
//!
//! Loads a TOML configuration, registers a small demo resource, serves until
//! Ctrl-C (or SIGTERM) and then stops with the configured shutdown timeout.

use axum::http::{Method, StatusCode};
use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

use dispatch_server::config::{load_config, ServerConfig};
use dispatch_server::http::response;
use dispatch_server::lifecycle::signals::wait_for_shutdown_signal;
use dispatch_server::observability::logging::init_logging;
use dispatch_server::{
    AutoResource, HandlerResult, RequestContext, Resource, RouteDescriptor, RouteMatch, Server,
};

#[derive(Parser)]
#[command(name = "dispatch-server")]
#[command(about = "Embeddable HTTP request-dispatch server", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Reload runtime settings when the configuration file changes
    #[arg(short, long, requires = "config")]
    watch: bool,

    /// Override the configured host
    #[arg(long)]
    host: Option<String>,

    /// Override the configured port
    #[arg(short, long)]
    port: Option<String>,
}

/// Greets by name and adds numbers; shows path captures and query parameters.
struct Demo;

#[derive(Serialize)]
struct Sum {
    a: i64,
    b: i64,
    sum: i64,
}

impl Demo {
    fn hello(&self, ctx: &mut RequestContext, m: &RouteMatch) -> HandlerResult {
        let name = m.value("name")?.to_string();
        ctx.response_mut().send_text(&format!("Hello, {name}!"))?;
        Ok(())
    }

    fn add(&self, ctx: &mut RequestContext, _m: &RouteMatch) -> HandlerResult {
        let parsed = ctx
            .query_param::<i64>("a")
            .and_then(|a| Ok((a, ctx.query_param_or::<i64>("b", 0)?)));
        match parsed {
            Ok((a, b)) => ctx.response_mut().send_json(&Sum { a, b, sum: a + b })?,
            Err(e) => response::bad_request(ctx, &e)?,
        }
        Ok(())
    }

    fn echo(&self, ctx: &mut RequestContext, _m: &RouteMatch) -> HandlerResult {
        let body = ctx.body().clone();
        let response = ctx.response_mut();
        response.set_status(StatusCode::OK)?;
        response.send_bytes("application/octet-stream", body.to_vec())?;
        Ok(())
    }
}

impl Resource for Demo {
    fn routes(self: Arc<Self>) -> Vec<RouteDescriptor> {
        vec![
            RouteDescriptor::bound(Method::GET, "^/hello/(?<name>[^/]+)$", &self, Demo::hello),
            RouteDescriptor::bound(Method::GET, "^/add$", &self, Demo::add),
            RouteDescriptor::bound(Method::POST, "^/echo$", &self, Demo::echo),
        ]
    }
}

/// Liveness probe, registered at link time.
struct Status;

impl Resource for Status {
    fn routes(self: Arc<Self>) -> Vec<RouteDescriptor> {
        vec![RouteDescriptor::get("^/status$", |ctx: &mut RequestContext, _m: &RouteMatch| {
            ctx.response_mut().send_text("OK")?;
            Ok(())
        })
        .with_priority(100)]
    }
}

inventory::submit! {
    AutoResource::new("status", || Arc::new(Status))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }

    if let Err(e) = init_logging(&config.logging) {
        eprintln!("logging already initialized: {e}");
    }
    tracing::info!("dispatch-server v{} starting", env!("CARGO_PKG_VERSION"));

    let mut server = Server::with_config(config)?;
    server.add_resource(Arc::new(Demo))?;
    server.on_after_start(|| {
        tracing::info!("Accepting requests; press Ctrl-C to stop");
        Ok(())
    });

    let _watcher = match (&cli.config, cli.watch) {
        (Some(path), true) => Some(server.watch_config(path)?),
        _ => None,
    };

    server.start()?;
    tracing::info!(
        base_url = %server.base_url(),
        address = ?server.local_addr(),
        web_root = %server.web_root().display(),
        "Configuration loaded"
    );

    wait_for_shutdown_signal()?;
    server.stop()?;

    tracing::info!("Shutdown complete");
    Ok(())
}
