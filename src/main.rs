//! Binary entry point: CLI parsing, logging setup, route registration, and
//! engine selection.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use httpforge::server::ConnectionHandler;
use httpforge::{
    load_config, Engine, EngineKind, Metrics, ReactorEngine, Response, Router, ServerConfig,
    SingleThreadEngine, ThreadPerConnEngine, ThreadPoolEngine,
};

#[derive(Debug, Parser)]
#[command(name = "httpforge", about = "HTTP/1.1 server with pluggable concurrency engines")]
struct Cli {
    /// Concurrency engine to run.
    #[arg(value_enum, default_value = "thread")]
    engine: EngineKind,

    /// Override the configured listen port.
    #[arg(short, long)]
    port: Option<u16>,

    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();
    init_tracing();

    let mut config = match &cli.config {
        Some(path) => match load_config(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "failed to load configuration");
                process::exit(1);
            }
        },
        None => ServerConfig::default(),
    };

    if let Some(port) = cli.port {
        apply_port_override(&mut config, port);
    }

    let metrics = Arc::new(Metrics::new());
    let router = Arc::new(build_router(Arc::clone(&metrics)));

    let idle_timeout = Duration::from_millis(config.timeouts.idle_ms);
    let grace = Duration::from_millis(config.shutdown.grace_ms);
    let handler = ConnectionHandler::new(Arc::clone(&router), Arc::clone(&metrics), idle_timeout);
    let bind_address = config.listener.bind_address.clone();

    let engine: Arc<dyn Engine> = match cli.engine {
        EngineKind::Single => Arc::new(SingleThreadEngine::new(bind_address, handler)),
        EngineKind::Thread => Arc::new(ThreadPerConnEngine::new(bind_address, handler, grace)),
        EngineKind::Pool => Arc::new(ThreadPoolEngine::new(
            bind_address,
            handler,
            config.pool.clone(),
            grace,
        )),
        EngineKind::Reactor => Arc::new(ReactorEngine::new(
            bind_address,
            router,
            metrics,
            config.reactor.worker_threads,
            config.reactor.queue_capacity,
            grace,
        )),
    };

    let shutdown_engine = Arc::clone(&engine);
    if let Err(e) = ctrlc::set_handler(move || {
        tracing::info!("shutdown signal received");
        shutdown_engine.stop();
    }) {
        tracing::error!(error = %e, "failed to install shutdown handler");
        process::exit(1);
    }

    tracing::info!(engine = %engine.name(), "starting");
    if let Err(e) = engine.start() {
        tracing::error!(error = %e, "server failed");
        process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// `--port` replaces only the port of the configured bind address.
fn apply_port_override(config: &mut ServerConfig, port: u16) {
    match config.listener.bind_address.parse::<SocketAddr>() {
        Ok(mut addr) => {
            addr.set_port(port);
            config.listener.bind_address = addr.to_string();
        }
        Err(e) => {
            tracing::error!(
                address = %config.listener.bind_address,
                error = %e,
                "invalid bind address, cannot apply port override"
            );
            process::exit(1);
        }
    }
}

/// Built-in routes shared by every engine.
fn build_router(metrics: Arc<Metrics>) -> Router {
    let mut router = Router::new();

    router.register("GET", "/", |_request| {
        Response::ok("Welcome to HTTPForge!\n")
    });

    router.register("GET", "/hello", |_request| {
        // Simulate a DB call.
        thread::sleep(Duration::from_millis(20));
        Response::ok("Hello, World!\n")
    });

    router.register("GET", "/echo", |request| {
        Response::ok(format!(
            "Method: {}\nPath: {}\nHeaders: {}\n",
            request.method(),
            request.path(),
            request.header_count()
        ))
    });

    router.register("POST", "/data", |request| {
        Response::ok(format!("Received POST data:\n{}", request.body()))
    });

    router.register("GET", "/metrics", move |_request| {
        match serde_json::to_string_pretty(&metrics.snapshot()) {
            Ok(json) => Response::builder()
                .status(200, "OK")
                .header("Content-Type", "application/json")
                .body(json)
                .build(),
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize metrics snapshot");
                Response::internal_server_error()
            }
        }
    });

    router
}
