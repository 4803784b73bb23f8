//! app-inspector demo host.
//!
//! Starts a local mock backend, instruments every transport surface, drives
//! a few calls plus a worker panic through them, and prints what the
//! inspector captured as JSON lines.
//!
//! ```text
//!   demo calls ──┬─ middleware (hyper client + InspectorLayer) ─┐
//!                ├─ FetchSlot (reqwest)                         ├──▶ mock backend
//!                └─ RequestObjectSlot (reqwest)                 ┘
//!                          │
//!   worker panic ──▶ panic hook ──┐
//!                          ▼      ▼
//!                        EventStore ──▶ stdout (JSON lines)
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::Path;
use axum::http::{Method, Request, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::{Parser, Subcommand};
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower::{ServiceBuilder, ServiceExt};
use tower_http::trace::TraceLayer;

use app_inspector::config::{load_config, ConfigWatcher, InspectorConfig};
use app_inspector::intercept::{FetchRequest, FetchSlot, RequestObjectSlot, TransportError, TransportResponse};
use app_inspector::observability::{logging::init_logging, metrics::init_metrics};
use app_inspector::{EventFilter, Inspector, TransportTargets};

#[derive(Parser)]
#[command(name = "app-inspector")]
#[command(about = "In-process diagnostic instrumentation demo", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the instrumented demo calls (default)
    Demo {
        /// Calls issued through the middleware surface.
        #[arg(short = 'n', long, default_value_t = 3)]
        requests: u32,

        /// Reload the configuration file when it changes.
        #[arg(long)]
        watch: bool,
    },
    /// Validate the configuration and print the effective settings
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => {
            let mut config = InspectorConfig::default();
            config.store.enabled = true;
            config
        }
    };

    match cli.command.unwrap_or(Commands::Demo {
        requests: 3,
        watch: false,
    }) {
        Commands::CheckConfig => {
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
        Commands::Demo { requests, watch } => run_demo(config, cli.config, requests, watch).await,
    }
}

async fn run_demo(
    config: InspectorConfig,
    config_path: Option<PathBuf>,
    requests: u32,
    watch: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    init_logging(&config.observability)?;
    tracing::info!("app-inspector v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let inspector = Arc::new(Inspector::new(&config));
    let subscription = inspector.subscribe({
        let inspector = inspector.clone();
        move || tracing::debug!(events = inspector.count(), "Event store changed")
    });

    // Hot reload
    let _watcher = match (&config_path, watch) {
        (Some(path), true) => {
            let (watcher, mut updates) = ConfigWatcher::new(path, config.clone());
            let handle = watcher.run()?;
            let inspector = inspector.clone();
            tokio::spawn(async move {
                while let Some(new_config) = updates.recv().await {
                    inspector.apply_config(&new_config);
                }
            });
            Some(handle)
        }
        (None, true) => {
            tracing::warn!("--watch needs --config, hot reload disabled");
            None
        }
        _ => None,
    };

    let (backend_addr, backend) = start_backend().await?;

    let fetch_slot = Arc::new(FetchSlot::reqwest());
    let request_slot = Arc::new(RequestObjectSlot::reqwest());
    let targets = TransportTargets {
        fetch: Some(fetch_slot.clone()),
        request_object: Some(request_slot.clone()),
    };

    if config.failure_hook.enabled {
        inspector.install_failure_hook();
        // The hook replaces the panic handler after a short delay.
        tokio::time::sleep(Duration::from_millis(config.failure_hook.install_delay_ms + 10)).await;
    }
    let installed = inspector.install_all_transports(&targets);
    tracing::info!(surfaces = ?installed, "Transport interceptors installed");

    // Middleware surface
    let client = Client::builder(TokioExecutor::new()).build_http::<Body>();
    let service = ServiceBuilder::new()
        .layer(inspector.middleware_layer())
        .service(client);
    for id in 1..=requests {
        let req = Request::get(format!("http://{}/users/{}", backend_addr, id))
            .header("authorization", "Bearer demo-token")
            .body(Body::empty())?;
        match service.clone().oneshot(req).await {
            Ok(res) => tracing::info!(status = %res.status(), "Middleware call finished"),
            Err(e) => tracing::warn!(error = %e, "Middleware call failed"),
        }
    }

    // Fetch surface
    let order = FetchRequest::parse(Method::POST, &format!("http://{}/orders", backend_addr))?
        .header("x-api-key", "demo-key")?
        .json(&json!({"sku": "widget", "quantity": 2}))?;
    match fetch_slot.fetch(order).await {
        Ok(res) => tracing::info!(status = %res.status, "Fetch call finished"),
        Err(e) => tracing::warn!(error = %e, "Fetch call failed"),
    }
    if let Err(e) = fetch_slot.fetch(FetchRequest::get("http://127.0.0.1:9/unreachable")?).await {
        tracing::info!(error = %e, "Fetch call failed as expected");
    }

    // Request-object surface
    let mut request = request_slot.create()?;
    request.open("GET", &format!("http://{}/health", backend_addr))?;
    request.set_request_header("cookie", "session=demo")?;
    let (done_tx, done_rx) = tokio::sync::oneshot::channel();
    request.send(
        None,
        Box::new(move |result: Result<TransportResponse, TransportError>| {
            let _ = done_tx.send(result.map(|res| res.status));
        }),
    )?;
    match done_rx.await {
        Ok(Ok(status)) => tracing::info!(%status, "Request object finished"),
        Ok(Err(e)) => tracing::warn!(error = %e, "Request object failed"),
        Err(_) => tracing::warn!("Request object completion dropped"),
    }

    // Failure hook
    let worker = std::thread::Builder::new()
        .name("worker".into())
        .spawn(|| panic!("worker lost its database connection"))?;
    if worker.join().is_err() {
        tracing::info!("Worker thread panicked");
    }

    for event in inspector.list(EventFilter::All) {
        println!("{}", serde_json::to_string(event.as_ref())?);
    }

    let restored = inspector.restore_all_transports();
    inspector.restore_failure_hook();
    subscription.unsubscribe();
    backend.abort();

    tracing::info!(surfaces = ?restored, events = inspector.count(), "Shutdown complete");
    Ok(())
}

/// Bind the mock backend on an ephemeral local port.
async fn start_backend() -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
    let app = Router::new()
        .route("/users/{id}", get(get_user))
        .route("/orders", post(create_order))
        .route("/health", get(|| async { "ok" }))
        .layer(TraceLayer::new_for_http());

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tracing::info!(address = %addr, "Mock backend listening");

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "Mock backend stopped");
        }
    });
    Ok((addr, handle))
}

async fn get_user(Path(id): Path<u32>) -> Json<Value> {
    tokio::time::sleep(Duration::from_millis(50)).await;
    Json(json!({"id": id, "name": format!("user-{}", id)}))
}

async fn create_order(Json(order): Json<Value>) -> (StatusCode, Json<Value>) {
    (StatusCode::CREATED, Json(json!({"accepted": true, "order": order})))
}
