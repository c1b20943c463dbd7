//! Storage Disruption Operator
//!
//! Watches storage clusters and their daemons, and keeps each cluster's
//! monitor PodDisruptionBudget at the majority threshold of its quorum.

use clap::Parser;
use kube::Client;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use storage_disruption_operator::{
    crd, ControllerConfig, DisruptionController, Error, KubeResourceStore, KubeWatchSource,
    Metrics, Result,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Storage Disruption Operator - monitor quorum protection for storage clusters
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Namespace to watch (all namespaces when unset or empty)
    #[arg(long, env = "WATCH_NAMESPACE")]
    namespace: Option<String>,

    /// Name of the monitor PodDisruptionBudget
    #[arg(long, env = "BUDGET_NAME", default_value = "mon-pdb")]
    budget_name: String,

    /// `app` label of monitor pods
    #[arg(long, env = "MON_APP", default_value = "storage-mon")]
    mon_app: String,

    /// `app` label of storage daemon deployments
    #[arg(long, env = "OSD_APP", default_value = "storage-osd")]
    osd_app: String,

    /// Maximum concurrent reconcile passes
    #[arg(long, env = "WORKERS", default_value = "4")]
    workers: usize,

    /// Timeout for each API call in seconds
    #[arg(long, env = "STORE_TIMEOUT", default_value = "30")]
    store_timeout_secs: u64,

    /// First requeue delay after a transient failure, in milliseconds
    #[arg(long, env = "INITIAL_BACKOFF_MS", default_value = "500")]
    initial_backoff_ms: u64,

    /// Upper bound on requeue delays in seconds
    #[arg(long, env = "MAX_BACKOFF", default_value = "300")]
    max_backoff_secs: u64,

    /// Health server bind address
    #[arg(long, env = "HEALTH_ADDR", default_value = "0.0.0.0:8081")]
    health_addr: String,

    /// Metrics server bind address
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:8080")]
    metrics_addr: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,

    /// Print the CustomResourceDefinitions as YAML and exit
    #[arg(long)]
    print_crds: bool,
}

impl Args {
    fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            watch_namespace: self.namespace.clone().filter(|ns| !ns.is_empty()),
            budget_name: self.budget_name.clone(),
            mon_app: self.mon_app.clone(),
            osd_app: self.osd_app.clone(),
            workers: self.workers,
            store_timeout: Duration::from_secs(self.store_timeout_secs),
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_secs(self.max_backoff_secs),
            ..Default::default()
        }
    }
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_crds {
        print!("{}", crd::crds_yaml()?);
        return Ok(());
    }

    init_logging(&args)?;

    let config = args.controller_config();
    let health_addr = parse_addr("health", &args.health_addr)?;
    let metrics_addr = parse_addr("metrics", &args.metrics_addr)?;

    info!("Starting Storage Disruption Operator");
    info!("  Version: {}", storage_disruption_operator::VERSION);
    info!("  Namespace: {}", config.watch_namespace.as_deref().unwrap_or("<all>"));
    info!("  Budget: {}", config.budget_name);
    info!("  Workers: {}", config.workers);

    let metrics = Arc::new(Metrics::new()?);
    let ready = Arc::new(AtomicBool::new(false));
    let cancel = CancellationToken::new();

    // Start health server
    tokio::spawn({
        let ready = ready.clone();
        let cancel = cancel.clone();
        async move {
            if let Err(e) = run_health_server(health_addr, ready, cancel).await {
                error!("Health server error: {}", e);
            }
        }
    });

    // Start metrics server
    tokio::spawn({
        let metrics = metrics.clone();
        let cancel = cancel.clone();
        async move {
            if let Err(e) = run_metrics_server(metrics_addr, metrics, cancel).await {
                error!("Metrics server error: {}", e);
            }
        }
    });

    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            shutdown_signal().await;
            info!("Shutdown signal received");
            cancel.cancel();
        }
    });

    let client = Client::try_default().await?;
    info!("Connected to Kubernetes API");

    let store = Arc::new(KubeResourceStore::new(client.clone(), config.store_timeout));
    let source = Arc::new(KubeWatchSource::new(
        client,
        config.watch_namespace.clone(),
        config.osd_app.clone(),
    ));
    let controller = DisruptionController::new(config, store, source, metrics);

    ready.store(true, Ordering::SeqCst);
    controller.run(cancel).await;

    info!("Operator shutdown complete");
    Ok(())
}

fn parse_addr(server: &str, addr: &str) -> Result<SocketAddr> {
    addr.parse()
        .map_err(|e| Error::Configuration(format!("Invalid {} server address {}: {}", server, addr, e)))
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
                return;
            }
            Err(e) => error!("Failed to install SIGTERM handler: {}", e),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for ctrl-c: {}", e);
    }
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) -> Result<()> {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "kube=info", "tower=warn"] {
        let directive = directive
            .parse()
            .map_err(|e| Error::Configuration(format!("Invalid log directive {}: {}", directive, e)))?;
        filter = filter.add_directive(directive);
    }

    let result = if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .try_init()
    };

    result.map_err(|e| Error::Internal(format!("Failed to initialize logging: {}", e)))
}

// =============================================================================
// Health Server
// =============================================================================

fn respond(status: hyper::StatusCode, body: impl Into<hyper::Body>) -> hyper::Response<hyper::Body> {
    let mut response = hyper::Response::new(body.into());
    *response.status_mut() = status;
    response
}

async fn run_health_server(
    addr: SocketAddr,
    ready: Arc<AtomicBool>,
    cancel: CancellationToken,
) -> Result<()> {
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{Body, Request, Server, StatusCode};

    let make_svc = make_service_fn(move |_conn| {
        let ready = ready.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req: Request<Body>| {
                let ready = ready.load(Ordering::SeqCst);
                async move {
                    let response = match req.uri().path() {
                        "/healthz" | "/livez" => respond(StatusCode::OK, "ok"),
                        "/readyz" if ready => respond(StatusCode::OK, "ok"),
                        "/readyz" => respond(StatusCode::SERVICE_UNAVAILABLE, "not ready"),
                        _ => respond(StatusCode::NOT_FOUND, "not found"),
                    };
                    Ok::<_, Infallible>(response)
                }
            }))
        }
    });

    let server = Server::try_bind(&addr)
        .map_err(|e| Error::Internal(format!("Health server bind {}: {}", addr, e)))?;

    info!("Health server listening on {}", addr);
    server
        .serve(make_svc)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(|e| Error::Internal(format!("Health server error: {}", e)))?;

    Ok(())
}

// =============================================================================
// Metrics Server
// =============================================================================

async fn run_metrics_server(
    addr: SocketAddr,
    metrics: Arc<Metrics>,
    cancel: CancellationToken,
) -> Result<()> {
    use hyper::header::{HeaderValue, CONTENT_TYPE};
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{Body, Request, Server, StatusCode};

    let make_svc = make_service_fn(move |_conn| {
        let metrics = metrics.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req: Request<Body>| {
                let metrics = metrics.clone();
                async move {
                    let response = match req.uri().path() {
                        "/metrics" => match metrics.encode() {
                            Ok(text) => {
                                let mut response = respond(StatusCode::OK, text);
                                response.headers_mut().insert(
                                    CONTENT_TYPE,
                                    HeaderValue::from_static(prometheus::TEXT_FORMAT),
                                );
                                response
                            }
                            Err(e) => {
                                error!("Failed to encode metrics: {}", e);
                                respond(StatusCode::INTERNAL_SERVER_ERROR, "metrics unavailable")
                            }
                        },
                        _ => respond(StatusCode::NOT_FOUND, "not found"),
                    };
                    Ok::<_, Infallible>(response)
                }
            }))
        }
    });

    let server = Server::try_bind(&addr)
        .map_err(|e| Error::Internal(format!("Metrics server bind {}: {}", addr, e)))?;

    info!("Metrics server listening on {}", addr);
    server
        .serve(make_svc)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(|e| Error::Internal(format!("Metrics server error: {}", e)))?;

    Ok(())
}
