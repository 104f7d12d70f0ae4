use clap::Parser; // for cli
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod error;
mod fault;
mod handlers;
mod identity;
mod metrics;
mod models;
mod random;
mod rate_limit;
mod sink;
mod state;
mod worker;

use config::{Args, SinkKind};
use fault::FaultInjector;
use random::{RandomSource, SeededRandom, ThreadRandom};
use rate_limit::RateLimiter;
use sink::{EventSink, MemorySink, QueueOptions, QueueSink, StoreSink};
use state::AppState;

// this is main async function with tokio
#[tokio::main]
async fn main() -> io::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mock_webhook_gateway=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // parse cli arguments
    let args = Args::parse();

    let random: Arc<dyn RandomSource> = match args.fault_seed {
        Some(seed) => {
            info!(seed, "Using seeded random source");
            Arc::new(SeededRandom::new(seed))
        }
        None => Arc::new(ThreadRandom),
    };

    // a sink that cannot connect stays disconnected, the rest keeps serving
    let sink = build_sink(&args).await?;
    let limiter = Arc::new(RateLimiter::new(args.rate_limit, args.rate_window()));

    let fault = FaultInjector::new(args.failure_percent, Arc::clone(&random));
    info!("Failure injection: {}%", fault.failure_percent());

    // creating shared state
    let state = Arc::new(AppState {
        limiter: Arc::clone(&limiter),
        fault,
        sink,
        random,
        limit_send: args.limit_send,
        trust_proxy: args.trust_proxy,
    });

    tokio::spawn(worker::eviction_worker(limiter, args.eviction_interval()));

    let app = handlers::build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("Gateway running on http://localhost:{}", args.port);
    info!(
        "Rate limit: {} requests per {} seconds",
        args.rate_limit, args.rate_window
    );
    info!(sink = ?args.sink, "Event sink configured");
    if args.trust_proxy {
        info!("Client identity taken from X-Forwarded-For / X-Real-IP");
    }

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
}

async fn build_sink(args: &Args) -> io::Result<Arc<dyn EventSink>> {
    let sink: Arc<dyn EventSink> = match args.sink {
        SinkKind::Queue => {
            let options = QueueOptions {
                queue: args.queue_name.clone(),
                durable: args.queue_durable,
                persistent: args.queue_persistent,
                dead_letter: args.dead_letter,
                dead_letter_exchange: args.dead_letter_exchange.clone(),
            };
            Arc::new(QueueSink::connect(&args.amqp_url, options).await)
        }
        SinkKind::Store => {
            let store = StoreSink::connect(&args.database_url, &args.table_name)
                .await
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
            info!(table = store.table(), ready = store.is_ready(), "Store sink configured");
            Arc::new(store)
        }
        SinkKind::Memory => Arc::new(MemorySink::new()),
    };
    Ok(sink)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutting down");
}
