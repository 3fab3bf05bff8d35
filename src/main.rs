use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use accessprof::{AccessProf, AggregationPatterns, ProfilerConfig};
use clap::Parser;
use tower_http::cors::CorsLayer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod demo_handlers;
mod load_generator;

/// Demo server: a few toy endpoints wrapped by the profiler, with the
/// report mounted next to them.
#[derive(Debug, Parser)]
#[command(name = "accessprof-demo", version)]
struct Args {
    /// Address to listen on
    #[arg(long, env = "ACCESSPROF_ADDR", default_value = "0.0.0.0:3000")]
    addr: String,

    /// Append-only log file; omit to keep everything in memory
    #[arg(long, env = "ACCESSPROF_LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Buffered requests before a background flush (0 = default)
    #[arg(long, env = "ACCESSPROF_FLUSH_THRESHOLD", default_value_t = 0)]
    flush_threshold: usize,

    /// Where the report endpoints are mounted
    #[arg(long, env = "ACCESSPROF_REPORT_PATH", default_value = "/accessprof")]
    report_path: String,

    /// Concurrent synthetic-traffic workers (0 disables the generator)
    #[arg(long, env = "ACCESSPROF_LOAD_WORKERS", default_value_t = 0)]
    load_workers: u32,

    /// How long the generator runs, in seconds
    #[arg(long, env = "ACCESSPROF_LOAD_SECS", default_value_t = 5)]
    load_secs: u64,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,accessprof=debug")),
        )
        .init();

    let args = Args::parse();

    // ── 1. Build the profiler ────────────────────────────────────
    let mut config = ProfilerConfig::default().flush_threshold(args.flush_threshold);
    config.log_file = args.log_file.clone();
    let prof = AccessProf::new(config);

    // ── 2. Build Axum router ─────────────────────────────────────
    let app = accessprof::instrument(demo_handlers::router(), prof.clone())
        .nest(&args.report_path, accessprof::report_router(prof.clone()))
        .layer(CorsLayer::permissive());

    // ── 3. Optional synthetic traffic ────────────────────────────
    if args.load_workers > 0 {
        let running = Arc::new(AtomicBool::new(true));
        let traffic = demo_handlers::router();
        let traffic = accessprof::instrument(traffic, prof.clone());
        let prof = prof.clone();
        let (workers, secs) = (args.load_workers, args.load_secs);
        tokio::spawn(async move {
            load_generator::run(traffic, running, workers, secs).await;
            let report = tokio::task::spawn_blocking(move || {
                let patterns = AggregationPatterns::compile(demo_handlers::AGGREGATES)?;
                prof.report(&patterns)
            })
            .await;
            match report {
                Ok(Ok(report)) => info!("load finished\n{report}"),
                Ok(Err(err)) => error!(error = %err, "failed to build report"),
                Err(err) => error!(error = %err, "report task panicked"),
            }
        });
    }

    // ── 4. Bind & serve ──────────────────────────────────────────
    let listener = match tokio::net::TcpListener::bind(&args.addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!(addr = %args.addr, error = %err, "failed to bind");
            std::process::exit(1);
        }
    };

    info!(addr = %args.addr, report = %args.report_path, log_file = ?args.log_file, "profiler demo listening");

    if let Err(err) = axum::serve(listener, app).await {
        error!(error = %err, "server exited with error");
    }
}
