mod limiter;
mod peers;
mod probe;
mod progress;
mod report;
mod result_store;
mod rpc;
mod select_or_shutdown;
mod types;
mod workers;

use clap::Parser;
use limiter::{Limiter, DEFAULT_CONCURRENCY};
use probe::{IcmpProber, ProbeParams};
use progress::{LogWriter, NoProgress, Progress, TermProgress};
use std::io::{self, IsTerminal};
use std::sync::Arc;
use std::time::Duration;
use tokio::{signal, sync::Notify};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GIT_COMMIT_HASH"), ")");

#[derive(Parser, Debug, Clone)]
#[command(name = "solana-latency-checker", author, version = VERSION, about)]
struct Args {
    /// RPC endpoint, or a cluster name expanded to http://api.<name>.solana.com
    #[arg(long, default_value = "mainnet-beta")]
    url: String,

    #[arg(long, default_value = "10", help = "Number of fastest nodes to print")]
    top: usize,

    #[arg(
        long,
        default_value_t = DEFAULT_CONCURRENCY,
        value_parser = validate_concurrency,
        help = "Maximum number of nodes probed at the same time"
    )]
    concurrency: usize,

    /// Timeout for the getClusterNodes request, in seconds
    #[arg(long, default_value = "30")]
    rpc_timeout: u64,

    #[arg(long, help = "Do not draw the progress bar")]
    no_progress: bool,
}

fn validate_concurrency(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        Ok(_) => Err("concurrency must be at least 1".into()),
        Err(e) => Err(format!("Invalid concurrency '{}': {}", s, e)),
    }
}

#[tokio::main]
async fn main() {
    let log_writer = LogWriter::default();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(log_writer.clone())
        .init();
    let args = Args::parse();

    if let Err(e) = run(args, log_writer).await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args, log_writer: LogWriter) -> Result<(), Box<dyn std::error::Error>> {
    let url = rpc::build_url(&args.url)?;
    info!("Fetching cluster nodes from {}", url);
    let nodes = rpc::get_cluster_nodes(&url, Duration::from_secs(args.rpc_timeout)).await?;

    let shutdown_notify = Arc::new(Notify::new());
    tokio::spawn({
        let interrupt_handle = shutdown_notify.clone();
        async move {
            if let Err(e) = signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
                return;
            }
            // notify_one keeps the permit if the run is not waiting yet
            interrupt_handle.notify_one();
        }
    });

    let limiter = Limiter::new(args.concurrency);
    info!(
        "Probing {} nodes, {} at a time",
        nodes.len(),
        limiter.capacity()
    );
    let params = ProbeParams::default();
    let prober = Arc::new(IcmpProber::new(params));
    let progress: Arc<dyn Progress> = if args.no_progress || !io::stderr().is_terminal() {
        Arc::new(NoProgress)
    } else {
        Arc::new(TermProgress::new(&log_writer))
    };

    let results = workers::check_latency(
        nodes,
        prober,
        params.timeout,
        &limiter,
        progress,
        shutdown_notify,
    )
    .await?;
    debug!(
        "{} nodes answered, peak concurrency {}",
        results.len(),
        limiter.peak()
    );

    if results.is_empty() {
        warn!("No reachable nodes");
        return Ok(());
    }
    if let Err(e) = report::print_result(&mut io::stdout().lock(), &results, args.top) {
        debug!("Failed to write report: {}", e);
    }

    Ok(())
}
