use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use prometheus::{Registry, TextEncoder};
use tracing::{error, info, warn};

use mongoload_core::{DocumentClient, ReportingSink, Result, Settings, WorkloadError};
use mongoload_driver::MongoClient;
use mongoload_worker::{
    Environment, FanoutSink, PrometheusSink, ReportFormat, ReportWriter, RunnerConfig,
    StatsCollector, WorkloadRunner,
};

mod orders;
mod telemetry;

use orders::OrdersWorkload;

#[derive(Parser, Debug)]
#[command(name = "mongoload")]
#[command(about = "MongoDB load generator", long_about = None)]
#[command(version)]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the orders workload against the configured cluster
    Run(RunArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Settings file; replaces the default lookup of ./config/mongoload
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of concurrent simulated users
    #[arg(long, default_value_t = 10)]
    users: usize,

    /// Run time in seconds
    #[arg(long, default_value_t = 60)]
    run_time: u64,

    /// Seed for task selection
    #[arg(long)]
    seed: Option<u64>,

    /// Write the report here instead of stdout
    #[arg(long)]
    report: Option<PathBuf>,

    /// Report format (markdown or json)
    #[arg(long, default_value = "markdown")]
    format: ReportFormat,

    /// Print Prometheus metrics after the report
    #[arg(long)]
    metrics: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    telemetry::init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Run(args) => run(args).await,
    };

    if let Err(err) = result {
        error!(error = %err, "mongoload terminated with error");
        std::process::exit(1);
    }
}

async fn run(args: RunArgs) -> Result<()> {
    if args.users == 0 {
        return Err(WorkloadError::Config("--users must be at least 1".to_string()));
    }

    let settings = match &args.config {
        Some(path) => Settings::from_file(path)?,
        None => Settings::load()?,
    };
    info!(
        db = %settings.db_name,
        num_collections = settings.num_collections,
        docs_to_cache = settings.docs_to_cache,
        "Settings loaded"
    );

    let client: Arc<dyn DocumentClient> = Arc::new(MongoClient::connect(&settings).await?);

    let stats = Arc::new(StatsCollector::new());
    let registry = Registry::new();
    let prometheus = PrometheusSink::register(&registry)
        .map_err(|e| WorkloadError::Config(format!("failed to register metrics: {e}")))?;
    let sink = FanoutSink::new(vec![
        stats.clone() as Arc<dyn ReportingSink>,
        Arc::new(prometheus) as Arc<dyn ReportingSink>,
    ]);
    let environment = Arc::new(Environment::new(Arc::new(settings), Arc::new(sink)));

    let config = RunnerConfig {
        users: args.users,
        run_time: Duration::from_secs(args.run_time),
        seed: args.seed,
    };
    let runner = WorkloadRunner::new(config, environment, Arc::clone(&client), |env, client| {
        Ok(OrdersWorkload::new(env, client))
    });

    let outcome = runner.run().await;
    if let Err(e) = client.shutdown().await {
        warn!(error = %e, "Client shutdown failed");
    }
    let summary = outcome?;

    // The driver connects lazily, so an unreachable cluster shows up here.
    if summary.workers_completed == 0 {
        return Err(WorkloadError::operation(format!(
            "all {} workers failed to start",
            summary.workers_failed
        )));
    }

    let writer = ReportWriter::new("orders", stats.snapshot());
    match &args.report {
        Some(path) => {
            writer.write_report(path, args.format)?;
            info!(path = %path.display(), "Report written");
        }
        None => println!("{}", writer.render(args.format)?),
    }

    if args.metrics {
        let text = TextEncoder::new()
            .encode_to_string(&registry.gather())
            .map_err(|e| WorkloadError::operation(format!("failed to encode metrics: {e}")))?;
        println!("{text}");
    }

    Ok(())
}
