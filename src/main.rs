use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;

use conc_bench::backend::{Connector, MilvusConfig, MilvusConnector};
use conc_bench::bench::{MockMilvusServer, SweepDriver, SweepReport};
use conc_bench::config::{self, Cli, Command, FileConfig, LogConfig, LogFormat, SweepSettings};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let file = match &cli.config {
        Some(path) => FileConfig::load(path)
            .with_context(|| format!("Failed to load config file {}", path.display()))?,
        None => FileConfig::default(),
    };

    init_logging(&LogConfig::resolve(&cli, &file));

    match &cli.command {
        Command::Run { backend, sweep } => {
            let settings = SweepSettings::resolve(sweep, &file).context("Invalid sweep settings")?;
            let milvus = config::resolve_milvus(backend, &file).context("Invalid backend settings")?;

            tracing::info!(
                uri = %milvus.uri,
                collection = %milvus.collection_name,
                "Running sweep against Milvus"
            );
            let connector: Arc<dyn Connector> = Arc::new(MilvusConnector::new(milvus));
            let report = run_sweep(&settings, connector).await;
            finish(&settings, &report)
        }
        Command::Standalone { sweep, mock } => {
            let settings = SweepSettings::resolve(sweep, &file).context("Invalid sweep settings")?;
            let mock_config = config::resolve_mock(mock, &file).context("Invalid mock settings")?;

            let collection_name = mock_config.collection_name.clone();
            let server = MockMilvusServer::spawn(mock_config)
                .await
                .context("Failed to start mock Milvus server")?;
            tracing::info!(url = %server.url(), "Mock Milvus server started");

            let milvus = MilvusConfig {
                uri: server.url(),
                collection_name,
                ..MilvusConfig::default()
            };
            let connector: Arc<dyn Connector> = Arc::new(MilvusConnector::new(milvus));
            let report = run_sweep(&settings, connector).await;
            server.shutdown().await?;
            finish(&settings, &report)
        }
    }
}

fn init_logging(log: &LogConfig) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log.level.to_lowercase()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true);

    match log.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

async fn run_sweep(settings: &SweepSettings, connector: Arc<dyn Connector>) -> SweepReport {
    let bench = &settings.bench;
    tracing::info!(
        levels = ?bench.concurrency_levels,
        duration_secs = bench.duration_secs,
        dim = bench.dimension,
        top_k = bench.top_k,
        policy = %bench.query_error_policy,
        "Starting concurrency sweep"
    );

    SweepDriver::new(bench.clone(), connector).run().await
}

fn finish(settings: &SweepSettings, report: &SweepReport) -> Result<()> {
    report.write_json(&settings.output)?;
    tracing::info!(path = %settings.output.display(), "Results written");

    if settings.json {
        println!("{}", report.to_json());
    } else {
        report.print_table();
        report.print_summary();
    }
    Ok(())
}
