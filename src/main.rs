use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use website_carbon::{
    load_config, setup_logging, CarbonError, Cli, CliRunner, Metrics, PrometheusExporter,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse CLI arguments
    let args = Cli::parse();

    setup_logging(args.verbose)?;

    info!("Starting carbon-calc v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args).await?;

    let exporter = if args.metrics {
        Some(PrometheusExporter::install()?)
    } else {
        None
    };
    let metrics = Arc::new(if exporter.is_some() {
        Metrics::registered()
    } else {
        Metrics::new()
    });

    let cli_runner = CliRunner::new(config, metrics)?;

    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Cannot listen for interrupts: {}", e);
            std::future::pending::<()>().await;
        }
    };
    let result = cli_runner.run_until(args.command, shutdown).await;

    if let Some(exporter) = &exporter {
        println!("{}", exporter.render());
    }

    if let Err(e) = result {
        error!("{:#}", e);
        let code = match e.downcast_ref::<CarbonError>() {
            Some(CarbonError::Interrupted) => 130,
            _ => 1,
        };
        std::process::exit(code);
    }

    Ok(())
}
