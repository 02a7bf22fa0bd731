use crate::{CalculationOptions, CarbonCalculator, CarbonError, Config, Metrics, Strategy};
use anyhow::Context;
use clap::{Parser, Subcommand};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::info;

#[derive(Parser)]
#[command(name = "carbon-calc")]
#[command(about = "Estimate the carbon footprint of a web page")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, help = "Configuration file path (JSON)")]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, help = "Maximum concurrent requests per batch")]
    pub max_concurrent: Option<usize>,

    #[arg(long, global = true, help = "Per-request timeout in seconds")]
    pub timeout: Option<u64>,

    #[arg(long, global = true, help = "PageSpeed audit timeout in seconds")]
    pub pagespeed_timeout: Option<u64>,

    #[arg(long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(long, global = true, help = "Print Prometheus metrics when the command finishes")]
    pub metrics: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Calculate the footprint of a page
    Calculate {
        #[arg(help = "Page URL (scheme optional)")]
        url: String,

        #[arg(long, help = "PageSpeed Insights API key")]
        api_key: Option<String>,

        #[arg(long, help = "Lighthouse strategy (mobile, desktop)")]
        strategy: Option<Strategy>,

        #[arg(long, help = "Skip the green host lookup and use this value")]
        green_host: Option<bool>,

        #[arg(long, help = "Pretty-print the JSON report")]
        pretty: bool,
    },

    /// Check whether a page is served from a green host
    GreenCheck {
        #[arg(help = "Page URL (scheme optional)")]
        url: String,
    },

    /// Validate configuration
    Validate {
        #[arg(short, long, help = "Configuration file to validate")]
        config: PathBuf,
    },
}

impl clap::ValueEnum for Strategy {
    fn value_variants<'a>() -> &'a [Self] {
        &[Strategy::Mobile, Strategy::Desktop]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        Some(clap::builder::PossibleValue::new(self.as_str()))
    }
}

pub struct CliRunner {
    pub config: Config,
    pub calculator: CarbonCalculator,
}

impl CliRunner {
    pub fn new(config: Config, metrics: Arc<Metrics>) -> anyhow::Result<Self> {
        let calculator = CarbonCalculator::new(config.clone())
            .context("failed to create HTTP client")?
            .with_metrics(metrics);

        Ok(Self { config, calculator })
    }

    pub async fn run(&self, command: Commands) -> anyhow::Result<()> {
        match command {
            Commands::Calculate {
                url,
                api_key,
                strategy,
                green_host,
                pretty,
            } => {
                self.run_calculate(
                    &url,
                    CalculationOptions {
                        pagespeed_api_key: api_key,
                        is_green_host: green_host,
                        strategy,
                    },
                    pretty,
                )
                .await
            }
            Commands::GreenCheck { url } => self.run_green_check(&url).await,
            Commands::Validate { config } => validate_config_file(&config).await,
        }
    }

    /// Run `command` unless `shutdown` resolves first, in which case the
    /// command is dropped and [`CarbonError::Interrupted`] is returned.
    pub async fn run_until(
        &self,
        command: Commands,
        shutdown: impl Future<Output = ()>,
    ) -> anyhow::Result<()> {
        tokio::select! {
            biased;
            _ = shutdown => {
                info!("Received interrupt, cancelling");
                Err(CarbonError::Interrupted.into())
            }
            result = self.run(command) => result,
        }
    }

    pub async fn run_calculate(
        &self,
        url: &str,
        options: CalculationOptions,
        pretty: bool,
    ) -> anyhow::Result<()> {
        let report = self
            .calculator
            .calculate_by_url(url, options)
            .await
            .with_context(|| format!("carbon calculation failed for {url}"))?;

        let output = if pretty {
            serde_json::to_string_pretty(&report)?
        } else {
            serde_json::to_string(&report)?
        };
        println!("{output}");

        Ok(())
    }

    pub async fn run_green_check(&self, url: &str) -> anyhow::Result<()> {
        let url = crate::normalise_url(url)?;
        let green = self.calculator.is_green_host(&url).await;

        println!("{url}: {}", if green { "green" } else { "not green" });
        Ok(())
    }
}

/// Read a JSON config file, then apply environment and CLI overrides.
pub async fn load_config(args: &Cli) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) => read_config(path).await?,
        None => Config::default(),
    }
    .with_env_overrides();

    if let Some(max_concurrent) = args.max_concurrent {
        config.max_concurrent_requests = max_concurrent;
    }

    if let Some(timeout) = args.timeout {
        config.request_timeout = std::time::Duration::from_secs(timeout);
    }

    if let Some(timeout) = args.pagespeed_timeout {
        config.pagespeed_timeout = std::time::Duration::from_secs(timeout);
    }

    config.validate()?;

    info!("Configuration loaded successfully");
    info!("Max concurrent requests: {}", config.max_concurrent_requests);
    info!("Request timeout: {:?}", config.request_timeout);
    info!("PageSpeed timeout: {:?}", config.pagespeed_timeout);

    Ok(config)
}

async fn read_config(path: &Path) -> anyhow::Result<Config> {
    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;

    serde_json::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
}

pub async fn validate_config_file(path: &Path) -> anyhow::Result<()> {
    println!("Validating configuration: {}", path.display());

    let config = read_config(path).await?;
    config.validate()?;

    println!("Configuration is valid:");
    println!("  Max concurrent: {}", config.max_concurrent_requests);
    println!("  Request timeout: {:?}", config.request_timeout);
    println!("  PageSpeed timeout: {:?}", config.pagespeed_timeout);
    println!("  Client timeout: {:?}", config.client_timeout);
    println!("  Strategy: {:?}", config.strategy);
    println!("  API key set: {}", config.pagespeed_api_key.is_some());

    Ok(())
}

pub fn setup_logging(verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| e.to_string())?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_calculate() {
        let cli = Cli::parse_from([
            "carbon-calc",
            "calculate",
            "example.com",
            "--strategy",
            "desktop",
            "--green-host",
            "false",
            "--max-concurrent",
            "4",
        ]);

        assert_eq!(cli.max_concurrent, Some(4));
        match cli.command {
            Commands::Calculate {
                url,
                strategy,
                green_host,
                pretty,
                ..
            } => {
                assert_eq!(url, "example.com");
                assert_eq!(strategy, Some(Strategy::Desktop));
                assert_eq!(green_host, Some(false));
                assert!(!pretty);
            }
            _ => panic!("expected calculate command"),
        }
    }

    #[tokio::test]
    async fn test_load_config_applies_overrides() {
        let cli = Cli::parse_from([
            "carbon-calc",
            "--max-concurrent",
            "7",
            "--timeout",
            "3",
            "green-check",
            "example.com",
        ]);

        let config = load_config(&cli).await.unwrap();
        assert_eq!(config.max_concurrent_requests, 7);
        assert_eq!(config.request_timeout, std::time::Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_load_config_applies_pagespeed_timeout() {
        let cli = Cli::parse_from([
            "carbon-calc",
            "--pagespeed-timeout",
            "45",
            "green-check",
            "example.com",
        ]);

        let config = load_config(&cli).await.unwrap();
        assert_eq!(config.pagespeed_timeout, std::time::Duration::from_secs(45));
    }

    #[tokio::test]
    async fn test_interrupted_command_is_an_error() {
        let runner = CliRunner::new(Config::default(), Arc::new(Metrics::new())).unwrap();
        let command = Commands::Validate {
            config: PathBuf::from("does-not-matter.json"),
        };

        let err = runner
            .run_until(command, std::future::ready(()))
            .await
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<CarbonError>(),
            Some(CarbonError::Interrupted)
        ));
    }

    #[test]
    fn test_setup_logging_twice_reports_error() {
        let _ = setup_logging(false);
        assert!(setup_logging(true).is_err());
    }

    #[tokio::test]
    async fn test_load_config_rejects_zero_concurrency() {
        let cli = Cli::parse_from([
            "carbon-calc",
            "--max-concurrent",
            "0",
            "green-check",
            "example.com",
        ]);

        assert!(load_config(&cli).await.is_err());
    }
}
