//! # Website Carbon
//!
//! Estimates the carbon footprint of a web page view. The page is audited with
//! Google PageSpeed Insights (Lighthouse), its host is checked against The
//! Green Web Foundation's registry, and the transferred bytes are converted to
//! energy and CO2 with a fixed emissions model.
//!
//! Outbound calls go through a [`Dispatcher`], which runs a named batch of
//! requests concurrently under a ceiling and returns one [`BatchOutcome`] per
//! key once every request has settled. A failing request never disturbs its
//! siblings.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use website_carbon::{CalculationOptions, CarbonCalculator, Config};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let calculator = CarbonCalculator::new(Config::default().with_env_overrides())?;
//!     let report = calculator
//!         .calculate_by_url("websitecarbon.com", CalculationOptions::default())
//!         .await?;
//!     println!("{}", serde_json::to_string_pretty(&report)?);
//!     Ok(())
//! }
//! ```
//!
//! ## Batching requests directly
//!
//! ```rust,no_run
//! use website_carbon::{Config, Dispatcher, RequestBatch, RequestSpec};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let dispatcher = Dispatcher::http(&Config::default())?;
//!     let batch = RequestBatch::from_specs([
//!         ("a", RequestSpec::get("https://httpbin.org/json")),
//!         ("b", RequestSpec::get("https://httpbin.org/status/500")),
//!     ])?;
//!
//!     for (key, outcome) in dispatcher.dispatch(batch, 100).await? {
//!         println!("{key}: {outcome:?}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## CLI Usage
//!
//! ```bash
//! carbon-calc calculate https://www.websitecarbon.com --pretty
//! carbon-calc green-check websitecarbon.com
//! ```

/// Configuration and settings for the calculator
pub mod config;

/// Error types and error handling utilities
pub mod error;

/// Request descriptors and batches
pub mod request;

/// Concurrent request dispatching with per-key outcomes
pub mod dispatcher;

/// Green host check, Lighthouse fetch and report assembly
pub mod calculator;

/// Energy and emissions formulas
pub mod emissions;

/// URL normalization helpers
pub mod url_utils;

/// Command-line interface implementation
pub mod cli;

/// Request metrics collection and export
pub mod metrics;


pub use calculator::*;
pub use cli::*;
pub use config::*;
pub use dispatcher::*;
pub use error::*;
pub use self::metrics::*;
pub use request::*;
pub use url_utils::*;
