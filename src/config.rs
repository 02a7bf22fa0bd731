//! Configuration management with serde serialization/deserialization
//!
//! This module provides the calculator configuration: upstream API endpoints,
//! the dispatcher's concurrency ceiling, and HTTP client timeouts.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::CarbonError;

pub const DEFAULT_PAGESPEED_URL: &str =
    "https://www.googleapis.com/pagespeedonline/v5/runPagespeed";
pub const DEFAULT_GREENWEB_URL: &str = "https://api.thegreenwebfoundation.org/greencheck";

/// Environment variable consulted for the PageSpeed API key when none is configured.
pub const PAGESPEED_API_KEY_ENV: &str = "PAGESPEED_API_KEY";

/// Main configuration structure for the carbon calculator
///
/// # Examples
///
/// ```rust
/// use website_carbon::Config;
///
/// // Use default configuration
/// let config = Config::default();
///
/// // Serialize requests instead of running them in parallel
/// let config = Config {
///     max_concurrent_requests: 1,
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Google PageSpeed Insights API key (default: none)
    ///
    /// Requests without a key are subject to much lower quota.
    pub pagespeed_api_key: Option<String>,

    /// Lighthouse analysis strategy sent to PageSpeed (default: API default)
    pub strategy: Option<Strategy>,

    /// Maximum number of requests in flight within one batch (default: 100)
    pub max_concurrent_requests: usize,

    /// Per-request timeout for the green host lookup (default: 10 seconds)
    pub request_timeout: Duration,

    /// Timeout for the PageSpeed Insights audit fetch (default: 120 seconds)
    ///
    /// Lighthouse runs the whole page load upstream before answering.
    pub pagespeed_timeout: Duration,

    /// Client-wide timeout configured on the shared HTTP client (default: 300 seconds)
    ///
    /// PageSpeed audits routinely take tens of seconds, so this is kept generous.
    pub client_timeout: Duration,

    /// Skip TLS certificate verification (default: true)
    ///
    /// Some hosts serve broken certificate chains; the upstream APIs are
    /// trusted endpoints so this only relaxes validation for them.
    pub accept_invalid_certs: bool,

    /// Custom User-Agent string for outbound requests (default: reqwest default)
    pub user_agent: Option<String>,

    /// Green Web Foundation greencheck endpoint
    pub greenweb_url: String,

    /// PageSpeed Insights runPagespeed endpoint
    pub pagespeed_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pagespeed_api_key: None,
            strategy: None,
            max_concurrent_requests: 100,
            request_timeout: Duration::from_secs(10),
            pagespeed_timeout: Duration::from_secs(120),
            client_timeout: Duration::from_secs(300),
            accept_invalid_certs: true,
            user_agent: None,
            greenweb_url: DEFAULT_GREENWEB_URL.to_string(),
            pagespeed_url: DEFAULT_PAGESPEED_URL.to_string(),
        }
    }
}

impl Config {
    /// Fill the API key from `PAGESPEED_API_KEY` if it is not already set.
    pub fn with_env_overrides(mut self) -> Self {
        if self.pagespeed_api_key.is_none() {
            self.pagespeed_api_key = std::env::var(PAGESPEED_API_KEY_ENV)
                .ok()
                .filter(|key| !key.is_empty());
        }
        self
    }

    pub fn validate(&self) -> Result<(), CarbonError> {
        if self.max_concurrent_requests == 0 {
            return Err(CarbonError::ConfigurationError(
                "Max concurrent requests must be greater than 0".to_string(),
            ));
        }

        if self.request_timeout.is_zero() {
            return Err(CarbonError::ConfigurationError(
                "Request timeout must be greater than 0".to_string(),
            ));
        }

        if self.pagespeed_timeout.is_zero() {
            return Err(CarbonError::ConfigurationError(
                "PageSpeed timeout must be greater than 0".to_string(),
            ));
        }

        if self.client_timeout.is_zero() {
            return Err(CarbonError::ConfigurationError(
                "Client timeout must be greater than 0".to_string(),
            ));
        }

        for (name, endpoint) in [
            ("greenweb_url", &self.greenweb_url),
            ("pagespeed_url", &self.pagespeed_url),
        ] {
            url::Url::parse(endpoint).map_err(|e| {
                CarbonError::ConfigurationError(format!("{name} is not a valid URL: {e}"))
            })?;
        }

        Ok(())
    }
}

/// Lighthouse analysis strategy accepted by the PageSpeed API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Mobile,
    Desktop,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Mobile => "mobile",
            Strategy::Desktop => "desktop",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = CarbonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mobile" => Ok(Strategy::Mobile),
            "desktop" => Ok(Strategy::Desktop),
            other => Err(CarbonError::ConfigurationError(format!(
                "Unknown strategy '{other}' (expected mobile or desktop)"
            ))),
        }
    }
}

/// Per-call options for [`crate::CarbonCalculator::calculate_by_url`]
#[derive(Debug, Clone, Default)]
pub struct CalculationOptions {
    /// Overrides the calculator's configured API key for this call
    pub pagespeed_api_key: Option<String>,

    /// Skips the green-host lookup and uses this value instead
    pub is_green_host: Option<bool>,

    /// Overrides the configured strategy for this call
    pub strategy: Option<Strategy>,
}
