//! Carbon calculation orchestrating the upstream lookups
//!
//! `CarbonCalculator` builds the named request batches for The Green Web
//! Foundation and PageSpeed Insights, runs them through the [`Dispatcher`],
//! and folds the Lighthouse audit into a [`CarbonReport`].

use crate::emissions::{co2_to_litres, compute_statistics};
use crate::url_utils::{normalise_url, url_host, url_host_and_path};
use crate::{
    BatchOutcome, BatchOutcomes, CalculationOptions, CarbonError, Config, Dispatcher,
    HttpTransport, Metrics, RequestBatch, RequestSpec, Transport,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const GREENWEB_KEY: &str = "greenweb";
pub const PAGESPEED_KEY: &str = "pagespeedapi";

/// Sanitised Lighthouse figures plus the derived emissions for one page.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CarbonReport {
    pub url: String,
    pub is_green_host: bool,
    pub bytes_transferred: u64,
    pub network_requests: usize,
    pub dom_size: Option<f64>,
    pub performance_score: f64,
    pub loading_experience: Option<String>,
    pub speed_index: Option<f64>,
    pub first_meaningful_paint: Option<f64>,
    pub first_contentful_paint: Option<f64>,
    pub largest_contentful_paint: Option<f64>,
    pub interactive: Option<f64>,
    pub bootup_time: Option<f64>,
    pub server_response_time: Option<f64>,
    pub mainthread_work: Option<f64>,
    pub energy: f64,
    pub co2_per_pageview: f64,
    pub co2_litres_per_pageview: f64,
    pub calculated_at: DateTime<Utc>,
}

/// High-level entry point for estimating a page's footprint
///
/// # Examples
///
/// ```rust,no_run
/// use website_carbon::{CalculationOptions, CarbonCalculator, Config};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let calculator = CarbonCalculator::new(Config::default())?;
///     let report = calculator
///         .calculate_by_url("https://www.websitecarbon.com", CalculationOptions::default())
///         .await?;
///     println!("{} g CO2 per page view", report.co2_per_pageview);
///     Ok(())
/// }
/// ```
pub struct CarbonCalculator<T: Transport = HttpTransport> {
    config: Config,
    dispatcher: Dispatcher<T>,
    metrics: Arc<Metrics>,
}

impl CarbonCalculator<HttpTransport> {
    pub fn new(config: Config) -> Result<Self, CarbonError> {
        let transport = HttpTransport::new(&config)?;
        Ok(Self::with_transport(config, transport))
    }
}

impl<T: Transport + Send + Sync + 'static> CarbonCalculator<T> {
    pub fn with_transport(config: Config, transport: T) -> Self {
        Self {
            config,
            dispatcher: Dispatcher::new(transport),
            metrics: Arc::new(Metrics::new()),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.dispatcher = self.dispatcher.with_metrics(metrics.clone());
        self.metrics = metrics;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Estimate the footprint of a single page view of `url`.
    pub async fn calculate_by_url(
        &self,
        url: &str,
        options: CalculationOptions,
    ) -> Result<CarbonReport, CarbonError> {
        let url = normalise_url(url)?;

        if url.is_empty() || url_host_and_path(&url)?.is_empty() {
            return Err(CarbonError::InvalidUrl(url));
        }

        info!("Calculating carbon footprint for {}", url);

        let lighthouse = self.lighthouse_data(&url, &options).await?;

        let is_green_host = match options.is_green_host {
            Some(green) => green,
            None => self.is_green_host(&url).await,
        };

        let report = make_report(url, is_green_host, &lighthouse)?;
        self.metrics.record_calculation();

        info!(
            "Calculated {} ({} bytes, green: {}): {:.4} g CO2 per page view",
            report.url, report.bytes_transferred, report.is_green_host, report.co2_per_pageview
        );

        Ok(report)
    }

    /// Ask The Green Web Foundation whether `url` is served from a green host.
    ///
    /// Any failure along the way counts as not green.
    pub async fn is_green_host(&self, url: &str) -> bool {
        self.metrics.record_green_check();

        let host = match url_host(url) {
            Ok(host) => host,
            Err(e) => {
                warn!("Cannot check green host for {}: {}", url, e);
                return false;
            }
        };

        let endpoint = format!("{}/{}", self.config.greenweb_url.trim_end_matches('/'), host);
        let spec = RequestSpec::get(endpoint).timeout(self.config.request_timeout);

        let outcomes = match self.dispatch_one(GREENWEB_KEY, spec).await {
            Ok(outcomes) => outcomes,
            Err(e) => {
                warn!("Green host check for {} could not run: {}", host, e);
                return false;
            }
        };

        let green = is_green_outcome(outcomes.get(GREENWEB_KEY));
        debug!("Green host check for {}: {}", host, green);
        green
    }

    /// Fetch the PageSpeed Insights payload for `url`.
    ///
    /// Errors when the request fails or the audit carries no network requests.
    pub async fn lighthouse_data(
        &self,
        url: &str,
        options: &CalculationOptions,
    ) -> Result<Value, CarbonError> {
        let mut spec = RequestSpec::get(self.config.pagespeed_url.as_str())
            .timeout(self.config.pagespeed_timeout)
            .query("url", normalise_url(url)?);

        let api_key = options
            .pagespeed_api_key
            .as_ref()
            .or(self.config.pagespeed_api_key.as_ref())
            .filter(|key| !key.is_empty());
        if let Some(key) = api_key {
            spec = spec.query("key", key.as_str());
        }

        if let Some(strategy) = options.strategy.or(self.config.strategy) {
            spec = spec.query("strategy", strategy.as_str());
        }

        let mut outcomes = self.dispatch_one(PAGESPEED_KEY, spec).await?;

        let lighthouse = match outcomes.remove(PAGESPEED_KEY) {
            Some(BatchOutcome::Success(value)) => value,
            Some(BatchOutcome::Failure(failure)) => {
                return Err(CarbonError::UpstreamFailure {
                    key: PAGESPEED_KEY.to_string(),
                    failure,
                })
            }
            None => return Err(CarbonError::MissingOutcome(PAGESPEED_KEY.to_string())),
        };

        if network_request_items(&lighthouse).map_or(true, |items| items.is_empty()) {
            return Err(CarbonError::EmptyAuditData);
        }

        Ok(lighthouse)
    }

    async fn dispatch_one(&self, key: &str, spec: RequestSpec) -> Result<BatchOutcomes, CarbonError> {
        let batch = RequestBatch::from_specs([(key, spec)])?;
        self.dispatcher
            .dispatch(batch, self.config.max_concurrent_requests)
            .await
    }
}

/// Interpret a greencheck outcome. Missing, failed or falsy answers are not green.
pub fn is_green_outcome(outcome: Option<&BatchOutcome>) -> bool {
    match outcome.and_then(BatchOutcome::success).and_then(|v| v.get("green")) {
        Some(Value::Bool(green)) => *green,
        Some(Value::Number(n)) => n.as_f64().map_or(false, |n| n != 0.0),
        Some(Value::String(s)) => !s.is_empty() && s != "0" && !s.eq_ignore_ascii_case("false"),
        _ => false,
    }
}

fn audits(lighthouse: &Value) -> Option<&serde_json::Map<String, Value>> {
    lighthouse.pointer("/lighthouseResult/audits")?.as_object()
}

fn network_request_items(lighthouse: &Value) -> Option<&Vec<Value>> {
    lighthouse
        .pointer("/lighthouseResult/audits/network-requests/details/items")?
        .as_array()
}

fn audit_numeric_value(lighthouse: &Value, audit: &str) -> Option<f64> {
    audits(lighthouse)?
        .get(audit)?
        .get("numericValue")?
        .as_f64()
}

fn rounded_audit_value(lighthouse: &Value, audit: &str) -> Option<f64> {
    audit_numeric_value(lighthouse, audit).map(f64::round)
}

pub fn transferred_bytes(items: &[Value]) -> u64 {
    items
        .iter()
        .filter_map(|item| item.get("transferSize")?.as_f64())
        .filter(|size| *size > 0.0)
        .map(|size| size as u64)
        .sum()
}

/// Mean of every numeric audit score, rounded to two decimals.
pub fn performance_score(lighthouse: &Value) -> f64 {
    let scores: Vec<f64> = audits(lighthouse)
        .map(|audits| {
            audits
                .values()
                .filter_map(|audit| audit.get("score")?.as_f64())
                .collect()
        })
        .unwrap_or_default();

    if scores.is_empty() {
        return 0.0;
    }

    let mean = scores.iter().sum::<f64>() / scores.len() as f64;
    (mean * 100.0).round() / 100.0
}

pub fn make_report(
    url: String,
    is_green_host: bool,
    lighthouse: &Value,
) -> Result<CarbonReport, CarbonError> {
    let items = network_request_items(lighthouse)
        .filter(|items| !items.is_empty())
        .ok_or(CarbonError::EmptyAuditData)?;

    let bytes_transferred = transferred_bytes(items);
    let statistics = compute_statistics(bytes_transferred, is_green_host);

    Ok(CarbonReport {
        url,
        is_green_host,
        bytes_transferred,
        network_requests: items.len(),
        dom_size: audit_numeric_value(lighthouse, "dom-size"),
        performance_score: performance_score(lighthouse),
        loading_experience: lighthouse
            .pointer("/loadingExperience/overall_category")
            .and_then(Value::as_str)
            .map(str::to_string),
        speed_index: rounded_audit_value(lighthouse, "speed-index"),
        first_meaningful_paint: rounded_audit_value(lighthouse, "first-meaningful-paint"),
        first_contentful_paint: rounded_audit_value(lighthouse, "first-contentful-paint"),
        largest_contentful_paint: rounded_audit_value(lighthouse, "largest-contentful-paint"),
        interactive: rounded_audit_value(lighthouse, "interactive"),
        bootup_time: rounded_audit_value(lighthouse, "bootup-time"),
        server_response_time: rounded_audit_value(lighthouse, "server-response-time"),
        mainthread_work: rounded_audit_value(lighthouse, "mainthread-work-breakdown"),
        energy: statistics.energy,
        co2_per_pageview: statistics.co2_per_pageview,
        co2_litres_per_pageview: co2_to_litres(statistics.co2_per_pageview),
        calculated_at: Utc::now(),
    })
}
