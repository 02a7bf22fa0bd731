//! Request descriptors and batches
//!
//! A [`RequestSpec`] is the loosely-typed input a caller fills in; building it
//! produces a [`RequestDescriptor`] with defaults applied and mandatory headers
//! merged. Descriptors are grouped into a [`RequestBatch`] keyed by a name
//! that is unique within the batch.

use crate::CarbonError;
use reqwest::Method;
use std::collections::BTreeMap;
use std::time::Duration;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

const CONTENT_TYPE_HEADER: &str = "Content-Type";
const TIMEOUT_HEADER: &str = "timeout";

#[derive(Debug, Clone, Default)]
pub struct RequestSpec {
    pub method: Option<String>,
    pub url: Option<String>,
    pub timeout: Option<Duration>,
    pub headers: BTreeMap<String, String>,
    pub data: Option<BTreeMap<String, String>>,
    pub query: Vec<(String, String)>,
}

impl RequestSpec {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Default::default()
        }
    }

    pub fn post(url: impl Into<String>, data: BTreeMap<String, String>) -> Self {
        Self {
            method: Some("POST".to_string()),
            url: Some(url.into()),
            data: Some(data),
            ..Default::default()
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Apply defaults and produce a descriptor for `key`.
    ///
    /// Fails only on caller mistakes: no URL, an unparseable method, or query
    /// parameters on a URL that cannot be parsed.
    pub fn build(self, key: impl Into<String>) -> Result<RequestDescriptor, CarbonError> {
        let key = key.into();

        let url = match self.url {
            Some(url) if !url.is_empty() => url,
            _ => {
                return Err(CarbonError::InvalidRequest(format!(
                    "request '{key}' is missing a url"
                )))
            }
        };

        let method = match self.method.as_deref().map(str::trim) {
            None | Some("") => Method::GET,
            Some(method) => Method::from_bytes(method.to_ascii_uppercase().as_bytes())
                .map_err(|e| {
                    CarbonError::InvalidRequest(format!(
                        "request '{key}' has invalid method '{method}': {e}"
                    ))
                })?,
        };

        let url = if self.query.is_empty() {
            url
        } else {
            let mut parsed = url::Url::parse(&url).map_err(|e| {
                CarbonError::InvalidRequest(format!("request '{key}' has invalid url '{url}': {e}"))
            })?;
            parsed.query_pairs_mut().extend_pairs(&self.query);
            parsed.to_string()
        };

        let timeout = match self.timeout {
            Some(timeout) if !timeout.is_zero() => timeout,
            _ => DEFAULT_REQUEST_TIMEOUT,
        };

        let mut headers = self.headers;
        set_header(&mut headers, TIMEOUT_HEADER, timeout_header_secs(timeout).to_string());
        set_header(&mut headers, CONTENT_TYPE_HEADER, FORM_CONTENT_TYPE.to_string());

        let body = self
            .data
            .filter(|data| !data.is_empty())
            .map(|data| encode_form(&data));

        Ok(RequestDescriptor {
            key,
            method,
            url,
            headers,
            timeout,
            body,
        })
    }
}

/// Insert `name`, replacing any caller header that differs only in case.
/// Whole seconds for the `timeout` header, rounded up so sub-second
/// deadlines never advertise zero.
fn timeout_header_secs(timeout: Duration) -> u64 {
    timeout.as_secs() + u64::from(timeout.subsec_nanos() > 0)
}

fn set_header(headers: &mut BTreeMap<String, String>, name: &str, value: String) {
    headers.retain(|existing, _| !existing.eq_ignore_ascii_case(name));
    headers.insert(name.to_string(), value);
}

fn encode_form(data: &BTreeMap<String, String>) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(data)
        .finish()
}

/// One outbound call, fully resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    pub key: String,
    pub method: Method,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub timeout: Duration,
    pub body: Option<String>,
}

/// Descriptors keyed by name. Keys are unique; iteration is in key order.
#[derive(Debug, Clone, Default)]
pub struct RequestBatch {
    requests: BTreeMap<String, RequestDescriptor>,
}

impl RequestBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build every spec and collect them, rejecting repeated keys.
    pub fn from_specs<K, I>(specs: I) -> Result<Self, CarbonError>
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, RequestSpec)>,
    {
        let mut batch = Self::new();
        for (key, spec) in specs {
            batch.insert(spec.build(key)?)?;
        }
        Ok(batch)
    }

    pub fn insert(&mut self, descriptor: RequestDescriptor) -> Result<(), CarbonError> {
        if self.requests.contains_key(&descriptor.key) {
            return Err(CarbonError::DuplicateKey(descriptor.key));
        }
        self.requests.insert(descriptor.key.clone(), descriptor);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&RequestDescriptor> {
        self.requests.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.requests.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

impl IntoIterator for RequestBatch {
    type Item = RequestDescriptor;
    type IntoIter = std::collections::btree_map::IntoValues<String, RequestDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.requests.into_values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_applied() {
        let descriptor = RequestSpec::get("https://example.com/api").build("a").unwrap();

        assert_eq!(descriptor.key, "a");
        assert_eq!(descriptor.method, Method::GET);
        assert_eq!(descriptor.timeout, DEFAULT_REQUEST_TIMEOUT);
        assert_eq!(descriptor.headers.get("timeout").map(String::as_str), Some("10"));
        assert_eq!(
            descriptor.headers.get("Content-Type").map(String::as_str),
            Some(FORM_CONTENT_TYPE)
        );
        assert!(descriptor.body.is_none());
    }

    #[test]
    fn test_missing_url_fails_fast() {
        let err = RequestSpec::default().build("broken").unwrap_err();
        assert!(matches!(err, CarbonError::InvalidRequest(ref msg) if msg.contains("broken")));
    }

    #[test]
    fn test_invalid_method_rejected() {
        let spec = RequestSpec {
            method: Some("NOT A VERB".to_string()),
            ..RequestSpec::get("https://example.com")
        };
        assert!(matches!(spec.build("x"), Err(CarbonError::InvalidRequest(_))));
    }

    #[test]
    fn test_method_is_normalized() {
        let spec = RequestSpec {
            method: Some("post".to_string()),
            ..RequestSpec::get("https://example.com")
        };
        assert_eq!(spec.build("x").unwrap().method, Method::POST);
    }

    #[test]
    fn test_mandatory_headers_override_caller_headers() {
        let descriptor = RequestSpec::get("https://example.com")
            .header("content-type", "application/json")
            .header("TIMEOUT", "999")
            .header("Accept", "application/json")
            .timeout(Duration::from_secs(3))
            .build("x")
            .unwrap();

        assert_eq!(descriptor.headers.len(), 3);
        assert_eq!(descriptor.headers["Content-Type"], FORM_CONTENT_TYPE);
        assert_eq!(descriptor.headers["timeout"], "3");
        assert_eq!(descriptor.headers["Accept"], "application/json");
    }

    #[test]
    fn test_timeout_header_rounds_up_to_whole_seconds() {
        let header = |timeout: Duration| {
            RequestSpec::get("https://example.com")
                .timeout(timeout)
                .build("x")
                .unwrap()
                .headers["timeout"]
                .clone()
        };

        assert_eq!(header(Duration::from_millis(250)), "1");
        assert_eq!(header(Duration::from_millis(1500)), "2");
        assert_eq!(header(Duration::from_secs(4)), "4");
    }

    #[test]
    fn test_data_is_form_encoded() {
        let mut data = BTreeMap::new();
        data.insert("name".to_string(), "green web".to_string());
        data.insert("a".to_string(), "1&2".to_string());

        let descriptor = RequestSpec::post("https://example.com/form", data)
            .build("form")
            .unwrap();

        assert_eq!(descriptor.method, Method::POST);
        assert_eq!(descriptor.body.as_deref(), Some("a=1%262&name=green+web"));
    }

    #[test]
    fn test_query_appended_to_url() {
        let descriptor = RequestSpec::get("https://example.com/run")
            .query("url", "http://site.test/a b")
            .query("key", "abc")
            .build("q")
            .unwrap();

        assert_eq!(
            descriptor.url,
            "https://example.com/run?url=http%3A%2F%2Fsite.test%2Fa+b&key=abc"
        );
    }

    #[test]
    fn test_zero_timeout_uses_default() {
        let descriptor = RequestSpec::get("https://example.com")
            .timeout(Duration::ZERO)
            .build("x")
            .unwrap();
        assert_eq!(descriptor.timeout, DEFAULT_REQUEST_TIMEOUT);
    }

    #[test]
    fn test_batch_rejects_duplicate_keys() {
        let result = RequestBatch::from_specs([
            ("same", RequestSpec::get("https://a.test")),
            ("same", RequestSpec::get("https://b.test")),
        ]);
        assert!(matches!(result, Err(CarbonError::DuplicateKey(ref key)) if key == "same"));
    }

    #[test]
    fn test_batch_keys_sorted() {
        let batch = RequestBatch::from_specs([
            ("pagespeedapi", RequestSpec::get("https://b.test")),
            ("greenweb", RequestSpec::get("https://a.test")),
        ])
        .unwrap();

        assert_eq!(batch.len(), 2);
        assert_eq!(batch.keys().collect::<Vec<_>>(), vec!["greenweb", "pagespeedapi"]);
        assert_eq!(batch.get("greenweb").unwrap().url, "https://a.test");
    }
}
