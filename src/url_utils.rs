use crate::CarbonError;
use url::Url;

/// Normalize a user-supplied page URL.
///
/// Adds `http://` when no scheme is present, lets the URL parser canonicalize
/// the rest (lowercase scheme and host, default port dropped, dot segments
/// resolved) and strips trailing slashes. An empty input stays empty.
pub fn normalise_url(url: &str) -> Result<String, CarbonError> {
    let url = url.trim();
    if url.is_empty() {
        return Ok(String::new());
    }

    let parsed = Url::parse(&add_http(url))?;
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(CarbonError::InvalidUrl(url.to_string()));
    }

    Ok(parsed.as_str().trim_end_matches('/').to_string())
}

pub fn url_host(url: &str) -> Result<String, CarbonError> {
    let parsed = parse(url)?;
    Ok(strip_www(host_of(&parsed, url)?).to_string())
}

pub fn url_host_and_path(url: &str) -> Result<String, CarbonError> {
    let parsed = parse(url)?;
    let mut host_and_path = host_of(&parsed, url)?.to_string();

    if parsed.path() != "/" {
        host_and_path.push_str(parsed.path());
    }

    Ok(strip_www(&host_and_path).to_string())
}

pub fn url_host_and_path_with_query(url: &str) -> Result<String, CarbonError> {
    let mut host_and_path = url_host_and_path(url)?;

    if let Some(query) = parse(url)?.query().filter(|q| !q.is_empty()) {
        host_and_path.push('?');
        host_and_path.push_str(query);
    }

    Ok(host_and_path)
}

pub fn add_http(url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("http://{url}")
    }
}

pub fn strip_www(host: &str) -> &str {
    host.strip_prefix("www.").unwrap_or(host)
}

fn parse(url: &str) -> Result<Url, CarbonError> {
    Url::parse(url).map_err(|e| CarbonError::InvalidUrl(format!("{url}: {e}")))
}

fn host_of<'a>(parsed: &'a Url, original: &str) -> Result<&'a str, CarbonError> {
    parsed
        .host_str()
        .filter(|host| !host.is_empty())
        .ok_or_else(|| CarbonError::InvalidUrl(format!("{original}: missing host")))
}
