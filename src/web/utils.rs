//! Request helpers.

use axum::http::{HeaderMap, header};

use crate::config::WebConfig;

/// Absolute base URI clients should use to reach this server.
///
/// The configured `base_url` wins; otherwise it is derived from the `Host`
/// header, honouring `X-Forwarded-Proto` and `X-Forwarded-Host` from a reverse proxy.
pub fn base_uri(headers: &HeaderMap, web: &WebConfig) -> String {
    if let Some(base) = web.base_url.as_deref().filter(|b| !b.is_empty()) {
        return base.trim_end_matches('/').to_string();
    }

    let header_str = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.split(',').next().unwrap_or(value).trim().to_string())
            .filter(|value| !value.is_empty())
    };

    let scheme = header_str("x-forwarded-proto").unwrap_or_else(|| "http".to_string());
    let host = header_str("x-forwarded-host")
        .or_else(|| header_str(header::HOST.as_str()))
        .unwrap_or_else(|| format!("{}:{}", web.host, web.port));
    format!("{scheme}://{host}")
}

/// Parse `"{number}.{ext}"`, returning the number when the extension matches
pub fn parse_numbered_file(file: &str, ext: &str) -> Option<u32> {
    file.strip_suffix(ext)?.strip_suffix('.')?.parse().ok()
}
