//! Repository names and API endpoints.

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::error::PrismicError;

static REPOSITORY_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9][-a-zA-Z0-9]{2,}[a-zA-Z0-9]$").expect("static regex")
});

pub fn is_repository_name(input: &str) -> bool {
    REPOSITORY_NAME.is_match(input)
}

/// The CDN document API endpoint of a repository.
pub fn repository_endpoint(name: &str) -> Result<String, PrismicError> {
    if !is_repository_name(name) {
        return Err(PrismicError::Config(format!(
            "an invalid Prismic repository name was given: {name}"
        )));
    }
    Ok(format!("https://{name}.cdn.prismic.io/api/v2"))
}

/// Accepts a repository name or a full `http(s)` endpoint. Trailing slashes are dropped.
pub fn resolve_endpoint(name_or_endpoint: &str) -> Result<String, PrismicError> {
    let input = name_or_endpoint.trim();
    if is_repository_name(input) {
        return repository_endpoint(input);
    }
    match Url::parse(input) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.host_str().is_some() => {
            Ok(input.trim_end_matches('/').to_string())
        }
        _ => Err(PrismicError::Config(format!(
            "expected a repository name or a Prismic API endpoint, got: {input}"
        ))),
    }
}

/// `true` for `*.prismic.io` endpoints that bypass the CDN.
pub fn is_non_cdn_endpoint(endpoint: &str) -> bool {
    Url::parse(endpoint)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .is_some_and(|host| host.ends_with(".prismic.io") && !host.contains(".cdn."))
}
