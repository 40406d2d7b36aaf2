//! Preview detection from a cookie jar or a request-like object.

use reqwest::header::{HeaderMap, COOKIE};

/// Cookie holding the preview ref.
pub const PREVIEW_COOKIE: &str = "io.prismic.preview";

/// Anything a cookie header can be read from: a raw cookie jar string, a header map, or an
/// incoming server request adapted by the caller.
pub trait RequestLike: Send + Sync {
    fn cookie_header(&self) -> Option<String>;
}

impl RequestLike for String {
    fn cookie_header(&self) -> Option<String> {
        Some(self.clone())
    }
}

impl RequestLike for &'static str {
    fn cookie_header(&self) -> Option<String> {
        Some((*self).to_string())
    }
}

impl RequestLike for HeaderMap {
    fn cookie_header(&self) -> Option<String> {
        let cookies: Vec<&str> = self
            .get_all(COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect();
        (!cookies.is_empty()).then(|| cookies.join("; "))
    }
}

fn read_value(value: &str) -> String {
    value.replace("%3B", ";")
}

/// The preview ref stored in `cookie_jar`, if any. The last matching cookie wins.
pub fn preview_cookie(cookie_jar: &str) -> Option<String> {
    let mut found = None;
    for cookie in cookie_jar.split("; ") {
        let (name, value) = cookie.split_once('=').unwrap_or((cookie, ""));
        if read_value(name).replace("%3D", "=").trim() == PREVIEW_COOKIE {
            found = Some(read_value(value));
        }
    }
    found.filter(|v| !v.is_empty())
}
