//! Canonical URL form used as the crawl dedup key.

use std::fmt;
use url::Url;

/// An http(s) URL with no credentials, no query, no fragment and no trailing slash
/// (except the root `/`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NormalizedUrl(Url);

impl NormalizedUrl {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn as_url(&self) -> &Url {
        &self.0
    }

    /// Host plus explicit port, compared when scoping a crawl to one site.
    pub fn authority(&self) -> (Option<&str>, Option<u16>) {
        (self.0.host_str(), self.0.port())
    }

    /// Scheme + host (+ non-default port), e.g. `https://example.com`.
    pub fn domain_key(&self) -> String {
        self.0.origin().ascii_serialization()
    }

    pub fn into_string(self) -> String {
        self.0.into()
    }
}

impl fmt::Display for NormalizedUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

/// Canonicalizes a candidate URL, or returns `None` if it is not a crawlable http(s) URL.
pub fn normalize(raw: &str) -> Option<NormalizedUrl> {
    let url = Url::parse(raw.trim()).ok()?;
    normalize_url(url)
}

/// Resolves `href` against `base` and normalizes the result.
pub fn normalize_relative(base: &Url, href: &str) -> Option<NormalizedUrl> {
    let url = base.join(href.trim()).ok()?;
    normalize_url(url)
}

fn normalize_url(mut url: Url) -> Option<NormalizedUrl> {
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    match url.host_str() {
        Some(host) if !host.is_empty() => {}
        _ => return None,
    }

    // Credentials never become part of a page URL
    if url.set_username("").is_err() || url.set_password(None).is_err() {
        return None;
    }
    url.set_query(None);
    url.set_fragment(None);

    let trimmed = url.path().trim_end_matches('/').to_string();
    if trimmed.is_empty() {
        url.set_path("/");
    } else {
        url.set_path(&trimmed);
    }

    Some(NormalizedUrl(url))
}

/// Scheme + host key for an arbitrary URL string, used for robots lookups.
pub fn domain_key(raw: &str) -> Option<String> {
    normalize(raw).map(|u| u.domain_key())
}
