//! robots.txt parsing and the per-crawler policy cache.

use moka::future::Cache;
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;

use crate::url_normalizer::NormalizedUrl;

/// User agent token checked against robots groups.
pub const ROBOTS_USER_AGENT: &str = "*";

/// Parsed robots.txt rules for one user agent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RobotsRules {
    pub allowed: Vec<String>,
    pub disallowed: Vec<String>,
    /// Informational only; the crawler fetches sequentially and does not wait on it.
    pub crawl_delay: Option<f32>,
    pub sitemaps: Vec<String>,
    /// Set when robots.txt answered 401/403.
    pub disallow_all: bool,
}

impl RobotsRules {
    /// Rules that permit everything.
    pub fn allow_all() -> Self {
        Self::default()
    }

    pub fn deny_all() -> Self {
        Self {
            disallow_all: true,
            ..Self::default()
        }
    }

    /// Check if a path is allowed. The longest matching pattern wins; ties go to `Allow`.
    pub fn is_allowed(&self, path: &str) -> bool {
        if self.disallow_all {
            return false;
        }

        let longest = |patterns: &[String]| {
            patterns
                .iter()
                .filter(|p| path_matches(path, p))
                .map(|p| p.len())
                .max()
        };

        match (longest(&self.allowed), longest(&self.disallowed)) {
            (Some(allow), Some(disallow)) => allow >= disallow,
            (None, Some(_)) => false,
            _ => true,
        }
    }
}

/// Parse a robots.txt body for a specific user agent.
///
/// Groups naming the agent take precedence over the `*` group.
pub fn parse_robots(txt: &str, user_agent: &str) -> RobotsRules {
    let ua_lower = user_agent.to_lowercase();
    let mut specific = RobotsRules::default();
    let mut wildcard = RobotsRules::default();
    let mut found_specific = false;
    let mut sitemaps = Vec::new();

    // Agents of the group currently being read; a new group starts at the first
    // user-agent line after a rule line.
    let mut group_agents: Vec<String> = Vec::new();
    let mut last_was_agent = false;

    for line in txt.lines() {
        let line = line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }

        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_lowercase();
        let value = value.trim();

        if key == "user-agent" {
            if !last_was_agent {
                group_agents.clear();
            }
            group_agents.push(value.to_lowercase());
            last_was_agent = true;
            continue;
        }
        last_was_agent = false;

        if key == "sitemap" {
            if !value.is_empty() {
                sitemaps.push(value.to_string());
            }
            continue;
        }

        let targets_specific =
            ua_lower != "*" && group_agents.iter().any(|a| a != "*" && a == &ua_lower);
        let targets_wildcard = group_agents.iter().any(|a| a == "*");
        if !targets_specific && !targets_wildcard {
            continue;
        }
        if targets_specific {
            found_specific = true;
        }

        for rules in [
            targets_specific.then_some(&mut specific),
            targets_wildcard.then_some(&mut wildcard),
        ]
        .into_iter()
        .flatten()
        {
            match key.as_str() {
                "allow" if !value.is_empty() => rules.allowed.push(value.to_string()),
                // An empty Disallow permits everything
                "disallow" if !value.is_empty() => rules.disallowed.push(value.to_string()),
                "crawl-delay" => {
                    if let Ok(delay) = value.parse::<f32>() {
                        rules.crawl_delay = Some(delay);
                    }
                }
                _ => {}
            }
        }
    }

    let mut rules = if found_specific { specific } else { wildcard };
    rules.sitemaps = sitemaps;
    rules
}

/// Check if a path matches a robots.txt pattern.
fn path_matches(path: &str, pattern: &str) -> bool {
    if pattern.is_empty() {
        return false;
    }

    if let Some(exact) = pattern.strip_suffix('$') {
        return wildcard_match(path, exact, true);
    }

    wildcard_match(path, pattern, false)
}

/// Prefix match with `*` wildcards; `anchored` requires the whole path to match.
fn wildcard_match(path: &str, pattern: &str, anchored: bool) -> bool {
    let mut parts = pattern.split('*');
    let first = parts.next().unwrap_or("");
    let Some(mut rest) = path.strip_prefix(first) else {
        return false;
    };

    let remaining: Vec<&str> = parts.collect();
    if remaining.is_empty() {
        return !anchored || rest.is_empty();
    }

    for (idx, part) in remaining.iter().enumerate() {
        let is_last = idx == remaining.len() - 1;
        if part.is_empty() {
            if is_last {
                return true;
            }
            continue;
        }
        if is_last && anchored {
            return rest.ends_with(part);
        }
        match rest.find(part) {
            Some(pos) => rest = &rest[pos + part.len()..],
            None => return false,
        }
    }

    !anchored || rest.is_empty()
}

/// Per-domain robots policy cache owned by one crawler instance.
///
/// Entries are keyed by domain key and never invalidated for the cache's lifetime.
#[derive(Clone)]
pub struct RobotsCache {
    client: reqwest::Client,
    timeout: Duration,
    rules: Cache<String, Arc<RobotsRules>>,
}

impl RobotsCache {
    pub fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Self {
            client,
            timeout,
            rules: Cache::builder().max_capacity(10_000).build(),
        }
    }

    /// Whether the wildcard agent may fetch `url`.
    pub async fn is_allowed(&self, url: &NormalizedUrl) -> bool {
        let rules = self.rules_for(url).await;
        rules.is_allowed(url.as_url().path())
    }

    /// Cached rules for the URL's domain, fetching robots.txt on first access.
    pub async fn rules_for(&self, url: &NormalizedUrl) -> Arc<RobotsRules> {
        let domain = url.domain_key();
        if let Some(rules) = self.rules.get(&domain).await {
            return rules;
        }

        let rules = Arc::new(self.fetch_rules(&domain).await);
        self.rules.insert(domain, rules.clone()).await;
        rules
    }

    /// Number of domains with cached rules.
    pub async fn cached_domains(&self) -> u64 {
        self.rules.run_pending_tasks().await;
        self.rules.entry_count()
    }

    async fn fetch_rules(&self, domain: &str) -> RobotsRules {
        let robots_url = format!("{}/robots.txt", domain);
        tracing::debug!("Fetching {}", robots_url);

        let response = match self
            .client
            .get(&robots_url)
            .timeout(self.timeout)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!("Could not read robots.txt for {}: {}", domain, e);
                return RobotsRules::allow_all();
            }
        };

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            tracing::debug!("robots.txt for {} returned {}; disallowing", domain, status);
            return RobotsRules::deny_all();
        }
        if !status.is_success() {
            return RobotsRules::allow_all();
        }

        match response.text().await {
            Ok(body) => parse_robots(&body, ROBOTS_USER_AGENT),
            Err(e) => {
                tracing::debug!("Could not read robots.txt body for {}: {}", domain, e);
                RobotsRules::allow_all()
            }
        }
    }
}
