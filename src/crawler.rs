use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use crate::errors::AppError;
use crate::extractor;
use crate::fetcher::PageFetcher;
use crate::models::PageSnapshot;
use crate::retry::RetryPolicy;
use crate::robots::RobotsCache;
use crate::url_normalizer::{self, NormalizedUrl};

pub const DEFAULT_MAX_PAGES: usize = 5;
pub const DEFAULT_CRAWL_TIMEOUT: Duration = Duration::from_secs(15);

/// Breadth-first, same-site crawler that honours robots.txt.
///
/// Each `crawl` call owns its frontier and seen set; the robots cache is the
/// only state shared between calls on the same instance.
#[derive(Clone)]
pub struct SiteCrawler {
    fetcher: PageFetcher,
    robots: RobotsCache,
    max_pages: usize,
}

impl SiteCrawler {
    /// Creates a crawler with its own robots cache, sharing the fetcher's HTTP client.
    pub fn new(fetcher: PageFetcher, max_pages: usize) -> Self {
        let robots = RobotsCache::new(fetcher.client().clone(), fetcher.timeout());
        Self::with_robots(fetcher, robots, max_pages)
    }

    pub fn with_robots(fetcher: PageFetcher, robots: RobotsCache, max_pages: usize) -> Self {
        Self {
            fetcher,
            robots,
            max_pages,
        }
    }

    /// Crawler with the default timeout and retry policy.
    pub fn with_defaults(max_pages: usize) -> Result<Self, AppError> {
        let fetcher = PageFetcher::new(DEFAULT_CRAWL_TIMEOUT, RetryPolicy::default())?;
        Ok(Self::new(fetcher, max_pages))
    }

    pub fn max_pages(&self) -> usize {
        self.max_pages
    }

    /// Same fetcher and robots cache, different page bound.
    pub fn with_max_pages(&self, max_pages: usize) -> Self {
        Self {
            max_pages,
            ..self.clone()
        }
    }

    pub fn robots(&self) -> &RobotsCache {
        &self.robots
    }

    /// Crawls up to `max_pages` pages of the site rooted at `url`.
    ///
    /// An invalid seed, a fully disallowed site or failing fetches all yield
    /// fewer (possibly zero) snapshots; none of them is an error.
    pub async fn crawl(&self, url: &str) -> Vec<PageSnapshot> {
        let Some(seed) = url_normalizer::normalize(url) else {
            tracing::debug!("Invalid URL skipped: {}", url);
            return Vec::new();
        };

        let max_frontier = self.max_pages * 2;
        let site = seed.authority();
        let site = (site.0.map(str::to_string), site.1);

        let mut frontier: VecDeque<NormalizedUrl> = VecDeque::from([seed.clone()]);
        let mut seen: HashSet<NormalizedUrl> = HashSet::new();
        let mut snapshots: Vec<PageSnapshot> = Vec::new();

        while snapshots.len() < self.max_pages {
            let Some(target) = frontier.pop_front() else {
                break;
            };
            if !seen.insert(target.clone()) {
                continue;
            }
            if !self.robots.is_allowed(&target).await {
                tracing::debug!("Disallowed by robots.txt: {}", target);
                continue;
            }

            let Some(html) = self.fetcher.fetch(target.as_str()).await else {
                continue;
            };

            let (snapshot, links) = snapshot_page(&target, html);
            snapshots.push(snapshot);

            for link in links {
                if frontier.len() >= max_frontier {
                    break;
                }
                let (host, port) = link.authority();
                if host != site.0.as_deref() || port != site.1 {
                    continue;
                }
                if seen.contains(&link) || frontier.contains(&link) {
                    continue;
                }
                frontier.push_back(link);
            }
        }

        tracing::debug!("Crawled {} page(s) from {}", snapshots.len(), seed);
        snapshots
    }
}

fn snapshot_page(url: &NormalizedUrl, html: String) -> (PageSnapshot, Vec<NormalizedUrl>) {
    let extracted = extractor::extract(&html);
    let links = extractor::extract_links(&html, url.as_url());
    let language = extractor::detect_language(&extracted.text);

    let snapshot = PageSnapshot {
        url: url.as_str().to_string(),
        title: extracted.title,
        language,
        raw_html: html,
        extracted_text: extracted.text,
    };
    (snapshot, links)
}
