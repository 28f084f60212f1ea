//! Breadth-first, domain-scoped documentation crawler.
//!
//! The crawl session owns its frontier, visited set, and counters — no
//! shared state outside it. The visited set is pre-populated from the page
//! store, so re-running a crawl over an already-captured site is a cheap
//! no-op and an interrupted crawl resumes where it left off.

pub mod mirror;
pub mod page;

use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::DEFAULT_USER_AGENT;
use crate::store::SqlitePageStore;
use crate::types::RagError;

pub use mirror::PageMirror;
pub use page::{MIN_CONTENT_WORDS, ParsedPage, parse_page};

/// Crawl tuning knobs.
#[derive(Clone, Debug)]
pub struct CrawlerOptions {
    /// Fixed politeness delay between requests.
    pub request_delay: Duration,
    pub user_agent: String,
    /// When set, saved pages are mirrored as raw-text artifacts here.
    pub mirror_dir: Option<PathBuf>,
}

impl Default for CrawlerOptions {
    fn default() -> Self {
        Self {
            request_delay: Duration::from_millis(500),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            mirror_dir: None,
        }
    }
}

impl CrawlerOptions {
    pub fn from_settings(settings: &crate::config::Settings) -> Self {
        Self {
            request_delay: settings.request_delay,
            user_agent: settings.user_agent.clone(),
            mirror_dir: settings.mirror_dir.clone(),
        }
    }
}

/// Counters reported by a finished crawl.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CrawlReport {
    /// Pages saved or refreshed in the store.
    pub pages_saved: usize,
    /// Pages skipped: non-200 responses and under-threshold content.
    pub pages_skipped: usize,
    /// Pages that failed to fetch, parse, or save.
    pub pages_failed: usize,
}

/// One crawl's private state: FIFO frontier, visited set, counters.
struct CrawlSession {
    frontier: VecDeque<(Url, usize)>,
    visited: HashSet<String>,
    report: CrawlReport,
}

impl CrawlSession {
    fn new(seed: Url, visited: HashSet<String>) -> Self {
        Self {
            frontier: VecDeque::from([(seed, 0)]),
            visited,
            report: CrawlReport::default(),
        }
    }
}

/// Fetches documentation pages into the page store.
pub struct Crawler {
    client: Client,
    store: SqlitePageStore,
    options: CrawlerOptions,
    mirror: Option<PageMirror>,
}

impl Crawler {
    pub fn new(store: SqlitePageStore, options: CrawlerOptions) -> Result<Self, RagError> {
        let client = Client::builder()
            .user_agent(&options.user_agent)
            .use_rustls_tls()
            .timeout(Duration::from_secs(10))
            .build()?;
        let mirror = options.mirror_dir.clone().map(PageMirror::new);
        Ok(Self {
            client,
            store,
            options,
            mirror,
        })
    }

    /// Breadth-first crawl from `seed`, bounded by depth and page budget.
    ///
    /// Popped URLs are skipped when already visited, deeper than
    /// `max_depth`, non-HTTP, or on a different host than the seed. Only
    /// 200 responses are parsed. Pages under the content threshold are not
    /// saved, but their outbound links are still followed. Per-URL
    /// failures are logged and skipped; they never abort the crawl.
    pub async fn crawl(
        &self,
        seed: &Url,
        max_depth: usize,
        max_pages: usize,
    ) -> Result<CrawlReport, RagError> {
        if seed.host_str().is_none() {
            return Err(RagError::Config(format!("seed URL '{seed}' has no host")));
        }
        let seed_host = seed.host_str().map(str::to_string);
        let seed_port = seed.port_or_known_default();
        let visited = self.store.all_urls().await?;
        let mut session = CrawlSession::new(seed.clone(), visited);
        info!(%seed, max_depth, max_pages, "starting crawl");

        while session.report.pages_saved < max_pages {
            let Some((mut url, depth)) = session.frontier.pop_front() else {
                break;
            };
            url.set_fragment(None);
            if session.visited.contains(url.as_str()) {
                continue;
            }
            if depth > max_depth {
                continue;
            }
            if !matches!(url.scheme(), "http" | "https") {
                continue;
            }
            if url.host_str() != seed_host.as_deref()
                || url.port_or_known_default() != seed_port
            {
                debug!(%url, "outside crawl domain, skipping");
                continue;
            }

            debug!(%url, depth, "fetching");
            let body = match self.fetch(&url).await {
                Ok(Some(body)) => body,
                Ok(None) => {
                    session.report.pages_skipped += 1;
                    self.pause().await;
                    continue;
                }
                Err(err) => {
                    warn!(%url, error = %err, "fetch failed, skipping");
                    session.report.pages_failed += 1;
                    continue;
                }
            };
            let parsed = match parse_page(&body, &url) {
                Ok(parsed) => parsed,
                Err(err) => {
                    warn!(%url, error = %err, "parse failed, skipping");
                    session.report.pages_failed += 1;
                    self.pause().await;
                    continue;
                }
            };
            session.visited.insert(url.as_str().to_string());

            if parsed.word_count >= MIN_CONTENT_WORDS {
                match self
                    .store
                    .upsert(url.as_str(), &parsed.title, &parsed.content)
                    .await
                {
                    Ok(created) => {
                        info!(%url, created, code_blocks = parsed.code_blocks, "saved page");
                        if let Some(mirror) = &self.mirror {
                            if let Err(err) =
                                mirror.write(&url, &parsed.title, &parsed.content).await
                            {
                                warn!(%url, error = %err, "failed to mirror page");
                            }
                        }
                        session.report.pages_saved += 1;
                    }
                    Err(err) => {
                        warn!(%url, error = %err, "failed to save page");
                        session.report.pages_failed += 1;
                    }
                }
            } else {
                debug!(%url, words = parsed.word_count, "below content threshold, not saved");
                session.report.pages_skipped += 1;
            }

            // Outbound links are followed even from pages too thin to save.
            if depth < max_depth {
                for link in parsed.links {
                    if !session.visited.contains(link.as_str()) {
                        session.frontier.push_back((link, depth + 1));
                    }
                }
            }

            self.pause().await;
        }

        info!(
            saved = session.report.pages_saved,
            skipped = session.report.pages_skipped,
            failed = session.report.pages_failed,
            "crawl finished"
        );
        Ok(session.report)
    }

    /// Fetches one URL; `Ok(None)` means a non-200 response.
    async fn fetch(&self, url: &Url) -> Result<Option<String>, RagError> {
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            debug!(%url, %status, "skipping non-200 response");
            return Ok(None);
        }
        Ok(Some(response.text().await?))
    }

    async fn pause(&self) {
        if !self.options.request_delay.is_zero() {
            tokio::time::sleep(self.options.request_delay).await;
        }
    }
}
