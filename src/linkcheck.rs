//! Link-health checking.
//!
//! Walks the rendered HTML of every published post, probes each outbound
//! URL, and writes `report/urlcheck.html` listing the broken ones. The
//! pass runs on the background lane — never on the pull/index path — and
//! keeps a per-URL cache (fragment stripped, timed expiry) so repeated
//! runs don't hammer the same hosts. A 429 response gets exactly one retry
//! after a fixed delay before it counts as broken.

use anyhow::{Context, Result};
use maud::{html, DOCTYPE};
use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::config::Config;
use crate::content::ContentStore;
use crate::models::{PostMetadata, UrlCheck};

const REPORT_PATH: &str = "report/urlcheck.html";

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

struct CacheEntry {
    checked_at: Instant,
    /// `None` means the link was healthy when probed.
    verdict: Option<UrlCheck>,
}

pub struct LinkChecker {
    /// Built lazily on the worker thread; a blocking client must not be
    /// constructed on the async runtime.
    client: OnceLock<Option<reqwest::blocking::Client>>,
    connect_timeout: Duration,
    request_timeout: Duration,
    work_dir: PathBuf,
    ignore_url_list: Option<PathBuf>,
    cache: Mutex<HashMap<String, CacheEntry>>,
    cache_ttl: Duration,
    retry_delay: Duration,
}

impl LinkChecker {
    pub fn new(config: &Config) -> Self {
        LinkChecker {
            client: OnceLock::new(),
            connect_timeout: Duration::from_secs(config.http.connect_timeout_secs),
            request_timeout: Duration::from_secs(config.http.request_timeout_secs),
            work_dir: config.content.work_dir.clone(),
            ignore_url_list: config.content.ignore_url_list.clone(),
            cache: Mutex::new(HashMap::new()),
            cache_ttl: Duration::from_secs(config.http.link_cache_hours * 3600),
            retry_delay: Duration::from_secs(config.http.retry_delay_secs),
        }
    }

    fn client(&self) -> Option<&reqwest::blocking::Client> {
        self.client
            .get_or_init(|| {
                let built = reqwest::blocking::Client::builder()
                    .connect_timeout(self.connect_timeout)
                    .timeout(self.request_timeout)
                    .redirect(reqwest::redirect::Policy::none())
                    .user_agent(USER_AGENT)
                    .build();
                match built {
                    Ok(client) => Some(client),
                    Err(e) => {
                        warn!(error = %e, "cannot build link-check client");
                        None
                    }
                }
            })
            .as_ref()
    }

    pub fn report_exists(&self) -> bool {
        self.work_dir.join(REPORT_PATH).exists()
    }

    /// Probes every outbound link of the given posts and writes the report.
    pub fn check_posts(&self, posts: &[PostMetadata]) {
        let ignore_prefixes = self.load_ignore_prefixes();
        let mut failures: Vec<UrlCheck> = Vec::new();

        for post in posts {
            let html_file = ContentStore::sibling_path(&post.path, "html");
            let html = match std::fs::read_to_string(&html_file) {
                Ok(html) => html,
                Err(e) => {
                    warn!(path = %html_file.display(), error = %e, "cannot read rendered page");
                    continue;
                }
            };

            for url in extract_urls(&html) {
                if is_ignored(&url, &ignore_prefixes) {
                    continue;
                }
                if let Some(check) = self.check_cached(&url, &post.url) {
                    failures.push(check);
                }
            }
        }

        // One bounded retry for rate-limited URLs, bypassing the cache.
        let rate_limited: Vec<UrlCheck> = failures
            .iter()
            .filter(|c| c.status == Some(429))
            .cloned()
            .collect();
        if !rate_limited.is_empty() {
            info!(count = rate_limited.len(), "retrying rate-limited urls");
            std::thread::sleep(self.retry_delay);
            for stale in rate_limited {
                let fresh = self.probe(&stale.url, &stale.post_url);
                self.store_verdict(&stale.url, fresh.clone());
                match fresh {
                    Some(check) => {
                        if let Some(slot) = failures.iter_mut().find(|c| c.url == stale.url) {
                            *slot = check;
                        }
                    }
                    None => failures.retain(|c| c.url != stale.url),
                }
            }
        }

        if let Err(e) = self.write_report(&failures) {
            warn!(error = %e, "cannot write link report");
        } else {
            info!(broken = failures.len(), "link report written");
        }
    }

    /// Returns the cached verdict when fresh, otherwise probes and caches.
    fn check_cached(&self, url: &str, post_url: &str) -> Option<UrlCheck> {
        let key = strip_fragment(url).to_string();

        {
            let cache = self.cache.lock().unwrap();
            if let Some(entry) = cache.get(&key) {
                if entry.checked_at.elapsed() < self.cache_ttl {
                    return entry.verdict.clone();
                }
            }
        }

        let verdict = self.probe(url, post_url);
        self.store_verdict(url, verdict.clone());
        verdict
    }

    fn store_verdict(&self, url: &str, verdict: Option<UrlCheck>) {
        let key = strip_fragment(url).to_string();
        self.cache.lock().unwrap().insert(
            key,
            CacheEntry {
                checked_at: Instant::now(),
                verdict,
            },
        );
    }

    /// Probes one URL. `None` means healthy; redirects and error statuses
    /// come back as failures with the details filled in.
    fn probe(&self, url: &str, post_url: &str) -> Option<UrlCheck> {
        let Some(client) = self.client() else {
            return Some(UrlCheck {
                url: url.to_string(),
                post_url: post_url.to_string(),
                status: None,
                location: None,
            });
        };

        match client.get(url).send() {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return None;
                }
                let location = response
                    .headers()
                    .get(reqwest::header::LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                Some(UrlCheck {
                    url: url.to_string(),
                    post_url: post_url.to_string(),
                    status: Some(status.as_u16()),
                    location,
                })
            }
            Err(e) => {
                info!(url, error = %e, "link probe failed");
                Some(UrlCheck {
                    url: url.to_string(),
                    post_url: post_url.to_string(),
                    status: None,
                    location: None,
                })
            }
        }
    }

    fn load_ignore_prefixes(&self) -> Vec<String> {
        let Some(path) = &self.ignore_url_list else {
            return Vec::new();
        };
        match std::fs::read_to_string(path) {
            Ok(content) => content
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot read ignore list");
                Vec::new()
            }
        }
    }

    fn write_report(&self, checks: &[UrlCheck]) -> Result<()> {
        let report = self.work_dir.join(REPORT_PATH);
        if let Some(parent) = report.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&report, report_page(checks))
            .with_context(|| format!("Failed to write {}", report.display()))?;
        Ok(())
    }
}

/// Extracts candidate `http(s)` URLs from rendered HTML.
pub fn extract_urls(html: &str) -> BTreeSet<String> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| Regex::new(r#"https?://[^\s"'<>]+"#).unwrap());

    pattern
        .find_iter(html)
        .map(|m| m.as_str().trim_end_matches(['.', ',', ';', ':', '!', '?', ')']))
        .filter(|u| !u.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn strip_fragment(url: &str) -> &str {
    match url.rfind('#') {
        Some(pos) => &url[..pos],
        None => url,
    }
}

fn is_ignored(url: &str, prefixes: &[String]) -> bool {
    let lower = url.to_lowercase();
    prefixes.iter().any(|p| lower.starts_with(&p.to_lowercase()))
}

fn report_page(checks: &[UrlCheck]) -> String {
    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="utf-8";
                title { "Link check report" }
            }
            body {
                h1 { "Link check report" }
                @if checks.is_empty() {
                    p { "All links healthy." }
                } @else {
                    table {
                        tr { th { "URL" } th { "Status" } th { "Location" } th { "Post" } }
                        @for check in checks {
                            tr {
                                td { a href=(check.url) { (check.url) } }
                                td {
                                    @if let Some(status) = check.status {
                                        (status)
                                    } @else {
                                        "error"
                                    }
                                }
                                td { (check.location.as_deref().unwrap_or("")) }
                                td { (check.post_url) }
                            }
                        }
                    }
                }
            }
        }
    }
    .into_string()
}
