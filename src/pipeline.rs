//! Pipeline orchestration.
//!
//! One trigger — startup, timer, or webhook — runs one cycle:
//!
//! 1. No local checkout yet → clone and rebuild everything.
//! 2. Checkout present → pull; a non-empty diff drives an incremental
//!    update through the classifier (deletions strictly before upserts).
//! 3. No diff but no usable index → rebuild everything.
//! 4. Otherwise idle: regenerate whichever downstream artifacts are
//!    missing.
//!
//! The cycle body is synchronous and single-threaded; concurrent triggers
//! are single-flighted via `try_lock` — a trigger arriving mid-cycle is
//! dropped, not queued. Per-item failures never abort the cycle: an
//! unparsable post becomes an implicit delete, a failed index write is
//! logged and reconciled by the next successful cycle.

use anyhow::Result;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use tracing::{error, info};

use crate::classify;
use crate::config::{Config, HttpConfig, SiteConfig};
use crate::content::ContentStore;
use crate::feed;
use crate::index::SearchIndex;
use crate::linkcheck::LinkChecker;
use crate::models::{ChangeRecord, PostMetadata};
use crate::post;
use crate::render::Highlighter;
use crate::sitemap;
use crate::sync::GitSync;
use crate::worker::BackgroundLane;

/// Queued-but-unstarted link checks beyond this are dropped.
const LANE_CAPACITY: usize = 4;

pub struct Pipeline {
    store: ContentStore,
    sync: GitSync,
    index: Arc<SearchIndex>,
    link_checker: Arc<LinkChecker>,
    highlighter: Box<dyn Highlighter>,
    lane: BackgroundLane,
    site: SiteConfig,
    http: HttpConfig,
    running: Mutex<()>,
}

impl Pipeline {
    pub fn new(
        config: &Config,
        index: Arc<SearchIndex>,
        highlighter: Box<dyn Highlighter>,
    ) -> Result<Self> {
        Ok(Pipeline {
            store: ContentStore::new(config)?,
            sync: GitSync::new(config),
            index,
            link_checker: Arc::new(LinkChecker::new(config)),
            highlighter,
            lane: BackgroundLane::new(LANE_CAPACITY),
            site: config.site.clone(),
            http: config.http.clone(),
            running: Mutex::new(()),
        })
    }

    /// Runs one pipeline cycle. A cycle already in flight makes this a
    /// no-op; a remote sync failure aborts the cycle (the next trigger
    /// starts over). Blocking; callers on the async runtime must use
    /// `spawn_blocking`.
    pub fn run_cycle(&self) -> Result<()> {
        let _guard = match self.running.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                info!("pipeline cycle already running, trigger dropped");
                return Ok(());
            }
        };

        if self.sync.clone_if_missing()? {
            info!("fresh clone, rebuilding everything");
            self.full_rebuild();
            return Ok(());
        }

        let changes = self.sync.pull()?;
        if !changes.is_empty() {
            for change in &changes {
                info!(?change, "change");
            }
            self.incremental_update(&changes);
        } else if !self.index.has_index() {
            info!("no index, rebuilding everything");
            self.full_rebuild();
        } else {
            self.ensure_artifacts();
        }

        Ok(())
    }

    /// Forces a full rebuild regardless of diff state (CLI `rebuild`).
    pub fn rebuild(&self) -> Result<()> {
        let _guard = match self.running.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                info!("pipeline cycle already running, trigger dropped");
                return Ok(());
            }
        };
        self.sync.clone_if_missing()?;
        self.full_rebuild();
        Ok(())
    }

    /// Applies an already-obtained diff: classify, drop deleted artifacts
    /// and index entries, re-render and re-index the rest. Downstream
    /// artifacts are regenerated only when a published post was affected.
    pub fn incremental_update(&self, changes: &[ChangeRecord]) {
        let set = classify::classify(changes);
        info!(
            deleted = set.deleted.len(),
            changed = set.changed_or_new.len(),
            "incremental update"
        );

        // Deletions first, re-indexing second: a renamed post must lose its
        // old entry before the new path is written.
        self.store.delete_pages(&set.deleted);
        self.delete_index_entries(&set.deleted);

        let regen = self.store.regenerate(&set.changed_or_new, &*self.highlighter);
        // An unparsable changed post is an implicit delete of its artifacts.
        self.delete_index_entries(&regen.invalid);

        if let Err(e) = self.index.upsert_batch(&regen.posts) {
            error!(error = %e, "index update failed");
        }

        if regen.posts.iter().any(|p| !p.metadata.draft) {
            info!("published post changed, regenerating artifacts");
            self.write_feeds_and_sitemap();
        }
    }

    fn full_rebuild(&self) {
        let sources = self.store.collect_sources();
        info!(sources = sources.len(), "full rebuild");

        let mut posts = Vec::new();
        for source in &sources {
            if let Some(content) = self.store.read_post(source, &*self.highlighter) {
                if let Err(e) = self.store.write_page(&content) {
                    error!(path = %source.display(), error = %e, "cannot write page");
                }
                posts.push(content);
            }
        }

        if let Err(e) = self.index.drop_all() {
            error!(error = %e, "index drop failed");
        }
        if let Err(e) = self.index.upsert_batch(&posts) {
            error!(error = %e, "index rebuild failed");
        }

        self.write_feeds_and_sitemap();
    }

    /// Idle cycle: regenerate only the artifacts that are missing.
    fn ensure_artifacts(&self) {
        let work_dir = self.store.work_dir();
        let posts = self.index.query_all();

        if !feed::files_exist(work_dir) {
            info!("feeds missing, regenerating");
            feed::write_feeds(&self.site, work_dir, &posts);
        }
        if !sitemap::file_exists(work_dir) {
            info!("sitemap missing, regenerating");
            sitemap::write_sitemap(&self.site, work_dir, &posts);
            self.ping_search_engines();
        }
        if !self.link_checker.report_exists() {
            info!("link report missing, scheduling check");
            self.submit_link_check(posts);
        }
    }

    fn write_feeds_and_sitemap(&self) {
        let posts = self.index.query_all();
        let work_dir = self.store.work_dir();

        feed::write_feeds(&self.site, work_dir, &posts);
        sitemap::write_sitemap(&self.site, work_dir, &posts);
        self.ping_search_engines();

        if !self.link_checker.report_exists() {
            self.submit_link_check(posts);
        }
    }

    fn ping_search_engines(&self) {
        if self.http.ping_search_engines {
            sitemap::ping_search_engines(&self.site, &self.http);
        }
    }

    /// Queues a link-health pass over all published posts on the
    /// background lane. Returns whether the job was accepted.
    pub fn trigger_link_check(&self) -> bool {
        self.submit_link_check(self.index.query_all())
    }

    fn submit_link_check(&self, posts: Vec<PostMetadata>) -> bool {
        let checker = Arc::clone(&self.link_checker);
        self.lane
            .try_submit("link-check", move || checker.check_posts(&posts))
    }

    fn delete_index_entries(&self, sources: &BTreeSet<String>) {
        if sources.is_empty() {
            return;
        }
        let urls: BTreeSet<String> = sources
            .iter()
            .map(|p| post::url_for_source_path(p))
            .collect();
        if let Err(e) = self.index.delete_by_urls(&urls) {
            error!(error = %e, "index delete failed");
        }
    }
}
