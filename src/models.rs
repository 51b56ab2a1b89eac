//! Core data models used throughout gitpress.
//!
//! These types represent the posts, change records, and query results that
//! flow through the sync, rendering, and indexing pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Parsed YAML header block of a post, before URL derivation.
#[derive(Debug, Clone, Deserialize)]
pub struct PostHeader {
    pub title: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub summary: Option<String>,
    pub published: String,
    #[serde(default)]
    pub updated: Option<String>,
}

/// Metadata of a post as it lives in (or is headed for) the search index.
///
/// `url` is the stable key: the source path relative to the content root
/// with the extension swapped to `.html` and separators normalized to `/`.
#[derive(Debug, Clone, Serialize)]
pub struct PostMetadata {
    pub url: String,
    pub path: PathBuf,
    pub title: String,
    pub summary: Option<String>,
    pub tags: Vec<String>,
    pub draft: bool,
    pub published: DateTime<Utc>,
    pub updated: Option<DateTime<Utc>>,
}

impl PostMetadata {
    /// The update time shown to readers: `updated` when set, else `published`.
    pub fn effective_updated(&self) -> DateTime<Utc> {
        self.updated.unwrap_or(self.published)
    }
}

/// A post read from disk: metadata plus raw markdown and rendered HTML body.
#[derive(Debug, Clone)]
pub struct PostContent {
    pub metadata: PostMetadata,
    pub markdown: String,
    pub html: String,
}

/// How a path changed between two revisions of the content repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Add,
    Copy,
    Delete,
    Modify,
    Rename,
    Other,
}

impl ChangeKind {
    /// Maps a `git diff --name-status` status letter. Rename and copy
    /// statuses carry a similarity score suffix (`R100`, `C75`) which is
    /// ignored here. Unknown letters map to `Other`.
    pub fn from_status(status: &str) -> Self {
        match status.chars().next() {
            Some('A') => ChangeKind::Add,
            Some('C') => ChangeKind::Copy,
            Some('D') => ChangeKind::Delete,
            Some('M') => ChangeKind::Modify,
            Some('R') => ChangeKind::Rename,
            _ => ChangeKind::Other,
        }
    }
}

/// One entry of a version-control diff, as produced by [`crate::sync`].
#[derive(Debug, Clone)]
pub struct ChangeRecord {
    pub kind: ChangeKind,
    pub old_path: Option<String>,
    pub new_path: Option<String>,
}

/// Output of the change classifier: paths to drop and paths to reprocess.
///
/// The two sets are applied in order — every deletion before any upsert —
/// so a rename's old path never shadows its new one.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub deleted: BTreeSet<String>,
    pub changed_or_new: BTreeSet<String>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.deleted.is_empty() && self.changed_or_new.is_empty()
    }
}

/// Result of probing one outbound link found in a rendered post.
///
/// `status: None` means the request never got an HTTP response (DNS
/// failure, timeout, TLS error).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlCheck {
    pub url: String,
    pub post_url: String,
    pub status: Option<u16>,
    pub location: Option<String>,
}

/// One year link in the query surface's navigation strip.
#[derive(Debug, Clone, Serialize)]
pub struct YearNav {
    pub year: i32,
    pub current: bool,
}
