//! Post metadata extraction.
//!
//! Every post starts with a YAML header block fenced by `---` lines,
//! followed by the markdown body:
//!
//! ```text
//! ---
//! title: A post
//! published: 2024-03-01
//! tags: [rust, search]
//! ---
//! Body text...
//! ```
//!
//! A file without a recognizable header block is not a post. Callers must
//! then remove any previously rendered or indexed artifacts for that path.

use chrono::{DateTime, NaiveDate, Utc};
use std::path::Path;
use tracing::warn;

use crate::models::{PostHeader, PostMetadata};

/// A successfully extracted post: metadata plus the markdown body that
/// follows the header block.
#[derive(Debug, Clone)]
pub struct ExtractedPost {
    pub metadata: PostMetadata,
    pub markdown: String,
}

/// Splits raw content into `(header, body)`.
///
/// The content must start with `---`; the header runs to the next `---`.
/// Returns `None` when either delimiter is missing.
pub fn split_header(content: &str) -> Option<(&str, &str)> {
    let rest = content.strip_prefix("---")?;
    let end = rest.find("---")?;
    Some((&rest[..end], &rest[end + 3..]))
}

/// Extracts metadata and body from raw post content.
///
/// Returns `None` when the file is not a valid post: missing header
/// delimiters, unparsable YAML, or an unreadable `published` date. The
/// reason is logged; the caller treats the file as absent.
pub fn extract_post(work_dir: &Path, md_file: &Path, content: &str) -> Option<ExtractedPost> {
    let (header_str, body) = match split_header(content) {
        Some(parts) => parts,
        None => {
            warn!(path = %md_file.display(), "no header block, not a post");
            return None;
        }
    };

    let header: PostHeader = match serde_yaml::from_str(header_str) {
        Ok(h) => h,
        Err(e) => {
            warn!(path = %md_file.display(), error = %e, "unparsable header block");
            return None;
        }
    };

    let published = match parse_date(&header.published) {
        Some(ts) => ts,
        None => {
            warn!(
                path = %md_file.display(),
                value = %header.published,
                "unreadable published date"
            );
            return None;
        }
    };

    let updated = match &header.updated {
        Some(raw) => match parse_date(raw) {
            Some(ts) => Some(ts),
            None => {
                warn!(path = %md_file.display(), value = %raw, "unreadable updated date");
                return None;
            }
        },
        None => None,
    };

    let metadata = PostMetadata {
        url: derive_url(work_dir, md_file),
        path: md_file.to_path_buf(),
        title: header.title,
        summary: header.summary,
        tags: header.tags,
        draft: header.draft,
        published,
        updated,
    };

    Some(ExtractedPost {
        metadata,
        markdown: body.to_string(),
    })
}

/// Derives the stable URL for a source file: the path relative to the
/// content root with the extension swapped to `.html` and separators
/// normalized to forward slashes.
pub fn derive_url(work_dir: &Path, md_file: &Path) -> String {
    let relative = md_file.strip_prefix(work_dir).unwrap_or(md_file);
    let mut url = relative.to_string_lossy().replace('\\', "/");
    if let Some(dot) = url.rfind('.') {
        url.truncate(dot);
    }
    url.push_str(".html");
    url
}

/// Maps a source path string (as it appears in a diff, relative to the
/// content root) to the rendered-artifact URL used as the index key.
pub fn url_for_source_path(source_path: &str) -> String {
    let mut url = source_path.replace('\\', "/");
    if let Some(dot) = url.rfind('.') {
        url.truncate(dot);
    }
    url.push_str(".html");
    url
}

/// Parses a header date: RFC 3339 first, then plain `YYYY-MM-DD`
/// (midnight UTC).
fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const VALID: &str = "---\ntitle: Hello\npublished: 2024-03-01\ntags: [rust]\n---\n# Body\n\nText.";

    #[test]
    fn test_split_header() {
        let (header, body) = split_header(VALID).unwrap();
        assert!(header.contains("title: Hello"));
        assert!(body.contains("# Body"));
    }

    #[test]
    fn test_split_header_missing_open() {
        assert!(split_header("title: Hello\n---\nbody").is_none());
    }

    #[test]
    fn test_split_header_missing_close() {
        assert!(split_header("---\ntitle: Hello\nbody").is_none());
    }

    #[test]
    fn test_extract_valid_post() {
        let work_dir = PathBuf::from("/work");
        let md = work_dir.join("2024").join("hello.md");
        let post = extract_post(&work_dir, &md, VALID).unwrap();
        assert_eq!(post.metadata.url, "2024/hello.html");
        assert_eq!(post.metadata.title, "Hello");
        assert_eq!(post.metadata.tags, vec!["rust"]);
        assert!(!post.metadata.draft);
        assert!(post.metadata.updated.is_none());
        assert!(post.markdown.contains("# Body"));
    }

    #[test]
    fn test_extract_draft_flag() {
        let content = "---\ntitle: WIP\ndraft: true\npublished: 2024-01-05\n---\ntext";
        let work_dir = PathBuf::from("/work");
        let post = extract_post(&work_dir, &work_dir.join("2024/wip.md"), content).unwrap();
        assert!(post.metadata.draft);
    }

    #[test]
    fn test_extract_not_a_post() {
        let work_dir = PathBuf::from("/work");
        assert!(extract_post(&work_dir, &work_dir.join("2024/x.md"), "just text").is_none());
    }

    #[test]
    fn test_extract_bad_published_date() {
        let content = "---\ntitle: X\npublished: someday\n---\ntext";
        let work_dir = PathBuf::from("/work");
        assert!(extract_post(&work_dir, &work_dir.join("2024/x.md"), content).is_none());
    }

    #[test]
    fn test_extract_rfc3339_dates() {
        let content =
            "---\ntitle: X\npublished: 2023-06-01T10:30:00Z\nupdated: 2023-07-02T08:00:00+02:00\n---\ntext";
        let work_dir = PathBuf::from("/work");
        let post = extract_post(&work_dir, &work_dir.join("2023/x.md"), content).unwrap();
        assert_eq!(post.metadata.published.timestamp(), 1_685_615_400);
        let updated = post.metadata.updated.unwrap();
        assert_eq!(updated.timestamp(), 1_688_277_600);
    }

    #[test]
    fn test_url_for_source_path() {
        assert_eq!(url_for_source_path("2020/a.md"), "2020/a.html");
        assert_eq!(url_for_source_path("2020\\b.md"), "2020/b.html");
    }
}
