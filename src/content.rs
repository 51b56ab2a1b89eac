//! The on-disk document store.
//!
//! Posts live in four-digit year directories under the work dir
//! (`2024/some-post.md`). The store scans them, reads and renders posts,
//! and owns the rendered `.html` artifacts that sit next to their sources.

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::config::{Config, SiteConfig};
use crate::models::PostContent;
use crate::post;
use crate::render::{self, Highlighter};

pub struct ContentStore {
    work_dir: PathBuf,
    include: GlobSet,
    site: SiteConfig,
}

/// Outcome of re-rendering a batch of changed sources: the posts that were
/// rendered, and the paths that turned out not to be valid posts (their
/// artifacts were removed; the caller must drop their index entries too).
#[derive(Debug, Default)]
pub struct Regenerated {
    pub posts: Vec<PostContent>,
    pub invalid: BTreeSet<String>,
}

impl ContentStore {
    pub fn new(config: &Config) -> Result<Self> {
        let include = build_globset(&config.content.include_globs)?;
        Ok(ContentStore {
            work_dir: config.content.work_dir.clone(),
            include,
            site: config.site.clone(),
        })
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Sibling of `file` with its extension replaced.
    pub fn sibling_path(file: &Path, extension: &str) -> PathBuf {
        file.with_extension(extension)
    }

    /// Scans every four-digit year directory for source files, sorted for
    /// deterministic ordering.
    pub fn collect_sources(&self) -> Vec<PathBuf> {
        let mut sources = Vec::new();

        let entries = match std::fs::read_dir(&self.work_dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %self.work_dir.display(), error = %e, "cannot list work dir");
                return sources;
            }
        };

        for entry in entries.flatten() {
            let dir = entry.path();
            if !dir.is_dir() || !is_year_dir(&entry.file_name().to_string_lossy()) {
                continue;
            }

            for file in WalkDir::new(&dir).into_iter().filter_map(|e| e.ok()) {
                if !file.file_type().is_file() {
                    continue;
                }
                let path = file.path();
                let relative = path.strip_prefix(&self.work_dir).unwrap_or(path);
                if self.include.is_match(relative.to_string_lossy().as_ref()) {
                    sources.push(path.to_path_buf());
                }
            }
        }

        sources.sort();
        sources
    }

    /// Reads and renders one post.
    ///
    /// Returns `None` when the file cannot be read or has no valid header
    /// block; in the latter case any stale rendered artifact is removed so
    /// the published tree never serves a page for an invalid source.
    pub fn read_post(&self, md_file: &Path, highlighter: &dyn Highlighter) -> Option<PostContent> {
        let content = match std::fs::read_to_string(md_file) {
            Ok(content) => content,
            Err(e) => {
                warn!(path = %md_file.display(), error = %e, "cannot read post");
                return None;
            }
        };

        let extracted = match post::extract_post(&self.work_dir, md_file, &content) {
            Some(extracted) => extracted,
            None => {
                let html_file = Self::sibling_path(md_file, "html");
                if let Err(e) = remove_if_exists(&html_file) {
                    warn!(path = %html_file.display(), error = %e, "cannot remove stale page");
                }
                return None;
            }
        };

        let html = render::render_html(&extracted.markdown, highlighter);
        Some(PostContent {
            metadata: extracted.metadata,
            markdown: extracted.markdown,
            html,
        })
    }

    /// Writes the rendered page artifact next to the source file.
    pub fn write_page(&self, post: &PostContent) -> Result<()> {
        let html_file = Self::sibling_path(&post.metadata.path, "html");
        let page = render::post_page(&self.site, post);
        std::fs::write(&html_file, page)
            .with_context(|| format!("Failed to write {}", html_file.display()))?;
        Ok(())
    }

    /// Removes the rendered artifacts for the given source paths (relative
    /// to the work dir). Missing artifacts are fine; other I/O errors are
    /// logged and skipped.
    pub fn delete_pages(&self, sources: &BTreeSet<String>) {
        for source in sources {
            let html_file = Self::sibling_path(&self.work_dir.join(source), "html");
            match remove_if_exists(&html_file) {
                Ok(removed) => {
                    if removed {
                        info!(path = %html_file.display(), "removed page");
                    }
                }
                Err(e) => warn!(path = %html_file.display(), error = %e, "cannot remove page"),
            }
        }
    }

    /// Re-reads and re-renders the given source paths (relative to the work
    /// dir), writing a fresh page for each valid post.
    pub fn regenerate(
        &self,
        sources: &BTreeSet<String>,
        highlighter: &dyn Highlighter,
    ) -> Regenerated {
        let mut out = Regenerated::default();

        for source in sources {
            let md_file = self.work_dir.join(source);
            info!(path = %md_file.display(), "rendering");

            match self.read_post(&md_file, highlighter) {
                Some(post) => {
                    if let Err(e) = self.write_page(&post) {
                        warn!(path = %md_file.display(), error = %e, "cannot write page");
                    }
                    out.posts.push(post);
                }
                None => {
                    out.invalid.insert(source.clone());
                }
            }
        }

        out
    }
}

fn is_year_dir(name: &str) -> bool {
    name.len() == 4 && name.chars().all(|c| c.is_ascii_digit())
}

/// Returns whether the file existed.
fn remove_if_exists(path: &Path) -> std::io::Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::PlainHighlighter;
    use tempfile::TempDir;

    fn store(tmp: &TempDir) -> ContentStore {
        let config = Config::for_paths(tmp.path().to_path_buf(), tmp.path().join("index"));
        ContentStore::new(&config).unwrap()
    }

    fn write(tmp: &TempDir, rel: &str, content: &str) -> PathBuf {
        let path = tmp.path().join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, content).unwrap();
        path
    }

    const POST: &str = "---\ntitle: T\npublished: 2024-03-01\n---\nBody.";

    #[test]
    fn test_collect_only_year_dirs() {
        let tmp = TempDir::new().unwrap();
        write(&tmp, "2024/a.md", POST);
        write(&tmp, "2023/sub/b.md", POST);
        write(&tmp, "drafts/c.md", POST);
        write(&tmp, "2024/notes.txt", "not a post");
        write(&tmp, "README.md", "root file");

        let sources = store(&tmp).collect_sources();
        let names: Vec<String> = sources
            .iter()
            .map(|p| {
                p.strip_prefix(tmp.path())
                    .unwrap()
                    .to_string_lossy()
                    .replace('\\', "/")
            })
            .collect();
        assert_eq!(names, vec!["2023/sub/b.md", "2024/a.md"]);
    }

    #[test]
    fn test_read_post_renders_html() {
        let tmp = TempDir::new().unwrap();
        let md = write(&tmp, "2024/a.md", POST);
        let post = store(&tmp).read_post(&md, &PlainHighlighter).unwrap();
        assert_eq!(post.metadata.url, "2024/a.html");
        assert!(post.html.contains("<p>Body.</p>"));
    }

    #[test]
    fn test_invalid_post_removes_stale_page() {
        let tmp = TempDir::new().unwrap();
        let md = write(&tmp, "2024/a.md", "no header here");
        let stale = tmp.path().join("2024/a.html");
        std::fs::write(&stale, "<html>old</html>").unwrap();

        assert!(store(&tmp).read_post(&md, &PlainHighlighter).is_none());
        assert!(!stale.exists());
    }

    #[test]
    fn test_regenerate_and_delete_pages() {
        let tmp = TempDir::new().unwrap();
        write(&tmp, "2024/a.md", POST);
        write(&tmp, "2024/bad.md", "not a post");
        let store = store(&tmp);

        let sources: BTreeSet<String> =
            ["2024/a.md".to_string(), "2024/bad.md".to_string()].into();
        let regen = store.regenerate(&sources, &PlainHighlighter);
        assert_eq!(regen.posts.len(), 1);
        assert!(regen.invalid.contains("2024/bad.md"));
        assert!(tmp.path().join("2024/a.html").exists());

        store.delete_pages(&["2024/a.md".to_string()].into());
        assert!(!tmp.path().join("2024/a.html").exists());
        // deleting again is a no-op
        store.delete_pages(&["2024/a.md".to_string()].into());
    }
}
