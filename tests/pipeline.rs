//! End-to-end pipeline tests over a temporary content tree.
//!
//! These drive the library API directly — no git remote, no network. The
//! work dir is seeded like a checkout (a bare `.git` marker plus year
//! directories), rebuilds and incremental updates run for real against a
//! tantivy index in a second temp directory.

use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

use gitpress::config::Config;
use gitpress::feed;
use gitpress::index::SearchIndex;
use gitpress::models::{ChangeKind, ChangeRecord};
use gitpress::pipeline::Pipeline;
use gitpress::render::PlainHighlighter;
use gitpress::sitemap;

struct Fixture {
    _tmp: TempDir,
    work_dir: PathBuf,
    index: Arc<SearchIndex>,
    pipeline: Pipeline,
}

fn setup() -> Fixture {
    let tmp = TempDir::new().unwrap();
    let work_dir = tmp.path().join("posts");
    let index_dir = tmp.path().join("index");
    fs::create_dir_all(work_dir.join(".git")).unwrap(); // looks like a checkout

    // Pre-seed the link report so no test ever queues a link-health pass
    // (those probe real URLs).
    fs::create_dir_all(work_dir.join("report")).unwrap();
    fs::write(work_dir.join("report/urlcheck.html"), "<html></html>").unwrap();

    let config = Config::for_paths(work_dir.clone(), index_dir.clone());

    let index = Arc::new(SearchIndex::open(&index_dir).unwrap());
    let pipeline = Pipeline::new(&config, Arc::clone(&index), Box::new(PlainHighlighter)).unwrap();

    Fixture {
        _tmp: tmp,
        work_dir,
        index,
        pipeline,
    }
}

fn write_post(fixture: &Fixture, rel: &str, title: &str, published: &str, draft: bool) {
    let path = fixture.work_dir.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let content = format!(
        "---\ntitle: {}\npublished: {}\ndraft: {}\ntags: [test]\n---\nBody of {}.\n",
        title, published, draft, title
    );
    fs::write(path, content).unwrap();
}

fn record(kind: ChangeKind, old: Option<&str>, new: Option<&str>) -> ChangeRecord {
    ChangeRecord {
        kind,
        old_path: old.map(str::to_string),
        new_path: new.map(str::to_string),
    }
}

#[test]
fn test_full_rebuild_renders_and_indexes() {
    let fixture = setup();
    write_post(&fixture, "2023/first.md", "First", "2023-04-01", false);
    write_post(&fixture, "2024/second.md", "Second", "2024-05-01", false);
    write_post(&fixture, "2024/hidden.md", "Hidden", "2024-06-01", true);
    fs::write(fixture.work_dir.join("2024/broken.md"), "no header").unwrap();

    fixture.pipeline.rebuild().unwrap();

    // published posts indexed, newest first; drafts and invalid posts absent
    let urls: Vec<String> = fixture.index.query_all().into_iter().map(|p| p.url).collect();
    assert_eq!(urls, vec!["2024/second.html", "2023/first.html"]);

    // pages rendered for valid posts (drafts included), none for broken
    assert!(fixture.work_dir.join("2023/first.html").exists());
    assert!(fixture.work_dir.join("2024/second.html").exists());
    assert!(fixture.work_dir.join("2024/hidden.html").exists());
    assert!(!fixture.work_dir.join("2024/broken.html").exists());

    // downstream artifacts written unconditionally
    assert!(feed::files_exist(&fixture.work_dir));
    assert!(sitemap::file_exists(&fixture.work_dir));
}

#[test]
fn test_incremental_add_and_delete() {
    let fixture = setup();
    write_post(&fixture, "2024/a.md", "A", "2024-01-01", false);
    fixture.pipeline.rebuild().unwrap();
    assert_eq!(fixture.index.query_all().len(), 1);

    // a new post lands in the checkout and the diff reports it
    write_post(&fixture, "2024/b.md", "B", "2024-02-01", false);
    fixture
        .pipeline
        .incremental_update(&[record(ChangeKind::Add, None, Some("2024/b.md"))]);

    let urls: Vec<String> = fixture.index.query_all().into_iter().map(|p| p.url).collect();
    assert_eq!(urls, vec!["2024/b.html", "2024/a.html"]);
    assert!(fixture.work_dir.join("2024/b.html").exists());

    // the post is removed upstream
    fs::remove_file(fixture.work_dir.join("2024/b.md")).unwrap();
    fixture
        .pipeline
        .incremental_update(&[record(ChangeKind::Delete, Some("2024/b.md"), None)]);

    let urls: Vec<String> = fixture.index.query_all().into_iter().map(|p| p.url).collect();
    assert_eq!(urls, vec!["2024/a.html"]);
    assert!(!fixture.work_dir.join("2024/b.html").exists());
}

#[test]
fn test_rename_then_modify_keeps_only_new_path() {
    let fixture = setup();
    write_post(&fixture, "2020/a.md", "Original", "2020-03-01", false);
    fixture.pipeline.rebuild().unwrap();

    // the same batch renames the post and edits it under the new name
    fs::remove_file(fixture.work_dir.join("2020/a.md")).unwrap();
    write_post(&fixture, "2020/b.md", "Renamed", "2020-03-01", false);
    fixture.pipeline.incremental_update(&[
        record(ChangeKind::Rename, Some("2020/a.md"), Some("2020/b.md")),
        record(ChangeKind::Modify, None, Some("2020/b.md")),
    ]);

    let posts = fixture.index.query_all();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].url, "2020/b.html");
    assert_eq!(posts[0].title, "Renamed");
    assert!(!fixture.work_dir.join("2020/a.html").exists());
    assert!(fixture.work_dir.join("2020/b.html").exists());
}

#[test]
fn test_unparsable_post_is_implicit_delete() {
    let fixture = setup();
    write_post(&fixture, "2024/c.md", "Valid", "2024-03-01", false);
    fixture.pipeline.rebuild().unwrap();
    assert_eq!(fixture.index.query_all().len(), 1);

    // the post loses its header block in a later commit
    fs::write(fixture.work_dir.join("2024/c.md"), "header went missing").unwrap();
    fixture
        .pipeline
        .incremental_update(&[record(ChangeKind::Modify, None, Some("2024/c.md"))]);

    assert!(fixture.index.query_all().is_empty());
    assert!(!fixture.work_dir.join("2024/c.html").exists());
}

#[test]
fn test_reclassified_draft_leaves_index() {
    let fixture = setup();
    write_post(&fixture, "2024/d.md", "Public", "2024-03-01", false);
    fixture.pipeline.rebuild().unwrap();
    assert_eq!(fixture.index.query_all().len(), 1);

    write_post(&fixture, "2024/d.md", "Public", "2024-03-01", true);
    fixture
        .pipeline
        .incremental_update(&[record(ChangeKind::Modify, None, Some("2024/d.md"))]);

    assert!(fixture.index.query_all().is_empty());
}

#[test]
fn test_artifacts_regenerate_only_for_published_changes() {
    let fixture = setup();
    write_post(&fixture, "2024/pub.md", "Pub", "2024-01-01", false);
    write_post(&fixture, "2024/wip.md", "Wip", "2024-02-01", true);
    fixture.pipeline.rebuild().unwrap();

    // wipe the artifacts so regeneration is observable
    fs::remove_file(fixture.work_dir.join("feed.rss")).unwrap();
    fs::remove_file(fixture.work_dir.join("feed.atom")).unwrap();

    // touching only a draft must not rebuild the feeds
    write_post(&fixture, "2024/wip.md", "Wip again", "2024-02-01", true);
    fixture
        .pipeline
        .incremental_update(&[record(ChangeKind::Modify, None, Some("2024/wip.md"))]);
    assert!(!feed::files_exist(&fixture.work_dir));

    // touching a published post does
    write_post(&fixture, "2024/pub.md", "Pub v2", "2024-01-01", false);
    fixture
        .pipeline
        .incremental_update(&[record(ChangeKind::Modify, None, Some("2024/pub.md"))]);
    assert!(feed::files_exist(&fixture.work_dir));
}

#[test]
fn test_feed_content_reflects_index() {
    let fixture = setup();
    write_post(&fixture, "2024/feedme.md", "Feed me", "2024-04-01", false);
    fixture.pipeline.rebuild().unwrap();

    let rss = fs::read_to_string(fixture.work_dir.join("feed.rss")).unwrap();
    assert!(rss.contains("<title>Feed me</title>"));
    assert!(rss.contains("https://example.com/2024/feedme.html"));

    let sitemap_xml = fs::read_to_string(fixture.work_dir.join("sitemap.xml")).unwrap();
    assert!(sitemap_xml.contains("<loc>https://example.com/2024/feedme.html</loc>"));
}

#[test]
fn test_deleted_urls_map_from_source_paths() {
    // delete_by_urls expects rendered URLs; the pipeline maps source paths
    // before the lookup. Verify through the public API end to end.
    let fixture = setup();
    write_post(&fixture, "2023/mapme.md", "Map", "2023-01-01", false);
    fixture.pipeline.rebuild().unwrap();

    let urls: BTreeSet<String> = ["2023/mapme.html".to_string()].into();
    fixture.index.delete_by_urls(&urls).unwrap();
    assert!(fixture.index.query_all().is_empty());
}
