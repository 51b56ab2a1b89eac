//! The persistent full-text search index.
//!
//! A directory-backed tantivy index owning the authoritative list of
//! published posts. Every post is keyed by its rendered URL; re-indexing a
//! URL replaces the prior entry (delete-by-term plus insert, committed as
//! one batch). Draft posts are never indexed — upserting a draft removes
//! whatever was indexed under its URL before.
//!
//! All queries return posts sorted by published date, newest first, capped
//! at [`RESULT_CAP`] matches. Query failures (including malformed free-text
//! syntax) degrade to an empty result set; they never reach the caller as
//! errors.

use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Utc};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};
use tantivy::collector::TopDocs;
use tantivy::query::{AllQuery, Query, QueryParser, TermQuery};
use tantivy::schema::{
    Field, IndexRecordOption, Schema, Value, FAST, INDEXED, STORED, STRING, TEXT,
};
use tantivy::{Index, IndexReader, IndexWriter, Order, ReloadPolicy, TantivyDocument, Term};
use tracing::{error, info, warn};

use crate::models::{PostContent, PostMetadata};
use crate::render;

/// Hard cap on the number of matches any single query returns.
pub const RESULT_CAP: usize = 1000;

const WRITER_BUDGET_BYTES: usize = 50_000_000;

struct Fields {
    url: Field,
    path: Field,
    title: Field,
    summary: Field,
    body: Field,
    tags: Field,
    published_ts: Field,
    published_year: Field,
    updated_ts: Field,
}

pub struct SearchIndex {
    index: Index,
    reader: IndexReader,
    writer: Mutex<IndexWriter>,
    fields: Fields,
    dir: PathBuf,
    /// Distinct years with at least one published post. Rebuilt from the
    /// index at open, extended on upsert. Not pruned on delete: a year can
    /// stay listed until the next full rebuild.
    years: RwLock<BTreeSet<i32>>,
}

impl SearchIndex {
    /// Opens (or creates) the index in `dir` and rebuilds the
    /// published-years cache from its contents.
    ///
    /// The writer holds the directory lock for the lifetime of the value;
    /// open the index once per process.
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create index directory: {}", dir.display()))?;

        let schema = build_schema();
        let index = if dir.join("meta.json").exists() {
            Index::open_in_dir(dir)
                .with_context(|| format!("Failed to open index in {}", dir.display()))?
        } else {
            Index::create_in_dir(dir, schema.clone())
                .with_context(|| format!("Failed to create index in {}", dir.display()))?
        };

        let reader: IndexReader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .context("Failed to create index reader")?;

        let writer = index
            .writer(WRITER_BUDGET_BYTES)
            .context("Failed to create index writer")?;

        let fields = Fields::from_schema(&index.schema());

        let search_index = SearchIndex {
            index,
            reader,
            writer: Mutex::new(writer),
            fields,
            dir: dir.to_path_buf(),
            years: RwLock::new(BTreeSet::new()),
        };

        let years: BTreeSet<i32> = search_index
            .query_all()
            .iter()
            .map(|post| post.published.year())
            .collect();
        *search_index.years.write().unwrap() = years;

        Ok(search_index)
    }

    /// True iff the index directory holds actual segment data — more than
    /// the lock and bookkeeping files tantivy writes on open.
    pub fn has_index(&self) -> bool {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                error!(error = %e, "has_index");
                return false;
            }
        };

        entries.flatten().any(|entry| {
            let name = entry.file_name().to_string_lossy().to_string();
            name != "meta.json" && name != ".managed.json" && !name.ends_with(".lock")
        })
    }

    /// Replaces the entry of every non-draft post in the batch and commits
    /// once. Draft posts are removed instead of written, so a post
    /// reclassified as draft disappears from the index. No-op on empty
    /// input.
    pub fn upsert_batch(&self, posts: &[PostContent]) -> Result<()> {
        if posts.is_empty() {
            return Ok(());
        }

        let mut writer = self.writer.lock().unwrap();
        let mut indexed_years = Vec::new();

        for post in posts {
            let metadata = &post.metadata;
            writer.delete_term(Term::from_field_text(self.fields.url, &metadata.url));

            if metadata.draft {
                continue;
            }

            let mut doc = TantivyDocument::new();
            doc.add_text(self.fields.url, &metadata.url);
            doc.add_text(self.fields.path, metadata.path.to_string_lossy().as_ref());
            doc.add_text(self.fields.title, &metadata.title);
            if let Some(summary) = &metadata.summary {
                doc.add_text(self.fields.summary, summary);
            }

            // The body field only feeds scoring: title, summary, and the
            // plain text of the rendered markdown, never stored.
            let mut text = metadata.title.clone();
            if let Some(summary) = &metadata.summary {
                text.push('\n');
                text.push_str(summary);
            }
            text.push('\n');
            text.push_str(&render::plain_text(&post.markdown));
            doc.add_text(self.fields.body, &text);

            for tag in &metadata.tags {
                doc.add_text(self.fields.tags, tag);
            }

            doc.add_i64(self.fields.published_ts, metadata.published.timestamp());
            doc.add_i64(self.fields.published_year, metadata.published.year() as i64);
            if let Some(updated) = metadata.updated {
                doc.add_i64(self.fields.updated_ts, updated.timestamp());
            }

            match writer.add_document(doc) {
                Ok(_) => indexed_years.push(metadata.published.year()),
                Err(e) => warn!(url = %metadata.url, error = %e, "failed to add document"),
            }
        }

        writer.commit().context("index commit failed")?;
        drop(writer);

        self.years.write().unwrap().extend(indexed_years);
        self.reload();
        Ok(())
    }

    /// Removes the entries for the given rendered-artifact URLs. Callers
    /// map source paths to URLs first (see
    /// [`crate::post::url_for_source_path`]). No-op on empty input; a URL
    /// with no entry is silently skipped.
    pub fn delete_by_urls(&self, urls: &BTreeSet<String>) -> Result<()> {
        if urls.is_empty() {
            return Ok(());
        }

        let mut writer = self.writer.lock().unwrap();
        for url in urls {
            writer.delete_term(Term::from_field_text(self.fields.url, url));
        }
        writer.commit().context("index commit failed")?;
        drop(writer);

        self.reload();
        Ok(())
    }

    /// Removes every entry. Used only by a full rebuild.
    pub fn drop_all(&self) -> Result<()> {
        self.years.write().unwrap().clear();

        let mut writer = self.writer.lock().unwrap();
        writer
            .delete_all_documents()
            .context("index clear failed")?;
        writer.commit().context("index commit failed")?;
        drop(writer);

        self.reload();
        Ok(())
    }

    /// All published posts, newest first.
    pub fn query_all(&self) -> Vec<PostMetadata> {
        self.search(Box::new(AllQuery))
    }

    /// Published posts of one year, newest first.
    pub fn query_by_year(&self, year: i32) -> Vec<PostMetadata> {
        let term = Term::from_field_i64(self.fields.published_year, year as i64);
        self.search(Box::new(TermQuery::new(term, IndexRecordOption::Basic)))
    }

    /// Published posts carrying the exact tag, newest first.
    pub fn query_by_tag(&self, tag: &str) -> Vec<PostMetadata> {
        let term = Term::from_field_text(self.fields.tags, tag);
        self.search(Box::new(TermQuery::new(term, IndexRecordOption::Basic)))
    }

    /// Free-text query over title/summary/body text, newest first. A query
    /// that does not parse yields an empty result, not an error.
    pub fn query_free_text(&self, query: &str) -> Vec<PostMetadata> {
        let parser = QueryParser::for_index(&self.index, vec![self.fields.body]);
        match parser.parse_query(query) {
            Ok(parsed) => self.search(parsed),
            Err(e) => {
                warn!(query, error = %e, "unparsable free-text query");
                Vec::new()
            }
        }
    }

    /// Distinct years having at least one published post.
    pub fn published_years(&self) -> BTreeSet<i32> {
        self.years.read().unwrap().clone()
    }

    fn search(&self, query: Box<dyn Query>) -> Vec<PostMetadata> {
        let searcher = self.reader.searcher();
        let collector =
            TopDocs::with_limit(RESULT_CAP).order_by_fast_field::<i64>("published_ts", Order::Desc);

        let top_docs = match searcher.search(&query, &collector) {
            Ok(top) => top,
            Err(e) => {
                error!(error = %e, "index search failed");
                return Vec::new();
            }
        };

        let mut posts = Vec::with_capacity(top_docs.len());
        for (_published_ts, address) in top_docs {
            let doc: TantivyDocument = match searcher.doc(address) {
                Ok(doc) => doc,
                Err(e) => {
                    error!(error = %e, "failed to load stored document");
                    continue;
                }
            };
            posts.push(self.metadata_from_doc(&doc));
        }
        posts
    }

    fn metadata_from_doc(&self, doc: &TantivyDocument) -> PostMetadata {
        let text = |field: Field| {
            doc.get_first(field)
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string()
        };

        let published = doc
            .get_first(self.fields.published_ts)
            .and_then(|v| v.as_i64())
            .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0))
            .unwrap_or_default();

        let updated = doc
            .get_first(self.fields.updated_ts)
            .and_then(|v| v.as_i64())
            .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0));

        let summary = doc
            .get_first(self.fields.summary)
            .and_then(|v| v.as_str())
            .map(str::to_string);

        let tags = doc
            .get_all(self.fields.tags)
            .filter_map(|v| v.as_str())
            .map(str::to_string)
            .collect();

        PostMetadata {
            url: text(self.fields.url),
            path: PathBuf::from(text(self.fields.path)),
            title: text(self.fields.title),
            summary,
            tags,
            draft: false,
            published,
            updated,
        }
    }

    fn reload(&self) {
        if let Err(e) = self.reader.reload() {
            error!(error = %e, "index reader reload failed");
        } else {
            info!(docs = self.reader.searcher().num_docs(), "index reloaded");
        }
    }
}

fn build_schema() -> Schema {
    let mut builder = Schema::builder();
    builder.add_text_field("url", STRING | STORED);
    builder.add_text_field("path", STORED);
    builder.add_text_field("title", STORED);
    builder.add_text_field("summary", STORED);
    builder.add_text_field("body", TEXT);
    builder.add_text_field("tags", STRING | STORED);
    builder.add_i64_field("published_ts", INDEXED | FAST | STORED);
    builder.add_i64_field("published_year", INDEXED | FAST);
    builder.add_i64_field("updated_ts", STORED);
    builder.build()
}

impl Fields {
    fn from_schema(schema: &Schema) -> Self {
        let field = |name: &str| schema.get_field(name).expect("schema field");
        Fields {
            url: field("url"),
            path: field("path"),
            title: field("title"),
            summary: field("summary"),
            body: field("body"),
            tags: field("tags"),
            published_ts: field("published_ts"),
            published_year: field("published_year"),
            updated_ts: field("updated_ts"),
        }
    }
}
