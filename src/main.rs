//! # gitpress CLI
//!
//! The `gitpress` binary drives the publishing pipeline. All commands read
//! a TOML configuration via `--config` (default `./gitpress.toml`).
//!
//! | Command | Description |
//! |---------|-------------|
//! | `gitpress run` | One pipeline cycle: clone or pull, classify, render, index |
//! | `gitpress rebuild` | Drop the index and reprocess every post |
//! | `gitpress query [text]` | Search the index (`--tag`, `--year`, or free text) |
//! | `gitpress check-links` | Run a link-health pass over the rendered corpus |
//! | `gitpress serve` | Start the HTTP server, webhook, and schedulers |

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use gitpress::config::{self, Config};
use gitpress::index::SearchIndex;
use gitpress::linkcheck::LinkChecker;
use gitpress::pipeline::Pipeline;
use gitpress::render::PlainHighlighter;
use gitpress::server;

/// gitpress — a git-backed publishing engine with incremental rendering
/// and full-text search.
#[derive(Parser)]
#[command(
    name = "gitpress",
    about = "gitpress — a git-backed publishing engine",
    version,
    long_about = "gitpress pulls a git repository of markdown posts, renders changed posts to \
    HTML, keeps a full-text search index consistent with the post set, and regenerates feeds, \
    sitemap, and a link-health report when published content changes."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./gitpress.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one pipeline cycle.
    ///
    /// Clones the content repository on first run; afterwards pulls,
    /// classifies the diff, re-renders and re-indexes what changed, and
    /// regenerates downstream artifacts when a published post was touched.
    Run,

    /// Drop the search index and reprocess every post from scratch.
    Rebuild,

    /// Query the search index.
    ///
    /// With no flags, free text searches titles, summaries, and body text.
    Query {
        /// Free-text query string.
        text: Option<String>,

        /// Only posts carrying this exact tag.
        #[arg(long)]
        tag: Option<String>,

        /// Only posts published in this year.
        #[arg(long)]
        year: Option<i32>,
    },

    /// Run a link-health pass over the rendered corpus now.
    ///
    /// Writes `report/urlcheck.html` under the work dir.
    CheckLinks,

    /// Start the HTTP server.
    ///
    /// Serves the query surface and webhook, runs a pipeline cycle at
    /// startup, and keeps pulling on the configured schedule.
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Run => {
            let pipeline = build_pipeline(&config)?;
            tokio::task::spawn_blocking(move || pipeline.run_cycle()).await??;
        }
        Commands::Rebuild => {
            let pipeline = build_pipeline(&config)?;
            tokio::task::spawn_blocking(move || pipeline.rebuild()).await??;
        }
        Commands::Query { text, tag, year } => {
            let index = SearchIndex::open(&config.index.dir)?;
            let posts = if let Some(tag) = tag {
                index.query_by_tag(&tag)
            } else if let Some(text) = text {
                index.query_free_text(&text)
            } else if let Some(year) = year {
                index.query_by_year(year)
            } else {
                index.query_all()
            };
            print_posts(&posts);
        }
        Commands::CheckLinks => {
            let index = SearchIndex::open(&config.index.dir)?;
            let checker = LinkChecker::new(&config);
            let posts = index.query_all();
            println!("checking links of {} posts", posts.len());
            tokio::task::spawn_blocking(move || checker.check_posts(&posts)).await?;
            println!("report written");
        }
        Commands::Serve => {
            let index = Arc::new(SearchIndex::open(&config.index.dir)?);
            let pipeline = Arc::new(Pipeline::new(
                &config,
                Arc::clone(&index),
                Box::new(PlainHighlighter),
            )?);
            server::run_server(&config, index, pipeline).await?;
        }
    }

    Ok(())
}

fn build_pipeline(config: &Config) -> Result<Pipeline> {
    let index = Arc::new(SearchIndex::open(&config.index.dir)?);
    Pipeline::new(config, index, Box::new(PlainHighlighter))
}

fn print_posts(posts: &[gitpress::models::PostMetadata]) {
    if posts.is_empty() {
        println!("No results.");
        return;
    }

    for (i, post) in posts.iter().enumerate() {
        println!(
            "{}. {} ({})",
            i + 1,
            post.title,
            post.published.format("%Y-%m-%d")
        );
        println!("   url: {}", post.url);
        if !post.tags.is_empty() {
            println!("   tags: {}", post.tags.join(", "));
        }
        if let Some(summary) = &post.summary {
            println!("   {}", summary);
        }
        println!();
    }
}
