//! # gitpress
//!
//! A git-backed publishing engine with incremental rendering and full-text
//! search.
//!
//! gitpress keeps a local checkout of a content repository of markdown
//! posts, and on every trigger (startup, timer, webhook) decides between a
//! full rebuild and an incremental update: the git diff is classified into
//! deleted and changed paths, deleted posts lose their rendered pages and
//! index entries, changed posts are re-rendered and re-indexed, and the
//! derived artifacts (RSS/Atom feeds, sitemap, link-health report) are
//! regenerated when a published post was affected.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌────────────┐   ┌──────────────┐   ┌─────────────┐
//! │ git pull │──▶│ classifier │──▶│ render+index │──▶│  artifacts   │
//! │  (diff)  │   │ del/changed│   │ (tantivy)    │   │ feeds/sitemap│
//! └──────────┘   └────────────┘   └──────┬───────┘   └─────────────┘
//!                                        │
//!                            ┌───────────┴───────────┐
//!                            ▼                       ▼
//!                       ┌─────────┐            ┌──────────┐
//!                       │   CLI   │            │   HTTP   │
//!                       │(gitpress)│           │ (axum)   │
//!                       └─────────┘            └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`post`] | Header-block extraction and URL derivation |
//! | [`content`] | Content-root scanning and rendered artifacts |
//! | [`sync`] | Git clone/pull and diff parsing |
//! | [`classify`] | Change classification |
//! | [`index`] | Tantivy search index and queries |
//! | [`render`] | Markdown rendering and page templates |
//! | [`pipeline`] | Cycle orchestration |
//! | [`feed`] | RSS/Atom feeds |
//! | [`sitemap`] | Sitemap and search-engine pings |
//! | [`linkcheck`] | Link-health report |
//! | [`worker`] | Background work lane |
//! | [`server`] | HTTP server, webhook, schedulers |

pub mod classify;
pub mod config;
pub mod content;
pub mod feed;
pub mod index;
pub mod linkcheck;
pub mod models;
pub mod pipeline;
pub mod post;
pub mod render;
pub mod server;
pub mod sitemap;
pub mod sync;
pub mod worker;
