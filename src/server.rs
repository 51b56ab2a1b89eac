//! HTTP surface.
//!
//! Serves the query page and JSON API over the search index, the
//! webhook trigger, and a health check:
//!
//! | Method | Path          | Description                              |
//! |--------|---------------|------------------------------------------|
//! | `GET`  | `/`           | Query page (`tag`, `query`, `year`)      |
//! | `GET`  | `/index.html` | Same as `/`                              |
//! | `GET`  | `/api/posts`  | Same selection as JSON                   |
//! | `POST` | `/webhook`    | HMAC-verified "re-run the pipeline now"  |
//! | `GET`  | `/health`     | Health check (returns version)           |
//!
//! Two in-process schedulers run alongside: a pull loop triggering a
//! pipeline cycle every `schedule.pull_interval_minutes`, and a slower
//! loop queueing a link-health pass.
//!
//! Query failures degrade to empty result sets; the index never surfaces
//! an error to a client.

use anyhow::Result;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{Datelike, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use crate::config::{Config, SiteConfig};
use crate::index::SearchIndex;
use crate::models::{PostMetadata, YearNav};
use crate::pipeline::Pipeline;
use crate::render;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    site: SiteConfig,
    webhook_secret: Option<String>,
    index: Arc<SearchIndex>,
    pipeline: Arc<Pipeline>,
}

/// Starts the server and schedulers; runs until the process terminates.
pub async fn run_server(
    config: &Config,
    index: Arc<SearchIndex>,
    pipeline: Arc<Pipeline>,
) -> Result<()> {
    let bind_addr = config.server.bind.clone();

    // Startup counts as a trigger, like any timer or webhook firing.
    {
        let pipeline = Arc::clone(&pipeline);
        tokio::task::spawn_blocking(move || {
            if let Err(e) = pipeline.run_cycle() {
                error!(error = %e, "startup pipeline cycle aborted");
            }
        });
    }

    spawn_pull_scheduler(
        Arc::clone(&pipeline),
        Duration::from_secs(config.schedule.pull_interval_minutes * 60),
    );
    spawn_link_check_scheduler(
        Arc::clone(&pipeline),
        Arc::clone(&index),
        Duration::from_secs(config.schedule.link_check_interval_hours * 3600),
    );

    let state = AppState {
        site: config.site.clone(),
        webhook_secret: config.server.webhook_secret.clone(),
        index,
        pipeline,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/", get(handle_index))
        .route("/index.html", get(handle_index))
        .route("/api/posts", get(handle_posts_api))
        .route("/webhook", post(handle_webhook))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state);

    info!(bind = %bind_addr, "server listening");
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn spawn_pull_scheduler(pipeline: Arc<Pipeline>, period: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.tick().await; // the immediate first tick; startup already ran
        loop {
            interval.tick().await;
            info!("scheduled pull");
            let pipeline = Arc::clone(&pipeline);
            let result = tokio::task::spawn_blocking(move || pipeline.run_cycle()).await;
            match result {
                Ok(Err(e)) => error!(error = %e, "scheduled pipeline cycle aborted"),
                Err(e) => error!(error = %e, "scheduled pipeline task panicked"),
                Ok(Ok(())) => {}
            }
        }
    });
}

fn spawn_link_check_scheduler(pipeline: Arc<Pipeline>, index: Arc<SearchIndex>, period: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.tick().await;
        loop {
            interval.tick().await;
            if index.has_index() {
                info!("scheduled link check");
                pipeline.trigger_link_check();
            }
        }
    });
}

// ============ GET / ============

#[derive(Debug, Default, Deserialize)]
struct QueryParams {
    tag: Option<String>,
    query: Option<String>,
    year: Option<String>,
}

/// Resolves the post selection for the query surface. Priority: tag, then
/// free text, then an explicit year; with no parameters, the current year,
/// falling back to the previous one when the current year has no posts yet.
fn select_posts(
    index: &SearchIndex,
    params: &QueryParams,
) -> (Vec<PostMetadata>, Vec<YearNav>, Option<String>) {
    let years = index.published_years();
    let nav = |current: Option<i32>| -> Vec<YearNav> {
        years
            .iter()
            .map(|&year| YearNav {
                year,
                current: Some(year) == current,
            })
            .collect()
    };

    if let Some(tag) = params.tag.as_deref().filter(|t| !t.is_empty()) {
        let posts = index.query_by_tag(tag);
        return (posts, nav(None), Some(format!("tags:{}", tag)));
    }

    if let Some(query) = params.query.as_deref().filter(|q| !q.is_empty()) {
        let posts = index.query_free_text(query);
        return (posts, nav(None), Some(query.to_string()));
    }

    if let Some(year) = params.year.as_deref().and_then(|y| y.parse::<i32>().ok()) {
        return (index.query_by_year(year), nav(Some(year)), None);
    }

    let mut current = Utc::now().year();
    let mut posts = index.query_by_year(current);
    if posts.is_empty() {
        current -= 1;
        posts = index.query_by_year(current);
    }
    (posts, nav(Some(current)), None)
}

async fn handle_index(
    State(state): State<AppState>,
    Query(params): Query<QueryParams>,
) -> impl IntoResponse {
    let (posts, years, query) = select_posts(&state.index, &params);
    let page = render::index_page(&state.site, &posts, &years, query.as_deref());
    ([(header::CACHE_CONTROL, "no-cache")], Html(page))
}

// ============ GET /api/posts ============

async fn handle_posts_api(
    State(state): State<AppState>,
    Query(params): Query<QueryParams>,
) -> Json<serde_json::Value> {
    let (posts, years, query) = select_posts(&state.index, &params);
    Json(serde_json::json!({
        "posts": posts,
        "years": years,
        "query": query,
    }))
}

// ============ POST /webhook ============

/// Authenticated "re-run the pipeline now" signal. The payload carries no
/// further meaning; a valid `X-Hub-Signature-256` schedules a cycle and
/// returns 204 immediately.
async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let Some(secret) = &state.webhook_secret else {
        warn!("webhook called but no secret configured");
        return StatusCode::SERVICE_UNAVAILABLE;
    };

    let signature = headers
        .get("x-hub-signature-256")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if !verify_signature(secret, &body, signature) {
        warn!("webhook signature mismatch");
        return StatusCode::UNAUTHORIZED;
    }

    info!("webhook trigger");
    let pipeline = Arc::clone(&state.pipeline);
    tokio::task::spawn_blocking(move || {
        if let Err(e) = pipeline.run_cycle() {
            error!(error = %e, "webhook pipeline cycle aborted");
        }
    });

    StatusCode::NO_CONTENT
}

/// Constant-time check of `sha256=<hex>` against the body's HMAC.
fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let Some(hex_digest) = signature.strip_prefix("sha256=") else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_digest) else {
        return false;
    };
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

// ============ GET /health ============

#[derive(serde::Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn test_valid_signature_accepted() {
        let body = b"{\"ref\":\"refs/heads/main\"}";
        let signature = sign("s3cret", body);
        assert!(verify_signature("s3cret", body, &signature));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let body = b"payload";
        let signature = sign("other", body);
        assert!(!verify_signature("s3cret", body, &signature));
    }

    #[test]
    fn test_tampered_body_rejected() {
        let signature = sign("s3cret", b"payload");
        assert!(!verify_signature("s3cret", b"tampered", &signature));
    }

    #[test]
    fn test_malformed_signature_rejected() {
        assert!(!verify_signature("s3cret", b"payload", "sha1=abcdef"));
        assert!(!verify_signature("s3cret", b"payload", "sha256=zz-not-hex"));
        assert!(!verify_signature("s3cret", b"payload", ""));
    }
}
