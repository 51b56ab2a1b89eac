use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub site: SiteConfig,
    pub git: GitConfig,
    pub content: ContentConfig,
    pub index: IndexConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SiteConfig {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub author: String,
    /// Absolute site root, e.g. `https://blog.example.com/`. Post URLs are
    /// appended directly, so it must end with a slash.
    pub base_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GitConfig {
    /// Remote URL of the content repository.
    pub repository: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_branch")]
    pub branch: String,
}

fn default_branch() -> String {
    "main".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ContentConfig {
    /// Local checkout of the content repository. Posts live in four-digit
    /// year directories underneath it.
    pub work_dir: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    /// Optional file of URL prefixes the link checker should skip,
    /// one per line.
    #[serde(default)]
    pub ignore_url_list: Option<PathBuf>,
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.md".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// Directory holding the tantivy index.
    pub dir: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Shared secret for webhook signature verification. When unset the
    /// webhook endpoint rejects every request.
    #[serde(default)]
    pub webhook_secret: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            webhook_secret: None,
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScheduleConfig {
    #[serde(default = "default_pull_interval")]
    pub pull_interval_minutes: u64,
    #[serde(default = "default_link_check_interval")]
    pub link_check_interval_hours: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            pull_interval_minutes: default_pull_interval(),
            link_check_interval_hours: default_link_check_interval(),
        }
    }
}

fn default_pull_interval() -> u64 {
    720
}
fn default_link_check_interval() -> u64 {
    720
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    /// Whether to ping search engines after writing the sitemap. Off for
    /// staging/test deployments.
    #[serde(default = "default_ping")]
    pub ping_search_engines: bool,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// How long a link-check verdict stays cached before the URL is probed
    /// again.
    #[serde(default = "default_link_cache_hours")]
    pub link_cache_hours: u64,
    /// Delay before the single retry of a rate-limited (429) link check.
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            ping_search_engines: default_ping(),
            connect_timeout_secs: default_connect_timeout(),
            request_timeout_secs: default_request_timeout(),
            link_cache_hours: default_link_cache_hours(),
            retry_delay_secs: default_retry_delay(),
        }
    }
}

fn default_ping() -> bool {
    true
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_request_timeout() -> u64 {
    30
}
fn default_link_cache_hours() -> u64 {
    4
}
fn default_retry_delay() -> u64 {
    30
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.site.base_url.is_empty() || !config.site.base_url.ends_with('/') {
        anyhow::bail!("site.base_url must be non-empty and end with '/'");
    }

    if config.git.repository.is_empty() {
        anyhow::bail!("git.repository must be set");
    }

    if config.schedule.pull_interval_minutes == 0 {
        anyhow::bail!("schedule.pull_interval_minutes must be > 0");
    }

    if config.schedule.link_check_interval_hours == 0 {
        anyhow::bail!("schedule.link_check_interval_hours must be > 0");
    }

    Ok(())
}

impl Config {
    /// A config rooted at the given directories, with every remote-facing
    /// setting left at a harmless placeholder. Used by tests and tools that
    /// never touch the network.
    pub fn for_paths(work_dir: PathBuf, index_dir: PathBuf) -> Self {
        Self {
            site: SiteConfig {
                title: "gitpress".to_string(),
                description: String::new(),
                author: String::new(),
                base_url: "https://example.com/".to_string(),
            },
            git: GitConfig {
                repository: "https://example.com/content.git".to_string(),
                user: None,
                password: None,
                branch: default_branch(),
            },
            content: ContentConfig {
                work_dir,
                include_globs: default_include_globs(),
                ignore_url_list: None,
            },
            index: IndexConfig { dir: index_dir },
            server: ServerConfig::default(),
            schedule: ScheduleConfig::default(),
            http: HttpConfig {
                ping_search_engines: false,
                ..HttpConfig::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
[site]
title = "Example Blog"
description = "Notes on things"
author = "J. Doe"
base_url = "https://blog.example.com/"

[git]
repository = "https://git.example.com/posts.git"
branch = "main"

[content]
work_dir = "/var/lib/gitpress/posts"

[index]
dir = "/var/lib/gitpress/index"

[server]
bind = "0.0.0.0:8080"
webhook_secret = "s3cret"

[schedule]
pull_interval_minutes = 60
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        validate(&config).unwrap();
        assert_eq!(config.site.title, "Example Blog");
        assert_eq!(config.server.webhook_secret.as_deref(), Some("s3cret"));
        assert_eq!(config.schedule.pull_interval_minutes, 60);
        // defaults
        assert_eq!(config.content.include_globs, vec!["**/*.md"]);
        assert_eq!(config.http.link_cache_hours, 4);
    }

    #[test]
    fn test_base_url_must_end_with_slash() {
        let mut config = Config::for_paths(PathBuf::from("/tmp/w"), PathBuf::from("/tmp/i"));
        config.site.base_url = "https://example.com".to_string();
        assert!(validate(&config).is_err());
    }
}
