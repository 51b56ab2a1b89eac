//! Sitemap generation and search-engine pings.

use anyhow::Result;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::path::Path;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::{HttpConfig, SiteConfig};
use crate::models::PostMetadata;

const FILE_NAME: &str = "sitemap.xml";

pub fn file_exists(work_dir: &Path) -> bool {
    work_dir.join(FILE_NAME).exists()
}

/// Writes `sitemap.xml` listing the index page and every published post.
pub fn write_sitemap(site: &SiteConfig, work_dir: &Path, posts: &[PostMetadata]) {
    match build_sitemap(site, posts) {
        Ok(xml) => {
            let path = work_dir.join(FILE_NAME);
            if let Err(e) = std::fs::write(&path, xml) {
                error!(path = %path.display(), error = %e, "cannot write sitemap");
            } else {
                info!(path = %path.display(), urls = posts.len() + 1, "sitemap written");
            }
        }
        Err(e) => error!(error = %e, "cannot build sitemap"),
    }
}

pub fn build_sitemap(site: &SiteConfig, posts: &[PostMetadata]) -> Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;

    let mut urlset = BytesStart::new("urlset");
    urlset.push_attribute(("xmlns", "http://www.sitemaps.org/schemas/sitemap/0.9"));
    writer.write_event(Event::Start(urlset))?;

    let index_url = format!("{}index.html", site.base_url);
    write_url(&mut writer, &index_url)?;
    for post in posts {
        write_url(&mut writer, &format!("{}{}", site.base_url, post.url))?;
    }

    writer.write_event(Event::End(BytesEnd::new("urlset")))?;
    Ok(String::from_utf8(writer.into_inner())?)
}

fn write_url<W: std::io::Write>(writer: &mut Writer<W>, loc: &str) -> Result<()> {
    writer.write_event(Event::Start(BytesStart::new("url")))?;
    writer.write_event(Event::Start(BytesStart::new("loc")))?;
    writer.write_event(Event::Text(BytesText::new(loc)))?;
    writer.write_event(Event::End(BytesEnd::new("loc")))?;
    writer.write_event(Event::End(BytesEnd::new("url")))?;
    Ok(())
}

/// Tells the major engines the sitemap changed. Best effort: failures are
/// logged, never propagated. Blocking; run off the async runtime.
pub fn ping_search_engines(site: &SiteConfig, http: &HttpConfig) {
    let sitemap_url = format!("{}{}", site.base_url, FILE_NAME);
    let ping_urls = [
        format!("https://www.google.com/ping?sitemap={}", sitemap_url),
        format!("https://www.bing.com/ping?sitemap={}", sitemap_url),
    ];

    let client = match reqwest::blocking::Client::builder()
        .connect_timeout(Duration::from_secs(http.connect_timeout_secs))
        .timeout(Duration::from_secs(http.request_timeout_secs))
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            error!(error = %e, "cannot build ping client");
            return;
        }
    };

    for url in &ping_urls {
        match client.get(url).send() {
            Ok(response) if response.status().is_success() => {
                info!(url, "sitemap ping ok");
            }
            Ok(response) => warn!(url, status = %response.status(), "sitemap ping rejected"),
            Err(e) => warn!(url, error = %e, "sitemap ping failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use std::path::PathBuf;

    #[test]
    fn test_sitemap_lists_index_and_posts() {
        let site = SiteConfig {
            title: "t".to_string(),
            description: String::new(),
            author: String::new(),
            base_url: "https://blog.example.com/".to_string(),
        };
        let published = DateTime::parse_from_rfc3339("2024-06-01T08:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let posts = vec![PostMetadata {
            url: "2024/first.html".to_string(),
            path: PathBuf::from("/work/2024/first.md"),
            title: "First".to_string(),
            summary: None,
            tags: Vec::new(),
            draft: false,
            published,
            updated: None,
        }];

        let xml = build_sitemap(&site, &posts).unwrap();
        assert!(xml.contains("<loc>https://blog.example.com/index.html</loc>"));
        assert!(xml.contains("<loc>https://blog.example.com/2024/first.html</loc>"));
        assert!(xml.starts_with("<?xml"));
    }
}
