//! RSS and Atom feed generation.
//!
//! Both formats come out of one builder parameterized by [`FeedFormat`];
//! the differences are per-element, not per-type. Feeds list the posts in
//! the order given (the index already returns newest first).

use anyhow::Result;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::path::Path;
use tracing::{error, info};

use crate::config::SiteConfig;
use crate::models::PostMetadata;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedFormat {
    Rss,
    Atom,
}

impl FeedFormat {
    pub fn file_name(self) -> &'static str {
        match self {
            FeedFormat::Rss => "feed.rss",
            FeedFormat::Atom => "feed.atom",
        }
    }
}

/// True iff both feed files are present in the work dir.
pub fn files_exist(work_dir: &Path) -> bool {
    work_dir.join(FeedFormat::Rss.file_name()).exists()
        && work_dir.join(FeedFormat::Atom.file_name()).exists()
}

/// Writes both feeds. Failures are logged per format; one broken feed does
/// not stop the other.
pub fn write_feeds(site: &SiteConfig, work_dir: &Path, posts: &[PostMetadata]) {
    for format in [FeedFormat::Rss, FeedFormat::Atom] {
        match build_feed(format, site, posts) {
            Ok(xml) => {
                let path = work_dir.join(format.file_name());
                if let Err(e) = std::fs::write(&path, xml) {
                    error!(path = %path.display(), error = %e, "cannot write feed");
                } else {
                    info!(path = %path.display(), posts = posts.len(), "feed written");
                }
            }
            Err(e) => error!(?format, error = %e, "cannot build feed"),
        }
    }
}

/// Builds one feed document. The same walk emits RSS or Atom elements
/// depending on `format`.
pub fn build_feed(
    format: FeedFormat,
    site: &SiteConfig,
    posts: &[PostMetadata],
) -> Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;

    let latest = posts.iter().map(|p| p.published).max();
    let self_url = format!("{}{}", site.base_url, format.file_name());

    match format {
        FeedFormat::Rss => {
            let mut rss = BytesStart::new("rss");
            rss.push_attribute(("version", "2.0"));
            rss.push_attribute(("xmlns:atom", "http://www.w3.org/2005/Atom"));
            writer.write_event(Event::Start(rss))?;
            writer.write_event(Event::Start(BytesStart::new("channel")))?;

            text_el(&mut writer, "title", &site.title)?;
            text_el(&mut writer, "link", &site.base_url)?;
            text_el(&mut writer, "description", &site.description)?;

            let mut self_link = BytesStart::new("atom:link");
            self_link.push_attribute(("href", self_url.as_str()));
            self_link.push_attribute(("rel", "self"));
            self_link.push_attribute(("type", "application/rss+xml"));
            writer.write_event(Event::Empty(self_link))?;

            if let Some(latest) = latest {
                text_el(&mut writer, "lastBuildDate", &latest.to_rfc2822())?;
            }
        }
        FeedFormat::Atom => {
            let mut feed = BytesStart::new("feed");
            feed.push_attribute(("xmlns", "http://www.w3.org/2005/Atom"));
            writer.write_event(Event::Start(feed))?;

            text_el(&mut writer, "title", &site.title)?;
            text_el(&mut writer, "id", &site.base_url)?;

            let mut site_link = BytesStart::new("link");
            site_link.push_attribute(("href", site.base_url.as_str()));
            writer.write_event(Event::Empty(site_link))?;

            let mut self_link = BytesStart::new("link");
            self_link.push_attribute(("rel", "self"));
            self_link.push_attribute(("href", self_url.as_str()));
            writer.write_event(Event::Empty(self_link))?;

            if let Some(latest) = latest {
                text_el(&mut writer, "updated", &latest.to_rfc3339())?;
            }
            if !site.author.is_empty() {
                writer.write_event(Event::Start(BytesStart::new("author")))?;
                text_el(&mut writer, "name", &site.author)?;
                writer.write_event(Event::End(BytesEnd::new("author")))?;
            }
        }
    }

    for post in posts {
        let link = format!("{}{}", site.base_url, post.url);
        let entry_name = match format {
            FeedFormat::Rss => "item",
            FeedFormat::Atom => "entry",
        };
        writer.write_event(Event::Start(BytesStart::new(entry_name)))?;

        text_el(&mut writer, "title", &post.title)?;
        let description = post.summary.as_deref().unwrap_or(&post.title);

        match format {
            FeedFormat::Rss => {
                text_el(&mut writer, "link", &link)?;
                let mut guid = BytesStart::new("guid");
                guid.push_attribute(("isPermaLink", "true"));
                writer.write_event(Event::Start(guid))?;
                writer.write_event(Event::Text(BytesText::new(&link)))?;
                writer.write_event(Event::End(BytesEnd::new("guid")))?;

                text_el(&mut writer, "pubDate", &post.published.to_rfc2822())?;
                for tag in &post.tags {
                    text_el(&mut writer, "category", tag)?;
                }
                text_el(&mut writer, "description", description)?;
            }
            FeedFormat::Atom => {
                text_el(&mut writer, "id", &link)?;
                let mut entry_link = BytesStart::new("link");
                entry_link.push_attribute(("href", link.as_str()));
                writer.write_event(Event::Empty(entry_link))?;

                text_el(&mut writer, "published", &post.published.to_rfc3339())?;
                text_el(&mut writer, "updated", &post.effective_updated().to_rfc3339())?;
                for tag in &post.tags {
                    let mut category = BytesStart::new("category");
                    category.push_attribute(("term", tag.as_str()));
                    writer.write_event(Event::Empty(category))?;
                }
                text_el(&mut writer, "summary", description)?;
            }
        }

        writer.write_event(Event::End(BytesEnd::new(entry_name)))?;
    }

    match format {
        FeedFormat::Rss => {
            writer.write_event(Event::End(BytesEnd::new("channel")))?;
            writer.write_event(Event::End(BytesEnd::new("rss")))?;
        }
        FeedFormat::Atom => {
            writer.write_event(Event::End(BytesEnd::new("feed")))?;
        }
    }

    Ok(String::from_utf8(writer.into_inner())?)
}

fn text_el<W: std::io::Write>(writer: &mut Writer<W>, name: &str, text: &str) -> Result<()> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use std::path::PathBuf;

    fn site() -> SiteConfig {
        SiteConfig {
            title: "Example Blog".to_string(),
            description: "Notes".to_string(),
            author: "J. Doe".to_string(),
            base_url: "https://blog.example.com/".to_string(),
        }
    }

    fn posts() -> Vec<PostMetadata> {
        let published = DateTime::parse_from_rfc3339("2024-06-01T08:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        vec![PostMetadata {
            url: "2024/first.html".to_string(),
            path: PathBuf::from("/work/2024/first.md"),
            title: "First <post>".to_string(),
            summary: Some("A summary".to_string()),
            tags: vec!["rust".to_string(), "search".to_string()],
            draft: false,
            published,
            updated: None,
        }]
    }

    #[test]
    fn test_rss_feed_structure() {
        let xml = build_feed(FeedFormat::Rss, &site(), &posts()).unwrap();
        assert!(xml.contains("<rss version=\"2.0\""));
        assert!(xml.contains("<title>Example Blog</title>"));
        assert!(xml.contains("<link>https://blog.example.com/2024/first.html</link>"));
        assert!(xml.contains("<category>rust</category>"));
        assert!(xml.contains("<description>A summary</description>"));
        // content is escaped
        assert!(xml.contains("First &lt;post&gt;"));
    }

    #[test]
    fn test_atom_feed_structure() {
        let xml = build_feed(FeedFormat::Atom, &site(), &posts()).unwrap();
        assert!(xml.contains("<feed xmlns=\"http://www.w3.org/2005/Atom\">"));
        assert!(xml.contains("<id>https://blog.example.com/2024/first.html</id>"));
        assert!(xml.contains("<category term=\"rust\"/>"));
        assert!(xml.contains("<published>2024-06-01T08:00:00+00:00</published>"));
        // updated falls back to published
        assert!(xml.contains("<updated>2024-06-01T08:00:00+00:00</updated>"));
    }

    #[test]
    fn test_summary_falls_back_to_title() {
        let mut list = posts();
        list[0].summary = None;
        let xml = build_feed(FeedFormat::Rss, &site(), &list).unwrap();
        assert!(xml.contains("<description>First &lt;post&gt;</description>"));
    }

    #[test]
    fn test_empty_post_list_still_valid() {
        let xml = build_feed(FeedFormat::Atom, &site(), &[]).unwrap();
        assert!(xml.contains("<feed"));
        assert!(!xml.contains("<entry>"));
    }
}
