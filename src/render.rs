//! Markdown rendering and page templates.
//!
//! Markdown is rendered with pulldown-cmark, both to HTML (for the page
//! artifacts) and to plain text (the scoring field of the search index).
//! Code blocks pass through a [`Highlighter`] seam so a real highlighter
//! can be plugged in; the built-in one only wraps and escapes, and any
//! highlighter must fall back to the unmodified code on failure.
//!
//! Page shells use [maud](https://maud.lambda.xyz/) — type-safe templates
//! with automatic escaping.

use maud::{html, Markup, PreEscaped, DOCTYPE};
use pulldown_cmark::{html as md_html, CodeBlockKind, Event, Options, Parser, Tag, TagEnd};

use crate::config::SiteConfig;
use crate::models::{PostContent, PostMetadata, YearNav};

/// Syntax highlighting seam. Implementations receive the raw code and the
/// fence language (may be empty) and return a full `<pre><code>` block.
/// On any internal failure they must return the original code, escaped but
/// otherwise unmodified.
pub trait Highlighter: Send + Sync {
    fn highlight(&self, code: &str, language: &str) -> String;
}

/// Default highlighter: no actual highlighting, just an escaped code block
/// with a `language-*` class for client-side highlighters to pick up.
pub struct PlainHighlighter;

impl Highlighter for PlainHighlighter {
    fn highlight(&self, code: &str, language: &str) -> String {
        let escaped = escape_html(code);
        if language.is_empty() {
            format!("<pre><code>{}</code></pre>\n", escaped)
        } else {
            format!(
                "<pre><code class=\"language-{}\">{}</code></pre>\n",
                escape_html(language),
                escaped
            )
        }
    }
}

fn markdown_options() -> Options {
    Options::ENABLE_TABLES
        | Options::ENABLE_FOOTNOTES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS
}

/// Renders markdown to HTML, routing fenced code blocks through the
/// highlighter.
pub fn render_html(markdown: &str, highlighter: &dyn Highlighter) -> String {
    let parser = Parser::new_ext(markdown, markdown_options());

    let mut events = Vec::new();
    let mut code_lang: Option<String> = None;
    let mut code_buf = String::new();

    for event in parser {
        match event {
            Event::Start(Tag::CodeBlock(kind)) => {
                code_lang = Some(match kind {
                    CodeBlockKind::Fenced(lang) => lang.to_string(),
                    CodeBlockKind::Indented => String::new(),
                });
                code_buf.clear();
            }
            Event::Text(text) if code_lang.is_some() => code_buf.push_str(&text),
            Event::End(TagEnd::CodeBlock) => {
                let lang = code_lang.take().unwrap_or_default();
                events.push(Event::Html(highlighter.highlight(&code_buf, &lang).into()));
            }
            other => events.push(other),
        }
    }

    let mut out = String::new();
    md_html::push_html(&mut out, events.into_iter());
    out
}

/// Renders markdown to the plain text used for index scoring: markup
/// stripped, block boundaries collapsed to single spaces.
pub fn plain_text(markdown: &str) -> String {
    let parser = Parser::new_ext(markdown, markdown_options());
    let mut out = String::new();

    for event in parser {
        match event {
            Event::Text(text) | Event::Code(text) => out.push_str(&text),
            Event::SoftBreak | Event::HardBreak => out.push(' '),
            Event::End(
                TagEnd::Paragraph
                | TagEnd::Heading(_)
                | TagEnd::Item
                | TagEnd::CodeBlock
                | TagEnd::TableCell,
            ) => out.push(' '),
            _ => {}
        }
    }

    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// The full HTML page for one post.
pub fn post_page(site: &SiteConfig, post: &PostContent) -> String {
    let metadata = &post.metadata;
    let page: Markup = html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="utf-8";
                meta name="viewport" content="width=device-width, initial-scale=1";
                title { (metadata.title) " — " (site.title) }
                @if let Some(summary) = &metadata.summary {
                    meta name="description" content=(summary);
                }
            }
            body {
                header {
                    a href=(site.base_url) { (site.title) }
                }
                article {
                    h1 { (metadata.title) }
                    p.meta {
                        time datetime=(metadata.published.to_rfc3339()) {
                            (metadata.published.format("%B %d, %Y"))
                        }
                        @if let Some(updated) = metadata.updated {
                            " · updated "
                            time datetime=(updated.to_rfc3339()) {
                                (updated.format("%B %d, %Y"))
                            }
                        }
                    }
                    @if !metadata.tags.is_empty() {
                        p.tags {
                            @for tag in &metadata.tags {
                                a href={ (site.base_url) "?tag=" (tag) } { "#" (tag) } " "
                            }
                        }
                    }
                    (PreEscaped(&post.html))
                }
            }
        }
    };
    page.into_string()
}

/// The query-surface page: post listing plus year navigation.
pub fn index_page(
    site: &SiteConfig,
    posts: &[PostMetadata],
    years: &[YearNav],
    query: Option<&str>,
) -> String {
    let page: Markup = html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="utf-8";
                meta name="viewport" content="width=device-width, initial-scale=1";
                title { (site.title) }
                @if !site.description.is_empty() {
                    meta name="description" content=(site.description);
                }
            }
            body {
                header {
                    h1 { (site.title) }
                    nav.years {
                        @for year in years {
                            @if year.current {
                                strong { (year.year) } " "
                            } @else {
                                a href={ (site.base_url) "?year=" (year.year) } { (year.year) } " "
                            }
                        }
                    }
                    form method="get" action=(site.base_url) {
                        input type="text" name="query" value=[query] placeholder="search";
                        button type="submit" { "go" }
                    }
                }
                main {
                    @if posts.is_empty() {
                        p { "Nothing here." }
                    }
                    @for post in posts {
                        article {
                            h2 {
                                a href={ (site.base_url) (post.url) } { (post.title) }
                            }
                            p.meta {
                                time datetime=(post.published.to_rfc3339()) {
                                    (post.published.format("%B %d, %Y"))
                                }
                            }
                            @if let Some(summary) = &post.summary {
                                p { (summary) }
                            }
                        }
                    }
                }
            }
        }
    };
    page.into_string()
}

fn escape_html(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_basic_markdown() {
        let html = render_html("# Title\n\nSome *emphasis*.", &PlainHighlighter);
        assert!(html.contains("<h1>Title</h1>"));
        assert!(html.contains("<em>emphasis</em>"));
    }

    #[test]
    fn test_render_code_block_through_highlighter() {
        let html = render_html("```rust\nlet x = 1 < 2;\n```", &PlainHighlighter);
        assert!(html.contains("class=\"language-rust\""));
        assert!(html.contains("1 &lt; 2"));
    }

    #[test]
    fn test_plain_text_strips_markup() {
        let text = plain_text("# Title\n\nSome *emphasis* and `code`.\n\n- item one\n- item two");
        assert_eq!(text, "Title Some emphasis and code. item one item two");
    }

    #[test]
    fn test_plain_highlighter_escapes() {
        let out = PlainHighlighter.highlight("a < b && c > d", "");
        assert!(out.contains("a &lt; b &amp;&amp; c &gt; d"));
        assert!(out.starts_with("<pre><code>"));
    }
}
