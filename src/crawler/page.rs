//! HTML cleaning and link extraction for crawled pages.

use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::types::RagError;

/// Tags whose subtrees carry no document content.
const NOISE_TAGS: &[&str] = &[
    "script", "style", "nav", "footer", "header", "aside", "iframe", "noscript",
];

/// Pages with fewer words than this are not worth storing.
pub const MIN_CONTENT_WORDS: usize = 50;

/// A fetched page reduced to what the pipeline needs.
#[derive(Debug, Clone)]
pub struct ParsedPage {
    pub title: String,
    pub content: String,
    /// `<pre>` block count, kept as a rough content-quality signal.
    pub code_blocks: usize,
    pub word_count: usize,
    /// Outbound links, absolutized against the page URL, fragments
    /// stripped.
    pub links: Vec<Url>,
}

/// Strips noise tags, then extracts title, text, code-block count, and
/// outbound links.
pub fn parse_page(body: &str, base: &Url) -> Result<ParsedPage, RagError> {
    let document = Html::parse_document(body);
    let title_selector = Selector::parse("title").map_err(parse_err)?;
    let pre_selector = Selector::parse("pre").map_err(parse_err)?;
    let anchor_selector = Selector::parse("a[href]").map_err(parse_err)?;

    let title = document
        .select(&title_selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|title| !title.is_empty())
        .unwrap_or_else(|| "Untitled".to_string());

    let mut content = String::new();
    collect_text(document.root_element(), &mut content);
    let content = content.trim().to_string();
    let word_count = content.split_whitespace().count();

    let code_blocks = document.select(&pre_selector).count();
    let links = collect_links(&document, &anchor_selector, base);

    Ok(ParsedPage {
        title,
        content,
        code_blocks,
        word_count,
        links,
    })
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    if NOISE_TAGS.contains(&element.value().name()) {
        return;
    }
    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    out.push_str(trimmed);
                    out.push('\n');
                }
            }
            Node::Element(_) => {
                if let Some(child_element) = ElementRef::wrap(child) {
                    collect_text(child_element, out);
                }
            }
            _ => {}
        }
    }
}

fn collect_links(document: &Html, selector: &Selector, base: &Url) -> Vec<Url> {
    let mut links = Vec::new();
    for element in document.select(selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        if href.starts_with('#') || href.starts_with("javascript:") || href.starts_with("mailto:")
        {
            continue;
        }
        let Ok(mut resolved) = base.join(href) else {
            continue;
        };
        resolved.set_fragment(None);
        links.push(resolved);
    }
    links
}

fn parse_err(err: impl std::fmt::Display) -> RagError {
    RagError::Parse(err.to_string())
}
