//! HTML parser for extracting sections and links
//!
//! This module turns an HTML document into:
//! - Sections: every `h1`-`h6` starts a section; the paragraphs, list items,
//!   `pre` blocks and inline code that follow it become its content
//! - Links to follow (absolute URLs, not yet scope-filtered)

use crate::extractor::{Element, ElementTag, Section};
use scraper::{ElementRef, Html, Selector};
use url::Url;

const CONTENT_SELECTOR: &str = "h1, h2, h3, h4, h5, h6, p, li, pre, code";

/// Elements whose text is already captured by an enclosing element
const CONTAINERS: &[&str] = &[
    "p", "li", "pre", "code", "h1", "h2", "h3", "h4", "h5", "h6",
];

/// Extracted information from an HTML page
#[derive(Debug, Clone, Default)]
pub struct ParsedPage {
    /// The page title (from the `<title>` tag)
    pub title: Option<String>,

    pub sections: Vec<Section>,

    /// All links found on the page (absolute URLs)
    pub links: Vec<String>,
}

/// Parses HTML content and extracts sections, links and the title
///
/// # Arguments
///
/// * `html` - The HTML content to parse
/// * `base_url` - The base URL for resolving relative links
///
/// # Example
///
/// ```
/// use pagewalk::extractor::parse_page;
/// use url::Url;
///
/// let html = r#"<html><body><h1>Intro</h1><p>Hello</p><a href="/next">Next</a></body></html>"#;
/// let base_url = Url::parse("https://example.com/").unwrap();
/// let parsed = parse_page(html, &base_url);
/// assert_eq!(parsed.sections[0].title, "Intro");
/// assert_eq!(parsed.links, vec!["https://example.com/next".to_string()]);
/// ```
pub fn parse_page(html: &str, base_url: &Url) -> ParsedPage {
    let document = Html::parse_document(html);
    let title = extract_title(&document);

    ParsedPage {
        sections: sections_from_document(&document, title.as_deref()),
        links: links_from_document(&document, base_url),
        title,
    }
}

/// Convenience function for extracting just the sections
pub fn extract_sections(html: &str) -> Vec<Section> {
    let document = Html::parse_document(html);
    let title = extract_title(&document);
    sections_from_document(&document, title.as_deref())
}

/// Convenience function for extracting just the links
pub fn extract_links(html: &str, base_url: &Url) -> Vec<String> {
    links_from_document(&Html::parse_document(html), base_url)
}

fn extract_title(document: &Html) -> Option<String> {
    let title_selector = Selector::parse("title").ok()?;

    document
        .select(&title_selector)
        .next()
        .map(|element| collapse_whitespace(&element.text().collect::<String>()))
        .filter(|s| !s.is_empty())
}

fn sections_from_document(document: &Html, page_title: Option<&str>) -> Vec<Section> {
    let selector = match Selector::parse(CONTENT_SELECTOR) {
        Ok(selector) => selector,
        Err(_) => return Vec::new(),
    };

    let mut sections = Vec::new();
    let mut current: Option<Section> = None;

    for element in document.select(&selector) {
        let name = element.value().name();

        if is_heading(name) {
            let title = collapse_whitespace(&element.text().collect::<String>());
            if title.is_empty() {
                continue;
            }
            if let Some(done) = current.take() {
                sections.push(done);
            }
            current = Some(Section {
                title,
                content: Vec::new(),
            });
            continue;
        }

        let Some(tag) = ElementTag::from_html(name) else {
            continue;
        };
        if inside_container(&element) {
            continue;
        }

        let raw: String = element.text().collect();
        let text = match tag {
            ElementTag::Pre => raw.trim_matches('\n').to_string(),
            _ => collapse_whitespace(&raw),
        };
        if text.trim().is_empty() {
            continue;
        }

        current
            .get_or_insert_with(|| Section {
                title: page_title.unwrap_or_default().to_string(),
                content: Vec::new(),
            })
            .content
            .push(Element { tag, text });
    }

    if let Some(done) = current {
        sections.push(done);
    }

    sections
}

fn is_heading(name: &str) -> bool {
    matches!(name, "h1" | "h2" | "h3" | "h4" | "h5" | "h6")
}

fn inside_container(element: &ElementRef<'_>) -> bool {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .any(|ancestor| CONTAINERS.contains(&ancestor.value().name()))
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Extracts all followable links from the document
///
/// **Include:** `<a href>` anywhere and `<link rel="canonical">`.
///
/// **Exclude:** `<a download>`, `javascript:`, `mailto:`, `tel:` and `data:`
/// hrefs, fragment-only anchors, non-HTTP(S) results.
fn links_from_document(document: &Html, base_url: &Url) -> Vec<String> {
    let mut links = Vec::new();

    if let Ok(a_selector) = Selector::parse("a[href]") {
        for element in document.select(&a_selector) {
            if element.value().attr("download").is_some() {
                continue;
            }

            if let Some(absolute_url) = element
                .value()
                .attr("href")
                .and_then(|href| resolve_link(href, base_url))
            {
                links.push(absolute_url);
            }
        }
    }

    if let Ok(canonical_selector) = Selector::parse("link[rel='canonical'][href]") {
        for element in document.select(&canonical_selector) {
            if let Some(absolute_url) = element
                .value()
                .attr("href")
                .and_then(|href| resolve_link(href, base_url))
            {
                links.push(absolute_url);
            }
        }
    }

    links
}

fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lower = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
    {
        return None;
    }

    let absolute_url = base_url.join(href).ok()?;
    match absolute_url.scheme() {
        "http" | "https" => Some(absolute_url.to_string()),
        _ => None,
    }
}
