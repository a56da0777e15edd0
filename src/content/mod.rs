//! Content processing for crawled pages.
//!
//! This module turns raw HTML into clean, scored text: readability-style
//! main-content extraction, boilerplate removal, a composite quality score,
//! URL canonicalization, and the robots.txt policy cache.

mod error;
pub mod normalize;
pub mod robots;

pub use error::ContentError;
pub use normalize::normalize_url;
pub use robots::{RobotsCache, RobotsPolicy};

use scraper::{Html, Selector};
use tracing::debug;

/// Selectors tried, in order, to locate the main content subtree.
const CONTENT_SELECTORS: &[&str] = &["main", "article", r#"[role="main"]"#, "#content", ".content"];

/// Elements stripped from the chosen subtree before text collection.
const CHROME_SELECTOR: &str = "script, style, noscript, nav, header, footer, aside";

/// Boilerplate phrases removed by [`clean_text`].
const NOISE_PATTERNS: &[&str] = &[
    "Click here",
    "Read more",
    "Subscribe now",
    "Sign up",
    "Advertisement",
    "Cookie policy",
    "Privacy policy",
    "Terms of service",
];

/// The cleaned and scored content of one page.
#[derive(Debug, Clone)]
pub struct ProcessedContent {
    /// Document title
    pub title: String,
    /// Extracted main text
    pub text: String,
    /// Short description, from metadata or the leading text
    pub excerpt: String,
    /// Author attribution when present
    pub byline: String,
    /// Length of `text` in bytes
    pub length: usize,
    /// Composite quality heuristic in [0, 1]
    pub quality: f64,
    /// Whether the page clears the minimum readability bar
    pub is_readable: bool,
}

/// Extract the main content from an HTML document.
///
/// Tries common main-content containers first and strips navigation chrome
/// from whichever subtree wins; when nothing useful survives, falls back to
/// the whole `<body>` with tags stripped. Pure, performs no I/O.
pub fn extract(html: &str, page_url: &str) -> Result<ProcessedContent, ContentError> {
    if html.trim().is_empty() {
        return Err(ContentError::EmptyHtml);
    }

    let document = Html::parse_document(html);

    let mut text = String::new();
    for selector in CONTENT_SELECTORS {
        let sel = Selector::parse(selector).expect("static selector");
        if let Some(element) = document.select(&sel).next() {
            text = collect_text(&element.html());
            if !text.trim().is_empty() {
                break;
            }
        }
    }

    if text.trim().is_empty() {
        text = fallback_extraction(&document);
    }

    let title = extract_title(&document);
    let byline = meta_content(&document, r#"meta[name="author"]"#).unwrap_or_default();
    let excerpt = meta_content(&document, r#"meta[name="description"]"#)
        .unwrap_or_else(|| leading_excerpt(&text));

    let length = text.len();
    let quality = quality_score(&text, length);

    let processed = ProcessedContent {
        title,
        text,
        excerpt,
        byline,
        length,
        quality,
        is_readable: quality >= 0.3,
    };

    debug!(
        url = page_url,
        title = %processed.title,
        length = processed.length,
        quality = processed.quality,
        readable = processed.is_readable,
        "content processed"
    );

    Ok(processed)
}

/// Collapse whitespace runs and strip boilerplate phrases.
pub fn clean_text(text: &str) -> String {
    let mut cleaned = text.split_whitespace().collect::<Vec<_>>().join(" ");

    for pattern in NOISE_PATTERNS {
        cleaned = cleaned.replace(pattern, "");
        cleaned = cleaned.replace(&pattern.to_lowercase(), "");
        cleaned = cleaned.replace(&pattern.to_uppercase(), "");
    }

    // The removals can leave doubled spaces behind.
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Whether content clears the configured acceptance thresholds.
pub fn is_content_valid(content: &ProcessedContent, min_length: usize, min_quality: f64) -> bool {
    if content.length < min_length {
        debug!(
            length = content.length,
            min_length, "content below minimum length"
        );
        return false;
    }
    if content.quality < min_quality {
        debug!(
            quality = content.quality,
            min_quality, "content below minimum quality"
        );
        return false;
    }
    true
}

/// Composite quality heuristic.
///
/// Bands: length (500-5000 chars scores highest), word count, and
/// sentence-terminator count; capped at 1.0.
fn quality_score(content: &str, length: usize) -> f64 {
    if length == 0 {
        return 0.0;
    }

    let mut score: f64 = 0.0;

    if (500..=5000).contains(&length) {
        score += 0.4;
    } else if length > 5000 {
        score += 0.3;
    } else if length > 200 {
        score += 0.2;
    }

    let word_count = content.split_whitespace().count();
    if word_count > 100 {
        score += 0.3;
    } else if word_count > 50 {
        score += 0.2;
    }

    let sentences = content.matches(['.', '!', '?']).count();
    if sentences > 5 {
        score += 0.2;
    }

    score.min(1.0)
}

/// Parse an HTML fragment and collect visible text with chrome removed.
fn collect_text(fragment: &str) -> String {
    let without_chrome = strip_chrome(fragment);
    let doc = Html::parse_fragment(&without_chrome);
    doc.root_element()
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Remove script/style/navigation elements from an HTML fragment.
fn strip_chrome(html: &str) -> String {
    let doc = Html::parse_fragment(html);
    let chrome_sel = Selector::parse(CHROME_SELECTOR).expect("static selector");

    let mut result = html.to_string();
    for el in doc.select(&chrome_sel) {
        result = result.replace(&el.html(), "");
    }
    result
}

/// Last resort when no content container yields text: the whole body.
fn fallback_extraction(document: &Html) -> String {
    let body_sel = Selector::parse("body").expect("static selector");
    match document.select(&body_sel).next() {
        Some(body) => collect_text(&body.inner_html()),
        None => String::new(),
    }
}

fn extract_title(document: &Html) -> String {
    let title_sel = Selector::parse("title").expect("static selector");
    if let Some(el) = document.select(&title_sel).next() {
        let title = el.text().collect::<String>().trim().to_string();
        if !title.is_empty() {
            return title;
        }
    }

    let h1_sel = Selector::parse("h1").expect("static selector");
    document
        .select(&h1_sel)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .unwrap_or_default()
}

fn meta_content(document: &Html, selector: &str) -> Option<String> {
    let sel = Selector::parse(selector).ok()?;
    document
        .select(&sel)
        .next()
        .and_then(|el| el.value().attr("content"))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn leading_excerpt(text: &str) -> String {
    if text.len() <= 200 {
        return text.to_string();
    }
    let mut end = 200;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}
