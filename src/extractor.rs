//! Title, main text, language and link extraction from raw HTML.
//!
//! Everything here is synchronous: `scraper::Html` is not `Send`, so callers
//! parse inside a plain function and only carry owned results across awaits.

use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::url_normalizer::{self, NormalizedUrl};

/// Minimum text length (in characters) worth running language detection on.
pub const MIN_LANGUAGE_TEXT_CHARS: usize = 20;

/// Elements whose content is never part of the readable text.
const NON_CONTENT_TAGS: &[&str] = &[
    "script", "style", "noscript", "template", "svg", "iframe", "head",
];

/// Page chrome dropped during main-content extraction.
const BOILERPLATE_TAGS: &[&str] = &["nav", "header", "footer", "aside", "form"];

/// Title and readable text of one page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extracted {
    pub title: String,
    pub text: String,
}

/// Collapses every run of whitespace into a single space and trims the ends.
pub fn clean_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Extracts the page title and its main text.
///
/// Never fails: malformed markup yields whatever the parser recovered, an
/// absent title yields an empty string.
pub fn extract(html: &str) -> Extracted {
    let document = Html::parse_document(html);
    Extracted {
        title: extract_title(&document),
        text: extract_text(&document),
    }
}

fn extract_title(document: &Html) -> String {
    let Ok(sel) = Selector::parse("title") else {
        return String::new();
    };
    document
        .select(&sel)
        .next()
        .map(|el| clean_whitespace(&el.text().collect::<String>()))
        .unwrap_or_default()
}

fn extract_text(document: &Html) -> String {
    let main = main_content(document);
    if !main.is_empty() {
        return main;
    }

    // Fallback: every visible text node in the document
    let mut out = String::new();
    collect_text(document.root_element(), NON_CONTENT_TAGS, &mut out);
    clean_whitespace(&out)
}

/// Best-effort boilerplate removal: prefer an explicit main/article region,
/// otherwise the body without navigation chrome.
fn main_content(document: &Html) -> String {
    let skip: Vec<&str> = NON_CONTENT_TAGS
        .iter()
        .chain(BOILERPLATE_TAGS)
        .copied()
        .collect();

    for selector in ["main", "article", "[role=main]", "body"] {
        let Ok(sel) = Selector::parse(selector) else {
            continue;
        };
        let mut out = String::new();
        for el in document.select(&sel) {
            collect_text(el, &skip, &mut out);
        }
        let text = clean_whitespace(&out);
        if !text.is_empty() {
            return text;
        }
    }

    String::new()
}

fn collect_text(element: ElementRef<'_>, skip: &[&str], out: &mut String) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
            out.push(' ');
        } else if let Some(el) = ElementRef::wrap(child) {
            if !skip.contains(&el.value().name()) {
                collect_text(el, skip, out);
            }
        }
    }
}

/// Detects the dominant language of `text` as a short code (`en`, `ar`, ...).
///
/// Returns `None` for text shorter than [`MIN_LANGUAGE_TEXT_CHARS`] or when the
/// detector has no answer.
pub fn detect_language(text: &str) -> Option<String> {
    if text.chars().count() < MIN_LANGUAGE_TEXT_CHARS {
        return None;
    }

    let info = whatlang::detect(text)?;
    let code = match info.lang() {
        whatlang::Lang::Eng => "en",
        whatlang::Lang::Ara => "ar",
        whatlang::Lang::Fra => "fr",
        whatlang::Lang::Urd => "ur",
        whatlang::Lang::Hin => "hi",
        other => other.code(),
    };
    Some(code.to_string())
}

/// All `<a href>` targets of the page, resolved against `page_url` and
/// normalized, in document order. Non-http(s) links are dropped.
pub fn extract_links(html: &str, page_url: &Url) -> Vec<NormalizedUrl> {
    let document = Html::parse_document(html);
    let Ok(sel) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    document
        .select(&sel)
        .filter_map(|el| el.value().attr("href"))
        .filter_map(|href| url_normalizer::normalize_relative(page_url, href))
        .collect()
}
