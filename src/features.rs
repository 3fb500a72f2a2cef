//! Digital-presence signals extracted from crawled pages.

use regex::Regex;
use scraper::{Html, Selector};
use std::sync::OnceLock;

use crate::models::{BusinessRecord, FeatureVector, PageSnapshot};

/// Raw-HTML signatures of tag-manager / analytics scripts.
const ANALYTICS_PATTERNS: &[&str] = &["gtag(", "googletagmanager", "analytics.js", "gtm-"];

/// Anchor-text keywords that count as a contact call to action.
const CONTACT_KEYWORDS: &[&str] = &["contact", "book", "call", "appointment", "consultation"];

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\w.+-]+@[\w-]+\.[\w.-]+").expect("email regex is valid"))
}

fn phone_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\+?\d[\d\s().-]{7,}").expect("phone regex is valid"))
}

/// Display name for a detected language code; unknown codes pass through unchanged.
pub fn language_label(code: &str) -> String {
    match code.to_lowercase().as_str() {
        "ar" | "ar-sa" => "Arabic".to_string(),
        "en" | "en-us" => "English".to_string(),
        _ => code.to_string(),
    }
}

/// Markup signals of a single page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageSignals {
    pub structured_data: bool,
    pub meta_description: bool,
    pub open_graph: bool,
    pub viewport_meta: bool,
    pub analytics: bool,
    pub contact_cta: bool,
    pub email: bool,
    pub phone: bool,
}

impl PageSignals {
    fn merge(&mut self, other: PageSignals) {
        self.structured_data |= other.structured_data;
        self.meta_description |= other.meta_description;
        self.open_graph |= other.open_graph;
        self.viewport_meta |= other.viewport_meta;
        self.analytics |= other.analytics;
        self.contact_cta |= other.contact_cta;
        self.email |= other.email;
        self.phone |= other.phone;
    }
}

/// Detects the per-page signals from the raw HTML and extracted text.
pub fn page_signals(raw_html: &str, text: &str) -> PageSignals {
    let document = Html::parse_document(raw_html);
    let has = |selector: &str| {
        Selector::parse(selector)
            .map(|sel| document.select(&sel).next().is_some())
            .unwrap_or(false)
    };

    PageSignals {
        structured_data: has(r#"script[type="application/ld+json"]"#)
            || raw_html.contains("schema.org"),
        meta_description: has(r#"meta[name="description"]"#),
        open_graph: has(r#"meta[property^="og:"]"#),
        viewport_meta: has(r#"meta[name="viewport"]"#),
        analytics: ANALYTICS_PATTERNS.iter().any(|p| raw_html.contains(p)),
        contact_cta: has_contact_cta(&document),
        email: email_re().is_match(text),
        phone: phone_re().is_match(text),
    }
}

fn has_contact_cta(document: &Html) -> bool {
    let Ok(sel) = Selector::parse("a") else {
        return false;
    };
    document.select(&sel).any(|anchor| {
        let content = anchor.text().collect::<String>().to_lowercase();
        CONTACT_KEYWORDS.iter().any(|k| content.contains(k))
    })
}

/// Aggregates page signals into the business's feature vector.
///
/// Flags are OR'd across pages, languages are ranked by page frequency (ties
/// keep first-seen order), and the word count is the mean over all pages.
pub fn build_feature_vector(business: &BusinessRecord, pages: &[PageSnapshot]) -> FeatureVector {
    if pages.is_empty() {
        return FeatureVector::empty(business);
    }

    let mut signals = PageSignals::default();
    let mut language_counts: Vec<(String, usize)> = Vec::new();
    let mut total_words = 0usize;

    for page in pages {
        if let Some(code) = page.language.as_deref() {
            let label = language_label(code);
            match language_counts.iter_mut().find(|(l, _)| *l == label) {
                Some((_, count)) => *count += 1,
                None => language_counts.push((label, 1)),
            }
        }

        total_words += page.extracted_text.split_whitespace().count();
        signals.merge(page_signals(&page.raw_html, &page.extracted_text));
    }

    // Stable sort keeps first-seen order among equal counts
    language_counts.sort_by(|a, b| b.1.cmp(&a.1));

    FeatureVector {
        place_id: business.place_id.clone(),
        business_name: business.name.clone(),
        website: business.website.clone(),
        total_pages: pages.len(),
        languages: language_counts.into_iter().map(|(l, _)| l).collect(),
        avg_word_count: total_words as f64 / pages.len() as f64,
        has_structured_data: signals.structured_data,
        has_meta_description: signals.meta_description,
        has_open_graph: signals.open_graph,
        has_analytics: signals.analytics,
        has_contact_cta: signals.contact_cta,
        has_viewport_meta: signals.viewport_meta,
        has_email_address: signals.email,
        has_phone_number: signals.phone,
    }
}
