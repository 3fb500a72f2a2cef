use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::AppError;

// ============ Discovery Models ============

/// A point on the map.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

impl Default for Coordinates {
    /// Riyadh city centre.
    fn default() -> Self {
        Self::new(24.7136, 46.6753)
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.lat, self.lng)
    }
}

impl FromStr for Coordinates {
    type Err = AppError;

    /// Parses `"lat,lng"`, e.g. `"24.7136,46.6753"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || {
            AppError::BadRequest(format!(
                "Invalid location format '{}'. Use 'lat,lng' (e.g., '24.7136,46.6753')",
                s
            ))
        };
        let (lat, lng) = s.split_once(',').ok_or_else(invalid)?;
        let lat: f64 = lat.trim().parse().map_err(|_| invalid())?;
        let lng: f64 = lng.trim().parse().map_err(|_| invalid())?;
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
            return Err(invalid());
        }
        Ok(Self { lat, lng })
    }
}

/// A business discovered through the Places API.
///
/// Backfilled with phone/website/map URL by the details pass, then treated as read-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusinessRecord {
    /// Places identifier, unique within a discovery run.
    pub place_id: String,
    pub name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub location: Coordinates,
    /// Category tags, most specific first.
    #[serde(default)]
    pub types: Vec<String>,
    /// Average rating between 0.0 and 5.0.
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub user_ratings_total: Option<u32>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub google_maps_url: String,
}

impl BusinessRecord {
    /// A record that only knows its website, used for ad-hoc site analysis.
    pub fn website_only(name: impl Into<String>, website: impl Into<String>) -> Self {
        Self {
            place_id: String::new(),
            name: name.into(),
            address: String::new(),
            location: Coordinates::default(),
            types: Vec::new(),
            rating: None,
            user_ratings_total: None,
            website: Some(website.into()),
            phone_number: None,
            google_maps_url: String::new(),
        }
    }

    /// Industry label derived from the first category tag.
    pub fn industry(&self) -> String {
        match self.types.first() {
            Some(tag) if !tag.trim().is_empty() => title_case(&tag.replace('_', " ")),
            _ => "General".to_string(),
        }
    }
}

fn title_case(value: &str) -> String {
    value
        .split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(|c| c.to_lowercase()))
                    .collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

// ============ Crawl Models ============

/// Captured content of one successfully fetched page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageSnapshot {
    /// Normalized source URL.
    pub url: String,
    pub title: String,
    /// Detected language code, if the text was long enough to detect.
    pub language: Option<String>,
    pub raw_html: String,
    pub extracted_text: String,
}

// ============ Feature & Score Models ============

/// Fixed-shape digital presence signals for one business.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub place_id: String,
    pub business_name: String,
    pub website: Option<String>,
    pub total_pages: usize,
    /// Distinct languages, most frequent first.
    pub languages: Vec<String>,
    pub avg_word_count: f64,
    pub has_structured_data: bool,
    pub has_meta_description: bool,
    pub has_open_graph: bool,
    pub has_analytics: bool,
    pub has_contact_cta: bool,
    pub has_viewport_meta: bool,
    pub has_email_address: bool,
    pub has_phone_number: bool,
}

impl FeatureVector {
    /// The all-false vector for a business without crawled pages.
    pub fn empty(business: &BusinessRecord) -> Self {
        Self {
            place_id: business.place_id.clone(),
            business_name: business.name.clone(),
            website: business.website.clone(),
            total_pages: 0,
            languages: Vec::new(),
            avg_word_count: 0.0,
            has_structured_data: false,
            has_meta_description: false,
            has_open_graph: false,
            has_analytics: false,
            has_contact_cta: false,
            has_viewport_meta: false,
            has_email_address: false,
            has_phone_number: false,
        }
    }
}

/// Independent dimension scores, each in [0, 100].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SubScores {
    pub technical: f64,
    pub seo: f64,
    pub content: f64,
    pub trust: f64,
}

impl SubScores {
    /// Mean of the four subscores rounded to two decimals.
    pub fn overall(&self) -> f64 {
        let mean = (self.technical + self.seo + self.content + self.trust) / 4.0;
        (mean * 100.0).round() / 100.0
    }
}

/// Scored assessment plus bilingual narrative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaturityAssessment {
    pub place_id: String,
    pub business_name: String,
    pub overall_score: f64,
    pub subscores: SubScores,
    pub highlights_en: String,
    pub highlights_ar: String,
    pub recommendations_en: String,
    pub recommendations_ar: String,
}

// ============ Pipeline Models ============

/// One business carried through the whole pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzedBusiness {
    pub business: BusinessRecord,
    pub feature_vector: FeatureVector,
    /// Titles of the crawled pages; the snapshots themselves are dropped after extraction.
    pub page_titles: Vec<String>,
    #[serde(rename = "digital_maturity")]
    pub maturity: MaturityAssessment,
    pub industry: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndustryCount {
    pub industry: String,
    pub count: usize,
}

/// Histogram of overall scores.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaturityDistribution {
    #[serde(rename = "low (0-30)")]
    pub low: usize,
    #[serde(rename = "medium (31-70)")]
    pub medium: usize,
    #[serde(rename = "high (71-100)")]
    pub high: usize,
}

impl MaturityDistribution {
    pub fn from_scores(scores: &[f64]) -> Self {
        let mut dist = Self::default();
        for &score in scores {
            if score <= 30.0 {
                dist.low += 1;
            } else if score <= 70.0 {
                dist.medium += 1;
            } else {
                dist.high += 1;
            }
        }
        dist
    }
}

/// Per-run aggregate written to `summary.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total_businesses: usize,
    pub average_maturity_score: f64,
    pub min_maturity_score: Option<f64>,
    pub max_maturity_score: Option<f64>,
    pub industries: Vec<IndustryCount>,
    pub maturity_distribution: MaturityDistribution,
    pub analysis_completed_at: Option<String>,
}

/// Industry histogram ordered by count (desc), then name.
pub fn industry_histogram<'a>(industries: impl IntoIterator<Item = &'a str>) -> Vec<IndustryCount> {
    let mut counts: Vec<IndustryCount> = Vec::new();
    for industry in industries {
        match counts.iter_mut().find(|c| c.industry == industry) {
            Some(entry) => entry.count += 1,
            None => counts.push(IndustryCount {
                industry: industry.to_string(),
                count: 1,
            }),
        }
    }
    counts.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.industry.cmp(&b.industry)));
    counts
}
