//! Heuristic digital-maturity scoring plus LLM-written bilingual narrative.

use std::sync::Arc;

use crate::errors::AppError;
use crate::llm::TextGenerator;
use crate::models::{BusinessRecord, FeatureVector, MaturityAssessment, SubScores};

/// Narrative language of a prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NarrativeLanguage {
    English,
    Arabic,
}

impl NarrativeLanguage {
    pub fn name(self) -> &'static str {
        match self {
            NarrativeLanguage::English => "English",
            NarrativeLanguage::Arabic => "Arabic",
        }
    }
}

pub fn score_technical(business: &BusinessRecord, features: &FeatureVector) -> f64 {
    let mut score = 50.0;
    if business
        .website
        .as_deref()
        .is_some_and(|w| w.starts_with("https"))
    {
        score += 15.0;
    }
    if features.has_structured_data {
        score += 10.0;
    }
    if features.has_viewport_meta {
        score += 10.0;
    }
    if features.has_analytics {
        score += 15.0;
    }
    f64::min(score, 100.0)
}

pub fn score_seo(features: &FeatureVector) -> f64 {
    let mut score = 40.0;
    if features.has_meta_description {
        score += 15.0;
    }
    if features.has_open_graph {
        score += 10.0;
    }
    if features.languages.len() >= 2 {
        score += 15.0;
    }
    if features.avg_word_count >= 300.0 {
        score += 20.0;
    }
    f64::min(score, 100.0)
}

pub fn score_content(features: &FeatureVector) -> f64 {
    let mut score = 35.0;
    if features.avg_word_count >= 400.0 {
        score += 20.0;
    } else if features.avg_word_count >= 250.0 {
        score += 10.0;
    }
    if features.total_pages >= 3 {
        score += 15.0;
    }
    if features.has_contact_cta {
        score += 10.0;
    }
    f64::min(score, 100.0)
}

pub fn score_trust(business: &BusinessRecord, features: &FeatureVector) -> f64 {
    let mut score = 45.0;
    if business.rating.unwrap_or(0.0) >= 4.2 {
        score += 15.0;
    }
    if features.has_email_address {
        score += 10.0;
    }
    if features.has_phone_number {
        score += 10.0;
    }
    if business.user_ratings_total.unwrap_or(0) > 50 {
        score += 10.0;
    }
    f64::min(score, 100.0)
}

/// The four deterministic subscores.
pub fn calculate_subscores(business: &BusinessRecord, features: &FeatureVector) -> SubScores {
    SubScores {
        technical: score_technical(business, features),
        seo: score_seo(features),
        content: score_content(features),
        trust: score_trust(business, features),
    }
}

/// Prompt asking for a short strengths/risks summary.
pub fn highlights_prompt(
    business: &BusinessRecord,
    features: &FeatureVector,
    subscores: &SubScores,
    language: NarrativeLanguage,
) -> String {
    let languages = if features.languages.is_empty() {
        "Unknown".to_string()
    } else {
        features.languages.join(", ")
    };

    format!(
        "You are an AI analyst for BrainSAIT. Provide a concise {} summary of the digital maturity \
         for {} located at {}.\n\
         Technical score: {:.1}. SEO score: {:.1}. Content score: {:.1}. Trust score: {:.1}.\n\
         Crawled pages: {}. Languages detected: {}.\n\
         Highlight strengths and call out the top risks without marketing fluff.",
        language.name(),
        business.name,
        business.address,
        subscores.technical,
        subscores.seo,
        subscores.content,
        subscores.trust,
        features.total_pages,
        languages,
    )
}

/// Prompt asking for package-oriented next steps.
pub fn recommendations_prompt(
    business: &BusinessRecord,
    features: &FeatureVector,
    subscores: &SubScores,
    language: NarrativeLanguage,
) -> String {
    format!(
        "You are an expert consultant at BrainSAIT. Craft a persuasive yet actionable {} \
         recommendation for {}. Tie the advice to BrainSAIT packages (Basic, Professional, \
         Enterprise) as appropriate.\n\
         Scores - Technical: {:.1}, SEO: {:.1}, Content: {:.1}, Trust: {:.1}.\n\
         Key signals: structured data={}, analytics={}, contact CTA={}, average word count={:.0}.\n\
         Limit to 4 bullet points max and include a clear next step.",
        language.name(),
        business.name,
        subscores.technical,
        subscores.seo,
        subscores.content,
        subscores.trust,
        features.has_structured_data,
        features.has_analytics,
        features.has_contact_cta,
        features.avg_word_count,
    )
}

/// Scores businesses and asks the LLM for the narrative around the numbers.
#[derive(Clone)]
pub struct MaturityScorer {
    llm: Arc<dyn TextGenerator>,
}

impl MaturityScorer {
    pub fn new(llm: Arc<dyn TextGenerator>) -> Self {
        Self { llm }
    }

    /// Full assessment: subscores, overall score, and four narrative texts.
    ///
    /// Any failed generation request fails the whole assessment; there is no
    /// local fallback text.
    pub async fn score(
        &self,
        business: &BusinessRecord,
        features: &FeatureVector,
    ) -> Result<MaturityAssessment, AppError> {
        let subscores = calculate_subscores(business, features);

        let prompts = [
            highlights_prompt(business, features, &subscores, NarrativeLanguage::English),
            highlights_prompt(business, features, &subscores, NarrativeLanguage::Arabic),
            recommendations_prompt(business, features, &subscores, NarrativeLanguage::English),
            recommendations_prompt(business, features, &subscores, NarrativeLanguage::Arabic),
        ];

        let (highlights_en, highlights_ar, recommendations_en, recommendations_ar) = tokio::try_join!(
            self.llm.generate(&prompts[0]),
            self.llm.generate(&prompts[1]),
            self.llm.generate(&prompts[2]),
            self.llm.generate(&prompts[3]),
        )?;

        Ok(MaturityAssessment {
            place_id: business.place_id.clone(),
            business_name: business.name.clone(),
            overall_score: subscores.overall(),
            subscores,
            highlights_en: highlights_en.trim().to_string(),
            highlights_ar: highlights_ar.trim().to_string(),
            recommendations_en: recommendations_en.trim().to_string(),
            recommendations_ar: recommendations_ar.trim().to_string(),
        })
    }
}
