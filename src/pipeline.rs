use chrono::{DateTime, SecondsFormat, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::crawler::SiteCrawler;
use crate::errors::AppError;
use crate::features::build_feature_vector;
use crate::fetcher::PageFetcher;
use crate::llm::{OpenAiClient, TextGenerator};
use crate::models::{
    industry_histogram, AnalyzedBusiness, BusinessRecord, Coordinates, MaturityDistribution,
    RunSummary,
};
use crate::places::GooglePlacesClient;
use crate::retry::RetryPolicy;
use crate::scoring::MaturityScorer;
use crate::storage::{slugify, DataStore};

/// Pause between consecutive business-type searches.
const TYPE_SEARCH_PAUSE: Duration = Duration::from_millis(250);

/// Options for one discovery run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineConfig {
    pub search_radius: u32,
    pub max_businesses: usize,
    /// Businesses analysed concurrently.
    pub batch_size: usize,
    pub include_web_analysis: bool,
    pub save_intermediate_results: bool,
    pub output_directory: PathBuf,
    /// Pages crawled per business website.
    pub max_pages: usize,
    /// Upper bound on results requested from Places for one business type.
    pub max_places_per_query: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            search_radius: 25_000,
            max_businesses: 100,
            batch_size: 20,
            include_web_analysis: true,
            save_intermediate_results: true,
            output_directory: PathBuf::from("results"),
            max_pages: crate::crawler::DEFAULT_MAX_PAGES,
            max_places_per_query: 60,
        }
    }
}

/// Everything one run produced.
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryResult {
    pub timestamp: String,
    pub config: PipelineConfig,
    pub businesses_discovered: usize,
    pub analyses: Vec<AnalyzedBusiness>,
    pub summary: RunSummary,
    pub output_files: Vec<PathBuf>,
}

/// Crawl, feature extraction and scoring for a single business.
#[derive(Clone)]
pub struct BusinessAnalyzer {
    crawler: SiteCrawler,
    scorer: MaturityScorer,
    include_web_analysis: bool,
}

impl BusinessAnalyzer {
    pub fn new(crawler: SiteCrawler, scorer: MaturityScorer, include_web_analysis: bool) -> Self {
        Self {
            crawler,
            scorer,
            include_web_analysis,
        }
    }

    pub fn crawler(&self) -> &SiteCrawler {
        &self.crawler
    }

    /// Analyses one business. Only a scoring (LLM) failure is an error.
    pub async fn analyze(&self, business: BusinessRecord) -> Result<AnalyzedBusiness, AppError> {
        let pages = match business.website.as_deref() {
            Some(website) if self.include_web_analysis => self.crawler.crawl(website).await,
            _ => Vec::new(),
        };

        let feature_vector = build_feature_vector(&business, &pages);
        let maturity = self.scorer.score(&business, &feature_vector).await?;

        Ok(AnalyzedBusiness {
            industry: business.industry(),
            page_titles: pages
                .into_iter()
                .map(|p| p.title)
                .filter(|t| !t.is_empty())
                .collect(),
            business,
            feature_vector,
            maturity,
        })
    }
}

/// Places results requested per business type: an even share of the run
/// budget, at least one, never above the per-query cap.
pub fn per_type_limit(max_businesses: usize, type_count: usize, per_query_cap: usize) -> usize {
    (max_businesses / type_count.max(1))
        .max(1)
        .min(per_query_cap.max(1))
}

/// Summary over the analysed businesses of a run.
pub fn summarize_analyses(
    analyses: &[AnalyzedBusiness],
    completed_at: Option<DateTime<Utc>>,
) -> RunSummary {
    let scores: Vec<f64> = analyses.iter().map(|a| a.maturity.overall_score).collect();

    let average = if scores.is_empty() {
        0.0
    } else {
        let mean = scores.iter().sum::<f64>() / scores.len() as f64;
        (mean * 100.0).round() / 100.0
    };

    RunSummary {
        total_businesses: analyses.len(),
        average_maturity_score: average,
        min_maturity_score: scores.iter().copied().reduce(f64::min),
        max_maturity_score: scores.iter().copied().reduce(f64::max),
        industries: industry_histogram(analyses.iter().map(|a| a.industry.as_str())),
        maturity_distribution: MaturityDistribution::from_scores(&scores),
        analysis_completed_at: completed_at.map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true)),
    }
}

/// Drives discover → crawl → features → score → persist.
pub struct PipelineOrchestrator {
    config: PipelineConfig,
    places: GooglePlacesClient,
    analyzer: BusinessAnalyzer,
    store: DataStore,
    language: String,
    type_pause: Duration,
}

impl PipelineOrchestrator {
    /// Wires the production clients from the environment configuration.
    pub fn new(settings: &Config, config: PipelineConfig) -> Result<Self, AppError> {
        let places = GooglePlacesClient::from_config(settings)?;
        let fetcher = PageFetcher::new(
            crate::crawler::DEFAULT_CRAWL_TIMEOUT,
            RetryPolicy::default(),
        )?;
        let crawler = SiteCrawler::new(fetcher, config.max_pages);
        let llm: Arc<dyn TextGenerator> = Arc::new(OpenAiClient::from_config(settings)?);

        Ok(Self::with_components(
            config,
            places,
            crawler,
            llm,
            settings.places_language().to_string(),
        ))
    }

    pub fn with_components(
        config: PipelineConfig,
        places: GooglePlacesClient,
        crawler: SiteCrawler,
        llm: Arc<dyn TextGenerator>,
        language: String,
    ) -> Self {
        let analyzer = BusinessAnalyzer::new(
            crawler,
            MaturityScorer::new(llm),
            config.include_web_analysis,
        );
        Self {
            store: DataStore::new(config.output_directory.clone()),
            config,
            places,
            analyzer,
            language,
            type_pause: TYPE_SEARCH_PAUSE,
        }
    }

    pub fn with_type_pause(mut self, pause: Duration) -> Self {
        self.type_pause = pause;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs the whole pipeline for the given business types around `center`.
    ///
    /// Per-type discovery failures and per-business scoring failures are
    /// logged and skipped; only persistence failures abort the run.
    pub async fn run(
        &self,
        business_types: &[String],
        center: Coordinates,
    ) -> Result<DiscoveryResult, AppError> {
        let started_at = Utc::now();
        let clock = Instant::now();
        tracing::info!(
            "Starting discovery pipeline for {} business types",
            business_types.len()
        );

        let discovered = self.discover_businesses(business_types, center).await;
        if discovered.is_empty() {
            tracing::warn!("No businesses discovered. Exiting pipeline.");
            return Ok(DiscoveryResult {
                timestamp: started_at.to_rfc3339_opts(SecondsFormat::Secs, true),
                config: self.config.clone(),
                businesses_discovered: 0,
                analyses: Vec::new(),
                summary: summarize_analyses(&[], None),
                output_files: Vec::new(),
            });
        }

        let businesses_discovered = discovered.len();
        let analyses = self.analyze_businesses(discovered).await;

        let run_dir = self.store.create_run_directory(started_at).await?;
        let summary = summarize_analyses(&analyses, Some(Utc::now()));
        let output_files = self.persist_outputs(&analyses, &summary, &run_dir).await?;

        tracing::info!("Pipeline completed in {:.2}s", clock.elapsed().as_secs_f64());

        Ok(DiscoveryResult {
            timestamp: started_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            config: self.config.clone(),
            businesses_discovered,
            analyses,
            summary,
            output_files,
        })
    }

    async fn discover_businesses(
        &self,
        business_types: &[String],
        center: Coordinates,
    ) -> Vec<BusinessRecord> {
        let per_type_limit = per_type_limit(
            self.config.max_businesses,
            business_types.len(),
            self.config.max_places_per_query,
        );
        let mut seen: HashSet<String> = HashSet::new();
        let mut discovered: Vec<BusinessRecord> = Vec::new();

        for (idx, business_type) in business_types.iter().enumerate() {
            if idx > 0 {
                tokio::time::sleep(self.type_pause).await;
            }
            tracing::debug!("Discovering type '{}'", business_type);

            let results = match self
                .places
                .discover(
                    business_type,
                    center,
                    self.config.search_radius,
                    &self.language,
                    per_type_limit,
                    true,
                )
                .await
            {
                Ok(results) => results,
                Err(e) => {
                    tracing::error!("Discovery failed for {}: {}", business_type, e);
                    continue;
                }
            };

            for record in results {
                if seen.insert(record.place_id.clone()) {
                    discovered.push(record);
                }
            }
        }

        tracing::info!("Discovered {} unique businesses", discovered.len());
        discovered
    }

    async fn analyze_businesses(&self, businesses: Vec<BusinessRecord>) -> Vec<AnalyzedBusiness> {
        let total = businesses.len();

        let analyses: Vec<AnalyzedBusiness> = stream::iter(businesses.into_iter().enumerate())
            .map(|(idx, business)| async move {
                tracing::debug!("Analysing {} ({}/{})", business.name, idx + 1, total);
                let name = business.name.clone();
                match self.analyzer.analyze(business).await {
                    Ok(analysis) => Some(analysis),
                    Err(e) => {
                        tracing::error!("Scoring failed for {}: {}", name, e);
                        None
                    }
                }
            })
            .buffered(self.config.batch_size.max(1))
            .filter_map(|analysis| async move { analysis })
            .collect()
            .await;

        tracing::info!("Prepared analyses for {} businesses", analyses.len());
        analyses
    }

    async fn persist_outputs(
        &self,
        analyses: &[AnalyzedBusiness],
        summary: &RunSummary,
        run_dir: &std::path::Path,
    ) -> Result<Vec<PathBuf>, AppError> {
        let mut output_files = Vec::new();

        output_files.push(
            self.store
                .write_jsonl(analyses, &run_dir.join("analyses.jsonl"))
                .await?,
        );
        output_files.push(
            self.store
                .write_json(summary, &run_dir.join("summary.json"))
                .await?,
        );

        if self.config.save_intermediate_results {
            let per_business_dir = run_dir.join("businesses");
            let mut used: HashSet<String> = HashSet::new();
            for analysis in analyses {
                let base = slugify(&analysis.business.name);
                let mut slug = base.clone();
                let mut n = 2;
                while !used.insert(slug.clone()) {
                    slug = format!("{}-{}", base, n);
                    n += 1;
                }
                let path = per_business_dir.join(format!("{}.json", slug));
                output_files.push(self.store.write_json(analysis, &path).await?);
            }
        }

        Ok(output_files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FeatureVector, MaturityAssessment, SubScores};

    fn analysed(name: &str, industry: &str, score: f64) -> AnalyzedBusiness {
        let business = BusinessRecord {
            place_id: name.to_string(),
            name: name.to_string(),
            address: String::new(),
            location: Coordinates::default(),
            types: Vec::new(),
            rating: None,
            user_ratings_total: None,
            website: None,
            phone_number: None,
            google_maps_url: String::new(),
        };
        AnalyzedBusiness {
            feature_vector: FeatureVector::empty(&business),
            page_titles: Vec::new(),
            maturity: MaturityAssessment {
                place_id: name.to_string(),
                business_name: name.to_string(),
                overall_score: score,
                subscores: SubScores {
                    technical: score,
                    seo: score,
                    content: score,
                    trust: score,
                },
                highlights_en: String::new(),
                highlights_ar: String::new(),
                recommendations_en: String::new(),
                recommendations_ar: String::new(),
            },
            industry: industry.to_string(),
            business,
        }
    }

    #[test]
    fn test_summary_statistics() {
        let analyses = vec![
            analysed("a", "Cafe", 42.5),
            analysed("b", "Dentist", 80.0),
            analysed("c", "Dentist", 30.0),
        ];
        let summary = summarize_analyses(&analyses, None);
        assert_eq!(summary.total_businesses, 3);
        assert_eq!(summary.average_maturity_score, 50.83);
        assert_eq!(summary.min_maturity_score, Some(30.0));
        assert_eq!(summary.max_maturity_score, Some(80.0));
        assert_eq!(summary.industries[0].industry, "Dentist");
        assert_eq!(summary.maturity_distribution.low, 1);
        assert_eq!(summary.maturity_distribution.medium, 1);
        assert_eq!(summary.maturity_distribution.high, 1);
    }

    #[test]
    fn test_per_type_limit() {
        assert_eq!(per_type_limit(100, 4, 60), 25);
        assert_eq!(per_type_limit(100, 1, 60), 60);
        assert_eq!(per_type_limit(100, 1, 20), 20);
        assert_eq!(per_type_limit(3, 5, 60), 1);
        assert_eq!(per_type_limit(10, 0, 60), 10);
    }

    #[test]
    fn test_empty_summary() {
        let summary = summarize_analyses(&[], None);
        assert_eq!(summary.total_businesses, 0);
        assert_eq!(summary.average_maturity_score, 0.0);
        assert_eq!(summary.min_maturity_score, None);
        assert!(summary.industries.is_empty());
    }

    #[test]
    fn test_summary_serializes_distribution_labels() {
        let value = serde_json::to_value(summarize_analyses(&[analysed("a", "Cafe", 10.0)], None))
            .unwrap();
        assert_eq!(value["maturity_distribution"]["low (0-30)"], 1);
        assert_eq!(value["maturity_distribution"]["medium (31-70)"], 0);
    }
}
