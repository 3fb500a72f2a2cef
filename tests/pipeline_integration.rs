/// End-to-end pipeline runs against mocked Places, website and LLM
use async_trait::async_trait;
use brainsait_discovery::crawler::SiteCrawler;
use brainsait_discovery::errors::AppError;
use brainsait_discovery::fetcher::PageFetcher;
use brainsait_discovery::llm::TextGenerator;
use brainsait_discovery::models::Coordinates;
use brainsait_discovery::pipeline::{PipelineConfig, PipelineOrchestrator};
use brainsait_discovery::places::GooglePlacesClient;
use brainsait_discovery::records::{load_analysis_records, summarise_records};
use brainsait_discovery::retry::RetryPolicy;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Canned narrative generator; fails for any prompt naming `fail_for`.
struct ScriptedLlm {
    fail_for: Option<&'static str>,
    calls: AtomicUsize,
}

impl ScriptedLlm {
    fn new(fail_for: Option<&'static str>) -> Arc<Self> {
        Arc::new(Self {
            fail_for,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl TextGenerator for ScriptedLlm {
    async fn generate(&self, prompt: &str) -> Result<String, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(name) = self.fail_for {
            if prompt.contains(name) {
                return Err(AppError::ExternalApiError("model unavailable".to_string()));
            }
        }
        let language = if prompt.contains("Arabic") { "ar" } else { "en" };
        Ok(format!("  narrative ({})  ", language))
    }
}

fn place(id: &str, name: &str, kind: &str) -> serde_json::Value {
    json!({
        "place_id": id,
        "name": name,
        "vicinity": "Riyadh",
        "geometry": {"location": {"lat": 24.7, "lng": 46.7}},
        "types": [kind, "establishment"],
        "rating": 4.6,
        "user_ratings_total": 85
    })
}

async fn mock_places(places: &MockServer, website: &str) {
    Mock::given(method("GET"))
        .and(path("/nearbysearch/json"))
        .and(query_param("keyword", "bakery"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "OK",
            "results": [place("p1", "Najd Bakery", "bakery"), place("p2", "Broken Cafe", "cafe")]
        })))
        .mount(places)
        .await;

    Mock::given(method("GET"))
        .and(path("/nearbysearch/json"))
        .and(query_param("keyword", "cafe"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "OK",
            "results": [place("p2", "Broken Cafe", "cafe"), place("p3", "Corner Cafe", "cafe")]
        })))
        .mount(places)
        .await;

    Mock::given(method("GET"))
        .and(path("/details/json"))
        .and(query_param("place_id", "p1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "OK",
            "result": {"website": website, "formatted_phone_number": "011 111 1111"}
        })))
        .mount(places)
        .await;

    Mock::given(method("GET"))
        .and(path("/details/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "OK", "result": {}})))
        .mount(places)
        .await;
}

async fn mock_website(site: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            r#"<html><head><title>Najd Bakery</title>
<meta name="description" content="Fresh bread in Riyadh">
<meta name="viewport" content="width=device-width">
<script async src="https://www.googletagmanager.com/gtag/js?id=G-1"></script>
</head><body><main><p>Fresh bread and pastries baked every morning in Riyadh for families.</p>
<a href="/contact">Contact</a></main></body></html>"#,
            "text/html",
        ))
        .mount(site)
        .await;

    Mock::given(method("GET"))
        .and(path("/contact"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            "<html><head><title>Contact</title></head><body><p>Call us on +966 11 111 1111</p></body></html>",
            "text/html",
        ))
        .mount(site)
        .await;
}

fn orchestrator(
    places: &MockServer,
    output: &TempDir,
    llm: Arc<ScriptedLlm>,
    save_intermediate: bool,
) -> PipelineOrchestrator {
    let config = PipelineConfig {
        max_businesses: 10,
        batch_size: 2,
        save_intermediate_results: save_intermediate,
        output_directory: output.path().to_path_buf(),
        ..PipelineConfig::default()
    };
    let places_client =
        GooglePlacesClient::new(places.uri(), "maps-key".to_string(), Duration::from_secs(5))
            .expect("places client should build")
            .with_retry_policy(RetryPolicy::no_retry())
            .with_page_token_delay(Duration::ZERO);
    let fetcher = PageFetcher::new(Duration::from_secs(5), RetryPolicy::no_retry())
        .expect("fetcher should build");

    PipelineOrchestrator::with_components(
        config,
        places_client,
        SiteCrawler::new(fetcher, 5),
        llm,
        "en".to_string(),
    )
    .with_type_pause(Duration::ZERO)
}

fn business_types() -> Vec<String> {
    vec!["bakery".to_string(), "cafe".to_string()]
}

#[tokio::test]
async fn test_pipeline_run_writes_outputs() {
    let places = MockServer::start().await;
    let site = MockServer::start().await;
    mock_places(&places, &site.uri()).await;
    mock_website(&site).await;
    let output = TempDir::new().unwrap();

    let result = orchestrator(&places, &output, ScriptedLlm::new(Some("Broken Cafe")), true)
        .run(&business_types(), Coordinates::default())
        .await
        .unwrap();

    // p2 is returned for both types but only counted once; its scoring fails
    assert_eq!(result.businesses_discovered, 3);
    let names: Vec<&str> = result.analyses.iter().map(|a| a.business.name.as_str()).collect();
    assert_eq!(names, vec!["Najd Bakery", "Corner Cafe"]);

    let najd = &result.analyses[0];
    assert_eq!(najd.industry, "Bakery");
    assert_eq!(najd.feature_vector.total_pages, 2);
    assert_eq!(najd.page_titles, vec!["Najd Bakery", "Contact"]);
    assert!(najd.feature_vector.has_analytics);
    assert!(najd.feature_vector.has_meta_description);
    assert!(najd.feature_vector.has_contact_cta);
    assert_eq!(najd.maturity.highlights_en, "narrative (en)");
    assert_eq!(najd.maturity.highlights_ar, "narrative (ar)");

    let corner = &result.analyses[1];
    assert_eq!(corner.feature_vector.total_pages, 0);
    assert!(corner.page_titles.is_empty());
    assert!(najd.maturity.overall_score > corner.maturity.overall_score);

    assert_eq!(result.summary.total_businesses, 2);
    assert!(result.summary.analysis_completed_at.is_some());

    // analyses.jsonl, summary.json and one file per analysed business
    assert_eq!(result.output_files.len(), 4);
    for file in &result.output_files {
        assert!(file.exists(), "{} should exist", file.display());
        assert!(file.starts_with(output.path()));
    }
    let run_dir = result.output_files[0].parent().unwrap();
    assert!(run_dir.join("businesses/najd-bakery.json").exists());
    assert!(run_dir.join("businesses/corner-cafe.json").exists());

    let summary: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(run_dir.join("summary.json")).unwrap())
            .unwrap();
    assert_eq!(summary["total_businesses"], 2);

    let records = load_analysis_records(&run_dir.join("analyses.jsonl"))
        .await
        .unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].industry, "Bakery");
    assert_eq!(records[1].industry, "Cafe");

    let reloaded = summarise_records(&records);
    assert_eq!(reloaded.total, 2);
    assert_eq!(reloaded.average_score, result.summary.average_maturity_score);
}

#[tokio::test]
async fn test_pipeline_without_intermediate_files() {
    let places = MockServer::start().await;
    let site = MockServer::start().await;
    mock_places(&places, &site.uri()).await;
    mock_website(&site).await;
    let output = TempDir::new().unwrap();

    let result = orchestrator(&places, &output, ScriptedLlm::new(None), false)
        .run(&business_types(), Coordinates::default())
        .await
        .unwrap();

    assert_eq!(result.analyses.len(), 3);
    assert_eq!(result.output_files.len(), 2);
    let run_dir = result.output_files[0].parent().unwrap();
    assert!(!run_dir.join("businesses").exists());
}

#[tokio::test]
async fn test_pipeline_with_no_discoveries_writes_nothing() {
    let places = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/nearbysearch/json"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"status": "ZERO_RESULTS", "results": []})),
        )
        .mount(&places)
        .await;
    let output = TempDir::new().unwrap();
    let llm = ScriptedLlm::new(None);

    let result = orchestrator(&places, &output, llm.clone(), true)
        .run(&business_types(), Coordinates::default())
        .await
        .unwrap();

    assert_eq!(result.businesses_discovered, 0);
    assert!(result.output_files.is_empty());
    assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
    assert_eq!(std::fs::read_dir(output.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_pipeline_skips_failing_business_type() {
    let places = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/nearbysearch/json"))
        .and(query_param("keyword", "bakery"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "OVER_QUERY_LIMIT",
            "results": []
        })))
        .mount(&places)
        .await;
    Mock::given(method("GET"))
        .and(path("/nearbysearch/json"))
        .and(query_param("keyword", "cafe"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "OK",
            "results": [place("p3", "Corner Cafe", "cafe")]
        })))
        .mount(&places)
        .await;
    Mock::given(method("GET"))
        .and(path("/details/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "OK", "result": {}})))
        .mount(&places)
        .await;
    let output = TempDir::new().unwrap();

    let result = orchestrator(&places, &output, ScriptedLlm::new(None), true)
        .run(&business_types(), Coordinates::default())
        .await
        .unwrap();

    assert_eq!(result.businesses_discovered, 1);
    assert_eq!(result.analyses[0].business.name, "Corner Cafe");
}

#[tokio::test]
async fn test_pipeline_respects_per_query_cap() {
    let places = MockServer::start().await;
    let site = MockServer::start().await;
    mock_places(&places, &site.uri()).await;
    mock_website(&site).await;
    let output = TempDir::new().unwrap();

    let config = PipelineConfig {
        max_businesses: 10,
        max_places_per_query: 1,
        save_intermediate_results: false,
        output_directory: output.path().to_path_buf(),
        ..PipelineConfig::default()
    };
    let places_client =
        GooglePlacesClient::new(places.uri(), "maps-key".to_string(), Duration::from_secs(5))
            .unwrap()
            .with_retry_policy(RetryPolicy::no_retry())
            .with_page_token_delay(Duration::ZERO);
    let fetcher = PageFetcher::new(Duration::from_secs(5), RetryPolicy::no_retry()).unwrap();
    let orchestrator = PipelineOrchestrator::with_components(
        config,
        places_client,
        SiteCrawler::new(fetcher, 5),
        ScriptedLlm::new(None),
        "en".to_string(),
    )
    .with_type_pause(Duration::ZERO);

    let result = orchestrator
        .run(&business_types(), Coordinates::default())
        .await
        .unwrap();

    // One place per type: p1 from bakery, p2 from cafe
    assert_eq!(result.businesses_discovered, 2);
    let ids: Vec<&str> = result.analyses.iter().map(|a| a.business.place_id.as_str()).collect();
    assert_eq!(ids, vec!["p1", "p2"]);
}
