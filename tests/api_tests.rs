/// HTTP API tests driven through the router with `tower::ServiceExt::oneshot`
use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use brainsait_discovery::crawler::SiteCrawler;
use brainsait_discovery::errors::AppError;
use brainsait_discovery::fetcher::PageFetcher;
use brainsait_discovery::handlers::{self, AppState};
use brainsait_discovery::llm::TextGenerator;
use brainsait_discovery::pipeline::BusinessAnalyzer;
use brainsait_discovery::retry::RetryPolicy;
use brainsait_discovery::scoring::MaturityScorer;
use moka::future::Cache;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct EchoLlm {
    healthy: bool,
}

#[async_trait]
impl TextGenerator for EchoLlm {
    async fn generate(&self, _prompt: &str) -> Result<String, AppError> {
        if self.healthy {
            Ok("Solid foundations.".to_string())
        } else {
            Err(AppError::ExternalApiError("LLM returned status 503".to_string()))
        }
    }
}

fn app(healthy_llm: bool) -> Router {
    let fetcher = PageFetcher::new(Duration::from_secs(5), RetryPolicy::no_retry())
        .expect("fetcher should build");
    let llm: Arc<dyn TextGenerator> = Arc::new(EchoLlm {
        healthy: healthy_llm,
    });
    let state = Arc::new(AppState {
        analyzer: BusinessAnalyzer::new(SiteCrawler::new(fetcher, 5), MaturityScorer::new(llm), true),
        features_cache: Cache::builder().max_capacity(100).build(),
    });
    handlers::router(state, handlers::api_routes())
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn mock_site() -> MockServer {
    let site = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            r#"<html><head><title>Clinic</title><meta property="og:title" content="Clinic"></head>
<body><p>Book an appointment with our dentists today.</p><a href="/book">Book now</a></body></html>"#,
            "text/html",
        ))
        .expect(1)
        .mount(&site)
        .await;
    site
}

#[tokio::test]
async fn test_health() {
    let response = app(true)
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "brainsait-discovery");
}

#[tokio::test]
async fn test_features_endpoint_crawls_and_caches() {
    let site = mock_site().await;
    let app = app(true);
    let request = || post_json("/api/v1/features", json!({"url": site.uri(), "max_pages": 1}));

    let response = app.clone().oneshot(request()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["total_pages"], 1);
    assert_eq!(body["has_open_graph"], true);
    assert_eq!(body["has_contact_cta"], true);

    // Served from cache: the page mock expects exactly one hit
    let again = app.oneshot(request()).await.unwrap();
    assert_eq!(again.status(), StatusCode::OK);
    assert_eq!(body_json(again).await, body);
}

#[tokio::test]
async fn test_features_rejects_bad_input() {
    let response = app(true)
        .oneshot(post_json("/api/v1/features", json!({"url": "ftp://example.com"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app(true)
        .oneshot(post_json(
            "/api/v1/features",
            json!({"url": "https://example.com", "max_pages": 500}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_analyze_endpoint() {
    let response = app(true)
        .oneshot(post_json(
            "/api/v1/analyze",
            json!({
                "place_id": "p9",
                "name": "Riyadh Smiles",
                "types": ["dentist", "health"],
                "rating": 4.9,
                "user_ratings_total": 310
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["industry"], "Dentist");
    assert_eq!(body["feature_vector"]["total_pages"], 0);
    assert_eq!(body["digital_maturity"]["highlights_ar"], "Solid foundations.");
    let overall = body["digital_maturity"]["overall_score"].as_f64().unwrap();
    assert!((0.0..=100.0).contains(&overall));
}

#[tokio::test]
async fn test_analyze_requires_name() {
    let response = app(true)
        .oneshot(post_json("/api/v1/analyze", json!({"place_id": "p1", "name": "  "})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_analyze_llm_failure_is_bad_gateway() {
    let response = app(false)
        .oneshot(post_json("/api/v1/analyze", json!({"place_id": "p1", "name": "Cafe"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}
