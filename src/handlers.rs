use crate::errors::AppError;
use crate::features::build_feature_vector;
use crate::models::{AnalyzedBusiness, BusinessRecord, FeatureVector};
use crate::pipeline::BusinessAnalyzer;
use crate::url_normalizer;
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use moka::future::Cache;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

/// Upper bound for `max_pages` accepted over HTTP.
pub const MAX_PAGES_LIMIT: usize = 20;

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Crawler + scorer used by both endpoints.
    pub analyzer: BusinessAnalyzer,
    /// Feature vectors by `"{normalized url}|{max_pages}"` (1 hour TTL).
    pub features_cache: Cache<String, FeatureVector>,
}

/// API routes subject to rate limiting.
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/v1/features", post(features))
        .route("/api/v1/analyze", post(analyze))
}

/// Full route table without middleware; `/health` stays outside the rate limiter.
pub fn router(state: Arc<AppState>, api: Router<Arc<AppState>>) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(api)
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct FeaturesRequest {
    pub url: String,
    #[serde(default)]
    pub max_pages: Option<usize>,
}

/// Health check endpoint.
///
/// # Returns
///
/// * `(StatusCode, Json<serde_json::Value>)` - HTTP 200 OK with health status JSON.
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "brainsait-discovery",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

/// POST /api/v1/features
///
/// Crawls the site at `url` and returns its feature vector. No LLM call is made.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `payload` - Site URL and optional page bound.
pub async fn features(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<FeaturesRequest>,
) -> Result<Json<FeatureVector>, AppError> {
    let url = url_normalizer::normalize(&payload.url)
        .ok_or_else(|| AppError::BadRequest(format!("Not a crawlable http(s) URL: {}", payload.url)))?;

    let max_pages = payload
        .max_pages
        .unwrap_or_else(|| state.analyzer.crawler().max_pages());
    if max_pages == 0 || max_pages > MAX_PAGES_LIMIT {
        return Err(AppError::BadRequest(format!(
            "max_pages must be between 1 and {}",
            MAX_PAGES_LIMIT
        )));
    }

    let cache_key = format!("{}|{}", url, max_pages);
    if let Some(cached) = state.features_cache.get(&cache_key).await {
        tracing::debug!("Feature cache hit for {}", url);
        return Ok(Json(cached));
    }

    let crawler = state.analyzer.crawler().with_max_pages(max_pages);
    let pages = crawler.crawl(url.as_str()).await;
    tracing::info!("Crawled {} page(s) for {}", pages.len(), url);

    let host = url.as_url().host_str().unwrap_or_default().to_string();
    let business = BusinessRecord::website_only(host, url.as_str());
    let vector = build_feature_vector(&business, &pages);

    state.features_cache.insert(cache_key, vector.clone()).await;
    Ok(Json(vector))
}

/// POST /api/v1/analyze
///
/// Crawls, scores and narrates a single business record.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `business` - The business to analyse.
pub async fn analyze(
    State(state): State<Arc<AppState>>,
    Json(business): Json<BusinessRecord>,
) -> Result<Json<AnalyzedBusiness>, AppError> {
    if business.name.trim().is_empty() {
        return Err(AppError::BadRequest("business name is required".to_string()));
    }

    tracing::info!("Analysing {} on request", business.name);
    let analysis = state.analyzer.analyze(business).await.map_err(|e| {
        tracing::error!("Analysis failed: {}", e);
        e
    })?;

    Ok(Json(analysis))
}
