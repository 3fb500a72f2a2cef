use futures::future::join_all;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;

use crate::config::Config;
use crate::errors::AppError;
use crate::fetcher::FetchError;
use crate::models::{BusinessRecord, Coordinates};
use crate::retry::RetryPolicy;

/// Places returned per details batch.
pub const DETAILS_BATCH_SIZE: usize = 10;

const DETAIL_FIELDS: &str = "formatted_phone_number,international_phone_number,website,url";

/// A `next_page_token` only becomes valid a short while after it is issued.
const DEFAULT_PAGE_TOKEN_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Deserialize)]
struct NearbySearchResponse {
    status: String,
    #[serde(default)]
    results: Vec<PlaceCandidate>,
    #[serde(default)]
    next_page_token: Option<String>,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlaceCandidate {
    place_id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    vicinity: Option<String>,
    #[serde(default)]
    formatted_address: Option<String>,
    #[serde(default)]
    geometry: Option<Geometry>,
    #[serde(default)]
    types: Vec<String>,
    #[serde(default)]
    rating: Option<f64>,
    #[serde(default)]
    user_ratings_total: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    location: Coordinates,
}

#[derive(Debug, Deserialize)]
struct DetailsResponse {
    status: String,
    #[serde(default)]
    result: Option<PlaceDetails>,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PlaceDetails {
    formatted_phone_number: Option<String>,
    international_phone_number: Option<String>,
    website: Option<String>,
    url: Option<String>,
}

impl PlaceCandidate {
    fn into_record(self) -> BusinessRecord {
        let address = self
            .vicinity
            .filter(|v| !v.is_empty())
            .or(self.formatted_address)
            .unwrap_or_default();
        let google_maps_url = format!("https://maps.google.com/?cid={}", self.place_id);

        BusinessRecord {
            place_id: self.place_id,
            name: self.name,
            address,
            location: self.geometry.map(|g| g.location).unwrap_or_default(),
            types: self.types,
            rating: self.rating,
            user_ratings_total: self.user_ratings_total,
            website: None,
            phone_number: None,
            google_maps_url,
        }
    }
}

fn check_status(status: &str, error_message: Option<&str>) -> Result<(), AppError> {
    match status {
        "OK" | "ZERO_RESULTS" => Ok(()),
        other => Err(AppError::ExternalApiError(format!(
            "Places API returned {}: {}",
            other,
            error_message.unwrap_or("no error message")
        ))),
    }
}

/// Google Places (Nearby Search + Place Details) client.
#[derive(Clone)]
pub struct GooglePlacesClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    retry: RetryPolicy,
    page_token_delay: Duration,
}

impl GooglePlacesClient {
    /// Creates a new `GooglePlacesClient`.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Places API root, e.g. `https://maps.googleapis.com/maps/api/place`.
    /// * `api_key` - Maps API key.
    /// * `timeout` - Per-request timeout.
    pub fn new(base_url: String, api_key: String, timeout: Duration) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                AppError::ExternalApiError(format!("Failed to create Places client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            retry: RetryPolicy::default(),
            page_token_delay: DEFAULT_PAGE_TOKEN_DELAY,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        Self::new(
            config.places_base_url.clone(),
            config.google_maps_api_key.clone(),
            Duration::from_secs(config.request_timeout_seconds),
        )
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_page_token_delay(mut self, delay: Duration) -> Self {
        self.page_token_delay = delay;
        self
    }

    /// Discovers businesses around `location` matching `keyword`.
    ///
    /// Pages through Nearby Search until the results run out or `max_results`
    /// distinct places are collected, then optionally backfills contact details.
    pub async fn discover(
        &self,
        keyword: &str,
        location: Coordinates,
        radius_meters: u32,
        language: &str,
        max_results: usize,
        fetch_details: bool,
    ) -> Result<Vec<BusinessRecord>, AppError> {
        tracing::info!(
            "Searching Places for '{}' within {}m of {}",
            keyword,
            radius_meters,
            location
        );

        let mut records: Vec<BusinessRecord> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut page_token: Option<String> = None;

        loop {
            let page = self
                .nearby_search(keyword, location, radius_meters, language, page_token.as_deref())
                .await?;

            for candidate in page.results {
                if seen.insert(candidate.place_id.clone()) {
                    records.push(candidate.into_record());
                }
            }

            page_token = page.next_page_token.filter(|t| !t.is_empty());
            if page_token.is_none() || records.len() >= max_results {
                break;
            }
            tokio::time::sleep(self.page_token_delay).await;
        }

        records.truncate(max_results);

        if fetch_details {
            self.enrich_with_details(&mut records).await;
        }

        tracing::info!("Places search for '{}' returned {} businesses", keyword, records.len());
        Ok(records)
    }

    async fn nearby_search(
        &self,
        keyword: &str,
        location: Coordinates,
        radius_meters: u32,
        language: &str,
        page_token: Option<&str>,
    ) -> Result<NearbySearchResponse, AppError> {
        let location = location.to_string();
        let radius = radius_meters.to_string();
        let mut params: Vec<(&str, &str)> = vec![
            ("keyword", keyword),
            ("location", location.as_str()),
            ("radius", radius.as_str()),
            ("language", language),
            ("key", self.api_key.as_str()),
        ];
        if let Some(token) = page_token {
            params.push(("pagetoken", token));
        }

        let response: NearbySearchResponse = self.get_json("nearbysearch", &params).await?;
        check_status(&response.status, response.error_message.as_deref())?;
        Ok(response)
    }

    /// Backfills phone, website and canonical map URL, ten places at a time.
    async fn enrich_with_details(&self, records: &mut [BusinessRecord]) {
        for batch in records.chunks_mut(DETAILS_BATCH_SIZE) {
            let details = join_all(batch.iter().map(|r| self.place_details(&r.place_id))).await;

            for (record, detail) in batch.iter_mut().zip(details) {
                match detail {
                    Ok(detail) => apply_details(record, detail),
                    Err(e) => {
                        tracing::warn!("Places detail fetch failed for {}: {}", record.place_id, e);
                    }
                }
            }
        }
    }

    async fn place_details(&self, place_id: &str) -> Result<PlaceDetails, AppError> {
        let params = [
            ("place_id", place_id),
            ("fields", DETAIL_FIELDS),
            ("key", self.api_key.as_str()),
        ];
        let response: DetailsResponse = self.get_json("details", &params).await?;
        check_status(&response.status, response.error_message.as_deref())?;
        Ok(response.result.unwrap_or_default())
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<T, AppError> {
        let url = reqwest::Url::parse_with_params(
            &format!("{}/{}/json", self.base_url, endpoint),
            params,
        )
        .map_err(|e| AppError::ExternalApiError(format!("Failed to build URL: {}", e)))?;

        tracing::debug!("Places API request: {}/{}/json", self.base_url, endpoint);

        let body = self
            .retry
            .run(|| self.get_text(url.clone()), FetchError::is_transient)
            .await
            .map_err(|e| AppError::ExternalApiError(format!("Places API request failed: {}", e)))?;

        serde_json::from_str(&body).map_err(|e| {
            AppError::ExternalApiError(format!("Failed to parse Places API response: {}", e))
        })
    }

    async fn get_text(&self, url: reqwest::Url) -> Result<String, FetchError> {
        // Path only: the query string carries the API key
        let path = url.path().to_string();
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Http {
                status: status.as_u16(),
                url: path,
            });
        }
        Ok(response.text().await?)
    }
}

fn apply_details(record: &mut BusinessRecord, detail: PlaceDetails) {
    if let Some(phone) = detail
        .formatted_phone_number
        .or(detail.international_phone_number)
    {
        record.phone_number = Some(phone);
    }
    if let Some(website) = detail.website {
        record.website = Some(website);
    }
    if let Some(url) = detail.url {
        record.google_maps_url = url;
    }
}
