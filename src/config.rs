use serde::Deserialize;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub google_maps_api_key: String,
    pub openai_api_key: String,
    pub openai_model: String,
    pub openai_base_url: String,
    pub places_base_url: String,
    pub default_locale: String,
    pub data_directory: PathBuf,
    pub max_places_per_query: usize,
    pub request_timeout_seconds: u64,
    pub places_radius_meters: u32,
    pub llm_temperature: f32,
    pub llm_max_output_tokens: u32,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> anyhow::Result<String> {
            let value = lookup(key)
                .ok_or_else(|| anyhow::anyhow!("{} environment variable required", key))?;
            if value.trim().is_empty() {
                anyhow::bail!("{} cannot be empty", key);
            }
            Ok(value)
        };
        let or_default = |key: &str, default: &str| -> String {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        let http_url = |key: &str, default: &str| -> anyhow::Result<String> {
            let url = or_default(key, default);
            if !url.starts_with("http://") && !url.starts_with("https://") {
                anyhow::bail!("{} must start with http:// or https://", key);
            }
            Ok(url.trim_end_matches('/').to_string())
        };

        let config = Self {
            google_maps_api_key: required("GOOGLE_MAPS_API_KEY")?,
            openai_api_key: required("OPENAI_API_KEY")?,
            openai_model: or_default("OPENAI_MODEL", "gpt-5-codex"),
            openai_base_url: http_url("OPENAI_BASE_URL", "https://api.openai.com/v1")?,
            places_base_url: http_url(
                "PLACES_BASE_URL",
                "https://maps.googleapis.com/maps/api/place",
            )?,
            default_locale: or_default("DEFAULT_LOCALE", "ar-SA"),
            data_directory: PathBuf::from(or_default("DATA_DIR", "data")),
            max_places_per_query: parse_bounded(
                "MAX_PLACES_PER_QUERY",
                &or_default("MAX_PLACES_PER_QUERY", "60"),
                1,
                60,
            )?,
            request_timeout_seconds: parse_bounded(
                "REQUEST_TIMEOUT_SECONDS",
                &or_default("REQUEST_TIMEOUT_SECONDS", "20"),
                5,
                120,
            )?,
            places_radius_meters: parse_bounded(
                "PLACES_RADIUS_METERS",
                &or_default("PLACES_RADIUS_METERS", "25000"),
                1000,
                50_000,
            )?,
            llm_temperature: parse_bounded(
                "LLM_TEMPERATURE",
                &or_default("LLM_TEMPERATURE", "0.3"),
                0.0,
                1.0,
            )?,
            llm_max_output_tokens: parse_bounded(
                "LLM_MAX_OUTPUT_TOKENS",
                &or_default("LLM_MAX_OUTPUT_TOKENS", "1000"),
                1,
                u32::MAX,
            )?,
            port: or_default("PORT", "3000")
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
        };

        // Never log the API keys themselves
        tracing::debug!("OpenAI model: {}", config.openai_model);
        tracing::debug!("Places base URL: {}", config.places_base_url);
        tracing::debug!("Default locale: {}", config.default_locale);
        tracing::debug!("Data directory: {}", config.data_directory.display());

        Ok(config)
    }

    /// Settings as display rows, with API keys masked.
    pub fn describe(&self) -> Vec<(&'static str, String)> {
        vec![
            ("GOOGLE_MAPS_API_KEY", mask_secret(&self.google_maps_api_key)),
            ("OPENAI_API_KEY", mask_secret(&self.openai_api_key)),
            ("OPENAI_MODEL", self.openai_model.clone()),
            ("OPENAI_BASE_URL", self.openai_base_url.clone()),
            ("PLACES_BASE_URL", self.places_base_url.clone()),
            ("DEFAULT_LOCALE", self.default_locale.clone()),
            ("DATA_DIR", self.data_directory.display().to_string()),
            ("MAX_PLACES_PER_QUERY", self.max_places_per_query.to_string()),
            ("REQUEST_TIMEOUT_SECONDS", self.request_timeout_seconds.to_string()),
            ("PLACES_RADIUS_METERS", self.places_radius_meters.to_string()),
            ("LLM_TEMPERATURE", self.llm_temperature.to_string()),
            ("LLM_MAX_OUTPUT_TOKENS", self.llm_max_output_tokens.to_string()),
            ("PORT", self.port.to_string()),
        ]
    }

    /// Two-letter language used for Places queries (`ar-SA` -> `ar`).
    pub fn places_language(&self) -> &str {
        self.default_locale
            .split('-')
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or("en")
    }
}

/// Keeps the last four characters of a secret; short secrets are fully hidden.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len().max(4));
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{}", "*".repeat(chars.len() - 4), tail)
}

fn parse_bounded<T>(key: &str, raw: &str, min: T, max: T) -> anyhow::Result<T>
where
    T: FromStr + PartialOrd + std::fmt::Display + Copy,
{
    let value: T = raw
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("{} must be a number, got '{}'", key, raw))?;
    if value < min || value > max {
        anyhow::bail!("{} must be between {} and {}, got {}", key, min, max, value);
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_applied() {
        let config = Config::from_lookup(lookup(&[
            ("GOOGLE_MAPS_API_KEY", "maps"),
            ("OPENAI_API_KEY", "llm"),
        ]))
        .unwrap();

        assert_eq!(config.openai_model, "gpt-5-codex");
        assert_eq!(config.default_locale, "ar-SA");
        assert_eq!(config.places_language(), "ar");
        assert_eq!(config.max_places_per_query, 60);
        assert_eq!(config.request_timeout_seconds, 20);
        assert_eq!(config.places_radius_meters, 25_000);
        assert_eq!(config.port, 3000);
    }

    #[test]
    fn test_describe_masks_keys() {
        let config = Config::from_lookup(lookup(&[
            ("GOOGLE_MAPS_API_KEY", "AIzaSyExampleKey1234"),
            ("OPENAI_API_KEY", "sk-short"),
            ("DATA_DIR", "/var/lib/brainsait"),
        ]))
        .unwrap();

        let rows = config.describe();
        let get = |key: &str| rows.iter().find(|(k, _)| *k == key).map(|(_, v)| v.clone());

        assert_eq!(get("GOOGLE_MAPS_API_KEY").as_deref(), Some("****************1234"));
        assert_eq!(get("OPENAI_API_KEY").as_deref(), Some("********"));
        assert_eq!(get("DATA_DIR").as_deref(), Some("/var/lib/brainsait"));
        assert_eq!(get("PLACES_RADIUS_METERS").as_deref(), Some("25000"));
        assert!(rows.iter().all(|(_, v)| !v.contains("ExampleKey")));
    }

    #[test]
    fn test_missing_key_is_error() {
        let err = Config::from_lookup(lookup(&[("OPENAI_API_KEY", "llm")])).unwrap_err();
        assert!(err.to_string().contains("GOOGLE_MAPS_API_KEY"));
    }

    #[test]
    fn test_out_of_range_timeout_rejected() {
        let err = Config::from_lookup(lookup(&[
            ("GOOGLE_MAPS_API_KEY", "maps"),
            ("OPENAI_API_KEY", "llm"),
            ("REQUEST_TIMEOUT_SECONDS", "500"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("between 5 and 120"));
    }

    #[test]
    fn test_base_url_must_be_http() {
        let err = Config::from_lookup(lookup(&[
            ("GOOGLE_MAPS_API_KEY", "maps"),
            ("OPENAI_API_KEY", "llm"),
            ("OPENAI_BASE_URL", "ftp://llm.internal"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("OPENAI_BASE_URL"));
    }
}
