//! Typed loading of persisted analysis records (`analyses.jsonl` and JSON exports).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::errors::{AppError, ResultExt};
use crate::models::{industry_histogram, IndustryCount, SubScores};

/// A persisted record failed to decode or validate.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordDecodeError {
    /// 1-based line of the offending input, when known.
    pub line: Option<usize>,
    pub message: String,
}

impl RecordDecodeError {
    fn new(line: Option<usize>, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

impl fmt::Display for RecordDecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "line {}: {}", line, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for RecordDecodeError {}

impl From<RecordDecodeError> for AppError {
    fn from(err: RecordDecodeError) -> Self {
        AppError::BadRequest(format!("Invalid analysis record: {}", err))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordBusiness {
    #[serde(default)]
    pub place_id: String,
    pub name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub types: Vec<String>,
    #[serde(default)]
    pub website: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMaturity {
    #[serde(default)]
    pub overall_score: Option<f64>,
    #[serde(default)]
    pub subscores: Option<SubScores>,
}

/// Wire shape; `industry` may be missing, null or blank.
#[derive(Debug, Deserialize)]
struct RawRecord {
    business: RecordBusiness,
    #[serde(default)]
    industry: Option<String>,
    #[serde(default)]
    digital_maturity: Option<RecordMaturity>,
}

/// Wrapper exports: `{"analyses": [...]}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum JsonDocument {
    List(Vec<RawRecord>),
    Wrapped { analyses: Vec<RawRecord> },
}

/// A validated analysis record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisRecord {
    pub business: RecordBusiness,
    /// Defaults to `General` when absent or blank.
    pub industry: String,
    pub digital_maturity: Option<RecordMaturity>,
}

impl AnalysisRecord {
    pub fn overall_score(&self) -> Option<f64> {
        self.digital_maturity.as_ref().and_then(|m| m.overall_score)
    }
}

impl RawRecord {
    fn validate(self) -> Result<AnalysisRecord, String> {
        if self.business.name.trim().is_empty() {
            return Err("business.name must not be empty".to_string());
        }
        if let Some(score) = self.digital_maturity.as_ref().and_then(|m| m.overall_score) {
            if !(0.0..=100.0).contains(&score) {
                return Err(format!(
                    "digital_maturity.overall_score {} is outside [0, 100]",
                    score
                ));
            }
        }

        let industry = self
            .industry
            .map(|i| i.trim().to_string())
            .filter(|i| !i.is_empty())
            .unwrap_or_else(|| "General".to_string());

        Ok(AnalysisRecord {
            business: self.business,
            industry,
            digital_maturity: self.digital_maturity,
        })
    }
}

/// Parses newline-delimited records; blank lines are skipped.
pub fn parse_jsonl(content: &str) -> Result<Vec<AnalysisRecord>, RecordDecodeError> {
    let mut records = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        let line_no = idx + 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let raw: RawRecord = serde_json::from_str(line)
            .map_err(|e| RecordDecodeError::new(Some(line_no), e.to_string()))?;
        let record = raw
            .validate()
            .map_err(|msg| RecordDecodeError::new(Some(line_no), msg))?;
        records.push(record);
    }
    Ok(records)
}

/// Parses a JSON array of records, or an object with an `analyses` array.
pub fn parse_json(content: &str) -> Result<Vec<AnalysisRecord>, RecordDecodeError> {
    // Decode to a Value first so syntax errors keep their line number
    let value: serde_json::Value = serde_json::from_str(content)
        .map_err(|e| RecordDecodeError::new(Some(e.line()), e.to_string()))?;

    let raw = match serde_json::from_value::<JsonDocument>(value) {
        Ok(JsonDocument::List(raw)) | Ok(JsonDocument::Wrapped { analyses: raw }) => raw,
        Err(_) => {
            return Err(RecordDecodeError::new(
                None,
                "expected an array of analysis records or an object with an \"analyses\" array, \
                 each with a business.name",
            ))
        }
    };

    raw.into_iter()
        .enumerate()
        .map(|(idx, r)| {
            r.validate()
                .map_err(|msg| RecordDecodeError::new(None, format!("record {}: {}", idx + 1, msg)))
        })
        .collect()
}

/// Loads records from `path`; `.jsonl` files are read line by line, anything else as JSON.
pub async fn load_analysis_records(path: &Path) -> Result<Vec<AnalysisRecord>, AppError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let is_jsonl = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("jsonl"));

    let records = if is_jsonl {
        parse_jsonl(&content)?
    } else {
        parse_json(&content)?
    };
    tracing::info!("Loaded {} analysis records from {}", records.len(), path.display());
    Ok(records)
}

/// Aggregate over loaded records.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordSummary {
    pub total: usize,
    /// Mean overall score (2dp); records without a score count as 0.
    pub average_score: f64,
    pub industries: Vec<IndustryCount>,
}

pub fn summarise_records(records: &[AnalysisRecord]) -> RecordSummary {
    if records.is_empty() {
        return RecordSummary {
            total: 0,
            average_score: 0.0,
            industries: Vec::new(),
        };
    }

    let sum: f64 = records.iter().map(|r| r.overall_score().unwrap_or(0.0)).sum();
    let average = sum / records.len() as f64;

    RecordSummary {
        total: records.len(),
        average_score: (average * 100.0).round() / 100.0,
        industries: industry_histogram(records.iter().map(|r| r.industry.as_str())),
    }
}
