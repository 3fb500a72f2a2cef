use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::errors::{AppError, ResultExt};

/// Run directory name format, e.g. `20250101T093000Z`.
pub const RUN_ID_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// Filesystem-safe slug: lowercase ASCII alphanumerics joined by single dashes.
pub fn slugify(value: &str) -> String {
    let lowered = value.trim().to_lowercase();
    let slug = lowered
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    if slug.is_empty() {
        "business".to_string()
    } else {
        slug
    }
}

/// Output artifacts rooted at one directory.
#[derive(Debug, Clone)]
pub struct DataStore {
    root: PathBuf,
}

impl DataStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates (if needed) and returns `<root>/<timestamp>`.
    pub async fn create_run_directory(&self, timestamp: DateTime<Utc>) -> Result<PathBuf, AppError> {
        let run_dir = self.root.join(timestamp.format(RUN_ID_FORMAT).to_string());
        ensure_directory(&run_dir).await?;
        Ok(run_dir)
    }

    /// Writes `data` as pretty-printed JSON.
    pub async fn write_json<T: Serialize + ?Sized>(
        &self,
        data: &T,
        path: &Path,
    ) -> Result<PathBuf, AppError> {
        let body = serde_json::to_string_pretty(data)?;
        write_file(path, body).await
    }

    /// Writes one compact JSON document per line.
    pub async fn write_jsonl<T: Serialize>(
        &self,
        records: &[T],
        path: &Path,
    ) -> Result<PathBuf, AppError> {
        let mut body = String::new();
        for record in records {
            body.push_str(&serde_json::to_string(record)?);
            body.push('\n');
        }
        write_file(path, body).await
    }
}

async fn ensure_directory(path: &Path) -> Result<(), AppError> {
    tokio::fs::create_dir_all(path)
        .await
        .with_context(|| format!("Failed to create directory {}", path.display()))
}

async fn write_file(path: &Path, body: String) -> Result<PathBuf, AppError> {
    if let Some(parent) = path.parent() {
        ensure_directory(parent).await?;
    }
    tokio::fs::write(path, body)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    tracing::debug!("Wrote {}", path.display());
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("  Najd Bakery & Café "), "najd-bakery-caf");
        assert_eq!(slugify("Dr. Sara's Clinic -- Olaya"), "dr-sara-s-clinic-olaya");
        assert_eq!(slugify("مخبز نجد"), "business");
    }

    #[tokio::test]
    async fn test_run_directory_and_writers() {
        let tmp = tempfile::tempdir().unwrap();
        let store = DataStore::new(tmp.path().join("results"));

        let ts = Utc.with_ymd_and_hms(2025, 3, 1, 9, 30, 5).unwrap();
        let run_dir = store.create_run_directory(ts).await.unwrap();
        assert!(run_dir.ends_with("20250301T093005Z"));
        assert!(run_dir.is_dir());

        let jsonl = run_dir.join("analyses.jsonl");
        store
            .write_jsonl(&[json!({"name": "مخبز"}), json!({"name": "b"})], &jsonl)
            .await
            .unwrap();
        let content = std::fs::read_to_string(&jsonl).unwrap();
        assert_eq!(content, "{\"name\":\"مخبز\"}\n{\"name\":\"b\"}\n");

        let nested = run_dir.join("businesses").join("a.json");
        store.write_json(&json!({"a": 1}), &nested).await.unwrap();
        assert_eq!(std::fs::read_to_string(&nested).unwrap(), "{\n  \"a\": 1\n}");
    }
}
