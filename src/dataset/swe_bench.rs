//! SWE-bench record fetcher.
//!
//! Pulls rows from the HuggingFace datasets-server API and converts them
//! into [`ProjectRecord`]s. Each SWE-bench row carries a repository slug,
//! base commit, problem statement, hint text, and a gold patch; the clone
//! URL is derived as `https://github.com/<repo>.git`.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::ProjectRecord;
use crate::error::DatasetError;

/// Default dataset name on HuggingFace.
const DEFAULT_DATASET: &str = "princeton-nlp/SWE-bench_Lite";

/// Default split to fetch from the dataset.
const DEFAULT_SPLIT: &str = "test";

/// Base URL for the HuggingFace datasets-server rows API.
const HUGGINGFACE_ROWS_API: &str = "https://datasets-server.huggingface.co/rows";

/// Maximum rows per request accepted by the rows API.
const MAX_PAGE_SIZE: usize = 100;

/// Fetches SWE-bench style rows and maps them into project records.
pub struct SweBenchFetcher {
    http_client: Client,
    dataset_name: String,
    split: String,
}

/// Top-level response of the rows API.
#[derive(Debug, Deserialize)]
struct RowsResponse {
    rows: Vec<RowEntry>,
}

#[derive(Debug, Deserialize)]
struct RowEntry {
    row: SweBenchRow,
}

/// The subset of SWE-bench columns the environment consumes.
#[derive(Debug, Deserialize)]
struct SweBenchRow {
    repo: String,
    #[serde(default)]
    base_commit: Option<String>,
    #[serde(default)]
    problem_statement: String,
    #[serde(default)]
    hints_text: String,
    #[serde(default)]
    patch: String,
}

impl SweBenchFetcher {
    /// Creates a fetcher for SWE-bench_Lite, "test" split.
    pub fn new() -> Self {
        Self::with_dataset(DEFAULT_DATASET, DEFAULT_SPLIT)
    }

    /// Creates a fetcher for a specific dataset and split.
    pub fn with_dataset(dataset_name: impl Into<String>, split: impl Into<String>) -> Self {
        Self {
            http_client: Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .expect("Failed to build HTTP client"),
            dataset_name: dataset_name.into(),
            split: split.into(),
        }
    }

    /// Current dataset name.
    pub fn dataset_name(&self) -> &str {
        &self.dataset_name
    }

    /// Current split.
    pub fn split(&self) -> &str {
        &self.split
    }

    /// Fetches up to `limit` records starting at `offset`, paginating as
    /// needed. Returns fewer records when the split is exhausted.
    pub async fn fetch(&self, limit: usize, offset: usize) -> Result<Vec<ProjectRecord>, DatasetError> {
        let mut records = Vec::with_capacity(limit);
        let mut cursor = offset;

        while records.len() < limit {
            let page_size = (limit - records.len()).min(MAX_PAGE_SIZE);
            let page = self.fetch_page(cursor, page_size).await?;
            if page.is_empty() {
                break;
            }
            cursor += page.len();
            records.extend(page);
        }

        debug!(
            dataset = %self.dataset_name,
            split = %self.split,
            count = records.len(),
            "Fetched SWE-bench records"
        );
        Ok(records)
    }

    async fn fetch_page(&self, offset: usize, length: usize) -> Result<Vec<ProjectRecord>, DatasetError> {
        let response = self
            .http_client
            .get(HUGGINGFACE_ROWS_API)
            .query(&[
                ("dataset", self.dataset_name.as_str()),
                ("config", "default"),
                ("split", self.split.as_str()),
                ("offset", &offset.to_string()),
                ("length", &length.to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(DatasetError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: RowsResponse = response
            .json()
            .await
            .map_err(|e| DatasetError::Parse(e.to_string()))?;

        Ok(body.rows.into_iter().map(|e| record_from_row(e.row)).collect())
    }
}

impl Default for SweBenchFetcher {
    fn default() -> Self {
        Self::new()
    }
}

fn record_from_row(row: SweBenchRow) -> ProjectRecord {
    ProjectRecord {
        url: format!("https://github.com/{}.git", row.repo),
        base_commit: row.base_commit.filter(|c| !c.is_empty()),
        problem_statement: row.problem_statement,
        hint: row.hints_text,
        patch: row.patch,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetcher_defaults() {
        let fetcher = SweBenchFetcher::new();
        assert_eq!(fetcher.dataset_name(), "princeton-nlp/SWE-bench_Lite");
        assert_eq!(fetcher.split(), "test");
    }

    #[test]
    fn test_record_from_row() {
        let row = SweBenchRow {
            repo: "psf/requests".to_string(),
            base_commit: Some("abc123".to_string()),
            problem_statement: "fix the bug".to_string(),
            hints_text: "look at sessions.py".to_string(),
            patch: "--- a/x\n+++ b/x\n".to_string(),
        };
        let record = record_from_row(row);
        assert_eq!(record.url, "https://github.com/psf/requests.git");
        assert_eq!(record.name(), "requests");
        assert_eq!(record.base_commit.as_deref(), Some("abc123"));
        assert_eq!(record.hint, "look at sessions.py");
    }

    #[test]
    fn test_record_from_row_empty_commit_dropped() {
        let row = SweBenchRow {
            repo: "a/b".to_string(),
            base_commit: Some(String::new()),
            problem_statement: String::new(),
            hints_text: String::new(),
            patch: String::new(),
        };
        let record = record_from_row(row);
        assert!(record.base_commit.is_none());
    }

    #[test]
    fn test_rows_response_deserialization() {
        let json = r#"{"rows": [{"row": {"repo": "a/b", "base_commit": "c1",
            "problem_statement": "p", "hints_text": "", "patch": ""}}]}"#;
        let parsed: RowsResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.rows.len(), 1);
        assert_eq!(parsed.rows[0].row.repo, "a/b");
    }
}
