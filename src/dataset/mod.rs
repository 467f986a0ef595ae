//! Project records the environment runs episodes against.
//!
//! A record describes one benchmark instance: repository URL, base commit,
//! problem statement, an optional hint, and the reference patch the reward
//! engine compares agent diffs against. Records come from a local JSONL
//! file ([`load_records`]) or from the SWE-bench dataset on HuggingFace
//! ([`SweBenchFetcher`]).

mod swe_bench;

pub use swe_bench::SweBenchFetcher;

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::DatasetError;

/// One benchmark instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectRecord {
    /// Clone URL of the repository.
    pub url: String,
    /// Commit the repository is checked out to before the agent acts.
    #[serde(default)]
    pub base_commit: Option<String>,
    /// Task description shown to the agent.
    pub problem_statement: String,
    /// Optional hint text; empty when the dataset provides none.
    #[serde(default)]
    pub hint: String,
    /// Reference patch; empty when the dataset provides none.
    #[serde(default)]
    pub patch: String,
}

impl ProjectRecord {
    /// Project name derived from the URL: last path segment with its
    /// extension stripped (`https://github.com/org/repo.git` -> `repo`).
    pub fn name(&self) -> String {
        let segment = self.url.rsplit('/').next().unwrap_or(&self.url);
        segment.split('.').next().unwrap_or(segment).to_string()
    }

    /// In-sandbox working copy location: `/tmp/<name>`.
    pub fn base_dir(&self) -> String {
        format!("/tmp/{}", self.name())
    }
}

/// Loads project records from a JSONL file, one record per line.
///
/// Blank lines are skipped. Fails on the first malformed record with its
/// 1-based line number.
pub fn load_records(path: impl AsRef<Path>) -> Result<Vec<ProjectRecord>, DatasetError> {
    let text = std::fs::read_to_string(path)?;
    let mut records = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(line).map_err(|source| DatasetError::Json {
            line: idx + 1,
            source,
        })?;
        records.push(record);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn record_for_url(url: &str) -> ProjectRecord {
        ProjectRecord {
            url: url.to_string(),
            base_commit: None,
            problem_statement: String::new(),
            hint: String::new(),
            patch: String::new(),
        }
    }

    #[test]
    fn test_name_strips_git_extension() {
        let record = record_for_url("https://github.com/psf/requests.git");
        assert_eq!(record.name(), "requests");
    }

    #[test]
    fn test_name_without_extension() {
        let record = record_for_url("https://github.com/psf/requests");
        assert_eq!(record.name(), "requests");
    }

    #[test]
    fn test_name_local_path() {
        let record = record_for_url("/srv/mirrors/flask");
        assert_eq!(record.name(), "flask");
    }

    #[test]
    fn test_base_dir() {
        let record = record_for_url("https://github.com/pallets/flask.git");
        assert_eq!(record.base_dir(), "/tmp/flask");
    }

    #[test]
    fn test_deserialization_defaults() {
        let record: ProjectRecord = serde_json::from_str(
            r#"{"url": "https://github.com/a/b.git", "problem_statement": "fix it"}"#,
        )
        .unwrap();
        assert!(record.base_commit.is_none());
        assert!(record.hint.is_empty());
        assert!(record.patch.is_empty());
    }

    #[test]
    fn test_load_records_skips_blank_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"url": "https://github.com/a/b.git", "problem_statement": "one"}}"#
        )
        .unwrap();
        writeln!(file).unwrap();
        writeln!(
            file,
            r#"{{"url": "https://github.com/c/d.git", "problem_statement": "two", "hint": "h"}}"#
        )
        .unwrap();

        let records = load_records(file.path()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name(), "b");
        assert_eq!(records[1].hint, "h");
    }

    #[test]
    fn test_load_records_reports_line_number() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"url": "https://github.com/a/b.git", "problem_statement": "ok"}}"#
        )
        .unwrap();
        writeln!(file, "not json").unwrap();

        let err = load_records(file.path()).unwrap_err();
        assert!(matches!(err, DatasetError::Json { line: 2, .. }));
    }
}
