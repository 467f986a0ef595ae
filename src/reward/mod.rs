//! Reward computation for episode steps.
//!
//! The default strategy scores how close the agent is to the reference
//! fix along two axes: navigation proximity to the files the reference
//! patch touches, and textual similarity of the accumulated diff to the
//! reference patch itself.

mod similarity;

pub use similarity::sequence_ratio;

use std::sync::OnceLock;

use regex::Regex;

use crate::dataset::ProjectRecord;

/// Weight applied to the similarity term; dominates once a plausible
/// diff exists.
const SIMILARITY_WEIGHT: f64 = 30.0;

/// Numerator of the per-file proximity term `scale / (1 + steps)`.
const PROXIMITY_SCALE: f64 = 3.0;

/// A pluggable scoring strategy.
///
/// Implementations must be pure: the same five inputs always yield the
/// same score.
pub trait RewardStrategy: Send {
    /// Scores one step from the command issued, its output, the shell's
    /// working directory afterwards, the accumulated diff, and the
    /// project record.
    fn score(
        &self,
        command: &str,
        output: &str,
        location: &str,
        diff: &str,
        project: &ProjectRecord,
    ) -> f64;
}

/// Default strategy: file proximity plus weighted diff similarity.
#[derive(Debug, Clone, Copy, Default)]
pub struct DistanceToPatch;

impl DistanceToPatch {
    /// Creates the default strategy.
    pub fn new() -> Self {
        Self
    }
}

impl RewardStrategy for DistanceToPatch {
    fn score(
        &self,
        _command: &str,
        _output: &str,
        location: &str,
        diff: &str,
        project: &ProjectRecord,
    ) -> f64 {
        if project.patch.is_empty() {
            return 0.0;
        }
        let files = patch_files(&project.patch);
        if files.is_empty() {
            return 0.0;
        }

        let base_dir = project.base_dir();
        let mut proximity = 0.0;
        for file in &files {
            let full_path = format!("{}/{}", base_dir, file);
            let steps = steps_between(location, &full_path);
            proximity += PROXIMITY_SCALE / (1.0 + steps as f64);
        }

        let similarity = if diff.is_empty() {
            0.0
        } else {
            sequence_ratio(&normalize_lines(diff), &normalize_lines(&project.patch))
        };

        proximity + similarity * SIMILARITY_WEIGHT
    }
}

/// Paths touched by a patch, from its `+++ ` / `--- ` header lines.
///
/// The leading `a/` or `b/` prefix is stripped; `/dev/null` and empty
/// paths are skipped; duplicates are dropped keeping first occurrence.
fn patch_files(patch: &str) -> Vec<String> {
    static PREFIX: OnceLock<Regex> = OnceLock::new();
    let prefix = PREFIX.get_or_init(|| Regex::new(r"^[ab]/").expect("hard-coded regex compiles"));

    let mut files = Vec::new();
    for line in patch.lines() {
        if !line.starts_with("+++ ") && !line.starts_with("--- ") {
            continue;
        }
        let path = line[4..].trim();
        if path == "/dev/null" || path.is_empty() {
            continue;
        }
        let path = prefix.replace(path, "").into_owned();
        if !files.contains(&path) {
            files.push(path);
        }
    }
    files
}

/// Number of path components separating `current` from `target`,
/// computed lexically: strip the common prefix, then count the remaining
/// components on both sides (excluding empty and `.` components).
fn steps_between(current: &str, target: &str) -> usize {
    let cur = components(current);
    let tgt = components(target);
    let common = cur
        .iter()
        .zip(tgt.iter())
        .take_while(|(a, b)| a == b)
        .count();
    (cur.len() - common) + (tgt.len() - common)
}

fn components(path: &str) -> Vec<&str> {
    path.split('/')
        .filter(|c| !c.is_empty() && *c != ".")
        .collect()
}

/// Normalizes diff text for comparison: per line, drop everything after a
/// `#` comment marker, trim surrounding whitespace, and keep only
/// non-blank results as an ordered sequence.
fn normalize_lines(text: &str) -> Vec<String> {
    static COMMENT: OnceLock<Regex> = OnceLock::new();
    let comment = COMMENT.get_or_init(|| Regex::new(r"#.*").expect("hard-coded regex compiles"));

    text.trim()
        .lines()
        .filter_map(|line| {
            let stripped = comment.replace(line, "");
            let trimmed = stripped.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        })
        .collect()
}
