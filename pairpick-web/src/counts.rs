//! Annotation count index
//!
//! Maps example id to the number of judgments collected for it. Only
//! judgments carrying a real marketplace `assignmentId` count: preview-mode
//! submissions are stored but do not make an example "annotated".

use async_trait::async_trait;
use pairpick_common::Result;
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

/// Example id -> completed judgment count
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CountIndex {
    counts: HashMap<String, usize>,
}

impl CountIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index from explicit counts
    pub fn from_counts<I, S>(counts: I) -> Self
    where
        I: IntoIterator<Item = (S, usize)>,
        S: Into<String>,
    {
        Self {
            counts: counts.into_iter().map(|(id, n)| (id.into(), n)).collect(),
        }
    }

    /// Build an index from the lines of a judgment log
    ///
    /// Blank lines, lines that are not JSON objects, and records without a
    /// string `id` and string `assignmentId` are skipped.
    pub fn from_log_lines<'a>(lines: impl IntoIterator<Item = &'a str>) -> Self {
        let mut index = Self::new();
        let mut skipped = 0usize;

        for line in lines {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match parse_line(line) {
                Some(LogLine::Counted(id)) => index.record(id),
                Some(LogLine::Preview) => {}
                None => skipped += 1,
            }
        }

        if skipped > 0 {
            debug!(skipped, "Skipped malformed judgment log lines");
        }
        index
    }

    /// Count one more judgment for `id`
    pub fn record(&mut self, id: impl Into<String>) {
        *self.counts.entry(id.into()).or_insert(0) += 1;
    }

    /// Judgment count for `id` (0 when never annotated)
    pub fn count(&self, id: &str) -> usize {
        self.counts.get(id).copied().unwrap_or(0)
    }

    /// Number of distinct annotated examples
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Sum of all counts
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }
}

enum LogLine {
    Counted(String),
    Preview,
}

fn parse_line(line: &str) -> Option<LogLine> {
    let value: Value = serde_json::from_str(line).ok()?;
    let id = value.get("id")?.as_str()?;
    let assignment_id = value.get("assignmentId")?.as_str()?;

    if assignment_id.is_empty() {
        Some(LogLine::Preview)
    } else {
        Some(LogLine::Counted(id.to_string()))
    }
}

/// Provider of the count index consulted by the sampler
///
/// The default provider ([`crate::judgment_log::JudgmentLog`]) re-reads the
/// whole log on every call. An incrementally maintained counter can replace
/// it without touching the sampler.
#[async_trait]
pub trait CountSource: Send + Sync {
    async fn count_index(&self) -> Result<CountIndex>;
}

/// A fixed snapshot serves as its own source
#[async_trait]
impl CountSource for CountIndex {
    async fn count_index(&self) -> Result<CountIndex> {
        Ok(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_log_yields_empty_index() {
        let index = CountIndex::from_log_lines(std::iter::empty());
        assert!(index.is_empty());
        assert_eq!(index.count("anything"), 0);
    }

    #[test]
    fn test_counts_only_real_assignments() {
        let log = r#"{"id":"a","assignmentId":"A1","taskId":"t1"}
{"id":"a","assignmentId":"","taskId":"t2"}
{"id":"b","assignmentId":"A2","taskId":"t3"}
{"id":"a","assignmentId":"A3","taskId":"t4"}
"#;
        let index = CountIndex::from_log_lines(log.lines());

        assert_eq!(index.count("a"), 2);
        assert_eq!(index.count("b"), 1);
        assert_eq!(index.len(), 2);
        assert_eq!(index.total(), 3);
    }

    #[test]
    fn test_preview_only_example_is_absent() {
        let index = CountIndex::from_log_lines([r#"{"id":"p","assignmentId":""}"#]);
        assert!(index.is_empty());
        assert_eq!(index.count("p"), 0);
    }

    #[test]
    fn test_malformed_records_skipped() {
        let lines = [
            "",
            "   ",
            "not json at all",
            "[1, 2, 3]",
            r#"{"assignmentId":"A1"}"#,
            r#"{"id":"a"}"#,
            r#"{"id":7,"assignmentId":"A1"}"#,
            r#"{"id":"a","assignmentId":null}"#,
            r#"{"id":"a","assignmentId":"A9"}"#,
            r#"{"id":"truncated","assignm"#,
        ];
        let index = CountIndex::from_log_lines(lines);

        assert_eq!(index.count("a"), 1);
        assert_eq!(index.total(), 1);
    }

    #[tokio::test]
    async fn test_snapshot_is_its_own_source() {
        let index = CountIndex::from_counts([("x", 4usize)]);
        let snapshot = index.count_index().await.unwrap();
        assert_eq!(snapshot, index);
    }
}
