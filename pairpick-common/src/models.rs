//! Corpus and judgment data model
//!
//! Field names on the wire match the persisted log format (`assignmentId`,
//! `taskId` in camelCase, everything else snake_case), so existing log files
//! stay readable.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One candidate model output for a prompt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExampleOutput {
    pub output: String,
}

impl ExampleOutput {
    pub fn new(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
        }
    }
}

/// Corpus example: a prompt and its candidate outputs
///
/// Unknown corpus columns are ignored on load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Example {
    pub id: String,
    pub prompt: String,
    pub outputs: Vec<ExampleOutput>,
}

impl Example {
    pub fn new(
        id: impl Into<String>,
        prompt: impl Into<String>,
        outputs: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            id: id.into(),
            prompt: prompt.into(),
            outputs: outputs.into_iter().map(ExampleOutput::new).collect(),
        }
    }
}

/// One finalized judgment, written as a single line of the persistent log
///
/// Immutable once written. `outputs` holds the pair that was shown, not the
/// example's full output list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JudgmentRecord {
    #[serde(rename = "assignmentId")]
    pub assignment_id: String,
    #[serde(rename = "taskId")]
    pub task_id: Uuid,
    pub id: String,
    pub prompt: String,
    pub outputs: Vec<ExampleOutput>,
    pub selected_response: String,
}
