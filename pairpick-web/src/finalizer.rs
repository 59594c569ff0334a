//! Submission finalizer
//!
//! Turns a completed session into judgment records and appends them to the
//! log as one batch. Runs once per session, at the transition into
//! `AwaitingHitMetadata`.

use std::sync::Arc;

use pairpick_common::{Error, JudgmentRecord, Result};
use tracing::info;

use crate::judgment_log::JudgmentLog;
use crate::session::SessionState;

#[derive(Clone)]
pub struct Finalizer {
    log: Arc<JudgmentLog>,
}

impl Finalizer {
    pub fn new(log: Arc<JudgmentLog>) -> Self {
        Self { log }
    }

    /// Persist the session's judgments, returning the number of lines written
    pub async fn finalize(&self, session: &SessionState, total: usize) -> Result<usize> {
        let records = judgment_records(session, total)?;
        self.log.append(&records).await?;

        info!(
            task_id = %session.task_id,
            assignment_id = %session.assignment_id,
            judgments = records.len(),
            "Session finalized"
        );
        Ok(records.len())
    }
}

/// The first `total` entries as judgment records
///
/// Entries beyond `total` (a trailing pending example) are never written.
pub fn judgment_records(session: &SessionState, total: usize) -> Result<Vec<JudgmentRecord>> {
    if session.data.len() < total {
        return Err(Error::InvalidSession(format!(
            "session has {} entries, {} required to finalize",
            session.data.len(),
            total
        )));
    }

    session.data[..total]
        .iter()
        .enumerate()
        .map(|(position, entry)| {
            let selected_response = entry.selected_response.clone().ok_or_else(|| {
                Error::InvalidSession(format!("entry {} has no selected response", position))
            })?;
            Ok(JudgmentRecord {
                assignment_id: session.assignment_id.clone(),
                task_id: session.task_id,
                id: entry.example.id.clone(),
                prompt: entry.example.prompt.clone(),
                outputs: entry.example.outputs.clone(),
                selected_response,
            })
        })
        .collect()
}
