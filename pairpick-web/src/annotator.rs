//! Session coordinator
//!
//! Drives the session state machine against the sampler and the finalizer:
//! `start`, `submit_choice`, and `confirm`. Every call takes the previous
//! session value and returns the next one; when a call fails the client
//! keeps its previous value and may retry.

use pairpick_common::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::finalizer::Finalizer;
use crate::sampler::Sampler;
use crate::session::{FormField, Phase, RequestMeta, SessionState, Step};

/// Which completion affordance the worker used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmMode {
    Hit,
    Preview,
}

/// Marketplace submission the client posts as a form
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HitSubmission {
    pub action: String,
    pub fields: Vec<FormField>,
}

/// Outcome of confirming a completed session
#[derive(Debug)]
pub enum Confirmation {
    /// Session ended; client posts `HitSubmission` to the marketplace
    Hit(HitSubmission),
    /// Session ended; client restarts with this fresh session
    Preview(SessionState),
}

#[derive(Clone)]
pub struct Annotator {
    sampler: Sampler,
    finalizer: Finalizer,
    total_cnt: usize,
    submit_url: String,
}

impl Annotator {
    pub fn new(
        sampler: Sampler,
        finalizer: Finalizer,
        total_cnt: usize,
        submit_url: impl Into<String>,
    ) -> Self {
        Self {
            sampler,
            finalizer,
            total_cnt,
            submit_url: submit_url.into(),
        }
    }

    /// Judgments per HIT
    pub fn total_cnt(&self) -> usize {
        self.total_cnt
    }

    pub fn sampler(&self) -> &Sampler {
        &self.sampler
    }

    /// New session with a fresh task id and one pre-sampled example
    pub async fn start(&self) -> Result<SessionState> {
        let first = self.sampler.sample().await?;
        let session = SessionState::begin(first);
        info!(task_id = %session.task_id, "Session started");
        Ok(session)
    }

    /// Apply a worker's choice
    ///
    /// Finalization happens before the completed session is returned, so a
    /// persistence failure surfaces as an error and the caller's previous
    /// session stays authoritative.
    pub async fn submit_choice(
        &self,
        session: SessionState,
        choice: &str,
        meta: &RequestMeta,
    ) -> Result<SessionState> {
        match session.record_choice(choice, meta, self.total_cnt)? {
            Step::Unchanged(session) => {
                debug!(task_id = %session.task_id, "Empty choice ignored");
                Ok(session)
            }
            Step::NeedsExample(session) => {
                let next = self.sampler.sample().await?;
                debug!(
                    task_id = %session.task_id,
                    cnt = session.cnt,
                    next_example = %next.id,
                    "Choice recorded"
                );
                Ok(session.push_pending(next))
            }
            Step::Complete(session) => {
                self.finalizer.finalize(&session, self.total_cnt).await?;
                Ok(session)
            }
        }
    }

    /// Confirm a completed session, ending it
    pub async fn confirm(&self, session: SessionState, mode: ConfirmMode) -> Result<Confirmation> {
        if session.validate(self.total_cnt)? != Phase::AwaitingHitMetadata {
            return Err(Error::InvalidSession(format!(
                "session has {} of {} judgments",
                session.cnt, self.total_cnt
            )));
        }

        match mode {
            ConfirmMode::Hit => {
                if session.assignment_id.is_empty() {
                    return Err(Error::InvalidSession(
                        "no marketplace assignment observed; use preview submission".to_string(),
                    ));
                }
                info!(
                    task_id = %session.task_id,
                    assignment_id = %session.assignment_id,
                    "HIT confirmed"
                );
                Ok(Confirmation::Hit(HitSubmission {
                    action: self.submit_url.clone(),
                    fields: session.form_fields()?,
                }))
            }
            ConfirmMode::Preview => {
                info!(task_id = %session.task_id, "Preview submission confirmed");
                Ok(Confirmation::Preview(self.start().await?))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::Corpus;
    use crate::counts::CountSource;
    use crate::judgment_log::JudgmentLog;
    use pairpick_common::{Example, JudgmentRecord};
    use std::sync::Arc;

    const TOTAL: usize = 4;

    struct Fixture {
        _dir: tempfile::TempDir,
        log: Arc<JudgmentLog>,
        annotator: Annotator,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(JudgmentLog::new(dir.path().join("data.jsonl")));
        let corpus = Arc::new(
            Corpus::new(vec![
                Example::new("a", "prompt a", ["a1", "a2", "a3"]),
                Example::new("b", "prompt b", ["b1", "b2"]),
            ])
            .unwrap(),
        );
        let counts: Arc<dyn CountSource> = log.clone();
        let annotator = Annotator::new(
            Sampler::new(corpus, counts),
            Finalizer::new(log.clone()),
            TOTAL,
            "https://marketplace.example/externalSubmit",
        );
        Fixture {
            _dir: dir,
            log,
            annotator,
        }
    }

    async fn log_lines(log: &JudgmentLog) -> Vec<JudgmentRecord> {
        log.read_all()
            .await
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_full_session_writes_exactly_total_lines_once() {
        let f = fixture();
        let mut session = f.annotator.start().await.unwrap();
        assert_eq!(session.cnt, 0);

        for step in 1..=TOTAL {
            session = f
                .annotator
                .submit_choice(session, "(a) first", &RequestMeta::default())
                .await
                .unwrap();
            assert_eq!(session.cnt, step);

            let written = log_lines(&f.log).await.len();
            if step < TOTAL {
                assert_eq!(written, 0, "nothing persisted before completion");
                assert_eq!(session.data.len(), step + 1);
            } else {
                assert_eq!(written, TOTAL);
            }
        }

        assert_eq!(session.data.len(), TOTAL);
        let records = log_lines(&f.log).await;
        assert!(records.iter().all(|r| r.task_id == session.task_id));
        assert!(records.iter().all(|r| r.assignment_id.is_empty()));
        assert!(records.iter().all(|r| r.outputs.len() == 2));
    }

    #[tokio::test]
    async fn test_empty_choice_leaves_session_unchanged() {
        let f = fixture();
        let session = f.annotator.start().await.unwrap();
        let before = serde_json::to_vec(&session).unwrap();

        let after = f
            .annotator
            .submit_choice(session, "", &RequestMeta::from_query("assignmentId=A1"))
            .await
            .unwrap();
        assert_eq!(serde_json::to_vec(&after).unwrap(), before);
        assert!(log_lines(&f.log).await.is_empty());
    }

    #[tokio::test]
    async fn test_assignment_discovered_mid_session_written_to_all_records() {
        let f = fixture();
        let mut session = f.annotator.start().await.unwrap();

        for step in 1..=TOTAL {
            let meta = if step == 2 {
                RequestMeta::from_query("?assignmentId=ASSIGN-42")
            } else {
                RequestMeta::default()
            };
            session = f
                .annotator
                .submit_choice(session, "(b) second", &meta)
                .await
                .unwrap();
        }

        let records = log_lines(&f.log).await;
        assert_eq!(records.len(), TOTAL);
        assert!(records.iter().all(|r| r.assignment_id == "ASSIGN-42"));
        assert!(records.iter().all(|r| r.selected_response == "(b) second"));
    }

    #[tokio::test]
    async fn test_completed_sessions_steer_sampling() {
        let f = fixture();
        // Both examples annotated twice by a real worker, then "a" once more
        for id in ["a", "a", "b", "b", "a"] {
            f.log
                .append(&[JudgmentRecord {
                    assignment_id: "A".to_string(),
                    task_id: uuid::Uuid::new_v4(),
                    id: id.to_string(),
                    prompt: "p".to_string(),
                    outputs: vec![],
                    selected_response: "x".to_string(),
                }])
                .await
                .unwrap();
        }

        for _ in 0..10 {
            assert_eq!(f.annotator.sampler().sample().await.unwrap().id, "b");
        }
    }

    #[tokio::test]
    async fn test_confirm_before_completion_rejected() {
        let f = fixture();
        let session = f.annotator.start().await.unwrap();
        let result = f.annotator.confirm(session, ConfirmMode::Preview).await;
        assert!(matches!(result, Err(Error::InvalidSession(_))));
    }

    async fn completed(f: &Fixture, meta: &RequestMeta) -> SessionState {
        let mut session = f.annotator.start().await.unwrap();
        for _ in 0..TOTAL {
            session = f
                .annotator
                .submit_choice(session, "(c) both good", meta)
                .await
                .unwrap();
        }
        session
    }

    #[tokio::test]
    async fn test_confirm_hit_returns_form_fields() {
        let f = fixture();
        let session = completed(&f, &RequestMeta::from_query("assignmentId=A9")).await;
        let task_id = session.task_id.to_string();

        match f.annotator.confirm(session, ConfirmMode::Hit).await.unwrap() {
            Confirmation::Hit(submission) => {
                assert_eq!(submission.action, "https://marketplace.example/externalSubmit");
                assert_eq!(submission.fields[0].value, task_id);
                assert_eq!(submission.fields[1].value, "A9");
            }
            other => panic!("expected HIT confirmation, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_confirm_hit_without_assignment_rejected() {
        let f = fixture();
        let session = completed(&f, &RequestMeta::default()).await;
        let result = f.annotator.confirm(session, ConfirmMode::Hit).await;
        assert!(matches!(result, Err(Error::InvalidSession(_))));
    }

    #[tokio::test]
    async fn test_confirm_preview_restarts_with_new_task() {
        let f = fixture();
        let session = completed(&f, &RequestMeta::default()).await;
        let old_task = session.task_id;

        match f.annotator.confirm(session, ConfirmMode::Preview).await.unwrap() {
            Confirmation::Preview(fresh) => {
                assert_ne!(fresh.task_id, old_task);
                assert_eq!(fresh.cnt, 0);
                assert_eq!(fresh.data.len(), 1);
            }
            other => panic!("expected preview confirmation, got {:?}", other),
        }
        // Confirmation never writes
        assert_eq!(log_lines(&f.log).await.len(), TOTAL);
    }
}
