//! Worker session state machine
//!
//! A session is held by the client and sent back with every interaction.
//! Each transition consumes the previous value and produces the next one,
//! so a failed step leaves the client's copy untouched.
//!
//! Phases:
//! - `AwaitingChoice`: one pending example shown, `data.len() == cnt + 1`
//! - `AwaitingHitMetadata`: `cnt == total`, judgments persisted, waiting for
//!   the worker to confirm submission
//!
//! Advancing happens inside a single `submit_choice` call and is never
//! observable. The terminal phase is reached by consuming the session in a
//! confirmation.

use pairpick_common::{Error, Example, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// `assignmentId` value the marketplace sends while a HIT is only previewed
pub const ASSIGNMENT_PLACEHOLDER: &str = "ASSIGNMENT_ID_NOT_AVAILABLE";

/// A presented example and, once answered, the worker's choice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEntry {
    #[serde(flatten)]
    pub example: Example,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_response: Option<String>,
}

impl SessionEntry {
    pub fn pending(example: Example) -> Self {
        Self {
            example,
            selected_response: None,
        }
    }

    pub fn is_answered(&self) -> bool {
        self.selected_response.is_some()
    }
}

/// Client-held session value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    #[serde(rename = "taskId")]
    pub task_id: Uuid,
    #[serde(rename = "assignmentId", default)]
    pub assignment_id: String,
    pub cnt: usize,
    pub data: Vec<SessionEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    AwaitingChoice,
    AwaitingHitMetadata,
}

/// How a completed session is handed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionRoute {
    /// Submit to the marketplace for credit
    Hit,
    /// Preview mode: judgments are stored, no marketplace credit
    Preview,
}

/// Request metadata accompanying an interaction (the page's query string)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestMeta {
    pub assignment_id: Option<String>,
}

impl RequestMeta {
    /// Parse a query string, with or without the leading `?`
    ///
    /// A missing, empty, or placeholder `assignmentId` yields `None`. Only
    /// the first occurrence of the key is considered.
    pub fn from_query(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        let assignment_id = url::form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == "assignmentId")
            .map(|(_, value)| value.into_owned())
            .filter(|value| !value.is_empty() && value != ASSIGNMENT_PLACEHOLDER);
        Self { assignment_id }
    }
}

/// Result of recording a choice
#[derive(Debug)]
pub enum Step {
    /// Empty choice: nothing changed
    Unchanged(SessionState),
    /// Choice recorded; a new pending example must be appended
    NeedsExample(SessionState),
    /// Choice recorded and `cnt` reached the total; ready to finalize
    Complete(SessionState),
}

/// Marketplace form field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormField {
    pub name: String,
    pub value: String,
}

impl SessionState {
    /// Fresh session with its first pending example
    pub fn begin(first: Example) -> Self {
        Self {
            task_id: Uuid::new_v4(),
            assignment_id: String::new(),
            cnt: 0,
            data: vec![SessionEntry::pending(first)],
        }
    }

    /// Check the shape of a client-supplied session and report its phase
    pub fn validate(&self, total: usize) -> Result<Phase> {
        if self.cnt > total {
            return Err(Error::InvalidSession(format!(
                "cnt {} exceeds total {}",
                self.cnt, total
            )));
        }

        let answered = &self.data[..self.cnt.min(self.data.len())];
        if answered.len() < self.cnt || !answered.iter().all(SessionEntry::is_answered) {
            return Err(Error::InvalidSession(format!(
                "expected {} answered entries",
                self.cnt
            )));
        }

        if self.cnt == total {
            // A trailing unanswered entry is tolerated; it is never persisted
            return match &self.data[self.cnt..] {
                [] => Ok(Phase::AwaitingHitMetadata),
                [trailing] if !trailing.is_answered() => Ok(Phase::AwaitingHitMetadata),
                _ => Err(Error::InvalidSession(
                    "completed session carries extra entries".to_string(),
                )),
            };
        }

        match &self.data[self.cnt..] {
            [pending] if !pending.is_answered() => Ok(Phase::AwaitingChoice),
            _ => Err(Error::InvalidSession(format!(
                "expected exactly one pending entry after {} answered",
                self.cnt
            ))),
        }
    }

    /// The example currently awaiting a choice
    pub fn pending(&self) -> Option<&SessionEntry> {
        self.data.last().filter(|entry| !entry.is_answered())
    }

    /// Route a completed session takes: marketplace HIT when an assignment
    /// was observed, preview otherwise
    pub fn route(&self) -> CompletionRoute {
        if self.assignment_id.is_empty() {
            CompletionRoute::Preview
        } else {
            CompletionRoute::Hit
        }
    }

    /// Record a worker's choice on the pending entry
    ///
    /// An empty (or whitespace-only) choice returns the session untouched
    /// without inspecting `meta`. Otherwise the choice is recorded, `cnt`
    /// advances, and a real `assignmentId` in `meta` overwrites the stored
    /// one.
    pub fn record_choice(mut self, choice: &str, meta: &RequestMeta, total: usize) -> Result<Step> {
        if choice.trim().is_empty() {
            return Ok(Step::Unchanged(self));
        }

        if self.validate(total)? == Phase::AwaitingHitMetadata {
            return Err(Error::InvalidSession(
                "session is already complete".to_string(),
            ));
        }

        if let Some(entry) = self.data.last_mut() {
            entry.selected_response = Some(choice.to_string());
        }
        self.cnt += 1;

        if let Some(assignment_id) = &meta.assignment_id {
            self.assignment_id = assignment_id.clone();
        }

        if self.cnt == total {
            Ok(Step::Complete(self))
        } else {
            Ok(Step::NeedsExample(self))
        }
    }

    /// Append the next pending example
    pub fn push_pending(mut self, example: Example) -> Self {
        self.data.push(SessionEntry::pending(example));
        self
    }

    /// Session rendered as marketplace form fields
    ///
    /// `data` is carried as JSON text.
    pub fn form_fields(&self) -> Result<Vec<FormField>> {
        let field = |name: &str, value: String| FormField {
            name: name.to_string(),
            value,
        };
        Ok(vec![
            field("taskId", self.task_id.to_string()),
            field("assignmentId", self.assignment_id.clone()),
            field("cnt", self.cnt.to_string()),
            field("data", serde_json::to_string(&self.data)?),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOTAL: usize = 3;

    fn example(id: &str) -> Example {
        Example::new(id, "Explain. Input: something", ["first", "second"])
    }

    fn advance(session: SessionState, choice: &str, meta: &RequestMeta) -> SessionState {
        match session.record_choice(choice, meta, TOTAL).unwrap() {
            Step::NeedsExample(s) => s.push_pending(example("next")),
            Step::Complete(s) => s,
            Step::Unchanged(s) => s,
        }
    }

    #[test]
    fn test_begin_has_one_pending_entry() {
        let session = SessionState::begin(example("a"));
        assert_eq!(session.cnt, 0);
        assert_eq!(session.assignment_id, "");
        assert_eq!(session.data.len(), 1);
        assert_eq!(session.validate(TOTAL).unwrap(), Phase::AwaitingChoice);
        assert_eq!(session.pending().unwrap().example.id, "a");
    }

    #[test]
    fn test_empty_choice_is_noop() {
        let session = SessionState::begin(example("a"));
        let before = serde_json::to_vec(&session).unwrap();
        let meta = RequestMeta::from_query("?assignmentId=A1");

        for choice in ["", "   "] {
            match session.clone().record_choice(choice, &meta, TOTAL).unwrap() {
                Step::Unchanged(after) => {
                    assert_eq!(serde_json::to_vec(&after).unwrap(), before);
                }
                other => panic!("expected Unchanged, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_empty_choice_on_complete_session_is_noop() {
        let mut session = SessionState::begin(example("a"));
        for _ in 0..TOTAL {
            session = advance(session, "(a) first", &RequestMeta::default());
        }
        let snapshot = session.clone();
        assert!(matches!(
            session.record_choice("", &RequestMeta::default(), TOTAL).unwrap(),
            Step::Unchanged(s) if s == snapshot
        ));
    }

    #[test]
    fn test_choice_advances_and_keeps_invariant() {
        let mut session = SessionState::begin(example("a"));
        for expected_cnt in 1..TOTAL {
            session = advance(session, "(b) second", &RequestMeta::default());
            assert_eq!(session.cnt, expected_cnt);
            assert_eq!(session.data.len(), session.cnt + 1);
            assert_eq!(session.validate(TOTAL).unwrap(), Phase::AwaitingChoice);
        }
    }

    #[test]
    fn test_reaches_total_and_completes() {
        let mut session = SessionState::begin(example("a"));
        session = advance(session, "(a) first", &RequestMeta::default());
        session = advance(session, "(a) first", &RequestMeta::default());

        match session.record_choice("(d) bad", &RequestMeta::default(), TOTAL).unwrap() {
            Step::Complete(done) => {
                assert_eq!(done.cnt, TOTAL);
                assert_eq!(done.data.len(), TOTAL);
                assert!(done.data.iter().all(SessionEntry::is_answered));
                assert!(done.pending().is_none());
                assert_eq!(done.validate(TOTAL).unwrap(), Phase::AwaitingHitMetadata);
                assert_eq!(done.route(), CompletionRoute::Preview);
            }
            other => panic!("expected Complete, got {:?}", other),
        }
    }

    #[test]
    fn test_choice_after_completion_rejected() {
        let mut session = SessionState::begin(example("a"));
        for _ in 0..TOTAL {
            session = advance(session, "(a) first", &RequestMeta::default());
        }
        let result = session.record_choice("(a) first", &RequestMeta::default(), TOTAL);
        assert!(matches!(result, Err(Error::InvalidSession(_))));
    }

    #[test]
    fn test_assignment_retained_after_discovery() {
        let mut session = SessionState::begin(example("a"));
        session = advance(session, "(a) first", &RequestMeta::default());
        assert_eq!(session.assignment_id, "");

        session = advance(session, "(a) first", &RequestMeta::from_query("?assignmentId=ASSIGN-7&hitId=H"));
        assert_eq!(session.assignment_id, "ASSIGN-7");

        session = advance(session, "(a) first", &RequestMeta::default());
        assert_eq!(session.assignment_id, "ASSIGN-7");
        assert_eq!(session.route(), CompletionRoute::Hit);
    }

    #[test]
    fn test_last_observed_assignment_wins() {
        let mut session = SessionState::begin(example("a"));
        session = advance(session, "x", &RequestMeta::from_query("assignmentId=FIRST"));
        session = advance(session, "x", &RequestMeta::from_query("assignmentId=SECOND"));
        assert_eq!(session.assignment_id, "SECOND");
    }

    #[test]
    fn test_request_meta_parsing() {
        assert_eq!(RequestMeta::from_query("").assignment_id, None);
        assert_eq!(RequestMeta::from_query("?").assignment_id, None);
        assert_eq!(
            RequestMeta::from_query("?assignmentId=ASSIGNMENT_ID_NOT_AVAILABLE&hitId=1").assignment_id,
            None
        );
        assert_eq!(RequestMeta::from_query("?assignmentId=").assignment_id, None);
        assert_eq!(
            RequestMeta::from_query("hitId=1&assignmentId=3XYZ%2B1&turkSubmitTo=x").assignment_id,
            Some("3XYZ+1".to_string())
        );
        assert_eq!(
            RequestMeta::from_query("?assignmentId=one&assignmentId=two").assignment_id,
            Some("one".to_string())
        );
    }

    #[test]
    fn test_validate_rejects_malformed_sessions() {
        let mut session = SessionState::begin(example("a"));
        session.cnt = TOTAL + 1;
        assert!(matches!(session.validate(TOTAL), Err(Error::InvalidSession(_))));

        let mut session = SessionState::begin(example("a"));
        session.cnt = 1;
        assert!(session.validate(TOTAL).is_err());

        let mut session = SessionState::begin(example("a"));
        session.data.clear();
        assert!(session.validate(TOTAL).is_err());

        let mut session = SessionState::begin(example("a"));
        session.data[0].selected_response = Some("x".to_string());
        assert!(session.validate(TOTAL).is_err());
    }

    #[test]
    fn test_completed_session_with_trailing_pending_is_valid() {
        let mut session = SessionState::begin(example("a"));
        for _ in 0..TOTAL {
            session = advance(session, "(a) first", &RequestMeta::default());
        }
        let session = session.push_pending(example("extra"));
        assert_eq!(session.validate(TOTAL).unwrap(), Phase::AwaitingHitMetadata);
    }

    #[test]
    fn test_wire_format_matches_log_field_names() {
        let session = SessionState::begin(example("a"));
        let value = serde_json::to_value(&session).unwrap();

        assert!(value["taskId"].is_string());
        assert_eq!(value["assignmentId"], "");
        assert_eq!(value["cnt"], 0);
        assert_eq!(value["data"][0]["id"], "a");
        assert_eq!(value["data"][0]["outputs"][0]["output"], "first");
        assert!(value["data"][0].get("selected_response").is_none());

        let back: SessionState = serde_json::from_value(value).unwrap();
        assert_eq!(back, session);
    }

    #[test]
    fn test_form_fields() {
        let mut session = SessionState::begin(example("a"));
        session = advance(session, "(c) both good", &RequestMeta::from_query("assignmentId=A1"));

        let fields = session.form_fields().unwrap();
        let names: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["taskId", "assignmentId", "cnt", "data"]);
        assert_eq!(fields[1].value, "A1");
        assert_eq!(fields[2].value, "1");

        let data: Vec<SessionEntry> = serde_json::from_str(&fields[3].value).unwrap();
        assert_eq!(data[0].selected_response.as_deref(), Some("(c) both good"));
    }
}
