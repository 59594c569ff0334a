//! Session API handlers
//!
//! POST /api/session, POST /api/session/choice, POST /api/session/confirm
//!
//! The client holds the session and sends it back on every call. Each
//! response carries the next session value plus a view of what the form
//! should show.

use axum::{
    extract::{rejection::JsonRejection, State},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::annotator::{ConfirmMode, Confirmation, HitSubmission};
use crate::api::ApiResult;
use crate::session::{CompletionRoute, Phase, RequestMeta, SessionState};
use crate::AppState;

/// Fixed third and fourth answer labels
pub const BOTH_GOOD: &str = "(c) Both (a) and (b) are similarly good";
pub const BOTH_BAD: &str = "(d) Both (a) and (b) are similarly bad";

/// POST /api/session/choice request
#[derive(Debug, Deserialize)]
pub struct ChoiceRequest {
    pub session: SessionState,
    /// Selected label; empty when nothing was selected
    #[serde(default)]
    pub choice: String,
    /// The page's query string (`window.location.search`)
    #[serde(default)]
    pub query: String,
}

/// POST /api/session/confirm request
#[derive(Debug, Deserialize)]
pub struct ConfirmRequest {
    pub session: SessionState,
    pub mode: ConfirmMode,
}

/// What the form shows for a session
#[derive(Debug, Serialize)]
pub struct SessionView {
    pub phase: Phase,
    pub progress: String,
    /// Pending prompt as escaped HTML; absent once the session is complete
    pub prompt_html: Option<String>,
    pub choices: Vec<String>,
    pub show_submit_response: bool,
    pub show_submit_hit: bool,
    pub show_submit_preview: bool,
}

impl SessionView {
    pub fn of(session: &SessionState, total: usize) -> Self {
        let done = session.cnt >= total;
        let phase = if done {
            Phase::AwaitingHitMetadata
        } else {
            Phase::AwaitingChoice
        };

        let (prompt_html, choices) = match session.pending().filter(|_| !done) {
            Some(entry) => {
                let outputs = &entry.example.outputs;
                let mut choices = Vec::with_capacity(4);
                if let [a, b, ..] = outputs.as_slice() {
                    choices.push(format!("(a) {}", a.output));
                    choices.push(format!("(b) {}", b.output));
                }
                choices.push(BOTH_GOOD.to_string());
                choices.push(BOTH_BAD.to_string());
                (Some(prompt_html(&entry.example.prompt)), choices)
            }
            None => (None, Vec::new()),
        };

        let route = session.route();
        Self {
            phase,
            progress: format!("Messages left in HIT: {}/{}", session.cnt, total),
            prompt_html,
            choices,
            show_submit_response: !done,
            show_submit_hit: done && route == CompletionRoute::Hit,
            show_submit_preview: done && route == CompletionRoute::Preview,
        }
    }
}

/// Session plus its view
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub session: SessionState,
    pub view: SessionView,
}

impl SessionResponse {
    fn new(session: SessionState, total: usize) -> Self {
        let view = SessionView::of(&session, total);
        Self { session, view }
    }
}

/// POST /api/session/confirm response
#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum ConfirmResponse {
    Hit(HitSubmission),
    Preview(SessionResponse),
}

/// POST /api/session
///
/// Begin a session with a fresh task id and one example.
pub async fn start_session(State(state): State<AppState>) -> ApiResult<Json<SessionResponse>> {
    let session = state.annotator.start().await?;
    Ok(Json(SessionResponse::new(session, state.annotator.total_cnt())))
}

/// POST /api/session/choice
///
/// Record a choice. An empty choice returns the session unchanged.
pub async fn submit_choice(
    State(state): State<AppState>,
    request: Result<Json<ChoiceRequest>, JsonRejection>,
) -> ApiResult<Json<SessionResponse>> {
    let Json(request) = request?;
    let meta = RequestMeta::from_query(&request.query);
    let session = state
        .annotator
        .submit_choice(request.session, &request.choice, &meta)
        .await?;
    Ok(Json(SessionResponse::new(session, state.annotator.total_cnt())))
}

/// POST /api/session/confirm
///
/// End a completed session through the HIT or preview affordance.
pub async fn confirm_session(
    State(state): State<AppState>,
    request: Result<Json<ConfirmRequest>, JsonRejection>,
) -> ApiResult<Json<ConfirmResponse>> {
    let Json(request) = request?;
    let response = match state.annotator.confirm(request.session, request.mode).await? {
        Confirmation::Hit(submission) => ConfirmResponse::Hit(submission),
        Confirmation::Preview(fresh) => {
            ConfirmResponse::Preview(SessionResponse::new(fresh, state.annotator.total_cnt()))
        }
    };
    Ok(Json(response))
}

pub fn session_routes() -> Router<AppState> {
    Router::new()
        .route("/api/session", post(start_session))
        .route("/api/session/choice", post(submit_choice))
        .route("/api/session/confirm", post(confirm_session))
}

/// Escape a prompt for HTML and set the `Input:` section apart
pub fn prompt_html(prompt: &str) -> String {
    escape_html(prompt)
        .replace("Input:", "<br><br><b>Input:</b><br><br>")
        .replace('\n', "<br>")
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
