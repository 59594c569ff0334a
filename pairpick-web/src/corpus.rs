//! Example corpus loading
//!
//! The corpus is loaded once at startup and is read-only afterwards. Sources:
//! - local file containing a JSON array of examples
//! - local file in JSON Lines form (one example per line)
//! - `http://` / `https://` URL returning either of the above
//!
//! Every example must carry at least two outputs. A corpus that violates
//! this is rejected here, before the service starts answering requests.

use pairpick_common::{Error, Example, Result};
use std::collections::HashSet;
use tracing::{info, warn};

/// Minimum outputs per example: a pair is shown to the worker
pub const MIN_OUTPUTS: usize = 2;

/// Validated, immutable example collection
#[derive(Debug, Clone)]
pub struct Corpus {
    examples: Vec<Example>,
}

impl Corpus {
    /// Validate and wrap examples
    pub fn new(examples: Vec<Example>) -> Result<Self> {
        if examples.is_empty() {
            return Err(Error::Corpus("corpus contains no examples".to_string()));
        }

        if let Some(short) = examples.iter().find(|e| e.outputs.len() < MIN_OUTPUTS) {
            return Err(Error::Corpus(format!(
                "example {:?} has {} output(s), at least {} required",
                short.id,
                short.outputs.len(),
                MIN_OUTPUTS
            )));
        }

        let mut seen = HashSet::new();
        let duplicates = examples.iter().filter(|e| !seen.insert(e.id.as_str())).count();
        if duplicates > 0 {
            warn!(duplicates, "Corpus contains duplicate example ids; they share annotation counts");
        }

        Ok(Self { examples })
    }

    /// Parse corpus text (JSON array or JSON Lines)
    pub fn parse(text: &str) -> Result<Self> {
        let trimmed = text.trim_start();
        let examples = if trimmed.starts_with('[') {
            serde_json::from_str::<Vec<Example>>(trimmed)
                .map_err(|e| Error::Corpus(format!("invalid JSON array: {}", e)))?
        } else {
            text.lines()
                .enumerate()
                .filter(|(_, line)| !line.trim().is_empty())
                .map(|(n, line)| {
                    serde_json::from_str::<Example>(line).map_err(|e| {
                        Error::Corpus(format!("invalid example on line {}: {}", n + 1, e))
                    })
                })
                .collect::<Result<Vec<_>>>()?
        };
        Self::new(examples)
    }

    /// Load the corpus from a local path or an http(s) URL
    ///
    /// `auth_token` is sent as a bearer token for URL sources.
    pub async fn load(source: &str, auth_token: Option<&str>) -> Result<Self> {
        let text = if is_remote(source) {
            fetch_remote(source, auth_token).await?
        } else {
            tokio::fs::read_to_string(source).await.map_err(|e| {
                Error::Corpus(format!("failed to read corpus file {}: {}", source, e))
            })?
        };

        let corpus = Self::parse(&text)?;
        info!(source, examples = corpus.len(), "Corpus loaded");
        Ok(corpus)
    }

    pub fn examples(&self) -> &[Example] {
        &self.examples
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }
}

fn is_remote(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

async fn fetch_remote(url: &str, auth_token: Option<&str>) -> Result<String> {
    let client = reqwest::Client::new();
    let mut request = client.get(url);
    if let Some(token) = auth_token {
        request = request.bearer_auth(token);
    }

    let response = request
        .send()
        .await
        .map_err(|e| Error::Corpus(format!("failed to fetch corpus from {}: {}", url, e)))?;

    let status = response.status();
    if !status.is_success() {
        return Err(Error::Corpus(format!(
            "corpus fetch from {} returned HTTP {}",
            url, status
        )));
    }

    response
        .text()
        .await
        .map_err(|e| Error::Corpus(format!("failed to read corpus body from {}: {}", url, e)))
}
