//! Process-wide context
//!
//! Owns everything that lives for the whole process: the loaded corpus, the
//! judgment log, and the sync schedule. Built once in `main` with [`AppContext::init`]
//! and torn down with [`AppContext::shutdown`]; request handlers only see
//! the [`AppState`] derived from it.

use std::sync::Arc;

use pairpick_common::config::Settings;
use pairpick_common::Result;
use tracing::{info, warn};

use crate::annotator::Annotator;
use crate::corpus::Corpus;
use crate::counts::CountSource;
use crate::finalizer::Finalizer;
use crate::judgment_log::JudgmentLog;
use crate::sampler::Sampler;
use crate::sync::{GitRepository, SyncDaemon};
use crate::AppState;

pub struct AppContext {
    settings: Settings,
    corpus: Arc<Corpus>,
    log: Arc<JudgmentLog>,
    annotator: Annotator,
    sync: Option<SyncDaemon>,
}

impl AppContext {
    /// Open the dataset clone, prepare the log, load the corpus, and start
    /// the sync schedule
    pub async fn init(settings: Settings) -> Result<Self> {
        // Clone before the log file is created: git refuses a non-empty target
        let repo = match &settings.dataset_repo_url {
            Some(remote) => Some(
                GitRepository::open_or_clone(
                    &settings.data_dir,
                    remote,
                    settings.auth_token.as_deref(),
                )
                .await?,
            ),
            None => {
                warn!("No dataset repository configured; judgments are kept locally only");
                None
            }
        };

        let log = Arc::new(JudgmentLog::new(settings.log_path()));
        log.prepare().await?;

        let corpus = Arc::new(
            Corpus::load(&settings.corpus_source, settings.auth_token.as_deref()).await?,
        );

        let counts: Arc<dyn CountSource> = log.clone();
        let annotator = Annotator::new(
            Sampler::new(corpus.clone(), counts),
            Finalizer::new(log.clone()),
            settings.total_cnt,
            settings.submit_url.clone(),
        );

        let sync = repo.map(|repo| {
            SyncDaemon::spawn(Arc::new(repo), settings.force_push, settings.push_frequency)
        });

        info!(
            examples = corpus.len(),
            total_cnt = settings.total_cnt,
            log = %log.path().display(),
            sync = sync.is_some(),
            "Context initialized"
        );

        Ok(Self {
            settings,
            corpus,
            log,
            annotator,
            sync,
        })
    }

    /// Handler state for the router
    pub fn app_state(&self) -> AppState {
        AppState::new(self.annotator.clone())
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    pub fn log(&self) -> &JudgmentLog {
        &self.log
    }

    /// Stop the sync schedule after a final push attempt
    pub async fn shutdown(self) {
        if let Some(sync) = self.sync {
            sync.shutdown().await;
        }
        info!("Context shut down");
    }
}
