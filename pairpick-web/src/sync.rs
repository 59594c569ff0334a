//! Background sync of the judgment log to a remote git repository
//!
//! Every period: if the work tree is dirty, stage everything, commit, and
//! push (forced when configured). A clean tree that still carries commits
//! the remote has not received, left behind by an earlier failed push, is
//! pushed again. Failures are logged and left for the next tick, never
//! retried mid-cycle. The local log stays the durable source of truth
//! whatever the sync state.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pairpick_common::{Error, Result};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const COMMIT_MESSAGE: &str = "Auto commit by space";

/// Version-control operations the daemon needs
#[async_trait]
pub trait SyncRepository: Send + Sync {
    async fn is_clean(&self) -> Result<bool>;
    /// Local commits not yet on the remote
    async fn unpushed_commits(&self) -> Result<usize>;
    async fn stage_all(&self) -> Result<()>;
    async fn commit(&self, message: &str) -> Result<()>;
    async fn push(&self, force: bool) -> Result<()>;
}

/// What a sync pass did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Nothing to commit, nothing waiting to be pushed
    Clean,
    /// New changes committed and pushed
    Pushed,
    /// No new changes; earlier unpushed commits were pushed
    PushedPending,
}

/// One sync pass
pub async fn sync_once(repo: &dyn SyncRepository, force_push: bool) -> Result<SyncOutcome> {
    if !repo.is_clean().await? {
        repo.stage_all().await?;
        repo.commit(COMMIT_MESSAGE).await?;
        repo.push(force_push).await?;
        return Ok(SyncOutcome::Pushed);
    }

    if repo.unpushed_commits().await? > 0 {
        repo.push(force_push).await?;
        return Ok(SyncOutcome::PushedPending);
    }

    Ok(SyncOutcome::Clean)
}

/// `git` CLI working on a local clone
pub struct GitRepository {
    dir: PathBuf,
}

impl GitRepository {
    /// Use an existing work tree
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Open `dir`, cloning `remote_url` into it first when it is not yet a
    /// repository
    pub async fn open_or_clone(dir: &Path, remote_url: &str, token: Option<&str>) -> Result<Self> {
        if dir.join(".git").exists() {
            debug!(dir = %dir.display(), "Using existing clone");
            return Ok(Self::open(dir));
        }

        info!(dir = %dir.display(), remote = remote_url, "Cloning dataset repository");
        let auth_url = authenticated_url(remote_url, token)?;
        let dir_arg = dir.to_string_lossy().into_owned();
        run_git(None, &["clone", &auth_url, &dir_arg]).await?;
        Ok(Self::open(dir))
    }

    async fn git(&self, args: &[&str]) -> Result<String> {
        run_git(Some(&self.dir), args).await
    }
}

#[async_trait]
impl SyncRepository for GitRepository {
    async fn is_clean(&self) -> Result<bool> {
        Ok(self.git(&["status", "--porcelain"]).await?.trim().is_empty())
    }

    async fn unpushed_commits(&self) -> Result<usize> {
        // Unborn branch: nothing committed yet
        if self.git(&["rev-parse", "--verify", "--quiet", "HEAD"]).await.is_err() {
            return Ok(0);
        }
        let count = self
            .git(&["rev-list", "--count", "HEAD", "--not", "--remotes"])
            .await?;
        count
            .trim()
            .parse()
            .map_err(|_| Error::Sync(format!("unexpected rev-list output: {:?}", count.trim())))
    }

    async fn stage_all(&self) -> Result<()> {
        self.git(&["add", "--all"]).await.map(|_| ())
    }

    async fn commit(&self, message: &str) -> Result<()> {
        self.git(&["commit", "-m", message]).await.map(|_| ())
    }

    async fn push(&self, force: bool) -> Result<()> {
        // Explicit refspec: a clone of an empty remote has no upstream yet
        let args: &[&str] = if force {
            &["push", "--force", "origin", "HEAD"]
        } else {
            &["push", "origin", "HEAD"]
        };
        self.git(args).await.map(|_| ())
    }
}

async fn run_git(dir: Option<&Path>, args: &[&str]) -> Result<String> {
    let mut command = Command::new("git");
    command
        .args(args)
        .stdin(Stdio::null())
        .env("GIT_TERMINAL_PROMPT", "0");
    if let Some(dir) = dir {
        command.current_dir(dir);
    }

    let output = command
        .output()
        .await
        .map_err(|e| Error::Sync(format!("failed to run git {}: {}", args[0], e)))?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    } else {
        Err(Error::Sync(format!(
            "git {} exited with {}: {}",
            args[0],
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )))
    }
}

/// Embed the auth token as URL credentials for http(s) remotes
///
/// Other schemes (ssh, file paths) are returned unchanged.
pub fn authenticated_url(remote_url: &str, token: Option<&str>) -> Result<String> {
    let Some(token) = token else {
        return Ok(remote_url.to_string());
    };
    let mut url = match url::Url::parse(remote_url) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => url,
        _ => return Ok(remote_url.to_string()),
    };
    url.set_username("user")
        .and_then(|_| url.set_password(Some(token)))
        .map_err(|_| Error::Config(format!("cannot add credentials to {}", remote_url)))?;
    Ok(url.into())
}

/// Handle on the running sync task
pub struct SyncDaemon {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl SyncDaemon {
    /// Start syncing: one pass immediately, then one per `period`
    pub fn spawn(repo: Arc<dyn SyncRepository>, force_push: bool, period: Duration) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            let mut tick = tokio::time::interval(period);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = tick.tick() => run_pass(repo.as_ref(), force_push).await,
                }
            }

            // Final flush on shutdown
            run_pass(repo.as_ref(), force_push).await;
            info!("Sync daemon stopped");
        });

        info!(period_secs = period.as_secs_f64(), force_push, "Sync daemon started");
        Self { cancel, handle }
    }

    /// Stop the schedule and wait for the final pass
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            warn!(error = %e, "Sync task ended abnormally");
        }
    }
}

async fn run_pass(repo: &dyn SyncRepository, force_push: bool) {
    match sync_once(repo, force_push).await {
        Ok(SyncOutcome::Clean) => debug!("Repo currently clean, nothing to push"),
        Ok(SyncOutcome::Pushed) => info!(force_push, "Judgment log pushed"),
        Ok(SyncOutcome::PushedPending) => {
            info!(force_push, "Pushed commits left by an earlier failed push")
        }
        Err(e) => warn!(error = %e, "Sync failed; retrying next interval"),
    }
}
