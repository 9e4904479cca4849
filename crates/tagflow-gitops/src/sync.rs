//! Manifest synchronization: clone, rewrite three manifests, one commit, push.

use crate::client::GitClient;
use crate::executor::{GitExecutor, RealExecutor};
use crate::git::GitError;
use crate::manifest::{self, ImageEdit, ManifestError, Rewrite};
use std::fmt;
use std::path::{Path, PathBuf};
use tagflow_build::PublishedImages;
use tagflow_core::{EditMode, GitopsConfig, ImageKind, ManifestTarget, TagClass};

/// Directory name of the working copy inside the scratch directory.
const CHECKOUT_DIR: &str = "repo";

/// Synchronizer progress. Only `Succeeded` has a remote effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Cloning,
    Editing,
    Committing,
    Pushing,
    Succeeded,
    Failed,
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            SyncState::Idle => "idle",
            SyncState::Cloning => "cloning",
            SyncState::Editing => "editing",
            SyncState::Committing => "committing",
            SyncState::Pushing => "pushing",
            SyncState::Succeeded => "succeeded",
            SyncState::Failed => "failed",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// One commit updating all three manifests was pushed
    Pushed { commit: String, attempts: u32 },
    /// All three manifests already referenced these images; nothing committed
    Unchanged,
}

#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub repo_url: String,
    pub branch: String,
    pub max_push_attempts: u32,
    pub edit_mode: EditMode,
    pub author_name: String,
    pub author_email: String,
}

impl SyncSettings {
    pub fn from_config(config: &GitopsConfig) -> tagflow_core::Result<Self> {
        Ok(Self {
            repo_url: config.require_repo_url()?.to_owned(),
            branch: config.branch.clone(),
            max_push_attempts: config.max_push_attempts,
            edit_mode: config.edit_mode,
            author_name: config.author_name.clone(),
            author_email: config.author_email.clone(),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("no manifest target configured for the {kind} image")]
    MissingTarget { kind: ImageKind },

    #[error("no published {kind} image in this release")]
    MissingImage { kind: ImageKind },

    #[error("failed to create working directory")]
    Workspace { source: std::io::Error },

    #[error("failed to clone {url} ({branch})")]
    Clone {
        url: String,
        branch: String,
        source: GitError,
    },

    #[error("failed to read manifest {path}")]
    ManifestRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("image field for the {kind} image not found in {path}")]
    ManifestFieldNotFound {
        path: PathBuf,
        kind: ImageKind,
        source: ManifestError,
    },

    #[error("failed to rewrite {path} for the {kind} image")]
    ManifestEdit {
        path: PathBuf,
        kind: ImageKind,
        source: ManifestError,
    },

    #[error("failed to write manifest {path}")]
    ManifestWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to commit manifest changes")]
    Commit { source: GitError },

    #[error(
        "push to {branch} rejected after {attempts} attempt(s) — the branch was updated concurrently"
    )]
    PushRejected {
        branch: String,
        attempts: u32,
        source: GitError,
    },

    #[error("failed to push to {branch}")]
    Push { branch: String, source: GitError },

    #[error("failed to refresh working copy from {branch}")]
    Refresh { branch: String, source: GitError },
}

impl SyncError {
    /// The state the synchronizer was in when it failed.
    pub fn state(&self) -> SyncState {
        match self {
            SyncError::MissingTarget { .. } | SyncError::MissingImage { .. } => SyncState::Idle,
            SyncError::Workspace { .. } | SyncError::Clone { .. } => SyncState::Cloning,
            SyncError::ManifestRead { .. }
            | SyncError::ManifestFieldNotFound { .. }
            | SyncError::ManifestEdit { .. }
            | SyncError::ManifestWrite { .. } => SyncState::Editing,
            SyncError::Commit { .. } => SyncState::Committing,
            SyncError::PushRejected { .. } | SyncError::Push { .. } | SyncError::Refresh { .. } => {
                SyncState::Pushing
            }
        }
    }
}

/// One manifest rewrite, resolved from a target and its published image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedEdit {
    pub kind: ImageKind,
    pub path: PathBuf,
    pub container: String,
    pub repository: String,
    /// New image reference (immutable tag)
    pub image: String,
}

/// Pair every image kind with its manifest target and published image.
///
/// Fails unless all three kinds are covered, so a commit can never update
/// fewer than three manifests.
pub fn plan(
    release: &PublishedImages,
    targets: &[ManifestTarget],
) -> Result<Vec<PlannedEdit>, SyncError> {
    ImageKind::ALL
        .iter()
        .map(|&kind| {
            let target = targets
                .iter()
                .find(|t| t.kind == kind)
                .ok_or(SyncError::MissingTarget { kind })?;
            let image = release
                .get(kind)
                .ok_or(SyncError::MissingImage { kind })?;
            Ok(PlannedEdit {
                kind,
                path: target.path.clone(),
                container: target.container.clone(),
                repository: image.repository.clone(),
                image: image.reference(TagClass::Immutable),
            })
        })
        .collect()
}

/// Commit message for a release.
pub fn commit_message(release: &PublishedImages, edits: &[PlannedEdit]) -> String {
    let commit = release.commit();
    let mut msg = format!("Deploy {short}\n\n", short = commit.short());
    for edit in edits {
        msg.push_str(&format!("- {}: {}\n", edit.kind, edit.image));
    }
    msg.push_str(&format!("\nSource commit: {}\n", commit.full()));
    msg
}

/// Rewrites the three deployment manifests in the GitOps repository.
pub struct ManifestSynchronizer<E: GitExecutor = RealExecutor> {
    git: GitClient<E>,
    settings: SyncSettings,
}

impl<E: GitExecutor> ManifestSynchronizer<E> {
    pub fn new(git: GitClient<E>, settings: SyncSettings) -> Self {
        Self { git, settings }
    }

    /// Synchronize manifests to `release`.
    ///
    /// The working copy lives in a scratch directory removed when this
    /// returns. Any failure leaves the remote branch untouched.
    pub async fn sync(
        &self,
        release: &PublishedImages,
        targets: &[ManifestTarget],
    ) -> Result<SyncOutcome, SyncError> {
        match self.run(release, targets).await {
            Ok(outcome) => {
                enter(SyncState::Succeeded);
                Ok(outcome)
            }
            Err(e) => {
                tracing::error!(state = %e.state(), error = %e, "manifest synchronization failed");
                enter(SyncState::Failed);
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        release: &PublishedImages,
        targets: &[ManifestTarget],
    ) -> Result<SyncOutcome, SyncError> {
        let edits = plan(release, targets)?;
        let message = commit_message(release, &edits);
        let branch = self.settings.branch.as_str();
        let max_attempts = self.settings.max_push_attempts.max(1);

        enter(SyncState::Cloning);
        let workdir = tempfile::Builder::new()
            .prefix("tagflow-gitops-")
            .tempdir()
            .map_err(|e| SyncError::Workspace { source: e })?;
        self.git
            .clone_branch(workdir.path(), &self.settings.repo_url, branch, CHECKOUT_DIR)
            .await
            .map_err(|e| SyncError::Clone {
                url: self.settings.repo_url.clone(),
                branch: branch.to_owned(),
                source: e,
            })?;
        let repo = workdir.path().join(CHECKOUT_DIR);

        let mut attempt = 0;
        loop {
            attempt += 1;

            enter(SyncState::Editing);
            let changed = apply_edits(&repo, &edits, self.settings.edit_mode)?;
            if changed == 0 {
                tracing::info!("manifests already reference these images, nothing to commit");
                return Ok(SyncOutcome::Unchanged);
            }

            enter(SyncState::Committing);
            let paths: Vec<String> = edits
                .iter()
                .map(|e| e.path.to_string_lossy().into_owned())
                .collect();
            self.git
                .add(&repo, &paths)
                .await
                .map_err(|e| SyncError::Commit { source: e })?;
            let staged = self
                .git
                .has_staged_changes(&repo)
                .await
                .map_err(|e| SyncError::Commit { source: e })?;
            if !staged {
                tracing::info!("no staged difference after rewrite, nothing to commit");
                return Ok(SyncOutcome::Unchanged);
            }
            self.git
                .commit(
                    &repo,
                    &self.settings.author_name,
                    &self.settings.author_email,
                    &message,
                )
                .await
                .map_err(|e| SyncError::Commit { source: e })?;
            let commit = self
                .git
                .head(&repo)
                .await
                .map_err(|e| SyncError::Commit { source: e })?;

            enter(SyncState::Pushing);
            let pushed = self.git.push(&repo, branch).await;
            match pushed {
                Ok(()) => {
                    tracing::info!(%commit, attempts = attempt, branch, "manifests pushed");
                    return Ok(SyncOutcome::Pushed {
                        commit,
                        attempts: attempt,
                    });
                }
                Err(e) if e.is_push_rejected() && attempt < max_attempts => {
                    tracing::warn!(
                        attempt,
                        max_attempts,
                        branch,
                        error = %e,
                        "push rejected, re-applying edits on the new remote tip"
                    );
                    self.git
                        .reset_to_remote(&repo, branch)
                        .await
                        .map_err(|e| SyncError::Refresh {
                            branch: branch.to_owned(),
                            source: e,
                        })?;
                }
                Err(e) if e.is_push_rejected() => {
                    return Err(SyncError::PushRejected {
                        branch: branch.to_owned(),
                        attempts: attempt,
                        source: e,
                    });
                }
                Err(e) => {
                    return Err(SyncError::Push {
                        branch: branch.to_owned(),
                        source: e,
                    });
                }
            }
        }
    }
}

fn enter(state: SyncState) {
    tracing::info!(%state, "manifest sync");
}

/// Rewrite all manifests in memory first, then write the changed ones.
/// Returns the number of files written.
fn apply_edits(repo: &Path, edits: &[PlannedEdit], mode: EditMode) -> Result<usize, SyncError> {
    let mut rewritten = Vec::with_capacity(edits.len());

    for edit in edits {
        let path = repo.join(&edit.path);
        let content = std::fs::read_to_string(&path).map_err(|e| SyncError::ManifestRead {
            path: edit.path.clone(),
            source: e,
        })?;

        let image_edit = ImageEdit {
            container: &edit.container,
            repository: &edit.repository,
            image: &edit.image,
        };
        let rewrite = manifest::rewrite(&content, mode, &image_edit).map_err(|e| match e {
            ManifestError::FieldNotFound { .. } | ManifestError::RepositoryNotFound { .. } => {
                SyncError::ManifestFieldNotFound {
                    path: edit.path.clone(),
                    kind: edit.kind,
                    source: e,
                }
            }
            other => SyncError::ManifestEdit {
                path: edit.path.clone(),
                kind: edit.kind,
                source: other,
            },
        })?;

        match rewrite {
            Rewrite::Changed(updated) => {
                tracing::info!(path = %edit.path.display(), image = %edit.image, "rewriting");
                rewritten.push((path, edit.path.clone(), updated));
            }
            Rewrite::Unchanged => {
                tracing::debug!(path = %edit.path.display(), "already up to date");
            }
        }
    }

    for (path, relative, updated) in &rewritten {
        std::fs::write(path, updated).map_err(|e| SyncError::ManifestWrite {
            path: relative.clone(),
            source: e,
        })?;
    }

    Ok(rewritten.len())
}
