//! Image build/push orchestration: one publisher per image, fanned out over
//! the three images and joined into a [`PublishReport`].

use crate::client::DockerClient;
use crate::docker::DockerError;
use crate::executor::{DockerExecutor, RealExecutor};
use secrecy::SecretString;
use std::fmt;
use tagflow_core::{CommitRef, EnvLabel, ImageKind, ImageSpec, ImmutableTagPolicy, TagClass, TagPair};

/// Registry and tagging settings shared (read-only) by all three publishers.
#[derive(Debug, Clone)]
pub struct PublishSettings {
    pub registry_user: String,
    pub registry_host: Option<String>,
    pub env: Option<EnvLabel>,
    pub immutable_tags: ImmutableTagPolicy,
}

impl PublishSettings {
    /// Image namespace: `{user}` or `{host}/{user}`.
    pub fn namespace(&self) -> String {
        match &self.registry_host {
            Some(host) => format!("{host}/{user}", user = self.registry_user),
            None => self.registry_user.clone(),
        }
    }
}

/// How the immutable tag ended up in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImmutablePush {
    /// Tag did not exist and was pushed
    Created,
    /// Tag already pointed at identical content; push skipped
    AlreadyPresent,
    /// Tag pointed at different content and was overwritten by policy
    Overwritten,
}

/// One image successfully pushed under both tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedImage {
    pub kind: ImageKind,
    /// Repository name, e.g. `vprofileapp2`
    pub repository: String,
    /// `{namespace}/{repository}`
    pub image_name: String,
    pub tags: TagPair,
    /// Config digest of the pushed content
    pub image_id: String,
    pub immutable_push: ImmutablePush,
}

impl PublishedImage {
    pub fn reference(&self, class: TagClass) -> String {
        format!("{name}:{tag}", name = self.image_name, tag = self.tags.get(class))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("registry login failed")]
    Login { source: DockerError },

    #[error("build failed for {kind} image")]
    Build { kind: ImageKind, source: DockerError },

    #[error("failed to push {reference}")]
    Push {
        kind: ImageKind,
        reference: String,
        source: DockerError,
    },

    #[error("failed to inspect {reference}")]
    Inspect {
        kind: ImageKind,
        reference: String,
        source: DockerError,
    },

    #[error(
        "immutable tag {reference} already exists with different content \
         (remote {remote}, local {local}) — refusing to rewrite it"
    )]
    TagConflict {
        kind: ImageKind,
        reference: String,
        local: String,
        remote: String,
    },

    #[error("{reference} has not been published")]
    Unpublished { kind: ImageKind, reference: String },

    #[error(transparent)]
    Incomplete(#[from] ReleaseIncomplete),
}

impl PublishError {
    /// The image this error belongs to; `None` for group-wide failures.
    pub fn kind(&self) -> Option<ImageKind> {
        match self {
            PublishError::Login { .. } | PublishError::Incomplete(_) => None,
            PublishError::Build { kind, .. }
            | PublishError::Push { kind, .. }
            | PublishError::Inspect { kind, .. }
            | PublishError::TagConflict { kind, .. }
            | PublishError::Unpublished { kind, .. } => Some(*kind),
        }
    }

    /// Build-side failure, as opposed to a registry-side one.
    pub fn is_build_failure(&self) -> bool {
        matches!(self, PublishError::Build { .. })
    }
}

/// Outcome of one image's publisher.
#[derive(Debug)]
pub struct ImageOutcome {
    pub kind: ImageKind,
    pub result: Result<PublishedImage, PublishError>,
}

/// Joined outcomes of the three publishers for one commit.
#[derive(Debug)]
pub struct PublishReport {
    commit: CommitRef,
    outcomes: Vec<ImageOutcome>,
}

impl PublishReport {
    pub fn from_outcomes(commit: CommitRef, outcomes: Vec<ImageOutcome>) -> Self {
        Self { commit, outcomes }
    }

    pub fn commit(&self) -> &CommitRef {
        &self.commit
    }

    pub fn outcomes(&self) -> &[ImageOutcome] {
        &self.outcomes
    }

    /// The join barrier: every image kind published exactly once.
    pub fn all_succeeded(&self) -> bool {
        ImageKind::ALL.into_iter().all(|kind| self.published_once(kind))
    }

    pub fn failures(&self) -> impl Iterator<Item = (ImageKind, &PublishError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.kind, e)))
    }

    /// Pass the barrier, or report which images are missing.
    pub fn into_published(self) -> Result<PublishedImages, ReleaseIncomplete> {
        let missing: Vec<ImageKind> = ImageKind::ALL
            .into_iter()
            .filter(|kind| !self.published_once(*kind))
            .collect();
        if !missing.is_empty() {
            return Err(ReleaseIncomplete { missing });
        }

        let mut images = Vec::with_capacity(ImageKind::ALL.len());
        for outcome in self.outcomes {
            match outcome.result {
                Ok(image) => images.push(image),
                Err(e) => {
                    return Err(ReleaseIncomplete {
                        missing: e.kind().into_iter().collect(),
                    });
                }
            }
        }
        images.sort_by_key(|i| i.kind);

        Ok(PublishedImages {
            commit: self.commit,
            images,
        })
    }

    fn published_once(&self, kind: ImageKind) -> bool {
        let mut matching = self.outcomes.iter().filter(|o| o.kind == kind);
        matches!((matching.next(), matching.next()), (Some(o), None) if o.result.is_ok())
    }
}

impl fmt::Display for PublishReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Images for commit {}:", self.commit.short())?;
        for outcome in &self.outcomes {
            match &outcome.result {
                Ok(image) => writeln!(
                    f,
                    "  OK  {:<12} {} (+ {})",
                    outcome.kind,
                    image.reference(TagClass::Immutable),
                    image.tags.mutable()
                )?,
                Err(e) => writeln!(f, "  NG  {:<12} {}", outcome.kind, error_chain(e))?,
            }
        }
        Ok(())
    }
}

/// Some images were not published; the manifest synchronizer must not run.
#[derive(Debug, thiserror::Error)]
#[error("release incomplete — not published: {}", format_kinds(missing))]
pub struct ReleaseIncomplete {
    pub missing: Vec<ImageKind>,
}

fn format_kinds(kinds: &[ImageKind]) -> String {
    kinds
        .iter()
        .map(|k| k.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Proof that all three images of one commit are in the registry.
///
/// Only obtainable from a fully successful [`PublishReport`] or from
/// [`Publisher::confirm_published`]; the manifest synchronizer requires one.
#[derive(Debug, Clone)]
pub struct PublishedImages {
    commit: CommitRef,
    images: Vec<PublishedImage>,
}

impl PublishedImages {
    pub fn commit(&self) -> &CommitRef {
        &self.commit
    }

    pub fn get(&self, kind: ImageKind) -> Option<&PublishedImage> {
        self.images.iter().find(|i| i.kind == kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PublishedImage> {
        self.images.iter()
    }
}

/// Builds and pushes images for one commit.
pub struct Publisher<E: DockerExecutor = RealExecutor> {
    docker: DockerClient<E>,
    settings: PublishSettings,
}

impl<E: DockerExecutor> Publisher<E> {
    pub fn new(docker: DockerClient<E>, settings: PublishSettings) -> Self {
        Self { docker, settings }
    }

    pub fn settings(&self) -> &PublishSettings {
        &self.settings
    }

    /// Fan out over the three images and join their outcomes.
    ///
    /// Logs in first when a token is given. Each image is published
    /// independently; one failure does not stop the others.
    pub async fn publish_all(
        &self,
        specs: &[ImageSpec; 3],
        commit: &CommitRef,
        token: Option<&SecretString>,
    ) -> Result<PublishReport, PublishError> {
        self.login(token).await?;

        let [first, second, third] = specs;
        let (a, b, c) = tokio::join!(
            self.publish(first, commit),
            self.publish(second, commit),
            self.publish(third, commit),
        );

        let outcomes = vec![
            ImageOutcome {
                kind: first.kind,
                result: a,
            },
            ImageOutcome {
                kind: second.kind,
                result: b,
            },
            ImageOutcome {
                kind: third.kind,
                result: c,
            },
        ];

        Ok(PublishReport::from_outcomes(commit.clone(), outcomes))
    }

    /// Build one image and push its immutable tag, then its mutable tag.
    pub async fn publish(
        &self,
        spec: &ImageSpec,
        commit: &CommitRef,
    ) -> Result<PublishedImage, PublishError> {
        let kind = spec.kind;
        let tags = TagPair::derive(self.settings.env.as_ref(), commit);
        let image_name = spec.image_name(&self.settings.namespace());
        let immutable_ref = format!("{image_name}:{}", tags.immutable());
        let mutable_ref = format!("{image_name}:{}", tags.mutable());

        tracing::info!(image = %kind, reference = %immutable_ref, "building");
        // one build, two tags: both names point at the same image id
        self.docker
            .build(spec, &[immutable_ref.clone(), mutable_ref.clone()])
            .await
            .map_err(|e| PublishError::Build { kind, source: e })?;

        let image_id = self
            .docker
            .image_id(&immutable_ref)
            .await
            .map_err(|e| PublishError::Inspect {
                kind,
                reference: immutable_ref.clone(),
                source: e,
            })?;

        let remote = self
            .docker
            .remote_digests(&immutable_ref)
            .await
            .map_err(|e| PublishError::Inspect {
                kind,
                reference: immutable_ref.clone(),
                source: e,
            })?;

        let immutable_push = match remote {
            None => {
                self.push(kind, &immutable_ref).await?;
                ImmutablePush::Created
            }
            Some(digests) if digests.contains(&image_id) => {
                tracing::info!(
                    reference = %immutable_ref,
                    "immutable tag already holds this image, skipping push"
                );
                ImmutablePush::AlreadyPresent
            }
            Some(digests) => {
                let remote = digests.join(",");
                match self.settings.immutable_tags {
                    ImmutableTagPolicy::Reject => {
                        return Err(PublishError::TagConflict {
                            kind,
                            reference: immutable_ref,
                            local: image_id,
                            remote,
                        });
                    }
                    ImmutableTagPolicy::Warn => {
                        tracing::warn!(
                            reference = %immutable_ref,
                            %remote,
                            local = %image_id,
                            "overwriting immutable tag with different content"
                        );
                    }
                    ImmutableTagPolicy::Overwrite => {}
                }
                self.push(kind, &immutable_ref).await?;
                ImmutablePush::Overwritten
            }
        };

        self.push(kind, &mutable_ref).await?;
        tracing::info!(image = %kind, reference = %immutable_ref, "published");

        Ok(PublishedImage {
            kind,
            repository: spec.repository.clone(),
            image_name,
            tags,
            image_id,
            immutable_push,
        })
    }

    /// Check that the immutable tag of every image exists in the registry.
    ///
    /// Used when builds ran elsewhere (e.g. separate CI jobs) and only the
    /// manifest synchronization runs here.
    pub async fn confirm_published(
        &self,
        specs: &[ImageSpec; 3],
        commit: &CommitRef,
        token: Option<&SecretString>,
    ) -> Result<PublishedImages, PublishError> {
        self.login(token).await?;

        let tags = TagPair::derive(self.settings.env.as_ref(), commit);
        let namespace = self.settings.namespace();
        let mut images = Vec::with_capacity(specs.len());

        for spec in specs {
            let image_name = spec.image_name(&namespace);
            let reference = format!("{image_name}:{}", tags.immutable());
            let digests = self
                .docker
                .remote_digests(&reference)
                .await
                .map_err(|e| PublishError::Inspect {
                    kind: spec.kind,
                    reference: reference.clone(),
                    source: e,
                })?;

            let Some(image_id) = digests.and_then(|d| d.into_iter().next()) else {
                return Err(PublishError::Unpublished {
                    kind: spec.kind,
                    reference,
                });
            };

            images.push(PublishedImage {
                kind: spec.kind,
                repository: spec.repository.clone(),
                image_name,
                tags: tags.clone(),
                image_id,
                immutable_push: ImmutablePush::AlreadyPresent,
            });
        }

        let outcomes = images
            .into_iter()
            .map(|image| ImageOutcome {
                kind: image.kind,
                result: Ok(image),
            })
            .collect();

        Ok(PublishReport::from_outcomes(commit.clone(), outcomes).into_published()?)
    }

    /// `docker login` when a token is given; otherwise the host's existing
    /// docker credentials are used.
    async fn login(&self, token: Option<&SecretString>) -> Result<(), PublishError> {
        let Some(token) = token else {
            tracing::info!("no registry token set, using existing docker credentials");
            return Ok(());
        };
        self.docker
            .login(
                self.settings.registry_host.as_deref(),
                &self.settings.registry_user,
                token,
            )
            .await
            .map_err(|e| PublishError::Login { source: e })?;
        tracing::info!(user = %self.settings.registry_user, "logged in to registry");
        Ok(())
    }

    async fn push(&self, kind: ImageKind, reference: &str) -> Result<(), PublishError> {
        tracing::info!(%reference, "pushing");
        self.docker
            .push(reference)
            .await
            .map_err(|e| PublishError::Push {
                kind,
                reference: reference.to_owned(),
                source: e,
            })
    }
}

/// Render an error with its source chain on one line.
pub fn error_chain(err: &dyn std::error::Error) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}
