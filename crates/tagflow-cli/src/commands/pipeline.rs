use secrecy::SecretString;
use tagflow_build::{DockerClient, PublishSettings, PublishedImages, Publisher, error_chain};
use tagflow_core::{CommitRef, Credentials, TagflowConfig};
use tagflow_gitops::{GitClient, ManifestSynchronizer, SyncOutcome, SyncSettings};

/// Registry settings for the publishers; fails without a registry user.
pub(crate) fn publish_settings(config: &TagflowConfig) -> anyhow::Result<PublishSettings> {
    Ok(PublishSettings {
        registry_user: config.registry.require_user()?.to_owned(),
        registry_host: config.registry.host().map(str::to_owned),
        env: config.env_label()?,
        immutable_tags: config.pipeline.immutable_tags,
    })
}

/// Build and push all three images; passes only when every image made it.
pub(crate) async fn build_phase(
    config: &TagflowConfig,
    commit: &CommitRef,
    registry_token: Option<&SecretString>,
) -> anyhow::Result<PublishedImages> {
    let publisher = Publisher::new(DockerClient::new(), publish_settings(config)?);
    let specs = config.image_specs();

    println!("Building images for commit {}...", commit.short());
    let report = publisher.publish_all(&specs, commit, registry_token).await?;

    println!();
    print!("{report}");
    println!();

    match report.into_published() {
        Ok(release) => Ok(release),
        Err(e) => anyhow::bail!("{e} — manifests were not updated"),
    }
}

/// Confirm the three immutable tags exist in the registry without building.
pub(crate) async fn confirm_phase(
    config: &TagflowConfig,
    commit: &CommitRef,
    registry_token: Option<&SecretString>,
) -> anyhow::Result<PublishedImages> {
    let publisher = Publisher::new(DockerClient::new(), publish_settings(config)?);
    let release = publisher
        .confirm_published(&config.image_specs(), commit, registry_token)
        .await?;

    println!("Images for commit {} found in the registry:", commit.short());
    for image in release.iter() {
        println!(
            "  OK  {:<12} {}",
            image.kind,
            image.reference(tagflow_core::TagClass::Immutable)
        );
    }
    println!();

    Ok(release)
}

/// Pin a release in the GitOps repository.
pub(crate) async fn sync_phase(
    config: &TagflowConfig,
    release: &PublishedImages,
    gitops_token: Option<SecretString>,
) -> anyhow::Result<SyncOutcome> {
    let settings = SyncSettings::from_config(&config.gitops)?;
    let branch = settings.branch.clone();
    let synchronizer = ManifestSynchronizer::new(GitClient::new(gitops_token), settings);

    println!("Updating manifests on {branch}...");
    let outcome = match synchronizer.sync(release, &config.manifest_targets()).await {
        Ok(outcome) => outcome,
        Err(e) => anyhow::bail!(
            "manifest synchronization failed while {state}: {chain}",
            state = e.state(),
            chain = error_chain(&e)
        ),
    };

    match &outcome {
        SyncOutcome::Pushed { commit, attempts } => {
            println!("  Pushed {commit} to {branch} (attempt {attempts})");
        }
        SyncOutcome::Unchanged => {
            println!("  Manifests already pinned to {}, nothing to commit", release.commit().short());
        }
    }

    Ok(outcome)
}

/// Full pipeline: build barrier, then manifest synchronization.
pub(crate) async fn run_pipeline(config: &TagflowConfig, commit: &CommitRef) -> anyhow::Result<()> {
    let Credentials {
        registry_token,
        gitops_token,
    } = Credentials::from_env();

    // fail on a missing GitOps repository before spending time on builds
    config.gitops.require_repo_url()?;

    let release = build_phase(config, commit, registry_token.as_ref()).await?;
    sync_phase(config, &release, gitops_token).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_settings_require_registry_user() {
        let config = TagflowConfig::default();
        let err = publish_settings(&config).unwrap_err();
        assert!(err.to_string().contains("REGISTRY_USER"));
    }

    #[test]
    fn publish_settings_carry_user_and_host() {
        let mut config = TagflowConfig::default();
        config.registry.user = Some("someuser".to_owned());
        config.registry.host = Some("ghcr.io".to_owned());

        let settings = publish_settings(&config).unwrap();
        assert_eq!(settings.registry_user, "someuser");
        assert_eq!(settings.registry_host.as_deref(), Some("ghcr.io"));
        assert_eq!(settings.namespace(), "ghcr.io/someuser");
    }
}
