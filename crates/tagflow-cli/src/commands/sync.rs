use tagflow_core::Credentials;

/// Pin images that were already pushed for a commit.
///
/// The registry is checked for all three immutable tags first; nothing is
/// built here.
pub async fn sync(commit: Option<&str>) -> anyhow::Result<()> {
    let config = super::load_config()?;
    config.gitops.require_repo_url()?;
    let commit = super::resolve_commit(commit).await?;
    let Credentials {
        registry_token,
        gitops_token,
    } = Credentials::from_env();

    let release = super::pipeline::confirm_phase(&config, &commit, registry_token.as_ref()).await?;
    super::pipeline::sync_phase(&config, &release, gitops_token).await?;

    Ok(())
}
