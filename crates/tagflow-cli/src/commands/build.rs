use tagflow_core::Credentials;

/// Build and push the three images for a commit, without touching manifests.
pub async fn build(commit: Option<&str>) -> anyhow::Result<()> {
    let config = super::load_config()?;
    let commit = super::resolve_commit(commit).await?;
    let credentials = Credentials::from_env();

    let release =
        super::pipeline::build_phase(&config, &commit, credentials.registry_token.as_ref()).await?;

    println!("All images published. Pin them with:");
    println!("  tagflow sync --commit {}", release.commit().full());

    Ok(())
}
