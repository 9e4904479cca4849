use tagflow_core::TagPair;

/// Print the short id and tag pair for a commit.
pub async fn tag(commit: Option<&str>) -> anyhow::Result<()> {
    let config = super::load_config()?;
    let commit = super::resolve_commit(commit).await?;
    let env = config.env_label()?;
    let tags = TagPair::derive(env.as_ref(), &commit);

    println!("commit     {}", commit.full());
    println!("short id   {}", commit.short());
    println!("mutable    {}", tags.mutable());
    println!("immutable  {}", tags.immutable());

    Ok(())
}
