use std::future::Future;
use std::time::Duration;

/// Full pipeline, raced against Ctrl-C and the configured time budget.
///
/// Losing the race drops the pipeline: in-flight docker and git processes
/// are killed and the GitOps working copy is removed.
pub async fn run(commit: Option<&str>) -> anyhow::Result<()> {
    let config = super::load_config()?;
    let commit = super::resolve_commit(commit).await?;
    let budget = Duration::from_secs(config.pipeline.timeout_secs);

    tracing::info!(commit = %commit.short(), timeout_secs = budget.as_secs(), "starting pipeline");

    within_budget(
        super::pipeline::run_pipeline(&config, &commit),
        budget,
        commit.short(),
    )
    .await?;

    println!();
    println!("Release {} complete.", commit.short());
    Ok(())
}

/// Drive `pipeline` to completion unless Ctrl-C or `budget` comes first.
/// A pipeline that loses the race is dropped at its current await point.
async fn within_budget<F>(pipeline: F, budget: Duration, short: &str) -> anyhow::Result<()>
where
    F: Future<Output = anyhow::Result<()>>,
{
    tokio::select! {
        result = pipeline => result,
        signal = tokio::signal::ctrl_c() => {
            signal?;
            anyhow::bail!("interrupted — pipeline for {short} cancelled");
        }
        () = tokio::time::sleep(budget) => {
            anyhow::bail!(
                "pipeline for {short} did not finish within {}s (pipeline.timeout_secs)",
                budget.as_secs()
            );
        }
    }
}
