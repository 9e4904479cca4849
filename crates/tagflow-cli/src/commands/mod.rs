mod build;
mod ci;
mod doctor;
mod init;
mod pipeline;
mod plan;
mod run;
mod sync;
mod tag;

use std::path::Path;
use tagflow_core::{CommitRef, TagflowConfig};
use tagflow_gitops::GitClient;

pub use build::build;
pub use ci::ci_init;
pub use doctor::doctor;
pub use init::init_project;
pub use plan::plan;
pub use run::run;
pub use sync::sync;
pub use tag::tag;

/// Load tagflow.toml from the working directory, apply environment
/// overrides and validate.
pub(crate) fn load_config() -> anyhow::Result<TagflowConfig> {
    let mut config = TagflowConfig::load(Path::new("."))?;
    config.apply_env();
    config.validate()?;
    Ok(config)
}

/// Commit to release: `--commit` / `GITHUB_SHA`, else the checked-out HEAD.
pub(crate) async fn resolve_commit(flag: Option<&str>) -> anyhow::Result<CommitRef> {
    let full = match flag.filter(|c| !c.trim().is_empty()) {
        Some(commit) => commit.to_owned(),
        None => GitClient::new(None)
            .head(Path::new("."))
            .await
            .map_err(|e| {
                anyhow::anyhow!(
                    "no --commit given, GITHUB_SHA is unset and `git rev-parse HEAD` failed: {e}"
                )
            })?,
    };
    Ok(CommitRef::parse(&full)?)
}
