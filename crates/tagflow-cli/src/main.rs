mod commands;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "tagflow",
    about = "Build and tag three images per commit, then pin them in a GitOps repository"
)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct CommitArg {
    /// Source commit id [default: $GITHUB_SHA, then `git rev-parse HEAD`]
    #[arg(long, env = "GITHUB_SHA")]
    commit: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a commented tagflow.toml and .env.example
    Init,
    /// Print the short id and the tag pair for a commit
    Tag {
        #[command(flatten)]
        commit: CommitArg,
    },
    /// Show image references and manifest rewrites without side effects
    Plan {
        #[command(flatten)]
        commit: CommitArg,
        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },
    /// Build and push the three images
    Build {
        #[command(flatten)]
        commit: CommitArg,
    },
    /// Pin already-pushed images in the GitOps repository
    Sync {
        #[command(flatten)]
        commit: CommitArg,
    },
    /// Build, push, then pin the images (full pipeline)
    Run {
        #[command(flatten)]
        commit: CommitArg,
    },
    /// Check docker, git, configuration and credentials
    Doctor,
    /// Manage CI/CD pipeline
    Ci {
        #[command(subcommand)]
        action: CiAction,
    },
}

#[derive(Subcommand)]
enum CiAction {
    /// Generate a GitHub Actions workflow that runs `tagflow run`
    Init,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                // arch-lint: allow(no-silent-result-drop) reason="an unset or unparsable RUST_LOG falls back to the info level"
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match dotenvy::dotenv() {
        Ok(path) => tracing::debug!(path = %path.display(), "loaded environment file"),
        // arch-lint: allow(no-error-swallowing) reason="a missing .env is normal on CI; variables come from the environment"
        Err(e) if e.not_found() => tracing::debug!(error = %e, "no .env file"),
        Err(e) => anyhow::bail!("failed to load .env: {e}"),
    }

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => commands::init_project()?,
        Commands::Tag { commit } => commands::tag(commit.commit.as_deref()).await?,
        Commands::Plan { commit, json } => commands::plan(commit.commit.as_deref(), json).await?,
        Commands::Build { commit } => commands::build(commit.commit.as_deref()).await?,
        Commands::Sync { commit } => commands::sync(commit.commit.as_deref()).await?,
        Commands::Run { commit } => commands::run(commit.commit.as_deref()).await?,
        Commands::Doctor => commands::doctor().await?,
        Commands::Ci { action } => match action {
            CiAction::Init => commands::ci_init()?,
        },
    }

    Ok(())
}
