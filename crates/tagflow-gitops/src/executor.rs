use crate::git::GitError;
use std::path::Path;
use std::process::Stdio;

/// Abstraction over git CLI execution for testability.
///
/// Production code uses [`RealExecutor`], tests use mockall-generated mocks.
#[allow(async_fn_in_trait)]
pub trait GitExecutor: Send + Sync {
    /// Execute a git command in `cwd` and capture stdout.
    async fn exec(&self, cwd: &Path, args: &[String]) -> Result<String, GitError>;
}

/// Real git CLI executor.
pub struct RealExecutor;

impl GitExecutor for RealExecutor {
    async fn exec(&self, cwd: &Path, args: &[String]) -> Result<String, GitError> {
        let output = tokio::process::Command::new("git")
            .args(args)
            .current_dir(cwd)
            // fail instead of waiting for credentials on a terminal
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| GitError::NotFound { source: e })?;

        if output.status.success() {
            String::from_utf8(output.stdout).map_err(|e| GitError::InvalidUtf8 { source: e })
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            Err(GitError::CommandFailed {
                args: args.to_vec(),
                stderr,
            })
        }
    }
}
