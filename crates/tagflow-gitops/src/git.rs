#[derive(Debug, thiserror::Error)]
pub enum GitError {
    #[error("git CLI not found — install: https://git-scm.com/downloads")]
    NotFound { source: std::io::Error },

    #[error("git command failed: {args:?}\n{stderr}")]
    CommandFailed { args: Vec<String>, stderr: String },

    #[error("git output was not valid UTF-8")]
    InvalidUtf8 { source: std::string::FromUtf8Error },
}

impl GitError {
    /// Whether a failed push was refused as a non-fast-forward update.
    pub fn is_push_rejected(&self) -> bool {
        match self {
            GitError::CommandFailed { stderr, .. } => {
                stderr.contains("[rejected]")
                    || stderr.contains("non-fast-forward")
                    || stderr.contains("fetch first")
            }
            _ => false,
        }
    }

    /// Replace every occurrence of `secret` in arguments and output.
    pub fn redact(self, secret: &str) -> Self {
        if secret.is_empty() {
            return self;
        }
        match self {
            GitError::CommandFailed { args, stderr } => GitError::CommandFailed {
                args: args.iter().map(|a| a.replace(secret, "***")).collect(),
                stderr: stderr.replace(secret, "***"),
            },
            other => other,
        }
    }
}
