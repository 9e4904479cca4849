#[derive(Debug, thiserror::Error)]
pub enum DockerError {
    #[error("docker CLI not found — install: https://docs.docker.com/get-docker/")]
    NotFound { source: std::io::Error },

    #[error("docker command failed: {args:?}\n{stderr}")]
    CommandFailed { args: Vec<String>, stderr: String },

    #[error("docker output was not valid UTF-8")]
    InvalidUtf8 { source: std::string::FromUtf8Error },

    #[error("failed to write to docker stdin")]
    StdinWrite { source: std::io::Error },

    #[error("unexpected docker output for {args:?}")]
    UnexpectedOutput {
        args: Vec<String>,
        source: serde_json::Error,
    },
}

impl DockerError {
    /// Whether a failed `manifest inspect` means the tag does not exist.
    pub fn is_missing_manifest(&self) -> bool {
        match self {
            DockerError::CommandFailed { stderr, .. } => {
                let stderr = stderr.to_ascii_lowercase();
                stderr.contains("no such manifest")
                    || stderr.contains("manifest unknown")
                    || stderr.contains("not found")
            }
            _ => false,
        }
    }
}
