use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to load config from {path}")]
    ConfigLoad {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config at {path}")]
    ConfigParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    // ── Input validation ──
    #[error("invalid commit identifier {value:?}: {reason}")]
    InvalidInput { value: String, reason: String },

    #[error("invalid environment label {label:?}: {reason}")]
    InvalidEnvironment { label: String, reason: &'static str },

    #[error("missing required setting `{key}` — set it in tagflow.toml or export {env}")]
    MissingSetting {
        key: &'static str,
        env: &'static str,
    },

    #[error("invalid value for {key}: {reason}")]
    InvalidSetting { key: String, reason: String },
}
