use secrecy::SecretString;

/// Secrets read from the environment. Never stored in tagflow.toml.
#[derive(Debug, Default)]
pub struct Credentials {
    /// Registry password or access token (`REGISTRY_TOKEN`)
    pub registry_token: Option<SecretString>,
    /// GitOps repository write token (`GITOPS_TOKEN`)
    pub gitops_token: Option<SecretString>,
}

impl Credentials {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var_os(key).map(|v| v.to_string_lossy().into_owned()))
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let secret = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .map(SecretString::from)
        };

        Self {
            registry_token: secret("REGISTRY_TOKEN"),
            gitops_token: secret("GITOPS_TOKEN"),
        }
    }
}
