use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::image::{EnvLabel, ImageKind, ImageSpec, ManifestTarget};

/// Name of the configuration file looked up in the project directory.
pub const CONFIG_FILE_NAME: &str = "tagflow.toml";

/// tagflow.toml configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TagflowConfig {
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub gitops: GitopsConfig,
    #[serde(default)]
    pub images: ImagesConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Registry username, also the image namespace
    pub user: Option<String>,
    /// Registry host; omitted for Docker Hub
    pub host: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Environment label used as tag prefix (e.g. "prod" → "prod-latest")
    pub environment: Option<String>,
    /// Wall-clock budget for a full run, in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// What to do when an immutable tag already exists with different content
    #[serde(default)]
    pub immutable_tags: ImmutableTagPolicy,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImmutableTagPolicy {
    /// Fail the image with a tag conflict
    #[default]
    Reject,
    /// Log a warning and overwrite
    Warn,
    /// Overwrite silently
    Overwrite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitopsConfig {
    /// Manifest repository clone URL
    pub repo_url: Option<String>,
    /// Branch the GitOps controller watches
    #[serde(default = "default_branch")]
    pub branch: String,
    /// Push attempts before reporting a rejected push (1 = no retry)
    #[serde(default = "default_max_push_attempts")]
    pub max_push_attempts: u32,
    /// How manifest image fields are located and rewritten
    #[serde(default)]
    pub edit_mode: EditMode,
    /// Commit author name
    #[serde(default = "default_author_name")]
    pub author_name: String,
    /// Commit author email
    #[serde(default = "default_author_email")]
    pub author_email: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditMode {
    /// Locate the container by parsing the YAML, rewrite only its image scalar
    #[default]
    Structural,
    /// Rewrite every `image:` line that names the target repository
    Line,
}

/// The three fixed image records. A section replaces the whole default
/// record for that image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImagesConfig {
    #[serde(default = "default_database_image")]
    pub database: ImageConfig,
    #[serde(default = "default_application_image")]
    pub application: ImageConfig,
    #[serde(default = "default_web_image")]
    pub web: ImageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    /// Build context directory
    pub context: PathBuf,
    /// Dockerfile path (defaults to `{context}/Dockerfile`)
    pub dockerfile: Option<PathBuf>,
    /// Repository name under the registry namespace
    pub repository: String,
    /// Deployment manifest path inside the GitOps repository
    pub manifest: PathBuf,
    /// Container whose image field is rewritten
    pub container: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            environment: None,
            timeout_secs: default_timeout_secs(),
            immutable_tags: ImmutableTagPolicy::default(),
        }
    }
}

impl Default for GitopsConfig {
    fn default() -> Self {
        Self {
            repo_url: None,
            branch: default_branch(),
            max_push_attempts: default_max_push_attempts(),
            edit_mode: EditMode::default(),
            author_name: default_author_name(),
            author_email: default_author_email(),
        }
    }
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            database: default_database_image(),
            application: default_application_image(),
            web: default_web_image(),
        }
    }
}

impl ImagesConfig {
    pub fn get(&self, kind: ImageKind) -> &ImageConfig {
        match kind {
            ImageKind::Database => &self.database,
            ImageKind::Application => &self.application,
            ImageKind::Web => &self.web,
        }
    }
}

impl RegistryConfig {
    /// The registry account; required for every registry operation.
    pub fn require_user(&self) -> crate::Result<&str> {
        self.user
            .as_deref()
            .filter(|u| !u.is_empty())
            .ok_or(crate::Error::MissingSetting {
                key: "registry.user",
                env: "REGISTRY_USER",
            })
    }

    /// Registry host, `None` for Docker Hub.
    pub fn host(&self) -> Option<&str> {
        self.host.as_deref().filter(|h| !h.is_empty())
    }

    /// Image namespace: `{user}` or `{host}/{user}`.
    pub fn namespace(&self) -> crate::Result<String> {
        let user = self.require_user()?;
        Ok(match self.host() {
            Some(host) => format!("{host}/{user}"),
            None => user.to_owned(),
        })
    }
}

impl GitopsConfig {
    pub fn require_repo_url(&self) -> crate::Result<&str> {
        self.repo_url
            .as_deref()
            .filter(|u| !u.is_empty())
            .ok_or(crate::Error::MissingSetting {
                key: "gitops.repo_url",
                env: "GITOPS_REPO_URL",
            })
    }
}

impl TagflowConfig {
    /// Load from tagflow.toml in the given directory, or return defaults if not found.
    pub fn load(project_dir: &Path) -> crate::Result<Self> {
        let config_path = project_dir.join(CONFIG_FILE_NAME);
        if config_path.exists() {
            let content =
                std::fs::read_to_string(&config_path).map_err(|e| crate::Error::ConfigLoad {
                    path: config_path.clone(),
                    source: e,
                })?;
            toml::from_str(&content).map_err(|e| crate::Error::ConfigParse {
                path: config_path,
                source: e,
            })
        } else {
            tracing::debug!(path = %config_path.display(), "no config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| {
            std::env::var_os(key).map(|v| v.to_string_lossy().into_owned())
        });
    }

    /// Apply overrides from an arbitrary lookup. Empty values are ignored.
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("REGISTRY_USER") {
            self.registry.user = Some(v);
        }
        if let Some(v) = get("REGISTRY_HOST") {
            self.registry.host = Some(v);
        }
        if let Some(v) = get("GITOPS_REPO_URL") {
            self.gitops.repo_url = Some(v);
        }
        if let Some(v) = get("GITOPS_BRANCH") {
            self.gitops.branch = v;
        }
        if let Some(v) = get("TAGFLOW_ENV") {
            self.pipeline.environment = Some(v);
        }
    }

    /// Validated environment label, if one is configured.
    pub fn env_label(&self) -> crate::Result<Option<EnvLabel>> {
        self.pipeline
            .environment
            .as_deref()
            .filter(|e| !e.trim().is_empty())
            .map(EnvLabel::new)
            .transpose()
    }

    /// Check settings that do not depend on the command being run.
    pub fn validate(&self) -> crate::Result<()> {
        self.env_label()?;

        if self.gitops.max_push_attempts == 0 {
            return Err(invalid("gitops.max_push_attempts", "must be at least 1"));
        }
        if self.gitops.branch.trim().is_empty() {
            return Err(invalid("gitops.branch", "must not be empty"));
        }
        if self.pipeline.timeout_secs == 0 {
            return Err(invalid("pipeline.timeout_secs", "must be at least 1"));
        }

        for kind in ImageKind::ALL {
            let image = self.images.get(kind);
            let key = |field: &str| format!("images.{kind}.{field}");
            if image.repository.is_empty()
                || !image
                    .repository
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || "._-/".contains(c))
                || image.repository.split('/').any(str::is_empty)
            {
                return Err(invalid(
                    &key("repository"),
                    "must be a non-empty lowercase repository name",
                ));
            }
            if image.container.trim().is_empty() {
                return Err(invalid(&key("container"), "must not be empty"));
            }
            if image.manifest.as_os_str().is_empty() || image.manifest.is_absolute() {
                return Err(invalid(
                    &key("manifest"),
                    "must be a path relative to the GitOps repository root",
                ));
            }
        }

        Ok(())
    }

    /// The three image specs, in [`ImageKind::ALL`] order.
    pub fn image_specs(&self) -> [ImageSpec; 3] {
        ImageKind::ALL.map(|kind| {
            let image = self.images.get(kind);
            ImageSpec {
                kind,
                context: image.context.clone(),
                dockerfile: match &image.dockerfile {
                    Some(path) => path.clone(),
                    None => image.context.join("Dockerfile"),
                },
                repository: image.repository.clone(),
            }
        })
    }

    /// The three manifest targets, in [`ImageKind::ALL`] order.
    pub fn manifest_targets(&self) -> [ManifestTarget; 3] {
        ImageKind::ALL.map(|kind| {
            let image = self.images.get(kind);
            ManifestTarget {
                kind,
                path: image.manifest.clone(),
                container: image.container.clone(),
            }
        })
    }
}

fn invalid(key: &str, reason: &str) -> crate::Error {
    crate::Error::InvalidSetting {
        key: key.to_owned(),
        reason: reason.to_owned(),
    }
}

fn default_timeout_secs() -> u64 {
    3600
}

fn default_branch() -> String {
    "main".to_owned()
}

fn default_max_push_attempts() -> u32 {
    3
}

fn default_author_name() -> String {
    "tagflow".to_owned()
}

fn default_author_email() -> String {
    "tagflow@users.noreply.github.com".to_owned()
}

fn default_database_image() -> ImageConfig {
    ImageConfig {
        context: PathBuf::from("Docker-files/db"),
        dockerfile: None,
        repository: "vprofiledb2".to_owned(),
        manifest: PathBuf::from("kubernetes/vpro-app/vprodbdep.yml"),
        container: "vprodb".to_owned(),
    }
}

fn default_application_image() -> ImageConfig {
    ImageConfig {
        context: PathBuf::from("Docker-files/app"),
        dockerfile: None,
        repository: "vprofileapp2".to_owned(),
        manifest: PathBuf::from("kubernetes/vpro-app/vproappdep.yml"),
        container: "vproapp".to_owned(),
    }
}

fn default_web_image() -> ImageConfig {
    ImageConfig {
        context: PathBuf::from("Docker-files/web"),
        dockerfile: None,
        repository: "vprofileweb2".to_owned(),
        manifest: PathBuf::from("kubernetes/vpro-app/vprowebdep.yml"),
        container: "vproweb".to_owned(),
    }
}
