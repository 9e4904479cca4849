//! Image, tag, and manifest records.

use crate::commit::CommitRef;
use std::fmt;
use std::path::PathBuf;

/// Mutable pointer tag name (before the environment prefix).
const LATEST: &str = "latest";

/// Maximum length of a registry tag.
const MAX_TAG_LEN: usize = 128;

/// Returns `true` for characters allowed in a registry tag.
pub(crate) fn is_tag_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')
}

/// The three images a pipeline run builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ImageKind {
    Database,
    Application,
    Web,
}

impl ImageKind {
    /// All kinds, in build/report order.
    pub const ALL: [ImageKind; 3] = [ImageKind::Database, ImageKind::Application, ImageKind::Web];

    pub fn as_str(self) -> &'static str {
        match self {
            ImageKind::Database => "database",
            ImageKind::Application => "application",
            ImageKind::Web => "web",
        }
    }
}

impl fmt::Display for ImageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Environment label used to qualify tags (`prod` → `prod-latest`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvLabel(String);

impl EnvLabel {
    pub fn new(label: &str) -> crate::Result<Self> {
        let label = label.trim();
        let invalid = |reason| crate::Error::InvalidEnvironment {
            label: label.to_owned(),
            reason,
        };

        if label.is_empty() {
            return Err(invalid("label must not be empty"));
        }
        if !label.chars().all(is_tag_char) {
            return Err(invalid("only ASCII letters, digits, '_', '.' and '-' are allowed"));
        }
        if label.starts_with(['.', '-']) {
            return Err(invalid("label must start with a letter, digit or '_'"));
        }
        // prefix + '-' + short id must still be a valid tag
        if label.len() + 1 + crate::SHORT_ID_LEN > MAX_TAG_LEN {
            return Err(invalid("label is too long for a registry tag"));
        }

        Ok(Self(label.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Tag prefix for this label, including the separator.
    pub fn prefix(&self) -> String {
        format!("{}-", self.0)
    }
}

/// The two classes of tag pushed for every image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagClass {
    /// Pointer tag, safely overwritten on every run.
    Mutable,
    /// Commit-derived tag, write-once.
    Immutable,
}

/// The {mutable, immutable} tags produced for one image per run.
///
/// # Examples
///
/// ```
/// use tagflow_core::{CommitRef, EnvLabel, TagPair};
///
/// let commit = CommitRef::parse("a1b2c3d4e5f6").unwrap();
/// let env = EnvLabel::new("prod").unwrap();
/// let tags = TagPair::derive(Some(&env), &commit);
/// assert_eq!(tags.mutable(), "prod-latest");
/// assert_eq!(tags.immutable(), "prod-a1b2c3d");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagPair {
    mutable: String,
    immutable: String,
}

impl TagPair {
    pub fn derive(env: Option<&EnvLabel>, commit: &CommitRef) -> Self {
        let prefix = match env {
            Some(env) => env.prefix(),
            None => String::new(),
        };
        Self {
            mutable: format!("{prefix}{LATEST}"),
            immutable: format!("{prefix}{short}", short = commit.short()),
        }
    }

    pub fn mutable(&self) -> &str {
        &self.mutable
    }

    pub fn immutable(&self) -> &str {
        &self.immutable
    }

    pub fn get(&self, class: TagClass) -> &str {
        match class {
            TagClass::Mutable => &self.mutable,
            TagClass::Immutable => &self.immutable,
        }
    }
}

/// Build inputs and target repository for one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSpec {
    pub kind: ImageKind,
    /// Build context directory
    pub context: PathBuf,
    /// Dockerfile path
    pub dockerfile: PathBuf,
    /// Repository name under the registry namespace
    pub repository: String,
}

impl ImageSpec {
    /// `{namespace}/{repository}`, e.g. `someuser/vprofileapp2`.
    pub fn image_name(&self, namespace: &str) -> String {
        format!("{namespace}/{repo}", repo = self.repository)
    }

    /// Full reference for one tag, e.g. `someuser/vprofileapp2:prod-a1b2c3d`.
    pub fn reference(&self, namespace: &str, tag: &str) -> String {
        format!("{name}:{tag}", name = self.image_name(namespace))
    }
}

/// A GitOps manifest file and the container whose image it pins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestTarget {
    pub kind: ImageKind,
    /// Path relative to the GitOps repository root
    pub path: PathBuf,
    /// Container name inside the workload spec
    pub container: String,
}
