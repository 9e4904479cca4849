//! Commit identifier resolution.

use crate::image::is_tag_char;
use std::fmt;

/// Length of the short commit identifier (the common short-hash convention).
pub const SHORT_ID_LEN: usize = 7;

/// Identifier of the source change that triggered a pipeline run.
///
/// Derived once per run and never mutated. The short identifier is the
/// first [`SHORT_ID_LEN`] characters of the full identifier.
///
/// # Examples
///
/// ```
/// use tagflow_core::CommitRef;
///
/// let commit = CommitRef::parse("a1b2c3d4e5f60718293a4b5c6d7e8f9012345678").unwrap();
/// assert_eq!(commit.short(), "a1b2c3d");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommitRef {
    full: String,
    short: String,
}

impl CommitRef {
    /// Parse a full commit identifier and derive its short form.
    ///
    /// Fails with [`Error::InvalidInput`](crate::Error::InvalidInput) when the
    /// identifier is shorter than [`SHORT_ID_LEN`], or its prefix contains
    /// characters that cannot appear in a registry tag or starts with `.`/`-`.
    pub fn parse(full: &str) -> crate::Result<Self> {
        let full = full.trim();
        let len = full.chars().count();
        if len < SHORT_ID_LEN {
            return Err(crate::Error::InvalidInput {
                value: full.to_owned(),
                reason: format!("expected at least {SHORT_ID_LEN} characters, got {len}"),
            });
        }

        let short: String = full.chars().take(SHORT_ID_LEN).collect();
        if let Some(bad) = short.chars().find(|c| !is_tag_char(*c)) {
            return Err(crate::Error::InvalidInput {
                value: full.to_owned(),
                reason: format!("character {bad:?} is not allowed in an image tag"),
            });
        }
        // the short id alone is the tag when no environment label is set
        if short.starts_with(['.', '-']) {
            return Err(crate::Error::InvalidInput {
                value: full.to_owned(),
                reason: "an image tag must start with a letter, digit or '_'".to_owned(),
            });
        }

        Ok(Self {
            full: full.to_owned(),
            short,
        })
    }

    pub fn full(&self) -> &str {
        &self.full
    }

    pub fn short(&self) -> &str {
        &self.short
    }
}

impl fmt::Display for CommitRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full)
    }
}
