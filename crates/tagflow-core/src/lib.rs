//! Core types and configuration for tagflow.
//!
//! This crate defines the `tagflow.toml` schema ([`TagflowConfig`]), the
//! commit-derived tag model ([`CommitRef`], [`TagPair`]), the three fixed
//! image and manifest records ([`ImageSpec`], [`ManifestTarget`]), and shared
//! error types.
//!
//! # Tag propagation
//!
//! ```text
//! commit a1b2c3d4e5f6...
//!   └─ CommitRef::parse ── short id "a1b2c3d"
//!        └─ TagPair::derive(env = "prod")
//!             ├─ mutable    prod-latest
//!             └─ immutable  prod-a1b2c3d
//! ```

pub mod commit;
pub mod config;
pub mod credentials;
pub mod error;
pub mod image;

pub use commit::{CommitRef, SHORT_ID_LEN};
pub use config::{
    EditMode, GitopsConfig, ImageConfig, ImagesConfig, ImmutableTagPolicy, PipelineConfig,
    RegistryConfig, TagflowConfig, CONFIG_FILE_NAME,
};
pub use credentials::Credentials;
pub use error::{Error, Result};
pub use image::{EnvLabel, ImageKind, ImageSpec, ManifestTarget, TagClass, TagPair};
