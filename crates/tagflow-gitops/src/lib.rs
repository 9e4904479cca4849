//! GitOps side of a release.
//!
//! ```text
//! PublishedImages ──► plan ──► clone ──► rewrite ×3 ──► commit ──► push
//!                                            ▲                       │
//!                                            └──── rejected: reset ◄─┘
//! ```
//!
//! A [`ManifestSynchronizer`] can only be driven with a
//! [`tagflow_build::PublishedImages`], which exists once all three images
//! are confirmed in the registry.

mod client;
mod executor;
mod git;
pub mod manifest;
mod sync;

pub use client::{GitClient, authenticated_url};
pub use executor::{GitExecutor, RealExecutor};
pub use git::GitError;
pub use manifest::{ImageEdit, ManifestError, Rewrite};
pub use sync::{
    ManifestSynchronizer, PlannedEdit, SyncError, SyncOutcome, SyncSettings, SyncState,
    commit_message, plan,
};
