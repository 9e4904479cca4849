//! Image build and push orchestration for tagflow.
//!
//! # Publish pipeline
//!
//! ```text
//! tagflow build
//!   0. Login      ── docker login --password-stdin (when REGISTRY_TOKEN is set)
//!   1. Fan-out    ── one publisher per image, joined with tokio::join!
//!        a. Build       ── docker build --tag {immutable} --tag {mutable}
//!        b. Inspect     ── docker image inspect / docker manifest inspect
//!        c. Immutable   ── push unless the remote tag already holds this image
//!        d. Mutable     ── push {prefix}latest
//!   2. Fan-in     ── PublishReport::into_published() (all three or nothing)
//! ```

pub mod client;
pub mod docker;
pub mod executor;
pub mod publish;

pub use client::DockerClient;
pub use docker::DockerError;
pub use executor::{DockerExecutor, RealExecutor};
pub use publish::{
    error_chain, ImageOutcome, ImmutablePush, PublishError, PublishReport, PublishSettings,
    PublishedImage, PublishedImages, Publisher, ReleaseIncomplete,
};
