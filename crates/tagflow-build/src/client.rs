use crate::docker::DockerError;
use crate::executor::{DockerExecutor, RealExecutor};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tagflow_core::ImageSpec;

/// Docker operations client, parameterized over the executor for testability.
pub struct DockerClient<E: DockerExecutor = RealExecutor> {
    executor: E,
}

impl DockerClient<RealExecutor> {
    pub fn new() -> Self {
        Self {
            executor: RealExecutor,
        }
    }
}

impl Default for DockerClient<RealExecutor> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: DockerExecutor> DockerClient<E> {
    pub fn with_executor(executor: E) -> Self {
        Self { executor }
    }

    /// Docker client version, e.g. `27.3.1`.
    pub async fn version(&self) -> Result<String, DockerError> {
        let out = self
            .executor
            .exec(&args(["version", "--format", "{{.Client.Version}}"]))
            .await?;
        Ok(out.trim().to_owned())
    }

    // ── Registry ──

    /// Log in to the registry, passing the token on stdin.
    pub async fn login(
        &self,
        host: Option<&str>,
        user: &str,
        token: &SecretString,
    ) -> Result<(), DockerError> {
        let mut cmd = args(["login", "--username", user, "--password-stdin"]);
        if let Some(host) = host {
            cmd.push(host.to_owned());
        }

        self.executor
            .exec_with_stdin(&cmd, token.expose_secret().as_bytes())
            .await?;
        Ok(())
    }

    pub async fn push(&self, reference: &str) -> Result<(), DockerError> {
        self.executor.exec(&args(["push", reference])).await?;
        Ok(())
    }

    /// Config digests of the remote image behind `reference`, or `None` if
    /// the tag does not exist. Multi-platform tags yield one digest per
    /// platform.
    pub async fn remote_digests(&self, reference: &str) -> Result<Option<Vec<String>>, DockerError> {
        let cmd = args(["manifest", "inspect", "--verbose", reference]);
        let result = self.executor.exec(&cmd).await;
        match result {
            Ok(json) => parse_config_digests(&json)
                .map(Some)
                .map_err(|e| DockerError::UnexpectedOutput {
                    args: cmd,
                    source: e,
                }),
            Err(e) if e.is_missing_manifest() => {
                tracing::debug!(%reference, error = %e, "remote tag does not exist");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    // ── Local images ──

    /// Build one image and apply every reference in `references` to it.
    pub async fn build(&self, spec: &ImageSpec, references: &[String]) -> Result<(), DockerError> {
        let mut cmd = args(["build", "--file"]);
        cmd.push(spec.dockerfile.to_string_lossy().into_owned());
        for reference in references {
            cmd.push("--tag".to_owned());
            cmd.push(reference.clone());
        }
        cmd.push(spec.context.to_string_lossy().into_owned());

        self.executor.exec(&cmd).await?;
        Ok(())
    }

    /// Local image id (config digest) of `reference`.
    pub async fn image_id(&self, reference: &str) -> Result<String, DockerError> {
        let out = self
            .executor
            .exec(&args(["image", "inspect", "--format", "{{.Id}}", reference]))
            .await?;
        Ok(out.trim().to_owned())
    }
}

// ── Helper ──

fn args<const N: usize>(a: [&str; N]) -> Vec<String> {
    a.iter().map(|s| (*s).to_owned()).collect()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ManifestInspect {
    List(Vec<ManifestEntry>),
    Single(ManifestEntry),
}

#[derive(Deserialize)]
struct ManifestEntry {
    #[serde(rename = "SchemaV2Manifest")]
    schema_v2: Option<ImageManifest>,
    #[serde(rename = "OCIManifest")]
    oci: Option<ImageManifest>,
}

#[derive(Deserialize)]
struct ImageManifest {
    config: Descriptor,
}

#[derive(Deserialize)]
struct Descriptor {
    digest: String,
}

/// Extract image config digests from `docker manifest inspect --verbose` output.
pub fn parse_config_digests(json: &str) -> Result<Vec<String>, serde_json::Error> {
    let entries = match serde_json::from_str::<ManifestInspect>(json)? {
        ManifestInspect::List(entries) => entries,
        ManifestInspect::Single(entry) => vec![entry],
    };

    Ok(entries
        .into_iter()
        .filter_map(|e| e.schema_v2.or(e.oci))
        .map(|m| m.config.digest)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_platform_manifest() {
        let json = r#"{
            "Ref": "docker.io/someuser/vprofileapp2:prod-a1b2c3d",
            "Descriptor": {"mediaType": "application/vnd.docker.distribution.manifest.v2+json"},
            "SchemaV2Manifest": {
                "schemaVersion": 2,
                "config": {"mediaType": "application/vnd.docker.container.image.v1+json", "size": 7023, "digest": "sha256:aaa"},
                "layers": []
            }
        }"#;
        assert_eq!(parse_config_digests(json).unwrap(), vec!["sha256:aaa"]);
    }

    #[test]
    fn parses_multi_platform_manifest_list() {
        let json = r#"[
            {"Ref": "r1", "SchemaV2Manifest": {"config": {"digest": "sha256:amd"}}},
            {"Ref": "r2", "OCIManifest": {"config": {"digest": "sha256:arm"}}}
        ]"#;
        assert_eq!(
            parse_config_digests(json).unwrap(),
            vec!["sha256:amd", "sha256:arm"]
        );
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_config_digests("not json").is_err());
    }
}
