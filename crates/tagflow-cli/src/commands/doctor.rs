use std::fmt;
use std::path::Path;
use tagflow_build::{DockerClient, error_chain};
use tagflow_core::{CONFIG_FILE_NAME, Credentials, TagflowConfig};
use tagflow_gitops::GitClient;

#[derive(Debug, Clone)]
struct CheckResult {
    name: &'static str,
    passed: bool,
    detail: String,
}

impl CheckResult {
    fn ok(name: &'static str, detail: &str) -> Self {
        Self {
            name,
            passed: true,
            detail: detail.to_owned(),
        }
    }

    fn fail(name: &'static str, detail: &str) -> Self {
        Self {
            name,
            passed: false,
            detail: detail.to_owned(),
        }
    }

    fn icon(&self) -> &'static str {
        if self.passed { "OK" } else { "NG" }
    }
}

#[derive(Debug, Default)]
struct DoctorReport {
    checks: Vec<CheckResult>,
}

impl DoctorReport {
    fn all_passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }
}

impl fmt::Display for DoctorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "tagflow doctor")?;
        writeln!(f)?;
        for check in &self.checks {
            writeln!(f, "  {}  {:<16} {}", check.icon(), check.name, check.detail)?;
        }
        Ok(())
    }
}

/// Check tools, configuration and credentials.
pub async fn doctor() -> anyhow::Result<()> {
    let mut checks = Vec::new();

    checks.push(match DockerClient::new().version().await {
        Ok(version) => CheckResult::ok("docker", &format!("Docker {version}")),
        Err(e) => CheckResult::fail("docker", &error_chain(&e)),
    });

    checks.push(match GitClient::new(None).version(Path::new(".")).await {
        Ok(version) => CheckResult::ok("git", &version),
        Err(e) => CheckResult::fail("git", &error_chain(&e)),
    });

    match super::load_config() {
        Ok(config) => {
            let source = if Path::new(CONFIG_FILE_NAME).exists() {
                CONFIG_FILE_NAME.to_owned()
            } else {
                format!("{CONFIG_FILE_NAME} not found, using defaults")
            };
            checks.push(CheckResult::ok("config", &source));
            checks.extend(config_checks(&config));
        }
        Err(e) => checks.push(CheckResult::fail("config", &format!("{e:#}"))),
    }

    checks.extend(credential_checks(&Credentials::from_env()));

    let report = DoctorReport { checks };
    println!();
    println!("{report}");

    if !report.all_passed() {
        anyhow::bail!("some checks failed — see above for details");
    }

    Ok(())
}

fn config_checks(config: &TagflowConfig) -> Vec<CheckResult> {
    let mut checks = Vec::new();

    checks.push(match config.registry.namespace() {
        Ok(namespace) => CheckResult::ok("registry", &namespace),
        Err(e) => CheckResult::fail("registry", &e.to_string()),
    });

    checks.push(match config.gitops.require_repo_url() {
        Ok(url) => CheckResult::ok(
            "gitops",
            &format!("{url} ({branch})", branch = config.gitops.branch),
        ),
        Err(e) => CheckResult::fail("gitops", &e.to_string()),
    });

    let environment = match config.pipeline.environment.as_deref() {
        Some(env) if !env.trim().is_empty() => format!("{env} (tags {env}-latest, {env}-<short>)"),
        _ => "none (tags latest, <short>)".to_owned(),
    };
    checks.push(CheckResult::ok("environment", &environment));

    for spec in config.image_specs() {
        let check = if spec.dockerfile.is_file() {
            CheckResult::ok("image", &format!("{} ({})", spec.kind, spec.dockerfile.display()))
        } else {
            CheckResult::fail(
                "image",
                &format!("{}: {} not found", spec.kind, spec.dockerfile.display()),
            )
        };
        checks.push(check);
    }

    checks
}

fn credential_checks(credentials: &Credentials) -> Vec<CheckResult> {
    let registry = if credentials.registry_token.is_some() {
        "REGISTRY_TOKEN set"
    } else {
        "REGISTRY_TOKEN not set — using existing docker login"
    };
    let gitops = if credentials.gitops_token.is_some() {
        "GITOPS_TOKEN set"
    } else {
        "GITOPS_TOKEN not set — using git credential helpers"
    };

    vec![
        CheckResult::ok("registry token", registry),
        CheckResult::ok("gitops token", gitops),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    #[test]
    fn missing_settings_fail() {
        let checks = config_checks(&TagflowConfig::default());
        let registry = checks.iter().find(|c| c.name == "registry").unwrap();
        let gitops = checks.iter().find(|c| c.name == "gitops").unwrap();
        assert!(!registry.passed);
        assert!(registry.detail.contains("REGISTRY_USER"));
        assert!(!gitops.passed);
        assert!(gitops.detail.contains("GITOPS_REPO_URL"));
    }

    #[test]
    fn configured_settings_pass() {
        let mut config = TagflowConfig::default();
        config.registry.user = Some("someuser".into());
        config.gitops.repo_url = Some("https://github.com/someuser/gitops.git".into());
        config.pipeline.environment = Some("prod".into());

        let checks = config_checks(&config);
        let by_name = |name| checks.iter().find(|c| c.name == name).unwrap();
        assert!(by_name("registry").passed);
        assert!(by_name("gitops").detail.ends_with("(main)"));
        assert!(by_name("environment").detail.starts_with("prod"));
    }

    #[test]
    fn credential_checks_never_show_secrets() {
        let credentials = Credentials {
            registry_token: Some(SecretString::from("dckr_pat_xyz".to_owned())),
            gitops_token: None,
        };
        let report = DoctorReport {
            checks: credential_checks(&credentials),
        };
        let text = report.to_string();
        assert!(!text.contains("dckr_pat_xyz"));
        assert!(text.contains("REGISTRY_TOKEN set"));
        assert!(report.all_passed());
    }

    #[test]
    fn report_renders_ok_and_ng() {
        let report = DoctorReport {
            checks: vec![
                CheckResult::ok("docker", "Docker 27.3.1"),
                CheckResult::fail("git", "git CLI not found"),
            ],
        };
        let text = report.to_string();
        assert!(text.contains("  OK  docker"));
        assert!(text.contains("  NG  git"));
        assert!(!report.all_passed());
    }
}
