use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

const FULL_SHA: &str = "a1b2c3d4e5f60718293a4b5c6d7e8f9012345678";

/// `tagflow` in `dir`, isolated from the caller's CI and registry settings.
fn tagflow(dir: &Path) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("tagflow");
    cmd.current_dir(dir);
    for var in [
        "GITHUB_SHA",
        "REGISTRY_USER",
        "REGISTRY_HOST",
        "REGISTRY_TOKEN",
        "GITOPS_REPO_URL",
        "GITOPS_BRANCH",
        "GITOPS_TOKEN",
        "TAGFLOW_ENV",
        "RUST_LOG",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

// ── Help / Version ──

#[test]
fn shows_help() {
    let tmp = TempDir::new().unwrap();
    tagflow(tmp.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("GitOps repository"));
}

#[test]
fn shows_version() {
    let tmp = TempDir::new().unwrap();
    tagflow(tmp.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("tagflow"));
}

// ── Init ──

#[test]
fn init_creates_config_and_env_example() {
    let tmp = TempDir::new().unwrap();

    tagflow(tmp.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Created tagflow.toml"))
        .stdout(predicate::str::contains("Created .env.example"));

    assert!(tmp.path().join("tagflow.toml").exists());
    let env = std::fs::read_to_string(tmp.path().join(".env.example")).unwrap();
    assert!(env.contains("REGISTRY_TOKEN="));
    assert!(env.contains("GITOPS_TOKEN="));
}

#[test]
fn init_skips_existing_files() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("tagflow.toml"), "[registry]\nuser = \"me\"\n").unwrap();

    tagflow(tmp.path())
        .arg("init")
        .assert()
        .success()
        .stderr(predicate::str::contains("tagflow.toml already exists"));

    let content = std::fs::read_to_string(tmp.path().join("tagflow.toml")).unwrap();
    assert_eq!(content, "[registry]\nuser = \"me\"\n");
}

// ── Tag ──

#[test]
fn tag_scenario_a_with_environment() {
    let tmp = TempDir::new().unwrap();
    tagflow(tmp.path())
        .env("TAGFLOW_ENV", "prod")
        .args(["tag", "--commit", FULL_SHA])
        .assert()
        .success()
        .stdout(predicate::str::contains("short id   a1b2c3d"))
        .stdout(predicate::str::contains("mutable    prod-latest"))
        .stdout(predicate::str::contains("immutable  prod-a1b2c3d"));
}

#[test]
fn tag_without_environment() {
    let tmp = TempDir::new().unwrap();
    tagflow(tmp.path())
        .args(["tag", "--commit", FULL_SHA])
        .assert()
        .success()
        .stdout(predicate::str::contains("mutable    latest\n"))
        .stdout(predicate::str::contains("immutable  a1b2c3d\n"));
}

#[test]
fn tag_reads_environment_from_config() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(
        tmp.path().join("tagflow.toml"),
        "[pipeline]\nenvironment = \"staging\"\n",
    )
    .unwrap();

    tagflow(tmp.path())
        .args(["tag", "--commit", FULL_SHA])
        .assert()
        .success()
        .stdout(predicate::str::contains("staging-a1b2c3d"));
}

#[test]
fn tag_uses_github_sha() {
    let tmp = TempDir::new().unwrap();
    tagflow(tmp.path())
        .env("GITHUB_SHA", "0f1e2d3c4b5a69788796a5b4c3d2e1f00f1e2d3c")
        .arg("tag")
        .assert()
        .success()
        .stdout(predicate::str::contains("short id   0f1e2d3"));
}

#[test]
fn tag_falls_back_to_git_head() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path();
    let git = |args: &[&str]| {
        let output = Command::new("git")
            .args(args)
            .current_dir(dir)
            .output()
            .unwrap();
        assert!(output.status.success(), "git {args:?} failed");
        String::from_utf8(output.stdout).unwrap()
    };
    git(&["init", "--quiet"]);
    git(&["config", "user.email", "test@test.com"]);
    git(&["config", "user.name", "Test"]);
    std::fs::write(dir.join("README.md"), "app\n").unwrap();
    git(&["add", "."]);
    git(&["commit", "--quiet", "-m", "init"]);
    let head = git(&["rev-parse", "HEAD"]);

    tagflow(dir)
        .arg("tag")
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("short id   {}", &head[..7])));
}

#[test]
fn tag_rejects_short_commit() {
    let tmp = TempDir::new().unwrap();
    tagflow(tmp.path())
        .args(["tag", "--commit", "abc12"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("expected at least 7 characters"));
}

#[test]
fn tag_rejects_invalid_environment() {
    let tmp = TempDir::new().unwrap();
    tagflow(tmp.path())
        .env("TAGFLOW_ENV", "prod/eu")
        .args(["tag", "--commit", FULL_SHA])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid environment label"));
}

#[test]
fn malformed_config_fails() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(
        tmp.path().join("tagflow.toml"),
        "[pipeline]\nimmutable_tags = \"sometimes\"\n",
    )
    .unwrap();

    tagflow(tmp.path())
        .args(["tag", "--commit", FULL_SHA])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to parse config"));
}

// ── Plan ──

#[test]
fn plan_requires_registry_user() {
    let tmp = TempDir::new().unwrap();
    tagflow(tmp.path())
        .args(["plan", "--commit", FULL_SHA])
        .assert()
        .failure()
        .stderr(predicate::str::contains("REGISTRY_USER"));
}

#[test]
fn plan_scenario_a() {
    let tmp = TempDir::new().unwrap();
    tagflow(tmp.path())
        .env("REGISTRY_USER", "someuser")
        .env("TAGFLOW_ENV", "prod")
        .args(["plan", "--commit", FULL_SHA])
        .assert()
        .success()
        .stdout(predicate::str::contains("someuser/vprofiledb2:prod-a1b2c3d"))
        .stdout(predicate::str::contains("someuser/vprofileapp2:prod-a1b2c3d"))
        .stdout(predicate::str::contains("someuser/vprofileweb2:prod-a1b2c3d"))
        .stdout(predicate::str::contains("+ someuser/vprofileapp2:prod-latest"))
        .stdout(predicate::str::contains("kubernetes/vpro-app/vproappdep.yml [vproapp]"));
}

#[test]
fn plan_json_output() {
    let tmp = TempDir::new().unwrap();
    let output = tagflow(tmp.path())
        .env("REGISTRY_USER", "someuser")
        .env("REGISTRY_HOST", "ghcr.io")
        .args(["plan", "--json", "--commit", FULL_SHA])
        .output()
        .unwrap();
    assert!(output.status.success());

    let plan: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(plan["commit"], FULL_SHA);
    assert_eq!(plan["environment"], serde_json::Value::Null);
    assert_eq!(plan["images"].as_array().unwrap().len(), 3);
    assert_eq!(
        plan["images"][0]["immutable"],
        "ghcr.io/someuser/vprofiledb2:a1b2c3d"
    );
}

// ── Sync / Run guards ──

#[test]
fn sync_requires_gitops_repository() {
    let tmp = TempDir::new().unwrap();
    tagflow(tmp.path())
        .env("REGISTRY_USER", "someuser")
        .args(["sync", "--commit", FULL_SHA])
        .assert()
        .failure()
        .stderr(predicate::str::contains("GITOPS_REPO_URL"));
}

#[test]
fn run_requires_gitops_repository_before_building() {
    let tmp = TempDir::new().unwrap();
    tagflow(tmp.path())
        .env("REGISTRY_USER", "someuser")
        .args(["run", "--commit", FULL_SHA])
        .assert()
        .failure()
        .stderr(predicate::str::contains("GITOPS_REPO_URL"))
        .stdout(predicate::str::contains("Building").not());
}

#[cfg(unix)]
#[test]
fn run_timeout_never_touches_the_gitops_repository() {
    use std::os::unix::fs::PermissionsExt;

    let tmp = TempDir::new().unwrap();
    let work = tmp.path().join("work");
    let bin = tmp.path().join("bin");
    let remote = tmp.path().join("gitops.git");
    std::fs::create_dir_all(&work).unwrap();
    std::fs::create_dir_all(&bin).unwrap();

    // a docker that never finishes building
    let docker = bin.join("docker");
    std::fs::write(&docker, "#!/bin/sh\nexec sleep 30\n").unwrap();
    std::fs::set_permissions(&docker, std::fs::Permissions::from_mode(0o755)).unwrap();

    let status = Command::new("git")
        .args(["init", "--bare", "--quiet"])
        .arg(&remote)
        .status()
        .unwrap();
    assert!(status.success());

    std::fs::write(work.join("tagflow.toml"), "[pipeline]\ntimeout_secs = 1\n").unwrap();
    let path = format!(
        "{}:{}",
        bin.display(),
        std::env::var("PATH").unwrap_or_default()
    );

    tagflow(&work)
        .env("PATH", path)
        .env("REGISTRY_USER", "someuser")
        .env("GITOPS_REPO_URL", remote.to_str().unwrap())
        .args(["run", "--commit", FULL_SHA])
        .timeout(std::time::Duration::from_secs(20))
        .assert()
        .failure()
        .stderr(predicate::str::contains("did not finish within 1s"))
        .stdout(predicate::str::contains("Updating manifests").not());

    let refs = Command::new("git")
        .args(["for-each-ref"])
        .current_dir(&remote)
        .output()
        .unwrap();
    assert!(refs.status.success());
    assert!(refs.stdout.is_empty(), "gitops repository was modified");
}

// ── CI ──

#[test]
fn ci_init_generates_workflow_once() {
    let tmp = TempDir::new().unwrap();

    tagflow(tmp.path())
        .args(["ci", "init"])
        .assert()
        .success()
        .stdout(predicate::str::contains(".github/workflows/tagflow.yml"));

    let workflow =
        std::fs::read_to_string(tmp.path().join(".github/workflows/tagflow.yml")).unwrap();
    assert!(workflow.contains("tagflow run"));

    tagflow(tmp.path())
        .args(["ci", "init"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}
