use std::path::Path;

const WORKFLOW_PATH: &str = ".github/workflows/tagflow.yml";

/// GitHub Actions secrets the generated workflow reads.
const GH_SECRET_NAMES: &[&str] = &["REGISTRY_TOKEN", "GITOPS_TOKEN"];

/// GitHub Actions variables the generated workflow reads.
const GH_VARIABLE_NAMES: &[&str] = &["REGISTRY_USER", "GITOPS_REPO_URL"];

/// Generate a GitHub Actions workflow that releases every push to main.
pub fn ci_init() -> anyhow::Result<()> {
    let workflow_path = Path::new(WORKFLOW_PATH);
    if workflow_path.exists() {
        anyhow::bail!(
            "Workflow already exists at {WORKFLOW_PATH} — edit it directly, or delete it to re-run ci init"
        );
    }

    if let Some(parent) = workflow_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(workflow_path, generate_workflow_yaml())?;
    println!("Generated: {WORKFLOW_PATH}");

    println!();
    println!("Configure the repository before the first push:");
    println!();
    for name in GH_SECRET_NAMES {
        println!("  gh secret set {name}");
    }
    for name in GH_VARIABLE_NAMES {
        println!("  gh variable set {name} --body <value>");
    }
    println!();
    println!("Push to main -> images built, tagged and pinned in the GitOps repository.");

    Ok(())
}

/// Generate the GitHub Actions workflow yaml content.
fn generate_workflow_yaml() -> String {
    r#"# Generated by: tagflow ci init
name: Release

on:
  push:
    branches: [main]

# one release at a time
concurrency:
  group: tagflow-release
  cancel-in-progress: false

jobs:
  release:
    runs-on: ubuntu-latest
    permissions:
      contents: read
    env:
      REGISTRY_USER: ${{ vars.REGISTRY_USER }}
      REGISTRY_TOKEN: ${{ secrets.REGISTRY_TOKEN }}
      GITOPS_REPO_URL: ${{ vars.GITOPS_REPO_URL }}
      GITOPS_TOKEN: ${{ secrets.GITOPS_TOKEN }}

    steps:
      - uses: actions/checkout@v4

      - name: Install Rust
        uses: dtolnay/rust-toolchain@stable

      - name: Cache tagflow binary
        uses: actions/cache@v4
        with:
          path: ~/.cargo/bin/tagflow
          key: tagflow-cli-${{ runner.os }}

      - name: Install tagflow
        run: |
          if ! command -v tagflow &> /dev/null; then
            cargo install tagflow-cli
          fi

      - name: Release
        run: tagflow run --commit "${{ github.sha }}"
"#
    .to_owned()
}
