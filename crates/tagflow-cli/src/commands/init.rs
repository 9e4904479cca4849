use std::path::Path;
use tagflow_core::CONFIG_FILE_NAME;

const TAGFLOW_TOML: &str = r#"[registry]
# user = "someuser"            # or REGISTRY_USER
# host = "ghcr.io"             # omit for Docker Hub, or REGISTRY_HOST

[pipeline]
# environment = "prod"         # tag prefix: prod-latest / prod-a1b2c3d, or TAGFLOW_ENV
# timeout_secs = 3600
# immutable_tags = "reject"    # reject | warn | overwrite

[gitops]
# repo_url = "https://github.com/someuser/vprofile-gitops.git"   # or GITOPS_REPO_URL
# branch = "main"              # or GITOPS_BRANCH
# max_push_attempts = 3
# edit_mode = "structural"     # structural | line
# author_name = "tagflow"
# author_email = "tagflow@users.noreply.github.com"

# Each section replaces the whole default record for that image.
#
# [images.database]
# context = "Docker-files/db"
# repository = "vprofiledb2"
# manifest = "kubernetes/vpro-app/vprodbdep.yml"
# container = "vprodb"
#
# [images.application]
# context = "Docker-files/app"
# repository = "vprofileapp2"
# manifest = "kubernetes/vpro-app/vproappdep.yml"
# container = "vproapp"
#
# [images.web]
# context = "Docker-files/web"
# dockerfile = "Docker-files/web/Dockerfile"
# repository = "vprofileweb2"
# manifest = "kubernetes/vpro-app/vprowebdep.yml"
# container = "vproweb"
"#;

const ENV_EXAMPLE: &str = r#"REGISTRY_USER=someuser
REGISTRY_TOKEN=your-registry-access-token
GITOPS_REPO_URL=https://github.com/someuser/vprofile-gitops.git
GITOPS_TOKEN=your-gitops-write-token
# TAGFLOW_ENV=prod
"#;

/// Write a commented tagflow.toml and .env.example, skipping existing files.
pub fn init_project() -> anyhow::Result<()> {
    let mut created = Vec::new();

    for (name, content) in [(CONFIG_FILE_NAME, TAGFLOW_TOML), (".env.example", ENV_EXAMPLE)] {
        let path = Path::new(name);
        if path.exists() {
            eprintln!("{name} already exists, skipping");
        } else {
            std::fs::write(path, content)?;
            created.push(name);
        }
    }

    if created.is_empty() {
        println!("Nothing to create — already initialized.");
    } else {
        for f in &created {
            println!("Created {f}");
        }
    }

    println!();
    println!("Next steps:");
    println!();
    println!("  1. Configure credentials:");
    println!("     cp .env.example .env");
    println!();
    println!("  2. Check the setup:");
    println!("     tagflow doctor");
    println!();
    println!("  3. Preview a release:");
    println!("     tagflow plan");
    println!();
    println!("  4. Release:");
    println!("     tagflow run");

    Ok(())
}
