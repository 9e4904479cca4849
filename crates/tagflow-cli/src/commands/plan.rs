use serde::Serialize;
use tagflow_core::{CommitRef, TagPair, TagflowConfig};

#[derive(Debug, Serialize)]
struct Plan {
    commit: String,
    short: String,
    environment: Option<String>,
    gitops_repo: Option<String>,
    gitops_branch: String,
    images: Vec<PlannedImage>,
}

#[derive(Debug, Serialize)]
struct PlannedImage {
    kind: &'static str,
    context: String,
    dockerfile: String,
    immutable: String,
    mutable: String,
    manifest: String,
    container: String,
}

/// Print what a run would build, push and rewrite. Nothing is executed.
pub async fn plan(commit: Option<&str>, json: bool) -> anyhow::Result<()> {
    let config = super::load_config()?;
    let commit = super::resolve_commit(commit).await?;
    let plan = build_plan(&config, &commit)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        print!("{}", render(&plan));
    }

    Ok(())
}

fn build_plan(config: &TagflowConfig, commit: &CommitRef) -> anyhow::Result<Plan> {
    let namespace = config.registry.namespace()?;
    let env = config.env_label()?;
    let tags = TagPair::derive(env.as_ref(), commit);

    let images = config
        .image_specs()
        .into_iter()
        .zip(config.manifest_targets())
        .map(|(spec, target)| PlannedImage {
            kind: spec.kind.as_str(),
            context: spec.context.display().to_string(),
            dockerfile: spec.dockerfile.display().to_string(),
            immutable: spec.reference(&namespace, tags.immutable()),
            mutable: spec.reference(&namespace, tags.mutable()),
            manifest: target.path.display().to_string(),
            container: target.container,
        })
        .collect();

    Ok(Plan {
        commit: commit.full().to_owned(),
        short: commit.short().to_owned(),
        environment: env.map(|e| e.as_str().to_owned()),
        gitops_repo: config.gitops.repo_url.clone(),
        gitops_branch: config.gitops.branch.clone(),
        images,
    })
}

fn render(plan: &Plan) -> String {
    let mut out = match &plan.environment {
        Some(env) => format!("Plan for commit {} (environment {env})\n\n", plan.short),
        None => format!("Plan for commit {}\n\n", plan.short),
    };

    for image in &plan.images {
        out.push_str(&format!(
            "  {:<12} {}\n  {:<12} + {}\n  {:<12} build {} ({})\n  {:<12} pin   {} [{}]\n\n",
            image.kind,
            image.immutable,
            "",
            image.mutable,
            "",
            image.context,
            image.dockerfile,
            "",
            image.manifest,
            image.container,
        ));
    }

    match &plan.gitops_repo {
        Some(repo) => out.push_str(&format!("GitOps: {repo} ({})\n", plan.gitops_branch)),
        None => out.push_str("GitOps: gitops.repo_url not set\n"),
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario_a() -> Plan {
        let mut config = TagflowConfig::default();
        config.registry.user = Some("someuser".to_owned());
        config.pipeline.environment = Some("prod".to_owned());
        let commit = CommitRef::parse("a1b2c3d4e5f60718293a4b5c6d7e8f9012345678").unwrap();
        build_plan(&config, &commit).unwrap()
    }

    #[test]
    fn plan_lists_images_in_fixed_order() {
        let plan = scenario_a();
        let kinds: Vec<_> = plan.images.iter().map(|i| i.kind).collect();
        assert_eq!(kinds, vec!["database", "application", "web"]);
    }

    #[test]
    fn plan_derives_scenario_a_references() {
        let plan = scenario_a();
        let app = &plan.images[1];
        assert_eq!(app.immutable, "someuser/vprofileapp2:prod-a1b2c3d");
        assert_eq!(app.mutable, "someuser/vprofileapp2:prod-latest");
        assert_eq!(app.manifest, "kubernetes/vpro-app/vproappdep.yml");
        assert_eq!(app.container, "vproapp");
    }

    #[test]
    fn plan_requires_registry_user() {
        let config = TagflowConfig::default();
        let commit = CommitRef::parse("a1b2c3d4e5f6").unwrap();
        let err = build_plan(&config, &commit).unwrap_err();
        assert!(err.to_string().contains("REGISTRY_USER"));
    }

    #[test]
    fn render_mentions_every_manifest() {
        let text = render(&scenario_a());
        assert!(text.starts_with("Plan for commit a1b2c3d (environment prod)"));
        assert!(text.contains("vprodbdep.yml [vprodb]"));
        assert!(text.contains("vproappdep.yml [vproapp]"));
        assert!(text.contains("vprowebdep.yml [vproweb]"));
        assert!(text.contains("gitops.repo_url not set"));
    }

    #[test]
    fn plan_serializes_to_json() {
        let json = serde_json::to_value(scenario_a()).unwrap();
        assert_eq!(json["short"], "a1b2c3d");
        assert_eq!(json["images"][2]["immutable"], "someuser/vprofileweb2:prod-a1b2c3d");
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn every_image_pins_the_same_commit_tag(
                sha in "[0-9a-f]{40}",
                env in "[a-z][a-z0-9]{0,9}",
            ) {
                let mut config = TagflowConfig::default();
                config.registry.user = Some("someuser".to_owned());
                config.pipeline.environment = Some(env.clone());
                let commit = CommitRef::parse(&sha).unwrap();

                let plan = build_plan(&config, &commit).unwrap();
                let suffix = format!(":{env}-{}", &sha[..7]);
                let latest = format!(":{env}-latest");
                prop_assert_eq!(plan.images.len(), 3);
                for image in &plan.images {
                    prop_assert!(image.immutable.ends_with(&suffix));
                    prop_assert!(image.mutable.ends_with(&latest));
                    let repo = image.immutable.trim_end_matches(&suffix);
                    prop_assert!(image.mutable.starts_with(repo));
                }
            }
        }
    }
}
