use std::collections::HashMap;

use anyhow::{Context, Result};
use regex::Regex;
use serde_yaml::Value;
use std::sync::OnceLock;

use crate::model::{DependencyGraph, Edge, EdgeKind, Node, NodeKind, SourceLocation};

use super::flow::{self, JobScripts};

/// Top-level keys in a `.gitlab-ci.yml` that are never job definitions.
const RESERVED_KEYWORDS: &[&str] = &[
    "image", "services", "stages", "before_script", "after_script", "variables", "cache", "default",
    "include", "workflow", "pages",
];

fn tf_command_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(terraform|terragrunt)\s+(init|plan|apply|destroy|output|validate|show)\b").unwrap())
}

fn helm_command_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^helm(file)?\s+(install|upgrade|template|uninstall|lint)\b").unwrap())
}

/// Fields extracted from a Helm CLI invocation line (spec §4.1).
#[derive(Debug, Clone, Default)]
pub struct HelmInvocation {
    pub release_name: Option<String>,
    pub chart: Option<String>,
    pub namespace: Option<String>,
    pub values_files: Vec<String>,
    pub atomic: bool,
    pub wait: bool,
    pub dry_run: bool,
    pub install: bool,
}

/// Parse a `helm ...` script line into its components.
pub fn parse_helm_invocation(line: &str) -> Option<HelmInvocation> {
    if !helm_command_re().is_match(line.trim()) {
        return None;
    }
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let mut invocation = HelmInvocation::default();
    let mut positional = Vec::new();
    let mut i = 0usize;
    while i < tokens.len() {
        let tok = tokens[i];
        match tok {
            "-n" | "--namespace" => {
                i += 1;
                invocation.namespace = tokens.get(i).map(|s| s.to_string());
            }
            "-f" | "--values" => {
                i += 1;
                if let Some(v) = tokens.get(i) {
                    invocation.values_files.push(v.to_string());
                }
            }
            "--atomic" => invocation.atomic = true,
            "--wait" => invocation.wait = true,
            "--dry-run" => invocation.dry_run = true,
            "--install" => invocation.install = true,
            t if !t.starts_with('-') => positional.push(t),
            _ => {}
        }
        i += 1;
    }
    // positional[0] == "helm", positional[1] == subcommand, then release/chart
    if positional.len() >= 3 {
        invocation.release_name = Some(positional[2].to_string());
    }
    if positional.len() >= 4 {
        invocation.chart = Some(positional[3].to_string());
    }
    Some(invocation)
}

/// Classify a single script line: does it invoke Terraform/Terragrunt or Helm?
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptToolUse {
    Terraform,
    Helm,
    None,
}

pub fn classify_script_line(line: &str) -> ScriptToolUse {
    let trimmed = line.trim();
    if tf_command_re().is_match(trimmed) {
        ScriptToolUse::Terraform
    } else if helm_command_re().is_match(trimmed) {
        ScriptToolUse::Helm
    } else {
        ScriptToolUse::None
    }
}

struct ParsedJob {
    id: String,
    stage: String,
    needs: Vec<String>,
    extends: Vec<String>,
    scripts: Vec<String>,
    uploads_artifacts: bool,
    start_line: u32,
}

/// Run GitLab-CI detection over one pipeline YAML file, adding a pipeline
/// node, one stage node per declared stage, one job node per job, and the
/// edges described in spec §4.1.
pub fn detect_file(content: &str, file: &str, graph: &mut DependencyGraph) -> Result<()> {
    let yaml: Value = serde_yaml::from_str(content).context("failed to parse GitLab CI YAML")?;
    let mapping = yaml.as_mapping().context("GitLab CI config must be a YAML mapping")?;

    let pipeline_id = format!("gitlab_pipeline.{file}");
    graph.add_node(Node::new(
        pipeline_id.clone(),
        file,
        NodeKind::GitlabPipeline,
        SourceLocation::point(file, 1),
    ));

    let stages = parse_stages(&yaml);
    for (idx, stage) in stages.iter().enumerate() {
        let stage_id = format!("gitlab_stage.{file}.{stage}");
        graph.add_node(
            Node::new(stage_id.clone(), stage, NodeKind::GitlabStage, SourceLocation::point(file, 1))
                .with_attribute("order", idx as i64),
        );
    }
    for window in stages.windows(2) {
        let (a, b) = (&window[0], &window[1]);
        let from = format!("gitlab_stage.{file}.{a}");
        let to = format!("gitlab_stage.{file}.{b}");
        graph.add_edge(Edge::new(from, to, EdgeKind::GitlabStageOrder, 100));
    }

    if let Some(includes) = yaml.get("include") {
        for target in parse_includes(includes) {
            let include_id = format!("external_reference.include.{target}");
            graph.add_node(Node::new(
                include_id.clone(),
                &target,
                NodeKind::ExternalReference,
                SourceLocation::point(file, 1),
            ));
            graph.add_edge(Edge::new(pipeline_id.clone(), include_id, EdgeKind::GitlabIncludes, 100));
        }
    }

    let mut jobs = Vec::new();
    for (key, value) in mapping {
        let Some(key_str) = key.as_str() else { continue };
        if RESERVED_KEYWORDS.contains(&key_str) || key_str.starts_with('.') || !value.is_mapping() {
            continue;
        }
        jobs.push(parse_job(key_str, value));
    }

    for job in &jobs {
        let job_id = format!("gitlab_job.{file}.{}", job.id);
        let node = Node::new(job_id.clone(), &job.id, NodeKind::GitlabJob, SourceLocation::point(file, job.start_line))
            .with_attribute("stage", job.stage.clone());
        graph.add_node(node);

        let stage_id = format!("gitlab_stage.{file}.{}", job.stage);
        if graph.contains(&stage_id) {
            graph.add_edge(Edge::new(job_id.clone(), stage_id, EdgeKind::GitlabStageOrder, 90).implicit());
        }

        for need in &job.needs {
            let need_id = format!("gitlab_job.{file}.{need}");
            if graph.contains(&need_id) {
                graph.add_edge(Edge::new(job_id.clone(), need_id, EdgeKind::GitlabNeeds, 100));
            }
        }
        for template in &job.extends {
            let template_id = format!("gitlab_job.{file}.{template}");
            graph.add_edge(Edge::new(job_id.clone(), template_id, EdgeKind::GitlabExtends, 90));
        }

        let mut uses_tf = false;
        let mut uses_helm = false;
        for script in &job.scripts {
            match classify_script_line(script) {
                ScriptToolUse::Terraform => uses_tf = true,
                ScriptToolUse::Helm => uses_helm = true,
                ScriptToolUse::None => {}
            }
        }
        if uses_tf {
            graph.add_edge(Edge::new(job_id.clone(), job_id.clone(), EdgeKind::GitlabUsesTf, 100).implicit());
        }
        if uses_helm {
            graph.add_edge(Edge::new(job_id.clone(), job_id.clone(), EdgeKind::GitlabUsesHelm, 100).implicit());
        }
    }

    // gitlab_artifact_flow: producer job -> consumer job sharing a needs/dependencies
    // relationship, restricted to producers that actually declare artifacts (spec §4.1 —
    // a `needs` used purely for stage ordering shares no artifacts).
    let artifact_producers: HashMap<&str, bool> = jobs.iter().map(|j| (j.id.as_str(), j.uploads_artifacts)).collect();
    for job in &jobs {
        let job_id = format!("gitlab_job.{file}.{}", job.id);
        for need in &job.needs {
            if !artifact_producers.get(need.as_str()).copied().unwrap_or(false) {
                continue;
            }
            let producer_id = format!("gitlab_job.{file}.{need}");
            if graph.contains(&producer_id) {
                graph.add_edge(Edge::new(producer_id, job_id.clone(), EdgeKind::GitlabArtifactFlow, 70).implicit());
            }
        }
    }

    detect_tf_helm_flows(&jobs, file, graph);

    Ok(())
}

/// Run the four TF->Helm flow detectors over this pipeline's jobs and emit a
/// `FEEDS_INTO` edge per surviving flow (spec §4.1). The source/target ids a
/// flow names (a terraform output, a helm value path) may not have been
/// registered as nodes by any other detector in this scan; they're created
/// on demand here, the same way `gitlab_includes`' targets are above.
fn detect_tf_helm_flows(jobs: &[ParsedJob], file: &str, graph: &mut DependencyGraph) {
    let job_scripts: Vec<JobScripts> = jobs
        .iter()
        .map(|job| JobScripts {
            job_id: job.id.clone(),
            scripts: job.scripts.clone(),
            needs: job.needs.clone(),
            uploads_artifacts: job.uploads_artifacts,
            downloads_artifacts: !job.needs.is_empty(),
        })
        .collect();

    let (flows, dropped) = flow::detect_flows(&job_scripts, 50.0, 200, flow::ScorerWeights::default());
    if dropped > 0 {
        tracing::warn!(file, dropped, "TF->Helm flows dropped by the max_flows cap");
    }

    let now = chrono::Utc::now().to_rfc3339();
    for scored in &flows {
        for id in [&scored.flow.source_output, &scored.flow.target_value_path] {
            if !graph.contains(id) {
                graph.add_node(Node::new(id.clone(), id.as_str(), NodeKind::ExternalReference, SourceLocation::point(file, 1)));
            }
        }
        graph.add_edge(flow::flow_to_edge(scored, "gitlab", &now));
    }
}

fn parse_stages(yaml: &Value) -> Vec<String> {
    yaml.get("stages")
        .and_then(|v| v.as_sequence())
        .map(|seq| seq.iter().filter_map(|v| v.as_str().map(String::from)).collect())
        .unwrap_or_else(|| vec!["build".to_string(), "test".to_string(), "deploy".to_string()])
}

fn parse_includes(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => vec![s.clone()],
        Value::Sequence(seq) => seq
            .iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s.clone()),
                Value::Mapping(_) => v
                    .get("local")
                    .or_else(|| v.get("project"))
                    .or_else(|| v.get("remote"))
                    .and_then(|x| x.as_str())
                    .map(String::from),
                _ => None,
            })
            .collect(),
        Value::Mapping(_) => value
            .get("local")
            .or_else(|| value.get("project"))
            .and_then(|x| x.as_str())
            .map(|s| vec![s.to_string()])
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

fn parse_job(job_id: &str, config: &Value) -> ParsedJob {
    let stage = config.get("stage").and_then(|v| v.as_str()).unwrap_or("test").to_string();
    let needs = config.get("needs").map(parse_needs).unwrap_or_default();
    let extends = config
        .get("extends")
        .map(|v| match v {
            Value::String(s) => vec![s.clone()],
            Value::Sequence(seq) => seq.iter().filter_map(|x| x.as_str().map(String::from)).collect(),
            _ => Vec::new(),
        })
        .unwrap_or_default();

    let mut scripts = Vec::new();
    for key in ["before_script", "script", "after_script"] {
        if let Some(seq) = config.get(key).and_then(|v| v.as_sequence()) {
            for cmd in seq {
                if let Some(s) = cmd.as_str() {
                    scripts.push(s.to_string());
                }
            }
        }
    }

    let uploads_artifacts = config.get("artifacts").is_some();
    ParsedJob { id: job_id.to_string(), stage, needs, extends, scripts, uploads_artifacts, start_line: 1 }
}

fn parse_needs(needs: &Value) -> Vec<String> {
    match needs {
        Value::Sequence(seq) => seq
            .iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s.clone()),
                Value::Mapping(_) => v.get("job").and_then(|x| x.as_str()).map(String::from),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PIPELINE: &str = r#"
stages:
  - plan
  - deploy

terraform_plan:
  stage: plan
  script:
    - terraform init
    - terraform plan -out=tfplan

helm_deploy:
  stage: deploy
  needs: ["terraform_plan"]
  script:
    - helm upgrade myrelease ./chart -n prod --atomic -f values.yaml
"#;

    #[test]
    fn builds_pipeline_stage_and_job_nodes() {
        let mut graph = DependencyGraph::new("scan-1");
        detect_file(PIPELINE, ".gitlab-ci.yml", &mut graph).unwrap();
        assert!(graph.contains("gitlab_pipeline..gitlab-ci.yml"));
        assert!(graph.contains("gitlab_stage..gitlab-ci.yml.plan"));
        assert!(graph.contains("gitlab_job..gitlab-ci.yml.terraform_plan"));
    }

    #[test]
    fn stage_order_edge_connects_consecutive_stages() {
        let mut graph = DependencyGraph::new("scan-1");
        detect_file(PIPELINE, ".gitlab-ci.yml", &mut graph).unwrap();
        let edges: Vec<_> = graph.outgoing("gitlab_stage..gitlab-ci.yml.plan").collect();
        assert!(edges.iter().any(|e| e.kind == EdgeKind::GitlabStageOrder && e.target.ends_with("deploy")));
    }

    #[test]
    fn needs_edge_and_tool_use_flags_are_detected() {
        let mut graph = DependencyGraph::new("scan-1");
        detect_file(PIPELINE, ".gitlab-ci.yml", &mut graph).unwrap();
        let deploy_job = "gitlab_job..gitlab-ci.yml.helm_deploy";
        let edges: Vec<_> = graph.outgoing(deploy_job).collect();
        assert!(edges.iter().any(|e| e.kind == EdgeKind::GitlabNeeds));
        assert!(edges.iter().any(|e| e.kind == EdgeKind::GitlabUsesHelm));

        let plan_job = "gitlab_job..gitlab-ci.yml.terraform_plan";
        let edges: Vec<_> = graph.outgoing(plan_job).collect();
        assert!(edges.iter().any(|e| e.kind == EdgeKind::GitlabUsesTf));
    }

    #[test]
    fn direct_output_flow_produces_feeds_into_edge() {
        let pipeline = r#"
stages:
  - deploy

deploy:
  stage: deploy
  script:
    - helm upgrade app ./chart --set image.tag=$(terraform output -raw image_tag)
"#;
        let mut graph = DependencyGraph::new("scan-1");
        detect_file(pipeline, ".gitlab-ci.yml", &mut graph).unwrap();
        assert!(graph.contains("output.image_tag"));
        let edges: Vec<_> = graph.outgoing("output.image_tag").collect();
        let feed = edges.iter().find(|e| e.kind == EdgeKind::FeedsInto).expect("a FEEDS_INTO edge");
        assert_eq!(feed.target, "image.tag");
        assert!(feed.confidence >= 90);
    }

    #[test]
    fn artifact_flow_edge_requires_producer_to_declare_artifacts() {
        let pipeline = r#"
stages:
  - build
  - deploy

build:
  stage: build
  script:
    - echo building
  artifacts:
    paths:
      - dist/

lint:
  stage: build
  script:
    - echo linting

deploy:
  stage: deploy
  needs: ["build", "lint"]
  script:
    - echo deploying
"#;
        let mut graph = DependencyGraph::new("scan-1");
        detect_file(pipeline, ".gitlab-ci.yml", &mut graph).unwrap();
        let deploy_job = "gitlab_job..gitlab-ci.yml.deploy";
        let incoming: Vec<_> = graph.edges().iter().filter(|e| e.target == deploy_job && e.kind == EdgeKind::GitlabArtifactFlow).collect();
        assert_eq!(incoming.len(), 1);
        assert_eq!(incoming[0].source, "gitlab_job..gitlab-ci.yml.build");
    }

    #[test]
    fn parses_helm_invocation_components() {
        let invocation = parse_helm_invocation("helm upgrade myrelease ./chart -n prod --atomic -f values.yaml").unwrap();
        assert_eq!(invocation.release_name.as_deref(), Some("myrelease"));
        assert_eq!(invocation.chart.as_deref(), Some("./chart"));
        assert_eq!(invocation.namespace.as_deref(), Some("prod"));
        assert_eq!(invocation.values_files, vec!["values.yaml"]);
        assert!(invocation.atomic);
    }

    #[test]
    fn classifies_terraform_and_helm_lines() {
        assert_eq!(classify_script_line("terraform apply -auto-approve"), ScriptToolUse::Terraform);
        assert_eq!(classify_script_line("helm install myrelease ./chart"), ScriptToolUse::Helm);
        assert_eq!(classify_script_line("echo hello"), ScriptToolUse::None);
    }
}
