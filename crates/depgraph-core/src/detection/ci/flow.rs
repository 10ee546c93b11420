use std::collections::HashMap;

use regex::Regex;
use std::sync::OnceLock;

use crate::model::{Edge, EdgeKind, Evidence, EvidenceType, SourceLocation};

/// One job's script lines, flattened in execution order, plus the jobs it
/// depends on (via `needs`) — the minimal shape the flow detectors need.
#[derive(Debug, Clone)]
pub struct JobScripts {
    pub job_id: String,
    pub scripts: Vec<String>,
    pub needs: Vec<String>,
    pub uploads_artifacts: bool,
    pub downloads_artifacts: bool,
}

/// One of the four TF→Helm flow patterns, in priority order (spec §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowPattern {
    DirectOutput,
    OutputToEnv,
    OutputToFile,
    ArtifactTransfer,
}

impl FlowPattern {
    pub fn base_confidence(&self) -> f64 {
        match self {
            FlowPattern::DirectOutput => 90.0,
            FlowPattern::OutputToEnv => 80.0,
            FlowPattern::OutputToFile => 75.0,
            FlowPattern::ArtifactTransfer => 65.0,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            FlowPattern::DirectOutput => "direct_output",
            FlowPattern::OutputToEnv => "output_to_env",
            FlowPattern::OutputToFile => "output_to_file",
            FlowPattern::ArtifactTransfer => "artifact_transfer",
        }
    }
}

/// A transformation applied to a Terraform output before it reaches Helm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformationKind {
    Direct,
    Jq,
    Yq,
    Sed,
    Unknown,
}

impl TransformationKind {
    fn label(&self) -> &'static str {
        match self {
            TransformationKind::Direct => "direct",
            TransformationKind::Jq => "jq",
            TransformationKind::Yq => "yq",
            TransformationKind::Sed => "sed",
            TransformationKind::Unknown => "unknown",
        }
    }
}

/// A candidate TF→Helm data flow prior to scoring.
#[derive(Debug, Clone)]
pub struct PartialFlow {
    pub pattern: FlowPattern,
    pub source_output: String,
    pub target_value_path: String,
    pub producer_job: String,
    pub consumer_job: String,
    pub evidence: Vec<Evidence>,
    pub transformation: TransformationKind,
    pub explicit_bonus: f64,
    pub job_dep_bonus: f64,
    pub name_match_bonus: f64,
    pub transformation_penalty: f64,
    pub weak_evidence_penalty: f64,
}

/// A scored TF→Helm flow, ready to become a `FEEDS_INTO` edge.
#[derive(Debug, Clone)]
pub struct ScoredFlow {
    pub flow: PartialFlow,
    pub confidence: f64,
}

/// Default scorer weights (spec §4.1).
#[derive(Debug, Clone, Copy)]
pub struct ScorerWeights {
    pub evidence_weight: f64,
    pub max_bonus: f64,
    pub max_penalty: f64,
}

impl Default for ScorerWeights {
    fn default() -> Self {
        Self { evidence_weight: 0.3, max_bonus: 30.0, max_penalty: 25.0 }
    }
}

/// Compute final flow confidence per the spec §4.1 formula.
pub fn score_flow(flow: &PartialFlow, weights: ScorerWeights) -> f64 {
    let n = flow.evidence.len().max(1) as f64;
    let evidence_sum: f64 = flow.evidence.iter().map(|e| e.strength * e.evidence_type.weight()).sum();
    let bonus = (flow.explicit_bonus + flow.job_dep_bonus + flow.name_match_bonus).min(weights.max_bonus);
    let penalty = (flow.transformation_penalty + flow.weak_evidence_penalty).min(weights.max_penalty);

    let raw = flow.pattern.base_confidence() + weights.evidence_weight * evidence_sum / n + bonus - penalty;
    raw.clamp(0.0, 100.0)
}

fn direct_output_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"--set\s+([\w.\-]+)=[`$]\(?terraform output\s+(?:-raw\s+)?([\w\-]+)\)?`?").unwrap()
    })
}

fn output_to_env_set_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?:export\s+)?([A-Z_][A-Z0-9_]*)=\$\(terraform output\s+(?:-raw\s+)?([\w\-]+)\)").unwrap())
}

fn env_reference_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{?([A-Z_][A-Z0-9_]*)\}?").unwrap())
}

fn output_to_file_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"terraform output\s+-json\s*>\s*([\w./\-]+)").unwrap())
}

fn jq_over_file_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(jq|yq)\b.*?([\w./\-]+\.json)").unwrap())
}

/// Pattern 1: `helm --set k=$(terraform output -raw NAME)` on the same job.
fn detect_direct_output(jobs: &[JobScripts]) -> Vec<PartialFlow> {
    let mut flows = Vec::new();
    for job in jobs {
        for (line_no, line) in job.scripts.iter().enumerate() {
            if let Some(caps) = direct_output_re().captures(line) {
                let target_path = caps[1].to_string();
                let output_name = caps[2].to_string();
                let evidence = vec![Evidence::new(
                    EvidenceType::ExpressionMatch,
                    SourceLocation::point(&job.job_id, (line_no + 1) as u32),
                    line.clone(),
                    1.0,
                )];
                flows.push(PartialFlow {
                    pattern: FlowPattern::DirectOutput,
                    source_output: format!("output.{output_name}"),
                    target_value_path: target_path,
                    producer_job: job.job_id.clone(),
                    consumer_job: job.job_id.clone(),
                    evidence,
                    transformation: TransformationKind::Direct,
                    explicit_bonus: 20.0,
                    job_dep_bonus: 0.0,
                    name_match_bonus: 0.0,
                    transformation_penalty: 0.0,
                    weak_evidence_penalty: 0.0,
                });
            }
        }
    }
    flows
}

/// Pattern 2: one step exports `VAR=$(terraform output ...)`, a later helm
/// step (same or dependent job) references `${VAR}`.
fn detect_output_to_env(jobs: &[JobScripts]) -> Vec<PartialFlow> {
    let mut exports: HashMap<String, (String, String, u32)> = HashMap::new();
    for job in jobs {
        for (line_no, line) in job.scripts.iter().enumerate() {
            if let Some(caps) = output_to_env_set_re().captures(line) {
                exports.insert(caps[1].to_string(), (
                    job.job_id.clone(),
                    caps[2].to_string(),
                    (line_no + 1) as u32,
                ));
            }
        }
    }

    let mut flows = Vec::new();
    for job in jobs {
        for (line_no, line) in job.scripts.iter().enumerate() {
            if !line.contains("helm") {
                continue;
            }
            for caps in env_reference_re().captures_iter(line) {
                let var = &caps[1];
                if let Some((producer_job, output_name, producer_line)) = exports.get(var) {
                    let same_job = producer_job == &job.job_id;
                    let job_dep = job.needs.contains(producer_job);
                    if !same_job && !job_dep {
                        continue;
                    }
                    let evidence = vec![
                        Evidence::new(EvidenceType::EnvVariable, SourceLocation::point(producer_job, *producer_line), var, 0.9),
                        Evidence::new(
                            EvidenceType::ExpressionMatch,
                            SourceLocation::point(&job.job_id, (line_no + 1) as u32),
                            line.clone(),
                            0.8,
                        ),
                    ];
                    flows.push(PartialFlow {
                        pattern: FlowPattern::OutputToEnv,
                        source_output: format!("output.{output_name}"),
                        target_value_path: var.to_string(),
                        producer_job: producer_job.clone(),
                        consumer_job: job.job_id.clone(),
                        evidence,
                        transformation: TransformationKind::Direct,
                        explicit_bonus: 0.0,
                        job_dep_bonus: if job_dep { 15.0 } else { 5.0 },
                        name_match_bonus: 0.0,
                        transformation_penalty: 0.0,
                        weak_evidence_penalty: 0.0,
                    });
                }
            }
        }
    }
    flows
}

/// Pattern 3: `terraform output -json > FILE`, later helm job reads the file
/// through `jq`/`yq`.
fn detect_output_to_file(jobs: &[JobScripts]) -> Vec<PartialFlow> {
    let mut files: HashMap<String, (String, u32)> = HashMap::new();
    for job in jobs {
        for (line_no, line) in job.scripts.iter().enumerate() {
            if let Some(caps) = output_to_file_re().captures(line) {
                files.insert(caps[1].to_string(), (job.job_id.clone(), (line_no + 1) as u32));
            }
        }
    }

    let mut flows = Vec::new();
    for job in jobs {
        for (line_no, line) in job.scripts.iter().enumerate() {
            if !line.contains("helm") {
                continue;
            }
            if let Some(caps) = jq_over_file_re().captures(line) {
                let tool = &caps[1];
                let file = &caps[2];
                if let Some((producer_job, producer_line)) = files.get(file) {
                    let job_dep = job.needs.contains(producer_job) || producer_job == &job.job_id;
                    if !job_dep {
                        continue;
                    }
                    let transformation = if tool == "jq" { TransformationKind::Jq } else { TransformationKind::Yq };
                    let evidence = vec![
                        Evidence::new(EvidenceType::ArtifactPath, SourceLocation::point(producer_job, *producer_line), file.clone(), 0.8),
                        Evidence::new(
                            EvidenceType::ExpressionMatch,
                            SourceLocation::point(&job.job_id, (line_no + 1) as u32),
                            line.clone(),
                            0.7,
                        ),
                    ];
                    flows.push(PartialFlow {
                        pattern: FlowPattern::OutputToFile,
                        source_output: "output.*".to_string(),
                        target_value_path: file.to_string(),
                        producer_job: producer_job.clone(),
                        consumer_job: job.job_id.clone(),
                        evidence,
                        transformation,
                        explicit_bonus: 0.0,
                        job_dep_bonus: 10.0,
                        name_match_bonus: 0.0,
                        transformation_penalty: 5.0,
                        weak_evidence_penalty: 0.0,
                    });
                }
            }
        }
    }
    flows
}

/// Pattern 4: a producer job uploads a JSON artifact containing outputs; a
/// downstream job declares it via `needs`/`dependencies` and passes it to
/// helm `-f`.
fn detect_artifact_transfer(jobs: &[JobScripts]) -> Vec<PartialFlow> {
    let mut flows = Vec::new();
    for job in jobs {
        if !job.downloads_artifacts || !job.scripts.iter().any(|s| s.contains("helm")) {
            continue;
        }
        for dep in &job.needs {
            let Some(producer) = jobs.iter().find(|j| &j.job_id == dep) else { continue };
            if !producer.uploads_artifacts {
                continue;
            }
            let evidence = vec![
                Evidence::new(EvidenceType::JobDependency, SourceLocation::point(&producer.job_id, 1), dep.clone(), 0.6),
                Evidence::new(EvidenceType::ArtifactPath, SourceLocation::point(&job.job_id, 1), "artifacts", 0.5),
            ];
            flows.push(PartialFlow {
                pattern: FlowPattern::ArtifactTransfer,
                source_output: "output.*".to_string(),
                target_value_path: "artifact".to_string(),
                producer_job: producer.job_id.clone(),
                consumer_job: job.job_id.clone(),
                evidence,
                transformation: TransformationKind::Unknown,
                explicit_bonus: 0.0,
                job_dep_bonus: 15.0,
                name_match_bonus: 0.0,
                transformation_penalty: 5.0,
                weak_evidence_penalty: 5.0,
            });
        }
    }
    flows
}

/// Run all four detectors in priority order, score every candidate, drop
/// anything below `min_confidence`, and cap at `max_flows`. The number of
/// flows dropped purely by the cap is returned alongside the kept flows so
/// the caller can log it (spec §4.1: "never silently discarded").
pub fn detect_flows(
    jobs: &[JobScripts],
    min_confidence: f64,
    max_flows: usize,
    weights: ScorerWeights,
) -> (Vec<ScoredFlow>, usize) {
    let mut candidates = Vec::new();
    candidates.extend(detect_direct_output(jobs));
    candidates.extend(detect_output_to_env(jobs));
    candidates.extend(detect_output_to_file(jobs));
    candidates.extend(detect_artifact_transfer(jobs));

    let mut scored: Vec<ScoredFlow> = candidates
        .into_iter()
        .map(|flow| {
            let confidence = score_flow(&flow, weights);
            ScoredFlow { flow, confidence }
        })
        .filter(|sf| sf.confidence >= min_confidence)
        .collect();

    scored.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap());

    let dropped = scored.len().saturating_sub(max_flows);
    scored.truncate(max_flows);
    (scored, dropped)
}

/// Build the `FEEDS_INTO` edge for a scored flow, with the metadata the spec
/// requires: source/target types, mechanism, pipeline type, transformation
/// kind, and temporal markers.
pub fn flow_to_edge(scored: &ScoredFlow, pipeline_type: &str, now_rfc3339: &str) -> Edge {
    let flow = &scored.flow;
    Edge::new(flow.source_output.clone(), flow.target_value_path.clone(), EdgeKind::FeedsInto, scored.confidence.round() as u8)
        .with_evidence(flow.evidence.clone())
        .with_metadata("pattern", flow.pattern.label())
        .with_metadata("producerJob", flow.producer_job.clone())
        .with_metadata("consumerJob", flow.consumer_job.clone())
        .with_metadata("pipelineType", pipeline_type)
        .with_metadata("transformation", flow.transformation.label())
        .with_metadata("firstDetected", now_rfc3339)
        .with_metadata("lastVerified", now_rfc3339)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(id: &str, scripts: &[&str], needs: &[&str]) -> JobScripts {
        JobScripts {
            job_id: id.to_string(),
            scripts: scripts.iter().map(|s| s.to_string()).collect(),
            needs: needs.iter().map(|s| s.to_string()).collect(),
            uploads_artifacts: false,
            downloads_artifacts: false,
        }
    }

    #[test]
    fn direct_output_pattern_detected_in_single_job() {
        let jobs = vec![job(
            "deploy",
            &["helm upgrade app ./chart --set image.tag=$(terraform output -raw image_tag)"],
            &[],
        )];
        let (flows, dropped) = detect_flows(&jobs, 50.0, 200, ScorerWeights::default());
        assert_eq!(dropped, 0);
        assert_eq!(flows.len(), 1);
        assert_eq!(flows[0].flow.pattern, FlowPattern::DirectOutput);
        assert!(flows[0].confidence >= 90.0);
    }

    #[test]
    fn output_to_env_pattern_crosses_dependent_jobs() {
        let jobs = vec![
            job("tf_apply", &["IMAGE_TAG=$(terraform output -raw image_tag)"], &[]),
            job("helm_deploy", &["helm upgrade app ./chart --set image.tag=${IMAGE_TAG}"], &["tf_apply"]),
        ];
        let (flows, _) = detect_flows(&jobs, 50.0, 200, ScorerWeights::default());
        assert!(flows.iter().any(|f| f.flow.pattern == FlowPattern::OutputToEnv));
    }

    #[test]
    fn low_confidence_flows_are_dropped() {
        let jobs = vec![
            job("producer", &[], &[]),
            JobScripts {
                job_id: "consumer".into(),
                scripts: vec!["helm upgrade app ./chart -f artifacts.yaml".into()],
                needs: vec!["producer".into()],
                uploads_artifacts: false,
                downloads_artifacts: true,
            },
        ];
        let (flows, _) = detect_flows(&jobs, 90.0, 200, ScorerWeights::default());
        assert!(flows.is_empty());
    }

    #[test]
    fn max_flows_cap_reports_dropped_count() {
        let jobs: Vec<JobScripts> = (0..5)
            .map(|i| {
                job(
                    &format!("deploy{i}"),
                    &[&format!("helm upgrade app{i} ./chart --set image.tag=$(terraform output -raw tag{i})")],
                    &[],
                )
            })
            .collect();
        let (flows, dropped) = detect_flows(&jobs, 50.0, 2, ScorerWeights::default());
        assert_eq!(flows.len(), 2);
        assert_eq!(dropped, 3);
    }

    #[test]
    fn scorer_clamps_to_100() {
        let flow = PartialFlow {
            pattern: FlowPattern::DirectOutput,
            source_output: "output.x".into(),
            target_value_path: "a.b".into(),
            producer_job: "j".into(),
            consumer_job: "j".into(),
            evidence: vec![Evidence::new(EvidenceType::ExplicitReference, SourceLocation::point("f", 1), "x", 1.0)],
            transformation: TransformationKind::Direct,
            explicit_bonus: 30.0,
            job_dep_bonus: 30.0,
            name_match_bonus: 30.0,
            transformation_penalty: 0.0,
            weak_evidence_penalty: 0.0,
        };
        assert_eq!(score_flow(&flow, ScorerWeights::default()), 100.0);
    }
}
