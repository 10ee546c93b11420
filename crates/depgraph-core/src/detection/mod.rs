pub mod ci;
pub mod hcl;
pub mod k8s;

use crate::model::DependencyGraph;

/// One artifact discovered in a scan, ready to be handed to the orchestrator.
pub struct DetectionInput<'a> {
    pub file: &'a str,
    pub content: &'a str,
}

#[derive(Debug, Clone)]
pub struct DetectionWarning {
    pub detector: &'static str,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct DetectionError {
    pub detector: &'static str,
    pub message: String,
}

/// Either a detector ran to completion (possibly with warnings) or it failed
/// outright; a failure still preserves whatever partial graph state the
/// detector managed to write before erroring (spec §4.1 failure model).
#[derive(Debug, Clone)]
pub enum DetectionResult {
    Success { warnings: Vec<DetectionWarning> },
    Failure { errors: Vec<DetectionError> },
}

/// `canDetect(input) -> bool`, `detect(input, graph) -> DetectionResult`.
pub trait Detector: Send + Sync {
    fn name(&self) -> &'static str;
    /// Higher runs first. Ties broken by `name()` ascending (spec §4.1 determinism).
    fn priority(&self) -> i32;
    fn can_detect(&self, input: &DetectionInput) -> bool;
    fn detect(&self, input: &DetectionInput, graph: &mut DependencyGraph) -> DetectionResult;
}

struct TerraformDetector;

impl Detector for TerraformDetector {
    fn name(&self) -> &'static str {
        "terraform"
    }

    fn priority(&self) -> i32 {
        100
    }

    fn can_detect(&self, input: &DetectionInput) -> bool {
        input.file.ends_with(".tf")
    }

    fn detect(&self, input: &DetectionInput, graph: &mut DependencyGraph) -> DetectionResult {
        hcl::terraform::detect_file(input.content, input.file, graph);
        DetectionResult::Success { warnings: Vec::new() }
    }
}

struct KubernetesDetector;

impl Detector for KubernetesDetector {
    fn name(&self) -> &'static str {
        "kubernetes"
    }

    fn priority(&self) -> i32 {
        80
    }

    fn can_detect(&self, input: &DetectionInput) -> bool {
        let name = input.file.rsplit('/').next().unwrap_or(input.file);
        if name == ".gitlab-ci.yml" || name == ".gitlab-ci.yaml" {
            return false;
        }
        name.ends_with(".yaml") || name.ends_with(".yml")
    }

    fn detect(&self, input: &DetectionInput, graph: &mut DependencyGraph) -> DetectionResult {
        let name = input.file.rsplit('/').next().unwrap_or(input.file);
        let result = if name == "Chart.yaml" {
            k8s::detect_chart_file(input.content, input.file, graph)
        } else if name == "values.yaml" {
            k8s::detect_values_file(input.content, input.file, graph)
        } else {
            k8s::detect_manifest_file(input.content, input.file, graph)
        };
        match result {
            Ok(()) => DetectionResult::Success { warnings: Vec::new() },
            Err(err) => DetectionResult::Failure {
                errors: vec![DetectionError { detector: self.name(), message: err.to_string() }],
            },
        }
    }
}

struct GitlabCiDetector;

impl Detector for GitlabCiDetector {
    fn name(&self) -> &'static str {
        "gitlab_ci"
    }

    fn priority(&self) -> i32 {
        90
    }

    fn can_detect(&self, input: &DetectionInput) -> bool {
        let name = input.file.rsplit('/').next().unwrap_or(input.file);
        name == ".gitlab-ci.yml" || name == ".gitlab-ci.yaml" || name.ends_with(".gitlab-ci.yml")
    }

    fn detect(&self, input: &DetectionInput, graph: &mut DependencyGraph) -> DetectionResult {
        match ci::gitlab::detect_file(input.content, input.file, graph) {
            Ok(()) => DetectionResult::Success { warnings: Vec::new() },
            Err(err) => DetectionResult::Failure {
                errors: vec![DetectionError { detector: self.name(), message: err.to_string() }],
            },
        }
    }
}

/// Runs every registered detector over every input, in deterministic order,
/// unioning outputs into one `DependencyGraph`.
pub struct DetectionOrchestrator {
    detectors: Vec<Box<dyn Detector>>,
}

impl Default for DetectionOrchestrator {
    fn default() -> Self {
        let mut detectors: Vec<Box<dyn Detector>> = vec![Box::new(TerraformDetector), Box::new(GitlabCiDetector), Box::new(KubernetesDetector)];
        detectors.sort_by(|a, b| b.priority().cmp(&a.priority()).then_with(|| a.name().cmp(b.name())));
        Self { detectors }
    }
}

impl DetectionOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run applicable detectors over every input. A parse error on one file
    /// drops that file from the scan (recorded in `graph.metadata.file_errors`)
    /// without aborting detection of the remaining files; a detector error
    /// does not halt other detectors.
    pub fn run(&self, inputs: &[DetectionInput], graph: &mut DependencyGraph) -> Vec<(&'static str, DetectionResult)> {
        let mut results = Vec::new();
        for input in inputs {
            let mut file_failed = false;
            for detector in &self.detectors {
                if !detector.can_detect(input) {
                    continue;
                }
                let result = detector.detect(input, graph);
                if let DetectionResult::Failure { errors } = &result {
                    file_failed = true;
                    for error in errors {
                        graph.metadata.file_errors.push((input.file.to_string(), error.message.clone()));
                    }
                }
                results.push((detector.name(), result));
            }
            let _ = file_failed;
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detectors_are_ordered_by_priority_then_name() {
        let orchestrator = DetectionOrchestrator::new();
        let names: Vec<&str> = orchestrator.detectors.iter().map(|d| d.name()).collect();
        assert_eq!(names, vec!["terraform", "gitlab_ci", "kubernetes"]);
    }

    #[test]
    fn kubernetes_detector_ignores_gitlab_ci_files_but_takes_other_yaml() {
        let detector = KubernetesDetector;
        assert!(!detector.can_detect(&DetectionInput { file: ".gitlab-ci.yml", content: "" }));
        assert!(detector.can_detect(&DetectionInput { file: "k8s/deployment.yaml", content: "" }));
        assert!(detector.can_detect(&DetectionInput { file: "charts/app/Chart.yaml", content: "" }));
    }

    #[test]
    fn orchestrator_detects_k8s_manifests_alongside_terraform_and_ci() {
        let orchestrator = DetectionOrchestrator::new();
        let mut graph = DependencyGraph::new("scan-1");
        let inputs = vec![
            DetectionInput { file: "main.tf", content: r#"resource "aws_instance" "web" { ami = "x" }"# },
            DetectionInput {
                file: "k8s/deployment.yaml",
                content: "apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: web\n  namespace: prod\nspec: {}\n",
            },
        ];
        orchestrator.run(&inputs, &mut graph);
        assert!(graph.contains("aws_instance.web"));
        assert!(graph.contains("k8s_deployment.prod.web"));
    }

    #[test]
    fn terraform_detector_only_applies_to_tf_files() {
        let detector = TerraformDetector;
        assert!(detector.can_detect(&DetectionInput { file: "main.tf", content: "" }));
        assert!(!detector.can_detect(&DetectionInput { file: ".gitlab-ci.yml", content: "" }));
    }

    #[test]
    fn orchestrator_unions_outputs_across_files() {
        let orchestrator = DetectionOrchestrator::new();
        let mut graph = DependencyGraph::new("scan-1");
        let inputs = vec![
            DetectionInput { file: "main.tf", content: r#"resource "aws_instance" "web" { ami = "x" }"# },
            DetectionInput {
                file: ".gitlab-ci.yml",
                content: "stages:\n  - deploy\ndeploy:\n  stage: deploy\n  script:\n    - echo hi\n",
            },
        ];
        orchestrator.run(&inputs, &mut graph);
        assert!(graph.contains("aws_instance.web"));
        assert!(graph.contains("gitlab_job..gitlab-ci.yml.deploy"));
    }

    #[test]
    fn bad_file_is_isolated_without_aborting_the_scan() {
        let orchestrator = DetectionOrchestrator::new();
        let mut graph = DependencyGraph::new("scan-1");
        let inputs = vec![
            DetectionInput { file: ".gitlab-ci.yml", content: "not: valid: yaml: [" },
            DetectionInput { file: "main.tf", content: r#"resource "aws_instance" "web" { ami = "x" }"# },
        ];
        orchestrator.run(&inputs, &mut graph);
        assert_eq!(graph.metadata.file_errors.len(), 1);
        assert!(graph.contains("aws_instance.web"));
    }
}
