use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Closed set of node kinds the detection engine can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    TerraformResource,
    TerraformData,
    TerraformModule,
    TerraformVariable,
    TerraformLocal,
    TerraformOutput,
    K8sDeployment,
    K8sService,
    K8sConfigMap,
    HelmRelease,
    GitlabPipeline,
    GitlabStage,
    GitlabJob,
    ExternalReference,
}

impl NodeKind {
    pub fn label(&self) -> &'static str {
        match self {
            NodeKind::TerraformResource => "terraform_resource",
            NodeKind::TerraformData => "terraform_data",
            NodeKind::TerraformModule => "terraform_module",
            NodeKind::TerraformVariable => "terraform_variable",
            NodeKind::TerraformLocal => "terraform_local",
            NodeKind::TerraformOutput => "terraform_output",
            NodeKind::K8sDeployment => "k8s_deployment",
            NodeKind::K8sService => "k8s_service",
            NodeKind::K8sConfigMap => "k8s_configmap",
            NodeKind::HelmRelease => "helm_release",
            NodeKind::GitlabPipeline => "gitlab_pipeline",
            NodeKind::GitlabStage => "gitlab_stage",
            NodeKind::GitlabJob => "gitlab_job",
            NodeKind::ExternalReference => "external_reference",
        }
    }
}

/// A byte-range or line-range location within a scanned file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceLocation {
    pub file: String,
    pub start_line: u32,
    pub end_line: u32,
}

impl SourceLocation {
    pub fn new(file: impl Into<String>, start_line: u32, end_line: u32) -> Self {
        Self {
            file: file.into(),
            start_line,
            end_line,
        }
    }

    pub fn point(file: impl Into<String>, line: u32) -> Self {
        Self::new(file, line, line)
    }
}

/// A uniquely identified artifact discovered in a scan. Immutable after
/// construction — callers build a new `Node` rather than mutate one in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub name: String,
    pub kind: NodeKind,
    pub location: SourceLocation,
    /// Kind-specific attribute bag (`resourceType`, `provider`, `arn`, `bucket`,
    /// `tags`, `namespace`, `image`, ...). Kept untyped because the set of
    /// attributes varies per kind and per provider, not because the kind
    /// itself is open-ended.
    pub attributes: HashMap<String, serde_json::Value>,
}

impl Node {
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: NodeKind, location: SourceLocation) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            location,
            attributes: HashMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(|v| v.as_str())
    }

    /// Canonical node id for a Terraform resource block.
    pub fn terraform_resource_id(resource_type: &str, name: &str) -> String {
        format!("{resource_type}.{name}")
    }

    /// Canonical node id for a Terraform data block.
    pub fn terraform_data_id(data_type: &str, name: &str) -> String {
        format!("data.{data_type}.{name}")
    }

    pub fn terraform_variable_id(name: &str) -> String {
        format!("var.{name}")
    }

    pub fn terraform_local_id(name: &str) -> String {
        format!("local.{name}")
    }

    pub fn terraform_module_id(name: &str) -> String {
        format!("module.{name}")
    }

    pub fn terraform_output_id(name: &str) -> String {
        format!("output.{name}")
    }

    /// Canonical node id for a Kubernetes manifest resource, keyed by
    /// namespace since names are only unique within one.
    pub fn k8s_deployment_id(namespace: &str, name: &str) -> String {
        format!("k8s_deployment.{namespace}.{name}")
    }

    pub fn k8s_service_id(namespace: &str, name: &str) -> String {
        format!("k8s_service.{namespace}.{name}")
    }

    pub fn k8s_configmap_id(namespace: &str, name: &str) -> String {
        format!("k8s_configmap.{namespace}.{name}")
    }

    /// Canonical node id for a Helm release, keyed by chart/release name.
    pub fn helm_release_id(name: &str) -> String {
        format!("helm_release.{name}")
    }
}
