pub mod arn;
pub mod cloud_resource;
pub mod container_image;
pub mod git_url;
pub mod helm_chart;
pub mod k8s;
pub mod resource_id;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::Node;

/// The closed set of reference types the external index extracts and keys
/// lookups by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceType {
    Arn,
    ResourceId,
    K8sReference,
    ContainerImage,
    HelmChart,
    GitUrl,
    GcpResource,
    AzureResource,
}

impl ReferenceType {
    /// Ordering used to break ties when sorting lookup results
    /// (`referenceType priority, indexedAt desc`, spec §4.3): more specific,
    /// less ambiguous reference types sort first.
    pub fn priority(&self) -> u8 {
        match self {
            ReferenceType::Arn => 0,
            ReferenceType::ResourceId => 1,
            ReferenceType::GcpResource => 2,
            ReferenceType::AzureResource => 2,
            ReferenceType::K8sReference => 3,
            ReferenceType::ContainerImage => 4,
            ReferenceType::HelmChart => 5,
            ReferenceType::GitUrl => 6,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ReferenceType::Arn => "arn",
            ReferenceType::ResourceId => "resource_id",
            ReferenceType::K8sReference => "k8s_reference",
            ReferenceType::ContainerImage => "container_image",
            ReferenceType::HelmChart => "helm_chart",
            ReferenceType::GitUrl => "git_url",
            ReferenceType::GcpResource => "gcp_resource",
            ReferenceType::AzureResource => "azure_resource",
        }
    }
}

/// Values that extractors must never index — computed placeholders Terraform
/// and friends emit in place of an unresolved attribute (spec §4.3).
const PLACEHOLDER_VALUES: &[&str] = &["<computed>", "(known after apply)", "unknown", "null", "undefined", "n/a", ""];

pub fn is_placeholder(value: &str) -> bool {
    let trimmed = value.trim();
    PLACEHOLDER_VALUES.contains(&trimmed.to_lowercase().as_str())
}

/// One raw reference pulled out of a node's attribute bag, prior to
/// normalization and entry construction.
#[derive(Debug, Clone)]
pub struct ExtractedReference {
    pub reference_type: ReferenceType,
    pub external_id: String,
    pub components: BTreeMap<String, String>,
}

/// One extractor per `referenceType` (spec §4.3).
pub trait Extractor: Send + Sync {
    fn reference_type(&self) -> ReferenceType;
    fn can_handle(&self, node: &Node) -> bool;
    fn extract(&self, node: &Node) -> Vec<ExtractedReference>;
    fn normalize(&self, id: &str) -> String;
    fn parse_components(&self, id: &str) -> Option<BTreeMap<String, String>>;
}

/// Registry of extractors queried by reference type (spec §4.3: "Extractors
/// are registered in a factory and queried by type").
pub struct ExtractorRegistry {
    extractors: Vec<Box<dyn Extractor>>,
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self { extractors: Vec::new() }
    }

    pub fn register(mut self, extractor: Box<dyn Extractor>) -> Self {
        self.extractors.push(extractor);
        self
    }

    pub fn standard() -> Self {
        Self::new()
            .register(Box::new(arn::ArnExtractor))
            .register(Box::new(resource_id::ResourceIdExtractor))
            .register(Box::new(k8s::K8sReferenceExtractor))
            .register(Box::new(container_image::ContainerImageExtractor))
            .register(Box::new(helm_chart::HelmChartExtractor))
            .register(Box::new(git_url::GitUrlExtractor))
            .register(Box::new(cloud_resource::GcpResourceExtractor))
            .register(Box::new(cloud_resource::AzureResourceExtractor))
    }

    pub fn by_type(&self, reference_type: ReferenceType) -> Option<&dyn Extractor> {
        self.extractors.iter().find(|e| e.reference_type() == reference_type).map(|b| b.as_ref())
    }

    /// Whether any registered extractor recognizes this node as carrying a
    /// reference of its type, regardless of whether that reference turned
    /// out to be extractable (placeholder values and malformed ids are
    /// recognized but yield nothing — spec §4.3's per-node build failure).
    pub fn claims(&self, node: &Node) -> bool {
        self.extractors.iter().any(|e| e.can_handle(node))
    }

    pub fn extract_all(&self, node: &Node, max_references_per_node: usize) -> Vec<ExtractedReference> {
        let mut out = Vec::new();
        for extractor in &self.extractors {
            if extractor.can_handle(node) {
                out.extend(extractor.extract(node));
            }
            if out.len() >= max_references_per_node {
                break;
            }
        }
        out.truncate(max_references_per_node);
        out
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::standard()
    }
}
