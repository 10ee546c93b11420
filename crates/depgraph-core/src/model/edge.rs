use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::node::SourceLocation;

/// Closed set of edge kinds the detection and rollup engines can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    DependsOn,
    References,
    InputVariable,
    LocalReference,
    DataReference,
    ModuleCall,
    GitlabStageOrder,
    GitlabNeeds,
    GitlabExtends,
    GitlabIncludes,
    GitlabUsesTf,
    GitlabUsesHelm,
    GitlabArtifactFlow,
    FeedsInto,
}

impl EdgeKind {
    pub fn label(&self) -> &'static str {
        match self {
            EdgeKind::DependsOn => "depends_on",
            EdgeKind::References => "references",
            EdgeKind::InputVariable => "input_variable",
            EdgeKind::LocalReference => "local_reference",
            EdgeKind::DataReference => "data_reference",
            EdgeKind::ModuleCall => "module_call",
            EdgeKind::GitlabStageOrder => "gitlab_stage_order",
            EdgeKind::GitlabNeeds => "gitlab_needs",
            EdgeKind::GitlabExtends => "gitlab_extends",
            EdgeKind::GitlabIncludes => "gitlab_includes",
            EdgeKind::GitlabUsesTf => "gitlab_uses_tf",
            EdgeKind::GitlabUsesHelm => "gitlab_uses_helm",
            EdgeKind::GitlabArtifactFlow => "gitlab_artifact_flow",
            EdgeKind::FeedsInto => "FEEDS_INTO",
        }
    }
}

/// A discrete observation supporting an edge, weighted by type and strength.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceType {
    ExplicitReference,
    ExpressionMatch,
    JobDependency,
    EnvVariable,
    ArtifactPath,
    SemanticMatch,
    FilePathMatch,
    NamingConvention,
    StepProximity,
}

impl EvidenceType {
    /// Fixed weight used by the flow confidence scorer (see `detection::ci::flow`).
    pub fn weight(&self) -> f64 {
        match self {
            EvidenceType::ExplicitReference => 1.0,
            EvidenceType::ExpressionMatch => 0.9,
            EvidenceType::JobDependency => 0.6,
            EvidenceType::EnvVariable => 0.7,
            EvidenceType::ArtifactPath => 0.5,
            EvidenceType::SemanticMatch => 0.4,
            EvidenceType::FilePathMatch => 0.45,
            EvidenceType::NamingConvention => 0.3,
            EvidenceType::StepProximity => 0.2,
        }
    }
}

/// A single evidence pointer: where the observation was made and how strong it is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evidence {
    pub evidence_type: EvidenceType,
    pub location: SourceLocation,
    pub snippet: String,
    /// Strength of this individual observation, in `[0, 1]`.
    pub strength: f64,
}

impl Evidence {
    pub fn new(evidence_type: EvidenceType, location: SourceLocation, snippet: impl Into<String>, strength: f64) -> Self {
        Self {
            evidence_type,
            location,
            snippet: snippet.into(),
            strength: strength.clamp(0.0, 1.0),
        }
    }
}

/// A directed typed relation between two nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    pub source: String,
    pub target: String,
    pub kind: EdgeKind,
    /// Confidence in `[0, 100]`.
    pub confidence: u8,
    pub is_explicit: bool,
    pub evidence: Vec<Evidence>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Edge {
    pub fn new(source: impl Into<String>, target: impl Into<String>, kind: EdgeKind, confidence: u8) -> Self {
        let source = source.into();
        let target = target.into();
        let id = compute_edge_id(&source, &target, kind, &[]);
        Self {
            id,
            source,
            target,
            kind,
            confidence: confidence.min(100),
            is_explicit: true,
            evidence: Vec::new(),
            metadata: serde_json::Map::new(),
        }
    }

    pub fn implicit(mut self) -> Self {
        self.is_explicit = false;
        self
    }

    pub fn with_evidence(mut self, evidence: Vec<Evidence>) -> Self {
        self.id = compute_edge_id(&self.source, &self.target, self.kind, &evidence);
        self.evidence = evidence;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Deterministic content hash of `(source, target, kind, evidence locations)`,
/// hex-encoded. Same inputs always produce the same edge id, independent of
/// process, allocation order, or run count (see spec §9, "Determinism of ids").
pub fn compute_edge_id(source: &str, target: &str, kind: EdgeKind, evidence: &[Evidence]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hasher.update(b"\0");
    hasher.update(target.as_bytes());
    hasher.update(b"\0");
    hasher.update(kind.label().as_bytes());
    for ev in evidence {
        hasher.update(b"\0");
        hasher.update(ev.location.file.as_bytes());
        hasher.update(format!(":{}:{}", ev.location.start_line, ev.location.end_line).as_bytes());
    }
    let digest = hasher.finalize();
    hex::encode(&digest[..12])
}

/// Confidence level banding shared by edges and TF→Helm flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

impl ConfidenceLevel {
    pub fn from_score(score: f64) -> Self {
        if score >= 80.0 {
            ConfidenceLevel::High
        } else if score >= 50.0 {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::Low
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edge_id_is_deterministic() {
        let a = Edge::new("aws_instance.web", "var.ami_id", EdgeKind::InputVariable, 90);
        let b = Edge::new("aws_instance.web", "var.ami_id", EdgeKind::InputVariable, 90);
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn edge_id_changes_with_evidence_location() {
        let a = Edge::new("a", "b", EdgeKind::References, 80).with_evidence(vec![Evidence::new(
            EvidenceType::ExplicitReference,
            SourceLocation::point("main.tf", 1),
            "a -> b",
            1.0,
        )]);
        let b = Edge::new("a", "b", EdgeKind::References, 80).with_evidence(vec![Evidence::new(
            EvidenceType::ExplicitReference,
            SourceLocation::point("main.tf", 2),
            "a -> b",
            1.0,
        )]);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn confidence_level_bands() {
        assert_eq!(ConfidenceLevel::from_score(80.0), ConfidenceLevel::High);
        assert_eq!(ConfidenceLevel::from_score(50.0), ConfidenceLevel::Medium);
        assert_eq!(ConfidenceLevel::from_score(0.0), ConfidenceLevel::Low);
        assert_eq!(ConfidenceLevel::from_score(79.9), ConfidenceLevel::Medium);
    }

    #[test]
    fn confidence_is_clamped_to_100() {
        let edge = Edge::new("a", "b", EdgeKind::References, 255);
        assert_eq!(edge.confidence, 100);
    }
}
