use std::collections::BTreeMap;

use super::{is_placeholder, ExtractedReference, Extractor, ReferenceType};
use crate::model::{Node, NodeKind};

pub struct K8sReferenceExtractor;

impl Extractor for K8sReferenceExtractor {
    fn reference_type(&self) -> ReferenceType {
        ReferenceType::K8sReference
    }

    fn can_handle(&self, node: &Node) -> bool {
        matches!(node.kind, NodeKind::K8sDeployment | NodeKind::K8sService | NodeKind::K8sConfigMap)
    }

    fn extract(&self, node: &Node) -> Vec<ExtractedReference> {
        let namespace = node.attr_str("namespace").unwrap_or("default");
        if is_placeholder(namespace) {
            return Vec::new();
        }
        let kind_label = node.kind.label().trim_start_matches("k8s_");
        let external_id = format!("{kind_label}/{namespace}/{}", node.name);
        let mut components = BTreeMap::new();
        components.insert("kind".to_string(), kind_label.to_string());
        components.insert("namespace".to_string(), namespace.to_string());
        components.insert("name".to_string(), node.name.clone());
        vec![ExtractedReference { reference_type: ReferenceType::K8sReference, external_id, components }]
    }

    fn normalize(&self, id: &str) -> String {
        id.trim().to_lowercase()
    }

    fn parse_components(&self, id: &str) -> Option<BTreeMap<String, String>> {
        let mut parts = id.splitn(3, '/');
        let kind = parts.next()?;
        let namespace = parts.next()?;
        let name = parts.next()?;
        let mut components = BTreeMap::new();
        components.insert("kind".to_string(), kind.to_string());
        components.insert("namespace".to_string(), namespace.to_string());
        components.insert("name".to_string(), name.to_string());
        Some(components)
    }
}
