use std::collections::BTreeMap;

use super::{is_placeholder, ExtractedReference, Extractor, ReferenceType};
use crate::model::Node;

const ID_ATTRIBUTES: &[&str] = &["id", "resource_id", "instance_id", "bucket", "vpc_id", "subnet_id"];

pub struct ResourceIdExtractor;

impl Extractor for ResourceIdExtractor {
    fn reference_type(&self) -> ReferenceType {
        ReferenceType::ResourceId
    }

    fn can_handle(&self, node: &Node) -> bool {
        ID_ATTRIBUTES.iter().any(|attr| node.attr_str(attr).is_some())
    }

    fn extract(&self, node: &Node) -> Vec<ExtractedReference> {
        let mut out = Vec::new();
        for attr in ID_ATTRIBUTES {
            if let Some(value) = node.attr_str(attr) {
                if is_placeholder(value) {
                    continue;
                }
                let mut components = BTreeMap::new();
                components.insert("attribute".to_string(), attr.to_string());
                if let Some(resource_type) = node.attr_str("resourceType") {
                    components.insert("resourceType".to_string(), resource_type.to_string());
                }
                out.push(ExtractedReference { reference_type: ReferenceType::ResourceId, external_id: value.to_string(), components });
            }
        }
        out
    }

    fn normalize(&self, id: &str) -> String {
        let trimmed = id.trim().to_lowercase();
        let stripped = trimmed.strip_prefix("urn:").unwrap_or(&trimmed);
        stripped.trim_start_matches('0').to_string()
    }

    fn parse_components(&self, _id: &str) -> Option<BTreeMap<String, String>> {
        None
    }
}
