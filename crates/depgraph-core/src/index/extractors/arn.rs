use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

use super::{is_placeholder, ExtractedReference, Extractor, ReferenceType};
use crate::model::Node;

/// Recognizes `arn:(aws|aws-cn|aws-us-gov):<service>:<region>?:<account>?:<resource>`
/// (spec §4.3).
fn arn_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^arn:(aws|aws-cn|aws-us-gov):([a-zA-Z0-9-]+):([a-zA-Z0-9-]*):(\d*):(.+)$").unwrap())
}

const ARN_ATTRIBUTES: &[&str] = &["arn", "bucket_arn", "role_arn", "function_arn", "topic_arn", "queue_arn"];

pub struct ArnExtractor;

impl Extractor for ArnExtractor {
    fn reference_type(&self) -> ReferenceType {
        ReferenceType::Arn
    }

    fn can_handle(&self, node: &Node) -> bool {
        ARN_ATTRIBUTES.iter().any(|attr| node.attr_str(attr).is_some())
    }

    fn extract(&self, node: &Node) -> Vec<ExtractedReference> {
        let mut out = Vec::new();
        for attr in ARN_ATTRIBUTES {
            if let Some(value) = node.attr_str(attr) {
                if is_placeholder(value) || !arn_re().is_match(value) {
                    continue;
                }
                let components = self.parse_components(value).unwrap_or_default();
                out.push(ExtractedReference { reference_type: ReferenceType::Arn, external_id: value.to_string(), components });
            }
        }
        out
    }

    fn normalize(&self, id: &str) -> String {
        id.trim().to_lowercase()
    }

    fn parse_components(&self, id: &str) -> Option<BTreeMap<String, String>> {
        let caps = arn_re().captures(id)?;
        let mut components = BTreeMap::new();
        components.insert("partition".to_string(), caps[1].to_string());
        components.insert("service".to_string(), caps[2].to_string());
        components.insert("region".to_string(), caps[3].to_string());
        components.insert("account".to_string(), caps[4].to_string());
        components.insert("resource".to_string(), caps[5].to_string());
        Some(components)
    }
}
