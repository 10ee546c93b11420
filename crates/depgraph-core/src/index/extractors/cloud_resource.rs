use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

use super::{is_placeholder, ExtractedReference, Extractor, ReferenceType};
use crate::model::Node;

const GCP_ATTRIBUTES: &[&str] = &["self_link", "id"];
const AZURE_ATTRIBUTES: &[&str] = &["id"];

/// `projects/<project>/...` or `//<service>.googleapis.com/projects/<project>/...`.
fn gcp_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"projects/([^/]+)/(.+)$").unwrap())
}

/// `/subscriptions/<id>/resourceGroups/<rg>/providers/<provider>/...`.
fn azure_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^/subscriptions/([^/]+)/resourceGroups/([^/]+)/providers/(.+)$").unwrap())
}

pub struct GcpResourceExtractor;

impl Extractor for GcpResourceExtractor {
    fn reference_type(&self) -> ReferenceType {
        ReferenceType::GcpResource
    }

    fn can_handle(&self, node: &Node) -> bool {
        GCP_ATTRIBUTES.iter().any(|attr| node.attr_str(attr).map(|v| gcp_re().is_match(v)).unwrap_or(false))
    }

    fn extract(&self, node: &Node) -> Vec<ExtractedReference> {
        let mut out = Vec::new();
        for attr in GCP_ATTRIBUTES {
            if let Some(value) = node.attr_str(attr) {
                if is_placeholder(value) || !gcp_re().is_match(value) {
                    continue;
                }
                let components = self.parse_components(value).unwrap_or_default();
                out.push(ExtractedReference { reference_type: ReferenceType::GcpResource, external_id: value.to_string(), components });
            }
        }
        out
    }

    fn normalize(&self, id: &str) -> String {
        id.trim().to_lowercase()
    }

    fn parse_components(&self, id: &str) -> Option<BTreeMap<String, String>> {
        let caps = gcp_re().captures(id)?;
        let mut components = BTreeMap::new();
        components.insert("project".to_string(), caps[1].to_string());
        components.insert("path".to_string(), caps[2].to_string());
        Some(components)
    }
}

pub struct AzureResourceExtractor;

impl Extractor for AzureResourceExtractor {
    fn reference_type(&self) -> ReferenceType {
        ReferenceType::AzureResource
    }

    fn can_handle(&self, node: &Node) -> bool {
        AZURE_ATTRIBUTES.iter().any(|attr| node.attr_str(attr).map(|v| azure_re().is_match(v)).unwrap_or(false))
    }

    fn extract(&self, node: &Node) -> Vec<ExtractedReference> {
        let mut out = Vec::new();
        for attr in AZURE_ATTRIBUTES {
            if let Some(value) = node.attr_str(attr) {
                if is_placeholder(value) || !azure_re().is_match(value) {
                    continue;
                }
                let components = self.parse_components(value).unwrap_or_default();
                out.push(ExtractedReference { reference_type: ReferenceType::AzureResource, external_id: value.to_string(), components });
            }
        }
        out
    }

    fn normalize(&self, id: &str) -> String {
        id.trim().to_lowercase()
    }

    fn parse_components(&self, id: &str) -> Option<BTreeMap<String, String>> {
        let caps = azure_re().captures(id)?;
        let mut components = BTreeMap::new();
        components.insert("subscription".to_string(), caps[1].to_string());
        components.insert("resourceGroup".to_string(), caps[2].to_string());
        components.insert("provider".to_string(), caps[3].to_string());
        Some(components)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gcp_parses_project_and_path() {
        let components = GcpResourceExtractor.parse_components("projects/my-proj/zones/us-central1-a/instances/vm1").unwrap();
        assert_eq!(components.get("project").map(String::as_str), Some("my-proj"));
    }

    #[test]
    fn azure_parses_subscription_and_resource_group() {
        let components = AzureResourceExtractor
            .parse_components("/subscriptions/abc-123/resourceGroups/rg1/providers/Microsoft.Storage/storageAccounts/acct")
            .unwrap();
        assert_eq!(components.get("resourceGroup").map(String::as_str), Some("rg1"));
    }
}
