use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

use super::{is_placeholder, ExtractedReference, Extractor, ReferenceType};
use crate::model::Node;

const IMAGE_ATTRIBUTES: &[&str] = &["image", "container_image"];

/// `[registry/]repository[:tag][@digest]`.
fn image_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?:([a-zA-Z0-9.-]+(?::\d+)?)/)?([a-zA-Z0-9._/-]+)(?::([a-zA-Z0-9._-]+))?(?:@(sha256:[a-f0-9]+))?$").unwrap())
}

pub struct ContainerImageExtractor;

impl Extractor for ContainerImageExtractor {
    fn reference_type(&self) -> ReferenceType {
        ReferenceType::ContainerImage
    }

    fn can_handle(&self, node: &Node) -> bool {
        IMAGE_ATTRIBUTES.iter().any(|attr| node.attr_str(attr).is_some())
    }

    fn extract(&self, node: &Node) -> Vec<ExtractedReference> {
        let mut out = Vec::new();
        for attr in IMAGE_ATTRIBUTES {
            if let Some(value) = node.attr_str(attr) {
                if is_placeholder(value) {
                    continue;
                }
                let components = self.parse_components(value).unwrap_or_default();
                out.push(ExtractedReference { reference_type: ReferenceType::ContainerImage, external_id: value.to_string(), components });
            }
        }
        out
    }

    fn normalize(&self, id: &str) -> String {
        let trimmed = id.trim();
        if trimmed.contains('@') || trimmed.contains(':') {
            trimmed.to_lowercase()
        } else {
            format!("{}:latest", trimmed.to_lowercase())
        }
    }

    fn parse_components(&self, id: &str) -> Option<BTreeMap<String, String>> {
        let caps = image_re().captures(id.trim())?;
        let mut components = BTreeMap::new();
        if let Some(registry) = caps.get(1) {
            components.insert("registry".to_string(), registry.as_str().to_string());
        }
        components.insert("repository".to_string(), caps[2].to_string());
        components.insert("tag".to_string(), caps.get(3).map(|m| m.as_str()).unwrap_or("latest").to_string());
        if let Some(digest) = caps.get(4) {
            components.insert("digest".to_string(), digest.as_str().to_string());
        }
        Some(components)
    }
}
