use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

use super::{is_placeholder, ExtractedReference, Extractor, ReferenceType};
use crate::model::Node;

const URL_ATTRIBUTES: &[&str] = &["source", "moduleSource", "repository", "url"];

fn git_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?:git::)?(?:https?://|git@|ssh://git@)([^/:]+)[:/]([^/]+/[^/.]+?)(?:\.git)?(?:\?ref=(.+)|//.*)?$").unwrap())
}

pub struct GitUrlExtractor;

impl Extractor for GitUrlExtractor {
    fn reference_type(&self) -> ReferenceType {
        ReferenceType::GitUrl
    }

    fn can_handle(&self, node: &Node) -> bool {
        URL_ATTRIBUTES.iter().any(|attr| node.attr_str(attr).map(|v| git_re().is_match(v)).unwrap_or(false))
    }

    fn extract(&self, node: &Node) -> Vec<ExtractedReference> {
        let mut out = Vec::new();
        for attr in URL_ATTRIBUTES {
            if let Some(value) = node.attr_str(attr) {
                if is_placeholder(value) || !git_re().is_match(value) {
                    continue;
                }
                let components = self.parse_components(value).unwrap_or_default();
                out.push(ExtractedReference { reference_type: ReferenceType::GitUrl, external_id: value.to_string(), components });
            }
        }
        out
    }

    fn normalize(&self, id: &str) -> String {
        id.trim().trim_end_matches(".git").to_lowercase()
    }

    fn parse_components(&self, id: &str) -> Option<BTreeMap<String, String>> {
        let caps = git_re().captures(id)?;
        let mut components = BTreeMap::new();
        components.insert("host".to_string(), caps[1].to_string());
        components.insert("path".to_string(), caps[2].to_string());
        if let Some(git_ref) = caps.get(3) {
            components.insert("ref".to_string(), git_ref.as_str().to_string());
        }
        Some(components)
    }
}
