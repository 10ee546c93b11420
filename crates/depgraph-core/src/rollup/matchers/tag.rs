use std::collections::HashMap;

use super::{ConfigValidation, MatchResult, Matcher};
use crate::model::Node;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagMatchMode {
    All,
    Any,
}

/// A single required tag: a key, and optionally a required value (a
/// value-less entry only requires the tag to be present, per spec §4.2).
#[derive(Debug, Clone)]
pub struct RequiredTag {
    pub key: String,
    pub value: Option<String>,
}

pub struct TagMatcher {
    pub required_tags: Vec<RequiredTag>,
    pub match_mode: TagMatchMode,
    pub min_confidence: u8,
}

impl Default for TagMatcher {
    fn default() -> Self {
        Self { required_tags: Vec::new(), match_mode: TagMatchMode::All, min_confidence: 0 }
    }
}

fn node_tags(node: &Node) -> HashMap<String, String> {
    node.attributes
        .get("tags")
        .and_then(|v| v.as_object())
        .map(|obj| obj.iter().filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string()))).collect())
        .unwrap_or_default()
}

fn satisfies(tags: &HashMap<String, String>, required: &RequiredTag) -> bool {
    match tags.get(&required.key) {
        Some(value) => required.value.as_ref().map(|expected| expected == value).unwrap_or(true),
        None => false,
    }
}

impl Matcher for TagMatcher {
    fn name(&self) -> &'static str {
        "tag"
    }

    fn priority(&self) -> i32 {
        70
    }

    fn min_confidence(&self) -> u8 {
        self.min_confidence
    }

    fn validate_config(&self) -> ConfigValidation {
        let mut validation = ConfigValidation::default();
        if self.required_tags.is_empty() {
            validation.errors.push("tag matcher requires at least one required tag".to_string());
        }
        validation
    }

    fn matches(&self, a: &Node, b: &Node) -> Option<MatchResult> {
        let tags_a = node_tags(a);
        let tags_b = node_tags(b);

        let check = |tags: &HashMap<String, String>| -> bool {
            match self.match_mode {
                TagMatchMode::All => self.required_tags.iter().all(|t| satisfies(tags, t)),
                TagMatchMode::Any => self.required_tags.iter().any(|t| satisfies(tags, t)),
            }
        };

        if !check(&tags_a) || !check(&tags_b) {
            return None;
        }
        let confidence = 85;
        if confidence < self.min_confidence {
            return None;
        }
        Some(MatchResult { source_node_id: a.id.clone(), target_node_id: b.id.clone(), confidence, matcher: self.name() })
    }
}
