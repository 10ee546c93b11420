use super::{ConfigValidation, MatchResult, Matcher};
use crate::model::Node;

/// Normalizes an id attribute value before comparison: lowercases, strips
/// leading zeroes, and strips a `urn:` scheme prefix.
fn normalize(value: &str, normalize: bool) -> String {
    if !normalize {
        return value.to_string();
    }
    let lowered = value.to_lowercase();
    let stripped = lowered.strip_prefix("urn:").unwrap_or(&lowered);
    stripped.trim_start_matches('0').to_string()
}

pub struct ResourceIdMatcher {
    pub id_attribute: String,
    pub normalize: bool,
    pub min_confidence: u8,
}

impl Default for ResourceIdMatcher {
    fn default() -> Self {
        Self { id_attribute: "resourceId".to_string(), normalize: true, min_confidence: 0 }
    }
}

impl Matcher for ResourceIdMatcher {
    fn name(&self) -> &'static str {
        "resource_id"
    }

    fn priority(&self) -> i32 {
        90
    }

    fn min_confidence(&self) -> u8 {
        self.min_confidence
    }

    fn validate_config(&self) -> ConfigValidation {
        let mut validation = ConfigValidation::default();
        if self.id_attribute.trim().is_empty() {
            validation.errors.push("idAttribute must not be empty".to_string());
        }
        validation
    }

    fn matches(&self, a: &Node, b: &Node) -> Option<MatchResult> {
        let type_a = a.attr_str("resourceType")?;
        let type_b = b.attr_str("resourceType")?;
        if type_a != type_b {
            return None;
        }
        let id_a = a.attr_str(&self.id_attribute)?;
        let id_b = b.attr_str(&self.id_attribute)?;
        if normalize(id_a, self.normalize) != normalize(id_b, self.normalize) {
            return None;
        }
        let confidence = 95;
        if confidence < self.min_confidence {
            return None;
        }
        Some(MatchResult { source_node_id: a.id.clone(), target_node_id: b.id.clone(), confidence, matcher: self.name() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NodeKind, SourceLocation};

    fn node(id: &str, resource_type: &str, resource_id: &str) -> Node {
        Node::new(id, id, NodeKind::TerraformResource, SourceLocation::point("main.tf", 1))
            .with_attribute("resourceType", resource_type)
            .with_attribute("resourceId", resource_id)
    }

    #[test]
    fn matches_same_type_and_normalized_id() {
        let matcher = ResourceIdMatcher::default();
        let a = node("a", "aws_instance", "URN:i-0ABC123");
        let b = node("b", "aws_instance", "i-0abc123");
        let result = matcher.matches(&a, &b).unwrap();
        assert_eq!(result.confidence, 95);
    }

    #[test]
    fn different_resource_types_never_match() {
        let matcher = ResourceIdMatcher::default();
        let a = node("a", "aws_instance", "i-1");
        let b = node("b", "aws_volume", "i-1");
        assert!(matcher.matches(&a, &b).is_none());
    }

    #[test]
    fn empty_id_attribute_fails_validation() {
        let matcher = ResourceIdMatcher { id_attribute: String::new(), ..Default::default() };
        assert!(!matcher.validate_config().is_valid());
    }
}
