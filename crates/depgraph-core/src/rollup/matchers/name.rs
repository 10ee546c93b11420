use super::{ConfigValidation, MatchResult, Matcher};
use crate::model::Node;

pub struct NameMatcher {
    pub case_sensitive: bool,
    pub namespace_prefix: Option<String>,
    pub min_confidence: u8,
}

impl Default for NameMatcher {
    fn default() -> Self {
        Self { case_sensitive: false, namespace_prefix: None, min_confidence: 0 }
    }
}

impl NameMatcher {
    fn normalized(&self, name: &str) -> String {
        let stripped = match &self.namespace_prefix {
            Some(prefix) => name.strip_prefix(prefix.as_str()).unwrap_or(name),
            None => name,
        };
        if self.case_sensitive {
            stripped.to_string()
        } else {
            stripped.to_lowercase()
        }
    }
}

impl Matcher for NameMatcher {
    fn name(&self) -> &'static str {
        "name"
    }

    fn priority(&self) -> i32 {
        50
    }

    fn min_confidence(&self) -> u8 {
        self.min_confidence
    }

    fn validate_config(&self) -> ConfigValidation {
        ConfigValidation::default()
    }

    fn matches(&self, a: &Node, b: &Node) -> Option<MatchResult> {
        if self.normalized(&a.name) != self.normalized(&b.name) {
            return None;
        }
        let confidence = 75;
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

    fn node(id: &str, name: &str) -> Node {
        Node::new(id, name, NodeKind::TerraformResource, SourceLocation::point("main.tf", 1))
    }

    #[test]
    fn case_insensitive_by_default() {
        let matcher = NameMatcher::default();
        let result = matcher.matches(&node("a", "WebServer"), &node("b", "webserver")).unwrap();
        assert_eq!(result.confidence, 75);
    }

    #[test]
    fn namespace_prefix_is_stripped_before_comparison() {
        let matcher = NameMatcher { namespace_prefix: Some("prod-".to_string()), ..Default::default() };
        assert!(matcher.matches(&node("a", "prod-web"), &node("b", "web")).is_some());
    }

    #[test]
    fn case_sensitive_mode_rejects_mismatched_case() {
        let matcher = NameMatcher { case_sensitive: true, ..Default::default() };
        assert!(matcher.matches(&node("a", "Web"), &node("b", "web")).is_none());
    }
}
