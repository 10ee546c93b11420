use super::{ConfigValidation, MatchResult, Matcher};
use crate::model::Node;

/// Which ARN components participate in equality. A component set to `false`
/// is masked out (wildcarded) before comparison.
#[derive(Debug, Clone, Copy)]
pub struct ArnComponents {
    pub partition: bool,
    pub service: bool,
    pub region: bool,
    pub account: bool,
    pub resource: bool,
}

impl Default for ArnComponents {
    fn default() -> Self {
        Self { partition: true, service: true, region: true, account: true, resource: true }
    }
}

pub struct ArnMatcher {
    pub components: ArnComponents,
    pub allow_partial: bool,
    pub min_confidence: u8,
}

impl Default for ArnMatcher {
    fn default() -> Self {
        Self { components: ArnComponents::default(), allow_partial: false, min_confidence: 0 }
    }
}

/// Parse `arn:partition:service:region:account:resource` into its five parts
/// (the `resource` segment may itself contain colons, so it is captured as
/// everything after the fifth colon).
fn split_arn(arn: &str) -> Option<[String; 5]> {
    let rest = arn.strip_prefix("arn:")?;
    let mut parts = rest.splitn(5, ':');
    let partition = parts.next()?.to_string();
    let service = parts.next()?.to_string();
    let region = parts.next()?.to_string();
    let account = parts.next()?.to_string();
    let resource = parts.next()?.to_string();
    Some([partition, service, region, account, resource])
}

fn mask(parts: &[String; 5], components: ArnComponents) -> [String; 5] {
    let flags = [components.partition, components.service, components.region, components.account, components.resource];
    std::array::from_fn(|i| if flags[i] { parts[i].clone() } else { "*".to_string() })
}

fn wildcard_eq(pattern: &str, value: &str) -> bool {
    if pattern == "*" || value == "*" {
        return true;
    }
    pattern == value
}

impl Matcher for ArnMatcher {
    fn name(&self) -> &'static str {
        "arn"
    }

    fn priority(&self) -> i32 {
        100
    }

    fn min_confidence(&self) -> u8 {
        self.min_confidence
    }

    fn validate_config(&self) -> ConfigValidation {
        ConfigValidation::default()
    }

    fn matches(&self, a: &Node, b: &Node) -> Option<MatchResult> {
        let arn_a = a.attr_str("arn")?;
        let arn_b = b.attr_str("arn")?;
        let parts_a = split_arn(arn_a)?;
        let parts_b = split_arn(arn_b)?;
        let masked_a = mask(&parts_a, self.components);
        let masked_b = mask(&parts_b, self.components);

        let exact = masked_a == masked_b;
        let wildcard = self.allow_partial && masked_a.iter().zip(&masked_b).all(|(x, y)| wildcard_eq(x, y));

        if !exact && !wildcard {
            return None;
        }
        let confidence = if exact { 100 } else { 90 };
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

    fn node_with_arn(id: &str, arn: &str) -> Node {
        Node::new(id, id, NodeKind::TerraformResource, SourceLocation::point("main.tf", 1)).with_attribute("arn", arn)
    }

    #[test]
    fn exact_arn_match_scores_100() {
        let matcher = ArnMatcher::default();
        let a = node_with_arn("a", "arn:aws:s3:::my-bucket");
        let b = node_with_arn("b", "arn:aws:s3:::my-bucket");
        let result = matcher.matches(&a, &b).unwrap();
        assert_eq!(result.confidence, 100);
    }

    #[test]
    fn wildcard_region_match_requires_allow_partial() {
        let a = node_with_arn("a", "arn:aws:rds:us-east-1:1234:db:mydb");
        let b = node_with_arn("b", "arn:aws:rds:us-west-2:1234:db:mydb");

        let strict = ArnMatcher { components: ArnComponents { region: false, ..Default::default() }, allow_partial: false, min_confidence: 0 };
        assert!(strict.matches(&a, &b).is_none());

        let permissive = ArnMatcher { components: ArnComponents { region: false, ..Default::default() }, allow_partial: true, min_confidence: 0 };
        let result = permissive.matches(&a, &b).unwrap();
        assert_eq!(result.confidence, 90);
    }

    #[test]
    fn non_arn_nodes_never_match() {
        let matcher = ArnMatcher::default();
        let a = Node::new("a", "a", NodeKind::TerraformResource, SourceLocation::point("main.tf", 1));
        let b = node_with_arn("b", "arn:aws:s3:::bucket");
        assert!(matcher.matches(&a, &b).is_none());
    }
}
