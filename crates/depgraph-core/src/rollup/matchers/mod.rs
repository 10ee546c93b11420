pub mod arn;
pub mod name;
pub mod resource_id;
pub mod tag;

use crate::error::DepGraphError;
use crate::model::Node;

pub use arn::ArnMatcher;
pub use name::NameMatcher;
pub use resource_id::ResourceIdMatcher;
pub use tag::TagMatcher;

/// A candidate cross-scan match produced by a single matcher.
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub source_node_id: String,
    pub target_node_id: String,
    pub confidence: u8,
    pub matcher: &'static str,
}

/// Validation outcome for a matcher's own configuration (spec §4.2:
/// "exposes `validateConfig() -> { errors[], warnings[] }`").
#[derive(Debug, Clone, Default)]
pub struct ConfigValidation {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ConfigValidation {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// A single matcher in a rollup's pipeline: decides whether two nodes from
/// different scans refer to the same underlying object.
pub trait Matcher: Send + Sync {
    fn name(&self) -> &'static str;
    /// Evaluated in descending order across the rollup's configured matchers.
    fn priority(&self) -> i32;
    fn min_confidence(&self) -> u8;
    fn validate_config(&self) -> ConfigValidation;
    fn matches(&self, a: &Node, b: &Node) -> Option<MatchResult>;
}

/// Fails create/update if any configured matcher's own config is invalid.
pub fn validate_matchers(matchers: &[Box<dyn Matcher>]) -> Result<(), DepGraphError> {
    for matcher in matchers {
        let validation = matcher.validate_config();
        if !validation.is_valid() {
            return Err(DepGraphError::Repository { detail: format!("matcher '{}': {}", matcher.name(), validation.errors.join("; ")) });
        }
    }
    Ok(())
}
