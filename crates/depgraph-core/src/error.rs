use serde::Serialize;
use thiserror::Error;

/// Severity banding for the error taxonomy (spec §4.3, §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

/// The eight closed error categories the engines raise across detection,
/// rollup, and the external index (spec §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Validation,
    NotFound,
    LimitExceeded,
    Timeout,
    Cache,
    Serialization,
    Repository,
    Extraction,
    Infrastructure,
}

/// Closed, structured error type. Every variant carries a fixed category,
/// severity, HTTP-style status, retryable flag, and a preset user-facing
/// message — never built from ad-hoc runtime string interpolation beyond the
/// offending identifier (spec §7: "User-visible failure messages are preset
/// per error code, never dynamic").
#[derive(Debug, Error, Clone, Serialize)]
#[serde(tag = "code", content = "context")]
pub enum DepGraphError {
    #[error("external id must not be empty or whitespace-only")]
    InvalidExternalId,

    #[error("rollup requires at least 2 repositories, got {found}")]
    InsufficientRepositories { found: usize },

    #[error("rollup requires at least 1 matcher")]
    NoMatchers,

    #[error("name exceeds 255 characters ({len})")]
    NameTooLong { len: usize },

    #[error("cron expression must have 5 or 6 fields, got {found}")]
    InvalidCron { found: usize },

    #[error("rollup config version conflict: expected {expected}, found {actual}")]
    VersionConflict { expected: i64, actual: i64 },

    #[error("duplicate repository id in rollup config: {repository_id}")]
    DuplicateRepository { repository_id: String },

    #[error("{what} '{id}' not found")]
    NotFound { what: &'static str, id: String },

    #[error("limit exceeded: {what} (max {limit}, requested {requested})")]
    LimitExceeded {
        what: &'static str,
        limit: usize,
        requested: usize,
    },

    #[error("operation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("cache operation failed: {detail}")]
    Cache { detail: String },

    #[error("serialization failed: {detail}")]
    Serialization { detail: String },

    #[error("repository operation failed: {detail}")]
    Repository { detail: String },

    #[error("extraction failed for reference type '{reference_type}': {detail}")]
    Extraction { reference_type: String, detail: String },

    #[error("a read without a tenant id was rejected")]
    MissingTenant,

    #[error("rollup is not active (status: {status})")]
    RollupNotActive { status: String },

    #[error("invalid configuration value for {field}: {detail}")]
    InvalidConfig { field: &'static str, detail: &'static str },

    #[error("execution already in progress for this rollup")]
    ExecutionInProgress,

    #[error("infrastructure error: {detail}")]
    Infrastructure { detail: String },
}

impl DepGraphError {
    pub fn category(&self) -> ErrorCategory {
        use DepGraphError::*;
        match self {
            InvalidExternalId
            | InsufficientRepositories { .. }
            | NoMatchers
            | NameTooLong { .. }
            | InvalidCron { .. }
            | DuplicateRepository { .. }
            | MissingTenant
            | InvalidConfig { .. } => ErrorCategory::Validation,
            VersionConflict { .. } => ErrorCategory::Validation,
            NotFound { .. } | RollupNotActive { .. } => ErrorCategory::NotFound,
            LimitExceeded { .. } => ErrorCategory::LimitExceeded,
            Timeout { .. } => ErrorCategory::Timeout,
            Cache { .. } => ErrorCategory::Cache,
            Serialization { .. } => ErrorCategory::Serialization,
            Repository { .. } | ExecutionInProgress => ErrorCategory::Repository,
            Extraction { .. } => ErrorCategory::Extraction,
            Infrastructure { .. } => ErrorCategory::Infrastructure,
        }
    }

    pub fn severity(&self) -> Severity {
        match self.category() {
            ErrorCategory::Validation | ErrorCategory::NotFound | ErrorCategory::LimitExceeded => Severity::Error,
            ErrorCategory::Timeout | ErrorCategory::Cache => Severity::Warning,
            ErrorCategory::Serialization => Severity::Error,
            ErrorCategory::Repository => Severity::Error,
            ErrorCategory::Extraction => Severity::Info,
            ErrorCategory::Infrastructure => Severity::Critical,
        }
    }

    /// HTTP-style status code, used when the engine is fronted by an API
    /// (the HTTP surface itself is an external collaborator; this just
    /// classifies the error the same way that surface would).
    pub fn status(&self) -> u16 {
        match self.category() {
            ErrorCategory::Validation => 400,
            ErrorCategory::NotFound => 404,
            ErrorCategory::LimitExceeded => 422,
            ErrorCategory::Timeout => 504,
            ErrorCategory::Cache => 502,
            ErrorCategory::Serialization => 500,
            ErrorCategory::Repository => 503,
            ErrorCategory::Extraction => 422,
            ErrorCategory::Infrastructure => 503,
        }
    }

    /// Whether a caller may retry this operation unchanged.
    pub fn retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Timeout | ErrorCategory::Cache | ErrorCategory::Repository | ErrorCategory::Infrastructure
        )
    }

    /// Preset, non-dynamic user-facing message.
    pub fn code(&self) -> &'static str {
        use DepGraphError::*;
        match self {
            InvalidExternalId => "INVALID_EXTERNAL_ID",
            InsufficientRepositories { .. } => "INSUFFICIENT_REPOSITORIES",
            NoMatchers => "NO_MATCHERS",
            NameTooLong { .. } => "NAME_TOO_LONG",
            InvalidCron { .. } => "INVALID_CRON",
            VersionConflict { .. } => "VERSION_CONFLICT",
            DuplicateRepository { .. } => "DUPLICATE_REPOSITORY",
            NotFound { .. } => "NOT_FOUND",
            LimitExceeded { .. } => "LIMIT_EXCEEDED",
            Timeout { .. } => "TIMEOUT",
            Cache { .. } => "CACHE_ERROR",
            Serialization { .. } => "SERIALIZATION_ERROR",
            Repository { .. } => "REPOSITORY_ERROR",
            Extraction { .. } => "EXTRACTION_ERROR",
            MissingTenant => "MISSING_TENANT",
            RollupNotActive { .. } => "ROLLUP_NOT_ACTIVE",
            ExecutionInProgress => "EXECUTION_IN_PROGRESS",
            Infrastructure { .. } => "INFRASTRUCTURE_ERROR",
            InvalidConfig { .. } => "INVALID_CONFIG",
        }
    }
}

pub type Result<T> = std::result::Result<T, DepGraphError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_are_not_retryable() {
        assert!(!DepGraphError::InvalidExternalId.retryable());
        assert_eq!(DepGraphError::InvalidExternalId.code(), "INVALID_EXTERNAL_ID");
    }

    #[test]
    fn infrastructure_errors_are_retryable_and_critical() {
        let err = DepGraphError::Infrastructure { detail: "circuit open".into() };
        assert!(err.retryable());
        assert_eq!(err.severity(), Severity::Critical);
    }

    #[test]
    fn not_found_maps_to_404() {
        let err = DepGraphError::NotFound { what: "rollup", id: "r1".into() };
        assert_eq!(err.status(), 404);
        assert!(!err.retryable());
    }
}
