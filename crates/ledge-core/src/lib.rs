use serde::{Deserialize, Serialize};

// Configuration types shared across all Ledge crates
pub mod config;

// Re-export commonly used config types for convenience
pub use config::{AuditConfig, BackpressurePolicy, LedgeConfig};

/// Kind of served operation being audited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Tool,
    Resource,
    Prompt,
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tool => write!(f, "tool"),
            Self::Resource => write!(f, "resource"),
            Self::Prompt => write!(f, "prompt"),
        }
    }
}

/// Transport through which the caller reached the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallerType {
    Cli,
    Http,
    Stdio,
    /// Internal callers (scheduled jobs, the retention sweep itself).
    System,
}

impl std::fmt::Display for CallerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "cli"),
            Self::Http => write!(f, "http"),
            Self::Stdio => write!(f, "stdio"),
            Self::System => write!(f, "system"),
        }
    }
}

/// Terminal status of an audited operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    Success,
    Error,
}

impl std::fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Decision made by the policy engine for an operation.
///
/// The audit engine only records these; evaluation happens upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyDecision {
    Allow,
    Deny,
    Warn,
    /// No policy applied to the operation.
    #[serde(rename = "n/a")]
    NotApplicable,
}

impl std::fmt::Display for PolicyDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Allow => write!(f, "allow"),
            Self::Deny => write!(f, "deny"),
            Self::Warn => write!(f, "warn"),
            Self::NotApplicable => write!(f, "n/a"),
        }
    }
}

impl Default for PolicyDecision {
    fn default() -> Self {
        Self::NotApplicable
    }
}
