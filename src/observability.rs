//! Correlation of staking operations and the transactions they submit

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Correlation ID tying a submitted transaction back to the operation that produced it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct CorrelationId(String);

impl CorrelationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CorrelationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Context of one orchestrated staking operation
///
/// Dependent sub-transactions (the approval inside a bond) run under a child
/// context that shares the parent's correlation id.
#[derive(Debug, Clone)]
pub struct OperationContext {
    pub operation: &'static str,
    pub correlation_id: CorrelationId,
    pub parent: Option<&'static str>,
}

impl OperationContext {
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            correlation_id: CorrelationId::new(),
            parent: None,
        }
    }

    pub fn child(&self, operation: &'static str) -> Self {
        Self {
            operation,
            correlation_id: self.correlation_id.clone(),
            parent: Some(self.operation),
        }
    }

    /// Tracing span for the operation
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "staking_op",
            op = self.operation,
            parent_op = self.parent.unwrap_or(""),
            correlation_id = %self.correlation_id,
        )
    }
}
