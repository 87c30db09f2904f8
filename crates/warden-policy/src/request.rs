// request.rs — The operation request submitted by the agent runtime.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single operation request. Transient — never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OperationRequest {
    /// Catalog operation name (e.g., "sheets.get_values").
    pub operation: String,
    /// Which account the operation runs against. Single-account deployments
    /// pass one fixed value here.
    pub account_id: String,
    /// Named parameters, as loosely-typed JSON values. The dispatcher
    /// validates these against the descriptor's parameter schema.
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

impl OperationRequest {
    /// Convenience constructor for a request without parameters.
    pub fn new(operation: impl Into<String>, account_id: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            account_id: account_id.into(),
            parameters: Map::new(),
        }
    }

    /// Add a parameter and return self (builder pattern).
    pub fn with_parameter(mut self, name: impl Into<String>, value: Value) -> Self {
        self.parameters.insert(name.into(), value);
        self
    }
}
