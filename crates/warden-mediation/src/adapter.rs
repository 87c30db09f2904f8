// adapter.rs — Downstream service adapters.
//
// An adapter owns the wire details of one workspace service (HTTP client,
// endpoint shapes, response mapping). The dispatcher hands it a permitted
// descriptor, validated parameters, and a one-shot access token; everything
// before that point (policy, schema, credentials) is not the adapter's
// concern. Errors are reported in three buckets so the dispatcher can pick
// the right recovery: retry, credential invalidation, or give up.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use warden_catalog::{OperationDescriptor, Service};

/// How a downstream call failed, from the dispatcher's point of view.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// Momentary failure (timeout, 5xx, connection reset). Read-only
    /// operations may be retried.
    #[error("transient downstream failure: {detail}")]
    Transient { detail: String },

    /// The service rejected the access token (401/403). The credential is
    /// bad regardless of what the session manager thinks.
    #[error("access token rejected downstream: {detail}")]
    AuthRejected { detail: String },

    /// Anything else (4xx semantics, malformed response). Never retried.
    #[error("downstream call failed: {detail}")]
    Failed { detail: String },
}

/// One downstream workspace service.
#[async_trait]
pub trait ServiceAdapter: Send + Sync {
    /// Execute one operation. The token is valid for this call only and
    /// must not be stored.
    async fn call(
        &self,
        descriptor: &OperationDescriptor,
        parameters: &Map<String, Value>,
        access_token: &str,
    ) -> Result<Value, AdapterError>;
}

/// Adapters keyed by service. Built once at startup, immutable after.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: HashMap<Service, Arc<dyn ServiceAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter for a service, replacing any previous one.
    pub fn register(mut self, service: Service, adapter: Arc<dyn ServiceAdapter>) -> Self {
        self.adapters.insert(service, adapter);
        self
    }

    pub fn get(&self, service: Service) -> Option<Arc<dyn ServiceAdapter>> {
        self.adapters.get(&service).cloned()
    }
}
