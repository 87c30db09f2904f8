// dispatcher.rs — The mediation pipeline.
//
// A request passes through fixed stages, each of which can end it:
//
//   1. Catalog lookup          → Denied(UnknownOperation)
//   2. Parameter schema check  → Failed(InvalidParameters)
//   3. Policy pre-screen       → Denied (blocked / constraint violation)
//   4. Token acquisition       → Failed (denied, timed out, expired)
//   5. Policy, with scopes     → ElevationRequired
//   6. Adapter call            → Success / Failed (downstream)
//
// The pre-screen at step 3 runs with an empty scope set. Deny reasons never
// depend on scopes, so anything the policy will refuse is refused before a
// consent prompt, a refresh, or a downstream connection can happen. A
// blocked operation must produce zero observable side effects.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use warden_auth::{SessionManager, TokenSnapshot};
use warden_catalog::OperationDescriptor;
use warden_policy::{Decision, DenyReason, OperationRequest, PolicyEngine};

use crate::adapter::{AdapterError, AdapterRegistry, ServiceAdapter};
use crate::audit::{self, AuditError, DecisionLog, DecisionRecord};
use crate::error::MediationError;

/// Dispatcher tuning. Defaults suit interactive agent traffic.
#[derive(Debug, Clone)]
pub struct MediationConfig {
    /// Ceiling on one downstream call (each attempt individually).
    pub call_timeout: Duration,
    /// Extra attempts after the first, for read-only operations only.
    pub read_retries: u32,
    /// Base delay for exponential backoff between retry attempts.
    pub retry_base_delay: Duration,
}

impl Default for MediationConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(30),
            read_retries: 2,
            retry_base_delay: Duration::from_millis(200),
        }
    }
}

impl MediationConfig {
    /// Short timeouts for tests.
    pub fn for_testing() -> Self {
        Self {
            call_timeout: Duration::from_millis(250),
            read_retries: 2,
            retry_base_delay: Duration::from_millis(5),
        }
    }
}

/// How one mediated request ended. Every request gets exactly one outcome;
/// the dispatcher itself never panics or short-circuits past the log.
#[derive(Debug)]
pub enum InvokeOutcome {
    /// The operation ran downstream; here is its result.
    Success { result: Value },
    /// Policy refused the request.
    Denied { reason: DenyReason },
    /// The credential lacks scopes. Re-consent with exactly these scopes
    /// added would make the request permissible.
    ElevationRequired { missing_scopes: BTreeSet<String> },
    /// The operation was permitted but could not be completed.
    Failed { error: MediationError },
}

/// The mediation dispatcher: the only path from agent requests to
/// downstream workspace APIs.
pub struct Mediator {
    engine: PolicyEngine,
    sessions: Arc<SessionManager>,
    adapters: AdapterRegistry,
    config: MediationConfig,
    decision_log: Option<StdMutex<DecisionLog>>,
}

impl Mediator {
    pub fn new(
        engine: PolicyEngine,
        sessions: Arc<SessionManager>,
        adapters: AdapterRegistry,
    ) -> Self {
        Self {
            engine,
            sessions,
            adapters,
            config: MediationConfig::default(),
            decision_log: None,
        }
    }

    pub fn with_config(mut self, config: MediationConfig) -> Self {
        self.config = config;
        self
    }

    /// Attach a JSONL decision log. Every outcome is recorded; a write
    /// failure is logged but never blocks the request itself.
    pub fn with_decision_log(
        mut self,
        path: impl AsRef<std::path::Path>,
    ) -> Result<Self, AuditError> {
        self.decision_log = Some(StdMutex::new(DecisionLog::open(path)?));
        Ok(self)
    }

    /// Mediate one operation request end to end.
    pub async fn invoke(&self, request: &OperationRequest) -> InvokeOutcome {
        let outcome = match self.dispatch(request).await {
            Ok(outcome) => outcome,
            Err(error) => {
                warn!(operation = %request.operation, error = %error, "operation failed");
                InvokeOutcome::Failed { error }
            }
        };
        self.record(request, &outcome);
        outcome
    }

    async fn dispatch(&self, request: &OperationRequest) -> Result<InvokeOutcome, MediationError> {
        let Some(descriptor) = self.engine.catalog().lookup(&request.operation) else {
            debug!(operation = %request.operation, "unknown operation");
            return Ok(InvokeOutcome::Denied {
                reason: DenyReason::UnknownOperation {
                    operation: request.operation.clone(),
                },
            });
        };

        validate_parameters(descriptor, &request.parameters)?;

        // Scope-free pre-screen: refuse before touching credentials.
        if let Decision::Deny { reason } = self.engine.evaluate(request, &BTreeSet::new()) {
            info!(operation = %request.operation, ?reason, "request denied");
            return Ok(InvokeOutcome::Denied { reason });
        }

        // May refresh silently or suspend on a consent flow.
        let snapshot = self.sessions.access_token(&request.account_id).await?;

        match self.engine.evaluate(request, &snapshot.scopes) {
            Decision::Deny { reason } => {
                info!(operation = %request.operation, ?reason, "request denied");
                Ok(InvokeOutcome::Denied { reason })
            }
            Decision::RequireElevation { missing_scopes } => {
                info!(operation = %request.operation, ?missing_scopes, "elevation required");
                Ok(InvokeOutcome::ElevationRequired { missing_scopes })
            }
            Decision::Permit { .. } => {
                let adapter = self.adapters.get(descriptor.service).ok_or(
                    MediationError::AdapterMissing {
                        service: descriptor.service.name(),
                    },
                )?;
                let result = self
                    .call_downstream(adapter.as_ref(), descriptor, request, &snapshot)
                    .await?;
                Ok(InvokeOutcome::Success { result })
            }
        }
    }

    /// Run the adapter call with a per-attempt timeout. Only read-only
    /// operations retry on transient failure; a timed-out attempt counts
    /// as transient. A downstream token rejection invalidates the cached
    /// credential before surfacing.
    async fn call_downstream(
        &self,
        adapter: &dyn ServiceAdapter,
        descriptor: &OperationDescriptor,
        request: &OperationRequest,
        snapshot: &TokenSnapshot,
    ) -> Result<Value, MediationError> {
        let attempts = if descriptor.retryable() {
            self.config.read_retries + 1
        } else {
            1
        };
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let call = adapter.call(descriptor, &request.parameters, &snapshot.access_token);
            let result = match tokio::time::timeout(self.config.call_timeout, call).await {
                Ok(result) => result,
                Err(_) => Err(AdapterError::Transient {
                    detail: "downstream call timed out".to_string(),
                }),
            };
            match result {
                Ok(value) => {
                    debug!(operation = %request.operation, attempt, "operation succeeded");
                    return Ok(value);
                }
                Err(AdapterError::AuthRejected { detail }) => {
                    warn!(operation = %request.operation, "downstream rejected access token");
                    self.sessions.invalidate(&request.account_id).await?;
                    return Err(MediationError::DownstreamRejected {
                        operation: request.operation.clone(),
                        detail,
                    });
                }
                Err(AdapterError::Transient { detail }) if attempt < attempts => {
                    let delay = self.config.retry_base_delay * 2u32.saturating_pow(attempt - 1);
                    warn!(operation = %request.operation, attempt, detail = %detail,
                        "transient downstream failure, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(AdapterError::Transient { detail }) => {
                    return Err(MediationError::DownstreamTransient {
                        operation: request.operation.clone(),
                        detail,
                    })
                }
                Err(AdapterError::Failed { detail }) => {
                    return Err(MediationError::DownstreamFailed {
                        operation: request.operation.clone(),
                        detail,
                    })
                }
            }
        }
    }

    fn record(&self, request: &OperationRequest, outcome: &InvokeOutcome) {
        let Some(log) = &self.decision_log else {
            return;
        };
        let parameters_hash = audit::hash_bytes(
            serde_json::to_string(&request.parameters)
                .unwrap_or_default()
                .as_bytes(),
        );
        let (label, detail) = match outcome {
            InvokeOutcome::Success { .. } => ("success", None),
            InvokeOutcome::Denied { reason } => ("denied", serde_json::to_string(reason).ok()),
            InvokeOutcome::ElevationRequired { missing_scopes } => (
                "elevation_required",
                Some(missing_scopes.iter().cloned().collect::<Vec<_>>().join(" ")),
            ),
            InvokeOutcome::Failed { error } => ("failed", Some(error.to_string())),
        };
        let record = DecisionRecord::new(
            &request.operation,
            &request.account_id,
            parameters_hash,
            label,
            detail,
        );
        let mut log = match log.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = log.append(&record) {
            warn!(error = %e, "failed to append decision record");
        }
    }
}

/// Check a request's parameters against the descriptor's schema: every
/// required parameter present, no parameter outside the schema.
fn validate_parameters(
    descriptor: &OperationDescriptor,
    parameters: &Map<String, Value>,
) -> Result<(), MediationError> {
    for spec in descriptor.parameters {
        if spec.required && !parameters.contains_key(spec.name) {
            return Err(MediationError::InvalidParameters {
                operation: descriptor.name.to_string(),
                detail: format!("missing required parameter '{}'", spec.name),
            });
        }
    }
    for name in parameters.keys() {
        if !descriptor.parameters.iter().any(|spec| spec.name == name) {
            return Err(MediationError::InvalidParameters {
                operation: descriptor.name.to_string(),
                detail: format!("unknown parameter '{}'", name),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_catalog::OperationCatalog;

    fn descriptor(name: &str) -> &'static OperationDescriptor {
        OperationCatalog::builtin().unwrap().lookup(name).unwrap()
    }

    #[test]
    fn missing_required_parameter_is_rejected() {
        let d = descriptor("mail.get_message");
        let err = validate_parameters(d, &Map::new()).unwrap_err();
        match err {
            MediationError::InvalidParameters { detail, .. } => {
                assert!(detail.contains("message_id"))
            }
            other => panic!("expected InvalidParameters, got {other:?}"),
        }
    }

    #[test]
    fn unknown_parameter_is_rejected() {
        let d = descriptor("mail.list_messages");
        let mut params = Map::new();
        params.insert("frobnicate".to_string(), Value::Bool(true));
        let err = validate_parameters(d, &params).unwrap_err();
        match err {
            MediationError::InvalidParameters { detail, .. } => {
                assert!(detail.contains("frobnicate"))
            }
            other => panic!("expected InvalidParameters, got {other:?}"),
        }
    }

    #[test]
    fn optional_parameters_may_be_omitted() {
        let d = descriptor("mail.list_messages");
        assert!(validate_parameters(d, &Map::new()).is_ok());
    }
}
