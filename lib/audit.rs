//! Audit event sink.
//!
//! The core emits an audit event for every completed trade and resolution.
//! The sink is an external collaborator: a failure to record an event is
//! logged and ignored, it never rolls back a committed financial
//! transaction.
//!
//! Events are emitted while the state transaction is still open, so if the
//! caller aborts instead of committing, the event outlives the rolled-back
//! operation. The audit stream is advisory; the ledger databases are the
//! financial record. Callers that need commit-coupled auditing should
//! install a sink that buffers until their transaction commits.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Who performed the action (account or resolver identity).
    pub actor: String,
    pub action: String,
    /// The resource acted on, e.g. a market id.
    pub resource: String,
    pub details: serde_json::Value,
    pub timestamp: u64,
}

pub type AuditSinkError = Box<dyn std::error::Error + Send + Sync>;

pub trait AuditSink: Send + Sync {
    fn append(&self, event: &AuditEvent) -> Result<(), AuditSinkError>;
}

/// Default sink: structured log record under the `audit` target.
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn append(&self, event: &AuditEvent) -> Result<(), AuditSinkError> {
        tracing::info!(
            target: "audit",
            actor = %event.actor,
            action = %event.action,
            resource = %event.resource,
            details = %event.details,
            timestamp = event.timestamp,
            "audit event"
        );
        Ok(())
    }
}
