use expensa_core::audit::{AuditEvent, AuditOutcome, AuditSink};
use tracing::{info, warn};

/// Writes audit events into the structured log stream.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        let expense_id = event.expense_id.map(|id| id.0.to_string()).unwrap_or_default();
        let metadata = event
            .metadata
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join(",");

        match event.outcome {
            AuditOutcome::Success => info!(
                event_name = "audit.event",
                audit_event_id = %event.event_id,
                audit_event_type = %event.event_type,
                category = ?event.category,
                correlation_id = %event.correlation_id,
                expense_id = %expense_id,
                actor = %event.actor,
                metadata = %metadata,
                "audit event"
            ),
            AuditOutcome::Rejected | AuditOutcome::Failed => warn!(
                event_name = "audit.event",
                audit_event_id = %event.event_id,
                audit_event_type = %event.event_type,
                category = ?event.category,
                outcome = ?event.outcome,
                correlation_id = %event.correlation_id,
                expense_id = %expense_id,
                actor = %event.actor,
                metadata = %metadata,
                "audit event"
            ),
        }
    }
}
