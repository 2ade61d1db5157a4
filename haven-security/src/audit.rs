use std::sync::Arc;

use haven_core::models::{AuditEvent, SecurityEventType, Severity};
use haven_core::repository::AuditSink;
use haven_core::Actor;
use tracing::{error, info, warn};

/// Best-effort writer for the security audit trail.
///
/// A failed write is logged and swallowed; auditing never blocks the
/// operation being audited.
#[derive(Clone)]
pub struct AuditLogger {
    sink: Arc<dyn AuditSink>,
}

impl AuditLogger {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    pub async fn record(&self, event: AuditEvent) {
        match event.severity {
            Severity::Info => info!(
                event = event.event_type.as_str(),
                resource = event.resource_id.as_deref().unwrap_or("-"),
                "Security event"
            ),
            Severity::Warning => warn!(
                event = event.event_type.as_str(),
                resource = event.resource_id.as_deref().unwrap_or("-"),
                "Security event"
            ),
            Severity::Critical => error!(
                event = event.event_type.as_str(),
                resource = event.resource_id.as_deref().unwrap_or("-"),
                "Security event"
            ),
        }

        if let Err(e) = self.sink.record(&event).await {
            warn!(
                "Failed to persist audit event {} ({}): {}",
                event.id,
                event.event_type.as_str(),
                e
            );
        }
    }

    /// Shorthand for events tied to a single booking.
    pub async fn booking_event(
        &self,
        event_type: SecurityEventType,
        severity: Severity,
        actor: &Actor,
        booking_id: impl ToString,
        details: serde_json::Value,
    ) {
        self.record(
            AuditEvent::new(event_type, severity)
                .actor(actor.audit_label())
                .resource("booking", booking_id)
                .details(details),
        )
        .await;
    }
}
