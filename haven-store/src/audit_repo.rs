use async_trait::async_trait;
use haven_core::models::AuditEvent;
use haven_core::repository::AuditSink;
use haven_core::StoreResult;
use sqlx::PgPool;

/// Append-only `security_audit_log` writer.
pub struct PostgresAuditSink {
    pool: PgPool,
}

impl PostgresAuditSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditSink for PostgresAuditSink {
    async fn record(&self, event: &AuditEvent) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO security_audit_log (id, event_type, actor, resource_type, resource_id, severity, details, occurred_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(event.id)
        .bind(event.event_type.as_str())
        .bind(&event.actor)
        .bind(&event.resource_type)
        .bind(&event.resource_id)
        .bind(event.severity.as_str())
        .bind(&event.details)
        .bind(event.occurred_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
