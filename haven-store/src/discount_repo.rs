use async_trait::async_trait;
use chrono::{DateTime, Utc};
use haven_core::models::{DiscountKind, DiscountRule, RuleCondition};
use haven_core::repository::DiscountRepository;
use haven_core::StoreResult;
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

pub struct PostgresDiscountRepository {
    pool: PgPool,
}

impl PostgresDiscountRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct DiscountRuleRow {
    id: Uuid,
    code: String,
    description: Option<String>,
    kind: Value,
    conditions: Value,
    is_active: bool,
    starts_at: Option<DateTime<Utc>>,
    expires_at: Option<DateTime<Utc>>,
    max_redemptions: Option<i32>,
    redemptions: i32,
}

#[async_trait]
impl DiscountRepository for PostgresDiscountRepository {
    async fn find_rule(&self, code: &str) -> StoreResult<Option<DiscountRule>> {
        let row = sqlx::query_as::<_, DiscountRuleRow>(
            r#"
            SELECT id, code, description, kind, conditions, is_active, starts_at, expires_at,
                   max_redemptions, redemptions
            FROM discount_rules
            WHERE UPPER(code) = $1
            "#,
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        // kind: {"type":"percentage","value":10}, conditions: [{"type":"min_nights","nights":2}]
        let kind: DiscountKind = serde_json::from_value(row.kind)?;
        let conditions: Vec<RuleCondition> = serde_json::from_value(row.conditions)?;

        Ok(Some(DiscountRule {
            id: row.id,
            code: row.code.to_uppercase(),
            description: row.description,
            kind,
            conditions,
            is_active: row.is_active,
            starts_at: row.starts_at,
            expires_at: row.expires_at,
            max_redemptions: row.max_redemptions.map(|m| m.max(0) as u32),
            redemptions: row.redemptions.max(0) as u32,
        }))
    }

    async fn record_redemption(&self, code: &str) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE discount_rules
            SET redemptions = redemptions + 1
            WHERE UPPER(code) = $1
              AND (max_redemptions IS NULL OR redemptions < max_redemptions)
            "#,
        )
        .bind(code.to_uppercase())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
