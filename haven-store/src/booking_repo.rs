use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use haven_core::models::{
    Booking, BookingAmounts, BookingStatus, BookingTarget, GuestContact, GuestEntry,
    PaymentRecord, PaymentStatus,
};
use haven_core::repository::{BookingRepository, InsertBookingError, PaymentRepository};
use haven_core::{Actor, StoreError, StoreResult};
use haven_shared::Masked;
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

const REFERENCE_CONSTRAINT: &str = "bookings_reference_key";

const BOOKING_COLUMNS: &str = r#"
    id, reference, booking_type, property_id, check_in, check_out, experience_instance_id,
    guest_count, guests, base_minor, additional_guest_minor, discount_minor, tax_minor,
    cleaning_fee_minor, total_minor, currency, discount_code, user_id, contact_name,
    contact_email, contact_phone, special_requests, payment_status, booking_status,
    created_at, updated_at
"#;

pub struct PostgresBookingRepository {
    pool: PgPool,
}

impl PostgresBookingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    reference: String,
    booking_type: String,
    property_id: Option<Uuid>,
    check_in: Option<NaiveDate>,
    check_out: Option<NaiveDate>,
    experience_instance_id: Option<Uuid>,
    guest_count: i32,
    guests: Value,
    base_minor: i64,
    additional_guest_minor: i64,
    discount_minor: i64,
    tax_minor: i64,
    cleaning_fee_minor: i64,
    total_minor: i64,
    currency: String,
    discount_code: Option<String>,
    user_id: Option<String>,
    contact_name: String,
    contact_email: String,
    contact_phone: String,
    special_requests: Option<String>,
    payment_status: String,
    booking_status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = StoreError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        let target = match (
            row.booking_type.as_str(),
            row.property_id,
            row.check_in,
            row.check_out,
            row.experience_instance_id,
        ) {
            ("stay", Some(property_id), Some(check_in), Some(check_out), _) => BookingTarget::Stay {
                property_id,
                check_in,
                check_out,
            },
            ("experience", _, _, _, Some(instance_id)) => BookingTarget::Experience { instance_id },
            (kind, ..) => {
                return Err(format!("booking {} has an incomplete {} target", row.id, kind).into())
            }
        };

        let guests: Vec<GuestEntry> = serde_json::from_value(row.guests)?;
        let payment_status = PaymentStatus::parse(&row.payment_status)
            .ok_or_else(|| format!("unknown payment status {}", row.payment_status))?;
        let booking_status = BookingStatus::parse(&row.booking_status)
            .ok_or_else(|| format!("unknown booking status {}", row.booking_status))?;

        Ok(Booking {
            id: row.id,
            reference: row.reference,
            target,
            guest_count: row.guest_count.max(0) as u32,
            guests,
            amounts: BookingAmounts {
                base_minor: row.base_minor,
                additional_guest_minor: row.additional_guest_minor,
                discount_minor: row.discount_minor,
                tax_minor: row.tax_minor,
                cleaning_fee_minor: row.cleaning_fee_minor,
                total_minor: row.total_minor,
                currency: row.currency,
            },
            discount_code: row.discount_code,
            user_id: row.user_id,
            contact: GuestContact {
                full_name: row.contact_name,
                email: Masked::new(row.contact_email),
                phone: Masked::new(row.contact_phone),
            },
            special_requests: row.special_requests,
            payment_status,
            booking_status,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn is_reference_collision(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => {
            db.is_unique_violation() && db.constraint() == Some(REFERENCE_CONSTRAINT)
        }
        _ => false,
    }
}

#[async_trait]
impl BookingRepository for PostgresBookingRepository {
    async fn insert_booking(&self, booking: &Booking) -> Result<(), InsertBookingError> {
        let (booking_type, property_id, check_in, check_out, instance_id) = match &booking.target {
            BookingTarget::Stay {
                property_id,
                check_in,
                check_out,
            } => ("stay", Some(*property_id), Some(*check_in), Some(*check_out), None),
            BookingTarget::Experience { instance_id } => {
                ("experience", None, None, None, Some(*instance_id))
            }
        };
        let guests = serde_json::to_value(&booking.guests)
            .map_err(|e| InsertBookingError::Store(e.into()))?;

        let result = sqlx::query(
            r#"
            INSERT INTO bookings (
                id, reference, booking_type, property_id, check_in, check_out, experience_instance_id,
                guest_count, guests, base_minor, additional_guest_minor, discount_minor, tax_minor,
                cleaning_fee_minor, total_minor, currency, discount_code, user_id, contact_name,
                contact_email, contact_phone, special_requests, payment_status, booking_status,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17,
                    $18, $19, $20, $21, $22, $23, $24, $25, $26)
            "#,
        )
        .bind(booking.id)
        .bind(&booking.reference)
        .bind(booking_type)
        .bind(property_id)
        .bind(check_in)
        .bind(check_out)
        .bind(instance_id)
        .bind(booking.guest_count as i32)
        .bind(guests)
        .bind(booking.amounts.base_minor)
        .bind(booking.amounts.additional_guest_minor)
        .bind(booking.amounts.discount_minor)
        .bind(booking.amounts.tax_minor)
        .bind(booking.amounts.cleaning_fee_minor)
        .bind(booking.amounts.total_minor)
        .bind(&booking.amounts.currency)
        .bind(&booking.discount_code)
        .bind(&booking.user_id)
        .bind(&booking.contact.full_name)
        .bind(booking.contact.email.expose())
        .bind(booking.contact.phone.expose())
        .bind(&booking.special_requests)
        .bind(booking.payment_status.as_str())
        .bind(booking.booking_status.as_str())
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_reference_collision(&e) => {
                Err(InsertBookingError::DuplicateReference(booking.reference.clone()))
            }
            Err(e) => Err(InsertBookingError::Store(e.into())),
        }
    }

    async fn get_booking(&self, id: Uuid) -> StoreResult<Option<Booking>> {
        let query = format!("SELECT {} FROM bookings WHERE id = $1", BOOKING_COLUMNS);
        let row = sqlx::query_as::<_, BookingRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Booking::try_from).transpose()
    }

    async fn find_by_reference(&self, reference: &str) -> StoreResult<Option<Booking>> {
        let query = format!("SELECT {} FROM bookings WHERE reference = $1", BOOKING_COLUMNS);
        let row = sqlx::query_as::<_, BookingRow>(&query)
            .bind(reference)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Booking::try_from).transpose()
    }

    async fn update_status(
        &self,
        id: Uuid,
        booking_status: BookingStatus,
        payment_status: PaymentStatus,
    ) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE bookings SET booking_status = $2, payment_status = $3, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(booking_status.as_str())
        .bind(payment_status.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(format!("booking {} not found", id).into());
        }
        Ok(())
    }

    async fn count_paid_bookings(&self, actor: &Actor) -> StoreResult<u64> {
        let count: i64 = match actor {
            Actor::User { user_id, .. } => {
                sqlx::query_scalar(
                    "SELECT COUNT(*) FROM bookings WHERE user_id = $1 AND payment_status = 'paid'",
                )
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?
            }
            Actor::Guest { email } => {
                sqlx::query_scalar(
                    "SELECT COUNT(*) FROM bookings WHERE LOWER(contact_email) = $1 AND payment_status = 'paid'",
                )
                .bind(email)
                .fetch_one(&self.pool)
                .await?
            }
        };
        Ok(count.max(0) as u64)
    }
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    booking_id: Uuid,
    intent_id: String,
    gateway: String,
    amount_minor: i64,
    currency: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

pub struct PostgresPaymentRepository {
    pool: PgPool,
}

impl PostgresPaymentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PaymentRepository for PostgresPaymentRepository {
    async fn record_payment(&self, record: &PaymentRecord) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO payments (id, booking_id, intent_id, gateway, amount_minor, currency, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(record.id)
        .bind(record.booking_id)
        .bind(&record.intent_id)
        .bind(&record.gateway)
        .bind(record.amount_minor)
        .bind(&record.currency)
        .bind(record.status.as_str())
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_intent(&self, intent_id: &str) -> StoreResult<Option<PaymentRecord>> {
        let row = sqlx::query_as::<_, PaymentRow>(
            "SELECT id, booking_id, intent_id, gateway, amount_minor, currency, status, created_at, updated_at FROM payments WHERE intent_id = $1",
        )
        .bind(intent_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let status = PaymentStatus::parse(&row.status)
            .ok_or_else(|| format!("unknown payment status {}", row.status))?;

        Ok(Some(PaymentRecord {
            id: row.id,
            booking_id: row.booking_id,
            intent_id: row.intent_id,
            gateway: row.gateway,
            amount_minor: row.amount_minor,
            currency: row.currency,
            status,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }))
    }

    async fn update_payment_status(&self, intent_id: &str, status: PaymentStatus) -> StoreResult<()> {
        sqlx::query("UPDATE payments SET status = $2, updated_at = NOW() WHERE intent_id = $1")
            .bind(intent_id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
