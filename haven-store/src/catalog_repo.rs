use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use haven_core::models::{ExperienceInstance, OccupancySource, OccupiedRange, Property};
use haven_core::repository::{AvailabilityRepository, ExperienceRepository, PropertyRepository};
use haven_core::StoreResult;
use sqlx::PgPool;
use uuid::Uuid;

/// Properties, experience schedules and the nights taken on each property.
pub struct PostgresCatalogRepository {
    pool: PgPool,
}

impl PostgresCatalogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct PropertyRow {
    id: Uuid,
    name: String,
    base_price_minor: i64,
    currency: String,
    cleaning_fee_minor: i64,
    max_guests: i32,
    amenities: Vec<String>,
    state: Option<String>,
    is_active: bool,
}

impl From<PropertyRow> for Property {
    fn from(row: PropertyRow) -> Self {
        Property {
            id: row.id,
            name: row.name,
            base_price_minor: row.base_price_minor,
            currency: row.currency,
            cleaning_fee_minor: row.cleaning_fee_minor,
            max_guests: row.max_guests.max(0) as u32,
            amenities: row.amenities,
            state: row.state,
            is_active: row.is_active,
        }
    }
}

#[derive(sqlx::FromRow)]
struct InstanceRow {
    id: Uuid,
    experience_id: Uuid,
    title: String,
    date: NaiveDate,
    start_time: NaiveTime,
    max_capacity: i32,
    current_attendees: i32,
    price_per_person_minor: Option<i64>,
    flat_fee_minor: Option<i64>,
    currency: String,
}

impl From<InstanceRow> for ExperienceInstance {
    fn from(row: InstanceRow) -> Self {
        ExperienceInstance {
            id: row.id,
            experience_id: row.experience_id,
            title: row.title,
            date: row.date,
            start_time: row.start_time,
            max_capacity: row.max_capacity.max(0) as u32,
            current_attendees: row.current_attendees.max(0) as u32,
            price_per_person_minor: row.price_per_person_minor,
            flat_fee_minor: row.flat_fee_minor,
            currency: row.currency,
        }
    }
}

#[derive(sqlx::FromRow)]
struct RangeRow {
    start_date: NaiveDate,
    end_date: NaiveDate,
    source: String,
}

#[async_trait]
impl PropertyRepository for PostgresCatalogRepository {
    async fn get_property(&self, id: Uuid) -> StoreResult<Option<Property>> {
        let row = sqlx::query_as::<_, PropertyRow>(
            "SELECT id, name, base_price_minor, currency, cleaning_fee_minor, max_guests, amenities, state, is_active FROM properties WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Property::from))
    }
}

#[async_trait]
impl ExperienceRepository for PostgresCatalogRepository {
    async fn get_instance(&self, id: Uuid) -> StoreResult<Option<ExperienceInstance>> {
        let row = sqlx::query_as::<_, InstanceRow>(
            r#"
            SELECT id, experience_id, title, date, start_time, max_capacity, current_attendees,
                   price_per_person_minor, flat_fee_minor, currency
            FROM experience_instances
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(ExperienceInstance::from))
    }

    async fn adjust_attendees(&self, id: Uuid, delta: i32) -> StoreResult<()> {
        // Guarded in SQL so concurrent confirmations cannot overfill a session
        let result = sqlx::query(
            r#"
            UPDATE experience_instances
            SET current_attendees = current_attendees + $2
            WHERE id = $1
              AND current_attendees + $2 >= 0
              AND current_attendees + $2 <= max_capacity
            "#,
        )
        .bind(id)
        .bind(delta)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(format!("attendee change of {} rejected for instance {}", delta, id).into());
        }
        Ok(())
    }
}

#[async_trait]
impl AvailabilityRepository for PostgresCatalogRepository {
    async fn occupied_ranges(
        &self,
        property_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<OccupiedRange>> {
        let rows = sqlx::query_as::<_, RangeRow>(
            r#"
            SELECT check_in AS start_date, check_out AS end_date, 'booking' AS source
            FROM bookings
            WHERE property_id = $1
              AND booking_type = 'stay'
              AND booking_status IN ('pending', 'confirmed', 'checked_in')
              AND check_in < $3
              AND $2 < check_out
            UNION ALL
            SELECT start_date, end_date, 'host_block' AS source
            FROM host_blocks
            WHERE property_id = $1
              AND start_date < $3
              AND $2 < end_date
            "#,
        )
        .bind(property_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| OccupiedRange {
                start: row.start_date,
                end: row.end_date,
                source: if row.source == "host_block" {
                    OccupancySource::HostBlock
                } else {
                    OccupancySource::Booking
                },
            })
            .collect())
    }
}
