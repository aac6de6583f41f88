//! `PostgreSQL` registration store for Gatepass.
//!
//! Implements [`RegistrationStore`] and [`EventCatalog`] from `gatepass-core` on top
//! of a sqlx connection pool:
//!
//! - `(subject_id, event_id)` and `ticket_token` uniqueness via unique indexes,
//!   surfaced as [`StoreError::Duplicate`]
//! - payment and attendance changes as single conditional `UPDATE` statements
//! - embedded migrations for the `registrations` table
//!
//! The `events` table belongs to the event-management layer and is only read.
//!
//! # Example
//!
//! ```no_run
//! use gatepass_postgres::PostgresRegistrationStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = sqlx::PgPool::connect("postgres://localhost/gatepass").await?;
//! let store = PostgresRegistrationStore::new(pool);
//! store.migrate().await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gatepass_core::{
    AttendanceUpdate, Currency, EventCatalog, EventId, EventListing, Money, PaymentState,
    PaymentUpdate, Registration, RegistrationId, RegistrationStore, StoreError, SubjectId,
    TenantId,
};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

const REGISTRATION_COLUMNS: &str = "id, subject_id, event_id, tenant_id, payment_state, \
     payment_order_id, amount_minor, currency, ticket_token, ticket_expires_at, \
     attended, attended_at, attended_by, created_at";

fn database_error(context: &str, error: &sqlx::Error) -> StoreError {
    StoreError::Unavailable(format!("{context}: {error}"))
}

fn decode_error(error: &sqlx::Error) -> StoreError {
    StoreError::Corrupt(error.to_string())
}

fn registration_from_row(row: &PgRow) -> Result<Registration, StoreError> {
    let payment_state: String = row.try_get("payment_state").map_err(|e| decode_error(&e))?;
    let payment_state = PaymentState::parse(&payment_state)
        .map_err(|state| StoreError::Corrupt(format!("unknown payment state {state:?}")))?;

    let amount_minor: Option<i64> = row.try_get("amount_minor").map_err(|e| decode_error(&e))?;
    let currency: Option<String> = row.try_get("currency").map_err(|e| decode_error(&e))?;
    let amount = match (amount_minor, currency) {
        (Some(minor), Some(code)) => Some(money(minor, &code)?),
        (None, None) => None,
        _ => {
            return Err(StoreError::Corrupt(
                "amount and currency must be set together".to_string(),
            ));
        }
    };

    let id_column = |column: &str| -> Result<uuid::Uuid, StoreError> {
        row.try_get(column).map_err(|e| decode_error(&e))
    };
    let attended_by: Option<uuid::Uuid> =
        row.try_get("attended_by").map_err(|e| decode_error(&e))?;

    Ok(Registration {
        id: RegistrationId::from_uuid(id_column("id")?),
        subject_id: SubjectId::from_uuid(id_column("subject_id")?),
        event_id: EventId::from_uuid(id_column("event_id")?),
        tenant_id: TenantId::from_uuid(id_column("tenant_id")?),
        payment_state,
        payment_order_id: row.try_get("payment_order_id").map_err(|e| decode_error(&e))?,
        amount,
        ticket_token: row.try_get("ticket_token").map_err(|e| decode_error(&e))?,
        ticket_expires_at: row
            .try_get("ticket_expires_at")
            .map_err(|e| decode_error(&e))?,
        attended: row.try_get("attended").map_err(|e| decode_error(&e))?,
        attended_at: row.try_get("attended_at").map_err(|e| decode_error(&e))?,
        attended_by: attended_by.map(SubjectId::from_uuid),
        created_at: row.try_get("created_at").map_err(|e| decode_error(&e))?,
    })
}

fn money(minor: i64, code: &str) -> Result<Money, StoreError> {
    let minor_units = u64::try_from(minor)
        .map_err(|_| StoreError::Corrupt(format!("negative amount {minor}")))?;
    let currency: Currency = code
        .parse()
        .map_err(|e| StoreError::Corrupt(format!("{e}")))?;
    Ok(Money::new(minor_units, currency))
}

/// `PostgreSQL` registration store.
#[derive(Clone, Debug)]
pub struct PostgresRegistrationStore {
    pool: PgPool,
}

impl PostgresRegistrationStore {
    /// Create a store over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run database migrations.
    ///
    /// # Errors
    ///
    /// Returns error if migrations fail.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Unavailable(format!("Migration failed: {e}")))?;
        tracing::info!("Registration migrations applied");
        Ok(())
    }

    async fn fetch_many(
        &self,
        filter_column: &str,
        value: uuid::Uuid,
    ) -> Result<Vec<Registration>, StoreError> {
        let sql = format!(
            "SELECT {REGISTRATION_COLUMNS} FROM registrations \
             WHERE {filter_column} = $1 ORDER BY created_at, id"
        );
        let rows = sqlx::query(&sql)
            .bind(value)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| database_error("Failed to list registrations", &e))?;
        rows.iter().map(registration_from_row).collect()
    }
}

#[async_trait]
impl RegistrationStore for PostgresRegistrationStore {
    async fn insert(&self, registration: &Registration) -> Result<(), StoreError> {
        let amount_minor = registration
            .amount
            .as_ref()
            .map(|amount| {
                i64::try_from(amount.minor_units).map_err(|_| {
                    StoreError::Corrupt(format!("amount {} out of range", amount.minor_units))
                })
            })
            .transpose()?;

        sqlx::query(
            r"
            INSERT INTO registrations (
                id, subject_id, event_id, tenant_id, payment_state, payment_order_id,
                amount_minor, currency, ticket_token, ticket_expires_at,
                attended, attended_at, attended_by, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $14)
            ",
        )
        .bind(registration.id.as_uuid())
        .bind(registration.subject_id.as_uuid())
        .bind(registration.event_id.as_uuid())
        .bind(registration.tenant_id.as_uuid())
        .bind(registration.payment_state.as_str())
        .bind(registration.payment_order_id.as_deref())
        .bind(amount_minor)
        .bind(registration.amount.as_ref().map(|amount| amount.currency.code()))
        .bind(&registration.ticket_token)
        .bind(registration.ticket_expires_at)
        .bind(registration.attended)
        .bind(registration.attended_at)
        .bind(registration.attended_by.map(|scanner| *scanner.as_uuid()))
        .bind(registration.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db_err) = &e {
                if db_err.is_unique_violation() {
                    tracing::debug!(
                        registration_id = %registration.id,
                        constraint = db_err.constraint().unwrap_or_default(),
                        "Registration insert hit a unique constraint"
                    );
                    return StoreError::Duplicate(
                        db_err.constraint().unwrap_or("registrations").to_string(),
                    );
                }
            }
            database_error("Failed to insert registration", &e)
        })?;

        Ok(())
    }

    async fn find_by_id(&self, id: RegistrationId) -> Result<Option<Registration>, StoreError> {
        let sql = format!("SELECT {REGISTRATION_COLUMNS} FROM registrations WHERE id = $1");
        sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| database_error("Failed to get registration", &e))?
            .as_ref()
            .map(registration_from_row)
            .transpose()
    }

    async fn find_by_subject_and_event(
        &self,
        subject_id: SubjectId,
        event_id: EventId,
    ) -> Result<Option<Registration>, StoreError> {
        let sql = format!(
            "SELECT {REGISTRATION_COLUMNS} FROM registrations \
             WHERE subject_id = $1 AND event_id = $2"
        );
        sqlx::query(&sql)
            .bind(subject_id.as_uuid())
            .bind(event_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| database_error("Failed to get registration", &e))?
            .as_ref()
            .map(registration_from_row)
            .transpose()
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<Registration>, StoreError> {
        let sql =
            format!("SELECT {REGISTRATION_COLUMNS} FROM registrations WHERE ticket_token = $1");
        sqlx::query(&sql)
            .bind(token)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| database_error("Failed to get registration by token", &e))?
            .as_ref()
            .map(registration_from_row)
            .transpose()
    }

    async fn apply_payment_state(
        &self,
        order_id: &str,
        target: PaymentState,
        updated_at: DateTime<Utc>,
    ) -> Result<PaymentUpdate, StoreError> {
        let from: Vec<&str> = target
            .reconcilable_from()
            .iter()
            .map(PaymentState::as_str)
            .collect();

        // Both CTEs see the same snapshot, so `matched` counts rows before the update.
        let row = sqlx::query(
            r"
            WITH matched AS (
                SELECT id FROM registrations WHERE payment_order_id = $1
            ),
            updated AS (
                UPDATE registrations
                SET payment_state = $2, updated_at = $3
                WHERE payment_order_id = $1 AND payment_state = ANY($4::text[])
                RETURNING id
            )
            SELECT
                (SELECT count(*) FROM matched) AS matched,
                (SELECT count(*) FROM updated) AS updated
            ",
        )
        .bind(order_id)
        .bind(target.as_str())
        .bind(updated_at)
        .bind(&from)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| database_error("Failed to update payment state", &e))?;

        let matched: i64 = row.try_get("matched").map_err(|e| decode_error(&e))?;
        let updated: i64 = row.try_get("updated").map_err(|e| decode_error(&e))?;

        Ok(match (matched, u64::try_from(updated).unwrap_or(0)) {
            (0, _) => PaymentUpdate::UnknownOrder,
            (_, 0) => PaymentUpdate::Unchanged,
            (_, count) => PaymentUpdate::Updated(count),
        })
    }

    async fn mark_attended(
        &self,
        id: RegistrationId,
        scanner: SubjectId,
        at: DateTime<Utc>,
    ) -> Result<AttendanceUpdate, StoreError> {
        let sql = format!(
            "UPDATE registrations \
             SET attended = TRUE, attended_at = GREATEST($2, created_at), \
                 attended_by = $3, updated_at = $2 \
             WHERE id = $1 AND attended = FALSE AND payment_state = 'PAID' \
             RETURNING {REGISTRATION_COLUMNS}"
        );
        let updated = sqlx::query(&sql)
            .bind(id.as_uuid())
            .bind(at)
            .bind(scanner.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| database_error("Failed to mark attendance", &e))?;

        if let Some(row) = updated {
            return registration_from_row(&row).map(AttendanceUpdate::CheckedIn);
        }

        // The write lost; attended and payment_state only move forward, so this read
        // explains the loss.
        let current =
            sqlx::query("SELECT attended, payment_state FROM registrations WHERE id = $1")
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| database_error("Failed to read attendance", &e))?;

        let Some(row) = current else {
            return Ok(AttendanceUpdate::NotFound);
        };
        let attended: bool = row.try_get("attended").map_err(|e| decode_error(&e))?;
        if attended {
            return Ok(AttendanceUpdate::AlreadyCheckedIn);
        }
        let state: String = row.try_get("payment_state").map_err(|e| decode_error(&e))?;
        let state = PaymentState::parse(&state)
            .map_err(|state| StoreError::Corrupt(format!("unknown payment state {state:?}")))?;
        Ok(AttendanceUpdate::PaymentIncomplete(state))
    }

    async fn list_for_event(&self, event_id: EventId) -> Result<Vec<Registration>, StoreError> {
        self.fetch_many("event_id", *event_id.as_uuid()).await
    }

    async fn list_for_subject(
        &self,
        subject_id: SubjectId,
    ) -> Result<Vec<Registration>, StoreError> {
        self.fetch_many("subject_id", *subject_id.as_uuid()).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| database_error("Database ping failed", &e))?;
        Ok(())
    }
}

/// Read-only view of the event-management layer's `events` table.
#[derive(Clone, Debug)]
pub struct PostgresEventCatalog {
    pool: PgPool,
}

impl PostgresEventCatalog {
    /// Create a catalog over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventCatalog for PostgresEventCatalog {
    async fn find_event(&self, event_id: EventId) -> Result<Option<EventListing>, StoreError> {
        let row = sqlx::query("SELECT tenant_id, price_minor, currency FROM events WHERE id = $1")
            .bind(event_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| database_error("Failed to get event", &e))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let tenant_id: uuid::Uuid = row.try_get("tenant_id").map_err(|e| decode_error(&e))?;
        let price_minor: Option<i64> = row.try_get("price_minor").map_err(|e| decode_error(&e))?;
        let currency: Option<String> = row.try_get("currency").map_err(|e| decode_error(&e))?;

        let price = match (price_minor, currency) {
            (Some(minor), Some(code)) => Some(money(minor, &code)?),
            (Some(minor), None) if minor == 0 => None,
            (None, _) => None,
            (Some(_), None) => {
                return Err(StoreError::Corrupt(format!(
                    "event {event_id} has a price but no currency"
                )));
            }
        };

        Ok(Some(EventListing {
            event_id,
            tenant_id: TenantId::from_uuid(tenant_id),
            price,
        }))
    }
}
