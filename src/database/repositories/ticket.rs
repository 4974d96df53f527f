//! Ticket type repository implementation
//!
//! Ticket rows flatten the pricing mode into nullable columns and keep the
//! bundled session codes in a join table, so reads reassemble the domain
//! shape from two queries.

use std::collections::HashMap;

use sqlx::PgPool;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::ticket::{CreateTicketTypeRequest, PricingMode, TicketType};
use crate::utils::errors::DoorListError;

#[derive(Debug, sqlx::FromRow)]
struct TicketTypeRow {
    id: Uuid,
    event_id: Uuid,
    name: String,
    description: Option<String>,
    pricing_mode: String,
    price_cents: Option<i64>,
    min_price_cents: Option<i64>,
    default_price_cents: Option<i64>,
    max_price_cents: Option<i64>,
    quantity_available: Option<i32>,
    quantity_sold: i32,
    sales_start: Option<DateTime<Utc>>,
    sales_end: Option<DateTime<Utc>>,
    is_rsvp: bool,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TicketTypeRow {
    fn into_ticket(self, session_codes: Vec<String>) -> Result<TicketType, DoorListError> {
        let pricing = PricingMode::from_columns(
            &self.pricing_mode,
            self.price_cents,
            self.min_price_cents,
            self.default_price_cents,
            self.max_price_cents,
        )?;

        Ok(TicketType {
            id: self.id,
            event_id: self.event_id,
            name: self.name,
            description: self.description,
            pricing,
            quantity_available: self.quantity_available,
            quantity_sold: self.quantity_sold,
            sales_start: self.sales_start,
            sales_end: self.sales_end,
            is_rsvp: self.is_rsvp,
            is_active: self.is_active,
            session_codes,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Clone, Debug)]
pub struct TicketTypeRepository {
    pool: PgPool,
}

impl TicketTypeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a new ticket type with its bundled sessions
    pub async fn create(
        &self,
        request: CreateTicketTypeRequest,
    ) -> Result<TicketType, DoorListError> {
        request.validate()?;

        let (mode, price, min, default, max) = request.pricing.to_columns();
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, TicketTypeRow>(
            r#"
            INSERT INTO ticket_types (id, event_id, name, description, pricing_mode, price_cents, min_price_cents, default_price_cents, max_price_cents, quantity_available, quantity_sold, sales_start, sales_end, is_rsvp, is_active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 0, $11, $12, $13, true, $14, $14)
            RETURNING id, event_id, name, description, pricing_mode, price_cents, min_price_cents, default_price_cents, max_price_cents, quantity_available, quantity_sold, sales_start, sales_end, is_rsvp, is_active, created_at, updated_at
            "#
        )
        .bind(Uuid::new_v4())
        .bind(request.event_id)
        .bind(&request.name)
        .bind(&request.description)
        .bind(mode)
        .bind(price)
        .bind(min)
        .bind(default)
        .bind(max)
        .bind(request.quantity_available)
        .bind(request.sales_start)
        .bind(request.sales_end)
        .bind(request.is_rsvp)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        for code in &request.session_codes {
            sqlx::query(
                "INSERT INTO ticket_type_sessions (ticket_type_id, event_id, session_code) VALUES ($1, $2, $3)"
            )
            .bind(row.id)
            .bind(request.event_id)
            .bind(code)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        let mut codes = request.session_codes;
        codes.sort();
        codes.dedup();
        row.into_ticket(codes)
    }

    /// Find ticket type by ID
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<TicketType>, DoorListError> {
        let row = sqlx::query_as::<_, TicketTypeRow>(
            "SELECT id, event_id, name, description, pricing_mode, price_cents, min_price_cents, default_price_cents, max_price_cents, quantity_available, quantity_sold, sales_start, sales_end, is_rsvp, is_active, created_at, updated_at FROM ticket_types WHERE id = $1"
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let codes = self.session_codes_for(row.id).await?;
                Ok(Some(row.into_ticket(codes)?))
            }
            None => Ok(None),
        }
    }

    /// List ticket types for an event
    pub async fn list_for_event(
        &self,
        event_id: Uuid,
    ) -> Result<Vec<TicketType>, DoorListError> {
        let rows = sqlx::query_as::<_, TicketTypeRow>(
            "SELECT id, event_id, name, description, pricing_mode, price_cents, min_price_cents, default_price_cents, max_price_cents, quantity_available, quantity_sold, sales_start, sales_end, is_rsvp, is_active, created_at, updated_at FROM ticket_types WHERE event_id = $1 ORDER BY name"
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;

        let code_rows: Vec<(Uuid, String)> = sqlx::query_as(
            "SELECT ticket_type_id, session_code FROM ticket_type_sessions WHERE event_id = $1 ORDER BY session_code"
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;

        let mut codes_by_ticket: HashMap<Uuid, Vec<String>> = HashMap::new();
        for (ticket_type_id, code) in code_rows {
            codes_by_ticket.entry(ticket_type_id).or_default().push(code);
        }

        let mut tickets = Vec::with_capacity(rows.len());
        for row in rows {
            let codes = codes_by_ticket.remove(&row.id).unwrap_or_default();
            tickets.push(row.into_ticket(codes)?);
        }
        Ok(tickets)
    }

    /// Record sold tickets
    pub async fn increment_quantity_sold(
        &self,
        id: Uuid,
        delta: i32,
    ) -> Result<TicketType, DoorListError> {
        let row = sqlx::query_as::<_, TicketTypeRow>(
            r#"
            UPDATE ticket_types
            SET quantity_sold = quantity_sold + $2, updated_at = $3
            WHERE id = $1
            RETURNING id, event_id, name, description, pricing_mode, price_cents, min_price_cents, default_price_cents, max_price_cents, quantity_available, quantity_sold, sales_start, sales_end, is_rsvp, is_active, created_at, updated_at
            "#
        )
        .bind(id)
        .bind(delta)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        let codes = self.session_codes_for(row.id).await?;
        row.into_ticket(codes)
    }

    /// Activate or deactivate a ticket type
    pub async fn set_active(
        &self,
        id: Uuid,
        is_active: bool,
    ) -> Result<TicketType, DoorListError> {
        let row = sqlx::query_as::<_, TicketTypeRow>(
            r#"
            UPDATE ticket_types
            SET is_active = $2, updated_at = $3
            WHERE id = $1
            RETURNING id, event_id, name, description, pricing_mode, price_cents, min_price_cents, default_price_cents, max_price_cents, quantity_available, quantity_sold, sales_start, sales_end, is_rsvp, is_active, created_at, updated_at
            "#
        )
        .bind(id)
        .bind(is_active)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        let codes = self.session_codes_for(row.id).await?;
        row.into_ticket(codes)
    }

    /// Delete ticket type
    pub async fn delete(&self, id: Uuid) -> Result<(), DoorListError> {
        sqlx::query("DELETE FROM ticket_types WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn session_codes_for(&self, ticket_type_id: Uuid) -> Result<Vec<String>, DoorListError> {
        let codes: Vec<(String,)> = sqlx::query_as(
            "SELECT session_code FROM ticket_type_sessions WHERE ticket_type_id = $1 ORDER BY session_code"
        )
        .bind(ticket_type_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(codes.into_iter().map(|(code,)| code).collect())
    }
}
