//! Ticket availability
//!
//! A ticket type admits to every session it bundles, so its availability is
//! the minimum remaining spots across those sessions, further clamped by the
//! ticket's own unsold quantity.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::models::session::SessionKey;
use crate::models::ticket::TicketType;
use crate::utils::errors::Result;

use super::store::SessionStore;

/// Availability of one ticket type at a point in time.
#[derive(Debug, Clone, Serialize)]
pub struct TicketAvailability {
    pub ticket_type_id: Uuid,
    pub ticket_name: String,
    pub available_spots: i32,
    pub purchasable: bool,
    /// Session that clamped the count, when a session (rather than the
    /// ticket's own quantity) was the binding constraint.
    pub limiting_session: Option<String>,
}

#[derive(Clone)]
pub struct TicketTypeAvailabilityCalculator {
    store: SessionStore,
}

impl TicketTypeAvailabilityCalculator {
    pub fn new(store: SessionStore) -> Self {
        Self { store }
    }

    /// Compute availability for one ticket type. A bundled session missing
    /// from the store counts as zero spots, so stale bundles never oversell.
    pub async fn availability(
        &self,
        ticket: &TicketType,
        now: DateTime<Utc>,
    ) -> Result<TicketAvailability> {
        let mut spots: Option<i32> = None;
        let mut limiting_session: Option<String> = None;

        for code in &ticket.session_codes {
            let key = SessionKey::new(ticket.event_id, code.clone());
            let remaining = match self.store.snapshot(&key).await? {
                Some(snapshot) => snapshot.remaining_spots(),
                None => {
                    warn!(
                        session = %key,
                        ticket_type_id = %ticket.id,
                        "Bundled session is not live, treating as full"
                    );
                    0
                }
            };

            if spots.map_or(true, |current| remaining < current) {
                spots = Some(remaining);
                limiting_session = Some(code.clone());
            }
        }

        // A ticket bundling no sessions admits to nothing.
        let mut available_spots = spots.unwrap_or(0);

        if let Some(quantity) = ticket.quantity_available {
            let unsold = (quantity - ticket.quantity_sold).max(0);
            if unsold < available_spots {
                available_spots = unsold;
                limiting_session = None;
            }
        }

        available_spots = available_spots.max(0);
        let purchasable =
            ticket.is_active && ticket.sales_window_open(now) && available_spots > 0;

        Ok(TicketAvailability {
            ticket_type_id: ticket.id,
            ticket_name: ticket.name.clone(),
            available_spots,
            purchasable,
            limiting_session,
        })
    }

    /// Availability for a whole catalogue of ticket types, in input order.
    pub async fn availability_for_all(
        &self,
        tickets: &[TicketType],
        now: DateTime<Utc>,
    ) -> Result<Vec<TicketAvailability>> {
        let mut results = Vec::with_capacity(tickets.len());
        for ticket in tickets {
            results.push(self.availability(ticket, now).await?);
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capacity::ledger::MemoryCheckInLedger;
    use crate::models::ticket::PricingMode;
    use chrono::Duration;
    use std::sync::Arc;

    fn ticket(event_id: Uuid, sessions: &[&str]) -> TicketType {
        let now = Utc::now();
        TicketType {
            id: Uuid::new_v4(),
            event_id,
            name: "Weekend Pass".to_string(),
            description: None,
            pricing: PricingMode::Fixed { amount_cents: 2500 },
            quantity_available: None,
            quantity_sold: 0,
            sales_start: None,
            sales_end: None,
            is_rsvp: false,
            is_active: true,
            session_codes: sessions.iter().map(|s| s.to_string()).collect(),
            created_at: now,
            updated_at: now,
        }
    }

    async fn store_with_sessions(
        event_id: Uuid,
        sessions: &[(&str, i32, i32, i32)],
    ) -> SessionStore {
        let store = SessionStore::new(Arc::new(MemoryCheckInLedger::new()), 16);
        for (code, capacity, registered, checked_in) in sessions {
            store
                .register_counts(
                    SessionKey::new(event_id, *code),
                    *capacity,
                    *registered,
                    *checked_in,
                )
                .await;
        }
        store
    }

    #[tokio::test]
    async fn test_min_across_bundled_sessions() {
        let event_id = Uuid::new_v4();
        let store =
            store_with_sessions(event_id, &[("S1", 10, 8, 0), ("S2", 10, 4, 0)]).await;
        let calculator = TicketTypeAvailabilityCalculator::new(store);

        let availability = calculator
            .availability(&ticket(event_id, &["S1", "S2"]), Utc::now())
            .await
            .unwrap();

        assert_eq!(availability.available_spots, 2);
        assert_eq!(availability.limiting_session.as_deref(), Some("S1"));
        assert!(availability.purchasable);
    }

    #[tokio::test]
    async fn test_one_full_session_zeroes_the_bundle() {
        let event_id = Uuid::new_v4();
        let store =
            store_with_sessions(event_id, &[("S1", 10, 8, 0), ("S2", 10, 10, 0)]).await;
        let calculator = TicketTypeAvailabilityCalculator::new(store);

        let availability = calculator
            .availability(&ticket(event_id, &["S1", "S2"]), Utc::now())
            .await
            .unwrap();

        assert_eq!(availability.available_spots, 0);
        assert_eq!(availability.limiting_session.as_deref(), Some("S2"));
        assert!(!availability.purchasable);
    }

    #[tokio::test]
    async fn test_overbooked_session_clamps_to_zero() {
        let event_id = Uuid::new_v4();
        let store = store_with_sessions(event_id, &[("S1", 5, 2, 7)]).await;
        let calculator = TicketTypeAvailabilityCalculator::new(store);

        let availability = calculator
            .availability(&ticket(event_id, &["S1"]), Utc::now())
            .await
            .unwrap();

        assert_eq!(availability.available_spots, 0);
    }

    #[tokio::test]
    async fn test_quantity_clamp() {
        let event_id = Uuid::new_v4();
        let store = store_with_sessions(event_id, &[("S1", 100, 10, 0)]).await;
        let calculator = TicketTypeAvailabilityCalculator::new(store);

        let mut limited = ticket(event_id, &["S1"]);
        limited.quantity_available = Some(20);
        limited.quantity_sold = 15;

        let availability = calculator
            .availability(&limited, Utc::now())
            .await
            .unwrap();

        assert_eq!(availability.available_spots, 5);
        assert_eq!(availability.limiting_session, None);
    }

    #[tokio::test]
    async fn test_missing_session_counts_as_full() {
        let event_id = Uuid::new_v4();
        let store = store_with_sessions(event_id, &[("S1", 10, 0, 0)]).await;
        let calculator = TicketTypeAvailabilityCalculator::new(store);

        let availability = calculator
            .availability(&ticket(event_id, &["S1", "GHOST"]), Utc::now())
            .await
            .unwrap();

        assert_eq!(availability.available_spots, 0);
        assert_eq!(availability.limiting_session.as_deref(), Some("GHOST"));
    }

    #[tokio::test]
    async fn test_checked_in_beyond_registered_consumes_spots() {
        let event_id = Uuid::new_v4();
        let store = store_with_sessions(event_id, &[("S1", 10, 3, 6)]).await;
        let calculator = TicketTypeAvailabilityCalculator::new(store);

        let availability = calculator
            .availability(&ticket(event_id, &["S1"]), Utc::now())
            .await
            .unwrap();

        assert_eq!(availability.available_spots, 4);
    }

    #[tokio::test]
    async fn test_sales_window_gates_purchasable() {
        let event_id = Uuid::new_v4();
        let store = store_with_sessions(event_id, &[("S1", 10, 0, 0)]).await;
        let calculator = TicketTypeAvailabilityCalculator::new(store);
        let now = Utc::now();

        let mut closed = ticket(event_id, &["S1"]);
        closed.sales_end = Some(now - Duration::hours(1));

        let availability = calculator.availability(&closed, now).await.unwrap();
        assert_eq!(availability.available_spots, 10);
        assert!(!availability.purchasable);
    }

    #[tokio::test]
    async fn test_inactive_ticket_not_purchasable() {
        let event_id = Uuid::new_v4();
        let store = store_with_sessions(event_id, &[("S1", 10, 0, 0)]).await;
        let calculator = TicketTypeAvailabilityCalculator::new(store);

        let mut inactive = ticket(event_id, &["S1"]);
        inactive.is_active = false;

        let availability = calculator
            .availability(&inactive, Utc::now())
            .await
            .unwrap();
        assert!(!availability.purchasable);
    }
}
