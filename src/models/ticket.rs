//! Ticket type model

use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::utils::errors::{DoorListError, Result};

/// How a ticket is priced. Sliding-scale carries its own bounds so an
/// invalid combination (min above max, default outside the range) is
/// rejected at construction instead of haunting price checks later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum PricingMode {
    Fixed {
        amount_cents: i64,
    },
    SlidingScale {
        min_cents: i64,
        default_cents: i64,
        max_cents: i64,
    },
}

impl PricingMode {
    pub fn validate(&self) -> Result<()> {
        match self {
            PricingMode::Fixed { amount_cents } => {
                if *amount_cents < 0 {
                    return Err(DoorListError::Validation(
                        "Fixed price must not be negative".to_string(),
                    ));
                }
            }
            PricingMode::SlidingScale {
                min_cents,
                default_cents,
                max_cents,
            } => {
                if *min_cents < 0 {
                    return Err(DoorListError::Validation(
                        "Sliding-scale minimum must not be negative".to_string(),
                    ));
                }
                if !(min_cents <= default_cents && default_cents <= max_cents) {
                    return Err(DoorListError::Validation(format!(
                        "Sliding-scale bounds must satisfy min <= default <= max (got {}/{}/{})",
                        min_cents, default_cents, max_cents
                    )));
                }
            }
        }
        Ok(())
    }

    /// Flatten to the pricing columns:
    /// `(pricing_mode, price_cents, min_price_cents, default_price_cents, max_price_cents)`.
    pub fn to_columns(
        &self,
    ) -> (
        &'static str,
        Option<i64>,
        Option<i64>,
        Option<i64>,
        Option<i64>,
    ) {
        match self {
            PricingMode::Fixed { amount_cents } => {
                ("fixed", Some(*amount_cents), None, None, None)
            }
            PricingMode::SlidingScale {
                min_cents,
                default_cents,
                max_cents,
            } => (
                "sliding-scale",
                None,
                Some(*min_cents),
                Some(*default_cents),
                Some(*max_cents),
            ),
        }
    }

    /// Rebuild from the pricing columns, rejecting combinations the check
    /// constraint should have made unrepresentable.
    pub fn from_columns(
        mode: &str,
        price_cents: Option<i64>,
        min_cents: Option<i64>,
        default_cents: Option<i64>,
        max_cents: Option<i64>,
    ) -> Result<Self> {
        match mode {
            "fixed" => {
                let amount_cents = price_cents.ok_or_else(|| {
                    DoorListError::Validation(
                        "Fixed pricing requires price_cents".to_string(),
                    )
                })?;
                Ok(PricingMode::Fixed { amount_cents })
            }
            "sliding-scale" => match (min_cents, default_cents, max_cents) {
                (Some(min_cents), Some(default_cents), Some(max_cents)) => {
                    Ok(PricingMode::SlidingScale {
                        min_cents,
                        default_cents,
                        max_cents,
                    })
                }
                _ => Err(DoorListError::Validation(
                    "Sliding-scale pricing requires min, default and max".to_string(),
                )),
            },
            other => Err(DoorListError::Validation(format!(
                "Unknown pricing mode '{}'",
                other
            ))),
        }
    }
}

/// A purchasable bundle granting entry to one or more sessions of an event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketType {
    pub id: Uuid,
    pub event_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub pricing: PricingMode,
    /// `None` means unlimited quantity.
    pub quantity_available: Option<i32>,
    pub quantity_sold: i32,
    /// Absent bounds are open-ended on that side.
    pub sales_start: Option<DateTime<Utc>>,
    pub sales_end: Option<DateTime<Utc>>,
    pub is_rsvp: bool,
    pub is_active: bool,
    /// Session codes this ticket grants entry to. Never empty.
    pub session_codes: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TicketType {
    /// Whether `now` falls inside the sales window.
    pub fn sales_window_open(&self, now: DateTime<Utc>) -> bool {
        let after_start = self.sales_start.map_or(true, |start| now >= start);
        let before_end = self.sales_end.map_or(true, |end| now <= end);
        after_start && before_end
    }

    /// Validate the price a buyer offered against this ticket's pricing
    /// mode, returning the effective price in cents.
    ///
    /// RSVP tickets carry no payment and accept only an absent or zero
    /// offer. Fixed tickets accept only their amount. Sliding-scale offers
    /// must fall inside `[min, max]`, defaulting to the configured default
    /// when unspecified.
    pub fn validate_offered_price(&self, offered: Option<i64>) -> Result<i64> {
        if self.is_rsvp {
            return match offered {
                None | Some(0) => Ok(0),
                Some(other) => Err(DoorListError::Validation(format!(
                    "RSVP ticket '{}' does not take payment (offered {})",
                    self.name, other
                ))),
            };
        }

        match &self.pricing {
            PricingMode::Fixed { amount_cents } => match offered {
                None => Ok(*amount_cents),
                Some(x) if x == *amount_cents => Ok(x),
                Some(other) => Err(DoorListError::Validation(format!(
                    "Ticket '{}' has a fixed price of {} (offered {})",
                    self.name, amount_cents, other
                ))),
            },
            PricingMode::SlidingScale {
                min_cents,
                default_cents,
                max_cents,
            } => match offered {
                None => Ok(*default_cents),
                Some(x) if (*min_cents..=*max_cents).contains(&x) => Ok(x),
                Some(other) => Err(DoorListError::Validation(format!(
                    "Offered price {} outside sliding scale [{}, {}] for ticket '{}'",
                    other, min_cents, max_cents, self.name
                ))),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTicketTypeRequest {
    pub event_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub pricing: PricingMode,
    pub quantity_available: Option<i32>,
    pub sales_start: Option<DateTime<Utc>>,
    pub sales_end: Option<DateTime<Utc>>,
    pub is_rsvp: bool,
    pub session_codes: Vec<String>,
}

impl CreateTicketTypeRequest {
    /// A ticket bundling zero sessions is invalid and rejected here, at
    /// creation time, never at availability-check time.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(DoorListError::Validation(
                "Ticket name must not be empty".to_string(),
            ));
        }
        if self.session_codes.is_empty() {
            return Err(DoorListError::Validation(format!(
                "Ticket '{}' must bundle at least one session",
                self.name
            )));
        }
        if let Some(quantity) = self.quantity_available {
            if quantity < 0 {
                return Err(DoorListError::Validation(
                    "Ticket quantity must not be negative".to_string(),
                ));
            }
        }
        if let (Some(start), Some(end)) = (self.sales_start, self.sales_end) {
            if end < start {
                return Err(DoorListError::Validation(
                    "Sales window end must not precede its start".to_string(),
                ));
            }
        }
        self.pricing.validate()
    }
}
