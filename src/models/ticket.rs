use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Availability of a ticket on the marketplace. `Pending` means a payment
/// intent is open against it and it cannot be bought, unlisted, or offered on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SaleStatus {
    Available,
    Pending,
    Sold,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserTicket {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub event_name: String,
    pub event_date: DateTime<Utc>,
    pub venue: String,
    pub section: Option<String>,
    pub seat_row: Option<String>,
    pub seat: Option<String>,
    /// Asking price while listed. Kept after a sale for history.
    pub list_price: Option<Decimal>,
    pub is_listed: bool,
    pub sale_status: SaleStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserTicket {
    /// A ticket can be bought or offered on only while listed and available.
    pub fn is_purchasable(&self) -> bool {
        self.is_listed && self.sale_status == SaleStatus::Available && self.list_price.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticket(is_listed: bool, sale_status: SaleStatus, price: Option<&str>) -> UserTicket {
        UserTicket {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            event_name: "Midnight Run Tour".to_string(),
            event_date: Utc::now(),
            venue: "Riverside Arena".to_string(),
            section: Some("104".to_string()),
            seat_row: Some("C".to_string()),
            seat: Some("12".to_string()),
            list_price: price.map(|p| p.parse().unwrap()),
            is_listed,
            sale_status,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_listed_available_ticket_is_purchasable() {
        assert!(ticket(true, SaleStatus::Available, Some("80.00")).is_purchasable());
    }

    #[test]
    fn test_unlisted_or_taken_ticket_is_not_purchasable() {
        assert!(!ticket(false, SaleStatus::Available, Some("80.00")).is_purchasable());
        assert!(!ticket(true, SaleStatus::Pending, Some("80.00")).is_purchasable());
        assert!(!ticket(true, SaleStatus::Sold, Some("80.00")).is_purchasable());
    }

    #[test]
    fn test_listing_without_price_is_not_purchasable() {
        assert!(!ticket(true, SaleStatus::Available, None).is_purchasable());
    }
}
