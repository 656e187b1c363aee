use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OfferStatus {
    Pending,
    Accepted,
    Declined,
    Expired,
}

/// A bid on a listed ticket. Offers time out after a fixed window; there is
/// no scheduler, so expiry is applied whenever a pending offer is read.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TicketOffer {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub buyer_id: Uuid,
    pub amount: Decimal,
    pub status: OfferStatus,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TicketOffer {
    /// True when a still-pending offer has passed its deadline and should be
    /// flipped to `Expired` before anything else looks at it.
    pub fn is_past_deadline(&self, now: DateTime<Utc>) -> bool {
        self.status == OfferStatus::Pending && self.expires_at <= now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn offer(status: OfferStatus, expires_in: Duration) -> TicketOffer {
        let now = Utc::now();
        TicketOffer {
            id: Uuid::new_v4(),
            ticket_id: Uuid::new_v4(),
            buyer_id: Uuid::new_v4(),
            amount: "65.00".parse().unwrap(),
            status,
            expires_at: now + expires_in,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_pending_offer_within_window_is_live() {
        let o = offer(OfferStatus::Pending, Duration::hours(12));
        assert!(!o.is_past_deadline(Utc::now()));
    }

    #[test]
    fn test_pending_offer_past_deadline() {
        let o = offer(OfferStatus::Pending, Duration::hours(-1));
        assert!(o.is_past_deadline(Utc::now()));
    }

    #[test]
    fn test_deadline_is_inclusive() {
        let o = offer(OfferStatus::Pending, Duration::zero());
        assert!(o.is_past_deadline(o.expires_at));
    }

    #[test]
    fn test_answered_offers_never_expire() {
        let accepted = offer(OfferStatus::Accepted, Duration::hours(-5));
        let declined = offer(OfferStatus::Declined, Duration::hours(-5));
        assert!(!accepted.is_past_deadline(Utc::now()));
        assert!(!declined.is_past_deadline(Utc::now()));
    }
}
