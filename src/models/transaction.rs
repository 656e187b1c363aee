use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Succeeded,
    Failed,
    Refunded,
}

/// Where the buyer's money sits after a successful charge. Set by the
/// webhook when the payment succeeds; NULL before that.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum EscrowStatus {
    Held,
    Released,
    Disputed,
    Refunded,
}

/// One row per purchase attempt. Money-state transitions are driven by the
/// payment processor's webhooks and by the release/dispute endpoints, always
/// through conditional updates keyed on the prior state.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Transaction {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub buyer_id: Uuid,
    pub seller_id: Uuid,
    pub amount: Decimal,
    pub platform_fee: Decimal,
    pub currency: String,
    pub payment_intent_id: String,
    pub transfer_id: Option<String>,
    pub refund_id: Option<String>,
    pub status: TransactionStatus,
    pub escrow_status: Option<EscrowStatus>,
    pub hold_until: Option<DateTime<Utc>>,
    pub released_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// Net amount the seller receives when escrow is released.
    pub fn seller_proceeds(&self) -> Decimal {
        self.amount - self.platform_fee
    }
}
