use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DisputeStatus {
    Open,
    ResolvedRefund,
    ResolvedRelease,
}

/// Opened by a buyer while their transaction's escrow is held; closed by an
/// admin decision that either refunds the buyer or pays out the seller.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TicketDispute {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub opened_by: Uuid,
    pub reason: String,
    pub status: DisputeStatus,
    pub resolution_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}
