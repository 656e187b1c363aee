use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Local mirror of a seller's connected account at the payment processor.
/// The processor is the source of truth; these flags are refreshed from
/// `account.updated` webhooks and on-demand status reads.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ConnectedAccount {
    pub id: Uuid,
    pub user_id: Uuid,
    pub stripe_account_id: String,
    pub charges_enabled: bool,
    pub payouts_enabled: bool,
    pub details_submitted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
