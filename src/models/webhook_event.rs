use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Ledger of processor events that have already been handled. The webhook
/// endpoint acknowledges a replayed event without reprocessing it.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProcessedWebhookEvent {
    pub stripe_event_id: String,
    pub event_type: String,
    pub processed_at: DateTime<Utc>,
}
