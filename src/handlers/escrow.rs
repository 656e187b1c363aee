use axum::extract::State;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use sqlx::FromRow;

use crate::auth::ServiceTrigger;
use crate::escrow;
use crate::handlers::notifications::notify;
use crate::models::{EscrowStatus, Transaction};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::success;

/// Pull the transaction together with the seller's payout destination in
/// one scan.
#[derive(FromRow)]
struct EligibleRow {
    #[sqlx(flatten)]
    transaction: Transaction,
    stripe_account_id: String,
}

#[derive(Serialize)]
pub struct ReleaseSummary {
    pub released: usize,
    pub failed: usize,
}

const RELEASE_BATCH_SIZE: i64 = 50;

/// Pays out every held transaction whose hold window has elapsed. Invoked by
/// a periodic external trigger; per-row failures are logged and left for the
/// next run rather than retried here.
pub async fn release_eligible(
    _trigger: ServiceTrigger,
    State(state): State<AppState>,
) -> Result<Response, AppError> {
    let eligible = sqlx::query_as::<_, EligibleRow>(
        "SELECT t.*, a.stripe_account_id
         FROM transactions t
         JOIN stripe_connected_accounts a ON a.user_id = t.seller_id
         WHERE t.status = 'succeeded'
           AND t.escrow_status = 'held'
           AND t.hold_until <= now()
           AND a.payouts_enabled
         ORDER BY t.hold_until ASC
         LIMIT $1",
    )
    .bind(RELEASE_BATCH_SIZE)
    .fetch_all(&state.pool)
    .await?;

    let mut released = 0usize;
    let mut failed = 0usize;

    for row in eligible {
        let tx = &row.transaction;
        match escrow::release_to_seller(
            &state.pool,
            &state.stripe,
            tx,
            &row.stripe_account_id,
            EscrowStatus::Held,
        )
        .await
        {
            Ok(true) => {
                released += 1;
                tracing::info!(transaction_id = %tx.id, "Escrow released to seller");
                notify(
                    &state.pool,
                    tx.seller_id,
                    "payout_sent",
                    format!("{} is on its way to your payout account", tx.seller_proceeds()),
                )
                .await;
            }
            Ok(false) => {
                // Claimed by a concurrent trigger or a dispute landed first
                tracing::debug!(transaction_id = %tx.id, "Release skipped, row no longer held");
            }
            Err(e) => {
                failed += 1;
                tracing::error!(error = ?e, transaction_id = %tx.id,
                    "Escrow release failed, leaving for reprocessing");
            }
        }
    }

    tracing::info!(released, failed, "Escrow release run complete");

    Ok(success(
        ReleaseSummary { released, failed },
        "Escrow release run complete",
    )
    .into_response())
}
