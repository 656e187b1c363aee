use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::{AdminUser, AuthUser};
use crate::escrow;
use crate::handlers::notifications::notify;
use crate::models::{ConnectedAccount, DisputeStatus, EscrowStatus, TicketDispute, Transaction};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{created, success};

#[derive(Deserialize)]
pub struct OpenDisputeRequest {
    pub transaction_id: Uuid,
    pub reason: String,
}

#[derive(Deserialize)]
pub struct ResolveDisputeRequest {
    pub resolution: Resolution,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    /// Uphold the dispute: refund the buyer, return the ticket to the seller.
    Refund,
    /// Reject the dispute: pay the seller out immediately.
    Release,
}

/// Buyer flags a problem while their money is still in escrow. Freezes the
/// transaction against release until an admin decides.
pub async fn open_dispute(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<OpenDisputeRequest>,
) -> Result<Response, AppError> {
    if body.reason.trim().is_empty() {
        return Err(AppError::ValidationError(
            "A reason is required to open a dispute".to_string(),
        ));
    }

    let transaction = fetch_transaction(&state, body.transaction_id).await?;

    if transaction.buyer_id != user.user_id {
        return Err(AppError::Forbidden(
            "Only the buyer can dispute this transaction".to_string(),
        ));
    }
    if !escrow::can_open_dispute(&transaction) {
        return Err(AppError::Conflict(
            "This transaction can no longer be disputed".to_string(),
        ));
    }

    let frozen = sqlx::query(
        "UPDATE transactions SET escrow_status = 'disputed', updated_at = now()
         WHERE id = $1 AND escrow_status = 'held'",
    )
    .bind(transaction.id)
    .execute(&state.pool)
    .await?;
    if frozen.rows_affected() == 0 {
        return Err(AppError::Conflict(
            "This transaction can no longer be disputed".to_string(),
        ));
    }

    let dispute = sqlx::query_as::<_, TicketDispute>(
        "INSERT INTO ticket_disputes (transaction_id, opened_by, reason)
         VALUES ($1, $2, $3)
         RETURNING *",
    )
    .bind(transaction.id)
    .bind(user.user_id)
    .bind(body.reason.trim())
    .fetch_one(&state.pool)
    .await?;

    tracing::info!(dispute_id = %dispute.id, transaction_id = %transaction.id, "Dispute opened");

    notify(
        &state.pool,
        transaction.seller_id,
        "dispute_opened",
        "The buyer has disputed a recent sale. The payout is on hold while we review it."
            .to_string(),
    )
    .await;

    Ok(created(dispute, "Dispute opened").into_response())
}

/// Admin decision on an open dispute: refund the buyer or pay out the seller.
pub async fn resolve_dispute(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(dispute_id): Path<Uuid>,
    Json(body): Json<ResolveDisputeRequest>,
) -> Result<Response, AppError> {
    let dispute = sqlx::query_as::<_, TicketDispute>(
        "SELECT * FROM ticket_disputes WHERE id = $1",
    )
    .bind(dispute_id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Dispute '{}' was not found", dispute_id)))?;

    if dispute.status != DisputeStatus::Open {
        return Err(AppError::Conflict(
            "This dispute has already been resolved".to_string(),
        ));
    }

    let transaction = fetch_transaction(&state, dispute.transaction_id).await?;

    let resolved_status = match body.resolution {
        Resolution::Refund => DisputeStatus::ResolvedRefund,
        Resolution::Release => DisputeStatus::ResolvedRelease,
    };

    // Claim the dispute row first so two admins cannot both move money
    let claimed = sqlx::query(
        "UPDATE ticket_disputes
         SET status = $2, resolution_note = $3, resolved_at = now()
         WHERE id = $1 AND status = 'open'",
    )
    .bind(dispute.id)
    .bind(resolved_status)
    .bind(&body.note)
    .execute(&state.pool)
    .await?;
    if claimed.rows_affected() == 0 {
        return Err(AppError::Conflict(
            "This dispute has already been resolved".to_string(),
        ));
    }

    let outcome = match body.resolution {
        Resolution::Refund => refund_buyer(&state, &transaction).await,
        Resolution::Release => pay_out_seller(&state, &transaction).await,
    };

    if let Err(e) = outcome {
        // Reopen so the decision can be retried once the processor recovers
        sqlx::query(
            "UPDATE ticket_disputes
             SET status = 'open', resolution_note = NULL, resolved_at = NULL
             WHERE id = $1 AND status = $2",
        )
        .bind(dispute.id)
        .bind(resolved_status)
        .execute(&state.pool)
        .await?;
        return Err(e);
    }

    tracing::info!(
        dispute_id = %dispute.id,
        resolution = ?body.resolution,
        admin_id = %admin.0.user_id,
        "Dispute resolved"
    );

    let refreshed = sqlx::query_as::<_, TicketDispute>(
        "SELECT * FROM ticket_disputes WHERE id = $1",
    )
    .bind(dispute.id)
    .fetch_one(&state.pool)
    .await?;

    Ok(success(refreshed, "Dispute resolved").into_response())
}

/// Uphold: refund at the processor, settle the row, hand the ticket back.
async fn refund_buyer(state: &AppState, transaction: &Transaction) -> Result<(), AppError> {
    let refund = state
        .stripe
        .create_refund(&transaction.payment_intent_id)
        .await?;

    let settled = sqlx::query(
        "UPDATE transactions
         SET status = 'refunded', escrow_status = 'refunded', refund_id = $2,
             updated_at = now()
         WHERE id = $1 AND escrow_status IN ('held', 'disputed')",
    )
    .bind(transaction.id)
    .bind(&refund.id)
    .execute(&state.pool)
    .await?;
    if settled.rows_affected() == 0 {
        // The refund webhook can land first and settle the row; the refund
        // itself went through, so carry on
        tracing::debug!(transaction_id = %transaction.id,
            "Transaction was already settled as refunded");
    }

    sqlx::query(
        "UPDATE user_tickets
         SET owner_id = $2, sale_status = 'available', is_listed = FALSE, updated_at = now()
         WHERE id = $1",
    )
    .bind(transaction.ticket_id)
    .bind(transaction.seller_id)
    .execute(&state.pool)
    .await?;

    notify(
        &state.pool,
        transaction.buyer_id,
        "dispute_refunded",
        "Your dispute was upheld and a refund is on its way.".to_string(),
    )
    .await;
    notify(
        &state.pool,
        transaction.seller_id,
        "dispute_refunded",
        "A disputed sale was refunded to the buyer. The ticket is back in your account."
            .to_string(),
    )
    .await;

    Ok(())
}

/// Reject: the seller is paid out immediately instead of waiting for the
/// next release run.
async fn pay_out_seller(state: &AppState, transaction: &Transaction) -> Result<(), AppError> {
    let account = sqlx::query_as::<_, ConnectedAccount>(
        "SELECT * FROM stripe_connected_accounts WHERE user_id = $1",
    )
    .bind(transaction.seller_id)
    .fetch_optional(&state.pool)
    .await?
    .filter(|account| account.payouts_enabled)
    .ok_or_else(|| {
        AppError::Conflict("The seller cannot receive payouts yet".to_string())
    })?;

    let released = escrow::release_to_seller(
        &state.pool,
        &state.stripe,
        transaction,
        &account.stripe_account_id,
        EscrowStatus::Disputed,
    )
    .await?;
    if !released {
        return Err(AppError::Conflict(
            "Escrow was already settled for this transaction".to_string(),
        ));
    }

    notify(
        &state.pool,
        transaction.seller_id,
        "dispute_rejected",
        format!(
            "The dispute on your sale was rejected. {} is on its way to you.",
            transaction.seller_proceeds()
        ),
    )
    .await;
    notify(
        &state.pool,
        transaction.buyer_id,
        "dispute_rejected",
        "Your dispute was reviewed and not upheld.".to_string(),
    )
    .await;

    Ok(())
}

async fn fetch_transaction(state: &AppState, id: Uuid) -> Result<Transaction, AppError> {
    sqlx::query_as::<_, Transaction>("SELECT * FROM transactions WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Transaction '{}' was not found", id)))
}
