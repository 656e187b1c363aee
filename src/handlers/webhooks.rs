use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use chrono::Utc;

use crate::escrow;
use crate::handlers::notifications::notify;
use crate::models::{ProcessedWebhookEvent, Transaction};
use crate::state::AppState;
use crate::stripe::webhook::{self, Event};
use crate::utils::error::AppError;
use crate::utils::response::empty_success;

/// Processor callback endpoint. Signature-authenticated raw body; every
/// state transition here is a conditional update so replays are harmless.
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let signature = headers
        .get(webhook::SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::AuthError("Missing webhook signature".to_string()))?;

    let valid = webhook::verify_signature(
        &body,
        signature,
        state.stripe.webhook_secret(),
        Utc::now().timestamp(),
    )?;
    if !valid {
        return Err(AppError::AuthError(
            "Invalid webhook signature".to_string(),
        ));
    }

    let event = webhook::parse_event(&body)?;

    let already_seen = sqlx::query_as::<_, ProcessedWebhookEvent>(
        "SELECT * FROM stripe_webhook_events WHERE stripe_event_id = $1",
    )
    .bind(&event.id)
    .fetch_optional(&state.pool)
    .await?;
    if let Some(seen) = already_seen {
        tracing::debug!(event_id = %seen.stripe_event_id, processed_at = %seen.processed_at,
            "Webhook event already processed");
        return Ok(empty_success("Event already processed").into_response());
    }

    match event.event_type.as_str() {
        "payment_intent.succeeded" => handle_payment_succeeded(&state, &event).await?,
        "payment_intent.payment_failed" => handle_payment_failed(&state, &event).await?,
        "charge.refunded" => handle_charge_refunded(&state, &event).await?,
        "account.updated" => handle_account_updated(&state, &event).await?,
        other => {
            tracing::debug!(event_type = other, "Ignoring unhandled webhook event type");
        }
    }

    sqlx::query(
        "INSERT INTO stripe_webhook_events (stripe_event_id, event_type)
         VALUES ($1, $2)
         ON CONFLICT (stripe_event_id) DO NOTHING",
    )
    .bind(&event.id)
    .bind(&event.event_type)
    .execute(&state.pool)
    .await?;

    Ok(empty_success("Event processed").into_response())
}

/// Charge landed: money enters escrow and the ticket changes hands.
async fn handle_payment_succeeded(state: &AppState, event: &Event) -> Result<(), AppError> {
    let Some(intent_id) = event.data.object["id"].as_str() else {
        tracing::warn!(event_id = %event.id, "payment_intent.succeeded without an id");
        return Ok(());
    };

    let hold_until = escrow::hold_deadline(Utc::now(), state.config.escrow_hold_hours);

    let transaction = sqlx::query_as::<_, Transaction>(
        "UPDATE transactions
         SET status = 'succeeded', escrow_status = 'held', hold_until = $2,
             updated_at = now()
         WHERE payment_intent_id = $1 AND status = 'pending'
         RETURNING *",
    )
    .bind(intent_id)
    .bind(hold_until)
    .fetch_optional(&state.pool)
    .await?;

    let Some(transaction) = transaction else {
        tracing::warn!(payment_intent_id = intent_id,
            "Succeeded payment matched no pending transaction");
        return Ok(());
    };

    sqlx::query(
        "UPDATE user_tickets
         SET owner_id = $2, sale_status = 'sold', is_listed = FALSE, updated_at = now()
         WHERE id = $1",
    )
    .bind(transaction.ticket_id)
    .bind(transaction.buyer_id)
    .execute(&state.pool)
    .await?;

    tracing::info!(
        transaction_id = %transaction.id,
        hold_until = %hold_until,
        "Payment succeeded, escrow held"
    );

    notify(
        &state.pool,
        transaction.buyer_id,
        "purchase_complete",
        "Payment received. Your ticket is now in your account.".to_string(),
    )
    .await;
    notify(
        &state.pool,
        transaction.seller_id,
        "ticket_sold",
        format!(
            "Your ticket sold for {}. Funds will be released after the {}-hour hold.",
            transaction.amount, state.config.escrow_hold_hours
        ),
    )
    .await;

    Ok(())
}

/// Charge failed: the purchase attempt dies and the ticket goes back on sale.
async fn handle_payment_failed(state: &AppState, event: &Event) -> Result<(), AppError> {
    let Some(intent_id) = event.data.object["id"].as_str() else {
        tracing::warn!(event_id = %event.id, "payment_intent.payment_failed without an id");
        return Ok(());
    };

    let transaction = sqlx::query_as::<_, Transaction>(
        "UPDATE transactions
         SET status = 'failed', updated_at = now()
         WHERE payment_intent_id = $1 AND status = 'pending'
         RETURNING *",
    )
    .bind(intent_id)
    .fetch_optional(&state.pool)
    .await?;

    let Some(transaction) = transaction else {
        return Ok(());
    };

    sqlx::query(
        "UPDATE user_tickets SET sale_status = 'available', updated_at = now()
         WHERE id = $1 AND sale_status = 'pending'",
    )
    .bind(transaction.ticket_id)
    .execute(&state.pool)
    .await?;

    notify(
        &state.pool,
        transaction.buyer_id,
        "payment_failed",
        "Your payment did not go through. The ticket has been released.".to_string(),
    )
    .await;

    Ok(())
}

/// Refund confirmation from the processor. The admin resolution path drives
/// refunds; this settles the row even if that write was lost.
async fn handle_charge_refunded(state: &AppState, event: &Event) -> Result<(), AppError> {
    let Some(intent_id) = event.data.object["payment_intent"].as_str() else {
        tracing::warn!(event_id = %event.id, "charge.refunded without a payment_intent");
        return Ok(());
    };

    let updated = sqlx::query(
        "UPDATE transactions
         SET status = 'refunded', escrow_status = 'refunded', updated_at = now()
         WHERE payment_intent_id = $1
           AND status <> 'refunded'
           AND escrow_status IN ('held', 'disputed')",
    )
    .bind(intent_id)
    .execute(&state.pool)
    .await?;

    if updated.rows_affected() > 0 {
        tracing::info!(payment_intent_id = intent_id, "Transaction marked refunded");
    }

    Ok(())
}

/// Onboarding-state mirror for seller payout accounts.
async fn handle_account_updated(state: &AppState, event: &Event) -> Result<(), AppError> {
    let object = &event.data.object;
    let Some(account_id) = object["id"].as_str() else {
        tracing::warn!(event_id = %event.id, "account.updated without an id");
        return Ok(());
    };

    let updated = sqlx::query(
        "UPDATE stripe_connected_accounts
         SET charges_enabled = $2, payouts_enabled = $3, details_submitted = $4,
             updated_at = now()
         WHERE stripe_account_id = $1",
    )
    .bind(account_id)
    .bind(object["charges_enabled"].as_bool().unwrap_or(false))
    .bind(object["payouts_enabled"].as_bool().unwrap_or(false))
    .bind(object["details_submitted"].as_bool().unwrap_or(false))
    .execute(&state.pool)
    .await?;

    if updated.rows_affected() == 0 {
        tracing::debug!(account_id, "account.updated for an account we do not track");
    }

    Ok(())
}
