use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::models::{OfferStatus, TicketOffer, Transaction, UserTicket};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::money;
use crate::utils::response::{created, success};

#[derive(Deserialize)]
pub struct CreateIntentRequest {
    pub ticket_id: Uuid,
    /// Pay an accepted offer's price instead of the list price.
    pub offer_id: Option<Uuid>,
}

#[derive(Serialize)]
pub struct IntentResponse {
    pub transaction_id: Uuid,
    pub payment_intent_id: String,
    pub client_secret: Option<String>,
    pub amount: Decimal,
    pub platform_fee: Decimal,
    pub currency: String,
}

/// Opens a payment intent for a ticket. The ticket is taken off the market
/// (`available -> pending`) for the duration of the attempt; the webhook
/// settles or returns it.
pub async fn create_payment_intent(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<CreateIntentRequest>,
) -> Result<Response, AppError> {
    let ticket = sqlx::query_as::<_, UserTicket>("SELECT * FROM user_tickets WHERE id = $1")
        .bind(body.ticket_id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Ticket '{}' was not found", body.ticket_id)))?;

    if ticket.owner_id == user.user_id {
        return Err(AppError::ValidationError(
            "You cannot buy your own ticket".to_string(),
        ));
    }
    if !ticket.is_purchasable() {
        return Err(AppError::Conflict(
            "This ticket is not available for purchase".to_string(),
        ));
    }

    let amount = match body.offer_id {
        Some(offer_id) => accepted_offer_amount(&state, offer_id, &ticket, user.user_id).await?,
        None => ticket
            .list_price
            .ok_or_else(|| AppError::Conflict("This ticket has no list price".to_string()))?,
    };

    let amount_minor = money::to_minor_units(amount)?;
    let platform_fee = money::platform_fee(amount, state.config.platform_fee_bps);

    // Claim the ticket before any money moves; losing this race is a 409
    let claimed = sqlx::query(
        "UPDATE user_tickets SET sale_status = 'pending', updated_at = now()
         WHERE id = $1 AND sale_status = 'available' AND is_listed",
    )
    .bind(ticket.id)
    .execute(&state.pool)
    .await?;
    if claimed.rows_affected() == 0 {
        return Err(AppError::Conflict(
            "This ticket was just taken by another buyer".to_string(),
        ));
    }

    let transaction_id = Uuid::new_v4();
    let metadata = [
        ("transaction_id", transaction_id.to_string()),
        ("ticket_id", ticket.id.to_string()),
    ];

    let intent = match state
        .stripe
        .create_payment_intent(amount_minor, &state.config.currency, &metadata)
        .await
    {
        Ok(intent) => intent,
        Err(e) => {
            release_ticket_claim(&state, ticket.id).await;
            return Err(e);
        }
    };

    let transaction = match sqlx::query_as::<_, Transaction>(
        "INSERT INTO transactions
             (id, ticket_id, buyer_id, seller_id, amount, platform_fee, currency,
              payment_intent_id)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
         RETURNING *",
    )
    .bind(transaction_id)
    .bind(ticket.id)
    .bind(user.user_id)
    .bind(ticket.owner_id)
    .bind(amount)
    .bind(platform_fee)
    .bind(&state.config.currency)
    .bind(&intent.id)
    .fetch_one(&state.pool)
    .await
    {
        Ok(transaction) => transaction,
        Err(e) => {
            // The intent stays open at the processor; it is never confirmed
            // client-side without a client_secret handed out, so it just ages out.
            tracing::error!(error = ?e, payment_intent_id = %intent.id,
                "Failed to record transaction for payment intent");
            release_ticket_claim(&state, ticket.id).await;
            return Err(AppError::DatabaseError(e));
        }
    };

    tracing::info!(
        transaction_id = %transaction.id,
        ticket_id = %ticket.id,
        amount = %amount,
        "Payment intent opened"
    );

    let payload = IntentResponse {
        transaction_id: transaction.id,
        payment_intent_id: intent.id,
        client_secret: intent.client_secret,
        amount,
        platform_fee,
        currency: state.config.currency.clone(),
    };

    Ok(created(payload, "Payment intent created").into_response())
}

/// The caller's purchase attempts, as buyer or seller.
pub async fn my_transactions(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Response, AppError> {
    let transactions = sqlx::query_as::<_, Transaction>(
        "SELECT * FROM transactions
         WHERE buyer_id = $1 OR seller_id = $1
         ORDER BY created_at DESC",
    )
    .bind(user.user_id)
    .fetch_all(&state.pool)
    .await?;

    Ok(success(transactions, "Your transactions").into_response())
}

async fn accepted_offer_amount(
    state: &AppState,
    offer_id: Uuid,
    ticket: &UserTicket,
    buyer_id: Uuid,
) -> Result<Decimal, AppError> {
    let offer = sqlx::query_as::<_, TicketOffer>("SELECT * FROM ticket_offers WHERE id = $1")
        .bind(offer_id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Offer '{}' was not found", offer_id)))?;

    if offer.ticket_id != ticket.id {
        return Err(AppError::ValidationError(
            "Offer does not belong to this ticket".to_string(),
        ));
    }
    if offer.buyer_id != buyer_id {
        return Err(AppError::Forbidden(
            "This offer belongs to another buyer".to_string(),
        ));
    }
    if offer.status != OfferStatus::Accepted {
        return Err(AppError::Conflict(
            "Only an accepted offer can be paid".to_string(),
        ));
    }
    // The 12-hour window also bounds how long an accepted price stays payable
    if offer.expires_at <= Utc::now() {
        return Err(AppError::Conflict("This offer has expired".to_string()));
    }

    Ok(offer.amount)
}

async fn release_ticket_claim(state: &AppState, ticket_id: Uuid) {
    let result = sqlx::query(
        "UPDATE user_tickets SET sale_status = 'available', updated_at = now()
         WHERE id = $1 AND sale_status = 'pending'",
    )
    .bind(ticket_id)
    .execute(&state.pool)
    .await;

    if let Err(e) = result {
        tracing::error!(error = ?e, ticket_id = %ticket_id,
            "Failed to return ticket to market after aborted purchase");
    }
}
