use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::handlers::notifications::notify;
use crate::models::{OfferStatus, TicketOffer, UserTicket};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::money;
use crate::utils::response::{created, success};

#[derive(Deserialize)]
pub struct CreateOfferRequest {
    pub ticket_id: Uuid,
    pub amount: Decimal,
}

/// Places a bid on a listed ticket. One live offer per buyer per ticket.
pub async fn create_offer(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<CreateOfferRequest>,
) -> Result<Response, AppError> {
    money::to_minor_units(body.amount)?;

    let ticket = sqlx::query_as::<_, UserTicket>("SELECT * FROM user_tickets WHERE id = $1")
        .bind(body.ticket_id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Ticket '{}' was not found", body.ticket_id)))?;

    if ticket.owner_id == user.user_id {
        return Err(AppError::ValidationError(
            "You cannot make an offer on your own ticket".to_string(),
        ));
    }
    if !ticket.is_purchasable() {
        return Err(AppError::Conflict(
            "This ticket is not open for offers".to_string(),
        ));
    }

    // Flip any timed-out offer by this buyer first so it does not block a
    // fresh one; expiry has no scheduler and is applied on read.
    expire_stale_offers(&state, Some(body.ticket_id), Some(user.user_id)).await?;

    let expires_at = Utc::now() + Duration::hours(state.config.offer_ttl_hours);

    let offer = sqlx::query_as::<_, TicketOffer>(
        "INSERT INTO ticket_offers (ticket_id, buyer_id, amount, expires_at)
         VALUES ($1, $2, $3, $4)
         RETURNING *",
    )
    .bind(body.ticket_id)
    .bind(user.user_id)
    .bind(body.amount)
    .bind(expires_at)
    .fetch_one(&state.pool)
    .await
    .map_err(|e| {
        if let sqlx::Error::Database(db) = &e {
            if db.constraint() == Some("idx_ticket_offers_one_pending") {
                return AppError::Conflict(
                    "You already have a pending offer on this ticket".to_string(),
                );
            }
        }
        AppError::DatabaseError(e)
    })?;

    tracing::info!(offer_id = %offer.id, ticket_id = %ticket.id, "Offer placed");

    notify(
        &state.pool,
        ticket.owner_id,
        "offer_received",
        format!("New offer of {} on your {} ticket", offer.amount, ticket.event_name),
    )
    .await;

    Ok(created(offer, "Offer placed").into_response())
}

/// Offers the caller has made.
pub async fn sent_offers(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Response, AppError> {
    expire_stale_offers(&state, None, Some(user.user_id)).await?;

    let offers = sqlx::query_as::<_, TicketOffer>(
        "SELECT * FROM ticket_offers WHERE buyer_id = $1 ORDER BY created_at DESC",
    )
    .bind(user.user_id)
    .fetch_all(&state.pool)
    .await?;

    Ok(success(offers, "Offers you have made").into_response())
}

/// Offers on the caller's tickets.
pub async fn received_offers(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Response, AppError> {
    sqlx::query(
        "UPDATE ticket_offers SET status = 'expired', updated_at = now()
         WHERE status = 'pending' AND expires_at <= now()
           AND ticket_id IN (SELECT id FROM user_tickets WHERE owner_id = $1)",
    )
    .bind(user.user_id)
    .execute(&state.pool)
    .await?;

    let offers = sqlx::query_as::<_, TicketOffer>(
        "SELECT o.* FROM ticket_offers o
         JOIN user_tickets t ON t.id = o.ticket_id
         WHERE t.owner_id = $1
         ORDER BY o.created_at DESC",
    )
    .bind(user.user_id)
    .fetch_all(&state.pool)
    .await?;

    Ok(success(offers, "Offers on your tickets").into_response())
}

/// Accepts a pending offer. Other pending offers on the ticket are declined.
pub async fn accept_offer(
    State(state): State<AppState>,
    user: AuthUser,
    Path(offer_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let (offer, ticket) = fetch_offer_for_seller(&state, offer_id, user.user_id).await?;

    if offer.status != OfferStatus::Pending {
        return Err(AppError::Conflict(
            "This offer has already been answered".to_string(),
        ));
    }
    if offer.is_past_deadline(Utc::now()) {
        sqlx::query(
            "UPDATE ticket_offers SET status = 'expired', updated_at = now()
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(offer_id)
        .execute(&state.pool)
        .await?;
        return Err(AppError::Conflict("This offer has expired".to_string()));
    }
    if !ticket.is_purchasable() {
        return Err(AppError::Conflict(
            "The ticket is no longer available".to_string(),
        ));
    }

    let accepted = sqlx::query_as::<_, TicketOffer>(
        "UPDATE ticket_offers SET status = 'accepted', updated_at = now()
         WHERE id = $1 AND status = 'pending'
         RETURNING *",
    )
    .bind(offer_id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::Conflict("This offer has already been answered".to_string()))?;

    // Losing bidders are declined outright rather than left to time out
    let declined: Vec<(Uuid,)> = sqlx::query_as(
        "UPDATE ticket_offers SET status = 'declined', updated_at = now()
         WHERE ticket_id = $1 AND id <> $2 AND status = 'pending'
         RETURNING buyer_id",
    )
    .bind(ticket.id)
    .bind(offer_id)
    .fetch_all(&state.pool)
    .await?;

    notify(
        &state.pool,
        accepted.buyer_id,
        "offer_accepted",
        format!(
            "Your offer of {} on {} was accepted. Complete the purchase before it expires.",
            accepted.amount, ticket.event_name
        ),
    )
    .await;
    for (buyer_id,) in declined {
        notify(
            &state.pool,
            buyer_id,
            "offer_declined",
            format!("Your offer on {} was declined", ticket.event_name),
        )
        .await;
    }

    Ok(success(accepted, "Offer accepted").into_response())
}

pub async fn decline_offer(
    State(state): State<AppState>,
    user: AuthUser,
    Path(offer_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let (offer, ticket) = fetch_offer_for_seller(&state, offer_id, user.user_id).await?;

    if offer.status != OfferStatus::Pending {
        return Err(AppError::Conflict(
            "This offer has already been answered".to_string(),
        ));
    }

    let declined = sqlx::query_as::<_, TicketOffer>(
        "UPDATE ticket_offers SET status = 'declined', updated_at = now()
         WHERE id = $1 AND status = 'pending'
         RETURNING *",
    )
    .bind(offer_id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::Conflict("This offer has already been answered".to_string()))?;

    notify(
        &state.pool,
        declined.buyer_id,
        "offer_declined",
        format!("Your offer on {} was declined", ticket.event_name),
    )
    .await;

    Ok(success(declined, "Offer declined").into_response())
}

/// Flips timed-out pending offers to `expired`, optionally scoped to one
/// ticket and/or one buyer.
async fn expire_stale_offers(
    state: &AppState,
    ticket_id: Option<Uuid>,
    buyer_id: Option<Uuid>,
) -> Result<(), AppError> {
    sqlx::query(
        "UPDATE ticket_offers SET status = 'expired', updated_at = now()
         WHERE status = 'pending' AND expires_at <= now()
           AND ($1::uuid IS NULL OR ticket_id = $1)
           AND ($2::uuid IS NULL OR buyer_id = $2)",
    )
    .bind(ticket_id)
    .bind(buyer_id)
    .execute(&state.pool)
    .await?;
    Ok(())
}

async fn fetch_offer_for_seller(
    state: &AppState,
    offer_id: Uuid,
    seller_id: Uuid,
) -> Result<(TicketOffer, UserTicket), AppError> {
    let offer = sqlx::query_as::<_, TicketOffer>("SELECT * FROM ticket_offers WHERE id = $1")
        .bind(offer_id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Offer '{}' was not found", offer_id)))?;

    let ticket = sqlx::query_as::<_, UserTicket>("SELECT * FROM user_tickets WHERE id = $1")
        .bind(offer.ticket_id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Ticket for this offer was not found".to_string()))?;

    if ticket.owner_id != seller_id {
        return Err(AppError::Forbidden(
            "Only the ticket owner can answer this offer".to_string(),
        ));
    }

    Ok((offer, ticket))
}
