use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::models::{SaleStatus, UserTicket};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::money;
use crate::utils::response::{created, success};

#[derive(Deserialize)]
pub struct CreateTicketRequest {
    pub event_name: String,
    pub event_date: DateTime<Utc>,
    pub venue: String,
    pub section: Option<String>,
    pub seat_row: Option<String>,
    pub seat: Option<String>,
    /// Listing the ticket at creation is optional.
    pub list_price: Option<Decimal>,
}

#[derive(Deserialize)]
pub struct ListTicketRequest {
    pub list_price: Decimal,
}

/// Records a ticket the caller owns, optionally listing it for sale.
pub async fn create_ticket(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<CreateTicketRequest>,
) -> Result<Response, AppError> {
    if body.event_name.trim().is_empty() {
        return Err(AppError::ValidationError(
            "Event name is required".to_string(),
        ));
    }
    if body.venue.trim().is_empty() {
        return Err(AppError::ValidationError("Venue is required".to_string()));
    }
    if let Some(price) = body.list_price {
        money::to_minor_units(price)?;
    }

    let ticket = sqlx::query_as::<_, UserTicket>(
        "INSERT INTO user_tickets
             (owner_id, event_name, event_date, venue, section, seat_row, seat,
              list_price, is_listed)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
         RETURNING *",
    )
    .bind(user.user_id)
    .bind(body.event_name.trim())
    .bind(body.event_date)
    .bind(body.venue.trim())
    .bind(&body.section)
    .bind(&body.seat_row)
    .bind(&body.seat)
    .bind(body.list_price)
    .bind(body.list_price.is_some())
    .fetch_one(&state.pool)
    .await?;

    tracing::info!(ticket_id = %ticket.id, owner_id = %user.user_id, "Ticket recorded");

    Ok(created(ticket, "Ticket created").into_response())
}

/// Active listings, excluding the caller's own tickets.
pub async fn browse_listings(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Response, AppError> {
    let listings = sqlx::query_as::<_, UserTicket>(
        "SELECT * FROM user_tickets
         WHERE is_listed AND sale_status = 'available' AND owner_id <> $1
         ORDER BY event_date ASC
         LIMIT 100",
    )
    .bind(user.user_id)
    .fetch_all(&state.pool)
    .await?;

    Ok(success(listings, "Active listings").into_response())
}

pub async fn my_tickets(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Response, AppError> {
    let tickets = sqlx::query_as::<_, UserTicket>(
        "SELECT * FROM user_tickets WHERE owner_id = $1 ORDER BY created_at DESC",
    )
    .bind(user.user_id)
    .fetch_all(&state.pool)
    .await?;

    Ok(success(tickets, "Your tickets").into_response())
}

/// Puts a ticket up for sale at the given price.
pub async fn list_ticket(
    State(state): State<AppState>,
    user: AuthUser,
    Path(ticket_id): Path<Uuid>,
    Json(body): Json<ListTicketRequest>,
) -> Result<Response, AppError> {
    money::to_minor_units(body.list_price)?;

    let ticket = fetch_owned_ticket(&state, ticket_id, user.user_id).await?;

    if ticket.sale_status != SaleStatus::Available {
        return Err(AppError::Conflict(
            "Only an available ticket can be listed".to_string(),
        ));
    }

    let updated = sqlx::query_as::<_, UserTicket>(
        "UPDATE user_tickets
         SET list_price = $2, is_listed = TRUE, updated_at = now()
         WHERE id = $1 AND sale_status = 'available'
         RETURNING *",
    )
    .bind(ticket_id)
    .bind(body.list_price)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::Conflict("Ticket state changed, try again".to_string()))?;

    tracing::info!(ticket_id = %ticket_id, price = %body.list_price, "Ticket listed");

    Ok(success(updated, "Ticket listed").into_response())
}

/// Takes a listing down. Rejected while a purchase is in flight.
pub async fn unlist_ticket(
    State(state): State<AppState>,
    user: AuthUser,
    Path(ticket_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let ticket = fetch_owned_ticket(&state, ticket_id, user.user_id).await?;

    if ticket.sale_status == SaleStatus::Pending {
        return Err(AppError::Conflict(
            "A purchase is in progress for this ticket".to_string(),
        ));
    }

    let updated = sqlx::query_as::<_, UserTicket>(
        "UPDATE user_tickets
         SET is_listed = FALSE, updated_at = now()
         WHERE id = $1 AND sale_status <> 'pending'
         RETURNING *",
    )
    .bind(ticket_id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::Conflict("Ticket state changed, try again".to_string()))?;

    Ok(success(updated, "Ticket unlisted").into_response())
}

async fn fetch_owned_ticket(
    state: &AppState,
    ticket_id: Uuid,
    user_id: Uuid,
) -> Result<UserTicket, AppError> {
    let ticket = sqlx::query_as::<_, UserTicket>("SELECT * FROM user_tickets WHERE id = $1")
        .bind(ticket_id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Ticket '{}' was not found", ticket_id)))?;

    if ticket.owner_id != user_id {
        return Err(AppError::Forbidden(
            "You do not own this ticket".to_string(),
        ));
    }

    Ok(ticket)
}
