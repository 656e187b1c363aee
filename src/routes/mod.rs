use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::config::{create_cors_layer, create_security_headers_layer};
use crate::handlers::{
    connect, disputes, escrow, health_check, notifications, offers, payments, tickets, webhooks,
};
use crate::state::AppState;

pub fn create_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route(
            "/api/tickets",
            post(tickets::create_ticket).get(tickets::browse_listings),
        )
        .route("/api/tickets/mine", get(tickets::my_tickets))
        .route("/api/tickets/:id/list", post(tickets::list_ticket))
        .route("/api/tickets/:id/unlist", post(tickets::unlist_ticket))
        .route("/api/offers", post(offers::create_offer))
        .route("/api/offers/sent", get(offers::sent_offers))
        .route("/api/offers/received", get(offers::received_offers))
        .route("/api/offers/:id/accept", post(offers::accept_offer))
        .route("/api/offers/:id/decline", post(offers::decline_offer))
        .route("/api/payments/intent", post(payments::create_payment_intent))
        .route("/api/payments/transactions", get(payments::my_transactions))
        .route("/api/webhooks/stripe", post(webhooks::stripe_webhook))
        .route("/api/escrow/release", post(escrow::release_eligible))
        .route(
            "/api/connect/account",
            post(connect::create_account).get(connect::account_status),
        )
        .route("/api/disputes", post(disputes::open_dispute))
        .route("/api/disputes/:id/resolve", post(disputes::resolve_dispute))
        .route(
            "/api/notifications",
            get(notifications::list_notifications),
        )
        .route("/api/notifications/:id/read", post(notifications::mark_read))
        .layer(TraceLayer::new_for_http())
        .layer(create_security_headers_layer())
        .layer(create_cors_layer())
        .with_state(state)
}
