use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::utils::response::success;

pub mod connect;
pub mod disputes;
pub mod escrow;
pub mod notifications;
pub mod offers;
pub mod payments;
pub mod tickets;
pub mod webhooks;

#[derive(Serialize)]
struct HealthPayload {
    status: &'static str,
    service: &'static str,
}

pub async fn health_check() -> Response {
    let payload = HealthPayload {
        status: "ok",
        service: "gatepass-api",
    };

    success(payload, "Health check successful").into_response()
}
