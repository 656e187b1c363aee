use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::models::Notification;
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{empty_success, success};

/// Best-effort insert. Notifications are a side channel; a failure here must
/// never fail the operation that triggered it, so it is logged and swallowed.
pub async fn notify(pool: &PgPool, user_id: Uuid, kind: &str, message: String) {
    let result = sqlx::query(
        "INSERT INTO notifications (user_id, kind, message) VALUES ($1, $2, $3)",
    )
    .bind(user_id)
    .bind(kind)
    .bind(&message)
    .execute(pool)
    .await;

    if let Err(e) = result {
        tracing::warn!(error = ?e, %user_id, kind, "Failed to record notification");
    }
}

pub async fn list_notifications(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Response, AppError> {
    let notifications = sqlx::query_as::<_, Notification>(
        "SELECT * FROM notifications
         WHERE user_id = $1
         ORDER BY created_at DESC
         LIMIT 100",
    )
    .bind(user.user_id)
    .fetch_all(&state.pool)
    .await?;

    Ok(success(notifications, "Your notifications").into_response())
}

pub async fn mark_read(
    State(state): State<AppState>,
    user: AuthUser,
    Path(notification_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let updated = sqlx::query(
        "UPDATE notifications SET is_read = TRUE WHERE id = $1 AND user_id = $2",
    )
    .bind(notification_id)
    .bind(user.user_id)
    .execute(&state.pool)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(AppError::NotFound(format!(
            "Notification '{}' was not found",
            notification_id
        )));
    }

    Ok(empty_success("Notification marked read").into_response())
}
