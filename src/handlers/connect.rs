use axum::extract::State;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::auth::AuthUser;
use crate::models::ConnectedAccount;
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::success;

#[derive(Serialize)]
pub struct OnboardingResponse {
    pub stripe_account_id: String,
    pub onboarding_url: String,
    pub expires_at: i64,
}

/// Creates (or reuses) the caller's payout account at the processor and
/// returns a fresh onboarding link. Links are single-use and short-lived, so
/// calling this again is the way to resume onboarding.
pub async fn create_account(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Response, AppError> {
    let existing = sqlx::query_as::<_, ConnectedAccount>(
        "SELECT * FROM stripe_connected_accounts WHERE user_id = $1",
    )
    .bind(user.user_id)
    .fetch_optional(&state.pool)
    .await?;

    let account_id = match existing {
        Some(account) => account.stripe_account_id,
        None => {
            let account = state.stripe.create_account(user.email.as_deref()).await?;
            sqlx::query(
                "INSERT INTO stripe_connected_accounts (user_id, stripe_account_id)
                 VALUES ($1, $2)
                 ON CONFLICT (user_id) DO NOTHING",
            )
            .bind(user.user_id)
            .bind(&account.id)
            .execute(&state.pool)
            .await?;
            tracing::info!(user_id = %user.user_id, account_id = %account.id,
                "Connected account created");
            account.id
        }
    };

    let link = state
        .stripe
        .create_account_link(
            &account_id,
            &state.config.connect_refresh_url,
            &state.config.connect_return_url,
        )
        .await?;

    let payload = OnboardingResponse {
        stripe_account_id: account_id,
        onboarding_url: link.url,
        expires_at: link.expires_at,
    };

    Ok(success(payload, "Onboarding link created").into_response())
}

/// Re-reads the account from the processor and refreshes the local mirror.
pub async fn account_status(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Response, AppError> {
    let mirror = sqlx::query_as::<_, ConnectedAccount>(
        "SELECT * FROM stripe_connected_accounts WHERE user_id = $1",
    )
    .bind(user.user_id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| {
        AppError::NotFound("No payout account yet. Create one to receive payouts.".to_string())
    })?;

    let account = state
        .stripe
        .retrieve_account(&mirror.stripe_account_id)
        .await?;

    let refreshed = sqlx::query_as::<_, ConnectedAccount>(
        "UPDATE stripe_connected_accounts
         SET charges_enabled = $2, payouts_enabled = $3, details_submitted = $4,
             updated_at = now()
         WHERE user_id = $1
         RETURNING *",
    )
    .bind(user.user_id)
    .bind(account.charges_enabled)
    .bind(account.payouts_enabled)
    .bind(account.details_submitted)
    .fetch_one(&state.pool)
    .await?;

    Ok(success(refreshed, "Payout account status").into_response())
}
