//! Thin REST client for the payment processor. Every escrow state transition
//! in the marketplace goes through one of these calls; the processor keeps
//! the ledger, we keep the business rules.

pub mod webhook;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::config::Config;
use crate::utils::error::AppError;

#[derive(Clone)]
pub struct StripeClient {
    http: reqwest::Client,
    secret_key: String,
    webhook_secret: String,
    api_base: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: Option<String>,
    pub status: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Refund {
    pub id: String,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Transfer {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Account {
    pub id: String,
    #[serde(default)]
    pub charges_enabled: bool,
    #[serde(default)]
    pub payouts_enabled: bool,
    #[serde(default)]
    pub details_submitted: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountLink {
    pub url: String,
    pub expires_at: i64,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

impl StripeClient {
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            secret_key: config.stripe_secret_key.clone(),
            webhook_secret: config.stripe_webhook_secret.clone(),
            api_base: config.stripe_api_base.clone(),
        }
    }

    /// Opens a payment intent for a ticket purchase. The metadata pairs are
    /// echoed back in webhooks and are how events find their transaction row.
    pub async fn create_payment_intent(
        &self,
        amount_minor: i64,
        currency: &str,
        metadata: &[(&str, String)],
    ) -> Result<PaymentIntent, AppError> {
        let mut params = vec![
            ("amount".to_string(), amount_minor.to_string()),
            ("currency".to_string(), currency.to_string()),
            (
                "automatic_payment_methods[enabled]".to_string(),
                "true".to_string(),
            ),
        ];
        for (key, value) in metadata {
            params.push((format!("metadata[{}]", key), value.clone()));
        }

        self.post_form("/v1/payment_intents", &params).await
    }

    pub async fn create_refund(&self, payment_intent_id: &str) -> Result<Refund, AppError> {
        let params = vec![(
            "payment_intent".to_string(),
            payment_intent_id.to_string(),
        )];
        self.post_form("/v1/refunds", &params).await
    }

    /// Moves held funds to a seller's connected account.
    pub async fn create_transfer(
        &self,
        amount_minor: i64,
        currency: &str,
        destination_account: &str,
        transfer_group: &str,
    ) -> Result<Transfer, AppError> {
        let params = vec![
            ("amount".to_string(), amount_minor.to_string()),
            ("currency".to_string(), currency.to_string()),
            ("destination".to_string(), destination_account.to_string()),
            ("transfer_group".to_string(), transfer_group.to_string()),
        ];
        self.post_form("/v1/transfers", &params).await
    }

    pub async fn create_account(&self, email: Option<&str>) -> Result<Account, AppError> {
        let mut params = vec![("type".to_string(), "express".to_string())];
        if let Some(email) = email {
            params.push(("email".to_string(), email.to_string()));
        }
        self.post_form("/v1/accounts", &params).await
    }

    pub async fn create_account_link(
        &self,
        account_id: &str,
        refresh_url: &str,
        return_url: &str,
    ) -> Result<AccountLink, AppError> {
        let params = vec![
            ("account".to_string(), account_id.to_string()),
            ("refresh_url".to_string(), refresh_url.to_string()),
            ("return_url".to_string(), return_url.to_string()),
            ("type".to_string(), "account_onboarding".to_string()),
        ];
        self.post_form("/v1/account_links", &params).await
    }

    pub async fn retrieve_account(&self, account_id: &str) -> Result<Account, AppError> {
        self.get(&format!("/v1/accounts/{}", account_id)).await
    }

    pub fn webhook_secret(&self) -> &str {
        &self.webhook_secret
    }

    async fn post_form<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(String, String)],
    ) -> Result<T, AppError> {
        let response = self
            .http
            .post(format!("{}{}", self.api_base, path))
            .bearer_auth(&self.secret_key)
            .form(params)
            .send()
            .await
            .map_err(|e| {
                AppError::PaymentError(format!("Request to payment provider failed: {}", e))
            })?;

        Self::read_response(response).await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, AppError> {
        let response = self
            .http
            .get(format!("{}{}", self.api_base, path))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| {
                AppError::PaymentError(format!("Request to payment provider failed: {}", e))
            })?;

        Self::read_response(response).await
    }

    async fn read_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, AppError> {
        let status = response.status();
        let body = response.text().await.map_err(|e| {
            AppError::PaymentError(format!("Failed to read payment provider response: {}", e))
        })?;

        if !status.is_success() {
            let message = serde_json::from_str::<ApiErrorEnvelope>(&body)
                .ok()
                .and_then(|envelope| {
                    let detail = envelope.error;
                    match (detail.message, detail.kind) {
                        (Some(message), Some(kind)) => Some(format!("{} ({})", message, kind)),
                        (Some(message), None) => Some(message),
                        _ => None,
                    }
                })
                .unwrap_or_else(|| format!("Payment provider returned HTTP {}", status));
            return Err(AppError::PaymentError(message));
        }

        serde_json::from_str(&body).map_err(|e| {
            AppError::PaymentError(format!("Unexpected payment provider response: {}", e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_envelope_parsing() {
        let body = r#"{"error":{"message":"No such payment_intent: pi_123","type":"invalid_request_error"}}"#;
        let envelope: ApiErrorEnvelope = serde_json::from_str(body).unwrap();
        assert_eq!(
            envelope.error.message.as_deref(),
            Some("No such payment_intent: pi_123")
        );
        assert_eq!(envelope.error.kind.as_deref(), Some("invalid_request_error"));
    }

    #[test]
    fn test_account_flags_default_to_false() {
        let account: Account = serde_json::from_str(r#"{"id":"acct_123"}"#).unwrap();
        assert!(!account.charges_enabled);
        assert!(!account.payouts_enabled);
        assert!(!account.details_submitted);
    }

    #[test]
    fn test_payment_intent_parsing() {
        let body = r#"{"id":"pi_abc","client_secret":"pi_abc_secret_xyz","status":"requires_payment_method"}"#;
        let intent: PaymentIntent = serde_json::from_str(body).unwrap();
        assert_eq!(intent.id, "pi_abc");
        assert_eq!(intent.client_secret.as_deref(), Some("pi_abc_secret_xyz"));
    }
}
