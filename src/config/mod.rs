use std::env;

pub mod cors;
pub mod security;

pub use cors::create_cors_layer;
pub use security::create_security_headers_layer;

/// Runtime configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    /// HS256 secret shared with the identity provider.
    pub jwt_secret: String,
    /// Tokens from any other issuer are rejected.
    pub jwt_issuer: String,
    pub stripe_secret_key: String,
    pub stripe_webhook_secret: String,
    pub stripe_api_base: String,
    /// Shared secret presented by the periodic escrow-release trigger.
    pub service_key: String,
    /// Marketplace cut, in basis points of the sale amount.
    pub platform_fee_bps: u32,
    /// Funds stay in escrow this long after a successful payment.
    pub escrow_hold_hours: i64,
    pub offer_ttl_hours: i64,
    pub currency: String,
    pub connect_refresh_url: String,
    pub connect_return_url: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost/gatepass".to_string()),
            port: env_parsed("PORT", 3001),
            jwt_secret: env::var("JWT_SECRET").expect("JWT_SECRET must be set"),
            jwt_issuer: env::var("JWT_ISSUER")
                .unwrap_or_else(|_| "https://auth.gatepass.app".to_string()),
            stripe_secret_key: env::var("STRIPE_SECRET_KEY")
                .expect("STRIPE_SECRET_KEY must be set"),
            stripe_webhook_secret: env::var("STRIPE_WEBHOOK_SECRET")
                .expect("STRIPE_WEBHOOK_SECRET must be set"),
            stripe_api_base: env::var("STRIPE_API_BASE")
                .unwrap_or_else(|_| "https://api.stripe.com".to_string()),
            service_key: env::var("SERVICE_KEY").expect("SERVICE_KEY must be set"),
            platform_fee_bps: env_parsed("PLATFORM_FEE_BPS", 500),
            escrow_hold_hours: env_parsed("ESCROW_HOLD_HOURS", 72),
            offer_ttl_hours: env_parsed("OFFER_TTL_HOURS", 12),
            currency: env::var("CURRENCY").unwrap_or_else(|_| "usd".to_string()),
            connect_refresh_url: env::var("CONNECT_REFRESH_URL")
                .unwrap_or_else(|_| "https://gatepass.app/connect/refresh".to_string()),
            connect_return_url: env::var("CONNECT_RETURN_URL")
                .unwrap_or_else(|_| "https://gatepass.app/connect/return".to_string()),
        }
    }
}

fn env_parsed<T: std::str::FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!("Config: {} has invalid value '{}', using default", name, raw);
                default
            }
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_parsed_returns_default_when_unset() {
        env::remove_var("GATEPASS_TEST_UNSET");
        assert_eq!(env_parsed("GATEPASS_TEST_UNSET", 42u32), 42);
    }

    #[test]
    fn test_env_parsed_reads_valid_value() {
        env::set_var("GATEPASS_TEST_PORT", "8080");
        assert_eq!(env_parsed("GATEPASS_TEST_PORT", 3001u16), 8080);
        env::remove_var("GATEPASS_TEST_PORT");
    }

    #[test]
    fn test_env_parsed_falls_back_on_garbage() {
        env::set_var("GATEPASS_TEST_FEE", "not-a-number");
        assert_eq!(env_parsed("GATEPASS_TEST_FEE", 500u32), 500);
        env::remove_var("GATEPASS_TEST_FEE");
    }
}
