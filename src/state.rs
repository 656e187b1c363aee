use std::sync::Arc;

use sqlx::PgPool;

use crate::config::Config;
use crate::stripe::StripeClient;

/// Shared handler state. Everything here is cheap to clone; handlers stay
/// stateless request/response cycles against the pool and the processor.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub stripe: StripeClient,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config) -> Self {
        let stripe = StripeClient::new(&config);
        Self {
            pool,
            stripe,
            config: Arc::new(config),
        }
    }
}
