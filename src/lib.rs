pub mod auth;
pub mod config;
pub mod escrow;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod state;
pub mod stripe;
pub mod utils;
