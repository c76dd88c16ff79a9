pub mod clock;
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod rate_limit;
pub mod repositories;
pub mod routes;
pub mod services;
pub mod state;
