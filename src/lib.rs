pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod engine;
pub mod gateway;
pub mod metrics;
pub mod rate_limit;
pub mod sessions;
pub mod sync;
