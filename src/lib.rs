pub mod axum_http;
pub mod config;
pub mod domain;
pub mod events;
pub mod infra;
pub mod observability;
pub mod payments;
pub mod usecases;
