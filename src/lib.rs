pub mod animation;
pub mod api;
pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod geo;
pub mod models;
pub mod observability;
pub mod routing;
pub mod state;
pub mod store;
