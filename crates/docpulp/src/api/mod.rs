//! HTTP facade: the service surface shared by many consumers, plus the
//! matching client.

pub mod client;
pub mod error;
pub mod handlers;
pub mod server;
pub mod types;

pub use client::ParserClient;
pub use server::{create_router, serve, serve_with_state};
pub use types::{ApiState, ErrorResponse, HealthResponse, ParseResponse};
