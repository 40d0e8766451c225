//! HTTP server for Turtle.
//!
//! Exposes the credential engine as JSON endpoints:
//!
//! - `POST /v1/get`: tree-shaped read ([`GetRequest`](turtle_types::GetRequest))
//! - `POST /v1/post`: write batch ([`PostRequest`](turtle_types::PostRequest))
//! - `GET /v1/health`: liveness and current log head

pub mod config;
pub mod error;
pub mod handler;
pub mod router;
pub mod server;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::{AppState, HealthResponse};
pub use server::TurtleServer;
