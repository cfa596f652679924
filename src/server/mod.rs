//! HTTP server implementation
//!
//! Exposes the import pipeline over actix-web: submit, status, batch results,
//! cancellation and rollback.

pub mod routes;
pub mod server;
pub mod state;


pub use server::HttpServer;
pub use state::AppState;
