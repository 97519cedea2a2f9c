//! # filetask API
//!
//! Local HTTP control endpoint of the process that hosts the engine, and
//! the client every other command uses to reach it.
//!
//! The endpoint address doubles as the host lock: whichever process binds
//! it owns the engine for the database, and everyone else sends requests
//! to it instead of opening a second engine.
//!
//! - [`router`]: axum routes over tasks, logs, file history and invalid `.strm` files
//! - [`ApiServer`]: serves the router on a bound listener until stopped
//! - [`ApiClient`]: typed reqwest client for the same routes
//! - [`EventStream`]: live task events read from `GET /tasks/{id}/events`

pub mod client;
pub mod dto;
pub mod error;
pub mod routes;
pub mod server;
pub mod state;

#[cfg(test)]
mod testing;

pub use client::{ApiClient, EventStream};
pub use error::{ApiError, ClientError};
pub use routes::router;
pub use server::ApiServer;
pub use state::AppState;
