//! API layer for HTTP request handling and data models.
//!
//! - **[`handlers`]**: Axum route handlers
//! - **[`models`]**: Response data structures
//!
//! # Routes
//!
//! - `POST /upload`: multipart upload of a single file under the `image` field
//! - `GET <mount prefix>/<name>`: read-only static serving of the storage root
//! - `GET /`, `GET /healthz`: landing and liveness responses

pub mod handlers;
pub mod models;
