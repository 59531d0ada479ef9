//! HTTP request handlers.
//!
//! - [`landing`]: plain-text landing response at `/`
//! - [`uploads`]: upload intake, naming and persistence
//!
//! Handlers return [`crate::errors::Result`], whose error type converts into a status code and a
//! JSON `{"message": ...}` body.

pub mod landing;
pub mod uploads;
