//! API request/response models.

pub mod uploads;
