//! Collision-resistant filenames for uploads.
//!
//! A generated name is `<millisecond-epoch>-<random>` followed by the extension of the original
//! filename, e.g. `1718000000000-482913374.jpg`. Two uploads landing in the same millisecond only
//! collide if they also draw the same number out of 10^9, and [`DiskStorage`](super::DiskStorage)
//! refuses to overwrite on top of that.

use chrono::Utc;
use rand::prelude::RngExt;
use rand::rng;
use std::fmt;

/// Exclusive upper bound of the random component.
pub const RANDOM_COMPONENT_BOUND: u32 = 1_000_000_000;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GeneratedName {
    token: String,
    extension: String,
}

impl GeneratedName {
    pub fn new(token: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            extension: extension.into(),
        }
    }

    /// The unique part of the name, without extension
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Extension including the leading dot, or an empty string
    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn file_name(&self) -> String {
        format!("{}{}", self.token, self.extension)
    }
}

impl fmt::Display for GeneratedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.token, self.extension)
    }
}

/// Source of storage names.
///
/// Implementations must be safe to call concurrently and should make repeated calls with the same
/// input return different names.
pub trait Namer: Send + Sync {
    fn generate(&self, original_name: &str) -> GeneratedName;
}

/// Production namer: wall-clock milliseconds plus a random integer in `[0, 10^9)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimestampNamer;

impl Namer for TimestampNamer {
    fn generate(&self, original_name: &str) -> GeneratedName {
        let millis = Utc::now().timestamp_millis();
        let random = rng().random_range(0..RANDOM_COMPONENT_BOUND);
        GeneratedName::new(format!("{millis}-{random}"), extension_of(original_name))
    }
}

/// Extension of a client-supplied filename: everything from the last `.` of the final path
/// component, dot included. Empty when there is no dot.
///
/// The name is untrusted, so an extension containing anything other than ASCII alphanumerics is
/// dropped rather than carried into a path on disk.
pub fn extension_of(original_name: &str) -> &str {
    let base = original_name.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or(original_name);

    match base.rfind('.') {
        Some(idx) if base[idx + 1..].chars().all(|c| c.is_ascii_alphanumeric()) => &base[idx..],
        _ => "",
    }
}
