//! Public URLs for stored files.
//!
//! Links are built from the scheme and host the request arrived with, so they are only correct
//! behind a reverse proxy that forwards those faithfully (or that sets `X-Forwarded-*` headers and
//! `uploads.trust_forwarded_headers` is enabled).

use axum::http::{HeaderMap, Uri, header};
use url::Url;

use crate::errors::{Error, Result};

const X_FORWARDED_PROTO: &str = "x-forwarded-proto";
const X_FORWARDED_HOST: &str = "x-forwarded-host";

/// Scheme and host a request was addressed to, validated as a URL base.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicOrigin {
    base: Url,
}

impl PublicOrigin {
    /// Work out where the client thinks this server lives.
    ///
    /// Host: `X-Forwarded-Host` (if trusted), then `Host`, then the URI authority, then
    /// `fallback_host`. Scheme: `X-Forwarded-Proto` (if trusted), then the URI scheme, then `http`.
    pub fn resolve(uri: &Uri, headers: &HeaderMap, trust_forwarded: bool, fallback_host: &str) -> Result<Self> {
        let forwarded = |name: &str| {
            trust_forwarded
                .then(|| first_header_value(headers, name))
                .flatten()
        };

        let scheme = forwarded(X_FORWARDED_PROTO)
            .map(|proto| proto.to_ascii_lowercase())
            .or_else(|| uri.scheme_str().map(str::to_ascii_lowercase))
            .filter(|scheme| scheme == "http" || scheme == "https")
            .unwrap_or_else(|| "http".to_string());

        let host = forwarded(X_FORWARDED_HOST)
            .or_else(|| first_header_value(headers, header::HOST.as_str()))
            .or_else(|| uri.authority().map(|authority| authority.as_str().to_string()))
            .unwrap_or_else(|| fallback_host.to_string());

        Self::from_parts(&scheme, &host)
    }

    pub fn from_parts(scheme: &str, host: &str) -> Result<Self> {
        let invalid = || Error::BadRequest {
            message: "Invalid Host header".to_string(),
        };

        let base = Url::parse(&format!("{scheme}://{host}/")).map_err(|_| invalid())?;

        // Anything that parsed beyond a bare authority means the host smuggled in URL syntax
        if base.path() != "/" || base.query().is_some() || base.fragment().is_some() || !base.username().is_empty() || base.host().is_none() {
            return Err(invalid());
        }

        Ok(Self { base })
    }

    /// `<scheme>://<host>/<mount prefix>/<file name>`
    pub fn file_url(&self, mount_prefix: &str, file_name: &str) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .clear()
                .extend(mount_prefix.split('/').filter(|segment| !segment.is_empty()))
                .push(file_name);
        }
        url
    }
}

/// First comma-separated value of a header, trimmed. Proxies append to `X-Forwarded-*` chains.
fn first_header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
