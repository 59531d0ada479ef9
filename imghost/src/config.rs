//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The configuration
//! file path defaults to `config.yaml` but can be specified via `-f` flag or `IMGHOST_CONFIG`
//! environment variable. A missing file is not an error: every field has a default.
//!
//! ## Loading Priority
//!
//! Configuration sources are merged in the following order (later sources override earlier ones):
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`)
//! 2. **Environment variables** - Variables prefixed with `IMGHOST_` override YAML values
//! 3. **PORT** - Special case: overrides `port` if set, as most hosting platforms inject it
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `IMGHOST_STORAGE__ROOT=/srv/images` sets the `storage.root` field.
//!
//! ## Usage
//!
//! ```no_run
//! use clap::Parser;
//! use imghost::config::{Args, Config};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let args = Args::parse();
//! let config = Config::load(&args)?;
//!
//! println!("Storing uploads in {}", config.storage.root.display());
//! # Ok(())
//! # }
//! ```
//!
//! ## Environment Variable Examples
//!
//! ```bash
//! PORT=8080
//! IMGHOST_STORAGE__ROOT=/var/lib/imghost
//! IMGHOST_STORAGE__MOUNT_PREFIX=/i
//! IMGHOST_UPLOADS__MAX_FILE_SIZE=5242880
//! IMGHOST_UPLOADS__RESPONSE_FORMAT=html
//! ```

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use mime::Mime;
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};
use url::Url;

use crate::errors::Error;

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "IMGHOST_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Where uploads are written and how they are exposed
    pub storage: StorageConfig,
    /// Upload intake limits and response shape
    pub uploads: UploadsConfig,
    /// CORS configuration for browser clients
    pub cors: CorsConfig,
    /// Enable OpenTelemetry OTLP export for distributed tracing
    pub enable_otel_export: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// Directory uploaded files are written to
    pub root: PathBuf,
    /// URL path under which `root` is served read-only (e.g. `/uploads`)
    pub mount_prefix: String,
    /// Create `root` on startup if it is missing
    pub create_root: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct UploadsConfig {
    /// Multipart field carrying the file
    pub field_name: String,
    /// Maximum accepted file size in bytes
    pub max_file_size: u64,
    /// Accepted content types (`image/png`, `image/*`, `*/*`). Empty accepts everything.
    pub allowed_content_types: Vec<String>,
    /// Shape of a successful upload response
    pub response_format: ResponseFormat,
    /// Take scheme and host from `X-Forwarded-Proto` / `X-Forwarded-Host` when building URLs.
    /// Only enable behind a proxy that sets these headers itself.
    pub trust_forwarded_headers: bool,
}

/// Raster formats browsers display inline. `image/svg+xml` is left out since an SVG served from
/// this origin can run script.
pub const DEFAULT_ALLOWED_CONTENT_TYPES: &[&str] = &["image/png", "image/jpeg", "image/gif", "image/webp", "image/avif", "image/bmp"];

/// Body of a successful upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFormat {
    /// `{"imageUrl": "..."}`
    #[default]
    Json,
    /// A small HTML snippet linking to the file
    Html,
}

/// CORS (Cross-Origin Resource Sharing) configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorsConfig {
    /// Allowed origins for CORS requests
    pub allowed_origins: Vec<CorsOrigin>,
    /// Allow credentials (cookies) in CORS requests
    pub allow_credentials: bool,
    /// Cache preflight requests for this long
    #[serde(with = "humantime_serde")]
    pub max_age: Option<Duration>,
}

/// An allowed CORS origin.
///
/// Can be either a wildcard (`*`) to allow all origins, or a specific URL.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum CorsOrigin {
    /// Allow all origins (`*`)
    #[serde(deserialize_with = "parse_wildcard")]
    Wildcard,
    /// Specific origin URL (e.g., `https://app.example.com`)
    #[serde(deserialize_with = "parse_url")]
    Url(Url),
}

fn parse_wildcard<'de, D>(deserializer: D) -> Result<(), D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    if s == "*" {
        Ok(())
    } else {
        Err(serde::de::Error::custom("Expected '*'"))
    }
}

fn parse_url<'de, D>(deserializer: D) -> Result<Url, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    Url::parse(&s).map_err(serde::de::Error::custom)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            storage: StorageConfig::default(),
            uploads: UploadsConfig::default(),
            cors: CorsConfig::default(),
            enable_otel_export: false,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("uploads"),
            mount_prefix: "/uploads".to_string(),
            create_root: true,
        }
    }
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self {
            field_name: "image".to_string(),
            max_file_size: 10 * 1024 * 1024, // 10MB
            allowed_content_types: DEFAULT_ALLOWED_CONTENT_TYPES.iter().map(|t| t.to_string()).collect(),
            response_format: ResponseFormat::Json,
            trust_forwarded_headers: false,
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![CorsOrigin::Wildcard],
            allow_credentials: false,
            max_age: Some(Duration::from_secs(3600)), // Cache preflight for 1 hour
        }
    }
}

impl StorageConfig {
    /// Mount prefix normalized to a leading slash and no trailing slash, e.g. `/uploads`
    pub fn mount_path(&self) -> String {
        format!("/{}", self.mount_prefix.trim_matches('/'))
    }
}

impl UploadsConfig {
    /// Whether `content_type` matches an entry of `allowed_content_types`
    pub fn accepts(&self, content_type: &Mime) -> bool {
        if self.allowed_content_types.is_empty() {
            return true;
        }

        self.allowed_content_types
            .iter()
            .filter_map(|allowed| allowed.parse::<Mime>().ok())
            .any(|pattern| {
                (pattern.type_() == mime::STAR || pattern.type_() == content_type.type_())
                    && (pattern.subtype() == mime::STAR || pattern.subtype() == content_type.subtype())
            })
    }
}

impl Config {
    #[allow(clippy::result_large_err)]
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let config: Self = Self::figment(args).extract()?;
        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    /// Validate the configuration for consistency and required fields
    pub fn validate(&self) -> Result<(), Error> {
        let invalid = |message: String| Err(Error::InvalidConfig { message });

        let mount = self.storage.mount_prefix.trim_matches('/');
        if mount.is_empty() {
            return invalid(
                "storage.mount_prefix cannot be empty or '/'. Uploaded files need their own path, e.g. '/uploads'.".to_string(),
            );
        }
        if mount.split('/').any(|segment| segment.is_empty() || segment == "." || segment == "..") {
            return invalid(format!("storage.mount_prefix '{}' contains an empty or relative segment", self.storage.mount_prefix));
        }
        if mount.contains(['{', '}', '*', '?', '#', ':']) {
            return invalid(format!(
                "storage.mount_prefix '{}' must be a plain path without route or URL syntax",
                self.storage.mount_prefix
            ));
        }
        if mount == "upload" || mount == "healthz" || mount == "api-docs" || mount.starts_with("api-docs/") {
            return invalid(format!("storage.mount_prefix '{}' clashes with a built-in route", self.storage.mount_prefix));
        }

        if self.storage.root.as_os_str().is_empty() {
            return invalid("storage.root cannot be empty".to_string());
        }

        if self.uploads.field_name.trim().is_empty() {
            return invalid("uploads.field_name cannot be empty".to_string());
        }

        if self.uploads.max_file_size == 0 {
            return invalid("uploads.max_file_size must be greater than 0".to_string());
        }

        for allowed in &self.uploads.allowed_content_types {
            if allowed.parse::<Mime>().is_err() {
                return invalid(format!(
                    "uploads.allowed_content_types entry '{allowed}' is not a content type such as 'image/png' or 'image/*'"
                ));
            }
        }

        if self.cors.allowed_origins.is_empty() {
            return invalid("cors.allowed_origins cannot be empty. Add at least one allowed origin.".to_string());
        }

        let has_wildcard = self.cors.allowed_origins.iter().any(|origin| matches!(origin, CorsOrigin::Wildcard));
        if has_wildcard && self.cors.allow_credentials {
            return invalid("CORS cannot use wildcard origin '*' with allow_credentials=true. Specify explicit origins.".to_string());
        }

        Ok(())
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            // Load base config file
            .merge(Yaml::file(&args.config))
            // Environment variables can still override specific values. IMGHOST_CONFIG names the
            // file itself and is not a config key.
            .merge(Env::prefixed("IMGHOST_").ignore(&["config"]).split("__"))
            .merge(Env::raw().only(&["PORT"]))
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Host used in generated links when a request carries no usable host.
    ///
    /// An unspecified bind address is swapped for `localhost`.
    pub fn fallback_public_host(&self) -> String {
        match self.host.as_str() {
            "0.0.0.0" | "::" | "[::]" | "" => format!("localhost:{}", self.port),
            host => format!("{}:{}", host, self.port),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    fn args(config: &str) -> Args {
        Args {
            config: config.to_string(),
            validate: false,
        }
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();

        assert_eq!(config.port, 3000);
        assert_eq!(config.storage.root, PathBuf::from("uploads"));
        assert_eq!(config.storage.mount_path(), "/uploads");
        assert_eq!(config.uploads.field_name, "image");
        assert_eq!(config.uploads.response_format, ResponseFormat::Json);
        assert!(!config.uploads.trust_forwarded_headers);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_content_types_exclude_svg() {
        let uploads = UploadsConfig::default();

        assert!(uploads.accepts(&mime::IMAGE_PNG));
        assert!(uploads.accepts(&mime::IMAGE_JPEG));
        assert!(uploads.accepts(&"image/webp".parse().unwrap()));
        assert!(!uploads.accepts(&mime::IMAGE_SVG));
        assert!(!uploads.accepts(&mime::TEXT_HTML));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        Jail::expect_with(|_jail| {
            let config = Config::load(&args("does-not-exist.yaml"))?;

            assert_eq!(config.storage.mount_prefix, "/uploads");
            assert_eq!(config.uploads.max_file_size, 10 * 1024 * 1024);

            Ok(())
        });
    }

    #[test]
    fn test_yaml_values() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
host: 127.0.0.1
storage:
  root: /srv/images
  mount_prefix: /static/images/
uploads:
  max_file_size: 1024
  allowed_content_types: ["image/png", "image/jpeg"]
  response_format: html
cors:
  allowed_origins: ["https://app.example.com"]
  allow_credentials: true
  max_age: 10m
"#,
            )?;

            let config = Config::load(&args("test.yaml"))?;

            assert_eq!(config.host, "127.0.0.1");
            assert_eq!(config.storage.root, PathBuf::from("/srv/images"));
            assert_eq!(config.storage.mount_path(), "/static/images");
            assert_eq!(config.uploads.max_file_size, 1024);
            assert_eq!(config.uploads.allowed_content_types.len(), 2);
            assert_eq!(config.uploads.response_format, ResponseFormat::Html);
            assert!(matches!(&config.cors.allowed_origins[0], CorsOrigin::Url(url) if url.as_str() == "https://app.example.com/"));
            assert!(config.cors.allow_credentials);
            assert_eq!(config.cors.max_age, Some(Duration::from_secs(600)));

            Ok(())
        });
    }

    #[test]
    fn test_env_override() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
port: 4000
storage:
  root: from-yaml
"#,
            )?;

            jail.set_env("IMGHOST_STORAGE__ROOT", "from-env");
            jail.set_env("IMGHOST_UPLOADS__FIELD_NAME", "file");
            jail.set_env("PORT", "8080");

            let config = Config::load(&args("test.yaml"))?;

            assert_eq!(config.storage.root, PathBuf::from("from-env"));
            assert_eq!(config.uploads.field_name, "file");
            assert_eq!(config.port, 8080);

            Ok(())
        });
    }

    #[test]
    fn test_config_path_env_is_not_a_config_key() {
        Jail::expect_with(|jail| {
            jail.create_file("custom.yaml", "port: 4000\n")?;
            jail.set_env("IMGHOST_CONFIG", "custom.yaml");

            let config = Config::load(&args("custom.yaml"))?;
            assert_eq!(config.port, 4000);

            Ok(())
        });
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file("test.yaml", "storage:\n  rooot: typo\n")?;

            assert!(Config::load(&args("test.yaml")).is_err());

            Ok(())
        });
    }

    #[test]
    fn test_root_mount_prefix_is_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file("test.yaml", "storage:\n  mount_prefix: /\n")?;

            let err = Config::load(&args("test.yaml")).unwrap_err();
            assert!(err.to_string().contains("mount_prefix"));

            Ok(())
        });
    }

    #[test]
    fn test_mount_prefix_validation() {
        for bad in ["", "/", "/a//b", "/../etc", "/{name}", "/upload", "healthz/"] {
            let mut config = Config::default();
            config.storage.mount_prefix = bad.to_string();
            assert!(config.validate().is_err(), "mount prefix {bad:?} should be rejected");
        }

        for good in ["uploads", "/i", "/static/images/"] {
            let mut config = Config::default();
            config.storage.mount_prefix = good.to_string();
            assert!(config.validate().is_ok(), "mount prefix {good:?} should be accepted");
        }
    }

    #[test]
    fn test_wildcard_with_credentials_is_rejected() {
        let mut config = Config::default();
        config.cors.allow_credentials = true;

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_limits_are_rejected() {
        let mut config = Config::default();
        config.uploads.max_file_size = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.uploads.allowed_content_types = vec!["images".to_string()];
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.uploads.field_name = " ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_content_type_matching() {
        let uploads = UploadsConfig {
            allowed_content_types: vec!["image/*".to_string(), "application/pdf".to_string()],
            ..Default::default()
        };

        assert!(uploads.accepts(&"image/png".parse().unwrap()));
        assert!(uploads.accepts(&"image/svg+xml".parse().unwrap()));
        assert!(uploads.accepts(&"application/pdf".parse().unwrap()));
        assert!(!uploads.accepts(&"application/zip".parse().unwrap()));
        assert!(!uploads.accepts(&"text/plain".parse().unwrap()));

        let anything = UploadsConfig {
            allowed_content_types: vec![],
            ..Default::default()
        };
        assert!(anything.accepts(&"application/octet-stream".parse().unwrap()));

        let star = UploadsConfig {
            allowed_content_types: vec!["*/*".to_string()],
            ..Default::default()
        };
        assert!(star.accepts(&"text/plain".parse().unwrap()));
    }

    #[test]
    fn test_fallback_public_host() {
        let mut config = Config::default();
        assert_eq!(config.fallback_public_host(), "localhost:3000");

        config.host = "10.0.0.5".to_string();
        config.port = 8080;
        assert_eq!(config.fallback_public_host(), "10.0.0.5:8080");
        assert_eq!(config.bind_address(), "10.0.0.5:8080");
    }
}
