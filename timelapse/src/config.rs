//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The configuration
//! file path defaults to `config.yaml` but can be specified via `-f` flag or `TIMELAPSE_CONFIG`
//! environment variable.
//!
//! ## Loading Priority
//!
//! Configuration sources are merged in the following order (later sources override earlier ones):
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`, missing file is fine)
//! 2. **Environment variables** - Variables prefixed with `TIMELAPSE_` override YAML values
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `TIMELAPSE_TRANSCODER__TIMEOUT=10m` sets the `transcoder.timeout` field.
//!
//! ## Usage
//!
//! ```no_run
//! use clap::Parser;
//! use timelapse::config::{Args, Config};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let args = Args::parse();
//! let config = Config::load(&args)?;
//!
//! println!("Server will bind to {}:{}", config.host, config.port);
//! # Ok(())
//! # }
//! ```
//!
//! ## Configuration Structure
//!
//! - **Server**: `host`, `port`, `public_url` - binding and the base of returned download links
//! - **Storage**: `storage.upload_dir`, `storage.work_dir`, `storage.static_prefix`,
//!   `storage.max_upload_size` - where outputs live and how they are served
//! - **Transcoder**: `transcoder.program`, `transcoder.path`, `transcoder.search_path`,
//!   `transcoder.fallback_paths`, `transcoder.timeout`, `transcoder.default_speed`
//! - **CORS**: `cors.allowed_origins`, `cors.allow_credentials`, `cors.max_age`
//! - **Features**: `enable_metrics`, `enable_otel_export`
//!
//! ## Environment Variable Examples
//!
//! ```bash
//! # Override server port
//! TIMELAPSE_PORT=8080
//!
//! # Point at a specific ffmpeg build instead of searching PATH
//! TIMELAPSE_TRANSCODER__PATH=/opt/ffmpeg/bin/ffmpeg
//!
//! # Links handed back to clients
//! TIMELAPSE_PUBLIC_URL=https://videos.example.com
//! ```

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};
use url::Url;

use crate::errors::Error;
use crate::transcoder::Speed;

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "TIMELAPSE_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
///
/// This is the root configuration structure loaded from YAML and environment variables.
/// All fields have defaults defined in the `Default` implementation.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Externally reachable base URL; `download_url` values are built from it
    pub public_url: Url,
    /// Upload and output file locations
    pub storage: StorageConfig,
    /// External transcoder discovery and invocation
    pub transcoder: TranscoderConfig,
    /// CORS configuration for browser clients
    pub cors: CorsConfig,
    /// Enable Prometheus metrics endpoint at `/internal/metrics`
    pub enable_metrics: bool,
    /// Enable OpenTelemetry OTLP export for distributed tracing
    pub enable_otel_export: bool,
}

/// Where uploads are staged and where finished timelapses are published.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// Directory holding finished outputs. Served read-only under `static_prefix`.
    pub upload_dir: PathBuf,
    /// Directory for per-request work files. Must be on the same filesystem as `upload_dir`
    /// so publishing an output is an atomic rename.
    pub work_dir: PathBuf,
    /// URL path prefix the upload directory is served under
    pub static_prefix: String,
    /// Largest accepted video upload, in bytes
    pub max_upload_size: u64,
}

/// How the transcoding executable is found and run.
///
/// Lookup order: `path` (if it points at a file), then `program` on the search path
/// (`search_path` if set, otherwise `PATH`), then each of `fallback_paths`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct TranscoderConfig {
    /// Executable name looked up on the search path
    pub program: String,
    /// Explicit executable location, tried before any search
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Replaces the process `PATH` for lookups (same `:`-separated syntax)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_path: Option<String>,
    /// Install locations tried when the search path has no match
    pub fallback_paths: Vec<PathBuf>,
    /// Wall-clock limit for a single transcode
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Speed factor used when the request carries none. Must be finite and positive.
    pub default_speed: Speed,
    /// Where to send users when the executable is missing
    pub help_url: Url,
}

/// CORS (Cross-Origin Resource Sharing) configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorsConfig {
    /// Allowed origins for CORS requests
    pub allowed_origins: Vec<CorsOrigin>,
    /// Allow credentials (cookies) in CORS requests
    pub allow_credentials: bool,
    /// Cache preflight requests for this many seconds
    pub max_age: Option<u64>,
}

/// CORS origin specification.
///
/// Can be either a wildcard (`*`) to allow all origins, or a specific URL.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum CorsOrigin {
    /// Allow all origins (`*`)
    #[serde(deserialize_with = "parse_wildcard", serialize_with = "serialize_wildcard")]
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

fn serialize_wildcard<S>(serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str("*")
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
            port: 5000,
            public_url: Url::parse("http://localhost:5000").expect("static URL is valid"),
            storage: StorageConfig::default(),
            transcoder: TranscoderConfig::default(),
            cors: CorsConfig::default(),
            enable_metrics: false,
            enable_otel_export: false,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("static/videos"),
            work_dir: PathBuf::from("static/.work"),
            static_prefix: "/static/videos".to_string(),
            max_upload_size: 512 * 1024 * 1024, // 512 MiB
        }
    }
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            program: "ffmpeg".to_string(),
            path: None,
            search_path: None,
            fallback_paths: Vec::new(),
            timeout: Duration::from_secs(300),
            default_speed: Speed::DEFAULT,
            help_url: Url::parse("https://ffmpeg.org/download.html").expect("static URL is valid"),
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![CorsOrigin::Wildcard],
            allow_credentials: false,
            max_age: Some(3600), // Cache preflight for 1 hour
        }
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
        if self.storage.upload_dir.as_os_str().is_empty() {
            return Err(Error::Internal {
                operation: "Config validation: storage.upload_dir cannot be empty".to_string(),
            });
        }

        if self.storage.work_dir == self.storage.upload_dir {
            return Err(Error::Internal {
                operation: "Config validation: storage.work_dir must differ from storage.upload_dir, \
                            otherwise in-progress uploads become downloadable"
                    .to_string(),
            });
        }

        let prefix = &self.storage.static_prefix;
        if !prefix.starts_with('/') || prefix.trim_end_matches('/').is_empty() {
            return Err(Error::Internal {
                operation: format!("Config validation: storage.static_prefix '{prefix}' must start with '/' and cannot be the root path"),
            });
        }

        if self.storage.max_upload_size == 0 {
            return Err(Error::Internal {
                operation: "Config validation: storage.max_upload_size cannot be 0".to_string(),
            });
        }

        if self.transcoder.program.trim().is_empty() {
            return Err(Error::Internal {
                operation: "Config validation: transcoder.program cannot be empty".to_string(),
            });
        }

        if self.transcoder.timeout.is_zero() {
            return Err(Error::Internal {
                operation: "Config validation: transcoder.timeout must be positive (default: 300s)".to_string(),
            });
        }

        if self.cors.allowed_origins.is_empty() {
            return Err(Error::Internal {
                operation: "Config validation: CORS allowed_origins cannot be empty. Add at least one allowed origin.".to_string(),
            });
        }

        // Validate that wildcard is not used with credentials
        let has_wildcard = self
            .cors
            .allowed_origins
            .iter()
            .any(|origin| matches!(origin, CorsOrigin::Wildcard));
        if has_wildcard && self.cors.allow_credentials {
            return Err(Error::Internal {
                operation: "Config validation: CORS cannot use wildcard origin '*' with allow_credentials=true. Specify explicit origins."
                    .to_string(),
            });
        }

        Ok(())
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            // Load base config file
            .merge(Yaml::file(&args.config))
            // Environment variables can still override specific values. TIMELAPSE_CONFIG names the
            // file itself and is not a config key.
            .merge(Env::prefixed("TIMELAPSE_").ignore(&["config"]).split("__"))
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Public link for a published output file.
    pub fn download_url(&self, file_name: &str) -> String {
        format!(
            "{}{}/{}",
            self.public_url.as_str().trim_end_matches('/'),
            self.storage.static_prefix.trim_end_matches('/'),
            file_name
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    fn args(path: &str) -> Args {
        Args {
            config: path.to_string(),
            validate: false,
        }
    }

    #[test]
    fn test_defaults_without_config_file() {
        Jail::expect_with(|_jail| {
            let config = Config::load(&args("missing.yaml"))?;

            assert_eq!(config.port, 5000);
            assert_eq!(config.storage.upload_dir, PathBuf::from("static/videos"));
            assert_eq!(config.storage.static_prefix, "/static/videos");
            assert_eq!(config.transcoder.program, "ffmpeg");
            assert_eq!(config.transcoder.timeout, Duration::from_secs(300));
            assert_eq!(config.transcoder.default_speed, Speed::DEFAULT);
            assert!(config.transcoder.fallback_paths.is_empty());
            assert!(matches!(config.cors.allowed_origins.as_slice(), [CorsOrigin::Wildcard]));

            Ok(())
        });
    }

    #[test]
    fn test_transcoder_config_from_yaml() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
transcoder:
  program: ffmpeg7
  path: /opt/ffmpeg/bin/ffmpeg
  fallback_paths:
    - /usr/local/bin/ffmpeg
    - /snap/bin/ffmpeg
  timeout: 90s
  default_speed: 2.5
"#,
            )?;

            let config = Config::load(&args("test.yaml"))?;

            assert_eq!(config.transcoder.program, "ffmpeg7");
            assert_eq!(config.transcoder.path, Some(PathBuf::from("/opt/ffmpeg/bin/ffmpeg")));
            assert_eq!(config.transcoder.fallback_paths.len(), 2);
            assert_eq!(config.transcoder.timeout, Duration::from_secs(90));
            assert_eq!(config.transcoder.default_speed.value(), 2.5);
            // Untouched values keep their defaults
            assert_eq!(config.transcoder.help_url.as_str(), "https://ffmpeg.org/download.html");

            Ok(())
        });
    }

    #[test]
    fn test_env_override() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
port: 7000
storage:
  upload_dir: /srv/videos
"#,
            )?;

            jail.set_env("TIMELAPSE_HOST", "127.0.0.1");
            jail.set_env("TIMELAPSE_PORT", "8080");
            jail.set_env("TIMELAPSE_TRANSCODER__TIMEOUT", "10m");
            // Names the config file, must not be treated as a config key
            jail.set_env("TIMELAPSE_CONFIG", "test.yaml");

            let config = Config::load(&args("test.yaml"))?;

            assert_eq!(config.host, "127.0.0.1");
            assert_eq!(config.port, 8080);
            assert_eq!(config.transcoder.timeout, Duration::from_secs(600));
            // YAML values should be preserved
            assert_eq!(config.storage.upload_dir, PathBuf::from("/srv/videos"));

            Ok(())
        });
    }

    #[test]
    fn test_unknown_fields_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file("test.yaml", "transcoder:\n  codec: h264\n")?;

            let result = Config::load(&args("test.yaml"));
            assert!(result.is_err());

            Ok(())
        });
    }

    #[test]
    fn test_non_positive_default_speed_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file("test.yaml", "transcoder:\n  default_speed: 0\n")?;

            let err = Config::load(&args("test.yaml")).unwrap_err();
            assert!(err.to_string().contains("greater than 0"));

            Ok(())
        });
    }

    #[test]
    fn test_cors_origins_from_yaml() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
cors:
  allowed_origins:
    - https://app.example.com
  allow_credentials: true
"#,
            )?;

            let config = Config::load(&args("test.yaml"))?;

            match config.cors.allowed_origins.as_slice() {
                [CorsOrigin::Url(url)] => assert_eq!(url.as_str(), "https://app.example.com/"),
                other => panic!("unexpected origins: {other:?}"),
            }
            assert!(config.cors.allow_credentials);

            Ok(())
        });
    }

    #[test]
    fn test_validation_rejects_wildcard_with_credentials() {
        let mut config = Config::default();
        config.cors.allow_credentials = true;

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("wildcard"));
    }

    #[test]
    fn test_validation_rejects_bad_storage() {
        let mut config = Config::default();
        config.storage.static_prefix = "/".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.storage.static_prefix = "static".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.storage.work_dir = config.storage.upload_dir.clone();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.storage.max_upload_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_bad_transcoder() {
        let mut config = Config::default();
        config.transcoder.timeout = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.transcoder.program = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_download_url() {
        let mut config = Config::default();
        assert_eq!(
            config.download_url("clip_timelapse.mp4"),
            "http://localhost:5000/static/videos/clip_timelapse.mp4"
        );

        config.public_url = Url::parse("https://videos.example.com/app/").unwrap();
        config.storage.static_prefix = "/files/".to_string();
        assert_eq!(
            config.download_url("clip_timelapse.mp4"),
            "https://videos.example.com/app/files/clip_timelapse.mp4"
        );
    }
}
