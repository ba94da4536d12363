//! # Configuration Module
//!
//! Optional TOML configuration file for the Paceline binary.
//!
//! Precedence, lowest to highest:
//! 1. Built-in defaults
//! 2. Configuration file (`--config path/to/paceline.toml`)
//! 3. CLI flags
//! 4. Environment variables for security-relevant settings
//!    (`PACELINE_API_KEY`, `PACELINE_RATE_LIMIT`, `PACELINE_CORS_ORIGINS`)
//!
//! ## Example
//!
//! ```toml
//! host = "0.0.0.0"
//! port = 8080
//! database = "/var/lib/paceline/paceline.db"
//! backend = "redb"
//! rate_limit = 50
//! ```

use paceline_core::PacelineError;
use serde::Deserialize;
use std::path::{Path, PathBuf};

// =============================================================================
// CONFIG FILE
// =============================================================================

/// Values read from a TOML configuration file.
///
/// Every field is optional; missing fields fall back to CLI flags or
/// built-in defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Host the HTTP server binds to.
    pub host: Option<String>,
    /// Port the HTTP server binds to.
    pub port: Option<u16>,
    /// Path to the instance database.
    pub database: Option<PathBuf>,
    /// Storage backend: "redb" or "memory".
    pub backend: Option<String>,
    /// Requests per second for the HTTP rate limiter.
    pub rate_limit: Option<u32>,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, PacelineError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            PacelineError::IoError(format!("Cannot read config '{}': {}", path.display(), e))
        })?;

        toml::from_str(&contents).map_err(|e| {
            PacelineError::SerializationError(format!(
                "Cannot parse config '{}': {}",
                path.display(),
                e
            ))
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_config() {
        let raw = r#"
            host = "0.0.0.0"
            port = 9090
            database = "/tmp/test.db"
            backend = "memory"
            rate_limit = 25
        "#;

        let config: AppConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.host.as_deref(), Some("0.0.0.0"));
        assert_eq!(config.port, Some(9090));
        assert_eq!(config.database, Some(PathBuf::from("/tmp/test.db")));
        assert_eq!(config.backend.as_deref(), Some("memory"));
        assert_eq!(config.rate_limit, Some(25));
    }

    #[test]
    fn parses_partial_config() {
        let config: AppConfig = toml::from_str("port = 3000").unwrap();
        assert_eq!(config.port, Some(3000));
        assert!(config.host.is_none());
        assert!(config.database.is_none());
    }

    #[test]
    fn rejects_unknown_fields() {
        let result: Result<AppConfig, _> = toml::from_str("bogus_field = 1");
        assert!(result.is_err());
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let err = AppConfig::load(Path::new("/nonexistent/paceline.toml")).unwrap_err();
        assert!(matches!(err, PacelineError::IoError(_)));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("paceline.toml");
        std::fs::write(&path, "host = \"127.0.0.1\"\nport = 8081\n").unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.host.as_deref(), Some("127.0.0.1"));
        assert_eq!(config.port, Some(8081));
    }
}
