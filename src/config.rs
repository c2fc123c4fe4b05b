//! Configuration manager for quire.

use std::collections::HashSet;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::FromRef;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::AppState;
use crate::reconcile::ReconcileMode;

pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";
const DEFAULT_PORT: u16 = 8888;
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    /// Instance name.
    #[serde(default)]
    pub name: String,
    /// Domain name of current instance.
    #[serde(default)]
    pub url: String,
    /// Listening port.
    pub port: Option<u16>,
    #[serde(default)]
    version: String,
    #[serde(skip)]
    path: PathBuf,
    /// Related to PostgreSQL configuration.
    /// Posts and users are kept in memory when absent.
    #[serde(skip_serializing)]
    pub postgres: Option<Postgres>,
    /// Related to Argon2 configuration.
    #[serde(skip_serializing)]
    pub argon2: Option<Argon2>,
    /// Related to session tokens.
    #[serde(skip_serializing, default)]
    pub token: Token,
    /// Who may run maintenance actions.
    #[serde(skip_serializing, default)]
    pub admin: Admin,
    /// What to do when the posts of a deleted user cannot be deleted.
    #[serde(skip_serializing, default)]
    pub cascade: CascadePolicy,
    /// Orphaned posts cleanup.
    #[serde(skip_serializing, default)]
    pub maintenance: Maintenance,
    /// Logs and metrics export.
    #[serde(skip_serializing, default)]
    pub telemetry: Telemetry,
}

/// PostgreSQL configuration.
#[derive(Debug, Default, PartialEq, Clone, Serialize, Deserialize)]
pub struct Postgres {
    /// Hostname:(?port) for PostgreSQL instance.
    pub address: String,
    /// Database name.
    pub database: Option<String>,
    /// Username credential to connect.
    pub username: Option<String>,
    /// Password credential to connect.
    pub password: Option<String>,
    /// Maximum pool connections.
    pub pool_size: Option<u32>,
}

/// Argon2 configuration.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Argon2 {
    /// Memory used while hashing.
    pub memory_cost: u32,
    /// Iterations of hash.
    pub iterations: u32,
    /// Parallelism degree.
    pub parallelism: u32,
    /// Output hash length.
    pub hash_length: usize,
}

impl Default for Argon2 {
    fn default() -> Self {
        Self {
            memory_cost: 1024 * 64, // 64 MiB.
            iterations: 4,
            parallelism: 2,
            hash_length: 32,
        }
    }
}

/// Json Web Token configuration.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Token {
    /// HMAC secret. Overridden by the `TOKEN_SECRET` environment variable.
    pub secret: Option<String>,
    /// Update token audience.
    /// Default is `quire`.
    pub audience: Option<String>,
    /// Lifetime of a token, in seconds.
    pub expires_in: u64,
}

impl Default for Token {
    fn default() -> Self {
        Self {
            secret: None,
            audience: None,
            expires_in: 60 * 60 * 24, // 1 day.
        }
    }
}

/// Administrators allow-list.
#[derive(Debug, Default, PartialEq, Clone, Serialize, Deserialize)]
pub struct Admin {
    #[serde(default)]
    pub emails: HashSet<String>,
}

/// Behaviour of a user deletion when its posts cannot be deleted.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CascadePolicy {
    /// Log the failure and delete the user anyway. Leftover posts are
    /// orphans until the next reconciliation.
    #[default]
    BestEffort,
    /// Keep the user and report the failure.
    Abort,
}

/// Orphaned posts cleanup configuration.
#[derive(Debug, Default, PartialEq, Clone, Serialize, Deserialize)]
pub struct Maintenance {
    /// Serve `GET /admin/cleanup/manual` without authorization.
    /// Only for deployments where the route is not publicly reachable.
    #[serde(default)]
    pub open_manual_cleanup: bool,
    /// Mode used when a caller does not pick one.
    #[serde(default)]
    pub default_mode: ReconcileMode,
}

/// Telemetry configuration.
#[derive(Debug, Default, PartialEq, Clone, Serialize, Deserialize)]
pub struct Telemetry {
    /// OTLP gRPC endpoint receiving logs and traces.
    pub otlp_endpoint: Option<String>,
    /// Expose Prometheus metrics on `/metrics`.
    #[serde(default)]
    pub prometheus: bool,
}

impl FromRef<AppState> for Arc<Configuration> {
    fn from_ref(state: &AppState) -> Arc<Configuration> {
        Arc::clone(&state.config)
    }
}

impl Configuration {
    pub fn path(mut self, path: PathBuf) -> Self {
        self.path = path;
        self
    }

    /// Port the server listens on.
    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }

    /// Normalizes a URL string by ensuring it starts with a valid scheme
    /// (`http` or `https`).
    fn normalize_url(&self, url: &str) -> Result<String, url::ParseError> {
        let url_with_scheme = if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            format!("https://{url}")
        };

        let parsed_url = Url::parse(&url_with_scheme)?;
        Ok(parsed_url.to_string())
    }

    /// Reads the `config.yaml` file from the specified path or the default
    /// location.
    ///
    /// A missing file yields the default configuration. An unreadable one is
    /// an error rather than a silent fallback.
    pub fn read(self) -> Result<Arc<Self>, ConfigError> {
        let file_path = if self.path.is_file() {
            &self.path
        } else {
            &Path::new(DEFAULT_CONFIG_PATH).to_path_buf()
        };

        match File::open(file_path) {
            Ok(file) => {
                let config: Configuration = serde_yaml::from_reader(file)?;
                Ok(Arc::new(self.finalize(config)?))
            },
            Err(err) => Ok(Arc::new(self.error(err))),
        }
    }

    /// Parse a configuration from YAML text.
    pub fn from_yaml(self, yaml: &str) -> Result<Self, ConfigError> {
        let config: Configuration = serde_yaml::from_str(yaml)?;
        Ok(self.finalize(config)?)
    }

    fn finalize(&self, mut config: Configuration) -> Result<Self, url::ParseError> {
        // set app version.
        config.version = VERSION.to_owned();
        config.path = self.path.clone();

        if config.name.is_empty() {
            config.name = env!("CARGO_CRATE_NAME").to_owned();
        }
        if !config.url.is_empty() {
            config.url = self.normalize_url(&config.url)?;
        }
        config.admin.emails = config
            .admin
            .emails
            .into_iter()
            .map(|email| email.trim().to_lowercase())
            .collect();

        Ok(config)
    }

    /// Return a default configuration as fallback.
    fn error(&self, err: impl std::error::Error) -> Self {
        tracing::error!(error = %err, "`config.yaml` file not found, using defaults");
        Self {
            name: env!("CARGO_CRATE_NAME").to_owned(),
            version: VERSION.to_owned(),
            ..Default::default()
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
    #[error(transparent)]
    Url(#[from] url::ParseError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_configuration() {
        let config = Configuration::default()
            .from_yaml(
                r#"
name: blog
url: blog.example.com
port: 9000
token:
  secret: s3cr3t
  expires_in: 60
admin:
  emails: ["Admin@Example.com"]
cascade: abort
maintenance:
  open_manual_cleanup: true
  default_mode: scan
"#,
            )
            .unwrap();

        assert_eq!(config.name, "blog");
        assert_eq!(config.url, "https://blog.example.com/");
        assert_eq!(config.port(), 9000);
        assert_eq!(config.token.expires_in, 60);
        assert!(config.admin.emails.contains("admin@example.com"));
        assert_eq!(config.cascade, CascadePolicy::Abort);
        assert!(config.maintenance.open_manual_cleanup);
        assert_eq!(config.maintenance.default_mode, ReconcileMode::Scan);
        assert!(config.postgres.is_none());
    }

    #[test]
    fn test_defaults() {
        let config = Configuration::default().from_yaml("{}").unwrap();

        assert_eq!(config.port(), DEFAULT_PORT);
        assert_eq!(config.cascade, CascadePolicy::BestEffort);
        assert_eq!(config.maintenance.default_mode, ReconcileMode::Bulk);
        assert!(!config.maintenance.open_manual_cleanup);
        assert!(config.admin.emails.is_empty());
    }

    #[test]
    fn test_partial_sections() {
        let config = Configuration::default()
            .from_yaml(
                r#"
postgres:
  address: db:5432
token:
  secret: s
admin:
  emails: [admin@example.com]
"#,
            )
            .unwrap();

        assert_eq!(config.token.secret.as_deref(), Some("s"));
        assert_eq!(config.token.expires_in, Token::default().expires_in);
        assert_eq!(config.postgres.map(|pg| pg.address).as_deref(), Some("db:5432"));
        assert!(config.admin.emails.contains("admin@example.com"));
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let path = std::env::temp_dir().join(format!("quire-invalid-{}.yaml", std::process::id()));
        std::fs::write(&path, "token:\n  expires_in: soon\n").unwrap();

        let result = Configuration::default().path(path.clone()).read();
        std::fs::remove_file(&path).unwrap();

        assert!(matches!(result, Err(ConfigError::Yaml(_))));
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = Configuration::default()
            .path(PathBuf::from("/nonexistent/quire.yaml"))
            .read()
            .unwrap();

        assert_eq!(config.version, VERSION);
    }
}
