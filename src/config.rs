//! Configuration manager for kycgate.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use url::Url;

const DEFAULT_CONFIG_PATH: &str = "config.yaml";
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    /// Instance name.
    pub name: String,
    /// Domain name of current instance.
    pub url: String,
    #[serde(default)]
    version: String,
    #[serde(skip)]
    path: PathBuf,
    /// Related to PostgreSQL configuration.
    #[serde(skip_serializing)]
    pub postgres: Option<Postgres>,
    /// Related to avatar and document storage.
    #[serde(default)]
    pub storage: Storage,
    /// Related to reviewer notifications.
    #[serde(skip_serializing)]
    pub telegram: Option<Telegram>,
    /// Related to submission rules.
    #[serde(default)]
    pub verification: Verification,
    /// Related to the reverse proxy in front of the service.
    #[serde(default)]
    pub proxy: Proxy,
    /// Related to the authentication gateway and reviewers.
    #[serde(default, skip_serializing)]
    pub gateway: Gateway,
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

/// Local object storage configuration.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Storage {
    /// Directory objects are written into.
    pub root: PathBuf,
    /// Base URL objects are served from.
    pub public_url: String,
}

impl Default for Storage {
    fn default() -> Self {
        Self {
            root: PathBuf::from("storage"),
            public_url: "http://localhost:8080/storage".into(),
        }
    }
}

/// Telegram bot configuration.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Telegram {
    /// Bot token.
    pub token: String,
    /// Reviewers chat.
    pub chat_id: String,
    /// Override of the Bot API base URL.
    pub api_url: Option<String>,
}

/// Submission rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Verification {
    /// Rejected reviews allowed per calendar day before submissions are
    /// refused.
    pub max_daily_errors: i32,
    /// Seconds a user stays online after its last visit.
    pub presence_ttl: u64,
    /// Seconds an email code stays valid.
    pub email_code_ttl: u64,
}

impl Default for Verification {
    fn default() -> Self {
        Self {
            max_daily_errors: 3,
            presence_ttl: 70,
            email_code_ttl: 900,
        }
    }
}

/// Reverse proxy configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Proxy {
    /// Trusted header holding the real client IP.
    pub ip_header: String,
}

impl Default for Proxy {
    fn default() -> Self {
        Self {
            ip_header: "cf-connecting-ip".into(),
        }
    }
}

/// Authentication gateway configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Gateway {
    /// Header carrying the authenticated user ID.
    pub identity_header: String,
    /// Secret expected in `x-review-token` on reviewer routes.
    /// Reviewer routes are closed when missing.
    pub review_token: Option<String>,
}

impl Default for Gateway {
    fn default() -> Self {
        Self {
            identity_header: "x-user-id".into(),
            review_token: None,
        }
    }
}

impl Configuration {
    pub fn path(mut self, path: PathBuf) -> Self {
        self.path = path;
        self
    }

    /// Normalizes a URL string by ensuring it starts with a valid scheme
    /// (`http` or `https`).
    fn normalize_url(&self, url: &str) -> Result<String, url::ParseError> {
        let url_with_scheme =
            if url.starts_with("http://") || url.starts_with("https://") {
                url.to_string()
            } else {
                format!("https://{url}")
            };

        let parsed_url = Url::parse(&url_with_scheme)?;
        Ok(parsed_url.to_string())
    }

    /// Reads the `config.yaml` file from the specified path or the default
    /// location.
    pub fn read(self) -> Result<Arc<Self>, url::ParseError> {
        let file_path = if self.path.is_file() {
            &self.path
        } else {
            &Path::new(DEFAULT_CONFIG_PATH).to_path_buf()
        };

        match File::open(file_path) {
            Ok(file) => {
                let mut config: Configuration =
                    match serde_yaml::from_reader(file) {
                        Ok(config) => config,
                        Err(err) => {
                            return Ok(Arc::new(self.error(err)));
                        },
                    };

                // set app version.
                config.version = VERSION.to_owned();

                // normalize URLs.
                if !config.url.is_empty() {
                    config.url = self.normalize_url(&config.url)?;
                }
                config.storage.public_url =
                    self.normalize_url(&config.storage.public_url)?;

                Ok(Arc::new(config))
            },
            Err(err) => Ok(Arc::new(self.error(err))),
        }
    }

    /// Return a default configuration as fallback.
    fn error(&self, err: impl std::error::Error) -> Self {
        tracing::error!(error = %err, "`config.yaml` file not found or invalid");
        Self {
            version: VERSION.to_owned(),
            ..Default::default()
        }
    }
}
