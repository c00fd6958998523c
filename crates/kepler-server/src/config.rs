//! Configuration management
//!
//! Everything is read from the environment once, at startup, and handed to
//! the clients that need it. Nothing below `main` reads the environment.

use serde::{Deserialize, Serialize};
use std::time::Duration;

// ============================================================================
// Configuration Constants
// ============================================================================

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/kepler";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 10;

/// Default minimum database connections in the pool.
pub const DEFAULT_DATABASE_MIN_CONNECTIONS: u32 = 1;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default GeoServer workspace for published layers.
pub const DEFAULT_GEOSERVER_WORKSPACE: &str = "mit";

/// Default GeoServer datastore for vector layers.
pub const DEFAULT_GEOSERVER_DATASTORE: &str = "data";

/// Default namespace for deterministic record identifiers.
pub const DEFAULT_UUID_NAMESPACE: &str = "arrowsmith.mit.edu";

/// Default interval between reconciliation passes.
pub const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 60;

/// Default timeout for remote HTTP calls. Uploads can be large.
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 300;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub geoserver: GeoServerConfig,
    pub solr: SolrConfig,
    pub sword: SwordConfig,
    pub ingest: IngestConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
}

/// Credentials for HTTP basic auth
#[derive(Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct BasicAuth {
    pub username: String,
    pub password: Option<String>,
}

impl std::fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicAuth")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

impl BasicAuth {
    fn from_env(user_var: &str, pass_var: &str) -> Option<Self> {
        let username = std::env::var(user_var).ok().filter(|u| !u.is_empty())?;
        Some(Self {
            username,
            password: std::env::var(pass_var).ok(),
        })
    }
}

/// GeoServer instances. Restricted layers go to a separate, authenticated
/// instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoServerConfig {
    pub public_url: String,
    pub restricted_url: String,
    pub workspace: String,
    pub datastore: String,
    pub auth: Option<BasicAuth>,
}

/// Solr catalog index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolrConfig {
    pub url: String,
    pub auth: Option<BasicAuth>,
}

/// SWORD deposit service and the repository's OAI-ORE endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwordConfig {
    pub service_url: String,
    pub oai_ore_url: String,
    pub auth: Option<BasicAuth>,
}

/// Ingest engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    pub uuid_namespace: String,
    pub reconcile_interval_secs: u64,
    pub http_timeout_secs: u64,
}

impl IngestConfig {
    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config {
            database: DatabaseConfig {
                url: env_or("DATABASE_URL", DEFAULT_DATABASE_URL),
                max_connections: env_parse(
                    "DATABASE_MAX_CONNECTIONS",
                    DEFAULT_DATABASE_MAX_CONNECTIONS,
                ),
                min_connections: env_parse(
                    "DATABASE_MIN_CONNECTIONS",
                    DEFAULT_DATABASE_MIN_CONNECTIONS,
                ),
                connect_timeout_secs: env_parse(
                    "DATABASE_CONNECT_TIMEOUT",
                    DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                ),
            },
            geoserver: GeoServerConfig {
                public_url: env_or("GEOSERVER_PUBLIC_URL", ""),
                restricted_url: env_or("GEOSERVER_RESTRICTED_URL", ""),
                workspace: env_or("GEOSERVER_WORKSPACE", DEFAULT_GEOSERVER_WORKSPACE),
                datastore: env_or("GEOSERVER_DATASTORE", DEFAULT_GEOSERVER_DATASTORE),
                auth: BasicAuth::from_env("GEOSERVER_AUTH_USER", "GEOSERVER_AUTH_PASS"),
            },
            solr: SolrConfig {
                url: env_or("SOLR_URL", ""),
                auth: BasicAuth::from_env("SOLR_AUTH_USER", "SOLR_AUTH_PASS"),
            },
            sword: SwordConfig {
                service_url: env_or("SWORD_SERVICE_URL", ""),
                oai_ore_url: env_or("OAI_ORE_URL", ""),
                auth: BasicAuth::from_env("SWORD_SERVICE_USERNAME", "SWORD_SERVICE_PASSWORD"),
            },
            ingest: IngestConfig {
                uuid_namespace: env_or("UUID_NAMESPACE", DEFAULT_UUID_NAMESPACE),
                reconcile_interval_secs: env_parse(
                    "RECONCILE_INTERVAL_SECS",
                    DEFAULT_RECONCILE_INTERVAL_SECS,
                ),
                http_timeout_secs: env_parse("HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT_SECS),
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        if self.database.max_connections == 0 {
            anyhow::bail!("Database max_connections must be greater than 0");
        }

        if self.database.min_connections > self.database.max_connections {
            anyhow::bail!(
                "Database min_connections ({}) cannot be greater than max_connections ({})",
                self.database.min_connections,
                self.database.max_connections
            );
        }

        for (name, url) in [
            ("GEOSERVER_PUBLIC_URL", &self.geoserver.public_url),
            ("GEOSERVER_RESTRICTED_URL", &self.geoserver.restricted_url),
            ("SOLR_URL", &self.solr.url),
            ("SWORD_SERVICE_URL", &self.sword.service_url),
            ("OAI_ORE_URL", &self.sword.oai_ore_url),
        ] {
            if url.is_empty() {
                tracing::warn!(variable = name, "Service URL not configured");
            } else if !url.starts_with("http://") && !url.starts_with("https://") {
                anyhow::bail!("{} must be an http(s) URL, got '{}'", name, url);
            }
        }

        if self.geoserver.workspace.is_empty() {
            anyhow::bail!("GeoServer workspace cannot be empty");
        }

        if self.ingest.reconcile_interval_secs == 0 {
            anyhow::bail!("Reconcile interval must be greater than 0");
        }

        if self.ingest.http_timeout_secs == 0 {
            anyhow::bail!("HTTP timeout must be greater than 0");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: DEFAULT_DATABASE_URL.to_string(),
                max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
                min_connections: DEFAULT_DATABASE_MIN_CONNECTIONS,
                connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
            },
            geoserver: GeoServerConfig {
                public_url: String::new(),
                restricted_url: String::new(),
                workspace: DEFAULT_GEOSERVER_WORKSPACE.to_string(),
                datastore: DEFAULT_GEOSERVER_DATASTORE.to_string(),
                auth: None,
            },
            solr: SolrConfig {
                url: String::new(),
                auth: None,
            },
            sword: SwordConfig {
                service_url: String::new(),
                oai_ore_url: String::new(),
                auth: None,
            },
            ingest: IngestConfig {
                uuid_namespace: DEFAULT_UUID_NAMESPACE.to_string(),
                reconcile_interval_secs: DEFAULT_RECONCILE_INTERVAL_SECS,
                http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            },
        }
    }
}
