//! Configuration management
//!
//! Configuration is loaded once at startup from several sources, highest
//! priority first:
//!
//! 1. Command-line flags (`--addr`, `--dsn`), applied by the binary
//! 2. Environment variables with the `SNIPPETBOX_` prefix, `__` for nesting
//!    (e.g. `SNIPPETBOX_SESSION__LIFETIME_SECS=3600`)
//! 3. The file passed with `--config`, or `./snippetbox.toml` if present
//! 4. Hardcoded defaults
//!
//! # Example Configuration
//!
//! ```toml
//! [server]
//! addr = "0.0.0.0:4000"
//!
//! [database]
//! url = "sqlite://snippetbox.db?mode=rwc"
//!
//! [session]
//! lifetime_secs = 43200
//! secure = true
//! ```

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::middleware::SecurityHeadersConfig;

/// Default configuration file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "snippetbox.toml";

/// Listener and static assets
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to bind
    pub addr: String,
    /// Directory served under `/static`
    pub static_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:4000".to_string(),
            static_dir: PathBuf::from("./ui/static"),
        }
    }
}

/// Database connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// `SQLite` connection string
    pub url: String,
    /// Pool size
    pub max_connections: u32,
    /// How long to wait for a pooled connection
    pub acquire_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://snippetbox.db?mode=rwc".to_string(),
            max_connections: 5,
            acquire_timeout_secs: 5,
        }
    }
}

impl DatabaseConfig {
    /// Private in-memory database; one connection so every query sees it
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            ..Self::default()
        }
    }
}

/// Cookie `SameSite` attribute
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SameSitePolicy {
    /// Only same-site requests carry the cookie
    Strict,
    /// Top-level navigations carry the cookie
    #[default]
    Lax,
    /// Every request carries the cookie; requires `Secure`
    None,
}

impl SameSitePolicy {
    /// Attribute value as written in `Set-Cookie`
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Strict => "Strict",
            Self::Lax => "Lax",
            Self::None => "None",
        }
    }
}

/// Session cookie and lifetime
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Cookie carrying the session token
    pub cookie_name: String,
    /// Header checked when no cookie is present
    pub header_name: String,
    /// Absolute session lifetime
    pub lifetime_secs: u64,
    /// Set the `Secure` attribute
    pub secure: bool,
    /// Set the `HttpOnly` attribute
    pub http_only: bool,
    /// `SameSite` attribute
    pub same_site: SameSitePolicy,
    /// How often expired sessions are evicted
    pub cleanup_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "session".to_string(),
            header_name: "x-session-token".to_string(),
            lifetime_secs: 12 * 60 * 60,
            secure: !cfg!(debug_assertions),
            http_only: true,
            same_site: SameSitePolicy::Lax,
            cleanup_interval_secs: 60,
        }
    }
}

impl SessionConfig {
    /// Lifetime as a `chrono` duration
    #[must_use]
    pub fn lifetime(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.lifetime_secs).unwrap_or(i64::MAX))
    }
}

/// Cross-site request forgery protection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CsrfConfig {
    /// Largest form body buffered while looking for the token
    pub max_form_bytes: usize,
}

impl Default for CsrfConfig {
    fn default() -> Self {
        Self {
            max_form_bytes: 1024 * 1024,
        }
    }
}

/// Authentication gate
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Where unauthenticated requests to protected routes are sent
    pub redirect_path: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            redirect_path: "/".to_string(),
        }
    }
}

/// Snippet listing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SnippetsConfig {
    /// How many snippets the home page lists
    pub latest_limit: i64,
}

impl Default for SnippetsConfig {
    fn default() -> Self {
        Self { latest_limit: 10 }
    }
}

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnippetboxConfig {
    /// Listener settings
    #[serde(default)]
    pub server: ServerConfig,
    /// Database settings
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Session settings
    #[serde(default)]
    pub session: SessionConfig,
    /// Forgery protection settings
    #[serde(default)]
    pub csrf: CsrfConfig,
    /// Response security headers
    #[serde(default)]
    pub security_headers: SecurityHeadersConfig,
    /// Authentication gate settings
    #[serde(default)]
    pub auth: AuthConfig,
    /// Snippet listing settings
    #[serde(default)]
    pub snippets: SnippetsConfig,
}

impl SnippetboxConfig {
    /// Load configuration from defaults, a file and the environment
    ///
    /// With `path` set the file must exist. Without it, `./snippetbox.toml`
    /// is used when present.
    ///
    /// # Errors
    ///
    /// Returns an error if the explicit file is missing, a file cannot be
    /// parsed, or a value has the wrong type.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let config = Self::file_layers(path)?
            .merge(Env::prefixed("SNIPPETBOX_").split("__").lowercase(true))
            .extract()?;
        Ok(config)
    }

    fn file_layers(path: Option<&Path>) -> anyhow::Result<Figment> {
        let mut figment = Figment::new().merge(Toml::string(&toml::to_string(&Self::default())?));

        match path {
            Some(path) => {
                anyhow::ensure!(
                    path.exists(),
                    "config file {} does not exist",
                    path.display()
                );
                figment = figment.merge(Toml::file(path));
            }
            None => {
                let local = PathBuf::from(DEFAULT_CONFIG_FILE);
                if local.exists() {
                    figment = figment.merge(Toml::file(local));
                }
            }
        }

        Ok(figment)
    }
}
