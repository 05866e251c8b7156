//! Server configuration from environment variables.

use std::collections::BTreeSet;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use nbrepo_core::Username;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" | "pretty" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("expected 'text' or 'json', got '{other}'")),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Database connection URL; the in-memory store is used when absent.
    pub database_url: Option<String>,
    /// Server port to listen on.
    pub port: u16,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    pub log_format: LogFormat,
    /// CORS allowed origins (comma-separated or "*" for all).
    pub cors_allowed_origins: String,
    /// HMAC secret for bearer tokens.
    pub jwt_secret: String,
    /// Bearer token lifetime in hours.
    pub jwt_expiry_hours: u64,
    /// Shared secret the hub authenticator presents when exchanging a username
    /// for a token. When unset, any username is accepted.
    pub token_exchange_secret: Option<String>,
    /// Users flagged admin.
    pub admin_users: BTreeSet<Username>,
    /// Trust the `X-Username` header when no token is sent.
    pub allow_dev_identity: bool,
    /// Root directory holding one workspace directory per user.
    pub users_path: PathBuf,
    /// Upper bound on a single workspace copy.
    pub workspace_timeout: Duration,
    /// Interval clients are expected to heartbeat at.
    pub heartbeat_interval: Duration,
    /// How long a heartbeat keeps a user listed as an active editor.
    pub liveness_window: Duration,
    /// Prefix of read-only rendering links.
    pub preview_base_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            cors_allowed_origins: "*".to_string(),
            jwt_secret: String::new(),
            jwt_expiry_hours: 168,
            token_exchange_secret: None,
            admin_users: BTreeSet::new(),
            allow_dev_identity: false,
            users_path: PathBuf::from("./users"),
            workspace_timeout: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(60),
            liveness_window: Duration::from_secs(120),
            preview_base_url: "/previews".to_string(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `JWT_SECRET`: token signing secret, unless `ALLOW_DEV_IDENTITY=true`
    ///
    /// Optional:
    /// - `DATABASE_URL`: PostgreSQL connection string (default: in-memory store)
    /// - `PORT`: Server port (default: 3000)
    /// - `LOG_LEVEL`: Logging level (default: "info")
    /// - `LOG_FORMAT`: "text" or "json" (default: "text")
    /// - `CORS_ALLOWED_ORIGINS`: Allowed CORS origins (default: "*")
    /// - `JWT_EXPIRY_HOURS`: Token lifetime (default: 168)
    /// - `TOKEN_EXCHANGE_SECRET`: Secret required by `/api-token-auth/`
    /// - `ADMIN_USERS`: Comma-separated admin usernames
    /// - `ALLOW_DEV_IDENTITY`: Trust `X-Username` (default: false)
    /// - `USERS_PATH`: Workspace root (default: "./users")
    /// - `WORKSPACE_TIMEOUT_SECS`: Copy timeout (default: 10)
    /// - `HEARTBEAT_INTERVAL_SECS`: Client heartbeat interval (default: 60)
    /// - `LIVENESS_WINDOW_SECS`: Presence window (default: twice the interval)
    /// - `PREVIEW_BASE_URL`: Rendering link prefix (default: "/previews")
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let database_url = env::var("DATABASE_URL").ok().filter(|s| !s.trim().is_empty());
        let port = parse_var("PORT", defaults.port)?;
        let log_level = env::var("LOG_LEVEL").unwrap_or(defaults.log_level);
        let log_format = parse_var("LOG_FORMAT", defaults.log_format)?;
        let cors_allowed_origins =
            env::var("CORS_ALLOWED_ORIGINS").unwrap_or(defaults.cors_allowed_origins);
        let allow_dev_identity = parse_var("ALLOW_DEV_IDENTITY", false)?;

        let jwt_secret = match env::var("JWT_SECRET") {
            Ok(secret) if !secret.is_empty() => secret,
            _ if allow_dev_identity => "nbrepo-dev-secret".to_string(),
            _ => return Err(ConfigError::MissingEnvVar("JWT_SECRET".to_string())),
        };
        let jwt_expiry_hours = parse_var("JWT_EXPIRY_HOURS", defaults.jwt_expiry_hours)?;
        let token_exchange_secret = env::var("TOKEN_EXCHANGE_SECRET").ok().filter(|s| !s.is_empty());

        let admin_users = match env::var("ADMIN_USERS") {
            Ok(raw) => parse_admin_users(&raw)?,
            Err(_) => BTreeSet::new(),
        };

        let users_path = env::var("USERS_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.users_path);
        let workspace_timeout = Duration::from_secs(parse_var("WORKSPACE_TIMEOUT_SECS", 10)?);
        let interval_secs: u64 = parse_var("HEARTBEAT_INTERVAL_SECS", 60)?;
        if interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                name: "HEARTBEAT_INTERVAL_SECS".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        let window_secs = parse_var("LIVENESS_WINDOW_SECS", interval_secs * 2)?;
        let preview_base_url = env::var("PREVIEW_BASE_URL").unwrap_or(defaults.preview_base_url);

        Ok(Self {
            database_url,
            port,
            log_level,
            log_format,
            cors_allowed_origins,
            jwt_secret,
            jwt_expiry_hours,
            token_exchange_secret,
            admin_users,
            allow_dev_identity,
            users_path,
            workspace_timeout,
            heartbeat_interval: Duration::from_secs(interval_secs),
            liveness_window: Duration::from_secs(window_secs),
            preview_base_url,
        })
    }

    /// Get the socket address for the server.
    pub fn socket_addr(&self) -> std::net::SocketAddr {
        std::net::SocketAddr::from(([0, 0, 0, 0], self.port))
    }

    pub fn is_admin(&self, user: &Username) -> bool {
        self.admin_users.contains(user)
    }
}

fn parse_var<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            name: name.to_string(),
            reason: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

fn parse_admin_users(raw: &str) -> Result<BTreeSet<Username>, ConfigError> {
    raw.split(',')
        .filter(|s| !s.trim().is_empty())
        .map(|s| {
            Username::parse(s).map_err(|e| ConfigError::InvalidValue {
                name: "ADMIN_USERS".to_string(),
                reason: e.to_string(),
            })
        })
        .collect()
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    /// Invalid environment variable value.
    #[error("invalid value for environment variable {name}: {reason}")]
    InvalidValue { name: String, reason: String },

    /// Invalid CORS origin.
    #[error("invalid CORS origin '{0}'")]
    InvalidOrigin(String),
}
