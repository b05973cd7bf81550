//! Connection profiles and builder configuration.

use crate::error::{DbError, DbResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Name of the profile used when none is selected.
pub const DEFAULT_CONNECTION: &str = "default";

/// Rows per page used by `paginate` unless configured otherwise.
pub const DEFAULT_PAGE_LIMIT: u64 = 20;

/// Everything needed to open one server connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionProfile {
    pub host: String,
    pub username: String,
    pub password: String,
    /// Database (schema) name.
    pub db: String,
    pub port: Option<u16>,
    /// Unix socket path; used instead of `host` when set.
    pub socket: Option<String>,
    /// Character set applied right after connecting. `None` keeps the server default.
    pub charset: Option<String>,
}

impl Default for ConnectionProfile {
    fn default() -> Self {
        Self {
            host: String::new(),
            username: String::new(),
            password: String::new(),
            db: String::new(),
            port: None,
            socket: None,
            charset: Some("utf8".to_string()),
        }
    }
}

impl ConnectionProfile {
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        db: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            username: username.into(),
            password: password.into(),
            db: db.into(),
            ..Self::default()
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_socket(mut self, socket: impl Into<String>) -> Self {
        self.socket = Some(socket.into());
        self
    }

    /// Set the character set; an empty string disables `SET NAMES`.
    pub fn with_charset(mut self, charset: impl Into<String>) -> Self {
        let charset = charset.into();
        self.charset = (!charset.is_empty()).then_some(charset);
        self
    }

    /// A profile needs a host or a socket to be connectable.
    pub fn is_addressable(&self) -> bool {
        !self.host.is_empty() || self.socket.as_deref().is_some_and(|s| !s.is_empty())
    }
}

/// Builder configuration.
///
/// Can be assembled in code:
///
/// ```
/// use myqb::{ConnectionProfile, DbConfig};
///
/// let config = DbConfig::new()
///     .with_connection("default", ConnectionProfile::new("localhost", "app", "secret", "shop"))
///     .with_prefix("t_")
///     .with_page_limit(50);
/// assert_eq!(config.page_limit, 50);
/// ```
///
/// or loaded from JSON (see [`DbConfig::from_json_str`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DbConfig {
    /// Named connection profiles.
    pub connections: BTreeMap<String, ConnectionProfile>,
    /// Profile used when no connection is explicitly selected.
    pub default_connection: String,
    /// Prefix prepended to table names.
    pub prefix: String,
    /// Page size for `paginate`.
    pub page_limit: u64,
    /// Reconnect once and retry when the server has gone away.
    pub auto_reconnect: bool,
    /// Record every statement in the trace log.
    pub trace: bool,
    /// Path prefix stripped from trace caller locations.
    pub trace_strip_prefix: Option<String>,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            connections: BTreeMap::new(),
            default_connection: DEFAULT_CONNECTION.to_string(),
            prefix: String::new(),
            page_limit: DEFAULT_PAGE_LIMIT,
            auto_reconnect: true,
            trace: false,
            trace_strip_prefix: None,
        }
    }
}

impl DbConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a named profile.
    pub fn with_connection(mut self, name: impl Into<String>, profile: ConnectionProfile) -> Self {
        self.connections.insert(name.into(), profile);
        self
    }

    pub fn with_default_connection(mut self, name: impl Into<String>) -> Self {
        self.default_connection = name.into();
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_page_limit(mut self, page_limit: u64) -> Self {
        self.page_limit = page_limit;
        self
    }

    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    /// Enable statement tracing, optionally stripping a path prefix from callers.
    pub fn with_trace(mut self, strip_prefix: Option<&str>) -> Self {
        self.trace = true;
        self.trace_strip_prefix = strip_prefix.map(str::to_string);
        self
    }

    /// Parse a JSON configuration document.
    ///
    /// ```
    /// let config = myqb::DbConfig::from_json_str(r#"{
    ///     "connections": { "default": { "host": "db", "username": "u", "db": "app" } },
    ///     "prefix": "t_"
    /// }"#).unwrap();
    /// assert_eq!(config.prefix, "t_");
    /// assert_eq!(config.page_limit, 20);
    /// ```
    pub fn from_json_str(json: &str) -> DbResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> DbResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&content)
    }

    /// Check values that cannot be expressed in the type.
    pub fn validate(&self) -> DbResult<()> {
        if self.page_limit == 0 {
            return Err(DbError::configuration("page_limit must be greater than 0"));
        }
        if self.default_connection.is_empty() {
            return Err(DbError::configuration("default_connection must not be empty"));
        }
        Ok(())
    }
}
