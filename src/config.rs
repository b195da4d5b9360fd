//! Client configuration.
//!
//! Defaults target a local server; [`ClientConfig::from_env`] overlays
//! `OPENERP_*` environment variables:
//!
//! | Variable | Field |
//! | --- | --- |
//! | `OPENERP_URL` | `url` |
//! | `OPENERP_PORT` | `port` |
//! | `OPENERP_ROOT_PATH` | `root_path` |
//! | `OPENERP_CHARSET` | `charset` |
//! | `OPENERP_TIMEOUT_SECS` | `timeout_secs` |
//! | `OPENERP_USER_AGENT` | `user_agent` |
//! | `OPENERP_DB` | `database` |
//! | `OPENERP_USER` | `username` |
//! | `OPENERP_PASSWORD` | `password` |

use reqwest::header::HeaderValue;
use serde::Deserialize;
use url::Url;

use crate::codec::check_charset;
use crate::error::{Result, RpcError};
use crate::router::validate_root_path;
use crate::session::Credentials;
use crate::transport::{DEFAULT_TIMEOUT_SECS, USER_AGENT};

pub const DEFAULT_URL: &str = "http://localhost";
pub const DEFAULT_PORT: u16 = 8069;
pub const DEFAULT_CHARSET: &str = "utf-8";

#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Scheme and host, e.g. `https://erp.example.com`
    pub url: String,
    pub port: u16,
    /// Optional prefix for every entry point path
    pub root_path: String,
    /// Document encoding; only UTF-8 is accepted
    pub charset: String,
    pub timeout_secs: u64,
    pub user_agent: String,
    pub database: String,
    pub username: String,
    pub password: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            port: DEFAULT_PORT,
            root_path: String::new(),
            charset: DEFAULT_CHARSET.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            user_agent: USER_AGENT.to_string(),
            database: String::new(),
            username: String::new(),
            password: String::new(),
        }
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("url", &self.url)
            .field("port", &self.port)
            .field("root_path", &self.root_path)
            .field("charset", &self.charset)
            .field("timeout_secs", &self.timeout_secs)
            .field("user_agent", &self.user_agent)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

impl ClientConfig {
    /// Defaults overlaid with `OPENERP_*` environment variables.
    ///
    /// # Errors
    ///
    /// `RpcError::InvalidConfig` when a numeric variable does not parse.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Overlay values from an arbitrary lookup. `from_env` uses the process
    /// environment; tests pass a map.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(url) = lookup("OPENERP_URL") {
            config.url = url;
        }
        if let Some(port) = lookup("OPENERP_PORT") {
            config.port = parse_number("OPENERP_PORT", &port)?;
        }
        if let Some(root) = lookup("OPENERP_ROOT_PATH") {
            config.root_path = root;
        }
        if let Some(charset) = lookup("OPENERP_CHARSET") {
            config.charset = charset;
        }
        if let Some(timeout) = lookup("OPENERP_TIMEOUT_SECS") {
            config.timeout_secs = parse_number("OPENERP_TIMEOUT_SECS", &timeout)?;
        }
        if let Some(user_agent) = lookup("OPENERP_USER_AGENT") {
            config.user_agent = user_agent;
        }
        if let Some(database) = lookup("OPENERP_DB") {
            config.database = database;
        }
        if let Some(username) = lookup("OPENERP_USER") {
            config.username = username;
        }
        if let Some(password) = lookup("OPENERP_PASSWORD") {
            config.password = password;
        }

        Ok(config)
    }

    /// Check the fields the transport depends on.
    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.url)
            .map_err(|e| RpcError::InvalidConfig(format!("invalid url {:?}: {}", self.url, e)))?;
        if self.port == 0 {
            return Err(RpcError::InvalidConfig("port must be non-zero".into()));
        }
        if self.timeout_secs == 0 {
            return Err(RpcError::InvalidConfig("timeout_secs must be non-zero".into()));
        }
        if self.user_agent.is_empty() || HeaderValue::from_str(&self.user_agent).is_err() {
            return Err(RpcError::InvalidConfig(format!(
                "invalid user_agent {:?}",
                self.user_agent
            )));
        }
        check_charset(&self.charset)?;
        validate_root_path(&self.root_path)
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(&self.database, &self.username, &self.password)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| RpcError::InvalidConfig(format!("{}={:?}: {}", key, raw, e)))
}
