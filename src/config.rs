//! Configuration for the IMAP account and server limits
//!
//! Loaded from `IMAP_*` environment variables (after `.env` via `dotenvy`);
//! command-line flags override host, port and user.

use std::env;
use std::env::VarError;

use clap::Parser;
use secrecy::SecretString;

use crate::errors::{AppError, AppResult};

/// Command-line overrides
///
/// The password is read from the environment only.
#[derive(Debug, Default, Parser)]
#[command(version, about = "IMAP search MCP server over stdio")]
pub struct Cli {
    /// IMAP server hostname (overrides IMAP_HOST)
    #[arg(long)]
    pub host: Option<String>,
    /// IMAP server port (overrides IMAP_PORT)
    #[arg(long)]
    pub port: Option<u16>,
    /// Login user (overrides IMAP_USER)
    #[arg(long)]
    pub user: Option<String>,
    /// Upgrade a plaintext connection with STARTTLS (same as IMAP_STARTTLS=true)
    #[arg(long)]
    pub use_starttls: bool,
}

/// Server-wide configuration
///
/// Holds the single account this server connects to plus the timeouts and
/// search limits applied to every tool call.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// IMAP server hostname
    pub host: String,
    /// IMAP server port (993 for TLS, 143 for STARTTLS unless set)
    pub port: u16,
    /// Whether to use TLS (currently enforced to `true`)
    pub secure: bool,
    /// Connect in plaintext and upgrade with `STARTTLS` before login
    pub starttls: bool,
    /// Username for authentication
    pub user: String,
    /// Password stored in a type that prevents accidental logging
    pub password: SecretString,
    /// TCP connection timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// IMAP greeting/TLS handshake/login timeout in milliseconds
    pub greeting_timeout_ms: u64,
    /// Per-command socket timeout in milliseconds
    pub socket_timeout_ms: u64,
    /// Records returned by `search` when no limit is given
    pub search_default_limit: usize,
    /// Largest `limit` a caller may request
    pub search_max_limit: usize,
    /// UIDs per header `UID FETCH`
    pub fetch_batch_size: usize,
}

impl ServerConfig {
    /// Load configuration from the environment, then apply `cli` overrides
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if required variables are missing or any value
    /// is malformed or out of range.
    ///
    /// # Example Environment
    ///
    /// ```text
    /// IMAP_HOST=imap.gmail.com
    /// IMAP_USER=user@gmail.com
    /// IMAP_PASSWORD=app-password
    /// IMAP_SEARCH_DEFAULT_LIMIT=25
    /// ```
    pub fn load(cli: Cli) -> AppResult<Self> {
        let host = match cli.host {
            Some(host) => host,
            None => required_env("IMAP_HOST")?,
        };
        let user = match cli.user {
            Some(user) => user,
            None => required_env("IMAP_USER")?,
        };
        let starttls = cli.use_starttls || parse_bool_env("IMAP_STARTTLS", false)?;
        let port = match cli.port {
            Some(port) => port,
            None => parse_u16_env("IMAP_PORT", default_port(starttls))?,
        };
        let password = required_env("IMAP_PASSWORD")?;

        let config = Self {
            host,
            port,
            secure: parse_bool_env("IMAP_SECURE", true)?,
            starttls,
            user,
            password: SecretString::new(password.into()),
            connect_timeout_ms: parse_u64_env("IMAP_CONNECT_TIMEOUT_MS", 30_000)?,
            greeting_timeout_ms: parse_u64_env("IMAP_GREETING_TIMEOUT_MS", 15_000)?,
            socket_timeout_ms: parse_u64_env("IMAP_SOCKET_TIMEOUT_MS", 300_000)?,
            search_default_limit: parse_usize_env("IMAP_SEARCH_DEFAULT_LIMIT", 50)?,
            search_max_limit: parse_usize_env("IMAP_SEARCH_MAX_LIMIT", 500)?,
            fetch_batch_size: parse_usize_env("IMAP_FETCH_BATCH_SIZE", 50)?,
        };
        config.check_limits()?;
        Ok(config)
    }

    /// Search limit for a request, defaulted and range-checked
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if `requested` is outside `1..=search_max_limit`.
    pub fn search_limit(&self, requested: Option<usize>) -> AppResult<usize> {
        match requested {
            None => Ok(self.search_default_limit),
            Some(limit) if (1..=self.search_max_limit).contains(&limit) => Ok(limit),
            Some(_) => Err(AppError::InvalidInput(format!(
                "limit must be in range 1..{}",
                self.search_max_limit
            ))),
        }
    }

    fn check_limits(&self) -> AppResult<()> {
        if self.search_max_limit == 0 || self.fetch_batch_size == 0 {
            return Err(AppError::invalid(
                "IMAP_SEARCH_MAX_LIMIT and IMAP_FETCH_BATCH_SIZE must be positive",
            ));
        }
        if !(1..=self.search_max_limit).contains(&self.search_default_limit) {
            return Err(AppError::InvalidInput(format!(
                "IMAP_SEARCH_DEFAULT_LIMIT must be in range 1..{}",
                self.search_max_limit
            )));
        }
        Ok(())
    }
}

/// IANA port for the chosen TLS mode
fn default_port(starttls: bool) -> u16 {
    if starttls { 143 } else { 993 }
}

/// Read a required environment variable, returning error if missing or empty
fn required_env(key: &str) -> AppResult<String> {
    match env::var(key) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(AppError::InvalidInput(format!(
            "missing required environment variable {key}"
        ))),
    }
}

/// Parse a boolean environment variable with flexible values
///
/// Accepts: `1`, `true`, `yes`, `y`, `on` (truthy) or `0`, `false`, `no`,
/// `n`, `off` (falsy). Case-insensitive. Returns `default` if unset.
///
/// # Errors
///
/// Returns `InvalidInput` if the variable is set to an unrecognized value.
fn parse_bool_env(key: &str, default: bool) -> AppResult<bool> {
    match read_env(key)? {
        Some(v) => parse_bool_value(&v).ok_or_else(|| {
            AppError::InvalidInput(format!("invalid boolean environment variable {key}: '{v}'"))
        }),
        None => Ok(default),
    }
}

fn parse_bool_value(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

fn parse_u16_env(key: &str, default: u16) -> AppResult<u16> {
    parse_number_env(key, default, "u16")
}

fn parse_u64_env(key: &str, default: u64) -> AppResult<u64> {
    parse_number_env(key, default, "u64")
}

fn parse_usize_env(key: &str, default: usize) -> AppResult<usize> {
    parse_number_env(key, default, "usize")
}

/// Parse a numeric environment variable with default fallback
///
/// # Errors
///
/// Returns `InvalidInput` if the variable is set but does not parse.
fn parse_number_env<T: std::str::FromStr>(key: &str, default: T, kind: &str) -> AppResult<T> {
    match read_env(key)? {
        Some(v) => v.trim().parse::<T>().map_err(|_| {
            AppError::InvalidInput(format!("invalid {kind} environment variable {key}: '{v}'"))
        }),
        None => Ok(default),
    }
}

/// `None` when unset; non-unicode values are an error
fn read_env(key: &str) -> AppResult<Option<String>> {
    match env::var(key) {
        Ok(v) => Ok(Some(v)),
        Err(VarError::NotPresent) => Ok(None),
        Err(VarError::NotUnicode(_)) => Err(AppError::InvalidInput(format!(
            "environment variable {key} contains non-unicode data"
        ))),
    }
}
