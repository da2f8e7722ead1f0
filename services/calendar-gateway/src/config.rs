//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The Google client secret and the session signing secret are loaded from
//! env vars or secret files, never stored in the TOML directly.

use calendar_session::SessionCodec;
use common::{Secret, resolve_secret};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

pub const CLIENT_SECRET_ENV: &str = "GOOGLE_CLIENT_SECRET";
pub const SIGNING_SECRET_ENV: &str = "SESSION_SIGNING_SECRET";

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub google: GoogleConfig,
    #[serde(default)]
    pub session: SessionConfig,
    pub store: StoreConfig,
}

/// HTTP listener settings
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Upper bound on one orchestrator call
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

/// Google OAuth client registration
#[derive(Debug, Deserialize)]
pub struct GoogleConfig {
    pub client_id: String,
    pub redirect_url: String,
    #[serde(default)]
    pub client_secret_file: Option<PathBuf>,
    #[serde(skip)]
    pub client_secret: Option<Secret<String>>,
}

/// Session credential settings
#[derive(Debug, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_validity")]
    pub validity_secs: u64,
    #[serde(default)]
    pub signing_secret_file: Option<PathBuf>,
    #[serde(skip)]
    pub signing_secret: Option<Secret<String>>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            validity_secs: default_validity(),
            signing_secret_file: None,
            signing_secret: None,
        }
    }
}

/// Token store location
#[derive(Debug, Deserialize)]
pub struct StoreConfig {
    pub path: PathBuf,
}

fn default_timeout() -> u64 {
    30
}

fn default_max_connections() -> usize {
    1000
}

fn default_validity() -> u64 {
    24 * 60 * 60
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// Secret resolution order (each):
    /// 1. env var (`GOOGLE_CLIENT_SECRET`, `SESSION_SIGNING_SECRET`)
    /// 2. `*_file` path from config
    ///
    /// Both secrets are required; a signing secret shorter than
    /// `SessionCodec::MIN_SECRET_LEN` bytes is rejected.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if let Some(port) = std::env::var("PORT").ok().filter(|p| !p.is_empty()) {
            let port: u16 = port
                .parse()
                .map_err(|_| common::Error::Config(format!("PORT must be a port number, got: {port}")))?;
            config.server.listen_addr.set_port(port);
        }

        if !config.google.redirect_url.starts_with("http://")
            && !config.google.redirect_url.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "redirect_url must start with http:// or https://, got: {}",
                config.google.redirect_url
            )));
        }

        if config.google.client_id.trim().is_empty() {
            return Err(common::Error::Config("client_id must not be empty".into()));
        }

        if config.server.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        if config.server.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }

        if config.session.validity_secs == 0 {
            return Err(common::Error::Config(
                "validity_secs must be greater than 0".into(),
            ));
        }

        config.google.client_secret =
            resolve_secret(CLIENT_SECRET_ENV, config.google.client_secret_file.as_deref())?;
        if config.google.client_secret.is_none() {
            return Err(common::Error::Config(format!(
                "Google client secret is not set ({CLIENT_SECRET_ENV} or client_secret_file)"
            )));
        }

        let signing_secret = resolve_secret(
            SIGNING_SECRET_ENV,
            config.session.signing_secret_file.as_deref(),
        )?
        .ok_or_else(|| {
            common::Error::Config(format!(
                "session signing secret is not set ({SIGNING_SECRET_ENV} or signing_secret_file)"
            ))
        })?;
        if signing_secret.expose().len() < SessionCodec::MIN_SECRET_LEN {
            return Err(common::Error::Config(format!(
                "session signing secret must be at least {} bytes",
                SessionCodec::MIN_SECRET_LEN
            )));
        }
        config.session.signing_secret = Some(signing_secret);

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("calendar-gateway.toml")
    }
}
