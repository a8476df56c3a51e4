use std::path::{Path, PathBuf};

use mailspool_smtp::{Credentials, TransportConfig};
use serde::Deserialize;
use thiserror::Error;

use crate::spooler::DEFAULT_SPOOL_LENGTH;

const fn default_capacity() -> usize {
    DEFAULT_SPOOL_LENGTH
}

const fn default_workers() -> usize {
    1
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unable to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Parse(#[from] ron::error::SpannedError),

    #[error("An SMTP transport needs an endpoint")]
    MissingEndpoint,

    #[error("A queue with capacity 0 needs at least one worker")]
    NoWorkers,
}

/// Spooler configuration.
///
/// ```ron
/// SpoolerConfig (
///     capacity: 32,
///     workers: 2,
///     endpoint: "smtp.example.com:587",
///     credentials: Some((
///         username: "mailer",
///         password: "hunter2",
///     )),
///     transport: Smtp((
///         helo: "mailer.example.com",
///         require_tls: true,
///     )),
/// )
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct SpoolerConfig {
    /// Queue length; 0 hands each message straight to a worker
    ///
    /// Default: 16
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Workers started by the binary
    ///
    /// Default: 1
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Relay address, `host:port`
    #[serde(default)]
    pub endpoint: String,

    #[serde(default)]
    pub credentials: Option<Credentials>,

    #[serde(default)]
    pub transport: TransportConfig,
}

impl Default for SpoolerConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            workers: default_workers(),
            endpoint: String::new(),
            credentials: None,
            transport: TransportConfig::default(),
        }
    }
}

impl SpoolerConfig {
    /// Parse and validate a RON document.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Parse`] for malformed RON, [`ConfigError::MissingEndpoint`]
    /// when an SMTP transport has nowhere to deliver.
    pub fn from_ron(source: &str) -> Result<Self, ConfigError> {
        let config: Self = ron::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate the file at `path`.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Io`] if the file cannot be read, otherwise as
    /// [`from_ron`](Self::from_ron).
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_ron(&source)
    }

    /// # Errors
    ///
    /// [`ConfigError::MissingEndpoint`] when the SMTP transport has no endpoint,
    /// [`ConfigError::NoWorkers`] when a rendezvous queue has nobody to take
    /// from it.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint.is_empty() && matches!(self.transport, TransportConfig::Smtp(_)) {
            return Err(ConfigError::MissingEndpoint);
        }

        if self.capacity == 0 && self.workers == 0 {
            return Err(ConfigError::NoWorkers);
        }

        Ok(())
    }
}
