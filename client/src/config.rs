use commonware_codec::{DecodeExt, Encode};
use commonware_cryptography::ed25519::PrivateKey;
use commonware_utils::{from_hex_formatted, hex};
use serde::{Deserialize, Serialize};
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tictactoe_types::Address;
use tracing::debug;
use url::Url;

/// How settled a transaction must be before the ledger reports it.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Commitment {
    Processed,
    #[default]
    Confirmed,
    Finalized,
}

/// Persisted record used to find the dashboard again after a restart.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    pub url: String,
    #[serde(default)]
    pub commitment: Commitment,
    /// Hex-encoded dashboard private key.
    pub secret_key: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{field} must be hex: {value}")]
    InvalidHex { field: &'static str, value: String },
    #[error("{field} is invalid: {value}")]
    InvalidDecode {
        field: &'static str,
        value: String,
        #[source]
        source: commonware_codec::Error,
    },
    #[error("invalid url {value}: {source}")]
    InvalidUrl {
        value: String,
        #[source]
        source: url::ParseError,
    },
}

pub struct ValidatedConfig {
    pub url: Url,
    pub commitment: Commitment,
    pub dashboard: PrivateKey,
    pub address: Address,
}

fn parse_hex(field: &'static str, value: &str) -> Result<Vec<u8>, ConfigError> {
    from_hex_formatted(value).ok_or(ConfigError::InvalidHex {
        field,
        value: value.to_string(),
    })
}

fn decode_hex<T: DecodeExt<()>>(field: &'static str, value: &str) -> Result<T, ConfigError> {
    let bytes = parse_hex(field, value)?;
    T::decode(bytes.as_ref()).map_err(|source| ConfigError::InvalidDecode {
        field,
        value: value.to_string(),
        source,
    })
}

impl Config {
    pub fn new(url: &str, commitment: Commitment, dashboard: &PrivateKey) -> Self {
        Self {
            url: url.to_string(),
            commitment,
            secret_key: hex(&dashboard.encode()),
        }
    }

    pub fn parse_dashboard(&self) -> Result<PrivateKey, ConfigError> {
        decode_hex("secret_key", &self.secret_key)
    }

    pub fn validate(self) -> Result<ValidatedConfig, ConfigError> {
        let dashboard = self.parse_dashboard()?;
        let url = Url::parse(&self.url).map_err(|source| ConfigError::InvalidUrl {
            value: self.url.clone(),
            source,
        })?;
        Ok(ValidatedConfig {
            url,
            commitment: self.commitment,
            address: Address::from(&dashboard),
            dashboard,
        })
    }
}

/// JSON file holding a [Config].
#[derive(Clone, Debug)]
pub struct Store {
    path: PathBuf,
}

impl Store {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Config, ConfigError> {
        let contents = fs::read_to_string(&self.path).map_err(|source| self.io(source))?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub fn save(&self, config: &Config) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| self.io(source))?;
        }
        let contents = serde_json::to_string_pretty(config)?;
        fs::write(&self.path, contents).map_err(|source| self.io(source))?;
        debug!(path = %self.path.display(), "saved config");
        Ok(())
    }

    fn io(&self, source: io::Error) -> ConfigError {
        ConfigError::Io {
            path: self.path.clone(),
            source,
        }
    }
}
