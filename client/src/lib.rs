//! Matchmaking client for tictactoe.
//!
//! Two players discover each other through a shared dashboard account on the
//! ledger: each side repeatedly advertises a game it created and joins any
//! game the other side advertised, until one game has both players bound.

pub mod client;
pub mod config;
pub mod dashboard;
pub mod events;
pub mod funding;
pub mod game;
pub mod ledger;
pub mod local;
pub mod matchmaker;
pub mod submitter;
pub mod watcher;

pub use client::Client;
pub use client::RetryPolicy;
pub use config::{Commitment, Config, ConfigError, Store};
pub use dashboard::{fetch_dashboard, Dashboard};
pub use events::Stream;
pub use funding::{FundingPool, Watermarks};
pub use game::Game;
pub use ledger::Ledger;
pub use local::Local;
pub use matchmaker::{Matchmaker, Phase};
pub use submitter::{Audit, Submitter};
pub use watcher::Watcher;
use thiserror::Error;
use tictactoe_types::Address;

/// Error type for client operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("reqwest error: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("tungstenite error: {0}")]
    Tungstenite(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("failed: {0}")]
    Failed(reqwest::StatusCode),
    #[error("invalid data: {0}")]
    InvalidData(#[from] commonware_codec::Error),
    #[error("connection closed")]
    ConnectionClosed,
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),
    #[error("dial timeout")]
    DialTimeout,
    #[error("invalid URL scheme: {0} (expected http or https)")]
    InvalidScheme(String),
    #[error("account not found: {0}")]
    AccountNotFound(Address),
    #[error("transaction rejected: {0}")]
    Rejected(String),
    #[error("{title}: {source}")]
    SubmissionFailed {
        title: String,
        #[source]
        source: Box<Error>,
    },
    #[error("joined {game} but could not watch it: {source}")]
    Unwatched {
        game: Address,
        #[source]
        source: Box<Error>,
    },
    #[error("lost contact with {0}")]
    Disconnected(Address),
    #[error("airdrop to {0} was not confirmed")]
    FundingUnconfirmed(Address),
    #[error("cancelled")]
    Cancelled,
    #[error("config error: {0}")]
    Config(#[from] config::ConfigError),
}

impl Error {
    /// The ledger refused the transaction (as opposed to a transport failure).
    pub fn is_rejected(&self) -> bool {
        match self {
            Error::Rejected(_) => true,
            Error::SubmissionFailed { source, .. } => source.is_rejected(),
            _ => false,
        }
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
pub(crate) mod mocks;
