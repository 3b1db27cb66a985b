//! Common types used throughout tictactoe.
//!
//! Everything that crosses the wire (transactions, accounts, the fixed-width
//! game commands) or lives in account data (dashboard and game records) is
//! defined here together with its codec.

pub mod api;
pub mod command;
pub mod execution;
pub mod game;
pub mod program;
pub mod system;

pub use api::FeeSchedule;
pub use command::{Command, EncodingOverflow, COMMAND_LENGTH};
pub use execution::{
    Account, AccountMeta, Address, Instruction, Message, Transaction, NAMESPACE,
};
pub use game::{AccountState, Cell, DashboardState, GameState, GameStatus};
