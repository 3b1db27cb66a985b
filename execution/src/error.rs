use thiserror::Error;
use tictactoe_types::Address;

/// Failures raised by the game program.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum GameError {
    #[error("deserialization failed")]
    DeserializationFailed,
    #[error("game in progress")]
    GameInProgress,
    #[error("invalid move")]
    InvalidMove,
    #[error("invalid timestamp")]
    InvalidTimestamp,
    #[error("not your turn")]
    NotYourTurn,
    #[error("player not found")]
    PlayerNotFound,
}

/// Reasons a transaction is rejected. A rejected transaction leaves no trace.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("invalid signature")]
    InvalidSignature,
    #[error("transaction references slot {recent} but ledger is at {current}")]
    FutureSlot { recent: u64, current: u64 },
    #[error("transaction expired: slot {recent} is too old (current {current})")]
    Expired { recent: u64, current: u64 },
    #[error("transaction already processed")]
    AlreadyProcessed,
    #[error("insufficient funds: {address} has {balance}, needs {needed}")]
    InsufficientFunds {
        address: Address,
        balance: u64,
        needed: u64,
    },
    #[error("missing required signature for {0}")]
    MissingSignature(Address),
    #[error("not enough accounts for instruction")]
    NotEnoughAccounts,
    #[error("invalid instruction data")]
    InvalidInstructionData,
    #[error("unknown program {0}")]
    UnknownProgram(Address),
    #[error("account {0} already in use")]
    AccountInUse(Address),
    #[error("account {0} not found")]
    AccountNotFound(Address),
    #[error("account {0} is not owned by the program")]
    InvalidOwner(Address),
    #[error("invalid data in account {0}")]
    InvalidAccountData(Address),
    #[error("requested space {0} is too large")]
    SpaceTooLarge(u64),
    #[error(transparent)]
    Game(#[from] GameError),
}
