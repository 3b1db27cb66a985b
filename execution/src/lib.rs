pub mod state_transition;

#[cfg(any(test, feature = "mocks"))]
pub mod mocks;

mod error;
mod layer;
mod state;

pub use error::{ExecutionError, GameError};
pub use layer::Layer;
pub use state::{balance, Memory, State, Status};
pub use state_transition::execute_transaction;
