use commonware_cryptography::Digestible;
use std::collections::BTreeMap;
use tictactoe_types::{api::MAX_SLOT_AGE, program, Account, AccountMeta, Address, Transaction};
use tracing::debug;

use crate::{
    error::ExecutionError,
    state::{State, Status},
};

mod handlers;

/// Overlay that stages the effects of transactions on top of `state`.
///
/// Each transaction is applied atomically: if any instruction fails, every
/// change it staged (including the fee) is discarded.
pub struct Layer<'a, S: State> {
    state: &'a S,
    pending: BTreeMap<Address, Status>,

    slot: u64,
    fee_per_signature: u64,
}

impl<'a, S: State> Layer<'a, S> {
    pub fn new(state: &'a S, slot: u64, fee_per_signature: u64) -> Self {
        Self {
            state,
            pending: BTreeMap::new(),

            slot,
            fee_per_signature,
        }
    }

    pub fn slot(&self) -> u64 {
        self.slot
    }

    fn account(&self, address: &Address) -> Result<Account, ExecutionError> {
        self.get(address)
            .ok_or(ExecutionError::AccountNotFound(*address))
    }

    fn debit(&mut self, address: &Address, lamports: u64) -> Result<(), ExecutionError> {
        let mut account = self.get(address).unwrap_or_default();
        account.lamports =
            account
                .lamports
                .checked_sub(lamports)
                .ok_or(ExecutionError::InsufficientFunds {
                    address: *address,
                    balance: account.lamports,
                    needed: lamports,
                })?;
        self.insert(*address, account);
        Ok(())
    }

    fn credit(&mut self, address: &Address, lamports: u64) {
        let mut account = self.get(address).unwrap_or_default();
        account.lamports = account.lamports.saturating_add(lamports);
        self.insert(*address, account);
    }

    /// Require that `meta` was flagged as a signer and actually signed.
    fn require_signer(
        transaction: &Transaction,
        meta: &AccountMeta,
    ) -> Result<(), ExecutionError> {
        if !meta.signer || !transaction.is_signer(&meta.address) {
            return Err(ExecutionError::MissingSignature(meta.address));
        }
        Ok(())
    }

    fn prepare(&mut self, transaction: &Transaction) -> Result<(), ExecutionError> {
        if !transaction.verify() {
            return Err(ExecutionError::InvalidSignature);
        }
        let recent = transaction.message.recent_slot;
        if recent > self.slot {
            return Err(ExecutionError::FutureSlot {
                recent,
                current: self.slot,
            });
        }
        if self.slot - recent > MAX_SLOT_AGE {
            return Err(ExecutionError::Expired {
                recent,
                current: self.slot,
            });
        }

        let payer = transaction
            .message
            .payer()
            .copied()
            .ok_or(ExecutionError::InvalidSignature)?;
        let fee = self
            .fee_per_signature
            .saturating_mul(transaction.message.signers.len() as u64);
        self.debit(&payer, fee)
    }

    fn apply(&mut self, transaction: &Transaction) -> Result<(), ExecutionError> {
        for instruction in &transaction.message.instructions {
            if instruction.program == Address::SYSTEM {
                self.handle_system(transaction, instruction)?;
            } else if instruction.program == program::ID {
                self.handle_game(transaction, instruction)?;
            } else {
                return Err(ExecutionError::UnknownProgram(instruction.program));
            }
        }
        Ok(())
    }

    /// Stage `transaction`, returning the addresses it modified.
    pub fn execute(&mut self, transaction: &Transaction) -> Result<Vec<Address>, ExecutionError> {
        let checkpoint = self.pending.clone();
        let result = self
            .prepare(transaction)
            .and_then(|_| self.apply(transaction));
        if let Err(err) = result {
            debug!(digest = ?transaction.digest(), ?err, "transaction rejected");
            self.pending = checkpoint;
            return Err(err);
        }

        let modified = self
            .pending
            .iter()
            .filter(|(address, status)| checkpoint.get(address) != Some(status))
            .map(|(address, _)| *address)
            .collect();
        Ok(modified)
    }

    pub fn commit(self) -> Vec<(Address, Status)> {
        self.pending.into_iter().collect()
    }
}

impl<'a, S: State> State for Layer<'a, S> {
    fn get(&self, address: &Address) -> Option<Account> {
        match self.pending.get(address) {
            Some(Status::Update(account)) => Some(account.clone()),
            Some(Status::Delete) => None,
            None => self.state.get(address),
        }
    }

    fn insert(&mut self, address: Address, account: Account) {
        self.pending.insert(address, Status::Update(account));
    }

    fn delete(&mut self, address: &Address) {
        self.pending.insert(*address, Status::Delete);
    }
}
