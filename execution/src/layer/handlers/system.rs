use super::super::*;
use commonware_codec::DecodeExt;
use tictactoe_types::{
    system::{SystemCommand, MAX_ACCOUNT_SPACE},
    Instruction,
};

impl<'a, S: State> Layer<'a, S> {
    pub(in crate::layer) fn handle_system(
        &mut self,
        transaction: &Transaction,
        instruction: &Instruction,
    ) -> Result<(), ExecutionError> {
        let command = SystemCommand::decode(instruction.data.as_slice())
            .map_err(|_| ExecutionError::InvalidInstructionData)?;
        match command {
            SystemCommand::CreateAccount {
                lamports,
                space,
                owner,
            } => self.handle_create_account(transaction, instruction, lamports, space, owner),
            SystemCommand::Transfer { lamports } => {
                self.handle_transfer(transaction, instruction, lamports)
            }
        }
    }

    fn handle_create_account(
        &mut self,
        transaction: &Transaction,
        instruction: &Instruction,
        lamports: u64,
        space: u64,
        owner: Address,
    ) -> Result<(), ExecutionError> {
        let new = instruction
            .accounts
            .first()
            .ok_or(ExecutionError::NotEnoughAccounts)?;
        Self::require_signer(transaction, new)?;
        if self.get(&new.address).is_some() {
            return Err(ExecutionError::AccountInUse(new.address));
        }
        if space > MAX_ACCOUNT_SPACE {
            return Err(ExecutionError::SpaceTooLarge(space));
        }

        let payer = transaction
            .message
            .payer()
            .copied()
            .ok_or(ExecutionError::InvalidSignature)?;
        self.debit(&payer, lamports)?;
        self.insert(
            new.address,
            Account {
                lamports,
                owner,
                data: vec![0; space as usize],
            },
        );
        debug!(address = %new.address, %owner, space, "created account");
        Ok(())
    }

    fn handle_transfer(
        &mut self,
        transaction: &Transaction,
        instruction: &Instruction,
        lamports: u64,
    ) -> Result<(), ExecutionError> {
        let [from, to, ..] = instruction.accounts.as_slice() else {
            return Err(ExecutionError::NotEnoughAccounts);
        };
        Self::require_signer(transaction, from)?;
        self.debit(&from.address, lamports)?;
        self.credit(&to.address, lamports);
        Ok(())
    }
}
