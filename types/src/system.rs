//! Instructions understood by the system program.

use crate::execution::{AccountMeta, Address, Instruction};
use bytes::{Buf, BufMut};
use commonware_codec::{EncodeSize, Error, Read, ReadExt, Write};

/// Largest allocation a single `CreateAccount` may request.
pub const MAX_ACCOUNT_SPACE: u64 = 10 * 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SystemCommand {
    /// Allocate a zeroed account owned by `owner`, funded by the fee payer.
    ///
    /// Accounts: `[new (signer)]`.
    CreateAccount {
        lamports: u64,
        space: u64,
        owner: Address,
    },
    /// Accounts: `[from (signer), to]`.
    Transfer { lamports: u64 },
}

impl Write for SystemCommand {
    fn write(&self, writer: &mut impl BufMut) {
        match self {
            Self::CreateAccount {
                lamports,
                space,
                owner,
            } => {
                0u8.write(writer);
                lamports.write(writer);
                space.write(writer);
                owner.write(writer);
            }
            Self::Transfer { lamports } => {
                1u8.write(writer);
                lamports.write(writer);
            }
        }
    }
}

impl Read for SystemCommand {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        match u8::read(reader)? {
            0 => Ok(Self::CreateAccount {
                lamports: u64::read(reader)?,
                space: u64::read(reader)?,
                owner: Address::read(reader)?,
            }),
            1 => Ok(Self::Transfer {
                lamports: u64::read(reader)?,
            }),
            i => Err(Error::InvalidEnum(i)),
        }
    }
}

impl EncodeSize for SystemCommand {
    fn encode_size(&self) -> usize {
        1 + match self {
            Self::CreateAccount {
                lamports,
                space,
                owner,
            } => lamports.encode_size() + space.encode_size() + owner.encode_size(),
            Self::Transfer { lamports } => lamports.encode_size(),
        }
    }
}

fn instruction(accounts: Vec<AccountMeta>, command: SystemCommand) -> Instruction {
    let mut data = Vec::with_capacity(command.encode_size());
    command.write(&mut data);
    Instruction {
        program: Address::SYSTEM,
        accounts,
        data,
    }
}

pub fn create_account(new: Address, lamports: u64, space: u64, owner: Address) -> Instruction {
    instruction(
        vec![AccountMeta::signer(new)],
        SystemCommand::CreateAccount {
            lamports,
            space,
            owner,
        },
    )
}

pub fn transfer(from: Address, to: Address, lamports: u64) -> Instruction {
    instruction(
        vec![AccountMeta::signer(from), AccountMeta::readonly(to)],
        SystemCommand::Transfer { lamports },
    )
}
