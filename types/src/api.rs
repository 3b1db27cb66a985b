use crate::execution::{Account, Address};
use bytes::{Buf, BufMut};
use commonware_codec::{EncodeSize, Error, FixedSize, Read, ReadExt, Write};
use serde::Serialize;

/// Default fee charged per transaction signature.
pub const DEFAULT_FEE_PER_SIGNATURE: u64 = 5_000;

/// Number of slots a transaction's `recent_slot` stays valid for.
pub const MAX_SLOT_AGE: u64 = 150;

/// Fees the ledger currently charges and the slot transactions should reference.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct FeeSchedule {
    pub slot: u64,
    pub fee_per_signature: u64,
}

impl Write for FeeSchedule {
    fn write(&self, writer: &mut impl BufMut) {
        self.slot.write(writer);
        self.fee_per_signature.write(writer);
    }
}

impl Read for FeeSchedule {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            slot: u64::read(reader)?,
            fee_per_signature: u64::read(reader)?,
        })
    }
}

impl FixedSize for FeeSchedule {
    const SIZE: usize = u64::SIZE + u64::SIZE;
}

/// Body of an airdrop request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Airdrop {
    pub address: Address,
    pub lamports: u64,
}

impl Write for Airdrop {
    fn write(&self, writer: &mut impl BufMut) {
        self.address.write(writer);
        self.lamports.write(writer);
    }
}

impl Read for Airdrop {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            address: Address::read(reader)?,
            lamports: u64::read(reader)?,
        })
    }
}

impl FixedSize for Airdrop {
    const SIZE: usize = Address::SIZE + u64::SIZE;
}

/// A change to a watched account, streamed to subscribers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Update {
    pub slot: u64,
    pub address: Address,
    pub account: Account,
}

impl Write for Update {
    fn write(&self, writer: &mut impl BufMut) {
        self.slot.write(writer);
        self.address.write(writer);
        self.account.write(writer);
    }
}

impl Read for Update {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            slot: u64::read(reader)?,
            address: Address::read(reader)?,
            account: Account::read(reader)?,
        })
    }
}

impl EncodeSize for Update {
    fn encode_size(&self) -> usize {
        self.slot.encode_size() + self.address.encode_size() + self.account.encode_size()
    }
}
