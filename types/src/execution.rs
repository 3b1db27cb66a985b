use bytes::{Buf, BufMut};
use commonware_codec::{
    DecodeExt, EncodeSize, Error, FixedSize, RangeCfg, Read, ReadExt, ReadRangeExt, Write,
};
use commonware_cryptography::{
    ed25519::{self, PrivateKey, PublicKey},
    sha256::{Digest, Sha256},
    Digestible, Hasher, Signer, Verifier,
};
use commonware_utils::{from_hex_formatted, hex, union};
use serde::{Serialize, Serializer};
use std::{fmt, str::FromStr};

pub const NAMESPACE: &[u8] = b"_TICTACTOE";
pub const TRANSACTION_SUFFIX: &[u8] = b"_TX";

pub const ADDRESS_LENGTH: usize = 32;
pub const MAX_ACCOUNT_DATA: usize = 10 * 1024;
pub const MAX_INSTRUCTION_ACCOUNTS: usize = 8;
pub const MAX_INSTRUCTION_DATA: usize = 64;
pub const MAX_TRANSACTION_INSTRUCTIONS: usize = 8;
pub const MAX_TRANSACTION_SIGNERS: usize = 8;

#[inline]
pub fn transaction_namespace(namespace: &[u8]) -> Vec<u8> {
    union(namespace, TRANSACTION_SUFFIX)
}

/// Opaque fixed-width identifier of a ledger account.
///
/// Signer addresses are the raw bytes of an ed25519 public key. Program
/// addresses (like [Address::SYSTEM]) need not be valid keys.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address([u8; ADDRESS_LENGTH]);

impl Address {
    /// The system program.
    pub const SYSTEM: Address = Address([0u8; ADDRESS_LENGTH]);

    pub const fn new(bytes: [u8; ADDRESS_LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LENGTH] {
        &self.0
    }

    /// Interpret this address as an ed25519 public key.
    pub fn public_key(&self) -> Option<PublicKey> {
        PublicKey::decode(self.0.as_ref()).ok()
    }
}

impl From<&PublicKey> for Address {
    fn from(public: &PublicKey) -> Self {
        let mut bytes = [0u8; ADDRESS_LENGTH];
        bytes.copy_from_slice(public.as_ref());
        Self(bytes)
    }
}

impl From<PublicKey> for Address {
    fn from(public: PublicKey) -> Self {
        Self::from(&public)
    }
}

impl From<&PrivateKey> for Address {
    fn from(private: &PrivateKey) -> Self {
        Self::from(&private.public_key())
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex(&self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = from_hex_formatted(s).ok_or(Error::Invalid("Address", "invalid hex"))?;
        let bytes: [u8; ADDRESS_LENGTH] = bytes
            .try_into()
            .map_err(|_| Error::Invalid("Address", "invalid length"))?;
        Ok(Self(bytes))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl Write for Address {
    fn write(&self, writer: &mut impl BufMut) {
        writer.put_slice(&self.0);
    }
}

impl Read for Address {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self(<[u8; ADDRESS_LENGTH]>::read(reader)?))
    }
}

impl FixedSize for Address {
    const SIZE: usize = ADDRESS_LENGTH;
}

/// An addressable slot of bytes on the ledger.
#[derive(Clone, Default, PartialEq, Eq, Debug)]
pub struct Account {
    pub lamports: u64,
    pub owner: Address,
    pub data: Vec<u8>,
}

impl Write for Account {
    fn write(&self, writer: &mut impl BufMut) {
        self.lamports.write(writer);
        self.owner.write(writer);
        self.data.write(writer);
    }
}

impl Read for Account {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            lamports: u64::read(reader)?,
            owner: Address::read(reader)?,
            data: Vec::<u8>::read_range(reader, 0..=MAX_ACCOUNT_DATA)?,
        })
    }
}

impl EncodeSize for Account {
    fn encode_size(&self) -> usize {
        self.lamports.encode_size() + self.owner.encode_size() + self.data.encode_size()
    }
}

/// An account referenced by an [Instruction].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AccountMeta {
    pub address: Address,
    pub signer: bool,
}

impl AccountMeta {
    pub fn signer(address: Address) -> Self {
        Self {
            address,
            signer: true,
        }
    }

    pub fn readonly(address: Address) -> Self {
        Self {
            address,
            signer: false,
        }
    }
}

impl Write for AccountMeta {
    fn write(&self, writer: &mut impl BufMut) {
        self.address.write(writer);
        self.signer.write(writer);
    }
}

impl Read for AccountMeta {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            address: Address::read(reader)?,
            signer: bool::read(reader)?,
        })
    }
}

impl FixedSize for AccountMeta {
    const SIZE: usize = Address::SIZE + bool::SIZE;
}

/// A single program invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Instruction {
    pub program: Address,
    pub accounts: Vec<AccountMeta>,
    pub data: Vec<u8>,
}

impl Write for Instruction {
    fn write(&self, writer: &mut impl BufMut) {
        self.program.write(writer);
        self.accounts.write(writer);
        self.data.write(writer);
    }
}

impl Read for Instruction {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let program = Address::read(reader)?;
        let accounts = Vec::<AccountMeta>::read_cfg(
            reader,
            &(RangeCfg::from(0..=MAX_INSTRUCTION_ACCOUNTS), ()),
        )?;
        let data = Vec::<u8>::read_range(reader, 0..=MAX_INSTRUCTION_DATA)?;
        Ok(Self {
            program,
            accounts,
            data,
        })
    }
}

impl EncodeSize for Instruction {
    fn encode_size(&self) -> usize {
        self.program.encode_size() + self.accounts.encode_size() + self.data.encode_size()
    }
}

/// The signed portion of a [Transaction].
///
/// The first signer pays the fee for every signature.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub recent_slot: u64,
    pub signers: Vec<Address>,
    pub instructions: Vec<Instruction>,
}

impl Message {
    pub fn payer(&self) -> Option<&Address> {
        self.signers.first()
    }
}

impl Write for Message {
    fn write(&self, writer: &mut impl BufMut) {
        self.recent_slot.write(writer);
        self.signers.write(writer);
        self.instructions.write(writer);
    }
}

impl Read for Message {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let recent_slot = u64::read(reader)?;
        let signers = Vec::<Address>::read_cfg(
            reader,
            &(RangeCfg::from(1..=MAX_TRANSACTION_SIGNERS), ()),
        )?;
        let instructions = Vec::<Instruction>::read_cfg(
            reader,
            &(RangeCfg::from(1..=MAX_TRANSACTION_INSTRUCTIONS), ()),
        )?;
        Ok(Self {
            recent_slot,
            signers,
            instructions,
        })
    }
}

impl EncodeSize for Message {
    fn encode_size(&self) -> usize {
        self.recent_slot.encode_size()
            + self.signers.encode_size()
            + self.instructions.encode_size()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    pub message: Message,
    pub signatures: Vec<ed25519::Signature>,
}

impl Transaction {
    fn payload(message: &Message) -> Vec<u8> {
        let mut payload = Vec::with_capacity(message.encode_size());
        message.write(&mut payload);
        payload
    }

    /// Sign `instructions` with every key in `signers`. The first signer pays.
    pub fn sign(recent_slot: u64, instructions: Vec<Instruction>, signers: &[&PrivateKey]) -> Self {
        let mut addresses: Vec<Address> = Vec::with_capacity(signers.len());
        let mut keys: Vec<&PrivateKey> = Vec::with_capacity(signers.len());
        for signer in signers {
            let address = Address::from(*signer);
            if !addresses.contains(&address) {
                addresses.push(address);
                keys.push(*signer);
            }
        }
        let message = Message {
            recent_slot,
            signers: addresses,
            instructions,
        };

        let namespace = transaction_namespace(NAMESPACE);
        let payload = Self::payload(&message);
        let signatures = keys
            .into_iter()
            .map(|key| key.sign(Some(&namespace), &payload))
            .collect();

        Self {
            message,
            signatures,
        }
    }

    pub fn verify(&self) -> bool {
        if self.signatures.len() != self.message.signers.len() {
            return false;
        }
        let namespace = transaction_namespace(NAMESPACE);
        let payload = Self::payload(&self.message);
        self.message
            .signers
            .iter()
            .zip(self.signatures.iter())
            .all(|(address, signature)| match address.public_key() {
                Some(public) => public.verify(Some(&namespace), &payload, signature),
                None => false,
            })
    }

    /// The fee payer's signature, which identifies the transaction.
    pub fn signature(&self) -> Option<&ed25519::Signature> {
        self.signatures.first()
    }

    pub fn is_signer(&self, address: &Address) -> bool {
        self.message.signers.contains(address)
    }
}

impl Write for Transaction {
    fn write(&self, writer: &mut impl BufMut) {
        self.message.write(writer);
        self.signatures.write(writer);
    }
}

impl Read for Transaction {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let message = Message::read(reader)?;
        let signatures = Vec::<ed25519::Signature>::read_cfg(
            reader,
            &(RangeCfg::from(1..=MAX_TRANSACTION_SIGNERS), ()),
        )?;
        Ok(Self {
            message,
            signatures,
        })
    }
}

impl EncodeSize for Transaction {
    fn encode_size(&self) -> usize {
        self.message.encode_size() + self.signatures.encode_size()
    }
}

impl Digestible for Transaction {
    type Digest = Digest;

    fn digest(&self) -> Digest {
        let mut hasher = Sha256::new();
        hasher.update(&Self::payload(&self.message));
        // Signatures are deterministic, so the message alone identifies a
        // transaction for replay purposes.
        hasher.finalize()
    }
}
