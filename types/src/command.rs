//! Fixed-width commands accepted by the game program.
//!
//! Every command is encoded as a little-endian `u32` tag followed by its
//! arguments and zero-padded to [COMMAND_LENGTH] bytes:
//!
//! ```text
//! [tag:u32 LE] [x:u8] [y:u8]   (Move)
//! [tag:u32 LE] [0] [0]         (everything else)
//! ```

use bytes::{Buf, BufMut};
use commonware_codec::{Error, FixedSize, Read, Write};
use thiserror::Error as ThisError;

/// Width of every encoded command.
pub const COMMAND_LENGTH: usize = 6;

/// Width of the operation tag at the start of every command.
pub const TAG_LENGTH: usize = 4;

const INIT_DASHBOARD: u32 = 0;
const ADVERTISE: u32 = 1;
const INIT_GAME: u32 = 2;
const JOIN: u32 = 3;
const KEEP_ALIVE: u32 = 4;
const MOVE: u32 = 5;

/// Returned when a command's natural encoding does not fit in [COMMAND_LENGTH].
#[derive(Clone, Copy, Debug, PartialEq, Eq, ThisError)]
#[error("command buffer too large: {len} > {max}")]
pub struct EncodingOverflow {
    pub len: usize,
    pub max: usize,
}

/// Commands accepted by the game program.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Command {
    /// Initialize a dashboard account.
    InitDashboard,
    /// Update the dashboard with the provided game account.
    Advertise,
    /// Initialize a game account.
    InitGame,
    /// Player O wants to join.
    Join,
    /// Player X/O keep alive.
    KeepAlive,
    /// Player X/O mark board position (x, y).
    Move { x: u8, y: u8 },
}

impl Command {
    pub fn tag(&self) -> u32 {
        match self {
            Self::InitDashboard => INIT_DASHBOARD,
            Self::Advertise => ADVERTISE,
            Self::InitGame => INIT_GAME,
            Self::Join => JOIN,
            Self::KeepAlive => KEEP_ALIVE,
            Self::Move { .. } => MOVE,
        }
    }

    fn natural(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(COMMAND_LENGTH);
        buf.put_u32_le(self.tag());
        if let Self::Move { x, y } = self {
            buf.put_u8(*x);
            buf.put_u8(*y);
        }
        buf
    }

    /// Fixed-width encoding of this command.
    ///
    /// Every variant fits by construction, so an overflow here is a layout bug
    /// and panics.
    pub fn payload(&self) -> [u8; COMMAND_LENGTH] {
        zero_pad(&self.natural()).unwrap_or_else(|err| panic!("invalid command layout: {err}"))
    }
}

/// Copy `natural` into a zeroed [COMMAND_LENGTH] buffer.
pub fn zero_pad(natural: &[u8]) -> Result<[u8; COMMAND_LENGTH], EncodingOverflow> {
    if natural.len() > COMMAND_LENGTH {
        return Err(EncodingOverflow {
            len: natural.len(),
            max: COMMAND_LENGTH,
        });
    }
    let mut buffer = [0u8; COMMAND_LENGTH];
    buffer[..natural.len()].copy_from_slice(natural);
    Ok(buffer)
}

/// Operation tag of an encoded command, if the payload is long enough to hold one.
pub fn tag(payload: &[u8]) -> Option<u32> {
    let bytes: [u8; TAG_LENGTH] = payload.get(..TAG_LENGTH)?.try_into().ok()?;
    Some(u32::from_le_bytes(bytes))
}

impl Write for Command {
    fn write(&self, writer: &mut impl BufMut) {
        writer.put_slice(&self.payload());
    }
}

impl Read for Command {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        if reader.remaining() < COMMAND_LENGTH {
            return Err(Error::EndOfBuffer);
        }
        let mut payload = [0u8; COMMAND_LENGTH];
        reader.copy_to_slice(&mut payload);
        let args = &payload[TAG_LENGTH..];
        let command = match tag(&payload) {
            Some(INIT_DASHBOARD) => Self::InitDashboard,
            Some(ADVERTISE) => Self::Advertise,
            Some(INIT_GAME) => Self::InitGame,
            Some(JOIN) => Self::Join,
            Some(KEEP_ALIVE) => Self::KeepAlive,
            Some(MOVE) => {
                return Ok(Self::Move {
                    x: args[0],
                    y: args[1],
                })
            }
            Some(tag) => return Err(Error::InvalidEnum(tag.min(u8::MAX as u32) as u8)),
            None => return Err(Error::EndOfBuffer),
        };
        if args.iter().any(|b| *b != 0) {
            return Err(Error::Invalid("Command", "non-zero padding"));
        }
        Ok(command)
    }
}

impl FixedSize for Command {
    const SIZE: usize = COMMAND_LENGTH;
}
