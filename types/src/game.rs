//! Records the game program keeps in account data.
//!
//! Program-owned account data is allocated up front and zero-filled, so every
//! record is prefixed with an [AccountState] tag and a buffer of zeros decodes
//! as [AccountState::Uninitialized].

use crate::execution::Address;
use bytes::{Buf, BufMut};
use commonware_codec::{EncodeSize, Error, FixedSize, Read, ReadExt, ReadRangeExt, Write};

/// Space allocated for a dashboard account.
pub const DASHBOARD_SPACE: u64 = 255;

/// Space allocated for a game account.
pub const GAME_SPACE: u64 = 128;

/// Number of finished games a dashboard remembers.
pub const MAX_COMPLETED_GAMES: usize = 5;

/// Slots a player may go without a keep-alive before the game is abandoned.
pub const KEEP_ALIVE_TIMEOUT: u64 = 100;

pub const BOARD_SIZE: usize = 3;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Cell {
    #[default]
    Empty = 0,
    X = 1,
    O = 2,
}

impl Write for Cell {
    fn write(&self, writer: &mut impl BufMut) {
        (*self as u8).write(writer);
    }
}

impl Read for Cell {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        match u8::read(reader)? {
            0 => Ok(Self::Empty),
            1 => Ok(Self::X),
            2 => Ok(Self::O),
            i => Err(Error::InvalidEnum(i)),
        }
    }
}

impl FixedSize for Cell {
    const SIZE: usize = u8::SIZE;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum GameStatus {
    /// Player X is waiting for an opponent.
    #[default]
    Waiting = 0,
    XMove = 1,
    OMove = 2,
    Complete = 3,
    Abandoned = 4,
}

impl GameStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Complete | Self::Abandoned)
    }
}

impl Write for GameStatus {
    fn write(&self, writer: &mut impl BufMut) {
        (*self as u8).write(writer);
    }
}

impl Read for GameStatus {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        match u8::read(reader)? {
            0 => Ok(Self::Waiting),
            1 => Ok(Self::XMove),
            2 => Ok(Self::OMove),
            3 => Ok(Self::Complete),
            4 => Ok(Self::Abandoned),
            i => Err(Error::InvalidEnum(i)),
        }
    }
}

impl FixedSize for GameStatus {
    const SIZE: usize = u8::SIZE;
}

/// Singleton record of the advertised game and recently finished games.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DashboardState {
    pub pending_game: Option<Address>,
    /// Oldest first.
    pub completed_games: Vec<Address>,
    pub total_games: u64,
}

impl DashboardState {
    /// Fold the latest state of `game` into the dashboard.
    pub fn update(&mut self, game: &Address, state: &GameState) {
        match state.status {
            GameStatus::Waiting => {
                self.pending_game = Some(*game);
            }
            status => {
                if self.pending_game.as_ref() == Some(game) {
                    self.pending_game = None;
                }
                if status.is_finished() && !self.completed_games.contains(game) {
                    if self.completed_games.len() == MAX_COMPLETED_GAMES {
                        self.completed_games.remove(0);
                    }
                    self.completed_games.push(*game);
                }
            }
        }
    }
}

impl Write for DashboardState {
    fn write(&self, writer: &mut impl BufMut) {
        self.pending_game.write(writer);
        self.completed_games.write(writer);
        self.total_games.write(writer);
    }
}

impl Read for DashboardState {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            pending_game: Option::<Address>::read(reader)?,
            completed_games: Vec::<Address>::read_range(reader, 0..=MAX_COMPLETED_GAMES)?,
            total_games: u64::read(reader)?,
        })
    }
}

impl EncodeSize for DashboardState {
    fn encode_size(&self) -> usize {
        self.pending_game.encode_size()
            + self.completed_games.encode_size()
            + self.total_games.encode_size()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GameState {
    pub player_x: Address,
    pub player_o: Option<Address>,
    pub status: GameStatus,
    /// Row-major.
    pub board: [Cell; BOARD_SIZE * BOARD_SIZE],
    /// Last keep-alive slot of player X and player O.
    pub keep_alive: [u64; 2],
}

impl GameState {
    pub fn new(player_x: Address, slot: u64) -> Self {
        Self {
            player_x,
            player_o: None,
            status: GameStatus::Waiting,
            board: [Cell::Empty; BOARD_SIZE * BOARD_SIZE],
            keep_alive: [slot, 0],
        }
    }

    /// Both players are bound.
    pub fn in_progress(&self) -> bool {
        self.player_o.is_some()
    }

    /// Index of `player` into [GameState::keep_alive], if they are in this game.
    pub fn player_index(&self, player: &Address) -> Option<usize> {
        if *player == self.player_x {
            Some(0)
        } else if self.player_o.as_ref() == Some(player) {
            Some(1)
        } else {
            None
        }
    }

    pub fn cell(&self, x: u8, y: u8) -> Option<Cell> {
        let (x, y) = (x as usize, y as usize);
        if x >= BOARD_SIZE || y >= BOARD_SIZE {
            return None;
        }
        Some(self.board[y * BOARD_SIZE + x])
    }

    pub fn board_full(&self) -> bool {
        self.board.iter().all(|cell| *cell != Cell::Empty)
    }
}

impl Write for GameState {
    fn write(&self, writer: &mut impl BufMut) {
        self.player_x.write(writer);
        self.player_o.write(writer);
        self.status.write(writer);
        for cell in &self.board {
            cell.write(writer);
        }
        for slot in &self.keep_alive {
            slot.write(writer);
        }
    }
}

impl Read for GameState {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let player_x = Address::read(reader)?;
        let player_o = Option::<Address>::read(reader)?;
        let status = GameStatus::read(reader)?;
        let mut board = [Cell::Empty; BOARD_SIZE * BOARD_SIZE];
        for cell in board.iter_mut() {
            *cell = Cell::read(reader)?;
        }
        let keep_alive = [u64::read(reader)?, u64::read(reader)?];
        Ok(Self {
            player_x,
            player_o,
            status,
            board,
            keep_alive,
        })
    }
}

impl EncodeSize for GameState {
    fn encode_size(&self) -> usize {
        self.player_x.encode_size()
            + self.player_o.encode_size()
            + self.status.encode_size()
            + self.board.len() * Cell::SIZE
            + self.keep_alive.len() * u64::SIZE
    }
}

/// Tagged contents of a program-owned account.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum AccountState {
    #[default]
    Uninitialized,
    Dashboard(DashboardState),
    Game(GameState),
}

impl AccountState {
    /// Decode account data, ignoring the zero padding after the record.
    pub fn from_data(data: &[u8]) -> Result<Self, Error> {
        let mut reader = data;
        Self::read(&mut reader)
    }

    /// Serialize into an allocated account buffer, zeroing whatever follows.
    pub fn write_into(&self, data: &mut [u8]) -> Result<(), Error> {
        let size = self.encode_size();
        if size > data.len() {
            return Err(Error::Invalid("AccountState", "exceeds account space"));
        }
        let mut buf = Vec::with_capacity(size);
        self.write(&mut buf);
        data[..size].copy_from_slice(&buf);
        data[size..].fill(0);
        Ok(())
    }

    pub fn dashboard(self) -> Option<DashboardState> {
        match self {
            Self::Dashboard(dashboard) => Some(dashboard),
            _ => None,
        }
    }

    pub fn game(self) -> Option<GameState> {
        match self {
            Self::Game(game) => Some(game),
            _ => None,
        }
    }
}

impl Write for AccountState {
    fn write(&self, writer: &mut impl BufMut) {
        match self {
            Self::Uninitialized => 0u8.write(writer),
            Self::Dashboard(dashboard) => {
                1u8.write(writer);
                dashboard.write(writer);
            }
            Self::Game(game) => {
                2u8.write(writer);
                game.write(writer);
            }
        }
    }
}

impl Read for AccountState {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        match u8::read(reader)? {
            0 => Ok(Self::Uninitialized),
            1 => Ok(Self::Dashboard(DashboardState::read(reader)?)),
            2 => Ok(Self::Game(GameState::read(reader)?)),
            i => Err(Error::InvalidEnum(i)),
        }
    }
}

impl EncodeSize for AccountState {
    fn encode_size(&self) -> usize {
        1 + match self {
            Self::Uninitialized => 0,
            Self::Dashboard(dashboard) => dashboard.encode_size(),
            Self::Game(game) => game.encode_size(),
        }
    }
}
