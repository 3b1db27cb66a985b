use super::super::*;
use crate::error::GameError;
use commonware_codec::DecodeExt;
use tictactoe_types::{
    game::KEEP_ALIVE_TIMEOUT, AccountState, Cell, Command, DashboardState, GameState, GameStatus,
    Instruction,
};
use tracing::info;

impl<'a, S: State> Layer<'a, S> {
    pub(in crate::layer) fn handle_game(
        &mut self,
        transaction: &Transaction,
        instruction: &Instruction,
    ) -> Result<(), ExecutionError> {
        let command = Command::decode(instruction.data.as_slice())
            .map_err(|_| ExecutionError::Game(GameError::DeserializationFailed))?;
        let first = instruction
            .accounts
            .first()
            .ok_or(ExecutionError::NotEnoughAccounts)?;
        Self::require_signer(transaction, first)?;

        if command == Command::InitDashboard {
            return self.handle_init_dashboard(instruction.program, &first.address);
        }

        let [_, dashboard, third, ..] = instruction.accounts.as_slice() else {
            return Err(ExecutionError::NotEnoughAccounts);
        };
        let (mut dashboard_account, mut dashboard_state) =
            self.load_dashboard(instruction.program, &dashboard.address)?;

        let (game_address, mut game_account, game_state) = if command == Command::InitGame {
            let (game_address, player) = (first.address, third);
            Self::require_signer(transaction, player)?;
            let game_account = self.load_owned(instruction.program, &game_address)?;
            match AccountState::from_data(&game_account.data) {
                Ok(AccountState::Uninitialized) => {}
                Ok(_) => return Err(ExecutionError::AccountInUse(game_address)),
                Err(_) => return Err(GameError::DeserializationFailed.into()),
            }
            dashboard_state.total_games += 1;
            info!(game = %game_address, player = %player.address, "game created");
            (
                game_address,
                game_account,
                GameState::new(player.address, self.slot),
            )
        } else {
            let (player, game_address) = (first.address, third.address);
            let game_account = self.load_owned(instruction.program, &game_address)?;
            let mut game_state = match AccountState::from_data(&game_account.data) {
                Ok(AccountState::Game(game)) => game,
                Ok(_) => return Err(ExecutionError::InvalidAccountData(game_address)),
                Err(_) => return Err(GameError::DeserializationFailed.into()),
            };
            self.play(command, &player, &mut game_state)?;
            (game_address, game_account, game_state)
        };

        dashboard_state.update(&game_address, &game_state);
        AccountState::Dashboard(dashboard_state)
            .write_into(&mut dashboard_account.data)
            .map_err(|_| ExecutionError::InvalidAccountData(dashboard.address))?;
        AccountState::Game(game_state)
            .write_into(&mut game_account.data)
            .map_err(|_| ExecutionError::InvalidAccountData(game_address))?;
        self.insert(dashboard.address, dashboard_account);
        self.insert(game_address, game_account);
        Ok(())
    }

    fn load_owned(&self, program: Address, address: &Address) -> Result<Account, ExecutionError> {
        let account = self.account(address)?;
        if account.owner != program {
            return Err(ExecutionError::InvalidOwner(*address));
        }
        Ok(account)
    }

    fn load_dashboard(
        &self,
        program: Address,
        address: &Address,
    ) -> Result<(Account, DashboardState), ExecutionError> {
        let account = self.load_owned(program, address)?;
        match AccountState::from_data(&account.data) {
            Ok(AccountState::Dashboard(state)) => Ok((account, state)),
            Ok(_) => Err(ExecutionError::InvalidAccountData(*address)),
            Err(_) => Err(GameError::DeserializationFailed.into()),
        }
    }

    fn handle_init_dashboard(
        &mut self,
        program: Address,
        address: &Address,
    ) -> Result<(), ExecutionError> {
        let mut account = self.load_owned(program, address)?;
        match AccountState::from_data(&account.data) {
            Ok(AccountState::Uninitialized) => {}
            Ok(_) => return Err(ExecutionError::AccountInUse(*address)),
            Err(_) => return Err(GameError::DeserializationFailed.into()),
        }
        AccountState::Dashboard(DashboardState::default())
            .write_into(&mut account.data)
            .map_err(|_| ExecutionError::InvalidAccountData(*address))?;
        self.insert(*address, account);
        info!(dashboard = %address, "dashboard initialized");
        Ok(())
    }

    fn play(
        &self,
        command: Command,
        player: &Address,
        game: &mut GameState,
    ) -> Result<(), GameError> {
        match command {
            // Nothing beyond the dashboard update.
            Command::Advertise => Ok(()),
            Command::Join => join(game, player, self.slot),
            Command::KeepAlive => keep_alive(game, player, self.slot),
            Command::Move { x, y } => next_move(game, player, x, y),
            Command::InitDashboard | Command::InitGame => Err(GameError::InvalidMove),
        }
    }
}

fn join(game: &mut GameState, player: &Address, slot: u64) -> Result<(), GameError> {
    if game.status != GameStatus::Waiting || game.player_o.is_some() {
        return Err(GameError::GameInProgress);
    }
    if *player == game.player_x {
        return Err(GameError::InvalidMove);
    }
    game.player_o = Some(*player);
    game.status = GameStatus::XMove;
    game.keep_alive[1] = slot;
    Ok(())
}

fn keep_alive(game: &mut GameState, player: &Address, slot: u64) -> Result<(), GameError> {
    let index = game.player_index(player).ok_or(GameError::PlayerNotFound)?;
    if game.status.is_finished() {
        return Ok(());
    }
    if slot < game.keep_alive[index] {
        return Err(GameError::InvalidTimestamp);
    }
    game.keep_alive[index] = slot;

    if game.in_progress() {
        let opponent = game.keep_alive[1 - index];
        if slot.saturating_sub(opponent) > KEEP_ALIVE_TIMEOUT {
            game.status = GameStatus::Abandoned;
        }
    }
    Ok(())
}

fn next_move(game: &mut GameState, player: &Address, x: u8, y: u8) -> Result<(), GameError> {
    let index = game.player_index(player).ok_or(GameError::PlayerNotFound)?;
    let mark = match (game.status, index) {
        (GameStatus::XMove, 0) => Cell::X,
        (GameStatus::OMove, 1) => Cell::O,
        (GameStatus::XMove, _) | (GameStatus::OMove, _) => return Err(GameError::NotYourTurn),
        _ => return Err(GameError::InvalidMove),
    };
    match game.cell(x, y) {
        Some(Cell::Empty) => {}
        _ => return Err(GameError::InvalidMove),
    }
    game.board[y as usize * tictactoe_types::game::BOARD_SIZE + x as usize] = mark;
    game.status = if game.board_full() {
        GameStatus::Complete
    } else if mark == Cell::X {
        GameStatus::OMove
    } else {
        GameStatus::XMove
    };
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        mocks::{create_account_keypair, fund},
        state::Memory,
    };
    use commonware_cryptography::ed25519::PrivateKey;
    use tictactoe_types::{
        game::{DASHBOARD_SPACE, GAME_SPACE},
        system,
    };

    const FEE: u64 = 1;

    struct Harness {
        state: Memory,
        slot: u64,
        payer: PrivateKey,
    }

    impl Harness {
        fn new() -> Self {
            let mut state = Memory::default();
            let (payer, payer_address) = create_account_keypair(100);
            fund(&mut state, &payer_address, 1_000_000);
            Self {
                state,
                slot: 0,
                payer,
            }
        }

        fn run(
            &mut self,
            instructions: Vec<Instruction>,
            signers: &[&PrivateKey],
        ) -> Result<(), ExecutionError> {
            let mut keys = vec![&self.payer];
            keys.extend_from_slice(signers);
            let tx = Transaction::sign(self.slot, instructions, &keys);
            let mut layer = Layer::new(&self.state, self.slot, FEE);
            let result = layer.execute(&tx).map(|_| ());
            let changes = layer.commit();
            self.state.apply(changes);
            self.slot += 1;
            result
        }

        fn dashboard(&self, address: &Address) -> DashboardState {
            let account = self.state.get(address).unwrap();
            AccountState::from_data(&account.data)
                .unwrap()
                .dashboard()
                .unwrap()
        }

        fn game(&self, address: &Address) -> GameState {
            let account = self.state.get(address).unwrap();
            AccountState::from_data(&account.data).unwrap().game().unwrap()
        }

        fn create_dashboard(&mut self) -> Address {
            let (key, address) = create_account_keypair(1);
            self.run(
                vec![
                    system::create_account(address, 0, DASHBOARD_SPACE, program::ID),
                    program::init_dashboard(program::ID, address),
                ],
                &[&key],
            )
            .unwrap();
            address
        }

        fn create_game(&mut self, dashboard: Address, seed: u64, player: &PrivateKey) -> Address {
            let (key, address) = create_account_keypair(seed);
            self.run(
                vec![
                    system::create_account(address, 0, GAME_SPACE, program::ID),
                    program::init_game(program::ID, address, dashboard, Address::from(player)),
                ],
                &[&key, player],
            )
            .unwrap();
            address
        }
    }

    #[test]
    fn test_init_dashboard_once() {
        let mut harness = Harness::new();
        let dashboard = harness.create_dashboard();
        assert_eq!(harness.dashboard(&dashboard), DashboardState::default());

        let (key, _) = create_account_keypair(1);
        assert_eq!(
            harness.run(vec![program::init_dashboard(program::ID, dashboard)], &[&key]),
            Err(ExecutionError::AccountInUse(dashboard))
        );
    }

    #[test]
    fn test_init_game_advertises() {
        let mut harness = Harness::new();
        let dashboard = harness.create_dashboard();
        let (x, x_address) = create_account_keypair(10);
        let game = harness.create_game(dashboard, 20, &x);

        let state = harness.game(&game);
        assert_eq!(state.player_x, x_address);
        assert_eq!(state.status, GameStatus::Waiting);
        assert!(!state.in_progress());

        let dashboard_state = harness.dashboard(&dashboard);
        assert_eq!(dashboard_state.pending_game, Some(game));
        assert_eq!(dashboard_state.total_games, 1);
    }

    #[test]
    fn test_join_once() {
        let mut harness = Harness::new();
        let dashboard = harness.create_dashboard();
        let (x, x_address) = create_account_keypair(10);
        let (o, o_address) = create_account_keypair(11);
        let (late, late_address) = create_account_keypair(12);
        let game = harness.create_game(dashboard, 20, &x);

        // Player X cannot join their own game.
        assert_eq!(
            harness.run(vec![program::join(program::ID, x_address, dashboard, game)], &[&x]),
            Err(GameError::InvalidMove.into())
        );

        harness
            .run(vec![program::join(program::ID, o_address, dashboard, game)], &[&o])
            .unwrap();
        let state = harness.game(&game);
        assert_eq!(state.player_o, Some(o_address));
        assert_eq!(state.status, GameStatus::XMove);
        assert!(state.in_progress());
        assert_eq!(harness.dashboard(&dashboard).pending_game, None);

        assert_eq!(
            harness.run(
                vec![program::join(program::ID, late_address, dashboard, game)],
                &[&late]
            ),
            Err(GameError::GameInProgress.into())
        );
    }

    #[test]
    fn test_advertise_sets_pending() {
        let mut harness = Harness::new();
        let dashboard = harness.create_dashboard();
        let (x, x_address) = create_account_keypair(10);
        let (y, _) = create_account_keypair(11);
        let first = harness.create_game(dashboard, 20, &x);
        let second = harness.create_game(dashboard, 21, &y);
        assert_eq!(harness.dashboard(&dashboard).pending_game, Some(second));

        harness
            .run(
                vec![program::advertise(program::ID, x_address, dashboard, first)],
                &[&x],
            )
            .unwrap();
        assert_eq!(harness.dashboard(&dashboard).pending_game, Some(first));
        assert_eq!(harness.dashboard(&dashboard).total_games, 2);
    }

    #[test]
    fn test_moves_until_complete() {
        let mut harness = Harness::new();
        let dashboard = harness.create_dashboard();
        let (x, x_address) = create_account_keypair(10);
        let (o, o_address) = create_account_keypair(11);
        let game = harness.create_game(dashboard, 20, &x);
        harness
            .run(vec![program::join(program::ID, o_address, dashboard, game)], &[&o])
            .unwrap();

        // O cannot move first.
        assert_eq!(
            harness.run(
                vec![program::make_move(program::ID, o_address, dashboard, game, 0, 0)],
                &[&o]
            ),
            Err(GameError::NotYourTurn.into())
        );

        let cells = (0..3u8).flat_map(|y| (0..3u8).map(move |x| (x, y)));
        let mut turn = 0;
        for (cx, cy) in cells {
            let (key, address) = if turn % 2 == 0 {
                (&x, x_address)
            } else {
                (&o, o_address)
            };
            harness
                .run(
                    vec![program::make_move(program::ID, address, dashboard, game, cx, cy)],
                    &[key],
                )
                .unwrap();
            turn += 1;

            // Occupied cells are rejected.
            if turn == 1 {
                assert_eq!(
                    harness.run(
                        vec![program::make_move(program::ID, o_address, dashboard, game, cx, cy)],
                        &[&o]
                    ),
                    Err(GameError::InvalidMove.into())
                );
            }
        }

        assert_eq!(harness.game(&game).status, GameStatus::Complete);
        assert_eq!(harness.dashboard(&dashboard).completed_games, vec![game]);
    }

    #[test]
    fn test_keep_alive_abandons() {
        let mut harness = Harness::new();
        let dashboard = harness.create_dashboard();
        let (x, x_address) = create_account_keypair(10);
        let (o, o_address) = create_account_keypair(11);
        let (stranger, stranger_address) = create_account_keypair(12);
        let game = harness.create_game(dashboard, 20, &x);
        harness
            .run(vec![program::join(program::ID, o_address, dashboard, game)], &[&o])
            .unwrap();

        assert_eq!(
            harness.run(
                vec![program::keep_alive(program::ID, stranger_address, dashboard, game)],
                &[&stranger]
            ),
            Err(GameError::PlayerNotFound.into())
        );

        harness
            .run(
                vec![program::keep_alive(program::ID, x_address, dashboard, game)],
                &[&x],
            )
            .unwrap();
        assert_eq!(harness.game(&game).status, GameStatus::XMove);

        harness.slot += KEEP_ALIVE_TIMEOUT + 5;
        harness
            .run(
                vec![program::keep_alive(program::ID, x_address, dashboard, game)],
                &[&x],
            )
            .unwrap();
        assert_eq!(harness.game(&game).status, GameStatus::Abandoned);
        assert_eq!(harness.dashboard(&dashboard).completed_games, vec![game]);
    }

    #[test]
    fn test_game_requires_program_owner() {
        let mut harness = Harness::new();
        let dashboard = harness.create_dashboard();
        let (x, x_address) = create_account_keypair(10);
        let (key, address) = create_account_keypair(20);
        assert_eq!(
            harness.run(
                vec![
                    system::create_account(address, 0, GAME_SPACE, Address::SYSTEM),
                    program::init_game(program::ID, address, dashboard, x_address),
                ],
                &[&key, &x],
            ),
            Err(ExecutionError::InvalidOwner(address))
        );
    }

    #[test]
    fn test_garbage_command() {
        let mut harness = Harness::new();
        let dashboard = harness.create_dashboard();
        let (key, _) = create_account_keypair(1);
        let mut ix = program::init_dashboard(program::ID, dashboard);
        ix.data = vec![99, 0, 0, 0, 0, 0];
        assert_eq!(
            harness.run(vec![ix], &[&key]),
            Err(GameError::DeserializationFailed.into())
        );
    }
}
