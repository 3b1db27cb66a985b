use crate::{ledger::Ledger, submitter::Submitter, watcher::Watcher, Error, Result};
use commonware_cryptography::{ed25519::PrivateKey, PrivateKeyExt};
use rand::rngs::OsRng;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tictactoe_types::{game::GAME_SPACE, program, system, Address, GameState};
use tokio::sync::watch;
use tracing::{debug, info};

/// One player's handle on a game account.
pub struct Game<L: Ledger> {
    address: Address,
    dashboard: Address,
    player: PrivateKey,
    submitter: Submitter<L>,
    watcher: Watcher<GameState>,
    abandoned: AtomicBool,
}

impl<L: Ledger> Game<L> {
    /// Allocate a new game account with `player` as X and start watching it.
    pub async fn create(
        submitter: &Submitter<L>,
        dashboard: Address,
        player: &PrivateKey,
    ) -> Result<Self> {
        let game = PrivateKey::from_rng(&mut OsRng);
        let address = Address::from(&game);
        submitter
            .submit(
                "create game",
                vec![
                    system::create_account(address, 0, GAME_SPACE, program::ID),
                    program::init_game(program::ID, address, dashboard, Address::from(player)),
                ],
                &[&game, player],
            )
            .await?;
        info!(game = %address, "created game");
        Self::attach(submitter, dashboard, player, address).await
    }

    /// Join `candidate` as O.
    ///
    /// Returns `None` if the ledger refused the join (someone else got there
    /// first, or the game is our own). If the join lands but the game cannot
    /// be watched, fails with [Error::Unwatched] so the caller can
    /// [Game::attach] later.
    pub async fn join(
        submitter: &Submitter<L>,
        dashboard: Address,
        player: &PrivateKey,
        candidate: Address,
    ) -> Result<Option<Self>> {
        let instruction = program::join(program::ID, Address::from(player), dashboard, candidate);
        match submitter.submit("join game", vec![instruction], &[player]).await {
            Ok(_) => {}
            Err(err) if err.is_rejected() => {
                debug!(game = %candidate, %err, "join rejected");
                return Ok(None);
            }
            Err(err) => return Err(err),
        }
        info!(game = %candidate, "joined game");
        match Self::attach(submitter, dashboard, player, candidate).await {
            Ok(game) => Ok(Some(game)),
            Err(err) => Err(Error::Unwatched {
                game: candidate,
                source: Box::new(err),
            }),
        }
    }

    /// Track a game `player` already takes part in.
    pub async fn attach(
        submitter: &Submitter<L>,
        dashboard: Address,
        player: &PrivateKey,
        address: Address,
    ) -> Result<Self> {
        let watcher = Watcher::watch(submitter.ledger(), address).await?;
        Ok(Self {
            address,
            dashboard,
            player: player.clone(),
            submitter: submitter.clone(),
            watcher,
            abandoned: AtomicBool::new(false),
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Latest known state of the game.
    pub fn state(&self) -> Arc<GameState> {
        self.watcher.current()
    }

    pub fn changes(&self) -> watch::Receiver<Arc<GameState>> {
        self.watcher.changes()
    }

    /// Both players are bound.
    pub fn in_progress(&self) -> bool {
        self.watcher.current().in_progress()
    }

    /// The watcher lost contact with the ledger.
    pub fn disconnected(&self) -> bool {
        self.watcher.disconnected()
    }

    pub fn is_abandoned(&self) -> bool {
        self.abandoned.load(Ordering::SeqCst)
    }

    /// Stop tracking the game. Ledger state is left untouched.
    pub fn abandon(&self) {
        if !self.abandoned.swap(true, Ordering::SeqCst) {
            debug!(game = %self.address, "abandoning game");
        }
        self.watcher.unwatch();
    }

    /// Publish this game as the dashboard's pending game.
    pub async fn advertise(&self) -> Result<()> {
        let instruction = program::advertise(
            program::ID,
            Address::from(&self.player),
            self.dashboard,
            self.address,
        );
        self.submitter
            .submit("advertise game", vec![instruction], &[&self.player])
            .await?;
        Ok(())
    }

    pub async fn keep_alive(&self) -> Result<()> {
        let instruction = program::keep_alive(
            program::ID,
            Address::from(&self.player),
            self.dashboard,
            self.address,
        );
        self.submitter
            .submit("keep alive", vec![instruction], &[&self.player])
            .await?;
        Ok(())
    }

    pub async fn make_move(&self, x: u8, y: u8) -> Result<()> {
        let instruction = program::make_move(
            program::ID,
            Address::from(&self.player),
            self.dashboard,
            self.address,
            x,
            y,
        );
        self.submitter
            .submit("make move", vec![instruction], &[&self.player])
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        mocks::{create_dashboard, funded_key, FlakyLedger},
        Local,
    };
    use std::time::Duration;
    use tictactoe_execution::mocks::create_account_keypair;
    use tictactoe_types::{Cell, GameStatus};
    use tokio::time::timeout;

    fn setup() -> (Submitter<Local>, Address) {
        let ledger = Local::default();
        let (payer, _) = funded_key(ledger.simulator(), 100);
        let dashboard = create_dashboard(ledger.simulator(), &payer, 101);
        (Submitter::new(ledger), dashboard)
    }

    async fn wait_until(game: &Game<Local>, done: impl Fn(&GameState) -> bool) {
        let mut changes = game.changes();
        timeout(Duration::from_secs(5), async {
            while !done(&*game.state()) {
                changes.changed().await.unwrap();
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_create_and_join() {
        let (submitter, dashboard) = setup();
        let (alice, alice_address) = create_account_keypair(1);
        let (bob, bob_address) = create_account_keypair(2);

        let game = Game::create(&submitter, dashboard, &alice).await.unwrap();
        assert_eq!(game.state().player_x, alice_address);
        assert_eq!(game.state().status, GameStatus::Waiting);
        assert!(!game.in_progress());

        // Cannot join your own game
        let own = Game::join(&submitter, dashboard, &alice, game.address())
            .await
            .unwrap();
        assert!(own.is_none());

        let joined = Game::join(&submitter, dashboard, &bob, game.address())
            .await
            .unwrap()
            .unwrap();
        assert!(joined.in_progress());
        assert_eq!(joined.state().player_o, Some(bob_address));

        wait_until(&game, GameState::in_progress).await;
        assert_eq!(game.state().status, GameStatus::XMove);
    }

    #[tokio::test]
    async fn test_concurrent_joins() {
        let (submitter, dashboard) = setup();
        let (alice, _) = create_account_keypair(1);
        let (bob, _) = create_account_keypair(2);
        let (carol, _) = create_account_keypair(3);

        let game = Game::create(&submitter, dashboard, &alice).await.unwrap();
        let (first, second) = tokio::join!(
            Game::join(&submitter, dashboard, &bob, game.address()),
            Game::join(&submitter, dashboard, &carol, game.address()),
        );
        let winners = [first.unwrap(), second.unwrap()]
            .iter()
            .filter(|joined| joined.is_some())
            .count();
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_join_reports_unwatched_game() {
        let ledger = FlakyLedger::default();
        let (payer, _) = funded_key(ledger.simulator(), 100);
        let dashboard = create_dashboard(ledger.simulator(), &payer, 101);
        let submitter = Submitter::new(ledger.clone());
        let (alice, _) = create_account_keypair(1);
        let (bob, bob_address) = create_account_keypair(2);
        let game = Game::create(&submitter, dashboard, &alice).await.unwrap();

        ledger.fail_subscribes(1);
        let Err(err) = Game::join(&submitter, dashboard, &bob, game.address()).await else {
            panic!("join should report the unwatched game");
        };
        assert!(matches!(err, Error::Unwatched { game: address, .. } if address == game.address()));

        let attached = Game::attach(&submitter, dashboard, &bob, game.address())
            .await
            .unwrap();
        assert_eq!(attached.state().player_o, Some(bob_address));
    }

    #[tokio::test]
    async fn test_moves_and_keep_alive() {
        let (submitter, dashboard) = setup();
        let (alice, _) = create_account_keypair(1);
        let (bob, _) = create_account_keypair(2);

        let game = Game::create(&submitter, dashboard, &alice).await.unwrap();
        let joined = Game::join(&submitter, dashboard, &bob, game.address())
            .await
            .unwrap()
            .unwrap();

        // Out of turn
        let err = joined.make_move(0, 0).await.unwrap_err();
        assert!(err.is_rejected());

        game.make_move(1, 1).await.unwrap();
        joined.keep_alive().await.unwrap();
        wait_until(&joined, |state| state.status == GameStatus::OMove).await;
        assert_eq!(joined.state().cell(1, 1), Some(Cell::X));
        assert!(joined.state().keep_alive[1] > 0);

        // Occupied
        let err = joined.make_move(1, 1).await.unwrap_err();
        assert!(err.is_rejected());
    }

    #[tokio::test]
    async fn test_abandon() {
        let (submitter, dashboard) = setup();
        let (alice, _) = create_account_keypair(1);
        let game = Game::create(&submitter, dashboard, &alice).await.unwrap();

        game.abandon();
        game.abandon();
        assert!(game.is_abandoned());
        assert!(!game.disconnected());

        // Still on the ledger and still advertisable
        assert!(submitter.ledger().read_account(&game.address()).await.unwrap().is_some());
        game.advertise().await.unwrap();
    }
}
