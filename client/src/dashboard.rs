use crate::{
    config::{Commitment, Config, Store},
    game::Game,
    ledger::Ledger,
    matchmaker::Matchmaker,
    submitter::Submitter,
    watcher::Watcher,
    Result,
};
use commonware_cryptography::{ed25519::PrivateKey, PrivateKeyExt};
use rand::rngs::OsRng;
use std::{future::Future, sync::Arc};
use tictactoe_types::{game::DASHBOARD_SPACE, program, system, Address, DashboardState};
use tracing::{info, warn};

/// Connection to the shared dashboard account.
pub struct Dashboard<L: Ledger> {
    submitter: Submitter<L>,
    watcher: Arc<Watcher<DashboardState>>,
}

impl<L: Ledger> Dashboard<L> {
    /// Create and initialise a new dashboard account.
    ///
    /// Returns the dashboard's key so it can be persisted.
    pub async fn create(submitter: &Submitter<L>) -> Result<(Self, PrivateKey)> {
        let key = PrivateKey::from_rng(&mut OsRng);
        let address = Address::from(&key);
        submitter
            .submit(
                "create dashboard",
                vec![
                    system::create_account(address, 0, DASHBOARD_SPACE, program::ID),
                    program::init_dashboard(program::ID, address),
                ],
                &[&key],
            )
            .await?;
        info!(dashboard = %address, "created dashboard");
        let dashboard = Self::connect(submitter, address).await?;
        Ok((dashboard, key))
    }

    /// Attach to an existing dashboard.
    pub async fn connect(submitter: &Submitter<L>, address: Address) -> Result<Self> {
        let watcher = Watcher::watch(submitter.ledger(), address).await?;
        Ok(Self {
            submitter: submitter.clone(),
            watcher: Arc::new(watcher),
        })
    }

    pub fn address(&self) -> Address {
        self.watcher.address()
    }

    pub fn state(&self) -> Arc<DashboardState> {
        self.watcher.current()
    }

    pub fn watcher(&self) -> &Arc<Watcher<DashboardState>> {
        &self.watcher
    }

    pub fn matchmaker(&self, player: PrivateKey) -> Matchmaker<L> {
        Matchmaker::new(self.submitter.clone(), self.watcher.clone(), player)
    }

    /// Find an opponent for `player`, returning once a game is in progress.
    pub async fn start_game(&self, player: &PrivateKey) -> Result<Game<L>> {
        self.start_game_until(player, std::future::pending()).await
    }

    /// Like [Dashboard::start_game], giving up when `shutdown` resolves.
    pub async fn start_game_until(
        &self,
        player: &PrivateKey,
        shutdown: impl Future<Output = ()>,
    ) -> Result<Game<L>> {
        self.matchmaker(player.clone()).run(shutdown).await
    }

    /// Stop watching the dashboard.
    pub fn disconnect(&self) {
        self.watcher.unwatch();
    }
}

/// Connect to the dashboard recorded in `store`, or create one and record it.
pub async fn fetch_dashboard<L: Ledger>(
    store: &Store,
    submitter: &Submitter<L>,
    url: &str,
    commitment: Commitment,
) -> Result<Dashboard<L>> {
    let existing = match store.load().and_then(Config::validate) {
        Ok(config) => Some(config.address),
        Err(err) => {
            warn!(path = %store.path().display(), %err, "no usable dashboard config");
            None
        }
    };
    if let Some(address) = existing {
        match Dashboard::connect(submitter, address).await {
            Ok(dashboard) => {
                info!(dashboard = %address, "connected to saved dashboard");
                return Ok(dashboard);
            }
            Err(err) => warn!(dashboard = %address, %err, "saved dashboard unavailable"),
        }
    }

    let (dashboard, key) = Dashboard::create(submitter).await?;
    store.save(&Config::new(url, commitment, &key))?;
    Ok(dashboard)
}
