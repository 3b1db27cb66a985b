use crate::{game::Game, ledger::Ledger, submitter::Submitter, watcher::Watcher, Error, Result};
use commonware_cryptography::ed25519::PrivateKey;
use std::{future::Future, sync::Arc, time::Duration};
use tictactoe_types::{Address, DashboardState};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

/// Delay between matchmaking iterations.
pub const TICK: Duration = Duration::from_millis(500);

/// Where a [Matchmaker] is in its search for an opponent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    NoLocalSession,
    /// Created a game that the dashboard is not known to show.
    Unadvertised,
    Advertised,
    /// Joined someone else's game.
    Joined,
    /// Terminal: our own game gained an opponent.
    InProgress,
    /// Terminal: lost contact with the ledger.
    Failed,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Joined | Phase::InProgress | Phase::Failed)
    }
}

/// Pairs `player` with an opponent through a shared dashboard.
///
/// Each step prefers joining a foreign game the dashboard advertises over
/// advertising our own.
pub struct Matchmaker<L: Ledger> {
    submitter: Submitter<L>,
    dashboard: Arc<Watcher<DashboardState>>,
    player: PrivateKey,
    local: Option<Game<L>>,
    /// Game we joined on the ledger but could not start watching.
    joined: Option<Address>,
    phase: Phase,
}

impl<L: Ledger> Matchmaker<L> {
    pub fn new(
        submitter: Submitter<L>,
        dashboard: Arc<Watcher<DashboardState>>,
        player: PrivateKey,
    ) -> Self {
        Self {
            submitter,
            dashboard,
            player,
            local: None,
            joined: None,
            phase: Phase::NoLocalSession,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Address of the game we created, if any.
    pub fn local(&self) -> Option<Address> {
        self.local.as_ref().map(Game::address)
    }

    /// Run one iteration. Returns the game once one is in progress.
    ///
    /// Submission failures are logged and retried on the next step. Losing
    /// contact with the ledger is fatal.
    pub async fn step(&mut self) -> Result<Option<Game<L>>> {
        if self.phase.is_terminal() {
            return Err(Error::Cancelled);
        }
        if let Some(game) = self.check_local()? {
            return Ok(Some(game));
        }
        if self.dashboard.disconnected() {
            self.phase = Phase::Failed;
            return Err(Error::Disconnected(self.dashboard.address()));
        }

        let dashboard = self.dashboard.address();
        if let Some(joined) = self.joined {
            return match Game::attach(&self.submitter, dashboard, &self.player, joined).await {
                Ok(game) => {
                    info!(game = %joined, "watching joined game");
                    self.joined = None;
                    self.phase = Phase::Joined;
                    Ok(Some(game))
                }
                Err(err) => {
                    warn!(game = %joined, %err, "failed to watch joined game");
                    Ok(None)
                }
            };
        }

        let local = self.local();
        let pending = self.dashboard.current().pending_game;
        if let Some(candidate) = pending.filter(|candidate| Some(*candidate) != local) {
            match Game::join(&self.submitter, dashboard, &self.player, candidate).await {
                Ok(Some(game)) => {
                    if let Some(local) = self.local.take() {
                        local.abandon();
                    }
                    info!(game = %candidate, "joined advertised game");
                    self.phase = Phase::Joined;
                    return Ok(Some(game));
                }
                Ok(None) => {}
                Err(Error::Unwatched { game, source }) => {
                    warn!(%game, err = %source, "joined game but could not watch it");
                    if let Some(local) = self.local.take() {
                        local.abandon();
                    }
                    self.joined = Some(game);
                    return Ok(None);
                }
                Err(err) => warn!(game = %candidate, %err, "failed to join"),
            }
        }

        if self.local.is_none() {
            match Game::create(&self.submitter, dashboard, &self.player).await {
                Ok(game) => {
                    self.local = Some(game);
                    self.phase = Phase::Unadvertised;
                }
                Err(err) => {
                    warn!(%err, "failed to create game");
                    return Ok(None);
                }
            }
        }

        let Some(game) = self.local.as_ref() else {
            return Ok(None);
        };
        if self.dashboard.current().pending_game == Some(game.address()) {
            self.phase = Phase::Advertised;
            return Ok(None);
        }
        match game.advertise().await {
            Ok(()) => {
                info!(game = %game.address(), "advertised game");
                self.phase = Phase::Advertised;
            }
            Err(err) => warn!(game = %game.address(), %err, "failed to advertise"),
        }
        Ok(None)
    }

    fn check_local(&mut self) -> Result<Option<Game<L>>> {
        let Some(game) = self.local.as_ref() else {
            return Ok(None);
        };
        if game.in_progress() {
            info!(game = %game.address(), "opponent joined");
            self.phase = Phase::InProgress;
            return Ok(self.local.take());
        }
        if game.disconnected() {
            let address = game.address();
            self.phase = Phase::Failed;
            if let Some(game) = self.local.take() {
                game.abandon();
            }
            return Err(Error::Disconnected(address));
        }
        Ok(None)
    }

    /// Step every [TICK] until a game is in progress, a step fails or
    /// `shutdown` resolves.
    pub async fn run(&mut self, shutdown: impl Future<Output = ()>) -> Result<Game<L>> {
        let mut ticker = interval(TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    if let Some(game) = self.local.take() {
                        game.abandon();
                    }
                    return Err(Error::Cancelled);
                }
                _ = ticker.tick() => {
                    if let Some(game) = self.step().await? {
                        return Ok(game);
                    }
                }
            }
        }
    }
}
