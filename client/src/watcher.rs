use crate::{events::Stream, ledger::Ledger, Error, Result};
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc, Mutex,
};
use tictactoe_types::{
    api::Update, program, Account, AccountState, Address, DashboardState, GameState,
};
use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, warn};

type DecodeResult<T> = std::result::Result<T, commonware_codec::Error>;

/// A typed view of a program-owned account.
pub trait Snapshot: Send + Sync + Sized + 'static {
    /// Decode `account`, returning `None` if it does not hold this kind of record.
    fn from_account(account: &Account) -> DecodeResult<Option<Self>>;
}

fn account_state(account: &Account) -> DecodeResult<AccountState> {
    if account.owner != program::ID || account.data.is_empty() {
        return Ok(AccountState::Uninitialized);
    }
    AccountState::from_data(&account.data)
}

impl Snapshot for DashboardState {
    fn from_account(account: &Account) -> DecodeResult<Option<Self>> {
        Ok(account_state(account)?.dashboard())
    }
}

impl Snapshot for GameState {
    fn from_account(account: &Account) -> DecodeResult<Option<Self>> {
        Ok(account_state(account)?.game())
    }
}

type Listener = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Listeners {
    next: AtomicU64,
    entries: Mutex<Vec<(u64, Listener)>>,
}

impl Listeners {
    fn add(&self, listener: Listener) -> u64 {
        let id = self.next.fetch_add(1, Ordering::Relaxed);
        self.lock().push((id, listener));
        id
    }

    fn remove(&self, id: u64) -> bool {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|(existing, _)| *existing != id);
        entries.len() != before
    }

    fn notify(&self) {
        // Call outside the lock so listeners may register or remove others
        let listeners: Vec<Listener> = self.lock().iter().map(|(_, l)| l.clone()).collect();
        for listener in listeners {
            listener();
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(u64, Listener)>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Keeps the latest decoded snapshot of one account.
///
/// Change notifications carry no payload: listeners re-read
/// [Watcher::current], so bursts of updates may coalesce.
pub struct Watcher<S: Snapshot> {
    address: Address,
    snapshot: watch::Receiver<Arc<S>>,
    listeners: Arc<Listeners>,
    disconnected: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl<S: Snapshot> Watcher<S> {
    /// Start watching `address`.
    ///
    /// Fails with [Error::AccountNotFound] if the account does not exist or
    /// has not been initialised as an `S`.
    pub async fn watch<L: Ledger>(ledger: &L, address: Address) -> Result<Self> {
        // Subscribe before reading so no change falls between the two
        let stream = ledger.subscribe(&address).await?;
        let account = ledger
            .read_account(&address)
            .await?
            .ok_or(Error::AccountNotFound(address))?;
        let initial = S::from_account(&account)?.ok_or(Error::AccountNotFound(address))?;
        Ok(Self::from_stream(address, initial, stream))
    }

    pub(crate) fn from_stream(address: Address, initial: S, stream: Stream<Update>) -> Self {
        let (sender, snapshot) = watch::channel(Arc::new(initial));
        let listeners = Arc::new(Listeners::default());
        let disconnected = Arc::new(AtomicBool::new(false));
        let handle = tokio::spawn(Self::run(
            address,
            stream,
            sender,
            listeners.clone(),
            disconnected.clone(),
        ));
        Self {
            address,
            snapshot,
            listeners,
            disconnected,
            handle: Mutex::new(Some(handle)),
        }
    }

    async fn run(
        address: Address,
        mut stream: Stream<Update>,
        sender: watch::Sender<Arc<S>>,
        listeners: Arc<Listeners>,
        disconnected: Arc<AtomicBool>,
    ) {
        while let Some(update) = stream.next().await {
            let update = match update {
                Ok(update) => update,
                Err(err) => {
                    warn!(%address, ?err, "lost account subscription");
                    break;
                }
            };
            match S::from_account(&update.account) {
                Ok(Some(snapshot)) => {
                    debug!(%address, slot = update.slot, "account changed");
                    sender.send_replace(Arc::new(snapshot));
                    listeners.notify();
                }
                Ok(None) => {
                    warn!(%address, slot = update.slot, "account no longer holds expected record");
                }
                Err(err) => {
                    warn!(%address, slot = update.slot, ?err, "failed to deserialize account");
                }
            }
        }
        disconnected.store(true, Ordering::SeqCst);
        listeners.notify();
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// The latest snapshot.
    pub fn current(&self) -> Arc<S> {
        self.snapshot.borrow().clone()
    }

    /// Register `listener` to run after every accepted change (and once on
    /// disconnect). Returns an id for [Watcher::remove_listener].
    pub fn on_change(&self, listener: impl Fn() + Send + Sync + 'static) -> u64 {
        self.listeners.add(Arc::new(listener))
    }

    pub fn remove_listener(&self, id: u64) -> bool {
        self.listeners.remove(id)
    }

    /// A receiver that wakes whenever the snapshot is replaced.
    ///
    /// `changed()` errors once the watcher stops.
    pub fn changes(&self) -> watch::Receiver<Arc<S>> {
        self.snapshot.clone()
    }

    /// Whether the subscription ended on its own.
    pub fn disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }

    /// Stop watching. Calling this more than once is a no-op.
    pub fn unwatch(&self) {
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = handle {
            debug!(address = %self.address, "unwatching account");
            handle.abort();
        }
    }
}

impl<S: Snapshot> Drop for Watcher<S> {
    fn drop(&mut self) {
        self.unwatch();
    }
}
