use crate::{events::Stream, ledger::Ledger, Client, Error, Local, Result};
use commonware_cryptography::{
    ed25519::{PrivateKey, Signature},
    sha256::Digest,
};
use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tictactoe_execution::mocks::create_account_keypair;
use tictactoe_simulator::{Api, Simulator};
use tictactoe_types::{
    api::Update,
    game::{DASHBOARD_SPACE, GAME_SPACE},
    program, system, Account, Address, FeeSchedule, Instruction, Transaction,
};
use tokio::time::sleep;

/// Simulator served over HTTP on an ephemeral port.
pub struct TestContext {
    pub simulator: Arc<Simulator>,
    base_url: String,
    server_handle: tokio::task::JoinHandle<()>,
}

impl TestContext {
    pub async fn new() -> Self {
        let simulator = Arc::new(Simulator::default());
        let api = Api::new(simulator.clone());

        // Start server on random port
        let addr = SocketAddr::from(([127, 0, 0, 1], 0));
        let router = api.router();
        let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
        let actual_addr = listener.local_addr().unwrap();
        let base_url = format!("http://{actual_addr}");

        let server_handle = tokio::spawn(async move {
            axum::serve(
                listener,
                router.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .unwrap();
        });

        // Give server time to start
        sleep(Duration::from_millis(100)).await;

        Self {
            simulator,
            base_url,
            server_handle,
        }
    }

    pub fn create_client(&self) -> Client {
        Client::new(&self.base_url).unwrap()
    }
}

impl Drop for TestContext {
    fn drop(&mut self) {
        self.server_handle.abort();
    }
}

#[derive(Default)]
struct Faults {
    airdrops: AtomicUsize,
    submits: AtomicUsize,
    fail_submits: AtomicUsize,
    fail_subscribes: AtomicUsize,
    report_empty: AtomicBool,
    withhold_airdrops: AtomicBool,
}

/// [Local] ledger with counters and failure injection.
#[derive(Clone, Default)]
pub struct FlakyLedger {
    inner: Local,
    faults: Arc<Faults>,
}

impl FlakyLedger {
    pub fn new(inner: Local) -> Self {
        Self {
            inner,
            faults: Arc::default(),
        }
    }

    pub fn simulator(&self) -> &Arc<Simulator> {
        self.inner.simulator()
    }

    /// Number of airdrops requested so far.
    pub fn airdrops(&self) -> usize {
        self.faults.airdrops.load(Ordering::SeqCst)
    }

    /// Number of transactions that reached the ledger.
    pub fn submits(&self) -> usize {
        self.faults.submits.load(Ordering::SeqCst)
    }

    /// Fail the next `count` submissions with a transport error.
    pub fn fail_submits(&self, count: usize) {
        self.faults.fail_submits.store(count, Ordering::SeqCst);
    }

    /// Fail the next `count` subscriptions with a transport error.
    pub fn fail_subscribes(&self, count: usize) {
        self.faults.fail_subscribes.store(count, Ordering::SeqCst);
    }

    /// Report every balance as zero.
    pub fn report_empty(&self, empty: bool) {
        self.faults.report_empty.store(empty, Ordering::SeqCst);
    }

    /// Never confirm airdrops.
    pub fn withhold_airdrops(&self, withhold: bool) {
        self.faults.withhold_airdrops.store(withhold, Ordering::SeqCst);
    }
}

impl Ledger for FlakyLedger {
    async fn read_account(&self, address: &Address) -> Result<Option<Account>> {
        self.inner.read_account(address).await
    }

    async fn subscribe(&self, address: &Address) -> Result<Stream<Update>> {
        if take_one(&self.faults.fail_subscribes) {
            return Err(Error::ConnectionClosed);
        }
        self.inner.subscribe(address).await
    }

    async fn fee_schedule(&self) -> Result<FeeSchedule> {
        self.inner.fee_schedule().await
    }

    async fn submit(&self, transaction: &Transaction) -> Result<Signature> {
        if take_one(&self.faults.fail_submits) {
            return Err(Error::ConnectionClosed);
        }
        self.faults.submits.fetch_add(1, Ordering::SeqCst);
        self.inner.submit(transaction).await
    }

    async fn request_funds(&self, address: &Address, lamports: u64) -> Result<Digest> {
        self.faults.airdrops.fetch_add(1, Ordering::SeqCst);
        self.inner.request_funds(address, lamports).await
    }

    async fn confirm_funds(&self, id: &Digest) -> Result<bool> {
        if self.faults.withhold_airdrops.load(Ordering::SeqCst) {
            return Ok(false);
        }
        self.inner.confirm_funds(id).await
    }

    async fn balance(&self, address: &Address) -> Result<u64> {
        if self.faults.report_empty.load(Ordering::SeqCst) {
            return Ok(0);
        }
        self.inner.balance(address).await
    }
}

fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// Fund a deterministic key with enough lamports for any test.
pub fn funded_key(simulator: &Simulator, seed: u64) -> (PrivateKey, Address) {
    let (key, address) = create_account_keypair(seed);
    simulator.request_funds(address, 1_000_000_000);
    (key, address)
}

fn submit(simulator: &Simulator, instructions: Vec<Instruction>, signers: &[&PrivateKey]) {
    let tx = Transaction::sign(simulator.fee_schedule().slot, instructions, signers);
    simulator.submit(&tx).unwrap();
}

/// Create and initialise a dashboard paid for by `payer`.
pub fn create_dashboard(simulator: &Simulator, payer: &PrivateKey, seed: u64) -> Address {
    let (dashboard, address) = create_account_keypair(seed);
    submit(
        simulator,
        vec![
            system::create_account(address, 0, DASHBOARD_SPACE, program::ID),
            program::init_dashboard(program::ID, address),
        ],
        &[payer, &dashboard],
    );
    address
}

/// Create a game for `player` on `dashboard` paid for by `payer`.
pub fn create_game(
    simulator: &Simulator,
    payer: &PrivateKey,
    dashboard: Address,
    player: &PrivateKey,
    seed: u64,
) -> Address {
    let (game, address) = create_account_keypair(seed);
    submit(
        simulator,
        vec![
            system::create_account(address, 0, GAME_SPACE, program::ID),
            program::init_game(program::ID, address, dashboard, Address::from(player)),
        ],
        &[payer, &game, player],
    );
    address
}
