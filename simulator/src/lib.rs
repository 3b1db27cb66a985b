use axum::{
    body::Bytes,
    extract::{ws::WebSocketUpgrade, Path, State as AxumState},
    http::{header, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use commonware_codec::{DecodeExt, Encode};
use commonware_cryptography::{
    ed25519::Signature,
    sha256::{Digest, Sha256},
    Digestible, Hasher,
};
use commonware_utils::from_hex;
use futures::{SinkExt, StreamExt};
use std::{
    collections::HashSet,
    sync::{Arc, RwLock},
};
use tictactoe_execution::{execute_transaction, ExecutionError, Memory, State as _};
use tictactoe_types::{
    api::{Airdrop, Update, DEFAULT_FEE_PER_SIGNATURE},
    Account, Address, FeeSchedule, Transaction,
};
use tokio::sync::broadcast;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::cors::{Any, CorsLayer};

#[derive(Default)]
pub struct State {
    accounts: Memory,
    slot: u64,

    processed: HashSet<Digest>,
    airdrops: HashSet<Digest>,
}

/// In-memory ledger that executes each submitted transaction immediately.
#[derive(Clone)]
pub struct Simulator {
    fee_per_signature: u64,
    state: Arc<RwLock<State>>,
    update_tx: broadcast::Sender<Update>,
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new(DEFAULT_FEE_PER_SIGNATURE)
    }
}

impl Simulator {
    pub fn new(fee_per_signature: u64) -> Self {
        let (update_tx, _) = broadcast::channel(1024);
        let state = Arc::new(RwLock::new(State::default()));

        Self {
            fee_per_signature,
            state,
            update_tx,
        }
    }
}

impl Simulator {
    fn read(&self) -> std::sync::RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(|e| {
            tracing::error!("Recovering poisoned ledger lock");
            e.into_inner()
        })
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(|e| {
            tracing::error!("Recovering poisoned ledger lock");
            e.into_inner()
        })
    }

    fn broadcast(&self, updates: Vec<Update>) {
        for update in updates {
            if let Err(e) = self.update_tx.send(update) {
                tracing::debug!("No subscribers for account update: {}", e);
            }
        }
    }

    pub fn read_account(&self, address: &Address) -> Option<Account> {
        self.read().accounts.get(address)
    }

    /// The account as of the next slot, read under one lock.
    ///
    /// Every update already broadcast for `address` carries a lower slot.
    pub fn account_update(&self, address: &Address) -> Option<Update> {
        let state = self.read();
        state.accounts.get(address).map(|account| Update {
            slot: state.slot,
            address: *address,
            account,
        })
    }

    pub fn fee_schedule(&self) -> FeeSchedule {
        FeeSchedule {
            slot: self.read().slot,
            fee_per_signature: self.fee_per_signature,
        }
    }

    /// Execute `transaction`, returning its identifying signature once included.
    pub fn submit(&self, transaction: &Transaction) -> Result<Signature, ExecutionError> {
        let signature = transaction
            .signature()
            .cloned()
            .ok_or(ExecutionError::InvalidSignature)?;
        let digest = transaction.digest();

        let mut state = self.write();
        if state.processed.contains(&digest) {
            return Err(ExecutionError::AlreadyProcessed);
        }
        let slot = state.slot;
        let modified = execute_transaction(
            &mut state.accounts,
            slot,
            self.fee_per_signature,
            transaction,
        )?;
        state.processed.insert(digest);
        state.slot += 1;
        let updates = modified
            .into_iter()
            .filter_map(|address| {
                state.accounts.get(&address).map(|account| Update {
                    slot,
                    address,
                    account,
                })
            })
            .collect();
        drop(state); // Release lock before broadcasting

        tracing::debug!(?digest, slot, "transaction included");
        self.broadcast(updates);
        Ok(signature)
    }

    /// Credit `lamports` to `address`, returning an id that can be confirmed.
    pub fn request_funds(&self, address: Address, lamports: u64) -> Digest {
        let mut state = self.write();
        let slot = state.slot;
        let mut account = state.accounts.get(&address).unwrap_or_default();
        account.lamports = account.lamports.saturating_add(lamports);
        state.accounts.insert(address, account.clone());
        state.slot += 1;

        let mut hasher = Sha256::new();
        hasher.update(address.as_ref());
        hasher.update(&lamports.to_be_bytes());
        hasher.update(&slot.to_be_bytes());
        let id = hasher.finalize();
        state.airdrops.insert(id);
        drop(state);

        tracing::info!(%address, lamports, "airdrop");
        self.broadcast(vec![Update {
            slot,
            address,
            account,
        }]);
        id
    }

    pub fn confirm_funds(&self, id: &Digest) -> bool {
        self.read().airdrops.contains(id)
    }

    pub fn update_subscriber(&self) -> broadcast::Receiver<Update> {
        self.update_tx.subscribe()
    }
}

pub struct Api {
    simulator: Arc<Simulator>,
}

impl Api {
    pub fn new(simulator: Arc<Simulator>) -> Self {
        Self { simulator }
    }

    pub fn router(&self) -> Router {
        // Configure CORS
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE]);

        // Configure Rate Limiting
        let governor_conf = GovernorConfigBuilder::default()
            .per_nanosecond(1) // effectively unlimited for local sims
            .burst_size(2_000_000)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .map(Arc::new);

        let router = Router::new()
            .route("/submit", post(submit))
            .route("/account/:address", get(query_account))
            .route("/fees", get(query_fees))
            .route("/airdrop", post(airdrop))
            .route("/airdrop/:id", get(query_airdrop))
            .route("/updates/:address", get(updates_ws))
            .layer(cors);
        let router = match governor_conf {
            Some(config) => router.layer(GovernorLayer { config }),
            None => {
                tracing::warn!("Invalid rate limit configuration, serving without a limiter");
                router
            }
        };
        router.with_state(self.simulator.clone())
    }
}

async fn submit(AxumState(simulator): AxumState<Arc<Simulator>>, body: Bytes) -> impl IntoResponse {
    let transaction = match Transaction::decode(&mut body.as_ref()) {
        Ok(transaction) => transaction,
        Err(_) => return (StatusCode::BAD_REQUEST, vec![]).into_response(),
    };

    match simulator.submit(&transaction) {
        Ok(signature) => (StatusCode::OK, signature.encode().to_vec()).into_response(),
        Err(err) => {
            tracing::debug!(?err, "rejected transaction");
            (StatusCode::UNPROCESSABLE_ENTITY, err.to_string()).into_response()
        }
    }
}

fn parse_address(raw: &str) -> Option<Address> {
    raw.parse().ok()
}

async fn query_account(
    AxumState(simulator): AxumState<Arc<Simulator>>,
    Path(address): Path<String>,
) -> impl IntoResponse {
    let Some(address) = parse_address(&address) else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    match simulator.read_account(&address) {
        Some(account) => (StatusCode::OK, account.encode().to_vec()).into_response(),
        None => (StatusCode::NOT_FOUND, vec![]).into_response(),
    }
}

async fn query_fees(AxumState(simulator): AxumState<Arc<Simulator>>) -> impl IntoResponse {
    (StatusCode::OK, simulator.fee_schedule().encode().to_vec())
}

async fn airdrop(
    AxumState(simulator): AxumState<Arc<Simulator>>,
    body: Bytes,
) -> impl IntoResponse {
    let request = match Airdrop::decode(&mut body.as_ref()) {
        Ok(request) => request,
        Err(_) => return (StatusCode::BAD_REQUEST, vec![]).into_response(),
    };
    let id = simulator.request_funds(request.address, request.lamports);
    (StatusCode::OK, id.encode().to_vec()).into_response()
}

async fn query_airdrop(
    AxumState(simulator): AxumState<Arc<Simulator>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let Some(raw) = from_hex(&id) else {
        return StatusCode::BAD_REQUEST;
    };
    let Ok(id) = Digest::decode(&mut raw.as_slice()) else {
        return StatusCode::BAD_REQUEST;
    };
    if simulator.confirm_funds(&id) {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn updates_ws(
    AxumState(simulator): AxumState<Arc<Simulator>>,
    Path(address): Path<String>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let Some(address) = parse_address(&address) else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    ws.on_upgrade(move |socket| handle_updates_ws(socket, simulator, address))
}

async fn handle_updates_ws(
    socket: axum::extract::ws::WebSocket,
    simulator: Arc<Simulator>,
    address: Address,
) {
    tracing::info!(%address, "Updates WebSocket connected");
    let (mut sender, mut receiver) = socket.split();
    let mut updates = simulator.update_subscriber();

    // Send the current account first so nothing between the client's read and
    // this subscription is lost.
    let mut sent = 0;
    if let Some(update) = simulator.account_update(&address) {
        sent = update.slot;
        if sender
            .send(axum::extract::ws::Message::Binary(update.encode().to_vec()))
            .await
            .is_err()
        {
            tracing::warn!("Failed to send initial update, client disconnected");
            return;
        }
    }

    loop {
        tokio::select! {
            // Handle incoming WebSocket messages (ping/pong/close)
            msg = receiver.next() => {
                match msg {
                    Some(Ok(axum::extract::ws::Message::Close(_))) => {
                        tracing::info!("Client closed WebSocket connection");
                        break;
                    }
                    Some(Ok(axum::extract::ws::Message::Ping(data))) => {
                        if sender.send(axum::extract::ws::Message::Pong(data)).await.is_err() {
                            tracing::warn!("Failed to send pong, client disconnected");
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        tracing::warn!("WebSocket error: {:?}", e);
                        break;
                    }
                    None => {
                        tracing::info!("WebSocket stream ended");
                        break;
                    }
                    _ => {} // Ignore other message types
                }
            }
            // Handle broadcast updates
            update_result = updates.recv() => {
                match update_result {
                    Ok(update) => {
                        // Skip updates the initial state already covers
                        if update.address != address || update.slot < sent {
                            continue;
                        }
                        tracing::debug!(
                            %address,
                            slot = update.slot,
                            "Sending update to WebSocket client"
                        );
                        if sender
                            .send(axum::extract::ws::Message::Binary(update.encode().to_vec()))
                            .await
                            .is_err()
                        {
                            tracing::warn!("Failed to send update, client disconnected");
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(
                            "WebSocket client lagged behind, skipped {} messages",
                            skipped
                        );
                        // Resend the latest state so the client converges.
                        if let Some(update) = simulator.account_update(&address) {
                            sent = update.slot;
                            if sender
                                .send(axum::extract::ws::Message::Binary(update.encode().to_vec()))
                                .await
                                .is_err()
                            {
                                break;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::info!("Broadcast channel closed");
                        break;
                    }
                }
            }
        }
    }
    tracing::info!(%address, "Updates WebSocket handler exiting");
    let _ = sender.close().await;
}
