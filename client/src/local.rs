use crate::{events::Stream, ledger::Ledger, Error, Result};
use commonware_cryptography::{ed25519::Signature, sha256::Digest};
use std::sync::Arc;
use tictactoe_simulator::Simulator;
use tictactoe_types::{api::Update, Account, Address, FeeSchedule, Transaction};
use tokio::sync::{broadcast, mpsc};
use tracing::warn;

/// In-process [Ledger] backed directly by a [Simulator].
#[derive(Clone)]
pub struct Local {
    simulator: Arc<Simulator>,
}

impl Local {
    pub fn new(simulator: Arc<Simulator>) -> Self {
        Self { simulator }
    }

    pub fn simulator(&self) -> &Arc<Simulator> {
        &self.simulator
    }
}

impl Default for Local {
    fn default() -> Self {
        Self::new(Arc::new(Simulator::default()))
    }
}

impl Ledger for Local {
    async fn read_account(&self, address: &Address) -> Result<Option<Account>> {
        Ok(self.simulator.read_account(address))
    }

    async fn subscribe(&self, address: &Address) -> Result<Stream<Update>> {
        let address = *address;
        let simulator = self.simulator.clone();
        let mut updates = simulator.update_subscriber();
        let (tx, rx) = mpsc::channel(crate::events::DEFAULT_CHANNEL_CAPACITY);

        let handle = tokio::spawn(async move {
            // Updates queued before the current state was read are older than it
            let mut sent = 0;
            if let Some(update) = simulator.account_update(&address) {
                sent = update.slot;
                if tx.send(Ok(update)).await.is_err() {
                    return;
                }
            }
            loop {
                match updates.recv().await {
                    Ok(update) if update.address == address && update.slot >= sent => {
                        if tx.send(Ok(update)).await.is_err() {
                            break; // Receiver dropped
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(%address, skipped, "subscriber lagged, resending latest state");
                        if let Some(update) = simulator.account_update(&address) {
                            sent = update.slot;
                            if tx.send(Ok(update)).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        let _ = tx.send(Err(Error::ConnectionClosed)).await;
                        break;
                    }
                }
            }
        });

        Ok(Stream::from_parts(rx, handle))
    }

    async fn fee_schedule(&self) -> Result<FeeSchedule> {
        Ok(self.simulator.fee_schedule())
    }

    async fn submit(&self, transaction: &Transaction) -> Result<Signature> {
        self.simulator
            .submit(transaction)
            .map_err(|err| Error::Rejected(err.to_string()))
    }

    async fn request_funds(&self, address: &Address, lamports: u64) -> Result<Digest> {
        Ok(self.simulator.request_funds(*address, lamports))
    }

    async fn confirm_funds(&self, id: &Digest) -> Result<bool> {
        Ok(self.simulator.confirm_funds(id))
    }
}
