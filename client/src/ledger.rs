use crate::{events::Stream, Result};
use commonware_cryptography::{ed25519::Signature, sha256::Digest};
use std::future::Future;
use tictactoe_types::{api::Update, Account, Address, FeeSchedule, Transaction};

/// Everything the client needs from a ledger.
///
/// Implemented over HTTP by [crate::Client] and in-process by [crate::Local].
pub trait Ledger: Clone + Send + Sync + 'static {
    /// Fetch the account at `address`, if it exists.
    fn read_account(
        &self,
        address: &Address,
    ) -> impl Future<Output = Result<Option<Account>>> + Send;

    /// Stream changes to the account at `address`.
    ///
    /// The stream may begin with the account's current state.
    fn subscribe(&self, address: &Address) -> impl Future<Output = Result<Stream<Update>>> + Send;

    fn fee_schedule(&self) -> impl Future<Output = Result<FeeSchedule>> + Send;

    /// Submit `transaction` and wait until it is included or rejected.
    fn submit(&self, transaction: &Transaction) -> impl Future<Output = Result<Signature>> + Send;

    /// Request `lamports` be credited to `address`.
    fn request_funds(
        &self,
        address: &Address,
        lamports: u64,
    ) -> impl Future<Output = Result<Digest>> + Send;

    /// Whether the airdrop identified by `id` has landed.
    fn confirm_funds(&self, id: &Digest) -> impl Future<Output = Result<bool>> + Send;

    fn balance(&self, address: &Address) -> impl Future<Output = Result<u64>> + Send {
        async move {
            Ok(self
                .read_account(address)
                .await?
                .map(|account| account.lamports)
                .unwrap_or_default())
        }
    }
}
