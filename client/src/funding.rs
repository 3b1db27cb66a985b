use crate::{ledger::Ledger, Error, Result};
use commonware_cryptography::{ed25519::PrivateKey, PrivateKeyExt};
use rand::rngs::OsRng;
use std::time::Duration;
use tictactoe_types::Address;
use tokio::{sync::Mutex, time::sleep};
use tracing::{info, warn};

/// Fee-per-signature multiples the funding account is kept between.
const HIGH_WATER_FEES: u64 = 100;
const LOW_WATER_FEES: u64 = 10;

/// How many times to check whether the initial airdrop landed.
const CONFIRM_ATTEMPTS: usize = 20;
const CONFIRM_INTERVAL: Duration = Duration::from_millis(100);

/// Balance thresholds for the funding account.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Watermarks {
    pub high: u64,
    pub low: u64,
}

impl Watermarks {
    pub fn new(fee_per_signature: u64) -> Self {
        Self {
            high: HIGH_WATER_FEES.saturating_mul(fee_per_signature),
            low: LOW_WATER_FEES.saturating_mul(fee_per_signature),
        }
    }
}

/// Holds the key that pays fees for every submission.
///
/// Creation and invalidation are serialized, so concurrent submitters share
/// one funding account.
#[derive(Default)]
pub struct FundingPool {
    current: Mutex<Option<PrivateKey>>,
}

impl FundingPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the current funding key, creating and funding one to
    /// `watermarks.high` if there is none.
    pub async fn ensure<L: Ledger>(
        &self,
        ledger: &L,
        watermarks: Watermarks,
    ) -> Result<PrivateKey> {
        let mut current = self.current.lock().await;
        if let Some(key) = current.as_ref() {
            return Ok(key.clone());
        }

        let key = PrivateKey::from_rng(&mut OsRng);
        let address = Address::from(&key);
        info!(%address, lamports = watermarks.high, "creating funding account");
        let id = ledger.request_funds(&address, watermarks.high).await?;
        for _ in 0..CONFIRM_ATTEMPTS {
            if ledger.confirm_funds(&id).await? {
                *current = Some(key.clone());
                return Ok(key);
            }
            sleep(CONFIRM_INTERVAL).await;
        }
        Err(Error::FundingUnconfirmed(address))
    }

    /// Request a top-up to `watermarks.high` if `address` has fallen below
    /// `watermarks.low`. The airdrop is not awaited.
    ///
    /// Returns whether a top-up was requested.
    pub async fn top_up<L: Ledger>(
        &self,
        ledger: &L,
        address: &Address,
        watermarks: Watermarks,
    ) -> Result<bool> {
        let balance = ledger.balance(address).await?;
        if balance >= watermarks.low {
            return Ok(false);
        }
        let lamports = watermarks.high - balance;
        info!(%address, balance, lamports, "topping up funding account");
        ledger.request_funds(address, lamports).await?;
        Ok(true)
    }

    /// Forget the funding account at `address`, if it is still current.
    pub async fn invalidate(&self, address: &Address) {
        let mut current = self.current.lock().await;
        if current.as_ref().map(Address::from).as_ref() == Some(address) {
            warn!(%address, "invalidating funding account");
            *current = None;
        }
    }

    pub async fn current(&self) -> Option<Address> {
        self.current.lock().await.as_ref().map(Address::from)
    }
}
