use crate::state::State;
use commonware_cryptography::{ed25519::PrivateKey, PrivateKeyExt};
use rand::{rngs::StdRng, SeedableRng};
use tictactoe_types::{Account, Address};

/// Creates an account keypair for Ed25519 signatures used by users
pub fn create_account_keypair(seed: u64) -> (PrivateKey, Address) {
    let mut rng = StdRng::seed_from_u64(seed);
    let private = PrivateKey::from_rng(&mut rng);
    let address = Address::from(&private);
    (private, address)
}

/// Credits `lamports` to a system-owned account at `address`
pub fn fund<S: State>(state: &mut S, address: &Address, lamports: u64) {
    let mut account = state.get(address).unwrap_or_default();
    account.lamports += lamports;
    state.insert(*address, account);
}

/// Creates a system-owned account holding `lamports`
pub fn create_funded_account<S: State>(
    state: &mut S,
    seed: u64,
    lamports: u64,
) -> (PrivateKey, Address) {
    let (private, address) = create_account_keypair(seed);
    state.insert(
        address,
        Account {
            lamports,
            ..Default::default()
        },
    );
    (private, address)
}
