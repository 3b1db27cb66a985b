use crate::{error::ExecutionError, Layer, State};
use tictactoe_types::{Address, Transaction};

/// Execute a single transaction against `state` at `slot`.
///
/// On success every change is applied and the modified addresses are
/// returned. On failure `state` is untouched.
pub fn execute_transaction<S: State>(
    state: &mut S,
    slot: u64,
    fee_per_signature: u64,
    transaction: &Transaction,
) -> Result<Vec<Address>, ExecutionError> {
    let mut layer = Layer::new(state, slot, fee_per_signature);
    let modified = layer.execute(transaction)?;
    let changes = layer.commit();
    state.apply(changes);
    Ok(modified)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{mocks::create_funded_account, state::balance, Memory};
    use tictactoe_types::system;

    #[test]
    fn test_execute_applies_changes() {
        let mut state = Memory::default();
        let (payer, payer_address) = create_funded_account(&mut state, 1, 100);
        let (_, to) = create_funded_account(&mut state, 2, 0);

        let tx = Transaction::sign(3, vec![system::transfer(payer_address, to, 40)], &[&payer]);
        let modified = execute_transaction(&mut state, 3, 5, &tx).unwrap();
        assert_eq!(modified.len(), 2);
        assert_eq!(balance(&state, &payer_address), 55);
        assert_eq!(balance(&state, &to), 40);

        // Rejected transactions leave state untouched.
        let tx = Transaction::sign(3, vec![system::transfer(payer_address, to, 100)], &[&payer]);
        assert!(execute_transaction(&mut state, 4, 5, &tx).is_err());
        assert_eq!(balance(&state, &payer_address), 55);
    }
}
