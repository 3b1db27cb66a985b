use std::collections::HashMap;
use tictactoe_types::{Account, Address};

/// Account storage the ledger executes against.
pub trait State {
    fn get(&self, address: &Address) -> Option<Account>;
    fn insert(&mut self, address: Address, account: Account);
    fn delete(&mut self, address: &Address);

    fn apply(&mut self, changes: Vec<(Address, Status)>) {
        for (address, status) in changes {
            match status {
                Status::Update(account) => self.insert(address, account),
                Status::Delete => self.delete(&address),
            }
        }
    }
}

#[derive(Default)]
pub struct Memory {
    state: HashMap<Address, Account>,
}

impl Memory {
    pub fn len(&self) -> usize {
        self.state.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }
}

impl State for Memory {
    fn get(&self, address: &Address) -> Option<Account> {
        self.state.get(address).cloned()
    }

    fn insert(&mut self, address: Address, account: Account) {
        self.state.insert(address, account);
    }

    fn delete(&mut self, address: &Address) {
        self.state.remove(address);
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Status {
    Update(Account),
    Delete,
}

/// Lamports held by `address`, zero if the account does not exist.
pub fn balance<S: State>(state: &S, address: &Address) -> u64 {
    state
        .get(address)
        .map(|account| account.lamports)
        .unwrap_or_default()
}
