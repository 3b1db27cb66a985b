use crate::{
    funding::{FundingPool, Watermarks},
    ledger::Ledger,
    Error, Result,
};
use commonware_cryptography::ed25519::{PrivateKey, Signature};
use commonware_utils::hex;
use serde::Serialize;
use std::{
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};
use tictactoe_types::{Address, Instruction, Transaction};
use tracing::{debug, warn};

/// Record of a confirmed submission.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Audit {
    pub title: String,
    /// Milliseconds since the Unix epoch.
    pub time_ms: u64,
    /// First required signer, or the payer when there is none.
    pub from: Address,
    /// Funding account that paid the fees.
    pub payer: Address,
    pub signature: String,
    pub instructions: Vec<AuditInstruction>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AuditInstruction {
    pub keys: Vec<Address>,
    pub program_id: Address,
    pub data: String,
}

impl From<&Instruction> for AuditInstruction {
    fn from(instruction: &Instruction) -> Self {
        Self {
            keys: instruction.accounts.iter().map(|meta| meta.address).collect(),
            program_id: instruction.program,
            data: format!("0x{}", hex(&instruction.data)),
        }
    }
}

type Observer = Arc<dyn Fn(&Audit) + Send + Sync>;

/// Signs, pays for and submits transactions.
///
/// A failed submission invalidates the funding account and is returned as
/// [Error::SubmissionFailed]; nothing is retried here.
#[derive(Clone)]
pub struct Submitter<L: Ledger> {
    ledger: L,
    funding: Arc<FundingPool>,
    observer: Option<Observer>,
}

impl<L: Ledger> Submitter<L> {
    pub fn new(ledger: L) -> Self {
        Self::with_funding(ledger, Arc::new(FundingPool::new()))
    }

    /// Share `funding` with other submitters.
    pub fn with_funding(ledger: L, funding: Arc<FundingPool>) -> Self {
        Self {
            ledger,
            funding,
            observer: None,
        }
    }

    /// Call `observer` after every confirmed submission.
    pub fn with_observer(mut self, observer: impl Fn(&Audit) + Send + Sync + 'static) -> Self {
        self.observer = Some(Arc::new(observer));
        self
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn funding(&self) -> &Arc<FundingPool> {
        &self.funding
    }

    /// Submit `instructions` signed by the funding account and `signers`.
    pub async fn submit(
        &self,
        title: &str,
        instructions: Vec<Instruction>,
        signers: &[&PrivateKey],
    ) -> Result<Signature> {
        let result = self.try_submit(title, instructions, signers).await;
        result.map_err(|err| {
            warn!(title, ?err, "submission failed");
            Error::SubmissionFailed {
                title: title.to_string(),
                source: Box::new(err),
            }
        })
    }

    async fn try_submit(
        &self,
        title: &str,
        instructions: Vec<Instruction>,
        signers: &[&PrivateKey],
    ) -> Result<Signature> {
        let fees = self.ledger.fee_schedule().await?;
        let watermarks = Watermarks::new(fees.fee_per_signature);
        let funding = self.funding.ensure(&self.ledger, watermarks).await?;
        let payer = Address::from(&funding);

        let result = self
            .sign_and_send(&funding, fees.slot, watermarks, &instructions, signers)
            .await;
        match result {
            Ok(signature) => {
                let from = signers.first().map_or(payer, |signer| Address::from(*signer));
                debug!(title, %from, %payer, "submission confirmed");
                if let Some(observer) = &self.observer {
                    observer(&Audit {
                        title: title.to_string(),
                        time_ms: now_ms(),
                        from,
                        payer,
                        signature: hex(signature.as_ref()),
                        instructions: instructions.iter().map(AuditInstruction::from).collect(),
                    });
                }
                Ok(signature)
            }
            Err(err) => {
                self.funding.invalidate(&payer).await;
                Err(err)
            }
        }
    }

    async fn sign_and_send(
        &self,
        funding: &PrivateKey,
        recent_slot: u64,
        watermarks: Watermarks,
        instructions: &[Instruction],
        signers: &[&PrivateKey],
    ) -> Result<Signature> {
        self.funding
            .top_up(&self.ledger, &Address::from(funding), watermarks)
            .await?;

        let mut keys = Vec::with_capacity(signers.len() + 1);
        keys.push(funding);
        keys.extend_from_slice(signers);
        let transaction = Transaction::sign(recent_slot, instructions.to_vec(), &keys);
        self.ledger.submit(&transaction).await
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{create_dashboard, funded_key, FlakyLedger};
    use std::sync::Mutex;
    use tictactoe_execution::mocks::create_account_keypair;
    use tictactoe_types::{
        game::{DASHBOARD_SPACE, GAME_SPACE},
        program, system,
    };

    fn dashboard_instructions(address: Address) -> Vec<Instruction> {
        vec![
            system::create_account(address, 0, DASHBOARD_SPACE, program::ID),
            program::init_dashboard(program::ID, address),
        ]
    }

    #[tokio::test]
    async fn test_submit_pays_from_funding() {
        let ledger = FlakyLedger::default();
        let audits = Arc::new(Mutex::new(Vec::new()));
        let sink = audits.clone();
        let submitter = Submitter::new(ledger.clone())
            .with_observer(move |audit| sink.lock().unwrap().push(audit.clone()));

        let (dashboard, address) = create_account_keypair(1);
        let signature = submitter
            .submit("create dashboard", dashboard_instructions(address), &[&dashboard])
            .await
            .unwrap();

        let payer = submitter.funding().current().await.unwrap();
        let fee = ledger.simulator().fee_schedule().fee_per_signature;
        let high = Watermarks::new(fee).high;
        assert_eq!(ledger.balance(&payer).await.unwrap(), high - 2 * fee);
        assert!(ledger.simulator().read_account(&address).is_some());

        let audits = audits.lock().unwrap();
        assert_eq!(audits.len(), 1);
        let audit = &audits[0];
        assert_eq!(audit.title, "create dashboard");
        assert_eq!(audit.from, address);
        assert_eq!(audit.payer, payer);
        assert_eq!(audit.signature, hex(signature.as_ref()));
        assert_eq!(audit.instructions.len(), 2);
        assert_eq!(audit.instructions[1].program_id, program::ID);
        assert_eq!(audit.instructions[1].keys, vec![address]);
        assert_eq!(audit.instructions[1].data, "0x000000000000");
    }

    #[tokio::test]
    async fn test_low_balance_tops_up_once() {
        let ledger = FlakyLedger::default();
        let submitter = Submitter::new(ledger.clone());
        let (payer, _) = funded_key(ledger.simulator(), 1);

        let (first, first_address) = create_account_keypair(2);
        submitter
            .submit("first", dashboard_instructions(first_address), &[&first])
            .await
            .unwrap();
        assert_eq!(ledger.airdrops(), 1);

        ledger.report_empty(true);
        let second = create_dashboard(ledger.simulator(), &payer, 3);
        let (player, _) = create_account_keypair(4);
        let (game, game_address) = create_account_keypair(5);
        submitter
            .submit(
                "create game",
                vec![
                    system::create_account(game_address, 0, GAME_SPACE, program::ID),
                    program::init_game(program::ID, game_address, second, Address::from(&player)),
                ],
                &[&game, &player],
            )
            .await
            .unwrap();
        assert_eq!(ledger.airdrops(), 2);
    }

    #[tokio::test]
    async fn test_failure_invalidates_funding() {
        let ledger = FlakyLedger::default();
        let submitter = Submitter::new(ledger.clone());

        let (first, first_address) = create_account_keypair(1);
        ledger.fail_submits(1);
        let err = submitter
            .submit("first", dashboard_instructions(first_address), &[&first])
            .await
            .unwrap_err();
        assert!(matches!(&err, Error::SubmissionFailed { title, .. } if title == "first"));
        assert!(!err.is_rejected());
        assert_eq!(submitter.funding().current().await, None);
        assert_eq!(ledger.airdrops(), 1);

        // The next submission funds a new account
        submitter
            .submit("retry", dashboard_instructions(first_address), &[&first])
            .await
            .unwrap();
        assert!(submitter.funding().current().await.is_some());
        assert_eq!(ledger.airdrops(), 2);
    }

    #[tokio::test]
    async fn test_rejection_is_reported() {
        let ledger = FlakyLedger::default();
        let submitter = Submitter::new(ledger.clone());

        // Dashboard key never signs
        let (_, address) = create_account_keypair(1);
        let err = submitter
            .submit("unsigned", dashboard_instructions(address), &[])
            .await
            .unwrap_err();
        assert!(err.is_rejected(), "{err}");
        assert_eq!(ledger.submits(), 1);
        assert_eq!(submitter.funding().current().await, None);
    }
}
