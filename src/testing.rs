//! In-memory wallet and contract doubles for unit tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Notify;

use crate::contract::{ContractGateway, TxReceipt};
use crate::error::{ChainError, USER_REJECTED_CODE};
use crate::models::proposal::{ProposalId, ProposalRecord};
use crate::wallet::{AccountId, WalletProvider};

pub const ALICE: &str = "0x00000000000000000000000000000000000a11ce";

pub fn alice() -> AccountId {
    ALICE.parse().expect("valid test account")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WalletMode {
    Normal,
    Rejecting,
    Offline,
}

pub struct FakeWallet {
    accounts: Mutex<Vec<String>>,
    chain_id: Mutex<String>,
    mode: Mutex<WalletMode>,
}

impl FakeWallet {
    pub fn with_accounts(accounts: &[&str]) -> Self {
        Self {
            accounts: Mutex::new(accounts.iter().map(|a| a.to_string()).collect()),
            chain_id: Mutex::new("0xaa36a7".to_string()),
            mode: Mutex::new(WalletMode::Normal),
        }
    }

    pub fn set_accounts(&self, accounts: &[&str]) {
        *self.accounts.lock().unwrap() = accounts.iter().map(|a| a.to_string()).collect();
    }

    pub fn reject_requests(&self) {
        *self.mode.lock().unwrap() = WalletMode::Rejecting;
    }

    pub fn go_offline(&self) {
        *self.mode.lock().unwrap() = WalletMode::Offline;
    }

    fn check(&self, prompting: bool) -> Result<(), ChainError> {
        match *self.mode.lock().unwrap() {
            WalletMode::Normal => Ok(()),
            WalletMode::Rejecting if prompting => Err(ChainError::Rpc {
                code: USER_REJECTED_CODE,
                message: "User rejected the request.".to_string(),
            }),
            WalletMode::Rejecting => Ok(()),
            WalletMode::Offline => Err(ChainError::Transport("connection refused".to_string())),
        }
    }
}

impl WalletProvider for FakeWallet {
    async fn request_accounts(&self) -> Result<Vec<String>, ChainError> {
        self.check(true)?;
        Ok(self.accounts.lock().unwrap().clone())
    }

    async fn accounts(&self) -> Result<Vec<String>, ChainError> {
        self.check(false)?;
        Ok(self.accounts.lock().unwrap().clone())
    }

    async fn chain_id(&self) -> Result<String, ChainError> {
        self.check(false)?;
        Ok(self.chain_id.lock().unwrap().clone())
    }
}

#[derive(Default)]
struct FakeChain {
    proposals: Vec<ProposalRecord>,
    votes: HashSet<(ProposalId, AccountId)>,
    failing_reads: HashSet<ProposalId>,
    revert_writes: bool,
    tx_counter: u64,
}

/// Contract double with the same rules the real contract enforces.
#[derive(Default)]
pub struct FakeContract {
    chain: Mutex<FakeChain>,
    write_gate: Mutex<Option<Arc<Notify>>>,
    count_reads: AtomicUsize,
    reads_in_flight: AtomicUsize,
    peak_reads: AtomicUsize,
}

impl FakeContract {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a proposal whose deadline is `ends_in` away from now.
    pub fn push_proposal(&self, title: &str, ends_in: Duration, closed: bool) -> ProposalId {
        let now = Utc::now();
        let mut chain = self.chain.lock().unwrap();
        let id = chain.proposals.len() as ProposalId;
        chain.proposals.push(ProposalRecord {
            id,
            title: title.to_string(),
            description: format!("{title} description"),
            yes_votes: 0,
            no_votes: 0,
            created_at: now - Duration::hours(1),
            end_time: now + ends_in,
            closed,
        });
        id
    }

    pub fn record_vote(&self, id: ProposalId, account: AccountId) {
        self.chain.lock().unwrap().votes.insert((id, account));
    }

    pub fn fail_reads_of(&self, id: ProposalId) {
        self.chain.lock().unwrap().failing_reads.insert(id);
    }

    pub fn heal_reads(&self) {
        self.chain.lock().unwrap().failing_reads.clear();
    }

    pub fn revert_writes(&self, revert: bool) {
        self.chain.lock().unwrap().revert_writes = revert;
    }

    /// Makes every write wait until the returned handle is notified.
    pub fn hold_writes(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.write_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    pub fn proposal(&self, id: ProposalId) -> Option<ProposalRecord> {
        self.chain.lock().unwrap().proposals.get(id as usize).cloned()
    }

    /// Number of full reconciliations started against this contract.
    pub fn count_reads(&self) -> usize {
        self.count_reads.load(Ordering::SeqCst)
    }

    /// Highest number of `get_proposal` calls observed running at once.
    pub fn peak_concurrent_reads(&self) -> usize {
        self.peak_reads.load(Ordering::SeqCst)
    }

    async fn pass_gate(&self) {
        let gate = self.write_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
    }

    fn mine<F>(&self, apply: F) -> Result<TxReceipt, ChainError>
    where
        F: FnOnce(&mut FakeChain) -> Result<(), String>,
    {
        let mut chain = self.chain.lock().unwrap();
        chain.tx_counter += 1;
        let tx_hash = format!("0x{:064x}", chain.tx_counter);
        if chain.revert_writes {
            return Err(ChainError::Reverted { tx_hash });
        }
        apply(&mut chain).map_err(|message| ChainError::Rpc { code: 3, message })?;
        Ok(TxReceipt {
            tx_hash,
            block_number: Some(chain.tx_counter),
        })
    }
}

fn now() -> DateTime<Utc> {
    Utc::now()
}

impl ContractGateway for FakeContract {
    async fn proposal_count(&self) -> Result<u64, ChainError> {
        self.count_reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.chain.lock().unwrap().proposals.len() as u64)
    }

    async fn get_proposal(&self, id: ProposalId) -> Result<ProposalRecord, ChainError> {
        let running = self.reads_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_reads.fetch_max(running, Ordering::SeqCst);
        tokio::task::yield_now().await;
        self.reads_in_flight.fetch_sub(1, Ordering::SeqCst);
        let chain = self.chain.lock().unwrap();
        if chain.failing_reads.contains(&id) {
            return Err(ChainError::Transport(format!("read of proposal {id} failed")));
        }
        chain
            .proposals
            .get(id as usize)
            .cloned()
            .ok_or_else(|| ChainError::Rpc {
                code: 3,
                message: "execution reverted: invalid proposal".to_string(),
            })
    }

    async fn has_voted(&self, id: ProposalId, account: AccountId) -> Result<bool, ChainError> {
        Ok(self.chain.lock().unwrap().votes.contains(&(id, account)))
    }

    async fn create_proposal(
        &self,
        title: &str,
        description: &str,
        duration_secs: u64,
        _from: AccountId,
    ) -> Result<TxReceipt, ChainError> {
        self.pass_gate().await;
        let (title, description) = (title.to_string(), description.to_string());
        self.mine(move |chain| {
            let created_at = now();
            let id = chain.proposals.len() as ProposalId;
            chain.proposals.push(ProposalRecord {
                id,
                title,
                description,
                yes_votes: 0,
                no_votes: 0,
                created_at,
                end_time: created_at + Duration::seconds(duration_secs as i64),
                closed: false,
            });
            Ok(())
        })
    }

    async fn vote(
        &self,
        id: ProposalId,
        support: bool,
        from: AccountId,
    ) -> Result<TxReceipt, ChainError> {
        self.pass_gate().await;
        self.mine(|chain| {
            if chain.votes.contains(&(id, from)) {
                return Err("execution reverted: already voted".to_string());
            }
            let proposal = chain
                .proposals
                .get_mut(id as usize)
                .ok_or("execution reverted: invalid proposal")?;
            if proposal.closed || now() > proposal.end_time {
                return Err("execution reverted: voting ended".to_string());
            }
            if support {
                proposal.yes_votes += 1;
            } else {
                proposal.no_votes += 1;
            }
            chain.votes.insert((id, from));
            Ok(())
        })
    }

    async fn close_proposal(&self, id: ProposalId, _from: AccountId) -> Result<TxReceipt, ChainError> {
        self.pass_gate().await;
        self.mine(|chain| {
            let proposal = chain
                .proposals
                .get_mut(id as usize)
                .ok_or("execution reverted: invalid proposal")?;
            if proposal.closed || now() <= proposal.end_time {
                return Err("execution reverted: cannot close".to_string());
            }
            proposal.closed = true;
            Ok(())
        })
    }
}
