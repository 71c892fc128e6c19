use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::contract::ContractGateway;
use crate::error::FetchError;
use crate::models::proposal::{Proposal, ProposalId};
use crate::wallet::AccountId;

/// Proposal reads allowed in flight at once; each costs up to two provider
/// round-trips.
const MAX_IN_FLIGHT_READS: usize = 32;

/// A complete, internally consistent view of the contract's proposals for
/// one account at one instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposalSnapshot {
    pub proposals: Vec<Proposal>,
    pub account: Option<AccountId>,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Default)]
struct ReconcilerState {
    snapshot: Option<Arc<ProposalSnapshot>>,
    installed_ticket: u64,
    last_error: Option<FetchError>,
}

/// Re-derives the full proposal set from the contract on demand and keeps
/// the last good result for rendering.
pub struct Reconciler<G> {
    gateway: Arc<G>,
    state: RwLock<ReconcilerState>,
    next_ticket: AtomicU64,
}

impl<G: ContractGateway> Reconciler<G> {
    pub fn new(gateway: Arc<G>) -> Self {
        Self {
            gateway,
            state: RwLock::new(ReconcilerState::default()),
            next_ticket: AtomicU64::new(1),
        }
    }

    pub fn gateway(&self) -> &Arc<G> {
        &self.gateway
    }

    pub async fn refresh(
        &self,
        account: Option<AccountId>,
    ) -> Result<Arc<ProposalSnapshot>, FetchError> {
        self.refresh_at(account, Utc::now()).await
    }

    /// Fetches every proposal and, on success, replaces the snapshot whole.
    /// On failure the previous snapshot stays in place and the error is
    /// kept alongside it.
    pub async fn refresh_at(
        &self,
        account: Option<AccountId>,
        now: DateTime<Utc>,
    ) -> Result<Arc<ProposalSnapshot>, FetchError> {
        let ticket = self.next_ticket.fetch_add(1, AtomicOrdering::SeqCst);
        debug!(ticket, account = ?account, "Reconciling proposals");

        match fetch_proposals(&self.gateway, account, now).await {
            Ok(proposals) => {
                let snapshot = Arc::new(ProposalSnapshot {
                    proposals,
                    account,
                    fetched_at: now,
                });
                info!(
                    ticket,
                    proposals = snapshot.proposals.len(),
                    "Proposal snapshot refreshed"
                );
                self.install(ticket, Ok(Arc::clone(&snapshot)));
                Ok(snapshot)
            }
            Err(err) => {
                warn!(ticket, "Proposal fetch failed, keeping previous snapshot: {err}");
                self.install(ticket, Err(err.clone()));
                Err(err)
            }
        }
    }

    pub fn snapshot(&self) -> Option<Arc<ProposalSnapshot>> {
        self.read_state(|state| state.snapshot.clone())
    }

    pub fn last_error(&self) -> Option<FetchError> {
        self.read_state(|state| state.last_error.clone())
    }

    /// Results of overlapping refreshes land in start order; a slower, older
    /// fetch never overwrites a newer one.
    fn install(&self, ticket: u64, outcome: Result<Arc<ProposalSnapshot>, FetchError>) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if ticket < state.installed_ticket {
            debug!(ticket, installed = state.installed_ticket, "Discarding stale fetch result");
            return;
        }
        state.installed_ticket = ticket;
        match outcome {
            Ok(snapshot) => {
                state.snapshot = Some(snapshot);
                state.last_error = None;
            }
            Err(err) => state.last_error = Some(err),
        }
    }

    fn read_state<T>(&self, read: impl FnOnce(&ReconcilerState) -> T) -> T {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        read(&state)
    }
}

async fn fetch_proposals<G: ContractGateway>(
    gateway: &Arc<G>,
    account: Option<AccountId>,
    now: DateTime<Utc>,
) -> Result<Vec<Proposal>, FetchError> {
    let count = gateway.proposal_count().await.map_err(FetchError::Count)?;

    let permits = Arc::new(Semaphore::new(MAX_IN_FLIGHT_READS));
    let mut reads = JoinSet::new();
    for id in 0..count {
        let gateway = Arc::clone(gateway);
        let permits = Arc::clone(&permits);
        reads.spawn(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|err| FetchError::Task(err.to_string()))?;
            read_proposal(gateway.as_ref(), id, account, now).await
        });
    }

    // Dropping `reads` on an early return aborts the reads still in flight.
    let mut proposals = BTreeMap::new();
    while let Some(joined) = reads.join_next().await {
        let proposal = joined.map_err(|err| FetchError::Task(err.to_string()))??;
        proposals.insert(proposal.id, proposal);
    }

    assert_eq!(
        proposals.len() as u64,
        count,
        "Every proposal id must resolve exactly once"
    );
    Ok(proposals.into_values().collect())
}

async fn read_proposal<G: ContractGateway>(
    gateway: &G,
    id: ProposalId,
    account: Option<AccountId>,
    now: DateTime<Utc>,
) -> Result<Proposal, FetchError> {
    let record = async {
        gateway
            .get_proposal(id)
            .await
            .map_err(|source| FetchError::Proposal { id, source })
    };
    let has_voted = async {
        match account {
            Some(account) => gateway
                .has_voted(id, account)
                .await
                .map_err(|source| FetchError::HasVoted { id, source }),
            None => Ok(false),
        }
    };

    let (record, has_voted) = tokio::try_join!(record, has_voted)?;
    if record.id != id {
        return Err(FetchError::Inconsistent {
            requested: id,
            actual: record.id,
        });
    }
    Ok(Proposal::from_record(record, has_voted, now))
}
