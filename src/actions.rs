use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::contract::{ContractGateway, TxReceipt};
use crate::error::ChainError;
use crate::models::proposal::{EffectiveStatus, ProposalId};
use crate::reconciler::Reconciler;
use crate::wallet::AccountId;

/// Per-proposal progress of the most recent vote or close attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "message", rename_all = "snake_case")]
pub enum ActionState {
    #[default]
    Idle,
    Pending,
    Success,
    Error(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ActionKind {
    Vote { support: bool },
    Close,
}

impl ActionKind {
    fn label(&self) -> &'static str {
        match self {
            Self::Vote { .. } => "vote",
            Self::Close => "close_proposal",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionError {
    #[error("connect a wallet first")]
    NotConnected,
    #[error("an action on proposal {0} is already pending")]
    InFlight(ProposalId),
    #[error("proposal {id} is {} and no longer accepts votes", status.as_str())]
    VotingUnavailable {
        id: ProposalId,
        status: EffectiveStatus,
    },
    #[error("this account already voted on proposal {0}")]
    AlreadyVoted(ProposalId),
    #[error("proposal {id} is {} and cannot be closed", status.as_str())]
    NotExpired {
        id: ProposalId,
        status: EffectiveStatus,
    },
    #[error("could not check proposal {id}: {source}")]
    Precheck { id: ProposalId, source: ChainError },
    #[error("transaction failed: {0}")]
    Chain(#[source] ChainError),
}

/// Vote and close submissions with a small state machine per proposal:
/// `Idle -> Pending -> {Success, Error}`. A finished state is cleared back to
/// `Idle` by the next attempt on the same proposal.
pub struct VoteActions<G> {
    reconciler: Arc<Reconciler<G>>,
    states: Mutex<HashMap<ProposalId, ActionState>>,
}

impl<G: ContractGateway> VoteActions<G> {
    pub fn new(reconciler: Arc<Reconciler<G>>) -> Self {
        Self {
            reconciler,
            states: Mutex::new(HashMap::new()),
        }
    }

    pub fn state(&self, id: ProposalId) -> ActionState {
        self.lock_states().get(&id).cloned().unwrap_or_default()
    }

    pub fn states(&self) -> HashMap<ProposalId, ActionState> {
        self.lock_states().clone()
    }

    pub async fn vote(
        &self,
        id: ProposalId,
        support: bool,
        from: Option<AccountId>,
    ) -> Result<TxReceipt, ActionError> {
        self.run(id, ActionKind::Vote { support }, from).await
    }

    pub async fn close_proposal(
        &self,
        id: ProposalId,
        from: Option<AccountId>,
    ) -> Result<TxReceipt, ActionError> {
        self.run(id, ActionKind::Close, from).await
    }

    async fn run(
        &self,
        id: ProposalId,
        kind: ActionKind,
        from: Option<AccountId>,
    ) -> Result<TxReceipt, ActionError> {
        let from = from.ok_or(ActionError::NotConnected)?;
        self.claim(id)?;

        if let Err(err) = self.check_preconditions(id, kind, from).await {
            self.set_state(id, ActionState::Idle);
            return Err(err);
        }

        let gateway = self.reconciler.gateway();
        let outcome = match kind {
            ActionKind::Vote { support } => gateway.vote(id, support, from).await,
            ActionKind::Close => gateway.close_proposal(id, from).await,
        };

        let result = match outcome {
            Ok(receipt) => {
                info!(proposal = id, action = kind.label(), tx_hash = %receipt.tx_hash, "Action confirmed");
                self.set_state(id, ActionState::Success);
                Ok(receipt)
            }
            Err(err) => {
                warn!(proposal = id, action = kind.label(), "Action failed: {err}");
                self.set_state(id, ActionState::Error(err.to_string()));
                Err(ActionError::Chain(err))
            }
        };

        // Even a failed transaction may have changed chain state.
        if let Err(err) = self.reconciler.refresh(Some(from)).await {
            warn!(proposal = id, "Refresh after {} failed: {err}", kind.label());
        }
        result
    }

    /// Moves the proposal to `Pending`, refusing if an action is in flight.
    fn claim(&self, id: ProposalId) -> Result<(), ActionError> {
        let mut states = self.lock_states();
        let state = states.entry(id).or_default();
        if *state == ActionState::Pending {
            return Err(ActionError::InFlight(id));
        }
        *state = ActionState::Pending;
        Ok(())
    }

    /// Re-reads the proposal from the chain; the last snapshot may be stale.
    async fn check_preconditions(
        &self,
        id: ProposalId,
        kind: ActionKind,
        from: AccountId,
    ) -> Result<(), ActionError> {
        let gateway = self.reconciler.gateway();
        let record = gateway
            .get_proposal(id)
            .await
            .map_err(|source| ActionError::Precheck { id, source })?;
        let status = record.status_at(Utc::now());

        match kind {
            ActionKind::Vote { .. } => {
                if status != EffectiveStatus::Open {
                    return Err(ActionError::VotingUnavailable { id, status });
                }
                let voted = gateway
                    .has_voted(id, from)
                    .await
                    .map_err(|source| ActionError::Precheck { id, source })?;
                if voted {
                    return Err(ActionError::AlreadyVoted(id));
                }
            }
            ActionKind::Close => {
                if status != EffectiveStatus::Expired {
                    return Err(ActionError::NotExpired { id, status });
                }
            }
        }
        Ok(())
    }

    fn set_state(&self, id: ProposalId, state: ActionState) {
        self.lock_states().insert(id, state);
    }

    fn lock_states(&self) -> MutexGuard<'_, HashMap<ProposalId, ActionState>> {
        self.states.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::testing::{FakeContract, alice};

    fn actions(contract: &Arc<FakeContract>) -> Arc<VoteActions<FakeContract>> {
        let reconciler = Arc::new(Reconciler::new(Arc::clone(contract)));
        Arc::new(VoteActions::new(reconciler))
    }

    #[tokio::test]
    async fn vote_goes_pending_then_success_and_refreshes() {
        let contract = Arc::new(FakeContract::new());
        contract.push_proposal("Expired", Duration::minutes(-5), false);
        contract.push_proposal("Open", Duration::minutes(30), false);
        let actions = actions(&contract);
        let gate = contract.hold_writes();
        assert_eq!(actions.state(1), ActionState::Idle);

        let running = Arc::clone(&actions);
        let vote = tokio::spawn(async move { running.vote(1, true, Some(alice())).await });
        while actions.state(1) != ActionState::Pending {
            tokio::task::yield_now().await;
        }
        let reads_before = contract.count_reads();
        gate.notify_one();

        let receipt = vote.await.unwrap().expect("vote confirmed");
        assert!(receipt.tx_hash.starts_with("0x"));
        assert_eq!(actions.state(1), ActionState::Success);
        assert_eq!(contract.count_reads(), reads_before + 1);

        let snapshot = actions.reconciler.snapshot().expect("refreshed");
        assert!(snapshot.proposals[1].has_voted);
        assert_eq!(snapshot.proposals[1].yes_votes, 1);
    }

    #[tokio::test]
    async fn pending_proposal_refuses_second_action() {
        let contract = Arc::new(FakeContract::new());
        contract.push_proposal("Open", Duration::minutes(30), false);
        let actions = actions(&contract);
        let gate = contract.hold_writes();

        let running = Arc::clone(&actions);
        let first = tokio::spawn(async move { running.vote(0, true, Some(alice())).await });
        while actions.state(0) != ActionState::Pending {
            tokio::task::yield_now().await;
        }

        assert_eq!(
            actions.vote(0, false, Some(alice())).await,
            Err(ActionError::InFlight(0))
        );
        gate.notify_one();
        first.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn vote_rechecks_chain_before_submitting() {
        let contract = Arc::new(FakeContract::new());
        contract.push_proposal("Expired", Duration::minutes(-5), false);
        contract.push_proposal("Voted", Duration::minutes(30), false);
        contract.record_vote(1, alice());
        let actions = actions(&contract);

        assert_eq!(
            actions.vote(0, true, Some(alice())).await,
            Err(ActionError::VotingUnavailable {
                id: 0,
                status: EffectiveStatus::Expired
            })
        );
        assert_eq!(
            actions.vote(1, true, Some(alice())).await,
            Err(ActionError::AlreadyVoted(1))
        );
        assert_eq!(actions.state(0), ActionState::Idle);
        assert_eq!(actions.state(1), ActionState::Idle);
        assert_eq!(contract.count_reads(), 0);
    }

    #[tokio::test]
    async fn reverted_vote_records_error_and_still_refreshes() {
        let contract = Arc::new(FakeContract::new());
        contract.push_proposal("Open", Duration::minutes(30), false);
        contract.revert_writes(true);
        let actions = actions(&contract);

        let err = actions.vote(0, false, Some(alice())).await.unwrap_err();
        assert!(matches!(err, ActionError::Chain(ChainError::Reverted { .. })));
        assert!(matches!(actions.state(0), ActionState::Error(_)));
        assert_eq!(contract.count_reads(), 1);

        // The next attempt starts over from the error state.
        contract.revert_writes(false);
        actions.vote(0, false, Some(alice())).await.unwrap();
        assert_eq!(actions.state(0), ActionState::Success);
        assert_eq!(contract.proposal(0).unwrap().no_votes, 1);
    }

    #[tokio::test]
    async fn close_requires_expired_proposal() {
        let contract = Arc::new(FakeContract::new());
        contract.push_proposal("Open", Duration::minutes(30), false);
        contract.push_proposal("Expired", Duration::minutes(-1), false);
        contract.push_proposal("Closed", Duration::minutes(-1), true);
        let actions = actions(&contract);

        assert!(matches!(
            actions.close_proposal(0, Some(alice())).await,
            Err(ActionError::NotExpired {
                status: EffectiveStatus::Open,
                ..
            })
        ));
        assert!(matches!(
            actions.close_proposal(2, Some(alice())).await,
            Err(ActionError::NotExpired {
                status: EffectiveStatus::Closed,
                ..
            })
        ));

        actions.close_proposal(1, Some(alice())).await.unwrap();
        assert!(contract.proposal(1).unwrap().closed);
        let snapshot = actions.reconciler.snapshot().unwrap();
        assert_eq!(snapshot.proposals[1].status, EffectiveStatus::Closed);
    }

    #[tokio::test]
    async fn actions_require_connected_wallet() {
        let contract = Arc::new(FakeContract::new());
        contract.push_proposal("Open", Duration::minutes(30), false);
        let actions = actions(&contract);
        assert_eq!(
            actions.vote(0, true, None).await,
            Err(ActionError::NotConnected)
        );
        assert_eq!(actions.state(0), ActionState::Idle);
    }
}
