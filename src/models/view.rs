use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::actions::ActionState;
use crate::models::proposal::{Proposal, ProposalId};
use crate::reconciler::ProposalSnapshot;
use crate::wallet::{AccountId, NetworkId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlState {
    Absent,
    Disabled,
    Enabled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProposalCard {
    #[serde(flatten)]
    pub proposal: Proposal,
    pub status_label: &'static str,
    pub voted_notice: bool,
    pub vote_controls: ControlState,
    pub close_control: ControlState,
    pub action: ActionState,
}

impl ProposalCard {
    pub fn render(
        proposal: &Proposal,
        connected: bool,
        action: ActionState,
        now: DateTime<Utc>,
    ) -> Self {
        let status = proposal.status_at(now);
        let pending = action == ActionState::Pending;
        let available = |offered: bool| {
            if !offered {
                ControlState::Absent
            } else if !connected || pending {
                ControlState::Disabled
            } else {
                ControlState::Enabled
            }
        };

        Self {
            proposal: Proposal {
                status,
                ..proposal.clone()
            },
            status_label: status.as_str(),
            voted_notice: proposal.has_voted,
            vote_controls: available(proposal.can_vote_at(now)),
            close_control: available(proposal.can_close_at(now)),
            action,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ListState {
    /// No fetch has completed yet.
    Loading,
    /// No fetch has succeeded and the last one failed.
    Error,
    Empty,
    Ready,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProposalListView {
    pub state: ListState,
    pub error: Option<String>,
    pub fetched_at: Option<DateTime<Utc>>,
    pub proposals: Vec<ProposalCard>,
}

impl ProposalListView {
    /// Statuses are re-derived at `now`, so a proposal whose deadline passed
    /// since the last fetch already renders as expired.
    pub fn render(
        snapshot: Option<&ProposalSnapshot>,
        error: Option<String>,
        connected: bool,
        actions: &HashMap<ProposalId, ActionState>,
        now: DateTime<Utc>,
    ) -> Self {
        let Some(snapshot) = snapshot else {
            let state = if error.is_some() {
                ListState::Error
            } else {
                ListState::Loading
            };
            return Self {
                state,
                error,
                fetched_at: None,
                proposals: Vec::new(),
            };
        };

        let proposals: Vec<_> = snapshot
            .proposals
            .iter()
            .map(|proposal| {
                let action = actions.get(&proposal.id).cloned().unwrap_or_default();
                ProposalCard::render(proposal, connected, action, now)
            })
            .collect();
        let state = if proposals.is_empty() {
            ListState::Empty
        } else {
            ListState::Ready
        };

        Self {
            state,
            error,
            fetched_at: Some(snapshot.fetched_at),
            proposals,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WalletView {
    pub connected: bool,
    pub account: Option<AccountId>,
    pub short_account: Option<String>,
    pub network_id: Option<NetworkId>,
    pub network_name: Option<String>,
}

impl WalletView {
    pub fn new(account: Option<AccountId>, network: Option<NetworkId>) -> Self {
        Self {
            connected: account.is_some(),
            account,
            short_account: account.map(|account| account.short()),
            network_id: network,
            network_name: network.map(|network| network.display_name()),
        }
    }
}
