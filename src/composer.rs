use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::contract::{ContractGateway, TxReceipt};
use crate::error::ChainError;
use crate::reconciler::Reconciler;
use crate::wallet::AccountId;

pub const DEFAULT_DURATION_MINUTES: u64 = 60;
pub const MAX_TITLE_LEN: usize = 256;
pub const MAX_DESCRIPTION_LEN: usize = 10_000;
pub const MAX_DURATION_MINUTES: u64 = 525_600;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ComposeError {
    #[error("title must not be empty")]
    EmptyTitle,
    #[error("description must not be empty")]
    EmptyDescription,
    #[error("title exceeds {MAX_TITLE_LEN} characters")]
    TitleTooLong,
    #[error("description exceeds {MAX_DESCRIPTION_LEN} characters")]
    DescriptionTooLong,
    #[error("duration must be between 1 and {MAX_DURATION_MINUTES} minutes, got {0}")]
    InvalidDuration(u64),
    #[error("connect a wallet before creating proposals")]
    NotConnected,
    #[error("failed to create proposal: {0}")]
    Chain(#[from] ChainError),
}

/// Form state for a new proposal. Survives failed submissions so the user
/// can retry; reset only once the chain confirms creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalDraft {
    pub title: String,
    pub description: String,
    #[serde(default = "default_duration")]
    pub duration_minutes: u64,
}

impl Default for ProposalDraft {
    fn default() -> Self {
        Self {
            title: String::new(),
            description: String::new(),
            duration_minutes: DEFAULT_DURATION_MINUTES,
        }
    }
}

fn default_duration() -> u64 {
    DEFAULT_DURATION_MINUTES
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedProposal {
    pub title: String,
    pub description: String,
    pub duration_secs: u64,
}

impl ProposalDraft {
    pub fn validate(&self) -> Result<ValidatedProposal, ComposeError> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(ComposeError::EmptyTitle);
        }
        if title.chars().count() > MAX_TITLE_LEN {
            return Err(ComposeError::TitleTooLong);
        }
        let description = self.description.trim();
        if description.is_empty() {
            return Err(ComposeError::EmptyDescription);
        }
        if description.chars().count() > MAX_DESCRIPTION_LEN {
            return Err(ComposeError::DescriptionTooLong);
        }
        if !(1..=MAX_DURATION_MINUTES).contains(&self.duration_minutes) {
            return Err(ComposeError::InvalidDuration(self.duration_minutes));
        }

        Ok(ValidatedProposal {
            title: title.to_string(),
            description: description.to_string(),
            duration_secs: self.duration_minutes * 60,
        })
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

pub struct Composer<G> {
    reconciler: Arc<Reconciler<G>>,
}

impl<G: ContractGateway> Composer<G> {
    pub fn new(reconciler: Arc<Reconciler<G>>) -> Self {
        Self { reconciler }
    }

    pub async fn submit(
        &self,
        draft: &mut ProposalDraft,
        from: Option<AccountId>,
    ) -> Result<TxReceipt, ComposeError> {
        let from = from.ok_or(ComposeError::NotConnected)?;
        let proposal = draft.validate()?;

        let receipt = self
            .reconciler
            .gateway()
            .create_proposal(
                &proposal.title,
                &proposal.description,
                proposal.duration_secs,
                from,
            )
            .await?;
        info!(tx_hash = %receipt.tx_hash, title = %proposal.title, "Proposal created");
        draft.reset();

        if let Err(err) = self.reconciler.refresh(Some(from)).await {
            warn!("Refresh after proposal creation failed: {err}");
        }
        Ok(receipt)
    }
}
