use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::abi::{self, Decoder, Token, WORD, encode_call, parse_quantity};
use crate::config::{ChainConfig, DurationUnit, ProposalLayout};
use crate::error::ChainError;
use crate::models::proposal::{ProposalId, ProposalRecord};
use crate::rpc::{ContractTransport, RpcClient};
use crate::wallet::{AccountId, NetworkId};

/// Typed access to the deployed voting contract.
///
/// Reads are point reads against current chain state. Writes are two-phase:
/// the future resolves only after the transaction has been mined, and a
/// revert surfaces as [`ChainError::Reverted`]. Nothing is retried.
pub trait ContractGateway: Send + Sync + 'static {
    fn proposal_count(&self) -> impl Future<Output = Result<u64, ChainError>> + Send;

    fn get_proposal(
        &self,
        id: ProposalId,
    ) -> impl Future<Output = Result<ProposalRecord, ChainError>> + Send;

    fn has_voted(
        &self,
        id: ProposalId,
        account: AccountId,
    ) -> impl Future<Output = Result<bool, ChainError>> + Send;

    fn create_proposal(
        &self,
        title: &str,
        description: &str,
        duration_secs: u64,
        from: AccountId,
    ) -> impl Future<Output = Result<TxReceipt, ChainError>> + Send;

    fn vote(
        &self,
        id: ProposalId,
        support: bool,
        from: AccountId,
    ) -> impl Future<Output = Result<TxReceipt, ChainError>> + Send;

    fn close_proposal(
        &self,
        id: ProposalId,
        from: AccountId,
    ) -> impl Future<Output = Result<TxReceipt, ChainError>> + Send;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TxReceipt {
    pub tx_hash: String,
    pub block_number: Option<u64>,
}

pub struct VotingContract<T = RpcClient> {
    rpc: T,
    address: String,
    layout: ProposalLayout,
    duration_unit: DurationUnit,
    expected_network: Option<NetworkId>,
    receipt_poll_interval: Duration,
}

impl<T: ContractTransport> VotingContract<T> {
    pub fn new(rpc: T, config: &ChainConfig) -> Self {
        assert!(
            !config.contract_address.is_empty(),
            "Contract address must be configured"
        );
        Self {
            rpc,
            address: config.contract_address.clone(),
            layout: config.proposal_layout,
            duration_unit: config.duration_unit,
            expected_network: config.expected_network(),
            receipt_poll_interval: config.receipt_poll_interval(),
        }
    }

    async fn call(&self, data: Vec<u8>) -> Result<Vec<u8>, ChainError> {
        self.rpc.eth_call(&self.address, &data).await
    }

    async fn transact(
        &self,
        action: &'static str,
        data: Vec<u8>,
        from: AccountId,
    ) -> Result<TxReceipt, ChainError> {
        self.ensure_network().await?;
        let tx_hash = self.rpc.send_transaction(from, &self.address, &data).await?;
        info!(action, tx_hash = %tx_hash, from = %from, "Transaction submitted");
        self.confirm(action, tx_hash).await
    }

    async fn confirm(&self, action: &'static str, tx_hash: String) -> Result<TxReceipt, ChainError> {
        loop {
            if let Some(receipt) = self.rpc.transaction_receipt(&tx_hash).await? {
                let block_number = receipt.block_number.as_deref().and_then(parse_quantity);
                let status = receipt.status.as_deref().and_then(parse_quantity);
                if status == Some(0) {
                    warn!(action, tx_hash = %tx_hash, "Transaction reverted");
                    return Err(ChainError::Reverted { tx_hash });
                }
                info!(action, tx_hash = %tx_hash, block = ?block_number, "Transaction confirmed");
                return Ok(TxReceipt {
                    tx_hash,
                    block_number,
                });
            }
            sleep(self.receipt_poll_interval).await;
        }
    }

    async fn ensure_network(&self) -> Result<(), ChainError> {
        let Some(expected) = self.expected_network else {
            return Ok(());
        };
        let raw = self.rpc.fetch_chain_id().await?;
        let actual = NetworkId::parse_hex(&raw).ok_or_else(|| ChainError::decode("chain id", raw))?;
        if actual != expected {
            return Err(ChainError::WrongNetwork { expected, actual });
        }
        Ok(())
    }

    fn contract_duration(&self, duration_secs: u64) -> u64 {
        match self.duration_unit {
            DurationUnit::Seconds => duration_secs,
            DurationUnit::Minutes => duration_secs / 60,
        }
    }
}

impl<T: ContractTransport> ContractGateway for VotingContract<T> {
    async fn proposal_count(&self) -> Result<u64, ChainError> {
        let data = self.call(encode_call(abi::GET_PROPOSALS_COUNT, &[])).await?;
        Decoder::new(&data).uint_at(0)
    }

    async fn get_proposal(&self, id: ProposalId) -> Result<ProposalRecord, ChainError> {
        let data = self
            .call(encode_call(abi::GET_PROPOSAL, &[Token::Uint(id)]))
            .await?;
        decode_proposal(&data, self.layout)
    }

    async fn has_voted(&self, id: ProposalId, account: AccountId) -> Result<bool, ChainError> {
        let data = self
            .call(encode_call(
                abi::HAS_VOTED,
                &[Token::Uint(id), Token::Address(account.as_bytes())],
            ))
            .await?;
        Decoder::new(&data).bool_at(0)
    }

    async fn create_proposal(
        &self,
        title: &str,
        description: &str,
        duration_secs: u64,
        from: AccountId,
    ) -> Result<TxReceipt, ChainError> {
        let duration = self.contract_duration(duration_secs);
        let data = encode_call(
            abi::CREATE_PROPOSAL,
            &[
                Token::String(title),
                Token::String(description),
                Token::Uint(duration),
            ],
        );
        self.transact("create_proposal", data, from).await
    }

    async fn vote(
        &self,
        id: ProposalId,
        support: bool,
        from: AccountId,
    ) -> Result<TxReceipt, ChainError> {
        let data = encode_call(abi::VOTE, &[Token::Uint(id), Token::Bool(support)]);
        self.transact("vote", data, from).await
    }

    async fn close_proposal(&self, id: ProposalId, from: AccountId) -> Result<TxReceipt, ChainError> {
        let data = encode_call(abi::CLOSE_PROPOSAL, &[Token::Uint(id)]);
        self.transact("close_proposal", data, from).await
    }
}

/// Decodes `getProposal` return data into the typed projection.
///
/// Field order: id, title, description, yesVotes, noVotes, createdAt,
/// endTime, closed.
pub fn decode_proposal(data: &[u8], layout: ProposalLayout) -> Result<ProposalRecord, ChainError> {
    let decoder = Decoder::new(data);
    let base = match layout {
        ProposalLayout::Tuple => decoder.offset_at(0)?,
        ProposalLayout::Flat => 0,
    };
    let field = |index: usize| {
        index
            .checked_mul(WORD)
            .and_then(|relative| base.checked_add(relative))
            .ok_or_else(|| ChainError::decode("proposal", format!("tuple offset {base} overflows")))
    };

    let created_at = timestamp(decoder.uint_at(field(5)?)?, "createdAt")?;
    let end_time = timestamp(decoder.uint_at(field(6)?)?, "endTime")?;
    if end_time < created_at {
        return Err(ChainError::decode(
            "proposal",
            "endTime precedes createdAt",
        ));
    }

    Ok(ProposalRecord {
        id: decoder.uint_at(field(0)?)?,
        title: decoder.string_at(base, field(1)?)?,
        description: decoder.string_at(base, field(2)?)?,
        yes_votes: decoder.uint_at(field(3)?)?,
        no_votes: decoder.uint_at(field(4)?)?,
        created_at,
        end_time,
        closed: decoder.bool_at(field(7)?)?,
    })
}

fn timestamp(secs: u64, what: &'static str) -> Result<DateTime<Utc>, ChainError> {
    i64::try_from(secs)
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .ok_or_else(|| ChainError::decode(what, format!("{secs} is not a valid timestamp")))
}
