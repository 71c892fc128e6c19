use crate::wallet::NetworkId;

/// EIP-1193 code returned by wallets when the user dismisses a request.
pub const USER_REJECTED_CODE: i32 = 4001;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    #[error("wallet provider unavailable: {0}")]
    Unavailable(String),
    #[error("wallet connection rejected by user")]
    Rejected,
    #[error("wallet returned no accounts")]
    NoAccounts,
    #[error("wallet returned malformed account {0}")]
    MalformedAccount(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    #[error("provider error {code}: {message}")]
    Rpc { code: i32, message: String },
    #[error("provider transport failed: {0}")]
    Transport(String),
    #[error("transaction {tx_hash} reverted")]
    Reverted { tx_hash: String },
    #[error("failed to decode {what}: {reason}")]
    Decode { what: &'static str, reason: String },
    #[error("wallet is on network {actual}, contract is deployed on {expected}")]
    WrongNetwork {
        expected: NetworkId,
        actual: NetworkId,
    },
}

impl ChainError {
    pub fn decode(what: &'static str, reason: impl Into<String>) -> Self {
        Self::Decode {
            what,
            reason: reason.into(),
        }
    }

    pub fn is_user_rejection(&self) -> bool {
        matches!(self, Self::Rpc { code, .. } if *code == USER_REJECTED_CODE)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("failed to read proposal count: {0}")]
    Count(#[source] ChainError),
    #[error("failed to read proposal {id}: {source}")]
    Proposal { id: u64, source: ChainError },
    #[error("failed to read vote flag of proposal {id}: {source}")]
    HasVoted { id: u64, source: ChainError },
    #[error("contract returned proposal {actual} when asked for {requested}")]
    Inconsistent { requested: u64, actual: u64 },
    #[error("proposal read task failed: {0}")]
    Task(String),
}
