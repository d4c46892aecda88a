use thiserror::Error;

/// Reasons a candidate chain fails validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("chain is empty")]
    Empty,
    #[error("block at position {position} carries index {index}")]
    IndexMismatch { position: u64, index: u64 },
    #[error("block {index} does not link to the hash of its predecessor")]
    BrokenLink { index: u64 },
    #[error("block {index} carries an invalid proof of work")]
    InvalidProof { index: u64 },
}

/// Errors from ledger mutations that are checked against the current tip.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("tip moved: expected block {expected}, found {actual}")]
    StaleTip { expected: u64, actual: u64 },
    #[error("proof {proof} does not satisfy the difficulty against last proof {last_proof}")]
    InvalidProof { last_proof: u64, proof: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PeerError {
    #[error("invalid peer address {address:?}: {reason}")]
    InvalidAddress { address: String, reason: String },
}

/// Failures fetching a chain from a peer. None of these abort resolution.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("peer unreachable: {0}")]
    Transport(String),
    #[error("peer answered with status {0}")]
    Status(u16),
    #[error("unparsable chain payload: {0}")]
    Payload(String),
    #[error("peer did not answer within {0:?}")]
    Timeout(std::time::Duration),
}

#[derive(Debug, Error)]
pub enum MineError {
    #[error("mining cancelled")]
    Cancelled,
    #[error("mining budget of {0:?} exceeded")]
    BudgetExceeded(std::time::Duration),
    #[error("mining task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
