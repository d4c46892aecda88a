use crate::constants::{GENESIS_INDEX, GENESIS_PREVIOUS_HASH, GENESIS_PROOF};
use crate::error::{ChainError, LedgerError};
use crate::pow::valid_proof;
use crate::{hash_block, Block, Transaction};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

/// The genesis block every chain starts from.
pub fn genesis_block() -> Block {
    Block::new(GENESIS_INDEX, vec![], GENESIS_PROOF, GENESIS_PREVIOUS_HASH)
}

/// Walk `chain` from its second block, checking index continuity, hash
/// linkage and proof of work against the predecessor. Stops at the first
/// violation. The genesis block itself is taken as given.
pub fn validate_chain(chain: &[Block]) -> Result<(), ChainError> {
    let Some(mut last_block) = chain.first() else {
        return Err(ChainError::Empty);
    };

    for (position, block) in chain.iter().enumerate().skip(1) {
        let position = position as u64 + 1;
        if block.index != position {
            return Err(ChainError::IndexMismatch {
                position,
                index: block.index,
            });
        }
        if block.previous_hash != hash_block(last_block) {
            return Err(ChainError::BrokenLink { index: block.index });
        }
        if !valid_proof(last_block.proof, block.proof) {
            return Err(ChainError::InvalidProof { index: block.index });
        }
        last_block = block;
    }
    Ok(())
}

pub fn valid_chain(chain: &[Block]) -> bool {
    match validate_chain(chain) {
        Ok(()) => true,
        Err(err) => {
            debug!(%err, len = chain.len(), "chain rejected");
            false
        }
    }
}

#[derive(Debug)]
struct LedgerState {
    chain: Vec<Block>,
    pending: Vec<Transaction>,
}

impl LedgerState {
    fn last_block(&self) -> &Block {
        self.chain
            .last()
            .expect("ledger chain is seeded with genesis and never empty")
    }

    fn seal(&mut self, proof: u64, previous_hash: Option<String>) -> Block {
        let previous_hash = previous_hash.unwrap_or_else(|| hash_block(self.last_block()));
        let index = self.chain.len() as u64 + 1;
        let transactions = std::mem::take(&mut self.pending);
        let block = Block::new(index, transactions, proof, previous_hash);
        self.chain.push(block.clone());
        info!(
            index,
            proof,
            txs = block.transactions.len(),
            "sealed block"
        );
        block
    }
}

/// The authoritative chain plus the pending pool behind one lock, so a seal
/// drains the pool and appends the block as a single step.
#[derive(Debug)]
pub struct Ledger {
    state: RwLock<LedgerState>,
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

impl Ledger {
    /// A ledger holding only the genesis block.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(LedgerState {
                chain: vec![genesis_block()],
                pending: Vec::new(),
            }),
        }
    }

    // Critical sections never panic midway through a mutation, so a poisoned
    // lock still guards consistent state.
    fn read(&self) -> RwLockReadGuard<'_, LedgerState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, LedgerState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a transaction and return the index of the block expected to
    /// include it. The index is provisional.
    pub fn submit_transaction(&self, tx: Transaction) -> u64 {
        let mut state = self.write();
        state.pending.push(tx);
        state.last_block().index + 1
    }

    /// Seal the pending pool into a new block on top of the tip. The proof is
    /// not checked here; see [`Ledger::seal_on`].
    pub fn seal_block(&self, proof: u64, previous_hash: Option<String>) -> Block {
        self.write().seal(proof, previous_hash)
    }

    /// Seal only if the tip is still block `parent_index` and `proof` is valid
    /// against its proof. Used to commit a proof mined against a snapshot.
    pub fn seal_on(&self, parent_index: u64, proof: u64) -> Result<Block, LedgerError> {
        let mut state = self.write();
        let tip = state.last_block();
        if tip.index != parent_index {
            return Err(LedgerError::StaleTip {
                expected: parent_index,
                actual: tip.index,
            });
        }
        if !valid_proof(tip.proof, proof) {
            return Err(LedgerError::InvalidProof {
                last_proof: tip.proof,
                proof,
            });
        }
        Ok(state.seal(proof, None))
    }

    pub fn last_block(&self) -> Block {
        self.read().last_block().clone()
    }

    /// Point-in-time copy of the whole chain.
    pub fn chain(&self) -> Vec<Block> {
        self.read().chain.clone()
    }

    pub fn len(&self) -> usize {
        self.read().chain.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.read().chain.is_empty()
    }

    pub fn pending(&self) -> Vec<Transaction> {
        self.read().pending.clone()
    }

    /// Swap in `candidate` if it is still strictly longer than the local chain.
    /// The caller is responsible for validating it first.
    ///
    /// Blocks both chains share were already reconciled against the pool, so
    /// only the blocks past the common prefix prune it. Each sealed entry
    /// removes at most one identical pending entry: a repeated order that was
    /// submitted again and never sealed stays pending.
    pub fn replace_if_longer(&self, candidate: Vec<Block>) -> bool {
        let mut state = self.write();
        if candidate.len() <= state.chain.len() {
            debug!(
                local = state.chain.len(),
                candidate = candidate.len(),
                "candidate no longer longer than local chain"
            );
            return false;
        }
        let shared = state
            .chain
            .iter()
            .zip(&candidate)
            .take_while(|(local, remote)| local == remote)
            .count();
        let mut pruned = 0;
        for tx in candidate[shared..].iter().flat_map(|block| &block.transactions) {
            if let Some(position) = state.pending.iter().position(|pending| pending == tx) {
                state.pending.remove(position);
                pruned += 1;
            }
        }
        info!(
            old_len = state.chain.len(),
            new_len = candidate.len(),
            shared,
            pruned,
            "replaced local chain"
        );
        state.chain = candidate;
        true
    }
}
