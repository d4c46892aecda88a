//! Core of the medicine ledger: block and transaction records, canonical
//! hashing, proof of work, chain validation, the in-memory ledger, the peer
//! registry and longest-valid-chain consensus.
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};

pub mod chain;
pub mod consensus;
pub mod constants;
pub mod error;
pub mod mine;
pub mod peers;

pub use chain::{valid_chain, validate_chain, Ledger};
pub use consensus::{ChainResponse, ConsensusConfig, PeerClient, Resolver};
pub use error::{ChainError, FetchError, LedgerError, MineError, PeerError};
pub use peers::PeerRegistry;

pub type Hash = [u8; 32];

// Fields are declared in lexicographic order: serde emits them in declaration
// order, and that order is part of the canonical hash encoding.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub medicine: String,
    pub price: u64,
    pub quantity: u64,
    pub recipient: String,
    pub sender: String,
}

impl Transaction {
    pub fn new(
        sender: impl Into<String>,
        recipient: impl Into<String>,
        medicine: impl Into<String>,
        quantity: u64,
        price: u64,
    ) -> Self {
        Self {
            medicine: medicine.into(),
            price,
            quantity,
            recipient: recipient.into(),
            sender: sender.into(),
        }
    }
}

/// A sealed block. Field order is canonical, see [`Transaction`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    pub previous_hash: String,
    pub proof: u64,
    pub timestamp: u64,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn new(
        index: u64,
        transactions: Vec<Transaction>,
        proof: u64,
        previous_hash: impl Into<String>,
    ) -> Self {
        Self {
            index,
            previous_hash: previous_hash.into(),
            proof,
            timestamp: now_secs(),
            transactions,
        }
    }

    pub fn hash(&self) -> String {
        hash_block(self)
    }

    /// Compact JSON with keys in lexicographic order at every level.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        // Only strings and integers are serialized, which serde_json cannot fail on.
        serde_json::to_vec(self).expect("block serialization is infallible")
    }
}

/// Hex SHA-256 digest of the block's canonical encoding.
pub fn hash_block(block: &Block) -> String {
    hex::encode(sha256(&block.canonical_bytes()))
}

pub fn sha256(bytes: &[u8]) -> Hash {
    let digest = Sha256::digest(bytes);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest[..]);
    out
}

pub(crate) fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

pub mod pow {
    use super::{sha256, Hash};
    use crate::constants::POW_TARGET_DIFFICULTY;

    /// True if `sha256("{last_proof}{proof}")` starts with
    /// [`POW_TARGET_DIFFICULTY`] zero hex digits.
    pub fn valid_proof(last_proof: u64, proof: u64) -> bool {
        valid_proof_with(last_proof, proof, POW_TARGET_DIFFICULTY)
    }

    /// Same predicate with `difficulty` counted in hex digits.
    pub fn valid_proof_with(last_proof: u64, proof: u64, difficulty: u32) -> bool {
        // Undelimited on purpose: peers hash exactly this string.
        let guess = format!("{last_proof}{proof}");
        count_leading_zero_bits(&sha256(guess.as_bytes())) >= difficulty * 4
    }

    /// Smallest non-negative proof satisfying [`valid_proof`]. Blocks until found;
    /// see [`crate::mine`] for the cancellable variants.
    pub fn proof_of_work(last_proof: u64) -> u64 {
        proof_of_work_with(last_proof, POW_TARGET_DIFFICULTY)
    }

    pub fn proof_of_work_with(last_proof: u64, difficulty: u32) -> u64 {
        let mut proof = 0u64;
        while !valid_proof_with(last_proof, proof, difficulty) {
            proof += 1;
        }
        proof
    }

    pub fn count_leading_zero_bits(hash: &Hash) -> u32 {
        let mut total = 0u32;
        for b in hash {
            if *b == 0 {
                total += 8;
            } else {
                total += b.leading_zeros();
                break;
            }
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_block() -> Block {
        Block {
            index: 2,
            previous_hash: "ab".repeat(32),
            proof: 35_293,
            timestamp: 1_600_000_200,
            transactions: vec![
                Transaction::new("Alice", "Bob", "aspirin", 10, 5),
                Transaction::new("Bob", "Charlie", "insulin", 2, 4_200),
            ],
        }
    }

    #[test]
    fn leading_zero_bits_examples() {
        let mut h = [0u8; 32];
        assert_eq!(pow::count_leading_zero_bits(&h), 256);
        h[0] = 0x0F; // 00001111
        assert_eq!(pow::count_leading_zero_bits(&h), 4);
        h = [0u8; 32];
        h[1] = 0x80; // 00000000 10000000
        assert_eq!(pow::count_leading_zero_bits(&h), 8);
        h[1] = 0x40; // 01000000
        assert_eq!(pow::count_leading_zero_bits(&h), 9);
    }

    #[test]
    fn canonical_bytes_sort_keys() {
        let block = Block {
            index: 1,
            previous_hash: "1".into(),
            proof: 100,
            timestamp: 1_600_000_000,
            transactions: vec![Transaction::new("A", "B", "aspirin", 10, 5)],
        };
        let json = String::from_utf8(block.canonical_bytes()).unwrap();
        let expected = r#"{"index":1,"previous_hash":"1","proof":100,"timestamp":1600000000,"transactions":[{"medicine":"aspirin","price":5,"quantity":10,"recipient":"B","sender":"A"}]}"#;
        assert_eq!(json, expected);
    }

    #[test]
    fn canonical_bytes_match_sorted_value_encoding() {
        // serde_json::Value objects are BTreeMap-backed, so this is an
        // independent sorted-keys encoding of the same block.
        let block = sample_block();
        let value = serde_json::to_value(&block).unwrap();
        assert_eq!(block.canonical_bytes(), serde_json::to_vec(&value).unwrap());
    }

    #[test]
    fn hash_is_hex_sha256_of_canonical_bytes() {
        let block = sample_block();
        let hash = block.hash();
        assert_eq!(hash.len(), constants::HASH_HEX_SIZE);
        assert_eq!(hash, hex::encode(Sha256::digest(block.canonical_bytes())));
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn block_hash_example() {
        let hash = sample_block().hash();
        let expected_hex = "7001ffa8ed75bdd620882c441e6e3bbb98fdcc6f6ac983cc5dca1051eea3420f";
        assert_eq!(hash, expected_hex);
    }

    #[test]
    fn block_hash_consistency() {
        let block = sample_block();
        assert_eq!(block.hash(), block.hash());
        assert_eq!(hash_block(&block), sample_block().hash());
    }

    #[test]
    fn block_hash_survives_json_round_trip() {
        let block = sample_block();
        let wire = serde_json::to_string(&block).unwrap();
        let back: Block = serde_json::from_str(&wire).unwrap();
        assert_eq!(block, back);
        assert_eq!(block.hash(), back.hash());
    }

    #[test]
    fn block_hash_changes_with_every_field() {
        let base = sample_block().hash();

        let mut b = sample_block();
        b.index += 1;
        assert_ne!(base, b.hash());

        let mut b = sample_block();
        b.timestamp += 1;
        assert_ne!(base, b.hash());

        let mut b = sample_block();
        b.proof += 1;
        assert_ne!(base, b.hash());

        let mut b = sample_block();
        b.previous_hash = "cd".repeat(32);
        assert_ne!(base, b.hash());

        let mut b = sample_block();
        b.transactions[1].quantity = 3;
        assert_ne!(base, b.hash());

        let mut b = sample_block();
        b.transactions.swap(0, 1);
        assert_ne!(base, b.hash());

        let mut b = sample_block();
        b.transactions.pop();
        assert_ne!(base, b.hash());
    }

    #[test]
    fn block_new_stamps_current_time() {
        let block = Block::new(2, vec![], 7, "ff");
        assert_eq!(block.index, 2);
        assert_eq!(block.proof, 7);
        assert_eq!(block.previous_hash, "ff");
        assert!(block.timestamp > 1_600_000_000);
    }

    #[test]
    fn valid_proof_matches_hex_prefix() {
        for proof in 0..2_000u64 {
            let digest = hex::encode(Sha256::digest(format!("100{proof}").as_bytes()));
            assert_eq!(
                pow::valid_proof_with(100, proof, 2),
                digest.starts_with("00"),
                "proof {proof}"
            );
        }
    }

    #[test]
    fn proof_of_work_returns_minimal_proof() {
        let proof = pow::proof_of_work(100);
        assert!(pow::valid_proof(100, proof));
        assert!((0..proof).all(|p| !pow::valid_proof(100, p)));
    }

    #[test]
    fn proof_of_work_with_zero_difficulty_is_zero() {
        assert_eq!(pow::proof_of_work_with(12_345, 0), 0);
    }

    #[test]
    fn undelimited_encoding_is_ambiguous() {
        // 12 ++ 3 and 1 ++ 23 hash the same guess; kept for peer compatibility.
        assert_eq!(
            pow::valid_proof_with(12, 3, 1),
            pow::valid_proof_with(1, 23, 1)
        );
    }
}
