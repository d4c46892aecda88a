pub const HASH_SIZE: usize = 32;
pub const HASH_HEX_SIZE: usize = HASH_SIZE * 2;

/// Number of leading zero hex digits a proof hash must carry.
pub const POW_TARGET_DIFFICULTY: u32 = 4;

// Genesis protocol constants. Peers reject chains seeded any other way.
pub const GENESIS_INDEX: u64 = 1;
pub const GENESIS_PREVIOUS_HASH: &str = "1";
pub const GENESIS_PROOF: u64 = 100;

pub const DEFAULT_PEER_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_MAX_PEER_FETCHES: usize = 8;
pub const DEFAULT_MINE_BUDGET_SECS: u64 = 60;
