//! HTTP node wrapping a [`Ledger`], its peer registry and consensus resolver.
use medledger_core::{
    constants::DEFAULT_MINE_BUDGET_SECS,
    mine::{CancelFlag, MiningConfig},
    ConsensusConfig, Ledger, PeerRegistry, Resolver,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

pub mod client;
pub mod routes;

pub use client::HttpPeerClient;
pub use routes::router;

#[derive(Clone, Copy, Debug)]
pub struct NodeConfig {
    pub mining: MiningConfig,
    /// How long a single `/mine` call may search before giving up.
    pub mine_budget: Duration,
    pub consensus: ConsensusConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            mining: MiningConfig::default(),
            mine_budget: Duration::from_secs(DEFAULT_MINE_BUDGET_SECS),
            consensus: ConsensusConfig::default(),
        }
    }
}

/// Stop signals of the proof searches currently running on this node, keyed
/// by the index of the block each one extends.
#[derive(Debug, Default)]
pub struct ActiveMiners {
    next_id: AtomicU64,
    flags: Mutex<HashMap<u64, (u64, CancelFlag)>>,
}

impl ActiveMiners {
    fn lock(&self) -> MutexGuard<'_, HashMap<u64, (u64, CancelFlag)>> {
        self.flags.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Track a search extending block `parent_index` until the returned guard
    /// is dropped.
    pub fn track(&self, parent_index: u64, flag: CancelFlag) -> TrackedMiner<'_> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().insert(id, (parent_index, flag));
        TrackedMiner { miners: self, id }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop the searches extending a block below `tip_index`. Searches already
    /// on the tip keep running. Returns how many were stopped.
    pub fn cancel_stale(&self, tip_index: u64) -> usize {
        let mut flags = self.lock();
        let before = flags.len();
        flags.retain(|_, (parent_index, flag)| {
            let stale = *parent_index < tip_index;
            if stale {
                flag.cancel();
            }
            !stale
        });
        before - flags.len()
    }

    /// Stop every running search. Called on shutdown.
    pub fn cancel_all(&self) -> usize {
        let mut flags = self.lock();
        for (_, flag) in flags.values() {
            flag.cancel();
        }
        let stopped = flags.len();
        flags.clear();
        stopped
    }
}

/// Removes its search from [`ActiveMiners`] when dropped.
#[derive(Debug)]
pub struct TrackedMiner<'a> {
    miners: &'a ActiveMiners,
    id: u64,
}

impl Drop for TrackedMiner<'_> {
    fn drop(&mut self) {
        self.miners.lock().remove(&self.id);
    }
}

/// Shared handles passed to every request handler.
#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<Ledger>,
    pub peers: Arc<PeerRegistry>,
    pub resolver: Arc<Resolver<HttpPeerClient>>,
    pub miners: Arc<ActiveMiners>,
    pub config: NodeConfig,
}

impl AppState {
    pub fn new(config: NodeConfig) -> anyhow::Result<Self> {
        let client = HttpPeerClient::new(config.consensus.fetch_timeout)?;
        Ok(Self {
            ledger: Arc::new(Ledger::new()),
            peers: Arc::new(PeerRegistry::new()),
            resolver: Arc::new(Resolver::new(client, config.consensus)),
            miners: Arc::new(ActiveMiners::default()),
            config,
        })
    }
}
