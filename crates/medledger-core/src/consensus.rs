//! Longest-valid-chain conflict resolution.
//!
//! Every registered peer is asked for its chain concurrently, each call under
//! its own timeout. Only once every answer (or failure) is in does the
//! resolver pick a winner, walking the answers in sorted peer order so ties go
//! to the lexicographically first peer. The local chain is then swapped in a
//! single step, or left alone.
use crate::chain::{valid_chain, Ledger};
use crate::constants::{DEFAULT_MAX_PEER_FETCHES, DEFAULT_PEER_TIMEOUT_MS};
use crate::error::FetchError;
use crate::peers::PeerRegistry;
use crate::Block;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// What a node serves to its peers: the full chain and its length.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainResponse {
    pub chain: Vec<Block>,
    pub length: u64,
}

impl From<Vec<Block>> for ChainResponse {
    fn from(chain: Vec<Block>) -> Self {
        Self {
            length: chain.len() as u64,
            chain,
        }
    }
}

/// Transport used to fetch a peer's chain.
pub trait PeerClient: Send + Sync {
    fn fetch_chain(
        &self,
        peer: &str,
    ) -> impl Future<Output = Result<ChainResponse, FetchError>> + Send;
}

impl<C: PeerClient> PeerClient for Arc<C> {
    fn fetch_chain(
        &self,
        peer: &str,
    ) -> impl Future<Output = Result<ChainResponse, FetchError>> + Send {
        (**self).fetch_chain(peer)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ConsensusConfig {
    /// Deadline for each individual peer fetch.
    pub fetch_timeout: Duration,
    /// Upper bound on in-flight peer fetches.
    pub max_concurrent_fetches: usize,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_millis(DEFAULT_PEER_TIMEOUT_MS),
            max_concurrent_fetches: DEFAULT_MAX_PEER_FETCHES,
        }
    }
}

pub struct Resolver<C> {
    client: C,
    config: ConsensusConfig,
}

impl<C: PeerClient> Resolver<C> {
    pub fn new(client: C, config: ConsensusConfig) -> Self {
        Self { client, config }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    /// Replace the ledger's chain with the longest valid peer chain, if any
    /// peer has one strictly longer than ours. Returns whether it was replaced.
    pub async fn resolve_conflicts(&self, ledger: &Ledger, registry: &PeerRegistry) -> bool {
        let peers = registry.nodes();
        if peers.is_empty() {
            debug!("no peers registered, nothing to resolve");
            return false;
        }
        let local_len = ledger.len() as u64;
        let responses = self.fetch_all(&peers).await;

        match select_longest(local_len, responses) {
            Some((peer, chain)) => {
                let replaced = ledger.replace_if_longer(chain);
                if replaced {
                    info!(%peer, len = ledger.len(), "adopted peer chain");
                }
                replaced
            }
            None => {
                debug!(local_len, peers = peers.len(), "local chain is authoritative");
                false
            }
        }
    }

    /// Fetch every peer's chain, at most `max_concurrent_fetches` at a time.
    /// Results come back in the order of `peers`.
    pub async fn fetch_all(
        &self,
        peers: &[String],
    ) -> Vec<(String, Result<ChainResponse, FetchError>)> {
        let timeout = self.config.fetch_timeout;
        stream::iter(peers.iter().cloned())
            .map(|peer| async move {
                let result = match tokio::time::timeout(timeout, self.client.fetch_chain(&peer)).await
                {
                    Ok(result) => result,
                    Err(_) => Err(FetchError::Timeout(timeout)),
                };
                (peer, result)
            })
            .buffered(self.config.max_concurrent_fetches.max(1))
            .collect()
            .await
    }
}

/// Pick the strictly longest valid chain longer than `local_len`. Earlier
/// responses win ties. Failed fetches, misreported lengths and invalid chains
/// are skipped.
pub fn select_longest<I>(local_len: u64, responses: I) -> Option<(String, Vec<Block>)>
where
    I: IntoIterator<Item = (String, Result<ChainResponse, FetchError>)>,
{
    let mut max_length = local_len;
    let mut best = None;

    for (peer, result) in responses {
        let response = match result {
            Ok(response) => response,
            Err(err) => {
                warn!(%peer, %err, "skipping peer");
                continue;
            }
        };
        if response.length <= max_length {
            debug!(%peer, length = response.length, max_length, "peer chain not longer");
            continue;
        }
        if response.length != response.chain.len() as u64 {
            warn!(
                %peer,
                reported = response.length,
                actual = response.chain.len(),
                "peer misreported its chain length"
            );
            continue;
        }
        if !valid_chain(&response.chain) {
            warn!(%peer, length = response.length, "peer served an invalid chain");
            continue;
        }
        max_length = response.length;
        best = Some((peer, response.chain));
    }
    best
}
