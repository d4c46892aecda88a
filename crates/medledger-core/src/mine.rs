use crate::constants::POW_TARGET_DIFFICULTY;
use crate::error::MineError;
use crate::pow::valid_proof_with;
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Shared stop signal for a proof search. Checked before every trial.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Sequential search from 0. Returns the minimal proof, or `None` once
/// `cancel` is raised.
pub fn proof_of_work_cancellable(
    last_proof: u64,
    difficulty: u32,
    cancel: &CancelFlag,
) -> Option<u64> {
    let mut proof = 0u64;
    loop {
        if cancel.is_cancelled() {
            return None;
        }
        if valid_proof_with(last_proof, proof, difficulty) {
            return Some(proof);
        }
        proof = proof.checked_add(1)?;
    }
}

/// Searches proofs in parallel. Returns *a* valid proof, not necessarily the
/// smallest, or `None` once `cancel` is raised.
pub fn proof_of_work_parallel(
    last_proof: u64,
    difficulty: u32,
    cancel: &CancelFlag,
) -> Option<u64> {
    // Rayon splits the range across threads; a raised flag ends every worker.
    let found = (0u64..u64::MAX)
        .into_par_iter()
        .find_any(|proof| cancel.is_cancelled() || valid_proof_with(last_proof, *proof, difficulty))?;
    if cancel.is_cancelled() {
        return None;
    }
    Some(found)
}

#[derive(Clone, Copy, Debug)]
pub struct MiningConfig {
    pub difficulty: u32,
    pub parallel: bool,
}

impl Default for MiningConfig {
    fn default() -> Self {
        Self {
            difficulty: POW_TARGET_DIFFICULTY,
            parallel: false,
        }
    }
}

/// A proof search running on the blocking pool. Dropping the handle stops the
/// search.
pub struct MiningTask {
    last_proof: u64,
    cancel: CancelFlag,
    handle: JoinHandle<Option<u64>>,
}

impl MiningTask {
    /// Must be called from within a tokio runtime.
    pub fn spawn(last_proof: u64, config: MiningConfig) -> Self {
        let cancel = CancelFlag::new();
        let flag = cancel.clone();
        let handle = tokio::task::spawn_blocking(move || {
            let started = Instant::now();
            let found = if config.parallel {
                proof_of_work_parallel(last_proof, config.difficulty, &flag)
            } else {
                proof_of_work_cancellable(last_proof, config.difficulty, &flag)
            };
            match found {
                Some(proof) => info!(
                    last_proof,
                    proof,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "found proof"
                ),
                None => debug!(last_proof, "proof search stopped"),
            }
            found
        });
        Self {
            last_proof,
            cancel,
            handle,
        }
    }

    pub fn last_proof(&self) -> u64 {
        self.last_proof
    }

    /// A clone of the stop signal, for cancelling from elsewhere.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub async fn wait(mut self) -> Result<u64, MineError> {
        (&mut self.handle).await?.ok_or(MineError::Cancelled)
    }

    /// Wait at most `budget`; on expiry the search is cancelled.
    pub async fn wait_for(mut self, budget: Duration) -> Result<u64, MineError> {
        match tokio::time::timeout(budget, &mut self.handle).await {
            Ok(joined) => joined?.ok_or(MineError::Cancelled),
            Err(_) => {
                self.cancel.cancel();
                Err(MineError::BudgetExceeded(budget))
            }
        }
    }
}

impl Drop for MiningTask {
    // Covers a waiter dropped mid-await, e.g. a disconnected HTTP client.
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pow::proof_of_work_with;

    #[test]
    fn cancellable_search_matches_minimal_proof() {
        let flag = CancelFlag::new();
        assert_eq!(
            proof_of_work_cancellable(100, 3, &flag),
            Some(proof_of_work_with(100, 3))
        );
    }

    #[test]
    fn cancelled_search_returns_none() {
        let flag = CancelFlag::new();
        flag.cancel();
        assert_eq!(proof_of_work_cancellable(100, 4, &flag), None);
        assert_eq!(proof_of_work_parallel(100, 4, &flag), None);
    }

    #[test]
    fn parallel_search_finds_a_valid_proof() {
        let flag = CancelFlag::new();
        let proof = proof_of_work_parallel(100, 3, &flag).unwrap();
        assert!(valid_proof_with(100, proof, 3));
    }

    #[tokio::test]
    async fn mining_task_yields_proof() {
        let task = MiningTask::spawn(
            100,
            MiningConfig {
                difficulty: 3,
                parallel: false,
            },
        );
        assert_eq!(task.last_proof(), 100);
        let proof = task.wait().await.unwrap();
        assert_eq!(proof, proof_of_work_with(100, 3));
    }

    #[tokio::test]
    async fn mining_task_can_be_cancelled() {
        // 64 hex zeros is never satisfied, so only cancellation ends the search.
        let task = MiningTask::spawn(
            100,
            MiningConfig {
                difficulty: 64,
                parallel: false,
            },
        );
        task.cancel();
        assert!(matches!(task.wait().await, Err(MineError::Cancelled)));
    }

    #[tokio::test]
    async fn dropping_mining_task_stops_search() {
        let task = MiningTask::spawn(
            100,
            MiningConfig {
                difficulty: 64,
                parallel: false,
            },
        );
        let flag = task.cancel_flag();
        assert!(!flag.is_cancelled());
        drop(task);
        assert!(flag.is_cancelled());
    }

    #[tokio::test]
    async fn abandoned_wait_stops_search() {
        let task = MiningTask::spawn(
            100,
            MiningConfig {
                difficulty: 64,
                parallel: false,
            },
        );
        let flag = task.cancel_flag();
        // An outer deadline drops the pending wait, and the task with it.
        let outer = tokio::time::timeout(Duration::from_millis(20), task.wait()).await;
        assert!(outer.is_err());
        assert!(flag.is_cancelled());
    }

    #[tokio::test]
    async fn mining_task_respects_budget() {
        let task = MiningTask::spawn(
            100,
            MiningConfig {
                difficulty: 64,
                parallel: true,
            },
        );
        let flag = task.cancel_flag();
        let budget = Duration::from_millis(50);
        assert!(matches!(
            task.wait_for(budget).await,
            Err(MineError::BudgetExceeded(b)) if b == budget
        ));
        assert!(flag.is_cancelled());
    }
}
