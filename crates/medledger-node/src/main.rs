use clap::Parser;
use medledger_core::{
    constants::{DEFAULT_MAX_PEER_FETCHES, DEFAULT_MINE_BUDGET_SECS, DEFAULT_PEER_TIMEOUT_MS},
    mine::MiningConfig,
    ConsensusConfig,
};
use medledger_node::{router, AppState, NodeConfig};
use std::{net::SocketAddr, time::Duration};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "medledger-node")]
#[command(about = "Proof-of-work medicine ledger node")]
struct Args {
    /// Address to listen on, e.g. 127.0.0.1:5000
    #[arg(long, default_value = "127.0.0.1:5000")]
    listen: String,

    /// Peer to register at startup (repeatable), e.g. 127.0.0.1:5001
    #[arg(long = "peer")]
    peers: Vec<String>,

    /// Per-peer deadline when fetching chains during resolution
    #[arg(long, default_value_t = DEFAULT_PEER_TIMEOUT_MS)]
    peer_timeout_ms: u64,

    /// Maximum number of peer chains fetched at once
    #[arg(long, default_value_t = DEFAULT_MAX_PEER_FETCHES)]
    max_peer_fetches: usize,

    /// Give up a /mine request after this many seconds
    #[arg(long, default_value_t = DEFAULT_MINE_BUDGET_SECS)]
    mine_budget_secs: u64,

    /// Search proofs on all cores (finds a valid, not necessarily minimal, proof)
    #[arg(long)]
    parallel_mining: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = NodeConfig {
        mining: MiningConfig {
            parallel: args.parallel_mining,
            ..MiningConfig::default()
        },
        mine_budget: Duration::from_secs(args.mine_budget_secs),
        consensus: ConsensusConfig {
            fetch_timeout: Duration::from_millis(args.peer_timeout_ms),
            max_concurrent_fetches: args.max_peer_fetches,
        },
    };
    let state = AppState::new(config)?;
    state.peers.register_nodes(&args.peers)?;

    let app = router(state.clone());
    let addr: SocketAddr = args.listen.parse()?;
    info!(peers = state.peers.len(), "medledger-node listening on http://{addr}");

    let miners = state.miners.clone();
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!(%err, "failed to listen for shutdown signal");
            }
            let stopped = miners.cancel_all();
            info!(stopped, "shutting down");
        })
        .await?;
    Ok(())
}
