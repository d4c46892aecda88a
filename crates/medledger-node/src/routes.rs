use crate::AppState;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use medledger_core::{
    mine::MiningTask, Block, ChainResponse, LedgerError, MineError, PeerError, Transaction,
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(Health { status: "ok" }) }))
        .route("/transactions/new", post(new_transaction))
        .route("/transactions/pending", get(pending_transactions))
        .route("/chain", get(full_chain))
        .route("/mine", post(mine))
        .route("/nodes/register", post(register_nodes))
        .route("/nodes/resolve", get(resolve))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Conflict(String),
    Unavailable(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::Conflict(m) => (StatusCode::CONFLICT, m),
            ApiError::Unavailable(m) => (StatusCode::SERVICE_UNAVAILABLE, m),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<PeerError> for ApiError {
    fn from(err: PeerError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        ApiError::Conflict(err.to_string())
    }
}

impl From<MineError> for ApiError {
    fn from(err: MineError) -> Self {
        match err {
            MineError::Cancelled => {
                ApiError::Conflict("mining cancelled: the chain tip changed".to_string())
            }
            MineError::BudgetExceeded(_) | MineError::Join(_) => {
                ApiError::Unavailable(err.to_string())
            }
        }
    }
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct TxIn {
    pub sender: String,
    pub recipient: String,
    pub medicine: String,
    pub quantity: u64,
    pub price: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TxAccepted {
    pub message: String,
    pub index: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PendingOut {
    pub transactions: Vec<Transaction>,
    pub length: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Mined {
    pub message: String,
    pub block: Block,
}

#[derive(Debug, Deserialize)]
pub struct NodesIn {
    pub nodes: Option<Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NodesOut {
    pub message: String,
    pub total_nodes: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Resolved {
    pub message: String,
    pub replaced: bool,
    pub chain: Vec<Block>,
}

async fn new_transaction(
    State(state): State<AppState>,
    body: Result<Json<TxIn>, JsonRejection>,
) -> Result<(StatusCode, Json<TxAccepted>), ApiError> {
    let Json(tx) = body?;
    let index = state.ledger.submit_transaction(Transaction::new(
        tx.sender,
        tx.recipient,
        tx.medicine,
        tx.quantity,
        tx.price,
    ));
    Ok((
        StatusCode::CREATED,
        Json(TxAccepted {
            message: format!("Transaction will be added to Block {index}"),
            index,
        }),
    ))
}

async fn pending_transactions(State(state): State<AppState>) -> Json<PendingOut> {
    let transactions = state.ledger.pending();
    Json(PendingOut {
        length: transactions.len(),
        transactions,
    })
}

async fn full_chain(State(state): State<AppState>) -> Json<ChainResponse> {
    Json(state.ledger.chain().into())
}

async fn mine(State(state): State<AppState>) -> Result<Json<Mined>, ApiError> {
    let tip = state.ledger.last_block();
    let task = MiningTask::spawn(tip.proof, state.config.mining);
    let tracked = state.miners.track(tip.index, task.cancel_flag());
    let found = task.wait_for(state.config.mine_budget).await;
    drop(tracked);

    let block = state.ledger.seal_on(tip.index, found?)?;
    state.miners.cancel_stale(block.index);
    Ok(Json(Mined {
        message: "New block forged".to_string(),
        block,
    }))
}

async fn register_nodes(
    State(state): State<AppState>,
    body: Result<Json<NodesIn>, JsonRejection>,
) -> Result<(StatusCode, Json<NodesOut>), ApiError> {
    let Json(body) = body?;
    let Some(nodes) = body.nodes else {
        return Err(ApiError::BadRequest(
            "Please supply a valid list of nodes".to_string(),
        ));
    };
    let added = state.peers.register_nodes(&nodes).inspect_err(|err| {
        warn!(%err, "rejected peer registration");
    })?;
    info!(added, total = state.peers.len(), "peer registration");
    Ok((
        StatusCode::CREATED,
        Json(NodesOut {
            message: "New nodes have been added".to_string(),
            total_nodes: state.peers.nodes(),
        }),
    ))
}

async fn resolve(State(state): State<AppState>) -> Json<Resolved> {
    let replaced = state
        .resolver
        .resolve_conflicts(&state.ledger, &state.peers)
        .await;
    if replaced {
        state.miners.cancel_stale(state.ledger.last_block().index);
    }
    let message = if replaced {
        "Our chain was replaced"
    } else {
        "Our chain is authoritative"
    };
    Json(Resolved {
        message: message.to_string(),
        replaced,
        chain: state.ledger.chain(),
    })
}
