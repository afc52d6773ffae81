//! # Query API
//!
//! Read-only HTTP view of the index, plus one passthrough for submitting
//! signed transactions to the node.
//!
//! ## Endpoints
//!
//! | Method | Path                        | Description                       |
//! |--------|-----------------------------|-----------------------------------|
//! | GET    | `/health`                   | Liveness check                    |
//! | GET    | `/status`                   | Best block, stable chunk, phase   |
//! | GET    | `/blocks/:height`           | Block by height                   |
//! | GET    | `/transactions/:hash`       | Transaction by hash, or submitted |
//! | GET    | `/accounts/:id`             | Account balance and counter       |
//! | GET    | `/addresses/:address`       | UTXO address balance              |
//! | GET    | `/utxos/:tx_hash/:index`    | One output, spent or unspent      |
//! | POST   | `/txs/signed`               | Forward a signed transaction      |
//!
//! Data newer than the latest stable chunk is provisional: a rollback may
//! remove it. Submissions that decode are tracked as pending until they
//! land in a block or the node rejects them.

use axum::{
    extract::{Path, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use ledger_indexer::crypto::{from_hex, to_hex, Hash};
use ledger_indexer::decoder::Decoder;
use ledger_indexer::model::{
    Input, Output, OutputKind, PendingTransaction, StoredTransaction, Transaction, TxContext, TxStatus,
    TxValue, UtxoKey,
};
use ledger_indexer::storage::{BlockRecord, IndexerDB, StorageProcessor};
use ledger_indexer::sync::{ChainSyncScheduler, NodeDataProvider};

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared state for all handlers. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub version: String,
    pub network: String,
    pub db: IndexerDB,
    pub storage: Arc<dyn StorageProcessor>,
    pub scheduler: Arc<ChainSyncScheduler>,
    pub provider: Arc<dyn NodeDataProvider>,
    /// Decodes submissions so they can be tracked.
    pub decoder: Decoder,
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/blocks/:height", get(block_by_height_handler))
        .route("/transactions/:hash", get(transaction_by_hash_handler))
        .route("/accounts/:id", get(account_handler))
        .route("/addresses/:address", get(address_handler))
        .route("/utxos/:tx_hash/:index", get(utxo_handler))
        .route("/txs/signed", post(submit_tx_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Response Types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct BestBlockView {
    pub height: u64,
    pub epoch: u64,
    pub slot: Option<u64>,
    pub hash: Option<String>,
}

/// `GET /status`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    pub network: String,
    pub best_block: BestBlockView,
    /// Chunk number of the latest stable checkpoint.
    pub stable_chunk: Option<u64>,
    /// Height covered by the latest stable checkpoint.
    pub stable_height: Option<u64>,
    pub phase: String,
    pub queue_depth: usize,
    /// Circulating supply after the best block.
    pub supply: i64,
    pub timestamp: String,
}

/// `GET /blocks/:height`.
#[derive(Debug, Serialize, Deserialize)]
pub struct BlockResponse {
    pub height: u64,
    pub hash: String,
    pub prev_hash: String,
    pub epoch: u64,
    pub slot: Option<u64>,
    pub is_epoch_boundary: bool,
    pub time: String,
    pub tx_hashes: Vec<String>,
    pub sent: u64,
    pub fees: u64,
    pub supply_after: i64,
}

impl From<BlockRecord> for BlockResponse {
    fn from(block: BlockRecord) -> Self {
        Self {
            height: block.height,
            hash: to_hex(&block.hash),
            prev_hash: to_hex(&block.prev_hash),
            epoch: block.epoch,
            slot: block.slot,
            is_epoch_boundary: block.is_epoch_boundary,
            time: block.time.to_rfc3339(),
            tx_hashes: block.tx_hashes.iter().map(to_hex).collect(),
            sent: block.sent,
            fees: block.fees,
            supply_after: block.supply_after,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InputView {
    /// `utxo` or `account`.
    pub kind: String,
    /// `tx_hash:index` for UTXO inputs, the account id otherwise.
    pub source: String,
    /// Empty for UTXO inputs of a transaction not yet in a block.
    pub address: String,
    pub amount: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OutputView {
    pub kind: String,
    pub address: String,
    pub amount: u64,
}

/// `GET /transactions/:hash`.
#[derive(Debug, Serialize, Deserialize)]
pub struct TransactionResponse {
    pub hash: String,
    pub block_hash: Option<String>,
    pub block_num: Option<u64>,
    pub epoch: Option<u64>,
    pub slot: Option<u64>,
    pub tx_ordinal: Option<u32>,
    pub status: String,
    /// Why the node rejected a submission.
    pub reason: Option<String>,
    pub is_genesis: bool,
    pub inputs: Vec<InputView>,
    pub outputs: Vec<OutputView>,
    pub certificate: Option<String>,
    /// Value totals, known once the transaction is in the index.
    pub value: Option<ValueView>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ValueView {
    pub sum_inputs: u64,
    pub sum_outputs: u64,
    pub fee: u64,
    pub supply_after: i64,
}

impl From<TxValue> for ValueView {
    fn from(value: TxValue) -> Self {
        Self {
            sum_inputs: value.sum_inputs,
            sum_outputs: value.sum_outputs,
            fee: value.fee,
            supply_after: value.supply_after,
        }
    }
}

impl TransactionResponse {
    /// `resolved` pairs each input with its address and amount; inputs
    /// without an entry are shown as far as the input itself tells.
    fn build(tx: Transaction, resolved: &[(String, u64)]) -> Self {
        let inputs = tx
            .inputs
            .iter()
            .enumerate()
            .map(|(i, input)| {
                let (kind, source, fallback) = match input {
                    Input::Utxo { tx_id, index } => {
                        ("utxo", format!("{}:{index}", to_hex(tx_id)), (String::new(), 0))
                    }
                    Input::Account { account_id, value } => {
                        ("account", account_id.clone(), (account_id.clone(), *value))
                    }
                };
                let (address, amount) = resolved.get(i).cloned().unwrap_or(fallback);
                InputView {
                    kind: kind.to_string(),
                    source,
                    address,
                    amount,
                }
            })
            .collect();
        let outputs = tx
            .outputs
            .iter()
            .map(|output: &Output| OutputView {
                kind: match output.kind() {
                    OutputKind::Utxo => "utxo".to_string(),
                    OutputKind::Account => "account".to_string(),
                },
                address: output.address().to_string(),
                amount: output.value(),
            })
            .collect();
        let status = match tx.status {
            TxStatus::Pending => "pending",
            TxStatus::Success => "success",
            TxStatus::Failed => "failed",
        };
        Self {
            hash: to_hex(&tx.id),
            block_hash: tx.context.block_hash.as_ref().map(to_hex),
            block_num: tx.context.block_num,
            epoch: tx.context.epoch,
            slot: tx.context.slot,
            tx_ordinal: tx.context.tx_ordinal,
            status: status.to_string(),
            reason: None,
            is_genesis: false,
            inputs,
            outputs,
            certificate: tx.certificate.as_ref().map(|c| c.kind().as_str().to_string()),
            value: None,
        }
    }
}

impl From<StoredTransaction> for TransactionResponse {
    fn from(stored: StoredTransaction) -> Self {
        let resolved: Vec<(String, u64)> = stored
            .resolved_inputs
            .iter()
            .map(|r| (r.address.clone(), r.amount))
            .collect();
        Self {
            is_genesis: stored.is_genesis,
            value: Some(stored.value.into()),
            ..Self::build(stored.tx, &resolved)
        }
    }
}

impl From<PendingTransaction> for TransactionResponse {
    fn from(pending: PendingTransaction) -> Self {
        Self {
            reason: pending.reason,
            ..Self::build(pending.tx, &[])
        }
    }
}

/// `GET /accounts/:id`. Unknown accounts report zero.
#[derive(Debug, Serialize, Deserialize)]
pub struct AccountResponse {
    pub account: String,
    pub balance: i64,
    pub spending_counter: u64,
    pub last_height: u64,
    /// Number of ledger rows recorded for the account.
    pub operations: usize,
}

/// `GET /addresses/:address`. Unknown addresses report zero.
#[derive(Debug, Serialize, Deserialize)]
pub struct AddressResponse {
    pub address: String,
    pub balance: i64,
    pub last_height: u64,
    pub operations: usize,
}

/// `GET /utxos/:tx_hash/:index`.
#[derive(Debug, Serialize, Deserialize)]
pub struct UtxoResponse {
    pub tx_hash: String,
    pub index: u32,
    pub address: String,
    pub amount: u64,
    pub block_num: u64,
    pub spent_by: Option<String>,
    pub spent_at: Option<u64>,
}

/// `POST /txs/signed` body.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedTxRequest {
    /// Hex-encoded signed transaction.
    pub signed_tx: String,
}

/// `POST /txs/signed` reply.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub status: String,
    /// Set when the submission decoded and is being tracked.
    pub tx_hash: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ErrorResponse { error: message.into() })).into_response()
}

fn parse_hash(raw: &str) -> Result<Hash, Response> {
    from_hex(raw).ok_or_else(|| error(StatusCode::BAD_REQUEST, format!("invalid hash: {raw}")))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health`. Liveness only; subsystem health belongs in `/status`.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

async fn status_handler(State(state): State<AppState>) -> Response {
    let best = match state.db.best_block() {
        Ok(best) => best,
        Err(e) => return error(StatusCode::INTERNAL_SERVER_ERROR, format!("database error: {e}")),
    };
    let checkpoint = match state.db.latest_checkpoint() {
        Ok(checkpoint) => checkpoint,
        Err(e) => return error(StatusCode::INTERNAL_SERVER_ERROR, format!("database error: {e}")),
    };
    let supply = match state.db.supply() {
        Ok(supply) => supply,
        Err(e) => return error(StatusCode::INTERNAL_SERVER_ERROR, format!("database error: {e}")),
    };

    let resp = StatusResponse {
        version: state.version.clone(),
        network: state.network.clone(),
        best_block: BestBlockView {
            height: best.height,
            epoch: best.epoch,
            slot: best.slot,
            hash: best.hash.as_ref().map(to_hex),
        },
        stable_chunk: checkpoint.as_ref().map(|c| c.chunk),
        stable_height: checkpoint.as_ref().map(|c| c.height),
        phase: state.scheduler.phase().to_string(),
        queue_depth: state.scheduler.queue_depth(),
        supply,
        timestamp: chrono::Utc::now().to_rfc3339(),
    };
    Json(resp).into_response()
}

async fn block_by_height_handler(Path(height): Path<u64>, State(state): State<AppState>) -> Response {
    match state.db.block_at(height) {
        Ok(Some(block)) => Json(BlockResponse::from(block)).into_response(),
        Ok(None) => error(StatusCode::NOT_FOUND, format!("Block not found at height {height}")),
        Err(e) => error(StatusCode::INTERNAL_SERVER_ERROR, format!("database error: {e}")),
    }
}

async fn transaction_by_hash_handler(Path(hash): Path<String>, State(state): State<AppState>) -> Response {
    let id = match parse_hash(&hash) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match state.db.transaction(&id) {
        Ok(Some(tx)) => return Json(TransactionResponse::from(tx)).into_response(),
        Ok(None) => {}
        Err(e) => return error(StatusCode::INTERNAL_SERVER_ERROR, format!("database error: {e}")),
    }
    match state.db.pending_transaction(&id) {
        Ok(Some(tx)) => Json(TransactionResponse::from(tx)).into_response(),
        Ok(None) => error(StatusCode::NOT_FOUND, format!("Transaction not found: {hash}")),
        Err(e) => error(StatusCode::INTERNAL_SERVER_ERROR, format!("database error: {e}")),
    }
}

async fn account_handler(Path(id): Path<String>, State(state): State<AppState>) -> Response {
    let account = match state.db.account(&id) {
        Ok(account) => account.unwrap_or_default(),
        Err(e) => return error(StatusCode::INTERNAL_SERVER_ERROR, format!("database error: {e}")),
    };
    let operations = match state.db.account_history(&id) {
        Ok(rows) => rows.len(),
        Err(e) => return error(StatusCode::INTERNAL_SERVER_ERROR, format!("database error: {e}")),
    };
    Json(AccountResponse {
        account: id,
        balance: account.balance,
        spending_counter: account.spending_counter,
        last_height: account.last_height,
        operations,
    })
    .into_response()
}

async fn address_handler(Path(address): Path<String>, State(state): State<AppState>) -> Response {
    let balance = match state.db.address_balance(&address) {
        Ok(balance) => balance.unwrap_or_default(),
        Err(e) => return error(StatusCode::INTERNAL_SERVER_ERROR, format!("database error: {e}")),
    };
    let operations = match state.db.address_history(&address) {
        Ok(rows) => rows.len(),
        Err(e) => return error(StatusCode::INTERNAL_SERVER_ERROR, format!("database error: {e}")),
    };
    Json(AddressResponse {
        address,
        balance: balance.balance,
        last_height: balance.last_height,
        operations,
    })
    .into_response()
}

async fn utxo_handler(Path((tx_hash, index)): Path<(String, u32)>, State(state): State<AppState>) -> Response {
    let hash = match parse_hash(&tx_hash) {
        Ok(hash) => hash,
        Err(resp) => return resp,
    };
    let key = UtxoKey::new(hash, index);

    let found = match state.db.utxo(&key) {
        Ok(Some(utxo)) => Some((utxo, None)),
        Ok(None) => match state.db.spent_utxo(&key) {
            Ok(spent) => spent.map(|s| (s.utxo, Some((s.spent_by, s.spent_at)))),
            Err(e) => return error(StatusCode::INTERNAL_SERVER_ERROR, format!("database error: {e}")),
        },
        Err(e) => return error(StatusCode::INTERNAL_SERVER_ERROR, format!("database error: {e}")),
    };

    match found {
        Some((utxo, spent)) => Json(UtxoResponse {
            tx_hash: to_hex(&utxo.tx_hash),
            index: utxo.index,
            address: utxo.address,
            amount: utxo.amount,
            block_num: utxo.block_num,
            spent_by: spent.as_ref().map(|(by, _)| to_hex(by)),
            spent_at: spent.map(|(_, at)| at),
        })
        .into_response(),
        None => error(StatusCode::NOT_FOUND, format!("Output not found: {tx_hash}:{index}")),
    }
}

async fn submit_tx_handler(State(state): State<AppState>, Json(req): Json<SignedTxRequest>) -> Response {
    let payload = match hex::decode(&req.signed_tx) {
        Ok(payload) if !payload.is_empty() => payload,
        _ => return error(StatusCode::BAD_REQUEST, "signedTx must be non-empty hex"),
    };
    if let Err(e) = state.provider.post_signed_tx(&payload).await {
        tracing::warn!(error = %e, "signed transaction rejected by bridge");
        return error(StatusCode::BAD_GATEWAY, e.to_string());
    }

    let tx_hash = match state.decoder.decode_transaction(&payload, TxContext::default()) {
        Ok(tx) => {
            let id = tx.id;
            match state.storage.store_pending_tx(tx).await {
                Ok(_) => Some(to_hex(&id)),
                Err(e) => {
                    tracing::warn!(error = %e, tx = %to_hex(&id), "failed to record submitted transaction");
                    None
                }
            }
        }
        Err(e) => {
            tracing::debug!(error = %e, "submitted payload not decodable, not tracking it");
            None
        }
    };
    Json(SubmitResponse {
        status: "submitted".to_string(),
        tx_hash,
    })
    .into_response()
}
