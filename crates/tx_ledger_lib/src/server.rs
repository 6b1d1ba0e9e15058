use crate::err_create;
use crate::error::{LedgerError, TrackerError};
use crate::eth::{format_address, parse_address};
use crate::oracle::ChainOracle;
use crate::query::{
    count_transactions, get_transaction, list_transactions, AddressQuery, AddressQueryParams,
};
use crate::runtime::SharedState;
use crate::service::submit_transaction_hex;
use crate::setup::TrackerSetup;
use crate::store::LedgerStore;
use actix_web::http::StatusCode;
use actix_web::web::Data;
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Mutex;

pub struct ServerData {
    pub shared_state: Arc<Mutex<SharedState>>,
    pub store: LedgerStore,
    pub oracle: Arc<dyn ChainOracle>,
    pub setup: TrackerSetup,
}

#[derive(Deserialize, Debug)]
pub struct SubmitTxRequest {
    pub tx: String,
}

fn error_status(err: &TrackerError) -> (StatusCode, &'static str) {
    if let Some(err) = err.ledger_error() {
        return match err {
            LedgerError::InvalidAddress(_) => (StatusCode::NOT_FOUND, "invalid_address"),
            LedgerError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            LedgerError::InvalidFilter(_) => (StatusCode::BAD_REQUEST, "invalid_filter"),
            LedgerError::InvalidPagination(_) => (StatusCode::BAD_REQUEST, "invalid_pagination"),
            LedgerError::MalformedTransaction(_) => {
                (StatusCode::BAD_REQUEST, "malformed_transaction")
            }
            LedgerError::RelayRejected(_) => (StatusCode::BAD_REQUEST, "relay_rejected"),
            LedgerError::DuplicateHash(_) | LedgerError::InvalidTransition { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
        };
    }
    match err.oracle_error() {
        Some(err) if err.is_transient() => (StatusCode::SERVICE_UNAVAILABLE, "node_unavailable"),
        Some(_) => (StatusCode::BAD_GATEWAY, "node_error"),
        None => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
    }
}

fn error_response(err: &TrackerError) -> HttpResponse {
    let (status, kind) = error_status(err);
    if status.is_server_error() {
        log::error!("Request failed: {:?}", err);
    } else {
        log::debug!("Request rejected: {}", err);
    }
    HttpResponse::build(status).json(json!({
        "error": kind,
        "reason": err.to_string(),
    }))
}

macro_rules! return_on_error {
    ( $e:expr ) => {
        match $e {
            Ok(x) => x,
            Err(err) => return error_response(&err),
        }
    };
}

pub async fn address_transactions(
    data: Data<Box<ServerData>>,
    path: web::Path<String>,
    params: web::Query<AddressQueryParams>,
) -> HttpResponse {
    let query = return_on_error!(
        AddressQuery::parse(&path.into_inner(), &params).map_err(|e| err_create!(e))
    );
    let txs = return_on_error!(list_transactions(&data.store, &query).await);
    let total = return_on_error!(count_transactions(&data.store, &query).await);
    HttpResponse::Ok().json(json!({
        "transactions": txs,
        "total": total,
    }))
}

pub async fn tx_details(data: Data<Box<ServerData>>, path: web::Path<String>) -> HttpResponse {
    let tx = return_on_error!(get_transaction(&data.store, &path.into_inner()).await);
    HttpResponse::Ok().json(json!({
        "transaction": tx,
    }))
}

pub async fn submit_tx(
    data: Data<Box<ServerData>>,
    body: web::Json<SubmitTxRequest>,
) -> HttpResponse {
    let tx_hash = return_on_error!(
        submit_transaction_hex(
            &data.store,
            data.oracle.as_ref(),
            data.setup.chain_setup.chain_id,
            &body.tx,
        )
        .await
    );
    HttpResponse::Ok().json(json!({
        "txHash": tx_hash,
    }))
}

pub async fn watch_address(data: Data<Box<ServerData>>, path: web::Path<String>) -> HttpResponse {
    let address = return_on_error!(parse_address(&path.into_inner()).map_err(|e| err_create!(e)));
    let address = format_address(&address);
    let added = return_on_error!(data.store.add_watched_address(&address).await);
    if added {
        log::info!("Watching address {}", address);
    }
    HttpResponse::Ok().json(json!({
        "address": address,
        "added": added,
    }))
}

pub async fn status_endpoint(data: Data<Box<ServerData>>) -> HttpResponse {
    let shared_state = data.shared_state.lock().await.clone();
    HttpResponse::Ok().json(json!({
        "sharedState": shared_state,
    }))
}

pub async fn config_endpoint(data: Data<Box<ServerData>>) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "config": data.setup,
    }))
}

pub fn configure_api(cfg: &mut web::ServiceConfig) {
    cfg.route("/address/{address}", web::get().to(address_transactions))
        .route("/tx", web::post().to(submit_tx))
        .route("/tx/{tx_hash}", web::get().to(tx_details))
        .route("/watch/{address}", web::post().to(watch_address))
        .route("/status", web::get().to(status_endpoint))
        .route("/config", web::get().to(config_endpoint));
}
