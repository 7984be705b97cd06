//! HTTP surface for clients. Uploads and retrievals are routed to the owner
//! through the chord lookup; /info exposes a snapshot of the local view.

use std::sync::{Arc, Mutex};

use actix_web::{get, post, web, HttpResponse, Responder};
use log::info;
use serde::{Deserialize, Serialize};

use crate::node::finger_entry::FingerEntry;
use crate::node::finger_table::FingerTable;
use crate::node::successor_list::SuccessorList;
use crate::threads::client_api::{retrieve_value, store_value};
use crate::utils::config::Config;
use crate::utils::crypto::HashPos;
use crate::utils::types::{Address, KvStore};

pub struct WebState {
    pub local_grpc_address: Address,
    pub own_pos: HashPos,
    pub config: Config,
    pub finger_table: Arc<Mutex<FingerTable>>,
    pub predecessor_option: Arc<Mutex<Option<FingerEntry>>>,
    pub kv_store: Arc<Mutex<KvStore>>,
    pub successor_list: Arc<Mutex<SuccessorList>>,
}

#[derive(Deserialize)]
pub struct UploadForm {
    key: String,
    content: String,
}

#[derive(Serialize)]
struct UploadResponse {
    status: &'static str,
    node: Address,
    id: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[post("/storage/upload")]
pub async fn upload(state: web::Data<WebState>, form: web::Form<UploadForm>) -> impl Responder {
    let form = form.into_inner();
    info!("Client upload request for {}", form.key);

    match store_value(
        &form.key,
        form.content.into_bytes(),
        &state.local_grpc_address,
        &state.config,
    )
    .await
    {
        Ok((owner_address, key_pos)) => HttpResponse::Ok().json(UploadResponse {
            status: "stored",
            node: owner_address,
            id: key_pos.to_string(),
        }),
        Err(status) => HttpResponse::InternalServerError().json(ErrorResponse {
            error: status.to_string(),
        }),
    }
}

#[derive(Deserialize)]
pub struct RetrieveQuery {
    key: String,
}

#[get("/storage/retrieve")]
pub async fn retrieve(
    state: web::Data<WebState>,
    query: web::Query<RetrieveQuery>,
) -> impl Responder {
    match retrieve_value(&query.key, &state.local_grpc_address, &state.config).await {
        Ok(Some(value)) => HttpResponse::Ok()
            .content_type("application/x-pem-file")
            .body(value),
        Ok(None) => HttpResponse::NotFound().json(ErrorResponse {
            error: format!("no certificate stored for {}", query.key),
        }),
        Err(status) => HttpResponse::InternalServerError().json(ErrorResponse {
            error: status.to_string(),
        }),
    }
}

#[derive(Serialize)]
struct FingerInfo {
    id: String,
    address: Address,
}

#[derive(Serialize)]
struct InfoResponse {
    node: Address,
    id: String,
    successor: Address,
    predecessor: Option<Address>,
    finger_sample: Vec<FingerInfo>,
    storage_count: usize,
}

#[get("/info")]
pub async fn info(state: web::Data<WebState>) -> impl Responder {
    let successor = state.successor_list.lock().unwrap().immediate().clone();
    let predecessor = state
        .predecessor_option
        .lock()
        .unwrap()
        .as_ref()
        .map(|predecessor| predecessor.address.clone());
    let finger_sample = state
        .finger_table
        .lock()
        .unwrap()
        .fingers
        .iter()
        .take(5)
        .map(|finger| FingerInfo {
            id: finger.pos.to_string(),
            address: finger.address.clone(),
        })
        .collect();
    let storage_count = state.kv_store.lock().unwrap().len();

    HttpResponse::Ok().json(InfoResponse {
        node: state.local_grpc_address.clone(),
        id: state.own_pos.to_string(),
        successor,
        predecessor,
        finger_sample,
        storage_count,
    })
}
