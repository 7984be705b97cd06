//! Client-side plumbing for the storage operations: hash the common name,
//! resolve the owner through the local node and talk to the owner directly.
//! Routing is a single hop from here, the lookup already returned the
//! terminal owner.

use log::debug;
use tonic::transport::Channel;
use tonic::{Request, Status};

use crate::threads::chord::chord_proto::chord_client::ChordClient;
use crate::threads::chord::chord_proto::{GetRequest, GetStatus, PutRequest};
use crate::threads::chord::connect_with_retry;
use crate::utils::config::Config;
use crate::utils::crypto::{hash, HashPos};
use crate::utils::types::Address;

/// Asks the local node who owns `pos` and returns a client connected to that
/// owner together with its address.
pub async fn perform_chord_look_up(
    pos: &HashPos,
    local_grpc_address: &Address,
    config: &Config,
) -> Result<(ChordClient<Channel>, Address), Status> {
    let mut local_client = connect_with_retry(local_grpc_address, config.connect_timeout()).await?;
    let owner_address: Address = local_client
        .find_successor(Request::new((*pos).into()))
        .await?
        .into_inner()
        .into();
    debug!("Owner of {} is {}", pos, owner_address);

    let owner_client = connect_with_retry(&owner_address, config.connect_timeout()).await?;
    Ok((owner_client, owner_address))
}

/// Stores a certificate at the node owning its common name. Returns the
/// owner and the ring position the name hashed to.
pub async fn store_value(
    key: &str,
    value: Vec<u8>,
    local_grpc_address: &Address,
    config: &Config,
) -> Result<(Address, HashPos), Status> {
    let key_pos = hash(key.as_bytes());
    let (mut owner_client, owner_address) =
        perform_chord_look_up(&key_pos, local_grpc_address, config).await?;

    owner_client
        .put(Request::new(PutRequest {
            key: key.to_string(),
            value,
        }))
        .await?;
    Ok((owner_address, key_pos))
}

/// Fetches a certificate from the node owning its common name.
pub async fn retrieve_value(
    key: &str,
    local_grpc_address: &Address,
    config: &Config,
) -> Result<Option<Vec<u8>>, Status> {
    let key_pos = hash(key.as_bytes());
    let (mut owner_client, _) = perform_chord_look_up(&key_pos, local_grpc_address, config).await?;

    let response = owner_client
        .get(Request::new(GetRequest {
            key: key.to_string(),
        }))
        .await?
        .into_inner();

    match GetStatus::from_i32(response.status) {
        Some(GetStatus::Ok) => Ok(Some(response.value)),
        Some(GetStatus::NotFound) => Ok(None),
        None => Err(Status::internal("owner answered with an unknown status")),
    }
}
