use std::error::Error;
use std::sync::{Arc, Mutex};

use log::info;
use tokio::sync::oneshot::Sender;
use tonic::Request;

use crate::node::finger_entry::FingerEntry;
use crate::node::finger_table::FingerTable;
use crate::node::successor_list::SuccessorList;
use crate::threads::chord::chord_proto::Empty;
use crate::threads::chord::connect_with_retry;
use crate::utils::config::Config;
use crate::utils::crypto::hash;
use crate::utils::types::{Address, KvStore};

type SharedState = (
    Arc<Mutex<FingerTable>>,
    Arc<Mutex<Option<FingerEntry>>>,
    Arc<Mutex<KvStore>>,
    Arc<Mutex<SuccessorList>>,
);

/// Creates the shared node state and hands it to the service tasks. Two
/// scenarios:
/// 1. no peer was given, the node starts a new ring as its own successor
/// 2. a peer was given, the node asks it who succeeds our own position and
///    installs the answer as the initial successor
pub async fn setup(
    join_address_option: Option<Address>,
    own_grpc_address: &Address,
    config: &Config,
    tx_grpc_thread: Sender<SharedState>,
    tx_check_predecessor: Sender<Arc<Mutex<Option<FingerEntry>>>>,
    tx_web_interface: Sender<SharedState>,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let own_pos = hash(own_grpc_address.as_bytes());
    info!("Node init: {} ({})", own_grpc_address, own_pos);

    let finger_table_arc = Arc::new(Mutex::new(FingerTable::new(own_grpc_address)));
    let kv_store_arc = Arc::new(Mutex::new(KvStore::new()));
    let predecessor_option_arc: Arc<Mutex<Option<FingerEntry>>> = Arc::new(Mutex::new(None));

    let successor_list = match join_address_option {
        Some(peer_address) => {
            info!("Joining existing ring via {}", peer_address);
            let mut join_peer_client =
                connect_with_retry(&peer_address, config.connect_timeout()).await?;
            let successor_address: Address = join_peer_client
                .find_successor(Request::new(own_pos.into()))
                .await?
                .into_inner()
                .into();
            info!("Join successful, successor is {}", successor_address);

            let mut successor_list = SuccessorList::new(
                own_grpc_address,
                &successor_address,
                config.successor_list_length,
            );
            // seed the backup entries from the successor's own list
            let mut successor_client =
                connect_with_retry(&successor_address, config.connect_timeout()).await?;
            if let Ok(response) = successor_client
                .get_successor_list(Request::new(Empty {}))
                .await
            {
                let reported: Vec<Address> = response
                    .into_inner()
                    .successors
                    .into_iter()
                    .map(Address::from)
                    .collect();
                successor_list.reconcile(&successor_address, &reported);
            }

            finger_table_arc
                .lock()
                .unwrap()
                .set_finger(0, &successor_address);
            successor_list
        }
        None => {
            info!("Starting up a new ring");
            SuccessorList::new(own_grpc_address, own_grpc_address, config.successor_list_length)
        }
    };
    let successor_list_arc = Arc::new(Mutex::new(successor_list));

    tx_grpc_thread
        .send((
            finger_table_arc.clone(),
            predecessor_option_arc.clone(),
            kv_store_arc.clone(),
            successor_list_arc.clone(),
        ))
        .map_err(|_| "grpc task went away before setup finished")?;
    tx_check_predecessor
        .send(predecessor_option_arc.clone())
        .map_err(|_| "check-predecessor task went away before setup finished")?;
    tx_web_interface
        .send((
            finger_table_arc,
            predecessor_option_arc,
            kv_store_arc,
            successor_list_arc,
        ))
        .map_err(|_| "web task went away before setup finished")?;
    Ok(())
}
