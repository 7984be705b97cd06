use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::sync::oneshot::Receiver;
use tokio::time::{sleep, timeout};
use tonic::transport::{Channel, Endpoint};
use tonic::{Request, Response, Status};

use crate::node::finger_entry::FingerEntry;
use crate::node::finger_table::FingerTable;
use crate::node::successor_list::SuccessorList;
use crate::threads::chord::chord_proto::chord_client::ChordClient;
use crate::threads::chord::chord_proto::{
    AddressMsg, Empty, GetPredecessorResponse, GetRequest, GetResponse, GetStatus, HashPosMsg,
    NodeSummaryMsg, NotifyRequest, PutRequest, SuccessorListMsg,
};
use crate::utils::config::Config;
use crate::utils::constants::{
    CONNECTION_RETRY_SLEEP_MILLIS, DEBUG_RPCS_UNAVAILABLE_ERROR_MESSAGE, MAX_CONNECT_RETRIES,
};
use crate::utils::crypto::{hash, is_between, HashPos};
use crate::utils::types::{Address, KvStore};

pub mod chord_proto {
    tonic::include_proto!("chord");

    pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("chord_descriptor");
}

/// The struct representing the running node.
pub struct ChordService {
    /// gRPC address of the node
    address: Address,
    /// position in the hash ring, derived from the address
    pos: HashPos,
    /// routing cache, entry i covers `pos + 2^i`
    finger_table: Arc<Mutex<FingerTable>>,
    /// predecessor handle, absent until some node notifies us
    predecessor_option: Arc<Mutex<Option<FingerEntry>>>,
    /// certificate storage
    kv_store: Arc<Mutex<KvStore>>,
    /// round-robin cursor advanced by the fix_fingers procedure
    fix_finger_index: Arc<Mutex<usize>>,
    /// the next r nodes clockwise, entry 0 mirrored into finger[0]
    successor_list: Arc<Mutex<SuccessorList>>,
    /// ring and timing parameters
    config: Config,
    /// flag that enables diagnostic RPCs
    dev_mode: bool,
}

/// connection helper functions

pub async fn connect(
    address: &Address,
    connect_timeout: Duration,
) -> Result<ChordClient<Channel>, tonic::transport::Error> {
    let endpoint = Endpoint::from_shared(format!("http://{}", address))?.connect_timeout(connect_timeout);
    ChordClient::connect(endpoint).await
}

pub async fn connect_with_retry(
    address: &Address,
    connect_timeout: Duration,
) -> Result<ChordClient<Channel>, Status> {
    let mut retries = 0;
    loop {
        match connect(address, connect_timeout).await {
            Ok(client) => return Ok(client),
            Err(e) => {
                retries += 1;
                if retries > MAX_CONNECT_RETRIES {
                    return Err(Status::unavailable(format!(
                        "giving up connecting to {}: {}",
                        address, e
                    )));
                }
                warn!("Failed to connect to {}: {}. Retrying...", address, e);
                sleep(Duration::from_millis(CONNECTION_RETRY_SLEEP_MILLIS)).await;
            }
        }
    }
}

/// Notify adoption rule: a candidate becomes the predecessor when none is
/// set, or when it sits in the open arc between the current predecessor and
/// this node. Repeated calls with the same candidate change nothing.
fn accepts_predecessor(
    current: Option<&FingerEntry>,
    candidate_pos: HashPos,
    own_pos: HashPos,
) -> bool {
    match current {
        None => true,
        Some(existing) => is_between(candidate_pos, existing.pos, own_pos, false),
    }
}

/// A node counts as reachable when it answers a health call within the
/// deadline. Used by failover and by the predecessor check.
pub(crate) async fn is_reachable(address: &Address, deadline: Duration) -> bool {
    match connect(address, deadline).await {
        Ok(mut client) => matches!(
            timeout(deadline, client.health(Request::new(Empty {}))).await,
            Ok(Ok(_))
        ),
        Err(_) => false,
    }
}

impl ChordService {
    pub async fn new(
        rx: Receiver<(
            Arc<Mutex<FingerTable>>,
            Arc<Mutex<Option<FingerEntry>>>,
            Arc<Mutex<KvStore>>,
            Arc<Mutex<SuccessorList>>,
        )>,
        url: &Address,
        config: Config,
        dev_mode: bool,
    ) -> ChordService {
        let (finger_table_arc, predecessor_option_arc, kv_store_arc, successor_list_arc) =
            rx.await.expect("setup task dropped its channel");
        ChordService {
            address: url.clone(),
            pos: hash(url.as_bytes()),
            finger_table: finger_table_arc,
            predecessor_option: predecessor_option_arc,
            kv_store: kv_store_arc,
            fix_finger_index: Arc::new(Mutex::new(0)),
            successor_list: successor_list_arc,
            config,
            dev_mode,
        }
    }

    fn get_successor_address(&self) -> Address {
        self.successor_list.lock().unwrap().immediate().clone()
    }

    fn successor_snapshot(&self) -> Vec<Address> {
        self.successor_list.lock().unwrap().successors.clone()
    }

    /// keeps finger[0] identical to the head of the successor list
    fn sync_first_finger(&self) {
        let head = self.get_successor_address();
        self.finger_table.lock().unwrap().set_finger(0, &head);
    }

    fn set_successor(&self, new_successor_address: &Address) {
        self.successor_list
            .lock()
            .unwrap()
            .adopt_immediate(new_successor_address);
        self.sync_first_finger();
    }

    /// The successor stopped answering. Walk the successor list for the
    /// first live backup; if the whole list is dead, fall back to any live
    /// finger that is neither us nor the dead node. If nothing answers the
    /// ring is broken and the next stabilize tick retries.
    async fn handle_successor_failure(&self, dead: &Address) {
        let ping_deadline = self.config.ping_timeout();

        let successors = self.successor_snapshot();
        for (index, candidate) in successors.iter().enumerate().skip(1) {
            if candidate == dead {
                continue;
            }
            if is_reachable(candidate, ping_deadline).await {
                info!("Promoting {} from the successor list", candidate);
                {
                    self.successor_list.lock().unwrap().promote(index);
                }
                self.sync_first_finger();
                return;
            }
        }

        let mut candidates: Vec<Address> = Vec::new();
        {
            let finger_table_guard = self.finger_table.lock().unwrap();
            for finger in finger_table_guard.fingers.iter() {
                if finger.address == self.address || finger.address == *dead {
                    continue;
                }
                if !candidates.contains(&finger.address) {
                    candidates.push(finger.address.clone());
                }
            }
        }
        for candidate in candidates {
            if is_reachable(&candidate, ping_deadline).await {
                info!("Healing the ring, finger {} becomes the successor", candidate);
                {
                    self.successor_list.lock().unwrap().reset(&candidate);
                }
                self.sync_first_finger();
                return;
            }
        }

        error!(
            "No alternative successor found, the ring is broken; keeping {} and retrying",
            dead
        );
    }
}

#[tonic::async_trait]
impl chord_proto::chord_server::Chord for ChordService {
    /// Finds the node responsible for a given position in the hash ring.
    /// Forwarding failures are answered with the own successor instead of an
    /// error; a stale finger is repaired by fix_fingers, not here.
    async fn find_successor(
        &self,
        request: Request<HashPosMsg>,
    ) -> Result<Response<AddressMsg>, Status> {
        let key = HashPos::from_be_slice(&request.into_inner().key)
            .ok_or_else(|| Status::invalid_argument("ring position must be 20 bytes"))?;

        let successor_address = self.get_successor_address();
        let successor_pos = hash(successor_address.as_bytes());

        if is_between(key, self.pos, successor_pos, true) {
            debug!("Lookup for {} ends at the immediate successor", key);
            return Ok(Response::new(successor_address.into()));
        }

        let closest_option = {
            self.finger_table
                .lock()
                .unwrap()
                .closest_preceding_finger(&self.pos, &key)
        };
        let closest = match closest_option {
            Some(finger) if finger.pos != self.pos => finger,
            // no finger precedes the key, the successor is the best answer we have
            _ => return Ok(Response::new(successor_address.into())),
        };

        let forwarded = match connect(&closest.address, self.config.connect_timeout()).await {
            Ok(mut client) => {
                timeout(
                    self.config.lookup_timeout(),
                    client.find_successor(Request::new(key.into())),
                )
                .await
            }
            Err(e) => {
                warn!("Finger {} is unreachable ({}), answering with the successor", closest.address, e);
                return Ok(Response::new(successor_address.into()));
            }
        };

        match forwarded {
            Ok(Ok(response)) => Ok(Response::new(response.into_inner())),
            Ok(Err(status)) => {
                warn!("Forwarded lookup via {} failed: {}", closest.address, status);
                Ok(Response::new(successor_address.into()))
            }
            Err(_) => {
                warn!("Forwarded lookup via {} timed out", closest.address);
                Ok(Response::new(successor_address.into()))
            }
        }
    }

    /// returns current node's value of the predecessor handle
    async fn get_predecessor(
        &self,
        _request: Request<Empty>,
    ) -> Result<Response<GetPredecessorResponse>, Status> {
        let address_optional = self
            .predecessor_option
            .lock()
            .unwrap()
            .as_ref()
            .map(|predecessor| predecessor.address.clone().into());
        Ok(Response::new(GetPredecessorResponse { address_optional }))
    }

    /// returns the current node's successor list
    async fn get_successor_list(
        &self,
        _: Request<Empty>,
    ) -> Result<Response<SuccessorListMsg>, Status> {
        Ok(Response::new((&*self.successor_list.lock().unwrap()).into()))
    }

    /// A peer believes it is our predecessor. Adopt it when we have none or
    /// when it sits between the current predecessor and us. Duplicate calls
    /// are harmless.
    async fn notify(&self, request: Request<NotifyRequest>) -> Result<Response<Empty>, Status> {
        let caller: Address = request
            .into_inner()
            .address
            .ok_or_else(|| Status::invalid_argument("notify without a sender address"))?
            .into();
        let caller_pos = hash(caller.as_bytes());

        let mut predecessor_guard = self.predecessor_option.lock().unwrap();
        let adopt = accepts_predecessor(predecessor_guard.as_ref(), caller_pos, self.pos);
        if adopt {
            let changed = predecessor_guard
                .as_ref()
                .map(|current| current.address != caller)
                .unwrap_or(true);
            if changed {
                info!("New predecessor: {}", caller);
            }
            *predecessor_guard = Some(FingerEntry::new(&caller));
        }
        Ok(Response::new(Empty {}))
    }

    /// dummy call, used to check if the receiver node is still available
    async fn health(&self, _: Request<Empty>) -> Result<Response<Empty>, Status> {
        Ok(Response::new(Empty {}))
    }

    /// Validates the successor pointer and repairs the ring. Asks the
    /// successor for its predecessor, adopts a node that slipped in between,
    /// refreshes the successor list and finally notifies the successor about
    /// us. A dead successor triggers failover instead.
    async fn stabilize(&self, _: Request<Empty>) -> Result<Response<Empty>, Status> {
        let successor_address = self.get_successor_address();
        let lookup_deadline = self.config.lookup_timeout();

        let predecessor_reply = match connect(&successor_address, self.config.connect_timeout()).await {
            Ok(mut client) => {
                match timeout(lookup_deadline, client.get_predecessor(Request::new(Empty {}))).await {
                    Ok(Ok(response)) => response
                        .into_inner()
                        .address_optional
                        .map(Address::from),
                    Ok(Err(status)) => {
                        warn!("Successor {} failed get_predecessor: {}", successor_address, status);
                        self.handle_successor_failure(&successor_address).await;
                        return Ok(Response::new(Empty {}));
                    }
                    Err(_) => {
                        warn!("Successor {} did not answer get_predecessor in time", successor_address);
                        self.handle_successor_failure(&successor_address).await;
                        return Ok(Response::new(Empty {}));
                    }
                }
            }
            Err(e) => {
                warn!("Successor {} is not responding: {}. Starting repair...", successor_address, e);
                self.handle_successor_failure(&successor_address).await;
                return Ok(Response::new(Empty {}));
            }
        };

        if let Some(x) = predecessor_reply {
            let x_pos = hash(x.as_bytes());
            let successor_pos = hash(successor_address.as_bytes());
            if is_between(x_pos, self.pos, successor_pos, false) {
                info!("Adopting {} as immediate successor", x);
                self.set_successor(&x);
            }
        }

        let successor_address = self.get_successor_address();
        match connect(&successor_address, self.config.connect_timeout()).await {
            Ok(mut client) => {
                if let Ok(Ok(response)) =
                    timeout(lookup_deadline, client.get_successor_list(Request::new(Empty {}))).await
                {
                    let reported: Vec<Address> = response
                        .into_inner()
                        .successors
                        .into_iter()
                        .map(Address::from)
                        .collect();
                    self.successor_list
                        .lock()
                        .unwrap()
                        .reconcile(&successor_address, &reported);
                }

                let notify_request = NotifyRequest {
                    address: Some(self.address.clone().into()),
                };
                match timeout(lookup_deadline, client.notify(Request::new(notify_request))).await {
                    Ok(Ok(_)) => {}
                    Ok(Err(status)) => debug!("Notify to {} failed: {}", successor_address, status),
                    Err(_) => debug!("Notify to {} timed out", successor_address),
                }
            }
            Err(e) => debug!("Successor {} went away before notify: {}", successor_address, e),
        }

        Ok(Response::new(Empty {}))
    }

    /// Updates the finger table entries one after another in a round robin
    /// fashion by looking up the node responsible for the position each
    /// entry covers. On failure the entry is left alone and retried next tick.
    async fn fix_fingers(&self, _: Request<Empty>) -> Result<Response<Empty>, Status> {
        let index = (*self.fix_finger_index.lock().unwrap() + 1) % HashPos::finger_count();
        let lookup_position = self.pos.add_power_of_two(index);
        debug!("Fixing finger entry {}", index);

        match self
            .find_successor(Request::new(lookup_position.into()))
            .await
        {
            Ok(response) => {
                let responsible_node_address: Address = response.into_inner().into();
                *self.fix_finger_index.lock().unwrap() = index;
                if index == 0 {
                    // finger[0] is the immediate successor, keep both in step
                    self.set_successor(&responsible_node_address);
                } else {
                    self.finger_table
                        .lock()
                        .unwrap()
                        .set_finger(index, &responsible_node_address);
                }
            }
            Err(e) => warn!("An error occurred during fix_fingers: {}", e),
        }
        Ok(Response::new(Empty {}))
    }

    /// Stores a certificate on this node. Routing happened on the caller's
    /// side; a store that races a membership change stays where it landed.
    async fn put(&self, request: Request<PutRequest>) -> Result<Response<Empty>, Status> {
        let request = request.into_inner();
        info!(
            "Storing {} ({}) locally, {} bytes",
            request.key,
            hash(request.key.as_bytes()),
            request.value.len()
        );
        self.kv_store.lock().unwrap().insert(request.key, request.value);
        Ok(Response::new(Empty {}))
    }

    /// Serves a certificate from local storage.
    async fn get(&self, request: Request<GetRequest>) -> Result<Response<GetResponse>, Status> {
        let key = request.into_inner().key;
        let value_option = self.kv_store.lock().unwrap().get(&key).cloned();
        match value_option {
            Some(value) => {
                info!("Serving {} from local storage", key);
                Ok(Response::new(GetResponse {
                    value,
                    status: GetStatus::Ok.into(),
                }))
            }
            None => {
                warn!("Received GET request for {}, but nothing is stored", key);
                Ok(Response::new(GetResponse {
                    value: Vec::new(),
                    status: GetStatus::NotFound.into(),
                }))
            }
        }
    }

    /// returns a machine readable node summary (requires --dev)
    async fn get_node_summary(&self, _: Request<Empty>) -> Result<Response<NodeSummaryMsg>, Status> {
        if !self.dev_mode {
            return Err(Status::unimplemented(DEBUG_RPCS_UNAVAILABLE_ERROR_MESSAGE));
        }
        let finger_table_guard = self.finger_table.lock().unwrap();
        let predecessor_option = self.predecessor_option.lock().unwrap();
        let successor_list = self.successor_list.lock().unwrap();
        let kv_store_size = self.kv_store.lock().unwrap().len() as u32;

        Ok(Response::new(NodeSummaryMsg {
            url: self.address.clone(),
            pos: Some(self.pos.into()),
            predecessor: predecessor_option.as_ref().map(|predecessor| predecessor.into()),
            finger_entries: finger_table_guard.fingers.iter().map(|finger| finger.into()).collect(),
            successor_list: Some((&*successor_list).into()),
            kv_store_size,
        }))
    }
}
