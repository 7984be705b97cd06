//! Shared harness: spawns real node processes on free ports and waits for
//! them to answer. Processes die with the test thanks to kill_on_drop.

use std::net::TcpListener;
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::time::sleep;
use tonic::transport::Channel;
use tonic::Request;

use certring::threads::chord::chord_proto::chord_client::ChordClient;
use certring::threads::chord::chord_proto::{Empty, NodeSummaryMsg};
use certring::utils::crypto::hash;

pub struct TestNode {
    pub grpc_address: String,
    pub web_address: String,
    _child: Child,
}

pub fn free_address() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("no free port available");
    let address = format!("127.0.0.1:{}", listener.local_addr().unwrap().port());
    drop(listener);
    address
}

pub fn spawn_node(peer: Option<&str>) -> TestNode {
    let grpc_address = free_address();
    let web_address = free_address();

    let mut command = Command::new(env!("CARGO_BIN_EXE_certring"));
    command
        .args(["--grpc", &grpc_address])
        .args(["--web", &web_address])
        .arg("--dev")
        .env("RUST_LOG", "warn")
        .kill_on_drop(true);
    if let Some(peer) = peer {
        command.args(["--peer", peer]);
    }

    let child = command.spawn().expect("failed to start node process");
    TestNode {
        grpc_address,
        web_address,
        _child: child,
    }
}

pub async fn wait_for_grpc(address: &str) -> ChordClient<Channel> {
    for _ in 0..100 {
        if let Ok(mut client) = ChordClient::connect(format!("http://{}", address)).await {
            if client.health(Request::new(Empty {})).await.is_ok() {
                return client;
            }
        }
        sleep(Duration::from_millis(100)).await;
    }
    panic!("node on {} never became healthy", address);
}

pub async fn summary(client: &mut ChordClient<Channel>) -> NodeSummaryMsg {
    client
        .get_node_summary(Request::new(Empty {}))
        .await
        .expect("node summary failed")
        .into_inner()
}

pub fn immediate_successor(summary: &NodeSummaryMsg) -> String {
    summary
        .successor_list
        .as_ref()
        .and_then(|list| list.successors.first())
        .map(|msg| msg.address.clone())
        .expect("summary without a successor")
}

pub fn predecessor(summary: &NodeSummaryMsg) -> Option<String> {
    summary.predecessor.as_ref().map(|entry| entry.address.clone())
}

/// Waits until every node's successor and predecessor pointer matches the
/// ring order implied by the nodes' positions.
pub async fn wait_for_stable_ring(nodes: &[&TestNode]) {
    let mut ordered: Vec<&&TestNode> = nodes.iter().collect();
    ordered.sort_by_key(|node| hash(node.grpc_address.as_bytes()));

    let deadline = tokio::time::Instant::now() + Duration::from_secs(30);
    'outer: loop {
        assert!(
            tokio::time::Instant::now() < deadline,
            "ring of {} nodes did not stabilize in time",
            nodes.len()
        );
        sleep(Duration::from_millis(250)).await;

        for (i, node) in ordered.iter().enumerate() {
            let next = ordered[(i + 1) % ordered.len()];
            let mut client = wait_for_grpc(&node.grpc_address).await;
            let node_summary = summary(&mut client).await;
            if immediate_successor(&node_summary) != next.grpc_address {
                continue 'outer;
            }
            let previous = ordered[(i + ordered.len() - 1) % ordered.len()];
            if predecessor(&node_summary).as_deref() != Some(previous.grpc_address.as_str()) {
                continue 'outer;
            }
        }
        return;
    }
}
