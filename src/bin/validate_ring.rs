//! Ring-walking diagnostic. Queries a set of nodes for their summaries and
//! verifies that successor pointers, predecessor pointers and successor
//! lists agree with the ring order of the nodes' positions. The nodes must
//! run with --dev.

use std::env;
use std::process::exit;

use tonic::Request;

use certring::threads::chord::chord_proto::chord_client::ChordClient;
use certring::threads::chord::chord_proto::{Empty, NodeSummaryMsg};
use certring::utils::crypto::HashPos;

#[tokio::main]
async fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() == 1 {
        eprintln!("Usage: validate_ring <grpc-address>...");
        exit(2);
    }

    let mut node_summaries: Vec<NodeSummaryMsg> = Vec::new();
    for address in args.iter().skip(1) {
        let mut client = match ChordClient::connect(format!("http://{}", address)).await {
            Ok(client) => client,
            Err(e) => {
                eprintln!("{} is unreachable: {}", address, e);
                exit(1);
            }
        };
        match client.get_node_summary(Request::new(Empty {})).await {
            Ok(response) => node_summaries.push(response.into_inner()),
            Err(status) => {
                eprintln!("{} refused a summary ({}); run the nodes with --dev", address, status);
                exit(1);
            }
        }
    }

    node_summaries.sort_by_key(summary_pos);

    let mut is_valid = true;

    // each node's immediate successor must be the next node in ring order,
    // and that successor must point back at the node as its predecessor
    for i in 0..node_summaries.len() {
        let current = &node_summaries[i];
        let next = &node_summaries[(i + 1) % node_summaries.len()];

        match immediate_successor(current) {
            Some(successor) if successor == next.url => {}
            successor => {
                eprintln!(
                    "{} points at successor {:?}, expected {}",
                    current.url, successor, next.url
                );
                is_valid = false;
            }
        }

        let predecessor = next.predecessor.as_ref().map(|entry| entry.address.clone());
        if predecessor.as_deref() != Some(current.url.as_str()) {
            eprintln!(
                "{} has predecessor {:?}, expected {}",
                next.url, predecessor, current.url
            );
            is_valid = false;
        }
    }

    // walking successor pointers from any start must visit every node
    // exactly once before returning to the start
    let start = node_summaries[0].url.clone();
    let mut visited = vec![start.clone()];
    let mut cursor = successor_of(&node_summaries, &start);
    while let Some(address) = cursor {
        if address == start {
            break;
        }
        if visited.contains(&address) {
            eprintln!("Ring walk loops early at {}", address);
            is_valid = false;
            break;
        }
        visited.push(address.clone());
        cursor = successor_of(&node_summaries, &address);
    }
    if visited.len() != node_summaries.len() {
        eprintln!(
            "Ring walk visited {} of {} nodes",
            visited.len(),
            node_summaries.len()
        );
        is_valid = false;
    }

    if is_valid {
        println!("Looks good!");
    } else {
        eprintln!("Ring is invalid!");
        exit(1);
    }
}

fn summary_pos(summary: &NodeSummaryMsg) -> HashPos {
    summary
        .pos
        .as_ref()
        .and_then(|pos| HashPos::from_be_slice(&pos.key))
        .unwrap_or_default()
}

fn immediate_successor(summary: &NodeSummaryMsg) -> Option<String> {
    summary
        .successor_list
        .as_ref()
        .and_then(|list| list.successors.first())
        .map(|msg| msg.address.clone())
}

fn successor_of(summaries: &[NodeSummaryMsg], address: &str) -> Option<String> {
    summaries
        .iter()
        .find(|summary| summary.url == address)
        .and_then(immediate_successor)
}
