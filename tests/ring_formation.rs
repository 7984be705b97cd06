mod common;

use std::time::Duration;

use tokio::time::{sleep, Instant};
use tonic::Request;

use certring::threads::chord::chord_proto::{GetRequest, GetStatus, HashPosMsg, PutRequest};
use certring::utils::crypto::hash;
use common::*;

#[tokio::test(flavor = "multi_thread")]
async fn singleton_node_owns_the_whole_ring() {
    let node = spawn_node(None);
    let mut client = wait_for_grpc(&node.grpc_address).await;

    // every position resolves to the node itself
    for name in ["alpha", "beta", "gamma"] {
        let owner = client
            .find_successor(Request::new(HashPosMsg {
                key: hash(name.as_bytes()).to_be_bytes().to_vec(),
            }))
            .await
            .unwrap()
            .into_inner()
            .address;
        assert_eq!(owner, node.grpc_address);
    }

    // a pair stored here is served from here
    client
        .put(Request::new(PutRequest {
            key: "alpha".into(),
            value: b"X".to_vec(),
        }))
        .await
        .unwrap();
    let response = client
        .get(Request::new(GetRequest { key: "alpha".into() }))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(response.status, GetStatus::Ok as i32);
    assert_eq!(response.value, b"X".to_vec());
}

#[tokio::test(flavor = "multi_thread")]
async fn lookups_reject_malformed_ring_positions() {
    let node = spawn_node(None);
    let mut client = wait_for_grpc(&node.grpc_address).await;

    let status = client
        .find_successor(Request::new(HashPosMsg { key: vec![1, 2, 3] }))
        .await
        .expect_err("a 3-byte position must be rejected");
    assert_eq!(status.code(), tonic::Code::InvalidArgument);
}

#[tokio::test(flavor = "multi_thread")]
async fn two_nodes_converge_to_a_stable_ring() {
    let a = spawn_node(None);
    let mut client_a = wait_for_grpc(&a.grpc_address).await;
    let b = spawn_node(Some(&a.grpc_address));
    let mut client_b = wait_for_grpc(&b.grpc_address).await;

    // within a few stabilize rounds each node must see the other as both
    // successor and predecessor
    let deadline = Instant::now() + Duration::from_secs(20);
    loop {
        let summary_a = summary(&mut client_a).await;
        let summary_b = summary(&mut client_b).await;

        let stable = immediate_successor(&summary_a) == b.grpc_address
            && immediate_successor(&summary_b) == a.grpc_address
            && predecessor(&summary_a).as_deref() == Some(b.grpc_address.as_str())
            && predecessor(&summary_b).as_deref() == Some(a.grpc_address.as_str());
        if stable {
            break;
        }
        assert!(
            Instant::now() < deadline,
            "two-node ring did not stabilize: a={:?}/{:?} b={:?}/{:?}",
            immediate_successor(&summary_a),
            predecessor(&summary_a),
            immediate_successor(&summary_b),
            predecessor(&summary_b),
        );
        sleep(Duration::from_millis(250)).await;
    }

    // with two members no node is its own successor
    let summary_a = summary(&mut client_a).await;
    assert_ne!(immediate_successor(&summary_a), a.grpc_address);

    // a lookup started at either node agrees on the owner of a key
    let key = hash(b"www.example.org").to_be_bytes().to_vec();
    let owner_via_a = client_a
        .find_successor(Request::new(HashPosMsg { key: key.clone() }))
        .await
        .unwrap()
        .into_inner()
        .address;
    let owner_via_b = client_b
        .find_successor(Request::new(HashPosMsg { key }))
        .await
        .unwrap()
        .into_inner()
        .address;
    assert_eq!(owner_via_a, owner_via_b);
}

#[tokio::test(flavor = "multi_thread")]
async fn the_ring_heals_after_a_node_crash() {
    let a = spawn_node(None);
    wait_for_grpc(&a.grpc_address).await;
    let b = spawn_node(Some(&a.grpc_address));
    wait_for_grpc(&b.grpc_address).await;
    let c = spawn_node(Some(&b.grpc_address));
    wait_for_grpc(&c.grpc_address).await;

    wait_for_stable_ring(&[&a, &b, &c]).await;

    // departure is modeled as a crash, there is no graceful leave
    drop(c);

    // the survivors promote backups and converge to a two-node ring
    wait_for_stable_ring(&[&a, &b]).await;

    // lookups keep working and never name the dead node
    let mut client_a = wait_for_grpc(&a.grpc_address).await;
    for name in ["one", "two", "three", "four"] {
        let owner = client_a
            .find_successor(Request::new(HashPosMsg {
                key: hash(name.as_bytes()).to_be_bytes().to_vec(),
            }))
            .await
            .unwrap()
            .into_inner()
            .address;
        assert!(
            owner == a.grpc_address || owner == b.grpc_address,
            "lookup answered with the crashed node {}",
            owner
        );
    }
}
