mod common;

use common::*;

const PEM: &str = "-----BEGIN CERTIFICATE-----\nMIIBfakecertbody\n-----END CERTIFICATE-----\n";

#[tokio::test(flavor = "multi_thread")]
async fn uploads_are_routed_to_the_owner_and_retrievable_anywhere() {
    let a = spawn_node(None);
    wait_for_grpc(&a.grpc_address).await;
    let b = spawn_node(Some(&a.grpc_address));
    wait_for_grpc(&b.grpc_address).await;
    let c = spawn_node(Some(&b.grpc_address));
    wait_for_grpc(&c.grpc_address).await;

    wait_for_stable_ring(&[&a, &b, &c]).await;

    let http = reqwest::Client::new();
    let key = "db.internal.example";

    // upload through node a; the response names the storing node
    let upload: serde_json::Value = http
        .post(format!("http://{}/storage/upload", a.web_address))
        .form(&[("key", key), ("content", PEM)])
        .send()
        .await
        .expect("upload request failed")
        .json()
        .await
        .expect("upload answered non-json");
    assert_eq!(upload["status"], "stored");

    let owner = upload["node"].as_str().expect("upload response names no node").to_string();
    assert!(
        [&a, &b, &c].iter().any(|node| node.grpc_address == owner),
        "unknown owner {}",
        owner
    );

    // retrieval through a node other than the one we uploaded to
    let via = if owner == c.grpc_address { &b } else { &c };
    let response = http
        .get(format!("http://{}/storage/retrieve", via.web_address))
        .query(&[("key", key)])
        .send()
        .await
        .expect("retrieve request failed");
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), PEM);

    // exactly one node stores the pair, and it is the one the upload named
    let mut total = 0;
    for node in [&a, &b, &c] {
        let mut client = wait_for_grpc(&node.grpc_address).await;
        let node_summary = summary(&mut client).await;
        if node.grpc_address == owner {
            assert_eq!(node_summary.kv_store_size, 1, "owner lost the pair");
        }
        total += node_summary.kv_store_size;
    }
    assert_eq!(total, 1);

    // a miss is answered with 404
    let missing = http
        .get(format!("http://{}/storage/retrieve", a.web_address))
        .query(&[("key", "unknown.example")])
        .send()
        .await
        .expect("retrieve request failed");
    assert_eq!(missing.status(), 404);
}
