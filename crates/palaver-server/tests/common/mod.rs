use std::sync::Arc;
use std::time::Duration;

use palaver_api::{AppState, AppStateInner, build_router};
use palaver_db::Database;
use palaver_gateway::dispatcher::Dispatcher;
use palaver_gossip::SyncCoordinator;
use palaver_node::{SharedNode, shared_node};
use palaver_types::models::Message;

/// A full in-process node served on an ephemeral port.
pub struct TestNode {
    /// Base URL, e.g. `http://127.0.0.1:49152`.
    pub addr: String,
    /// Bare `host:port` form, for WebSocket URLs.
    pub raw_addr: String,
    pub shared: SharedNode,
}

pub async fn spawn_node(peers: &[&str]) -> TestNode {
    let db = Arc::new(Database::open_in_memory().unwrap());
    for peer in peers {
        db.add_peer_if_absent(peer).unwrap();
    }

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let raw_addr = listener.local_addr().unwrap().to_string();
    let addr = format!("http://{raw_addr}");

    let shared = shared_node();
    let sync = SyncCoordinator::new(addr.clone(), Duration::from_millis(500), 3).unwrap();
    let state: AppState = Arc::new(AppStateInner {
        db,
        dispatcher: Dispatcher::new(),
        node: shared.clone(),
        sync,
    });

    let app = build_router(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestNode {
        addr,
        raw_addr,
        shared,
    }
}

pub async fn initialize(client: &reqwest::Client, node: &TestNode, node_id: &str) {
    let response = client
        .post(format!("{}/node/initialize", node.addr))
        .json(&serde_json::json!({ "node_id": node_id }))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
}

pub async fn send_message(
    client: &reqwest::Client,
    node: &TestNode,
    room_id: &str,
    content: &str,
) -> Message {
    let response = client
        .post(format!("{}/messages", node.addr))
        .json(&serde_json::json!({ "room_id": room_id, "content": content }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);
    response.json().await.unwrap()
}

pub async fn get_messages(
    client: &reqwest::Client,
    node: &TestNode,
    room_id: &str,
) -> Vec<Message> {
    client
        .get(format!("{}/messages?room_id={room_id}&limit=100", node.addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}
