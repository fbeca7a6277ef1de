//! End-to-end behaviour of several nodes sharing one in-memory mesh.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use roomchat_client::{profile, spawn_node, NodeConfig, NodeHandle, NodeNotification, NodeSnapshot};
use roomchat_net::MemoryMesh;
use roomchat_shared::{ConnectionState, Room};
use roomchat_store::Database;

fn start(mesh: &MemoryMesh, name: &str) -> (NodeHandle, mpsc::Receiver<NodeNotification>) {
    start_with(mesh, name, "local-chat")
}

fn start_with(
    mesh: &MemoryMesh,
    name: &str,
    service_type: &str,
) -> (NodeHandle, mpsc::Receiver<NodeNotification>) {
    let db = Database::open_in_memory().unwrap();
    let user = profile::load_or_create(&db, Some(name)).unwrap();
    let (transport, events) = mesh.attach(name, service_type);
    spawn_node(&NodeConfig::default(), db, user, Arc::new(transport), events)
}

/// Poll `node` until `done` holds for its snapshot.
async fn wait_for(node: &NodeHandle, done: impl Fn(&NodeSnapshot) -> bool) -> NodeSnapshot {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let snap = node.snapshot().await.unwrap();
            if done(&snap) {
                return snap;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time")
}

async fn connected_pair(room: Room) -> (MemoryMesh, NodeHandle, NodeHandle) {
    let mesh = MemoryMesh::new();
    let (alice, _) = start(&mesh, "alice");
    let (bob, _) = start(&mesh, "bob");

    alice.join_room(room).await.unwrap();
    bob.join_room(room).await.unwrap();

    wait_for(&alice, |s| s.state == ConnectionState::Connected).await;
    wait_for(&bob, |s| s.state == ConnectionState::Connected).await;
    (mesh, alice, bob)
}

#[tokio::test]
async fn two_nodes_in_one_room_exchange_messages() {
    let (_mesh, alice, bob) = connected_pair(Room::A).await;

    let sent = alice.send_text("hi").await.unwrap().unwrap();
    assert!(sent.is_from_current_user);

    let snap = wait_for(&bob, |s| !s.messages.is_empty()).await;
    let got = &snap.messages[0];
    assert_eq!(got.id, sent.id);
    assert_eq!(got.timestamp, sent.timestamp);
    assert_eq!(got.sender_id, sent.sender_id);
    assert_eq!(got.sender_name, "alice");
    assert_eq!(got.room, Room::A);
    assert_eq!(got.text.as_deref(), Some("hi"));
    assert!(!got.is_from_current_user);

    assert_eq!(bob.load_messages(Room::A).await.unwrap().len(), 1);

    let reply = bob
        .send_message(Some("look".into()), Some(vec![1, 2, 3, 4]))
        .await
        .unwrap()
        .unwrap();
    let snap = wait_for(&alice, |s| s.messages.len() == 2).await;
    assert_eq!(snap.messages[1].id, reply.id);
    assert_eq!(snap.messages[1].attachment, Some(vec![1, 2, 3, 4]));
}

#[tokio::test]
async fn message_for_closed_room_is_stored_silently() {
    let (_mesh, alice, bob) = connected_pair(Room::D).await;

    // Bob stays joined to D but looks at B's history.
    bob.load_messages(Room::B).await.unwrap();
    alice.send_text("are you there").await.unwrap().unwrap();

    tokio::time::timeout(Duration::from_secs(5), async {
        while bob.message_count(Room::D).await.unwrap() == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("message never stored");

    let snap = bob.snapshot().await.unwrap();
    assert_eq!(snap.open_room, Some(Room::B));
    assert!(snap.messages.is_empty());
    assert_eq!(bob.load_messages(Room::D).await.unwrap().len(), 1);
}

#[tokio::test]
async fn browsing_counts_peers_without_joining() {
    let mesh = MemoryMesh::new();
    let (alice, _) = start(&mesh, "alice");
    let (bob, _) = start(&mesh, "bob");
    let (carol, _) = start(&mesh, "carol");

    alice.join_room(Room::C).await.unwrap();
    bob.join_room(Room::C).await.unwrap();

    let snap = wait_for(&carol, |s| s.peer_count(Room::C) == 2).await;
    assert_eq!(snap.state, ConnectionState::Disconnected);
    assert_eq!(snap.peer_count(Room::A), 0);

    bob.leave_room().await.unwrap();
    wait_for(&carol, |s| s.peer_count(Room::C) == 1).await;
}

#[tokio::test]
async fn peers_in_other_rooms_do_not_connect() {
    let mesh = MemoryMesh::new();
    let (alice, _) = start(&mesh, "alice");
    let (bob, _) = start(&mesh, "bob");

    assert_eq!(alice.join_room(Room::A).await.unwrap(), ConnectionState::Waiting);
    assert_eq!(bob.join_room(Room::B).await.unwrap(), ConnectionState::Waiting);

    wait_for(&alice, |s| s.peer_count(Room::B) == 1).await;
    let snap = alice.snapshot().await.unwrap();
    assert_eq!(snap.state, ConnectionState::Waiting);
    assert!(snap.connected.is_empty());

    // Nobody to send to: stored locally, never delivered.
    alice.send_text("anyone?").await.unwrap().unwrap();
    assert_eq!(bob.message_count(Room::A).await.unwrap(), 0);
    assert_eq!(alice.message_count(Room::A).await.unwrap(), 1);
}

#[tokio::test]
async fn different_service_types_never_meet() {
    let mesh = MemoryMesh::new();
    let (alice, _) = start_with(&mesh, "alice", "local-chat");
    let (bob, _) = start_with(&mesh, "bob", "other-app");

    alice.join_room(Room::A).await.unwrap();
    bob.join_room(Room::A).await.unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(bob.snapshot().await.unwrap().peer_count(Room::A), 0);
    assert_eq!(alice.snapshot().await.unwrap().state, ConnectionState::Waiting);
}

#[tokio::test]
async fn leaving_drops_the_peer_and_rejoining_reconnects() {
    let (_mesh, alice, bob) = connected_pair(Room::F).await;

    bob.leave_room().await.unwrap();
    let snap = wait_for(&alice, |s| s.connected.is_empty()).await;
    assert_eq!(snap.state, ConnectionState::Waiting);
    assert_eq!(snap.room, Some(Room::F));

    bob.join_room(Room::F).await.unwrap();
    wait_for(&alice, |s| s.state == ConnectionState::Connected).await;
    wait_for(&bob, |s| s.state == ConnectionState::Connected).await;
}

#[tokio::test]
async fn switching_rooms_moves_the_session() {
    let (_mesh, alice, bob) = connected_pair(Room::A).await;

    alice.join_room(Room::G).await.unwrap();
    wait_for(&bob, |s| s.connected.is_empty()).await;

    bob.join_room(Room::G).await.unwrap();
    let snap = wait_for(&alice, |s| s.state == ConnectionState::Connected).await;
    assert_eq!(snap.room, Some(Room::G));
    assert_eq!(snap.connected.len(), 1);
    assert_eq!(snap.connected[0].display_name, "bob");
}

#[tokio::test]
async fn deletes_stay_local() {
    let (_mesh, alice, bob) = connected_pair(Room::H).await;

    let sent = alice.send_text("keep me").await.unwrap().unwrap();
    wait_for(&bob, |s| s.messages.len() == 1).await;

    assert!(alice.delete_message(sent.id).await.unwrap());
    assert!(alice.snapshot().await.unwrap().messages.is_empty());
    assert_eq!(bob.message_count(Room::H).await.unwrap(), 1);

    assert_eq!(bob.delete_all_messages().await.unwrap(), 1);
    assert!(bob.load_messages(Room::H).await.unwrap().is_empty());
}

#[tokio::test]
async fn same_display_name_counts_as_two_peers() {
    let mesh = MemoryMesh::new();
    let (watcher, _) = start(&mesh, "watcher");
    let (first, _) = start(&mesh, "phone");
    let (second, _) = start(&mesh, "phone");

    first.join_room(Room::E).await.unwrap();
    second.join_room(Room::E).await.unwrap();

    wait_for(&watcher, |s| s.peer_count(Room::E) == 2).await;
    wait_for(&first, |s| s.connected.len() == 1).await;
}
