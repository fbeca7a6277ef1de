//! # roomchat
//!
//! Runs several chat nodes in one process over an in-memory mesh and drives
//! them from stdin, one command per line:
//!
//! ```text
//! <node> join <room>        join room A..H
//! <node> leave
//! <node> say <text>
//! <node> show               print state and open messages
//! <node> count <room>
//! <node> delete-room <room>
//! <node> delete-all
//! <node> rename <name>
//! quit
//! ```
//!
//! Node names come from the command line (default: `alice bob`). The first
//! node is the primary one: it uses `ROOMCHAT_DB_PATH` when set, so its
//! history survives restarts, and a new profile takes `ROOMCHAT_DISPLAY_NAME`.
//! The others live in memory.

use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::info;

use roomchat_client::{init_tracing, profile, spawn_node, NodeConfig, NodeHandle, NodeNotification};
use roomchat_net::MemoryMesh;
use roomchat_shared::Room;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = NodeConfig::from_env();
    info!(?config, "Loaded configuration");

    let mut names: Vec<String> = std::env::args().skip(1).collect();
    if names.is_empty() {
        names = vec!["alice".to_string(), "bob".to_string()];
    }

    let mesh = MemoryMesh::new();
    let mut nodes = Vec::with_capacity(names.len());
    for (index, name) in names.iter().enumerate() {
        let primary = index == 0;
        let db = config.node_database(primary)?;
        let user = profile::load_or_create(&db, Some(config.node_display_name(name, primary)))?;
        let (transport, events) = mesh.attach(name, &config.service_type);
        let (handle, notifications) = spawn_node(&config, db, user, Arc::new(transport), events);
        tokio::spawn(print_notifications(name.clone(), notifications));
        nodes.push((name.clone(), handle));
    }

    info!(nodes = ?names, "Simulator ready");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "quit" {
            break;
        }
        if let Err(e) = run_line(&nodes, line).await {
            println!("error: {e:#}");
        }
    }

    for (_, handle) in &nodes {
        handle.shutdown().await;
    }
    Ok(())
}

async fn run_line(nodes: &[(String, NodeHandle)], line: &str) -> anyhow::Result<()> {
    let (name, rest) = line.split_once(' ').unwrap_or((line, ""));
    let node = nodes
        .iter()
        .find(|(n, _)| n == name)
        .map(|(_, h)| h)
        .ok_or_else(|| anyhow!("no node named {name:?}"))?;

    let (verb, arg) = rest.trim().split_once(' ').unwrap_or((rest.trim(), ""));
    let arg = arg.trim();

    match verb {
        "join" => {
            let state = node.join_room(parse_room(arg)?).await?;
            println!("{name}: {state}");
        }
        "leave" => node.leave_room().await?,
        "say" => match node.send_text(arg).await? {
            Some(message) => println!("{name}: sent {}", message.id),
            None => println!("{name}: nothing sent"),
        },
        "show" => {
            let snap = node.snapshot().await?;
            let room = snap.room.map_or("-".to_string(), |r| r.to_string());
            println!(
                "{name} ({}): {} in {room}, {} connected",
                snap.profile.display_name,
                snap.state,
                snap.connected.len()
            );
            for (room, count) in snap.peer_counts.iter().filter(|(_, n)| *n > 0) {
                println!("  room {room}: {count} nearby");
            }
            for m in &snap.messages {
                println!("  [{}] {}: {}", m.timestamp.format("%H:%M:%S"), m.sender_name, describe(m));
            }
        }
        "count" => {
            let room = parse_room(arg)?;
            println!("{name}: {} messages in {room}", node.message_count(room).await?);
        }
        "delete-room" => {
            let removed = node.delete_room_messages(parse_room(arg)?).await?;
            println!("{name}: removed {removed}");
        }
        "delete-all" => {
            let removed = node.delete_all_messages().await?;
            println!("{name}: removed {removed}");
        }
        "rename" => {
            let profile = node.rename(arg).await?;
            println!("{name}: now {}", profile.display_name);
        }
        other => bail!("unknown command {other:?}"),
    }
    Ok(())
}

fn parse_room(arg: &str) -> anyhow::Result<Room> {
    arg.to_ascii_uppercase()
        .parse()
        .with_context(|| format!("bad room {arg:?}"))
}

fn describe(m: &roomchat_store::Message) -> String {
    match (&m.text, &m.attachment) {
        (Some(text), None) => text.clone(),
        (Some(text), Some(a)) => format!("{text} <{} byte drawing>", a.len()),
        (None, Some(a)) => format!("<{} byte drawing>", a.len()),
        (None, None) => String::new(),
    }
}

async fn print_notifications(name: String, mut rx: mpsc::Receiver<NodeNotification>) {
    while let Some(notification) = rx.recv().await {
        match notification {
            NodeNotification::StateChanged { state, room } => match room {
                Some(room) => println!("{name}: {state} in {room}"),
                None => println!("{name}: {state}"),
            },
            NodeNotification::PeersChanged { connected, .. } => {
                let peers: Vec<String> = connected.iter().map(|p| p.display_name.clone()).collect();
                println!("{name}: connected to [{}]", peers.join(", "));
            }
            NodeNotification::MessageAppended { message } => {
                println!("{name}: <{}> {}", message.sender_name, describe(&message));
            }
            NodeNotification::MessageStored { message } => {
                println!("{name}: stored message for room {}", message.room);
            }
            NodeNotification::MessagesReloaded { .. } => {}
        }
    }
}
