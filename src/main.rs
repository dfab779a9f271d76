//! Interactive peer-to-peer chat/editor binary.
//!
//! Runs a sync peer over UDP and drives it from stdin commands, so two or
//! more terminals can edit the same replicated document live.
//!
//! Usage:
//!   omniseq-peer <peer-id> <bind-addr> [seed-addr...]
//!
//! Example session:
//!   omniseq-peer 1 127.0.0.1:9001
//!   omniseq-peer 2 127.0.0.1:9002 127.0.0.1:9001

use std::net::SocketAddr;
use std::sync::Arc;

use chrono::Local;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, Level};

use omniseq::SyncPeer;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        eprintln!("usage: {} <peer-id> <bind-addr> [seed-addr...]", args[0]);
        std::process::exit(1);
    }

    let peer_id: u64 = match args[1].parse() {
        Ok(id) if id > 0 => id,
        _ => {
            eprintln!("peer-id must be a positive integer (0 is reserved)");
            std::process::exit(1);
        }
    };
    let bind_addr: SocketAddr = match args[2].parse() {
        Ok(addr) => addr,
        Err(e) => {
            eprintln!("invalid bind address '{}': {}", args[2], e);
            std::process::exit(1);
        }
    };
    let seeds: Vec<SocketAddr> = args[3..]
        .iter()
        .filter_map(|s| match s.parse() {
            Ok(addr) => Some(addr),
            Err(e) => {
                eprintln!("skipping invalid seed address '{}': {}", s, e);
                None
            }
        })
        .collect();

    let peer = match SyncPeer::bind(peer_id, bind_addr, &seeds).await {
        Ok(peer) => Arc::new(peer),
        Err(e) => {
            error!("failed to bind {}: {}", bind_addr, e);
            std::process::exit(1);
        }
    };

    info!("Commands:");
    info!("  i <index> <text>  - insert text at visible index");
    info!("  d <index>         - delete the character at visible index");
    info!("  show              - print the document");
    info!("  stats             - print memory statistics");
    info!("  sync              - request missing atoms from all peers");
    info!("  gc                - run coordinated garbage collection");
    info!("  quit              - exit");

    {
        let peer = Arc::clone(&peer);
        tokio::spawn(async move {
            if let Err(e) = peer.run().await {
                error!("receive loop ended: {}", e);
            }
        });
    }
    {
        let peer = Arc::clone(&peer);
        tokio::spawn(async move {
            if let Err(e) = peer.heartbeat_loop().await {
                error!("heartbeat loop ended: {}", e);
            }
        });
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if let Err(e) = handle_command(&peer, line.trim()).await {
            error!("command failed: {}", e);
        }
        if line.trim() == "quit" {
            break;
        }
    }
}

async fn handle_command(peer: &SyncPeer, line: &str) -> std::io::Result<()> {
    let mut parts = line.splitn(3, ' ');
    let command = parts.next().unwrap_or("");

    match command {
        "i" => {
            let (Some(index), Some(text)) = (parts.next(), parts.next()) else {
                println!("usage: i <index> <text>");
                return Ok(());
            };
            let Ok(index) = index.parse::<usize>() else {
                println!("index must be a number");
                return Ok(());
            };
            for (k, byte) in text.bytes().enumerate() {
                peer.insert(index + k, byte).await?;
            }
            print_document(peer);
        }
        "d" => {
            let Some(Ok(index)) = parts.next().map(str::parse::<usize>) else {
                println!("usage: d <index>");
                return Ok(());
            };
            peer.delete(index).await?;
            print_document(peer);
        }
        "show" => print_document(peer),
        "stats" => {
            let stats = peer.sequence().read().memory_stats();
            match serde_json::to_string_pretty(&stats) {
                Ok(json) => println!("{}", json),
                Err(e) => error!("failed to render stats: {}", e),
            }
        }
        "sync" => peer.request_delta().await?,
        "gc" => {
            let sequence = peer.sequence();
            let coordinator = peer.coordinator();
            let mut sequence = sequence.write();
            let mut coordinator = coordinator.write();
            coordinator.update_own_clock(sequence.vector_clock());
            let removed = coordinator.perform(&mut sequence);
            println!("removed {} tombstones", removed);
        }
        "quit" | "" => {}
        other => println!("unknown command '{}'", other),
    }

    Ok(())
}

fn print_document(peer: &SyncPeer) {
    let sequence = peer.sequence();
    let sequence = sequence.read();
    println!(
        "[{}] \"{}\" ({} visible, {} tombstones)",
        Local::now().format("%H:%M:%S"),
        sequence.to_string(),
        sequence.visible_len(),
        sequence.tombstone_count()
    );
}
