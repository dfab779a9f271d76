//! UDP synchronization peer.
//!
//! This module wraps a datagram socket around a shared sequence: locally
//! produced atoms are broadcast to every known peer, inbound datagrams are
//! decoded and merged, and periodic heartbeats feed the garbage-collection
//! coordinator. The transport is assumed unreliable and reordering; the
//! engine's idempotent merge and orphan buffering absorb both.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::net::UdpSocket;
use tracing::{error, info, warn};

use crate::crdt::{Atom, GcCoordinator, OpId, Sequence};
use crate::net::protocol::{self, ControlMessage, Datagram};

/// A peer participating in a replicated document over UDP.
///
/// The sequence and coordinator are shared behind locks so an application
/// can drive edits from one task while [`run`](Self::run) merges inbound
/// traffic from another; every lock is released before any await point.
pub struct SyncPeer {
    peer_id: u64,
    socket: Arc<UdpSocket>,
    sequence: Arc<RwLock<Sequence>>,
    coordinator: Arc<RwLock<GcCoordinator>>,
    /// Peer addresses learned from hellos and heartbeats.
    addrs: Arc<RwLock<HashMap<u64, SocketAddr>>>,
}

impl SyncPeer {
    /// Binds a socket and announces this peer to the seed addresses.
    pub async fn bind(
        peer_id: u64,
        bind_addr: SocketAddr,
        seeds: &[SocketAddr],
    ) -> std::io::Result<Self> {
        let socket = UdpSocket::bind(bind_addr).await?;
        info!(peer_id, local = %socket.local_addr()?, "sync peer listening");

        let peer = SyncPeer {
            peer_id,
            socket: Arc::new(socket),
            sequence: Arc::new(RwLock::new(Sequence::new(peer_id))),
            coordinator: Arc::new(RwLock::new(GcCoordinator::new(peer_id))),
            addrs: Arc::new(RwLock::new(HashMap::new())),
        };

        let hello = protocol::encode_control(&ControlMessage::Hello { peer_id })
            .map_err(std::io::Error::other)?;
        for seed in seeds {
            peer.socket.send_to(&hello, seed).await?;
        }

        Ok(peer)
    }

    /// Handle to the shared sequence.
    pub fn sequence(&self) -> Arc<RwLock<Sequence>> {
        Arc::clone(&self.sequence)
    }

    /// Handle to the shared coordinator.
    pub fn coordinator(&self) -> Arc<RwLock<GcCoordinator>> {
        Arc::clone(&self.coordinator)
    }

    /// Inserts locally and broadcasts the new atom.
    pub async fn insert(&self, index: usize, content: u8) -> std::io::Result<()> {
        let atom = self.sequence.write().local_insert(index, content);
        self.broadcast(&protocol::encode_atom(&atom)).await
    }

    /// Deletes locally and broadcasts the tombstone.
    pub async fn delete(&self, index: usize) -> std::io::Result<()> {
        let target = self.sequence.write().local_delete(index);
        if target.is_sentinel() {
            return Ok(());
        }

        let tombstone = Atom {
            id: target,
            origin: OpId::SENTINEL,
            content: 0,
            deleted: true,
        };
        self.broadcast(&protocol::encode_atom(&tombstone)).await
    }

    /// Asks every known peer to push what this peer is missing.
    pub async fn request_delta(&self) -> std::io::Result<()> {
        let clock = self.sequence.read().vector_clock();
        let frame = protocol::encode_control(&ControlMessage::DeltaRequest {
            peer_id: self.peer_id,
            clock,
        })
        .map_err(std::io::Error::other)?;
        self.broadcast(&frame).await
    }

    /// Sends a frame to every peer address currently known.
    async fn broadcast(&self, frame: &[u8]) -> std::io::Result<()> {
        let addrs: Vec<SocketAddr> = self.addrs.read().values().copied().collect();
        for addr in addrs {
            self.socket.send_to(frame, addr).await?;
        }
        Ok(())
    }

    /// Receive loop: decodes and applies datagrams until the socket fails.
    pub async fn run(&self) -> std::io::Result<()> {
        let mut buf = vec![0u8; 64 * 1024];
        loop {
            let (len, from) = self.socket.recv_from(&mut buf).await?;
            self.handle_datagram(&buf[..len], from).await?;
        }
    }

    /// Periodic heartbeat task; never returns under normal operation.
    pub async fn heartbeat_loop(&self) -> std::io::Result<()> {
        let interval_ms = self.coordinator.read().config().heartbeat_interval_ms;
        let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms.max(1)));

        loop {
            ticker.tick().await;

            let clock = self.sequence.read().vector_clock();
            let mut targets = Vec::new();
            {
                let mut coordinator = self.coordinator.write();
                coordinator.update_own_clock(clock);
                coordinator.send_heartbeat(|peer, vc| targets.push((peer, vc.clone())));
            }

            for (peer, vc) in targets {
                let addr = self.addrs.read().get(&peer).copied();
                let Some(addr) = addr else {
                    continue;
                };

                let frame = match protocol::encode_control(&ControlMessage::Heartbeat {
                    peer_id: self.peer_id,
                    clock: vc,
                }) {
                    Ok(frame) => frame,
                    Err(e) => {
                        error!("failed to encode heartbeat: {}", e);
                        continue;
                    }
                };

                if let Err(e) = self.socket.send_to(&frame, addr).await {
                    warn!(peer, %addr, "heartbeat send failed: {}", e);
                }
            }
        }
    }

    async fn handle_datagram(&self, data: &[u8], from: SocketAddr) -> std::io::Result<()> {
        match protocol::decode(data) {
            Some(Datagram::Atom(atom)) => {
                let mut sequence = self.sequence.write();
                if atom.deleted {
                    sequence.remote_delete(atom.id);
                } else {
                    sequence.remote_merge(atom);
                }
            }
            Some(Datagram::Control(message)) => {
                self.handle_control(message, from).await?;
            }
            None => {
                warn!(len = data.len(), %from, "dropping malformed datagram");
            }
        }
        Ok(())
    }

    async fn handle_control(
        &self,
        message: ControlMessage,
        from: SocketAddr,
    ) -> std::io::Result<()> {
        match message {
            ControlMessage::Hello { peer_id } => {
                let newly_seen = self.addrs.write().insert(peer_id, from).is_none();
                self.coordinator.write().register(peer_id);

                if newly_seen {
                    info!(peer_id, %from, "peer joined");

                    // Introduce ourselves and pull whatever they have
                    let hello = protocol::encode_control(&ControlMessage::Hello {
                        peer_id: self.peer_id,
                    })
                    .map_err(std::io::Error::other)?;
                    self.socket.send_to(&hello, from).await?;

                    let clock = self.sequence.read().vector_clock();
                    let request = protocol::encode_control(&ControlMessage::DeltaRequest {
                        peer_id: self.peer_id,
                        clock,
                    })
                    .map_err(std::io::Error::other)?;
                    self.socket.send_to(&request, from).await?;
                }
            }
            ControlMessage::Heartbeat { peer_id, clock } => {
                self.addrs.write().insert(peer_id, from);

                let should_collect = {
                    let mut coordinator = self.coordinator.write();
                    coordinator.process_heartbeat(peer_id, clock);
                    coordinator.should_trigger()
                };

                if should_collect {
                    let mut sequence = self.sequence.write();
                    let mut coordinator = self.coordinator.write();
                    coordinator.update_own_clock(sequence.vector_clock());
                    coordinator.perform(&mut sequence);
                }
            }
            ControlMessage::DeltaRequest { peer_id, clock } => {
                self.addrs.write().insert(peer_id, from);

                let delta = self.sequence.read().get_delta(&clock);
                if delta.is_empty() {
                    return Ok(());
                }

                info!(peer_id, atoms = delta.len(), "serving delta request");
                for atom in delta {
                    self.socket
                        .send_to(&protocol::encode_atom(&atom), from)
                        .await?;
                }
            }
        }
        Ok(())
    }
}
