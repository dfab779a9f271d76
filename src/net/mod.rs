//! Peer-to-peer networking for the replicated sequence.
//!
//! This module contains the datagram protocol and the UDP sync peer that
//! connects a sequence to other peers. The engine itself never touches the
//! network; everything here talks to it through the public embedding API.

pub mod peer;
pub mod protocol;

pub use peer::SyncPeer;
pub use protocol::{ControlMessage, Datagram};
