//! Datagram protocol for peer-to-peer synchronization.
//!
//! Every datagram starts with a one-byte tag. Atom payloads use the
//! variable-length codec; control messages (discovery and heartbeats) are
//! JSON, which keeps them debuggable with tcpdump at negligible cost since
//! they are rare compared to atoms.
//!
//! Deletes travel in atom framing with the tombstone flag set; receivers
//! read the id as the deletion target and ignore content and origin.

use serde::{Deserialize, Serialize};

use crate::codec::{AtomCodec, VleCodec};
use crate::crdt::{Atom, PeerId, VectorClock};

/// Tag for a VLE-encoded atom (insert or delete).
pub const TAG_ATOM: u8 = 0x01;
/// Tag for a JSON control message.
pub const TAG_CONTROL: u8 = 0x02;

/// Discovery and liveness messages exchanged between peers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ControlMessage {
    /// Announces a peer and its listening address (the datagram source).
    Hello { peer_id: PeerId },
    /// Periodic liveness beacon carrying the sender's causal summary.
    Heartbeat { peer_id: PeerId, clock: VectorClock },
    /// Asks the receiver to push every atom the sender has not seen.
    DeltaRequest { peer_id: PeerId, clock: VectorClock },
}

/// A decoded inbound datagram.
#[derive(Debug, Clone)]
pub enum Datagram {
    Atom(Atom),
    Control(ControlMessage),
}

/// Frames an atom for transmission.
pub fn encode_atom(atom: &Atom) -> Vec<u8> {
    let mut buf = vec![TAG_ATOM];
    VleCodec::pack(atom, &mut buf);
    buf
}

/// Frames a control message for transmission.
pub fn encode_control(message: &ControlMessage) -> serde_json::Result<Vec<u8>> {
    let mut buf = vec![TAG_CONTROL];
    serde_json::to_writer(&mut buf, message)?;
    Ok(buf)
}

/// Decodes one datagram. Returns `None` for anything malformed; the caller
/// drops the datagram and relies on retransmission.
pub fn decode(buf: &[u8]) -> Option<Datagram> {
    let (&tag, payload) = buf.split_first()?;
    match tag {
        TAG_ATOM => {
            let mut offset = 0;
            let atom = VleCodec::unpack(payload, &mut offset)?;
            // Trailing bytes mean a corrupt frame, not padding
            if offset != payload.len() {
                return None;
            }
            Some(Datagram::Atom(atom))
        }
        TAG_CONTROL => serde_json::from_slice(payload).ok().map(Datagram::Control),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crdt::OpId;

    #[test]
    fn test_atom_frame_round_trip() {
        let atom = Atom::new(OpId::new(1, 5), OpId::new(1, 4), b'h');
        let frame = encode_atom(&atom);

        match decode(&frame) {
            Some(Datagram::Atom(decoded)) => assert_eq!(decoded, atom),
            other => panic!("unexpected decode result: {:?}", other),
        }
    }

    #[test]
    fn test_control_frame_round_trip() {
        let mut clock = VectorClock::new(3);
        clock.update(1, 10);
        clock.update(3, 4);

        let frame = encode_control(&ControlMessage::Heartbeat {
            peer_id: 3,
            clock: clock.clone(),
        })
        .unwrap();

        match decode(&frame) {
            Some(Datagram::Control(ControlMessage::Heartbeat {
                peer_id,
                clock: decoded,
            })) => {
                assert_eq!(peer_id, 3);
                assert_eq!(decoded.get(1), 10);
                assert_eq!(decoded.get(3), 4);
            }
            other => panic!("unexpected decode result: {:?}", other),
        }
    }

    #[test]
    fn test_malformed_frames_are_dropped() {
        assert!(decode(&[]).is_none());
        assert!(decode(&[0x7F, 1, 2, 3]).is_none());
        assert!(decode(&[TAG_CONTROL, b'{', b'!']).is_none());

        // Atom frame with trailing garbage
        let atom = Atom::new(OpId::new(1, 1), OpId::SENTINEL, b'a');
        let mut frame = encode_atom(&atom);
        frame.push(0xAA);
        assert!(decode(&frame).is_none());
    }
}
