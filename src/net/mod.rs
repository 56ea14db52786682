//! Peer plane: the P2P message envelope and per-peer status machine
//!
//! Handshake messages share the serialization layer with the consensus
//! plane; everything else here is orthogonal to it. A `NodeStatus` is
//! owned by its peer's actor, which is the only writer; observers follow
//! the broadcast event channel.

pub mod message;
pub mod node_status;

pub use message::{
    FeeFilterMessage, MessageHeader, NetAddress, NetworkMessage, SendCompactMessage,
    VersionMessage,
};
pub use node_status::{
    DisconnectReason, FieldValue, HandshakeConfig, HandshakeState, NodeStatus, StatusEvent,
    StatusField, Violation,
};
