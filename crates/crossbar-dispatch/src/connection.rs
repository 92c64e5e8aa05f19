//! The connection seam.
//!
//! The dispatch core never owns a connection; it consumes this interface.
//! Transports (TCP acceptors, UDP endpoints, in-process loopbacks in tests)
//! implement it and keep all per-connection state — negotiated keys,
//! permission level, liveness — on their side of the seam.

use std::net::SocketAddr;

use async_trait::async_trait;
use crossbar_crypto::{Algorithm, EncryptionKey};
use crossbar_proto::{ControlPacket, Packet};

use crate::error::Result;

/// Authorization tier of a connection.
///
/// Ordered: a handler requiring `Operator` admits `Operator` and `Admin`.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum PermissionLevel {
    /// Unauthenticated peer
    #[default]
    Guest = 0,
    /// Authenticated user
    User = 1,
    /// Elevated operational access
    Operator = 2,
    /// Full administrative access
    Admin = 3,
}

/// Shared handle to a connection.
pub type ConnectionRef = std::sync::Arc<dyn Connection>;

/// One remote peer, as the dispatch core sees it.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Stable identifier for this connection's lifetime.
    fn id(&self) -> u64;

    /// Peer address. Rate limiting keys off the IP portion.
    fn remote_endpoint(&self) -> SocketAddr;

    /// Authorization tier granted to this peer.
    fn permission_level(&self) -> PermissionLevel;

    /// Cipher algorithm negotiated for this connection.
    fn encryption_algorithm(&self) -> Algorithm;

    /// Negotiated key material; `None` before the handshake completes.
    fn encryption_key(&self) -> Option<EncryptionKey>;

    /// Connection has been torn down; sends will fail.
    fn is_disposed(&self) -> bool;

    /// Queue a packet for delivery to the peer.
    async fn send(&self, packet: Packet) -> Result<()>;

    /// Deliver a dispatcher control packet.
    ///
    /// Default implementation frames the control payload into a `CONTROL`
    /// packet and sends it on the ordinary path.
    async fn send_control(&self, control: ControlPacket) -> Result<()> {
        self.send(control.into_packet()?).await
    }

    /// Tear the connection down, with a human-readable reason for logs.
    fn disconnect(&self, reason: &str);
}
