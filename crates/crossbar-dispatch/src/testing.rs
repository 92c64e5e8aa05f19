//! In-process connection double for tests and examples.
//!
//! Records every packet the dispatcher sends instead of touching a socket.
//! Kept in the library (not a test module) so integration tests and
//! downstream crates can drive the dispatcher without a transport.

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use crossbar_crypto::{Algorithm, EncryptionKey};
use crossbar_proto::{ControlPacket, Packet, magic};
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::{
    connection::{Connection, PermissionLevel},
    error::{DispatchError, Result},
};

/// Recording connection: sends append to an in-memory log.
pub struct LoopbackConnection {
    id: u64,
    endpoint: SocketAddr,
    permission: PermissionLevel,
    algorithm: Algorithm,
    key: Option<EncryptionKey>,
    sent: Mutex<Vec<Packet>>,
    sent_wake: Notify,
    disposed: AtomicBool,
    disconnect_reason: Mutex<Option<String>>,
}

impl LoopbackConnection {
    /// Guest connection with no key material.
    #[must_use]
    pub fn new(id: u64) -> Arc<Self> {
        Self::configured(id, PermissionLevel::Guest, Algorithm::ChaCha20Poly1305, None)
    }

    /// Fully specified connection.
    #[must_use]
    pub fn configured(
        id: u64,
        permission: PermissionLevel,
        algorithm: Algorithm,
        key: Option<EncryptionKey>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            endpoint: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 40_000 + (id as u16 % 10_000)),
            permission,
            algorithm,
            key,
            sent: Mutex::new(Vec::new()),
            sent_wake: Notify::new(),
            disposed: AtomicBool::new(false),
            disconnect_reason: Mutex::new(None),
        })
    }

    /// Everything sent so far.
    #[must_use]
    pub fn sent(&self) -> Vec<Packet> {
        self.sent.lock().clone()
    }

    /// Control payloads among the sent packets, in send order.
    #[must_use]
    pub fn sent_controls(&self) -> Vec<ControlPacket> {
        self.sent
            .lock()
            .iter()
            .filter(|packet| packet.magic() == magic::builtin::CONTROL)
            .filter_map(|packet| ControlPacket::from_packet(packet).ok())
            .collect()
    }

    /// Wait until at least `count` packets were sent, or `limit` elapses.
    /// Returns whatever was sent either way.
    pub async fn wait_for_sent(&self, count: usize, limit: Duration) -> Vec<Packet> {
        let deadline = tokio::time::Instant::now() + limit;
        loop {
            let wake = self.sent_wake.notified();
            tokio::pin!(wake);
            wake.as_mut().enable();

            let sent = self.sent();
            if sent.len() >= count {
                return sent;
            }

            tokio::select! {
                () = &mut wake => {},
                () = tokio::time::sleep_until(deadline) => return self.sent(),
            }
        }
    }

    /// Reason passed to `disconnect`, if it was called.
    #[must_use]
    pub fn disconnect_reason(&self) -> Option<String> {
        self.disconnect_reason.lock().clone()
    }
}

#[async_trait]
impl Connection for LoopbackConnection {
    fn id(&self) -> u64 {
        self.id
    }

    fn remote_endpoint(&self) -> SocketAddr {
        self.endpoint
    }

    fn permission_level(&self) -> PermissionLevel {
        self.permission
    }

    fn encryption_algorithm(&self) -> Algorithm {
        self.algorithm
    }

    fn encryption_key(&self) -> Option<EncryptionKey> {
        self.key.clone()
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    async fn send(&self, packet: Packet) -> Result<()> {
        if self.is_disposed() {
            return Err(DispatchError::ConnectionClosed { id: self.id });
        }
        self.sent.lock().push(packet);
        self.sent_wake.notify_waiters();
        Ok(())
    }

    fn disconnect(&self, reason: &str) {
        self.disposed.store(true, Ordering::SeqCst);
        *self.disconnect_reason.lock() = Some(reason.to_string());
    }
}
