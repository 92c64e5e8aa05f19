//! Per-invocation packet context.
//!
//! One context exists per dispatched packet, owned by exactly one worker
//! for its whole lifetime — middlewares and the handler see `&mut` access
//! in sequence, never concurrently. The pipeline itself is reentrant: many
//! contexts flow through it at once, each on its own worker.

use std::{any::Any, collections::HashMap, sync::Arc};

use crossbar_proto::Packet;
use tokio_util::sync::CancellationToken;

use crate::{
    catalog::HandlerMeta,
    connection::ConnectionRef,
    projection::ReplyContext,
};

/// Where a context is in its lifecycle.
///
/// `Received → InboundChain → {Handled, ShortCircuited, Faulted} →
/// OutboundChain → Completed`; `Aborted` is the terminal for anything that
/// dies after completion began.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    /// Dequeued, not yet entered the pipeline
    Received,
    /// Inbound middlewares running
    InboundChain,
    /// Handler ran to completion
    Handled,
    /// An inbound middleware declined to call through
    ShortCircuited,
    /// Handler or a middleware failed
    Faulted,
    /// Outbound middlewares running
    OutboundChain,
    /// Context fully processed
    Completed,
    /// Died after completion started
    Aborted,
}

/// Everything one handler invocation can see and mutate.
pub struct PacketContext {
    /// The packet being dispatched; unwrap rewrites it in place
    pub packet: Packet,
    /// Originating connection
    pub connection: ConnectionRef,
    /// Attributes from the handler's descriptor
    pub meta: Arc<HandlerMeta>,
    /// Token for this invocation; middlewares may swap in a child
    pub cancellation: CancellationToken,
    /// When set, the conditional outbound stages are skipped
    pub skip_outbound: bool,
    /// Reply produced by projection, consumed by the dispatcher
    pub reply: Option<Packet>,
    /// Lifecycle position, for logs and tests
    pub state: ContextState,
    /// The outbound stage already executed (guards the short-circuit path)
    pub(crate) outbound_ran: bool,
    properties: HashMap<&'static str, Box<dyn Any + Send + Sync>>,
}

impl PacketContext {
    /// Fresh context for a dequeued packet.
    #[must_use]
    pub fn new(
        packet: Packet,
        connection: ConnectionRef,
        meta: Arc<HandlerMeta>,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            packet,
            connection,
            meta,
            cancellation,
            skip_outbound: false,
            reply: None,
            state: ContextState::Received,
            outbound_ran: false,
            properties: HashMap::new(),
        }
    }

    /// Sequence id echoed into FAIL control packets: the packet's short id.
    #[must_use]
    pub fn sequence_id(&self) -> u32 {
        u32::from(self.packet.id())
    }

    /// Request fields the projection layer echoes.
    #[must_use]
    pub fn reply_context(&self) -> ReplyContext {
        ReplyContext { opcode: self.packet.opcode(), priority: self.packet.priority() }
    }

    /// Stash a typed value for later middlewares or the handler.
    pub fn set_property<T: Any + Send + Sync>(&mut self, key: &'static str, value: T) {
        self.properties.insert(key, Box::new(value));
    }

    /// Read a typed value stashed earlier. `None` on missing key or type
    /// mismatch.
    #[must_use]
    pub fn property<T: Any + Send + Sync>(&self, key: &'static str) -> Option<&T> {
        self.properties.get(key).and_then(|value| value.downcast_ref())
    }

    /// Take the reply out, leaving `None`.
    #[must_use]
    pub fn take_reply(&mut self) -> Option<Packet> {
        self.reply.take()
    }
}

impl std::fmt::Debug for PacketContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketContext")
            .field("opcode", &format!("{:#06x}", self.packet.opcode()))
            .field("connection", &self.connection.id())
            .field("state", &self.state)
            .field("skip_outbound", &self.skip_outbound)
            .field("has_reply", &self.reply.is_some())
            .finish()
    }
}
