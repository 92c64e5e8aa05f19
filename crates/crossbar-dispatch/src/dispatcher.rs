//! The dispatch core.
//!
//! Owns the frozen catalog and registry, the ingress channel, and the
//! middleware pipeline, and runs the worker loops that tie them together:
//!
//! dequeue → classify by magic → look up the opcode's descriptor → build a
//! context → run the pipeline → send the reply (or a FAIL control packet).
//!
//! Construction goes through [`DispatcherBuilder`]: every collaborator is
//! passed in explicitly and shared by reference afterwards — there is no
//! ambient registry or global configuration anywhere in the dispatch path.

use std::sync::Arc;

use crossbar_crypto::CipherSuite;
use crossbar_proto::{ControlPacket, Packet, WireHeader};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{
    catalog::{CatalogBuilder, OpcodeCatalog},
    channel::{EnqueueError, EnqueueOutcome, PriorityChannel, Prioritized},
    config::DispatcherConfig,
    connection::ConnectionRef,
    context::PacketContext,
    error::{DispatchError, Result},
    limiter::SlidingWindowLimiter,
    metrics::ChannelMetrics,
    pool::{BufferPool, buffer_pool},
    middleware::{
        PermissionMiddleware, RateLimitMiddleware, TimeoutMiddleware, UnwrapMiddleware,
        WrapMiddleware,
    },
    pipeline::{InboundMiddleware, OutboundMiddleware, Pipeline},
    registry::{TransformerRegistry, TransformerRegistryBuilder},
};

/// One received packet tagged with its originating connection.
pub struct Inbound {
    /// The decoded packet
    pub packet: Packet,
    /// Connection it arrived on
    pub connection: ConnectionRef,
}

impl std::fmt::Debug for Inbound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inbound")
            .field("opcode", &self.packet.opcode())
            .field("connection", &self.connection.id())
            .finish()
    }
}

impl Prioritized for Inbound {
    fn priority(&self) -> crossbar_proto::Priority {
        self.packet.priority()
    }

    fn coalesce_key(&self) -> u64 {
        (self.connection.id() << 16) | u64::from(self.packet.opcode())
    }

    fn is_expired(&self, ttl: std::time::Duration) -> bool {
        self.packet.is_expired(ttl)
    }
}

/// Builder over the dispatcher's typed dependency set.
pub struct DispatcherBuilder {
    catalog: Option<OpcodeCatalog>,
    registry: Option<TransformerRegistry>,
    suite: Option<CipherSuite>,
    config: DispatcherConfig,
    extra_inbound: Vec<Arc<dyn InboundMiddleware>>,
    extra_outbound: Vec<Arc<dyn OutboundMiddleware>>,
}

impl DispatcherBuilder {
    fn new() -> Self {
        Self {
            catalog: None,
            registry: None,
            suite: None,
            config: DispatcherConfig::default(),
            extra_inbound: Vec::new(),
            extra_outbound: Vec::new(),
        }
    }

    /// Use this frozen opcode catalog.
    #[must_use]
    pub fn catalog(mut self, catalog: OpcodeCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Use this frozen transformer registry.
    #[must_use]
    pub fn registry(mut self, registry: TransformerRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Use this cipher suite (defaults to [`CipherSuite::standard`]).
    #[must_use]
    pub fn cipher_suite(mut self, suite: CipherSuite) -> Self {
        self.suite = Some(suite);
        self
    }

    /// Use this configuration (defaults to [`DispatcherConfig::default`]).
    #[must_use]
    pub fn config(mut self, config: DispatcherConfig) -> Self {
        self.config = config;
        self
    }

    /// Add a user inbound middleware alongside the built-ins.
    #[must_use]
    pub fn inbound_middleware(mut self, middleware: Arc<dyn InboundMiddleware>) -> Self {
        self.extra_inbound.push(middleware);
        self
    }

    /// Add a user outbound middleware alongside the built-ins.
    #[must_use]
    pub fn outbound_middleware(mut self, middleware: Arc<dyn OutboundMiddleware>) -> Self {
        self.extra_outbound.push(middleware);
        self
    }

    /// Assemble the dispatcher.
    ///
    /// Defaults: an empty catalog (everything answers `NO_HANDLER`), a
    /// registry with only the built-in types, the standard cipher suite.
    #[must_use]
    pub fn build(self) -> Arc<Dispatcher> {
        let catalog = Arc::new(self.catalog.unwrap_or_else(|| {
            CatalogBuilder::new().build().unwrap_or_else(|_| unreachable!("empty catalog"))
        }));
        let registry = Arc::new(
            self.registry
                .unwrap_or_else(|| TransformerRegistryBuilder::new().with_builtin_types().freeze()),
        );
        let suite = Arc::new(self.suite.unwrap_or_else(CipherSuite::standard));
        let limiter =
            Arc::new(SlidingWindowLimiter::new(self.config.rate_limiter.clone()));

        let mut pipeline = Pipeline::builder()
            .inbound(Arc::new(TimeoutMiddleware::new(self.config.default_timeout)))
            .inbound(Arc::new(PermissionMiddleware))
            .inbound(Arc::new(RateLimitMiddleware::new(Arc::clone(&limiter))))
            .inbound(Arc::new(UnwrapMiddleware::new(
                Arc::clone(&registry),
                Arc::clone(&suite),
            )))
            .outbound(Arc::new(WrapMiddleware::new(
                Arc::clone(&registry),
                Arc::clone(&suite),
                self.config.compression_threshold,
            )));
        for middleware in self.extra_inbound {
            pipeline = pipeline.inbound(middleware);
        }
        for middleware in self.extra_outbound {
            pipeline = pipeline.outbound(middleware);
        }

        Arc::new(Dispatcher {
            channel: Arc::new(PriorityChannel::new(&self.config.channel)),
            pipeline: Arc::new(pipeline.build()),
            catalog,
            registry,
            limiter,
            buffers: Arc::new(buffer_pool(256, 4096)),
            config: self.config,
            shutdown: CancellationToken::new(),
            workers: parking_lot::Mutex::new(Vec::new()),
        })
    }
}

/// Packet dispatch core.
pub struct Dispatcher {
    channel: Arc<PriorityChannel<Inbound>>,
    pipeline: Arc<Pipeline>,
    catalog: Arc<OpcodeCatalog>,
    registry: Arc<TransformerRegistry>,
    limiter: Arc<SlidingWindowLimiter>,
    buffers: Arc<BufferPool>,
    config: DispatcherConfig,
    shutdown: CancellationToken,
    workers: parking_lot::Mutex<Vec<JoinHandle<()>>>,
}

impl Dispatcher {
    /// Start composing a dispatcher.
    #[must_use]
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    /// Decode framed bytes using the registered type's decoder.
    ///
    /// # Errors
    ///
    /// [`DispatchError::UnsupportedPacket`] for an unknown magic;
    /// [`DispatchError::Protocol`] when the type's decoder rejects the
    /// frame.
    pub fn decode(&self, bytes: &[u8]) -> Result<Packet> {
        let header = WireHeader::from_bytes(bytes)?;
        let entry = self
            .registry
            .entry(header.magic())
            .ok_or(DispatchError::UnsupportedPacket { magic: header.magic() })?;
        Ok(entry.decode(bytes)?)
    }

    /// Queue one packet for dispatch.
    ///
    /// # Errors
    ///
    /// The channel's [`EnqueueError`] under backpressure or shutdown.
    pub async fn ingest(
        &self,
        packet: Packet,
        connection: ConnectionRef,
    ) -> std::result::Result<EnqueueOutcome, EnqueueError<Inbound>> {
        self.channel.enqueue(Inbound { packet, connection }).await
    }

    /// Spawn the configured number of worker tasks.
    ///
    /// Idempotent-ish: calling twice spawns two generations of workers;
    /// don't. Requires a running tokio runtime.
    pub fn start(self: &Arc<Self>) {
        let mut workers = self.workers.lock();
        for worker_index in 0..self.config.workers.max(1) {
            let dispatcher = Arc::clone(self);
            workers.push(tokio::spawn(async move {
                dispatcher.worker_loop(worker_index).await;
            }));
        }
        tracing::info!(workers = self.config.workers.max(1), "dispatcher started");
    }

    /// Cancel every in-flight context, close the channel, and wait for the
    /// workers to exit.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.channel.close();

        let workers = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            let _ = worker.await;
        }
        tracing::info!("dispatcher stopped");
    }

    async fn worker_loop(&self, worker_index: usize) {
        tracing::debug!(worker = worker_index, "dispatch worker started");
        loop {
            match self.channel.dequeue(&self.shutdown).await {
                Ok(inbound) => self.dispatch(inbound).await,
                Err(_) => break,
            }
        }
        tracing::debug!(worker = worker_index, "dispatch worker stopped");
    }

    /// Dispatch one packet through classification, pipeline, and reply.
    ///
    /// Public so transports (and tests) can bypass the channel for
    /// single-shot dispatch. Never returns an error: every failure is
    /// converted into a FAIL control packet or logged.
    pub async fn dispatch(&self, inbound: Inbound) {
        let Inbound { packet, connection } = inbound;
        let sequence_id = u32::from(packet.id());

        if !self.registry.supports(packet.magic()) {
            tracing::warn!(
                magic = packet.magic(),
                connection = connection.id(),
                "unsupported packet type"
            );
            let error = DispatchError::UnsupportedPacket { magic: packet.magic() };
            self.emit_fail(&connection, &error, sequence_id).await;
            return;
        }

        let Some(descriptor) = self.catalog.get(packet.opcode()) else {
            tracing::warn!(
                opcode = packet.opcode(),
                connection = connection.id(),
                "no handler bound"
            );
            let error = DispatchError::NoHandler { opcode: packet.opcode() };
            self.emit_fail(&connection, &error, sequence_id).await;
            return;
        };

        let mut ctx = PacketContext::new(
            packet,
            connection,
            Arc::clone(&descriptor.meta),
            self.shutdown.child_token(),
        );

        tracing::debug!(
            opcode = ctx.packet.opcode(),
            controller = descriptor.controller,
            connection = ctx.connection.id(),
            "dispatching"
        );

        match self.pipeline.run(&mut ctx, &descriptor.invoke).await {
            Ok(()) => {
                if let Some(reply) = ctx.take_reply() {
                    if let Err(error) = ctx.connection.send(reply).await {
                        tracing::debug!(
                            connection = ctx.connection.id(),
                            %error,
                            "reply send failed"
                        );
                    }
                }
            },
            Err(DispatchError::Canceled) => {
                // Shutdown or timeout teardown: the context ends quietly
                tracing::debug!(
                    opcode = ctx.packet.opcode(),
                    "context canceled"
                );
            },
            Err(error) => {
                tracing::error!(
                    opcode = ctx.packet.opcode(),
                    controller = descriptor.controller,
                    connection = ctx.connection.id(),
                    %error,
                    "dispatch failed"
                );
                self.emit_fail(&ctx.connection, &error, ctx.sequence_id()).await;
            },
        }
    }

    async fn emit_fail(&self, connection: &ConnectionRef, error: &DispatchError, sequence_id: u32) {
        let fail = ControlPacket::fail(error.control_reason(), error.advice(), sequence_id);
        if let Err(send_error) = connection.send_control(fail).await {
            tracing::debug!(
                connection = connection.id(),
                %send_error,
                "FAIL control packet could not be delivered"
            );
        }
    }

    /// Ingress channel, for transports that enqueue directly.
    #[must_use]
    pub fn channel(&self) -> &Arc<PriorityChannel<Inbound>> {
        &self.channel
    }

    /// Channel metrics snapshot.
    #[must_use]
    pub fn metrics(&self) -> ChannelMetrics {
        self.channel.metrics()
    }

    /// Rate limiter state (for housekeeping sweeps).
    #[must_use]
    pub fn limiter(&self) -> &Arc<SlidingWindowLimiter> {
        &self.limiter
    }

    /// Shared scratch-buffer pool. Transports rent encode buffers here and
    /// return them after the write; buffers must not outlive the call.
    #[must_use]
    pub fn buffer_pool(&self) -> &Arc<BufferPool> {
        &self.buffers
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("handlers", &self.catalog.len())
            .field("types", &self.registry.len())
            .field("queue_depth", &self.channel.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;
    use crossbar_proto::{ControlReason, codec};

    use super::*;
    use crate::testing::LoopbackConnection;

    fn dispatcher() -> Arc<Dispatcher> {
        Dispatcher::builder().build()
    }

    #[tokio::test]
    async fn unknown_magic_fails_with_unsupported_packet() {
        let dispatcher = dispatcher();
        let connection = LoopbackConnection::new(1);

        let packet = Packet::new(0x0BAD_F00D, 0x10, b"?".as_slice()).unwrap();
        dispatcher.dispatch(Inbound { packet, connection: Arc::clone(&connection) as _ }).await;

        let controls = connection.sent_controls();
        assert_eq!(controls.len(), 1);
        assert_eq!(controls[0].reason, ControlReason::UnsupportedPacket);
    }

    #[tokio::test]
    async fn known_magic_without_handler_fails_no_handler() {
        let dispatcher = dispatcher();
        let connection = LoopbackConnection::new(1);

        let packet =
            Packet::new(crossbar_proto::magic::builtin::BINARY_128, 0x99, b"".as_slice()).unwrap();
        dispatcher.dispatch(Inbound { packet, connection: Arc::clone(&connection) as _ }).await;

        let controls = connection.sent_controls();
        assert_eq!(controls.len(), 1);
        assert_eq!(controls[0].reason, ControlReason::NoHandler);
    }

    #[tokio::test]
    async fn decode_resolves_types_through_the_registry() {
        let dispatcher = dispatcher();

        let packet =
            Packet::new(crossbar_proto::magic::builtin::BINARY_128, 0x10, b"abc".as_slice())
                .unwrap();
        let mut wire = BytesMut::new();
        codec::encode(&packet, &mut wire);

        let decoded = dispatcher.decode(&wire).unwrap();
        assert_eq!(decoded, packet);

        let unknown = Packet::new(0x0BAD_F00D, 0x10, b"abc".as_slice()).unwrap();
        let mut wire = BytesMut::new();
        codec::encode(&unknown, &mut wire);
        assert!(matches!(
            dispatcher.decode(&wire),
            Err(DispatchError::UnsupportedPacket { magic: 0x0BAD_F00D })
        ));
    }
}
