//! Opcode catalog and controller scanning.
//!
//! Controllers declare their routes once at startup; the builder compiles
//! each handler into an erased trampoline and freezes an opcode-to-
//! descriptor map. The dispatch hot path is a hash lookup plus an indirect
//! call — no signature inspection, no downcasting, no registration state.
//!
//! A handler is any `Fn(Packet, ConnectionRef) -> impl Future` (or the
//! scoped variant receiving a [`HandlerScope`]) whose output implements
//! [`IntoReply`]. The trampoline monomorphizes over the concrete future
//! and return type at registration, so an unsupported return shape is a
//! compile error at the registration site.

use std::{collections::HashMap, future::Future, pin::Pin, sync::Arc, time::Duration};

use crossbar_proto::Packet;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::{
    connection::{ConnectionRef, PermissionLevel},
    context::PacketContext,
    error::Result,
    projection::{IntoReply, Reply},
};

/// Per-handler rate limit attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitSpec {
    /// Admitted hits per window
    pub max: u32,
    /// Window length
    pub window: Duration,
}

/// Declarative per-handler policy attributes.
///
/// Extracted at build time; the built-in middlewares read these from the
/// context's descriptor on every invocation.
#[derive(Debug, Clone, Default)]
pub struct HandlerMeta {
    /// Abort the handler after this long; `None` falls back to the
    /// dispatcher default
    pub timeout: Option<Duration>,
    /// Sliding-window budget; `None` = unlimited
    pub rate_limit: Option<RateLimitSpec>,
    /// Budget shared across handlers with the same group name
    pub rate_group: Option<Arc<str>>,
    /// Minimum connection permission level
    pub permission_level: PermissionLevel,
    /// Reply must be encrypted before leaving the pipeline
    pub encryption_required: bool,
}

/// Boxed future a compiled handler returns.
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<Reply>> + Send>>;

/// Compiled, signature-erased handler trampoline.
pub type HandlerFn = Arc<dyn Fn(&PacketContext) -> HandlerFuture + Send + Sync>;

/// Owned view a scoped handler receives.
///
/// Cheap to construct: the packet's payload is refcounted or inline, the
/// rest are `Arc`/token clones.
pub struct HandlerScope {
    /// The (already unwrapped) request packet
    pub packet: Packet,
    /// Originating connection
    pub connection: ConnectionRef,
    /// This handler's attributes
    pub meta: Arc<HandlerMeta>,
    /// Cancellation for this invocation; honors the timeout middleware
    pub cancellation: CancellationToken,
}

/// Immutable per-opcode record used by the dispatcher's fast path.
pub struct HandlerDescriptor {
    /// Opcode this handler answers
    pub opcode: u16,
    /// Controller the handler came from, for logs
    pub controller: &'static str,
    /// Compiled trampoline
    pub invoke: HandlerFn,
    /// Policy attributes
    pub meta: Arc<HandlerMeta>,
}

impl std::fmt::Debug for HandlerDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerDescriptor")
            .field("opcode", &format!("{:#06x}", self.opcode))
            .field("controller", &self.controller)
            .field("meta", &self.meta)
            .finish()
    }
}

/// A unit of handlers registered together.
pub trait Controller: Send + Sync + 'static {
    /// Controller name, used in logs and duplicate-opcode errors.
    fn name(&self) -> &'static str;

    /// Declare every `(opcode, handler, attributes)` this controller owns.
    fn register(&self, routes: &mut Routes);
}

struct RouteEntry {
    opcode: u16,
    invoke: HandlerFn,
    meta: HandlerMeta,
}

/// Route sink a controller declares into.
pub struct Routes {
    controller: &'static str,
    entries: Vec<RouteEntry>,
}

impl Routes {
    fn new(controller: &'static str) -> Self {
        Self { controller, entries: Vec::new() }
    }

    /// Bind `opcode` to a `(packet, connection)` handler.
    ///
    /// Returns a builder for attaching policy attributes.
    pub fn handle<F, Fut, R>(&mut self, opcode: u16, handler: F) -> RouteConfig<'_>
    where
        F: Fn(Packet, ConnectionRef) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoReply,
    {
        let invoke: HandlerFn = Arc::new(move |ctx: &PacketContext| {
            let request = ctx.reply_context();
            let future = handler(ctx.packet.clone(), Arc::clone(&ctx.connection));
            Box::pin(async move { future.await.into_reply(&request) })
        });
        self.push(opcode, invoke)
    }

    /// Bind `opcode` to a handler that wants the full [`HandlerScope`].
    pub fn handle_scoped<F, Fut, R>(&mut self, opcode: u16, handler: F) -> RouteConfig<'_>
    where
        F: Fn(HandlerScope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoReply,
    {
        let invoke: HandlerFn = Arc::new(move |ctx: &PacketContext| {
            let request = ctx.reply_context();
            let scope = HandlerScope {
                packet: ctx.packet.clone(),
                connection: Arc::clone(&ctx.connection),
                meta: Arc::clone(&ctx.meta),
                cancellation: ctx.cancellation.clone(),
            };
            let future = handler(scope);
            Box::pin(async move { future.await.into_reply(&request) })
        });
        self.push(opcode, invoke)
    }

    fn push(&mut self, opcode: u16, invoke: HandlerFn) -> RouteConfig<'_> {
        self.entries.push(RouteEntry { opcode, invoke, meta: HandlerMeta::default() });
        RouteConfig {
            entry: self.entries.last_mut().unwrap_or_else(|| unreachable!("just pushed")),
        }
    }
}

/// Attribute builder for one registered route.
pub struct RouteConfig<'a> {
    entry: &'a mut RouteEntry,
}

impl RouteConfig<'_> {
    /// Abort the handler after `limit`.
    pub fn timeout(self, limit: Duration) -> Self {
        self.entry.meta.timeout = Some(limit);
        self
    }

    /// Admit at most `max` requests per `window` per peer.
    pub fn rate_limit(self, max: u32, window: Duration) -> Self {
        self.entry.meta.rate_limit = Some(RateLimitSpec { max, window });
        self
    }

    /// Share the rate budget with every handler in `group`.
    pub fn rate_group(self, group: &str) -> Self {
        self.entry.meta.rate_group = Some(Arc::from(group));
        self
    }

    /// Require at least `level` on the connection.
    pub fn permission(self, level: PermissionLevel) -> Self {
        self.entry.meta.permission_level = level;
        self
    }

    /// Encrypt the reply before it leaves the pipeline.
    pub fn require_encryption(self) -> Self {
        self.entry.meta.encryption_required = true;
        self
    }
}

/// Errors raised while building the catalog.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// Two handlers claimed the same opcode
    #[error("opcode {opcode:#06x} registered twice (second time by controller {controller})")]
    DuplicateOpcode {
        /// The contested opcode
        opcode: u16,
        /// Controller attempting the second registration
        controller: &'static str,
    },
}

/// Catalog under construction.
#[derive(Default)]
pub struct CatalogBuilder {
    scanned: Vec<(&'static str, Vec<RouteEntry>)>,
}

impl CatalogBuilder {
    /// Empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan a controller's routes into the catalog.
    #[must_use]
    pub fn controller(mut self, controller: &impl Controller) -> Self {
        let mut routes = Routes::new(controller.name());
        controller.register(&mut routes);
        self.scanned.push((routes.controller, routes.entries));
        self
    }

    /// Freeze into the immutable catalog.
    ///
    /// # Errors
    ///
    /// [`CatalogError::DuplicateOpcode`] if any opcode appears twice across
    /// all scanned controllers.
    pub fn build(self) -> std::result::Result<OpcodeCatalog, CatalogError> {
        let mut handlers: HashMap<u16, Arc<HandlerDescriptor>> = HashMap::new();

        for (controller, entries) in self.scanned {
            for entry in entries {
                if handlers.contains_key(&entry.opcode) {
                    return Err(CatalogError::DuplicateOpcode { opcode: entry.opcode, controller });
                }
                handlers.insert(
                    entry.opcode,
                    Arc::new(HandlerDescriptor {
                        opcode: entry.opcode,
                        controller,
                        invoke: entry.invoke,
                        meta: Arc::new(entry.meta),
                    }),
                );
            }
        }

        Ok(OpcodeCatalog { handlers })
    }
}

/// Immutable opcode-to-descriptor map.
pub struct OpcodeCatalog {
    handlers: HashMap<u16, Arc<HandlerDescriptor>>,
}

impl OpcodeCatalog {
    /// Descriptor for an opcode, if any handler is bound.
    #[must_use]
    pub fn get(&self, opcode: u16) -> Option<&Arc<HandlerDescriptor>> {
        self.handlers.get(&opcode)
    }

    /// Bound opcode count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// No handlers bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// All bound opcodes, in no particular order.
    pub fn opcodes(&self) -> impl Iterator<Item = u16> + '_ {
        self.handlers.keys().copied()
    }
}

impl std::fmt::Debug for OpcodeCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpcodeCatalog").field("handlers", &self.handlers.len()).finish()
    }
}
