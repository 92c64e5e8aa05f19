//! Crossbar dispatch core.
//!
//! A typed, middleware-composed, attribute-driven packet router. Framed
//! packets enter through a bounded multi-priority channel; workers classify
//! them by magic and opcode, run them through an ordered middleware
//! pipeline (timeout → permission → rate limit → unwrap → handler → wrap),
//! and project whatever the handler returns back into a reply packet on
//! the originating connection.
//!
//! # Assembly
//!
//! Everything is wired once at startup and immutable afterwards:
//!
//! ```no_run
//! use crossbar_dispatch::{
//!     CatalogBuilder, Controller, Dispatcher, Routes, Transformer,
//!     TransformerRegistryBuilder,
//! };
//! use crossbar_proto::Packet;
//!
//! struct Echo;
//!
//! impl Controller for Echo {
//!     fn name(&self) -> &'static str {
//!         "echo"
//!     }
//!
//!     fn register(&self, routes: &mut Routes) {
//!         routes.handle(0x1000, |packet: Packet, _conn| async move {
//!             packet.payload().to_vec()
//!         });
//!     }
//! }
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let catalog = CatalogBuilder::new().controller(&Echo).build()?;
//! let registry = TransformerRegistryBuilder::new()
//!     .with_builtin_types()
//!     .register(0x0100_0001, Transformer::pipeline_managed())?
//!     .freeze();
//!
//! let dispatcher = Dispatcher::builder().catalog(catalog).registry(registry).build();
//! dispatcher.start(); // spawns workers on the current runtime
//! # Ok(())
//! # }
//! ```
//!
//! Transports hand packets in with [`Dispatcher::ingest`] and implement
//! the [`Connection`] trait for the reply path; the dispatcher never owns
//! a socket.

#![forbid(unsafe_code)]

mod catalog;
mod channel;
mod config;
mod connection;
mod context;
mod dispatcher;
mod error;
mod limiter;
mod metrics;
pub mod middleware;
mod pipeline;
mod pool;
mod projection;
mod registry;
pub mod testing;
mod transform;

pub use catalog::{
    CatalogBuilder, CatalogError, Controller, HandlerDescriptor, HandlerFn, HandlerMeta,
    HandlerScope, OpcodeCatalog, RateLimitSpec, Routes,
};
pub use channel::{
    DequeueError, EnqueueError, EnqueueOutcome, PriorityChannel, Prioritized,
};
pub use config::{ChannelConfig, DispatcherConfig, DropPolicy, RateLimiterConfig};
pub use connection::{Connection, ConnectionRef, PermissionLevel};
pub use context::{ContextState, PacketContext};
pub use dispatcher::{Dispatcher, DispatcherBuilder, Inbound};
pub use error::DispatchError;
pub use limiter::{RateDecision, RateKey, RateScope, SlidingWindowLimiter};
pub use metrics::{ChannelMetrics, LaneSnapshot};
pub use pipeline::{InboundMiddleware, Next, OutboundMiddleware, Pipeline, PipelineBuilder};
pub use pool::{BufferPool, ObjectPool, Poolable, buffer_pool};
pub use projection::{IntoReply, Reply, ReplyContext};
pub use registry::{
    CodecTransformFn, CryptoTransformFn, DecodeFn, RegistryError, Transformer,
    TransformerRegistry, TransformerRegistryBuilder,
};
pub use transform::{compress, decompress, decrypt, encrypt};
