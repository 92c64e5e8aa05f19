//! Middleware pipeline.
//!
//! Two ordered stages around the handler. Inbound middlewares form an
//! onion: each receives a [`Next`] continuation and decides whether to call
//! through, short-circuit, or wrap the call in recovery logic. The
//! terminal of the onion invokes the compiled handler, stores the
//! projected reply on the context, and runs the outbound stage — so an
//! inbound middleware that races the chain (the timeout) races the
//! *entire* downstream, outbound included.
//!
//! Outbound middlewares are a flat ordered list. Stages marked `always`
//! run even when the context sets `skip_outbound`; when an inbound
//! middleware short-circuits, only the `always` stages run.
//!
//! Ordering: inbound executes ascending by `(order, registration)`;
//! outbound executes descending, so a negative order runs first inbound
//! and last outbound. Equal orders keep registration sequence.

use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    catalog::HandlerFn,
    context::{ContextState, PacketContext},
    error::{DispatchError, Result},
    projection::Reply,
};

/// An inbound pipeline stage.
#[async_trait]
pub trait InboundMiddleware: Send + Sync {
    /// Stage name for logs.
    fn name(&self) -> &'static str;

    /// Position in the inbound ordering (ascending).
    fn order(&self) -> i32;

    /// Process the context, calling `next.run(ctx)` to continue the chain.
    /// Not calling it short-circuits: the handler is skipped and only
    /// `always` outbound stages run.
    async fn handle(&self, ctx: &mut PacketContext, next: Next<'_>) -> Result<()>;
}

/// An outbound pipeline stage.
#[async_trait]
pub trait OutboundMiddleware: Send + Sync {
    /// Stage name for logs.
    fn name(&self) -> &'static str;

    /// Position in the outbound ordering (descending).
    fn order(&self) -> i32;

    /// Run even when the context sets `skip_outbound`.
    fn always(&self) -> bool {
        false
    }

    /// Process (typically rewrite `ctx.reply`) after the handler.
    async fn handle(&self, ctx: &mut PacketContext) -> Result<()>;
}

/// Continuation handed to each inbound middleware.
pub struct Next<'a> {
    chain: &'a [Arc<dyn InboundMiddleware>],
    pipeline: &'a Pipeline,
    handler: &'a HandlerFn,
}

impl Next<'_> {
    /// Run the rest of the chain, ending in the handler and the outbound
    /// stage.
    pub async fn run(self, ctx: &mut PacketContext) -> Result<()> {
        match self.chain.split_first() {
            Some((middleware, rest)) => {
                let next = Next { chain: rest, pipeline: self.pipeline, handler: self.handler };
                middleware.handle(ctx, next).await
            },
            None => self.pipeline.terminal(ctx, self.handler).await,
        }
    }
}

/// Frozen middleware chain.
pub struct Pipeline {
    inbound: Vec<Arc<dyn InboundMiddleware>>,
    outbound: Vec<Arc<dyn OutboundMiddleware>>,
}

impl Pipeline {
    /// Start composing a pipeline.
    #[must_use]
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    /// Dispatch one context through inbound → handler → outbound.
    pub async fn run(&self, ctx: &mut PacketContext, handler: &HandlerFn) -> Result<()> {
        ctx.state = ContextState::InboundChain;
        let next = Next { chain: &self.inbound, pipeline: self, handler };
        let result = next.run(ctx).await;

        if matches!(result, Err(DispatchError::Canceled)) {
            // Quiet teardown: no outbound stages, no reply
            ctx.state = ContextState::Aborted;
            return result;
        }

        if ctx.state == ContextState::InboundChain {
            ctx.state = ContextState::ShortCircuited;
        }

        // A short-circuited chain never reached the terminal, but the
        // always-on outbound stages are still owed their run
        if !ctx.outbound_ran {
            self.run_outbound(ctx, true).await?;
        }

        if result.is_ok() {
            ctx.state = ContextState::Completed;
        }
        result
    }

    /// Terminal of the inbound onion: handler, projection, outbound.
    async fn terminal(&self, ctx: &mut PacketContext, handler: &HandlerFn) -> Result<()> {
        let outcome = (handler)(ctx).await;

        let handler_error = match outcome {
            Ok(Reply::Packet(reply)) => {
                ctx.reply = Some(reply);
                ctx.state = ContextState::Handled;
                None
            },
            Ok(Reply::None) => {
                ctx.state = ContextState::Handled;
                None
            },
            Err(DispatchError::Canceled) => return Err(DispatchError::Canceled),
            Err(error) => {
                ctx.state = ContextState::Faulted;
                Some(error)
            },
        };

        // Faulted contexts still traverse outbound (reply is empty); the
        // handler error is surfaced afterwards
        self.run_outbound(ctx, false).await?;

        match handler_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn run_outbound(&self, ctx: &mut PacketContext, always_only: bool) -> Result<()> {
        ctx.outbound_ran = true;
        if !always_only {
            ctx.state = ContextState::OutboundChain;
        }

        for middleware in &self.outbound {
            let eligible = if always_only {
                middleware.always()
            } else {
                middleware.always() || !ctx.skip_outbound
            };
            if eligible {
                middleware.handle(ctx).await?;
            }
        }
        Ok(())
    }

    /// Registered inbound stages in execution order.
    #[must_use]
    pub fn inbound_names(&self) -> Vec<&'static str> {
        self.inbound.iter().map(|m| m.name()).collect()
    }

    /// Registered outbound stages in execution order.
    #[must_use]
    pub fn outbound_names(&self) -> Vec<&'static str> {
        self.outbound.iter().map(|m| m.name()).collect()
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("inbound", &self.inbound_names())
            .field("outbound", &self.outbound_names())
            .finish()
    }
}

/// Pipeline under construction.
#[derive(Default)]
pub struct PipelineBuilder {
    inbound: Vec<Arc<dyn InboundMiddleware>>,
    outbound: Vec<Arc<dyn OutboundMiddleware>>,
}

impl PipelineBuilder {
    /// Add an inbound stage.
    #[must_use]
    pub fn inbound(mut self, middleware: Arc<dyn InboundMiddleware>) -> Self {
        self.inbound.push(middleware);
        self
    }

    /// Add an outbound stage.
    #[must_use]
    pub fn outbound(mut self, middleware: Arc<dyn OutboundMiddleware>) -> Self {
        self.outbound.push(middleware);
        self
    }

    /// Freeze the stage ordering.
    ///
    /// Sorts are stable, so stages with equal `order` keep their
    /// registration sequence.
    #[must_use]
    pub fn build(mut self) -> Pipeline {
        self.inbound.sort_by_key(|m| m.order());
        self.outbound.sort_by_key(|m| std::cmp::Reverse(m.order()));
        Pipeline { inbound: self.inbound, outbound: self.outbound }
    }
}
