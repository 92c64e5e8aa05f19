//! Rate-limit middleware.

use std::sync::Arc;

use async_trait::async_trait;
use crossbar_proto::builtin;

use crate::{
    context::PacketContext,
    error::Result,
    limiter::{RateDecision, RateKey, RateScope, SlidingWindowLimiter},
    middleware::RATE_LIMIT_ORDER,
    pipeline::{InboundMiddleware, Next},
};

/// Enforces per-handler sliding-window budgets.
///
/// Budgets are keyed by the peer's IP and the handler's rate group (or its
/// opcode when no group is named). Handlers without a `rate_limit`
/// attribute pass through untouched. Over-budget requests get a literal
/// `Rate limited` text reply and never reach the handler.
pub struct RateLimitMiddleware {
    limiter: Arc<SlidingWindowLimiter>,
}

impl RateLimitMiddleware {
    /// Middleware sharing the dispatcher's limiter state.
    #[must_use]
    pub fn new(limiter: Arc<SlidingWindowLimiter>) -> Self {
        Self { limiter }
    }
}

#[async_trait]
impl InboundMiddleware for RateLimitMiddleware {
    fn name(&self) -> &'static str {
        "rate-limit"
    }

    fn order(&self) -> i32 {
        RATE_LIMIT_ORDER
    }

    async fn handle(&self, ctx: &mut PacketContext, next: Next<'_>) -> Result<()> {
        let Some(spec) = ctx.meta.rate_limit else {
            return next.run(ctx).await;
        };

        let scope = match &ctx.meta.rate_group {
            Some(group) => RateScope::Group(Arc::clone(group)),
            None => RateScope::Opcode(ctx.packet.opcode()),
        };
        let key = RateKey { ip: ctx.connection.remote_endpoint().ip(), scope };

        match self.limiter.check(key, spec.max, spec.window) {
            RateDecision::Allowed => next.run(ctx).await,
            RateDecision::Limited => {
                tracing::warn!(
                    opcode = ctx.packet.opcode(),
                    connection = ctx.connection.id(),
                    max = spec.max,
                    window_ms = spec.window.as_millis() as u64,
                    "rate limited"
                );

                let request = ctx.reply_context();
                let reply =
                    builtin::text_reply(request.opcode, request.priority, "Rate limited")?;
                ctx.connection.send(reply).await?;
                Ok(())
            },
        }
    }
}
