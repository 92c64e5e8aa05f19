//! Timeout middleware.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use crossbar_proto::builtin;

use crate::{
    context::PacketContext,
    error::Result,
    middleware::TIMEOUT_ORDER,
    pipeline::{InboundMiddleware, Next},
};

/// Races the downstream chain against a per-handler deadline.
///
/// The deadline comes from the handler's `timeout` attribute, falling back
/// to the dispatcher default. On expiry the chain is cancelled through a
/// child token (dropping the in-flight future), any reply it produced is
/// discarded, and the peer gets a literal `Request timeout (Nms)` text
/// packet. The conditional outbound stages are skipped.
pub struct TimeoutMiddleware {
    default_timeout: Option<Duration>,
}

impl TimeoutMiddleware {
    /// Middleware with the dispatcher's fallback timeout.
    #[must_use]
    pub fn new(default_timeout: Option<Duration>) -> Self {
        Self { default_timeout }
    }
}

#[async_trait]
impl InboundMiddleware for TimeoutMiddleware {
    fn name(&self) -> &'static str {
        "timeout"
    }

    fn order(&self) -> i32 {
        TIMEOUT_ORDER
    }

    async fn handle(&self, ctx: &mut PacketContext, next: Next<'_>) -> Result<()> {
        let limit = match ctx.meta.timeout.or(self.default_timeout) {
            Some(limit) if !limit.is_zero() => limit,
            _ => return next.run(ctx).await,
        };

        // Downstream gets a child token: cancelling it on expiry cascades
        // into anything the handler spawned, while the worker's own token
        // stays untouched
        let child = ctx.cancellation.child_token();
        let parent = std::mem::replace(&mut ctx.cancellation, child.clone());
        let connection = Arc::clone(&ctx.connection);
        let request = ctx.reply_context();

        let outcome = {
            let downstream = next.run(ctx);
            tokio::pin!(downstream);
            tokio::select! {
                result = &mut downstream => Some(result),
                () = tokio::time::sleep(limit) => {
                    child.cancel();
                    None
                },
            }
        };

        ctx.cancellation = parent;

        match outcome {
            Some(result) => result,
            None => {
                // The handler may have finished a reply in the race window;
                // a timed-out return is discarded either way
                ctx.reply = None;
                ctx.skip_outbound = true;

                tracing::warn!(
                    opcode = request.opcode,
                    limit_ms = limit.as_millis() as u64,
                    connection = connection.id(),
                    "request timed out"
                );

                let text = format!("Request timeout ({}ms)", limit.as_millis());
                let reply = builtin::text_reply(request.opcode, request.priority, &text)?;
                connection.send(reply).await
            },
        }
    }
}
