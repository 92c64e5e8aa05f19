//! Permission middleware.

use async_trait::async_trait;
use crossbar_proto::builtin;

use crate::{
    context::PacketContext,
    error::Result,
    middleware::PERMISSION_ORDER,
    pipeline::{InboundMiddleware, Next},
};

/// Gates handlers on the connection's permission level.
///
/// Below-level requests get a literal `Permission denied` text reply and
/// never reach the handler.
#[derive(Debug, Default)]
pub struct PermissionMiddleware;

#[async_trait]
impl InboundMiddleware for PermissionMiddleware {
    fn name(&self) -> &'static str {
        "permission"
    }

    fn order(&self) -> i32 {
        PERMISSION_ORDER
    }

    async fn handle(&self, ctx: &mut PacketContext, next: Next<'_>) -> Result<()> {
        let required = ctx.meta.permission_level;
        let actual = ctx.connection.permission_level();

        if actual < required {
            tracing::warn!(
                opcode = ctx.packet.opcode(),
                connection = ctx.connection.id(),
                ?required,
                ?actual,
                "permission denied"
            );

            let request = ctx.reply_context();
            let reply = builtin::text_reply(request.opcode, request.priority, "Permission denied")?;
            ctx.connection.send(reply).await?;
            return Ok(());
        }

        next.run(ctx).await
    }
}
