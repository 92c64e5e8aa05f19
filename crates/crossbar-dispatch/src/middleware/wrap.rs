//! Wrap middleware: outbound compress → encrypt.

use std::sync::Arc;

use async_trait::async_trait;
use crossbar_crypto::CipherSuite;
use crossbar_proto::{ControlPacket, ControlReason, Packet, TransportTag};

use crate::{
    context::PacketContext,
    error::{DispatchError, Result},
    middleware::WRAP_ORDER,
    pipeline::OutboundMiddleware,
    registry::TransformerRegistry,
    transform,
};

/// Applies outbound transforms to the reply: compression when the size
/// warrants it, then encryption when the handler requires it.
///
/// Compression is opportunistic and transport-aware — TCP replies compress
/// above twice the configured threshold, UDP replies only in the 600-1200
/// byte band (where it still fits a datagram and is worth the cycles) —
/// and is skipped silently when the reply's type has no compression
/// capability. Encryption is mandatory when the handler's attributes say
/// so: a missing cipher, key, or per-type closure turns the reply into a
/// FAIL control packet instead of sending plaintext.
pub struct WrapMiddleware {
    registry: Arc<TransformerRegistry>,
    suite: Arc<CipherSuite>,
    compression_threshold: usize,
}

impl WrapMiddleware {
    /// Middleware over the dispatcher's registry, suite, and threshold.
    #[must_use]
    pub fn new(
        registry: Arc<TransformerRegistry>,
        suite: Arc<CipherSuite>,
        compression_threshold: usize,
    ) -> Self {
        Self { registry, suite, compression_threshold }
    }

    fn size_warrants_compression(&self, transport: TransportTag, payload_len: usize) -> bool {
        match transport {
            TransportTag::Tcp | TransportTag::None => {
                payload_len > self.compression_threshold.saturating_mul(2)
            },
            TransportTag::Udp => (600..=1200).contains(&payload_len),
        }
    }

    fn wrap_reply(&self, ctx: &PacketContext, mut reply: Packet) -> Result<Packet> {
        let entry = self.registry.entry(reply.magic());

        if let Some(entry) = entry {
            let compressible = self
                .size_warrants_compression(ctx.packet.transport(), reply.payload().len())
                && entry.can_compress();
            if compressible {
                reply = if entry.is_pipeline_managed() {
                    transform::compress(&reply)?
                } else {
                    entry.compress_inline(&reply)?
                };
            }
        }

        if ctx.meta.encryption_required {
            let entry = entry.ok_or(DispatchError::UnsupportedOperation {
                code: ControlReason::CryptoUnsupported,
            })?;
            let key = ctx.connection.encryption_key().ok_or(
                DispatchError::UnsupportedOperation { code: ControlReason::CryptoUnsupported },
            )?;
            let algorithm = ctx.connection.encryption_algorithm();

            reply = if entry.is_pipeline_managed() {
                transform::encrypt(&reply, &self.suite, &key, algorithm)?
            } else {
                entry.encrypt_inline(&reply, &key, algorithm)?
            };
        }

        Ok(reply)
    }
}

#[async_trait]
impl OutboundMiddleware for WrapMiddleware {
    fn name(&self) -> &'static str {
        "wrap"
    }

    fn order(&self) -> i32 {
        WRAP_ORDER
    }

    async fn handle(&self, ctx: &mut PacketContext) -> Result<()> {
        let Some(reply) = ctx.reply.take() else {
            return Ok(());
        };

        match self.wrap_reply(ctx, reply) {
            Ok(wrapped) => {
                ctx.reply = Some(wrapped);
                Ok(())
            },
            Err(error) => {
                tracing::warn!(
                    opcode = ctx.packet.opcode(),
                    connection = ctx.connection.id(),
                    %error,
                    "outbound wrap failed; reply dropped"
                );

                let fail = ControlPacket::fail(
                    error.control_reason(),
                    error.advice(),
                    ctx.sequence_id(),
                );
                ctx.connection.send_control(fail).await?;
                Ok(())
            },
        }
    }
}
