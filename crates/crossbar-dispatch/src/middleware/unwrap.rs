//! Unwrap middleware: inbound decrypt → decompress.

use std::sync::Arc;

use async_trait::async_trait;
use crossbar_crypto::CipherSuite;
use crossbar_proto::{ControlPacket, Packet, PacketFlags};

use crate::{
    context::PacketContext,
    error::{DispatchError, Result},
    middleware::UNWRAP_ORDER,
    pipeline::{InboundMiddleware, Next},
    registry::TransformerRegistry,
    transform,
};

/// Restores the plaintext payload before the handler runs.
///
/// Runs last in the inbound chain. Decryption precedes decompression (the
/// inverse of the outbound order). Pipeline-managed types get the generic
/// transforms driven by the connection's negotiated cipher; packet-managed
/// types run their own registered closures. Any failure emits a FAIL
/// control packet and short-circuits — the handler never sees a payload
/// that did not unwrap cleanly.
pub struct UnwrapMiddleware {
    registry: Arc<TransformerRegistry>,
    suite: Arc<CipherSuite>,
}

impl UnwrapMiddleware {
    /// Middleware over the dispatcher's registry and cipher suite.
    #[must_use]
    pub fn new(registry: Arc<TransformerRegistry>, suite: Arc<CipherSuite>) -> Self {
        Self { registry, suite }
    }

    fn unwrap_packet(&self, ctx: &PacketContext) -> Result<Packet> {
        let entry = self
            .registry
            .entry(ctx.packet.magic())
            .ok_or(DispatchError::UnsupportedPacket { magic: ctx.packet.magic() })?;

        let mut packet = ctx.packet.clone();

        if packet.flags().contains(PacketFlags::ENCRYPTED) {
            let algorithm = ctx.connection.encryption_algorithm();
            let key = ctx.connection.encryption_key().ok_or_else(|| {
                DispatchError::TransformFailed("connection has no negotiated key".into())
            })?;

            packet = if entry.is_pipeline_managed() {
                transform::decrypt(&packet, &self.suite, &key, algorithm)?
            } else {
                entry.decrypt_inline(&packet, &key, algorithm)?
            };
        }

        if packet.flags().contains(PacketFlags::COMPRESSED) {
            packet = if entry.is_pipeline_managed() {
                transform::decompress(&packet)?
            } else {
                entry.decompress_inline(&packet)?
            };
        }

        Ok(packet)
    }
}

#[async_trait]
impl InboundMiddleware for UnwrapMiddleware {
    fn name(&self) -> &'static str {
        "unwrap"
    }

    fn order(&self) -> i32 {
        UNWRAP_ORDER
    }

    async fn handle(&self, ctx: &mut PacketContext, next: Next<'_>) -> Result<()> {
        if !ctx.packet.flags().intersects(PacketFlags::ENCRYPTED | PacketFlags::COMPRESSED) {
            return next.run(ctx).await;
        }

        match self.unwrap_packet(ctx) {
            Ok(packet) => {
                ctx.packet = packet;
                next.run(ctx).await
            },
            Err(error) => {
                tracing::warn!(
                    opcode = ctx.packet.opcode(),
                    connection = ctx.connection.id(),
                    %error,
                    "inbound unwrap failed"
                );

                ctx.skip_outbound = true;
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

#[cfg(test)]
mod tests {
    use crossbar_crypto::{Algorithm, EncryptionKey};
    use crossbar_proto::{ControlReason, builtin, codec, magic};
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::{
        catalog::{HandlerFn, HandlerMeta},
        connection::PermissionLevel,
        pipeline::Pipeline,
        projection::Reply,
        registry::{Transformer, TransformerRegistryBuilder},
        testing::LoopbackConnection,
    };

    fn deps() -> (Arc<TransformerRegistry>, Arc<CipherSuite>) {
        let registry = TransformerRegistryBuilder::new()
            .with_builtin_types()
            .register(0x0100_0001, Transformer::pipeline_managed())
            .unwrap()
            .freeze();
        (Arc::new(registry), Arc::new(CipherSuite::standard()))
    }

    fn capture_handler() -> (HandlerFn, Arc<parking_lot::Mutex<Option<Packet>>>) {
        let seen = Arc::new(parking_lot::Mutex::new(None));
        let handler: HandlerFn = {
            let seen = Arc::clone(&seen);
            Arc::new(move |ctx| {
                *seen.lock() = Some(ctx.packet.clone());
                Box::pin(async { Ok(Reply::None) })
            })
        };
        (handler, seen)
    }

    #[tokio::test]
    async fn encrypted_compressed_packet_reaches_handler_in_plaintext() {
        let (registry, suite) = deps();
        let key = EncryptionKey::from([0x22u8; 32]);

        let original = Packet::new(0x0100_0001, 0x60, vec![0x7Eu8; 3000]).unwrap();
        let wrapped = transform::encrypt(
            &transform::compress(&original).unwrap(),
            &suite,
            &key,
            Algorithm::ChaCha20Poly1305,
        )
        .unwrap();

        let pipeline = Pipeline::builder()
            .inbound(Arc::new(UnwrapMiddleware::new(registry, suite)))
            .build();

        let connection = LoopbackConnection::configured(
            1,
            PermissionLevel::Guest,
            Algorithm::ChaCha20Poly1305,
            Some(key),
        );
        let mut ctx = PacketContext::new(
            wrapped,
            Arc::clone(&connection) as _,
            Arc::new(HandlerMeta::default()),
            CancellationToken::new(),
        );

        let (handler, seen) = capture_handler();
        pipeline.run(&mut ctx, &handler).await.unwrap();

        let seen = seen.lock().clone().expect("handler ran");
        assert_eq!(seen.payload(), original.payload());
        assert!(seen.flags().is_empty());
        assert!(seen.is_valid());
    }

    #[tokio::test]
    async fn tampered_ciphertext_fails_with_control_packet() {
        let (registry, suite) = deps();
        let key = EncryptionKey::from([0x22u8; 32]);

        let original = Packet::new(0x0100_0001, 0x60, b"secret".as_slice()).unwrap();
        let sealed =
            transform::encrypt(&original, &suite, &key, Algorithm::ChaCha20Poly1305).unwrap();
        let mut payload = sealed.payload().to_vec();
        let last = payload.len() - 1;
        payload[last] ^= 0x80;
        let mut tampered = sealed;
        tampered.update_payload(payload).unwrap();

        let pipeline = Pipeline::builder()
            .inbound(Arc::new(UnwrapMiddleware::new(registry, suite)))
            .build();

        let connection = LoopbackConnection::configured(
            1,
            PermissionLevel::Guest,
            Algorithm::ChaCha20Poly1305,
            Some(key),
        );
        let mut ctx = PacketContext::new(
            tampered,
            Arc::clone(&connection) as _,
            Arc::new(HandlerMeta::default()),
            CancellationToken::new(),
        );

        let (handler, seen) = capture_handler();
        pipeline.run(&mut ctx, &handler).await.unwrap();

        assert!(seen.lock().is_none(), "handler must not see tampered payloads");
        let controls = connection.sent_controls();
        assert_eq!(controls.len(), 1);
        assert_eq!(controls[0].reason, ControlReason::TransformFailed);
    }

    #[tokio::test]
    async fn missing_key_fails_closed() {
        let (registry, suite) = deps();
        let key = EncryptionKey::from([0x22u8; 32]);
        let sealed = transform::encrypt(
            &Packet::new(0x0100_0001, 0x60, b"secret".as_slice()).unwrap(),
            &suite,
            &key,
            Algorithm::ChaCha20Poly1305,
        )
        .unwrap();

        let pipeline = Pipeline::builder()
            .inbound(Arc::new(UnwrapMiddleware::new(registry, suite)))
            .build();

        // Connection never negotiated a key
        let connection = LoopbackConnection::new(1);
        let mut ctx = PacketContext::new(
            sealed,
            Arc::clone(&connection) as _,
            Arc::new(HandlerMeta::default()),
            CancellationToken::new(),
        );

        let (handler, seen) = capture_handler();
        pipeline.run(&mut ctx, &handler).await.unwrap();

        assert!(seen.lock().is_none());
        assert_eq!(connection.sent_controls()[0].reason, ControlReason::TransformFailed);
    }

    #[tokio::test]
    async fn packet_managed_type_without_decompress_reports_capability() {
        let registry = TransformerRegistryBuilder::new()
            .register(
                0x0100_0002,
                Transformer::packet_managed(Arc::new(|bytes| codec::decode(bytes, false))),
            )
            .unwrap()
            .freeze();
        let suite = Arc::new(CipherSuite::standard());

        let mut compressed = Packet::new(0x0100_0002, 0x61, b"zz".as_slice()).unwrap();
        compressed.update_flags(PacketFlags::COMPRESSED);

        let pipeline = Pipeline::builder()
            .inbound(Arc::new(UnwrapMiddleware::new(Arc::new(registry), suite)))
            .build();

        let connection = LoopbackConnection::new(1);
        let mut ctx = PacketContext::new(
            compressed,
            Arc::clone(&connection) as _,
            Arc::new(HandlerMeta::default()),
            CancellationToken::new(),
        );

        let (handler, seen) = capture_handler();
        pipeline.run(&mut ctx, &handler).await.unwrap();

        assert!(seen.lock().is_none());
        assert_eq!(
            connection.sent_controls()[0].reason,
            ControlReason::CompressionUnsupported
        );
    }

    #[tokio::test]
    async fn plain_packets_pass_untouched() {
        let (registry, suite) = deps();
        let pipeline = Pipeline::builder()
            .inbound(Arc::new(UnwrapMiddleware::new(registry, suite)))
            .build();

        let plain = builtin::binary_reply(0x10, crossbar_proto::Priority::Normal, b"raw").unwrap();
        assert_eq!(plain.magic(), magic::builtin::BINARY_128);

        let connection = LoopbackConnection::new(1);
        let mut ctx = PacketContext::new(
            plain.clone(),
            Arc::clone(&connection) as _,
            Arc::new(HandlerMeta::default()),
            CancellationToken::new(),
        );

        let (handler, seen) = capture_handler();
        pipeline.run(&mut ctx, &handler).await.unwrap();
        assert_eq!(seen.lock().clone().unwrap().payload(), plain.payload());
    }
}
