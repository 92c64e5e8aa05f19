//! Transformer registry.
//!
//! Binds each packet type (by magic) to its decode and transform
//! operations, and to the policy choice that drives the wrap/unwrap
//! middlewares: *pipeline-managed* types get the generic LZ4/cipher
//! transforms; *packet-managed* types run their own registered closures.
//!
//! The registry is built once at startup and frozen; lookups afterwards
//! are `O(1)` on an immutable map shared across workers without locking.

use std::{collections::HashMap, sync::Arc};

use crossbar_crypto::{Algorithm, EncryptionKey};
use crossbar_proto::{ControlReason, Packet, ProtocolError, codec, magic};
use thiserror::Error;

use crate::error::{DispatchError, Result};

/// Decodes wire bytes into a packet of this type.
pub type DecodeFn =
    Arc<dyn Fn(&[u8]) -> std::result::Result<Packet, ProtocolError> + Send + Sync>;

/// Per-type encrypt or decrypt operation.
pub type CryptoTransformFn =
    Arc<dyn Fn(&Packet, &EncryptionKey, Algorithm) -> Result<Packet> + Send + Sync>;

/// Per-type compress or decompress operation.
pub type CodecTransformFn = Arc<dyn Fn(&Packet) -> Result<Packet> + Send + Sync>;

/// Errors raised while building the registry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Magic registered twice
    #[error("transformer already registered for magic {0:#010x}")]
    DuplicateMagic(u32),

    /// Application registration inside the framework-reserved range
    #[error("magic {0:#010x} is below the application range (must be >= 0x0100_0000)")]
    ReservedMagic(u32),
}

/// One packet type's operations and transform policy.
#[derive(Clone)]
pub struct Transformer {
    decode: DecodeFn,
    encrypt: Option<CryptoTransformFn>,
    decrypt: Option<CryptoTransformFn>,
    compress: Option<CodecTransformFn>,
    decompress: Option<CodecTransformFn>,
    pipeline_managed: bool,
}

impl Transformer {
    /// Pipeline-managed type: the wrap/unwrap middlewares run the generic
    /// transforms; decode is the standard codec.
    #[must_use]
    pub fn pipeline_managed() -> Self {
        Self {
            decode: Arc::new(|bytes| codec::decode(bytes, false)),
            encrypt: None,
            decrypt: None,
            compress: None,
            decompress: None,
            pipeline_managed: true,
        }
    }

    /// Packet-managed type: the type's own closures are called inline.
    #[must_use]
    pub fn packet_managed(decode: DecodeFn) -> Self {
        Self {
            decode,
            encrypt: None,
            decrypt: None,
            compress: None,
            decompress: None,
            pipeline_managed: false,
        }
    }

    /// Register the type's encrypt operation.
    #[must_use]
    pub fn with_encrypt(mut self, f: CryptoTransformFn) -> Self {
        self.encrypt = Some(f);
        self
    }

    /// Register the type's decrypt operation.
    #[must_use]
    pub fn with_decrypt(mut self, f: CryptoTransformFn) -> Self {
        self.decrypt = Some(f);
        self
    }

    /// Register the type's compress operation.
    #[must_use]
    pub fn with_compress(mut self, f: CodecTransformFn) -> Self {
        self.compress = Some(f);
        self
    }

    /// Register the type's decompress operation.
    #[must_use]
    pub fn with_decompress(mut self, f: CodecTransformFn) -> Self {
        self.decompress = Some(f);
        self
    }

    /// Wrap/unwrap middlewares own this type's transforms.
    #[must_use]
    pub fn is_pipeline_managed(&self) -> bool {
        self.pipeline_managed
    }

    /// Type can be encrypted (generically or via its own closure).
    #[must_use]
    pub fn can_encrypt(&self) -> bool {
        self.pipeline_managed || self.encrypt.is_some()
    }

    /// Type can be compressed (generically or via its own closure).
    #[must_use]
    pub fn can_compress(&self) -> bool {
        self.pipeline_managed || self.compress.is_some()
    }

    /// Decode wire bytes as this type.
    pub fn decode(&self, bytes: &[u8]) -> std::result::Result<Packet, ProtocolError> {
        (self.decode)(bytes)
    }

    /// Run the type's own encrypt closure.
    pub fn encrypt_inline(
        &self,
        packet: &Packet,
        key: &EncryptionKey,
        algorithm: Algorithm,
    ) -> Result<Packet> {
        let f = self.encrypt.as_ref().ok_or(DispatchError::UnsupportedOperation {
            code: ControlReason::CryptoUnsupported,
        })?;
        f(packet, key, algorithm)
    }

    /// Run the type's own decrypt closure.
    pub fn decrypt_inline(
        &self,
        packet: &Packet,
        key: &EncryptionKey,
        algorithm: Algorithm,
    ) -> Result<Packet> {
        let f = self.decrypt.as_ref().ok_or(DispatchError::UnsupportedOperation {
            code: ControlReason::CryptoUnsupported,
        })?;
        f(packet, key, algorithm)
    }

    /// Run the type's own compress closure.
    pub fn compress_inline(&self, packet: &Packet) -> Result<Packet> {
        let f = self.compress.as_ref().ok_or(DispatchError::UnsupportedOperation {
            code: ControlReason::CompressionUnsupported,
        })?;
        f(packet)
    }

    /// Run the type's own decompress closure.
    pub fn decompress_inline(&self, packet: &Packet) -> Result<Packet> {
        let f = self.decompress.as_ref().ok_or(DispatchError::UnsupportedOperation {
            code: ControlReason::CompressionUnsupported,
        })?;
        f(packet)
    }
}

impl std::fmt::Debug for Transformer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transformer")
            .field("pipeline_managed", &self.pipeline_managed)
            .field("encrypt", &self.encrypt.is_some())
            .field("decrypt", &self.decrypt.is_some())
            .field("compress", &self.compress.is_some())
            .field("decompress", &self.decompress.is_some())
            .finish()
    }
}

/// Mutable registry under construction.
#[derive(Debug, Default)]
pub struct TransformerRegistryBuilder {
    entries: HashMap<u32, Transformer>,
}

impl TransformerRegistryBuilder {
    /// Empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every built-in packet type (control, handshake, binary and
    /// text tiers, time-sync) as pipeline-managed.
    #[must_use]
    pub fn with_builtin_types(mut self) -> Self {
        for magic in [
            magic::builtin::HANDSHAKE,
            magic::builtin::CONTROL,
            magic::builtin::BINARY_128,
            magic::builtin::BINARY_256,
            magic::builtin::BINARY_512,
            magic::builtin::BINARY_1024,
            magic::builtin::TEXT_256,
            magic::builtin::TEXT_512,
            magic::builtin::TEXT_1024,
            magic::builtin::DIRECTIVE,
            magic::builtin::TIME_SYNC,
        ] {
            self.entries.insert(magic, Transformer::pipeline_managed());
        }
        self
    }

    /// Register an application packet type.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::ReservedMagic`] if `magic` is below the
    ///   application range
    /// - [`RegistryError::DuplicateMagic`] if the magic is already bound
    pub fn register(
        mut self,
        magic_value: u32,
        transformer: Transformer,
    ) -> std::result::Result<Self, RegistryError> {
        if !magic::is_application(magic_value) {
            return Err(RegistryError::ReservedMagic(magic_value));
        }
        if self.entries.contains_key(&magic_value) {
            return Err(RegistryError::DuplicateMagic(magic_value));
        }
        self.entries.insert(magic_value, transformer);
        Ok(self)
    }

    /// Freeze into the immutable registry.
    #[must_use]
    pub fn freeze(self) -> TransformerRegistry {
        TransformerRegistry { entries: self.entries }
    }
}

/// Immutable magic-to-transformer map.
#[derive(Debug)]
pub struct TransformerRegistry {
    entries: HashMap<u32, Transformer>,
}

impl TransformerRegistry {
    /// Transformer for a magic, if the type is registered.
    #[must_use]
    pub fn entry(&self, magic_value: u32) -> Option<&Transformer> {
        self.entries.get(&magic_value)
    }

    /// Magic has a registered type.
    #[must_use]
    pub fn supports(&self, magic_value: u32) -> bool {
        self.entries.contains_key(&magic_value)
    }

    /// Registered type count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// No types registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
