//! The packet value type.
//!
//! A `Packet` is the unit the dispatcher routes: a typed view over one wire
//! frame. Two construction paths exist: [`Packet::new`] computes the
//! timestamp, id, and checksum from scratch; [`Packet::from_wire`] adopts a
//! decoded header and trusts the checksum it carries (validation is the
//! codec's, and optionally the caller's, job).

use std::{
    hash::{Hash, Hasher},
    time::{Duration, SystemTime},
};

use crate::{
    errors::{ProtocolError, Result},
    flags::{PacketFlags, Priority, TransportTag},
    header::WireHeader,
    payload::PayloadBuf,
};

/// One framed protocol packet.
///
/// # Invariants
///
/// - `length() == WireHeader::SIZE + payload.len()` and never exceeds 65535;
///   enforced at construction and on [`Packet::update_payload`].
/// - `checksum` is CRC-32 over the payload bytes as they currently are. When
///   the `ENCRYPTED` flag is set the payload bytes *are* the ciphertext, so
///   the checksum covers ciphertext.
/// - `id == timestamp % 256`; both are fixed at creation.
///
/// Equality and hashing deliberately compare only
/// `(opcode, flags, priority, payload)` — the routing-relevant content —
/// so a re-framed packet compares equal to its original across timestamp
/// and id churn.
#[derive(Clone)]
pub struct Packet {
    magic: u32,
    opcode: u16,
    flags: PacketFlags,
    priority: Priority,
    transport: TransportTag,
    id: u8,
    timestamp: u64,
    checksum: u32,
    payload: PayloadBuf,
}

impl Packet {
    /// Create a packet from raw fields.
    ///
    /// Computes the creation timestamp (Unix milliseconds), the derived id
    /// (`timestamp % 256`), and the payload CRC. Flags default to empty,
    /// priority to `Normal`, transport to `None`; adjust with the `with_*`
    /// builders.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::PayloadTooLarge`] if the payload cannot be framed in
    /// a 16-bit length.
    pub fn new(magic: u32, opcode: u16, payload: impl Into<PayloadBuf>) -> Result<Self> {
        let payload = payload.into();
        if payload.len() > WireHeader::MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: payload.len(),
                max: WireHeader::MAX_PAYLOAD_SIZE,
            });
        }

        let timestamp = now_ms();
        Ok(Self {
            magic,
            opcode,
            flags: PacketFlags::empty(),
            priority: Priority::Normal,
            transport: TransportTag::None,
            id: (timestamp % 256) as u8,
            timestamp,
            checksum: crc32fast::hash(payload.as_slice()),
            payload,
        })
    }

    /// Adopt a decoded wire header and payload.
    ///
    /// Trusts the header's checksum claim; run [`Packet::is_valid`] (or
    /// decode with CRC validation) to verify it. Rejects unknown priority
    /// and transport bytes.
    pub fn from_wire(header: &WireHeader, payload: PayloadBuf) -> Result<Self> {
        Ok(Self {
            magic: header.magic(),
            opcode: header.opcode(),
            flags: PacketFlags::from_byte(header.flags()),
            priority: Priority::try_from(header.priority())?,
            transport: TransportTag::try_from(header.transport())?,
            id: header.id(),
            timestamp: header.timestamp(),
            checksum: header.checksum(),
            payload,
        })
    }

    /// Set the dispatch priority.
    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the flag byte.
    #[must_use]
    pub fn with_flags(mut self, flags: PacketFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Set the transport tag.
    #[must_use]
    pub fn with_transport(mut self, transport: TransportTag) -> Self {
        self.transport = transport;
        self
    }

    /// Packet type identifier.
    #[must_use]
    pub fn magic(&self) -> u32 {
        self.magic
    }

    /// Handler selector within the packet type.
    #[must_use]
    pub fn opcode(&self) -> u16 {
        self.opcode
    }

    /// Processing flags.
    #[must_use]
    pub fn flags(&self) -> PacketFlags {
        self.flags
    }

    /// Dispatch priority.
    #[must_use]
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Transport the packet is associated with.
    #[must_use]
    pub fn transport(&self) -> TransportTag {
        self.transport
    }

    /// Short id derived from the creation timestamp.
    #[must_use]
    pub fn id(&self) -> u8 {
        self.id
    }

    /// Creation time, Unix milliseconds.
    #[must_use]
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// CRC-32 the header claims for the payload.
    #[must_use]
    pub fn checksum(&self) -> u32 {
        self.checksum
    }

    /// Payload bytes.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        self.payload.as_slice()
    }

    /// Payload storage (tier-aware view).
    #[must_use]
    pub fn payload_buf(&self) -> &PayloadBuf {
        &self.payload
    }

    /// Total serialized length, header included.
    #[must_use]
    pub fn length(&self) -> u16 {
        (WireHeader::SIZE + self.payload.len()) as u16
    }

    /// Replace the payload and recompute the checksum.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::PayloadTooLarge`] if the new payload cannot be
    /// framed; the packet is left unchanged in that case.
    pub fn update_payload(&mut self, payload: impl Into<PayloadBuf>) -> Result<()> {
        let payload = payload.into();
        if payload.len() > WireHeader::MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: payload.len(),
                max: WireHeader::MAX_PAYLOAD_SIZE,
            });
        }
        self.checksum = crc32fast::hash(payload.as_slice());
        self.payload = payload;
        Ok(())
    }

    /// Replace the flag byte. Payload and checksum are untouched.
    pub fn update_flags(&mut self, flags: PacketFlags) {
        self.flags = flags;
    }

    /// Checksum claim matches the payload bytes.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        crc32fast::hash(self.payload.as_slice()) == self.checksum
    }

    /// Packet is older than `ttl`.
    #[must_use]
    pub fn is_expired(&self, ttl: Duration) -> bool {
        now_ms().saturating_sub(self.timestamp) > ttl.as_millis() as u64
    }

    /// Stable 64-bit digest over `(opcode, flags, priority, payload)`.
    ///
    /// FNV-1a, so the value is reproducible across processes and releases,
    /// unlike `Hash` which follows the hasher the map supplies.
    #[must_use]
    pub fn content_digest(&self) -> u64 {
        const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
        const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

        let mut digest = FNV_OFFSET;
        let mut fold = |byte: u8| {
            digest ^= u64::from(byte);
            digest = digest.wrapping_mul(FNV_PRIME);
        };

        for byte in self.opcode.to_le_bytes() {
            fold(byte);
        }
        fold(self.flags.to_byte());
        fold(self.priority as u8);
        for &byte in self.payload.as_slice() {
            fold(byte);
        }
        digest
    }

    /// Wire header rebuilt from the packet's current fields.
    #[must_use]
    pub fn header(&self) -> WireHeader {
        WireHeader::new(
            self.magic,
            self.opcode,
            self.flags.to_byte(),
            self.priority as u8,
            self.transport as u8,
            self.id,
            self.timestamp,
            self.checksum,
            self.payload.len(),
        )
    }
}

impl PartialEq for Packet {
    fn eq(&self, other: &Self) -> bool {
        self.opcode == other.opcode
            && self.flags == other.flags
            && self.priority == other.priority
            && self.payload == other.payload
    }
}

impl Eq for Packet {}

impl Hash for Packet {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.opcode.hash(state);
        self.flags.to_byte().hash(state);
        (self.priority as u8).hash(state);
        self.payload.hash(state);
    }
}

impl std::fmt::Debug for Packet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Packet")
            .field("magic", &format!("{:#010x}", self.magic))
            .field("opcode", &format!("{:#06x}", self.opcode))
            .field("flags", &self.flags)
            .field("priority", &self.priority)
            .field("transport", &self.transport)
            .field("id", &self.id)
            .field("timestamp", &self.timestamp)
            .field("length", &self.length())
            .finish_non_exhaustive()
    }
}

/// Current Unix time in milliseconds.
pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_millis() as u64)
}
