//! Device packet envelope and its two wire layouts.
//!
//! The envelope is the outer framing of every packet a device emits: source
//! and parent ids, timestamps, sequence numbers, and up to two opaque payload
//! buffers. Two binary layouts exist for it: the legacy instrument layout
//! ([legacy]) and the current versioned storage layout ([wire]). The codecs
//! here are stateless pure functions between bytes and [Envelope].

pub mod legacy;
pub mod wire;

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

/// Classification of an envelope's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PacketKind {
    Metadata,
    SensorData,
    DeviceMessage,
}

/// Object-model/wire code pairs for [PacketKind].
///
/// The in-memory numbering and the storage-wire numbering disagree for
/// historical reasons and both are load-bearing. Keep this one table the
/// single source of truth for the mapping; never derive one code from the
/// other arithmetically.
const KIND_CODES: [(PacketKind, i32, i32); 3] = [
    (PacketKind::Metadata, 0, 1),
    (PacketKind::SensorData, 1, 0),
    (PacketKind::DeviceMessage, 2, 4),
];

impl PacketKind {
    /// In-memory object-model code.
    #[must_use]
    pub fn object_code(self) -> i32 {
        for (k, obj, _) in KIND_CODES {
            if k == self {
                return obj;
            }
        }
        unreachable!("every kind is in KIND_CODES")
    }

    /// Code used in the current storage-wire layout.
    #[must_use]
    pub fn wire_code(self) -> i32 {
        for (k, _, wire) in KIND_CODES {
            if k == self {
                return wire;
            }
        }
        unreachable!("every kind is in KIND_CODES")
    }

    #[must_use]
    pub fn from_object_code(code: i32) -> Option<PacketKind> {
        KIND_CODES
            .iter()
            .find(|(_, obj, _)| *obj == code)
            .map(|(k, _, _)| *k)
    }

    #[must_use]
    pub fn from_wire_code(code: i32) -> Option<PacketKind> {
        KIND_CODES
            .iter()
            .find(|(_, _, wire)| *wire == code)
            .map(|(k, _, _)| *k)
    }

    /// Legacy "second stream id" tag identifying this kind.
    #[must_use]
    pub fn legacy_tag(self) -> i16 {
        match self {
            PacketKind::Metadata => legacy::TAG_METADATA,
            PacketKind::SensorData => legacy::TAG_SENSOR_DATA,
            PacketKind::DeviceMessage => legacy::TAG_DEVICE_MESSAGE,
        }
    }
}

/// Wire-independent, in-memory form of a device packet envelope.
///
/// Constructed by one codec, consumed by the other; immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TypedBuilder)]
pub struct Envelope {
    pub source_id: i64,
    #[builder(default = -1)]
    pub parent_id: i64,
    pub kind: PacketKind,
    /// Record type of the payload; forced to 0 for [PacketKind::Metadata].
    #[builder(default)]
    pub record_sub_type: i64,
    #[builder(default = -1)]
    pub metadata_sequence_number: i64,
    #[builder(default = -1)]
    pub data_description_version: i64,
    pub timestamp_seconds: i64,
    /// Sub-second remainder. Named nanoseconds on the wire but carries
    /// microsecond-scaled values; see [split_epoch_millis].
    #[builder(default)]
    pub timestamp_nanoseconds: i64,
    #[builder(default)]
    pub sequence_number: i64,
    #[builder(default)]
    pub primary_buffer: Option<Vec<u8>>,
    #[builder(default)]
    pub secondary_buffer: Option<Vec<u8>>,
}

impl Envelope {
    /// Timestamp as epoch milliseconds, recombining the split fields.
    #[must_use]
    pub fn timestamp_millis(&self) -> i64 {
        join_epoch_millis(self.timestamp_seconds, self.timestamp_nanoseconds)
    }
}

/// Split epoch milliseconds into the (seconds, "nanoseconds") pair the
/// current wire layout carries.
///
/// The remainder is computed as `(millis % 1000) * 1000`, i.e. microseconds,
/// even though the wire field is named nanoseconds. This is a known defect
/// preserved verbatim for wire compatibility; correcting the scale requires a
/// coordinated format version bump.
#[must_use]
pub fn split_epoch_millis(millis: i64) -> (i64, i64) {
    (millis / 1000, (millis % 1000) * 1000)
}

/// Inverse of [split_epoch_millis].
#[must_use]
pub fn join_epoch_millis(seconds: i64, nanoseconds: i64) -> i64 {
    seconds * 1000 + nanoseconds / 1000
}
