//! Legacy instrument wire layout.
//!
//! This is the layout packets arrive in straight from deployed instruments:
//!
//! ```text
//! i16 stream_id
//! i64 device_packet_version   (ignored)
//! i64 source_id
//! i64 timestamp_millis
//! i64 sequence_number
//! i64 metadata_ref
//! i64 parent_id
//! i64 record_type
//! i16 second_stream_id        (selects the packet kind)
//! i64 second_packet_version   (ignored)
//! i32 first_buffer_length;  byte[first_buffer_length]
//! i32 second_buffer_length; byte[second_buffer_length]
//! ```
//!
//! All integers are big-endian. The second buffer length may be legitimately
//! absent for non-metadata kinds; deployed firmware simply stops writing.

use tracing::{debug, info, warn};

use crate::bytes::{ByteReader, ByteWriter};
use crate::error::FormatError;

use super::{split_epoch_millis, Envelope, PacketKind};

/// Legacy second-stream-id tags. `TAG_BASE` is the plain device packet tag;
/// the kind-specific tags follow it.
pub const TAG_BASE: i16 = 0x0100;
pub const TAG_METADATA: i16 = 0x0101;
pub const TAG_SENSOR_DATA: i16 = 0x0102;
pub const TAG_DEVICE_MESSAGE: i16 = 0x0103;

/// Fixed-size portion of the legacy layout, before the buffers.
const HEADER_LEN: usize = 2 + 8 + 8 + 8 + 8 + 8 + 8 + 8 + 2 + 8;

/// Decode a legacy instrument packet into an [Envelope].
///
/// Unknown second-stream-id tags are accepted and classified as
/// [PacketKind::SensorData]. For metadata packets the two payload buffers are
/// swapped so the descriptive "cause" payload becomes the primary buffer.
///
/// # Errors
/// [FormatError::TooShort] if the fixed header cannot be read, or
/// [FormatError::BufferOverrun] if a buffer length points past the end of the
/// packet.
pub fn decode(buf: &[u8]) -> Result<Envelope, FormatError> {
    let mut r = ByteReader::big_endian(buf);
    let short = |_| FormatError::TooShort {
        actual: buf.len(),
        minimum: HEADER_LEN,
    };

    let _stream_id = r.read_i16().map_err(short)?;
    let _device_packet_version = r.read_i64().map_err(short)?;
    let source_id = r.read_i64().map_err(short)?;
    let timestamp_millis = r.read_i64().map_err(short)?;
    let sequence_number = r.read_i64().map_err(short)?;
    let metadata_ref = r.read_i64().map_err(short)?;
    let parent_id = r.read_i64().map_err(short)?;
    let record_type = r.read_i64().map_err(short)?;
    let second_stream_id = r.read_i16().map_err(short)?;
    let _second_packet_version = r.read_i64().map_err(short)?;

    let kind = match second_stream_id {
        TAG_METADATA => PacketKind::Metadata,
        TAG_SENSOR_DATA => PacketKind::SensorData,
        TAG_DEVICE_MESSAGE => PacketKind::DeviceMessage,
        tag => {
            warn!(
                tag,
                source_id, "unrecognized legacy packet tag; treating as sensor data"
            );
            PacketKind::SensorData
        }
    };

    let first_buffer = read_buffer(&mut r, kind, true)?;
    let second_buffer = read_buffer(&mut r, kind, false)?;

    // Metadata sub-type is always 0 regardless of the legacy record type
    let record_sub_type = match kind {
        PacketKind::Metadata => 0,
        _ => record_type,
    };

    let (timestamp_seconds, timestamp_nanoseconds) = split_epoch_millis(timestamp_millis);

    // Metadata packets carry the cause/description in the second legacy
    // buffer; it becomes the primary payload here.
    let (primary_buffer, secondary_buffer) = match kind {
        PacketKind::Metadata => (second_buffer, first_buffer),
        _ => (first_buffer, second_buffer),
    };

    Ok(Envelope {
        source_id,
        parent_id,
        kind,
        record_sub_type,
        metadata_sequence_number: metadata_ref,
        data_description_version: metadata_ref,
        timestamp_seconds,
        timestamp_nanoseconds,
        sequence_number,
        primary_buffer,
        secondary_buffer,
    })
}

/// Read one length-prefixed buffer, tolerating a truncated length field.
fn read_buffer(
    r: &mut ByteReader,
    kind: PacketKind,
    first: bool,
) -> Result<Option<Vec<u8>>, FormatError> {
    let length = match r.read_i32() {
        Ok(n) => n,
        Err(_) => {
            if kind == PacketKind::Metadata {
                // Metadata packets are expected to carry both buffers
                info!("legacy metadata packet ends before a buffer length");
            } else {
                debug!(first, "legacy packet ends before a buffer length");
            }
            return Ok(None);
        }
    };
    if length <= 0 {
        return Ok(None);
    }
    let length = length as usize;
    if r.remaining() < length {
        return Err(FormatError::BufferOverrun {
            length: length as i64,
            remaining: r.remaining(),
        });
    }
    Ok(Some(r.take(length).expect("length checked").to_vec()))
}

/// Encode an [Envelope] back into the legacy instrument layout.
///
/// Inverse of [decode]: metadata buffers are swapped back into legacy order
/// and the split timestamp is recombined into epoch milliseconds.
#[must_use]
pub fn encode(envelope: &Envelope) -> Vec<u8> {
    let mut w = ByteWriter::new();
    w.put_i16(TAG_BASE);
    w.put_i64(0); // device packet version
    w.put_i64(envelope.source_id);
    w.put_i64(envelope.timestamp_millis());
    w.put_i64(envelope.sequence_number);
    w.put_i64(envelope.metadata_sequence_number);
    w.put_i64(envelope.parent_id);
    w.put_i64(envelope.record_sub_type);
    w.put_i16(envelope.kind.legacy_tag());
    w.put_i64(0); // second packet version

    let (first, second) = match envelope.kind {
        PacketKind::Metadata => (&envelope.secondary_buffer, &envelope.primary_buffer),
        _ => (&envelope.primary_buffer, &envelope.secondary_buffer),
    };
    w.put_buffer(first.as_deref());
    w.put_buffer(second.as_deref());
    w.into_bytes()
}
