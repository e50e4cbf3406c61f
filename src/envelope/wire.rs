//! Current versioned storage wire layout.
//!
//! ```text
//! i64 source_id
//! i64 parent_id
//! i32 packet_type             (wire numbering; see [PacketKind::wire_code])
//! i64 record_sub_type
//! i64 metadata_sequence_number
//! i64 data_description_version
//! i64 timestamp_seconds
//! i64 timestamp_nanoseconds   (microsecond-scaled; see envelope module docs)
//! i64 sequence_number
//! i32 first_buffer_length;  byte[first_buffer_length]
//! i32 second_buffer_length; byte[second_buffer_length]
//! ```
//!
//! All integers are big-endian. Readers pulling packets from a stored query
//! stream see a 4-byte version tag (value [VERSION]) ahead of this body; the
//! body itself is version-free.

use tracing::warn;

use crate::bytes::{ByteReader, ByteWriter};
use crate::error::FormatError;

use super::{Envelope, PacketKind};

/// Storage format version this codec understands.
pub const VERSION: i32 = 3;

/// Fixed-size portion of the layout, before the buffers.
const HEADER_LEN: usize = 8 + 8 + 4 + 8 + 8 + 8 + 8 + 8 + 8;

/// Encode an [Envelope] into the current wire layout, without a version tag.
#[must_use]
pub fn encode(envelope: &Envelope) -> Vec<u8> {
    let mut w = ByteWriter::new();
    w.put_i64(envelope.source_id);
    w.put_i64(envelope.parent_id);
    w.put_i32(envelope.kind.wire_code());
    // Metadata packets always carry sub-type 0
    let sub_type = match envelope.kind {
        PacketKind::Metadata => 0,
        _ => envelope.record_sub_type,
    };
    w.put_i64(sub_type);
    w.put_i64(envelope.metadata_sequence_number);
    w.put_i64(envelope.data_description_version);
    w.put_i64(envelope.timestamp_seconds);
    w.put_i64(envelope.timestamp_nanoseconds);
    w.put_i64(envelope.sequence_number);
    w.put_buffer(envelope.primary_buffer.as_deref());
    w.put_buffer(envelope.secondary_buffer.as_deref());
    w.into_bytes()
}

/// Decode an [Envelope] from the current wire layout, without a version tag.
///
/// # Errors
/// [FormatError::TooShort] if the fixed header cannot be read, or
/// [FormatError::BufferOverrun] if a buffer length points past the packet end.
pub fn decode(buf: &[u8]) -> Result<Envelope, FormatError> {
    let mut r = ByteReader::big_endian(buf);
    let short = |_| FormatError::TooShort {
        actual: buf.len(),
        minimum: HEADER_LEN,
    };

    let source_id = r.read_i64().map_err(short)?;
    let parent_id = r.read_i64().map_err(short)?;
    let packet_type = r.read_i32().map_err(short)?;
    let record_sub_type = r.read_i64().map_err(short)?;
    let metadata_sequence_number = r.read_i64().map_err(short)?;
    let data_description_version = r.read_i64().map_err(short)?;
    let timestamp_seconds = r.read_i64().map_err(short)?;
    let timestamp_nanoseconds = r.read_i64().map_err(short)?;
    let sequence_number = r.read_i64().map_err(short)?;

    let kind = PacketKind::from_wire_code(packet_type).unwrap_or_else(|| {
        warn!(
            packet_type,
            source_id, "unrecognized wire packet type; treating as sensor data"
        );
        PacketKind::SensorData
    });

    let primary_buffer = read_buffer(&mut r)?;
    let secondary_buffer = read_buffer(&mut r)?;

    Ok(Envelope {
        source_id,
        parent_id,
        kind,
        record_sub_type,
        metadata_sequence_number,
        data_description_version,
        timestamp_seconds,
        timestamp_nanoseconds,
        sequence_number,
        primary_buffer,
        secondary_buffer,
    })
}

fn read_buffer(r: &mut ByteReader) -> Result<Option<Vec<u8>>, FormatError> {
    let length = match r.read_i32() {
        Ok(n) => n,
        // The stored form always carries both lengths, but tolerate the
        // same firmware truncation the legacy layout exhibits.
        Err(_) => return Ok(None),
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

/// Encode with the leading 4-byte version tag.
#[must_use]
pub fn encode_tagged(envelope: &Envelope) -> Vec<u8> {
    let mut w = ByteWriter::new();
    w.put_i32(VERSION);
    w.put_bytes(&encode(envelope));
    w.into_bytes()
}

/// Decode a version-tagged packet.
///
/// # Errors
/// [FormatError::UnsupportedVersion] for any tag other than [VERSION], in
/// addition to the errors of [decode].
pub fn decode_tagged(buf: &[u8]) -> Result<Envelope, FormatError> {
    let mut r = ByteReader::big_endian(buf);
    let version = r.read_i32().map_err(|_| FormatError::TooShort {
        actual: buf.len(),
        minimum: 4,
    })?;
    if version != VERSION {
        return Err(FormatError::UnsupportedVersion(version));
    }
    decode(r.rest())
}

/// Replace the 4-byte version tag with a caller-supplied source id.
///
/// Storage queries return envelope bodies without the device id prefix;
/// this splices one back in so the result parses as a plain wire packet.
///
/// # Errors
/// [FormatError::TooShort] if the tag cannot be read, or
/// [FormatError::UnsupportedVersion] for an unexpected tag.
pub fn splice_source_id(buf: &[u8], source_id: i64) -> Result<Vec<u8>, FormatError> {
    let mut r = ByteReader::big_endian(buf);
    let version = r.read_i32().map_err(|_| FormatError::TooShort {
        actual: buf.len(),
        minimum: 4,
    })?;
    if version != VERSION {
        return Err(FormatError::UnsupportedVersion(version));
    }
    let mut w = ByteWriter::new();
    w.put_i64(source_id);
    w.put_bytes(r.rest());
    Ok(w.into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::legacy;

    fn envelope(kind: PacketKind) -> Envelope {
        Envelope::builder()
            .source_id(1431)
            .parent_id(1320)
            .kind(kind)
            .record_sub_type(2)
            .metadata_sequence_number(9)
            .data_description_version(9)
            .timestamp_seconds(1_700_000_000)
            .timestamp_nanoseconds(250_000)
            .sequence_number(77)
            .primary_buffer(Some(b"primary".to_vec()))
            .secondary_buffer(Some(b"secondary".to_vec()))
            .build()
    }

    #[test]
    fn wire_round_trip() {
        for kind in [
            PacketKind::Metadata,
            PacketKind::SensorData,
            PacketKind::DeviceMessage,
        ] {
            let env = envelope(kind);
            let back = decode(&encode(&env)).unwrap();
            assert_eq!(back.kind, kind);
            assert_eq!(back.source_id, env.source_id);
            assert_eq!(back.timestamp_seconds, env.timestamp_seconds);
            assert_eq!(back.timestamp_nanoseconds, env.timestamp_nanoseconds);
            assert_eq!(back.sequence_number, env.sequence_number);
            assert_eq!(back.primary_buffer, env.primary_buffer);
            assert_eq!(back.secondary_buffer, env.secondary_buffer);
        }
    }

    #[test]
    fn metadata_sub_type_is_forced_to_zero() {
        let env = envelope(PacketKind::Metadata);
        let back = decode(&encode(&env)).unwrap();
        assert_eq!(back.record_sub_type, 0);
    }

    #[test]
    fn tagged_round_trip_and_version_check() {
        let env = envelope(PacketKind::SensorData);
        let bytes = encode_tagged(&env);
        assert_eq!(i32::from_be_bytes(bytes[..4].try_into().unwrap()), VERSION);
        let back = decode_tagged(&bytes).unwrap();
        assert_eq!(back, env);

        let mut bad = bytes.clone();
        bad[3] = 2;
        assert!(matches!(
            decode_tagged(&bad).unwrap_err(),
            FormatError::UnsupportedVersion(2)
        ));
    }

    #[test]
    fn splice_source_id_produces_a_decodable_packet() {
        let env = envelope(PacketKind::SensorData);
        // Simulate a storage query result: tagged body without source id
        let body = encode(&env);
        let mut tagged_without_source = VERSION.to_be_bytes().to_vec();
        tagged_without_source.extend_from_slice(&body[8..]);

        let spliced = splice_source_id(&tagged_without_source, 1431).unwrap();
        let back = decode(&spliced).unwrap();
        assert_eq!(back, env);
    }

    #[test]
    fn legacy_conversion_preserves_identity_fields() {
        // Round-trip property: converting legacy bytes to the current wire
        // layout and re-decoding matches decoding the legacy bytes directly.
        for tag in [
            legacy::TAG_METADATA,
            legacy::TAG_SENSOR_DATA,
            legacy::TAG_DEVICE_MESSAGE,
        ] {
            let env = {
                let mut direct = envelope(PacketKind::SensorData);
                direct.kind = match tag {
                    legacy::TAG_METADATA => PacketKind::Metadata,
                    legacy::TAG_DEVICE_MESSAGE => PacketKind::DeviceMessage,
                    _ => PacketKind::SensorData,
                };
                direct
            };
            let legacy_bytes = legacy::encode(&env);
            let direct = legacy::decode(&legacy_bytes).unwrap();
            let through_wire = decode(&encode(&direct)).unwrap();
            assert_eq!(through_wire.source_id, direct.source_id);
            assert_eq!(through_wire.timestamp_seconds, direct.timestamp_seconds);
            assert_eq!(through_wire.sequence_number, direct.sequence_number);
            assert_eq!(through_wire.kind, direct.kind);
        }
    }

    #[test]
    fn truncated_header_is_an_error() {
        let env = envelope(PacketKind::SensorData);
        let bytes = encode(&env);
        assert!(matches!(
            decode(&bytes[..HEADER_LEN - 3]).unwrap_err(),
            FormatError::TooShort { .. }
        ));
    }
}
