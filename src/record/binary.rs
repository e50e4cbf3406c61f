//! Fixed-width binary record strategy.
//!
//! Binary records carry no delimiters: values are read strictly in
//! column-index order, each consuming its wire type's width in the schema's
//! byte order. A column with no schema variable, or a variable with an
//! unrecognized format, consumes nothing.

use crate::bytes::ByteReader;
use crate::error::ParseError;
use crate::schema::{RecordSchema, WireType};

use super::{DecodedRecord, Value};

pub(super) fn decode(schema: &RecordSchema, buf: &[u8]) -> Result<DecodedRecord, ParseError> {
    let mut reader = ByteReader::new(buf, schema.endian);
    let mut record = DecodedRecord::default();

    for column in 1..=schema.variables.len() {
        let Some(variable) = schema.variable_at_column(column) else {
            continue;
        };
        let Some(wire_type) = variable.wire_type() else {
            record.diagnose(format!(
                "skipped variable {}: unrecognized format {:?}",
                variable.name, variable.format
            ));
            continue;
        };
        let value = read_value(&mut reader, wire_type).map_err(|e| ParseError::ShortRead {
            offset: e.offset,
            needed: e.needed,
        })?;
        record.push(variable, Some(value));
    }
    Ok(record)
}

/// Text has no binary carrier; its 8 bytes decode as a double.
fn read_value(
    reader: &mut ByteReader,
    wire_type: WireType,
) -> Result<Value, crate::bytes::ShortRead> {
    Ok(match wire_type {
        WireType::Byte => Value::Byte(reader.read_i8()?),
        WireType::Short => Value::Short(reader.read_i16()?),
        WireType::Int => Value::Int(reader.read_i32()?),
        WireType::Long => Value::Long(reader.read_i64()?),
        WireType::Float => Value::Float(reader.read_f32()?),
        WireType::Double | WireType::Text => Value::Double(reader.read_f64()?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordDecoder;
    use crate::schema::{Endian, Variable};

    fn var(name: &str, format: &str, column: usize) -> Variable {
        Variable::builder()
            .name(name)
            .format(format)
            .column_index(column)
            .build()
    }

    #[test]
    fn big_endian_record_decodes_in_column_order() {
        let schema = RecordSchema::fixed_binary(
            vec![
                var("flag", "byte", 1),
                var("count", "short", 2),
                var("temp", "float", 3),
                var("stamp", "long", 4),
            ],
            Endian::Big,
        );
        let mut buf = vec![0x7f];
        buf.extend_from_slice(&300i16.to_be_bytes());
        buf.extend_from_slice(&12.5f32.to_be_bytes());
        buf.extend_from_slice(&1_700_000_000i64.to_be_bytes());

        let record = RecordDecoder::new(&schema).unwrap().decode(&buf).unwrap();
        assert_eq!(
            record.get(&var("flag", "byte", 1)),
            Some(&Some(Value::Byte(127)))
        );
        assert_eq!(
            record.get(&var("count", "short", 2)),
            Some(&Some(Value::Short(300)))
        );
        assert_eq!(
            record.get(&var("temp", "float", 3)),
            Some(&Some(Value::Float(12.5)))
        );
        assert_eq!(
            record.get(&var("stamp", "long", 4)),
            Some(&Some(Value::Long(1_700_000_000)))
        );
    }

    #[test]
    fn little_endian_honors_schema_byte_order() {
        let schema =
            RecordSchema::fixed_binary(vec![var("depth", "double", 1)], Endian::Little);
        let buf = 104.5f64.to_le_bytes();
        let record = RecordDecoder::new(&schema).unwrap().decode(&buf).unwrap();
        assert_eq!(
            record.get(&var("depth", "double", 1)),
            Some(&Some(Value::Double(104.5)))
        );
    }

    #[test]
    fn short_buffer_fails_whole_record() {
        let schema = RecordSchema::fixed_binary(
            vec![var("a", "int", 1), var("b", "int", 2)],
            Endian::Big,
        );
        let buf = 9i32.to_be_bytes();
        let err = RecordDecoder::new(&schema).unwrap().decode(&buf).unwrap_err();
        assert!(matches!(
            err,
            ParseError::ShortRead {
                offset: 4,
                needed: 4
            }
        ));
    }

    #[test]
    fn unknown_format_consumes_no_bytes() {
        let schema = RecordSchema::fixed_binary(
            vec![var("x", "voltage", 1), var("y", "int", 2)],
            Endian::Big,
        );
        let buf = 42i32.to_be_bytes();
        let record = RecordDecoder::new(&schema).unwrap().decode(&buf).unwrap();
        assert_eq!(record.get(&var("x", "voltage", 1)), None);
        assert_eq!(record.get(&var("y", "int", 2)), Some(&Some(Value::Int(42))));
        assert_eq!(record.diagnostics().len(), 1);
    }

    #[test]
    fn text_format_reads_eight_bytes_as_double() {
        let schema = RecordSchema::fixed_binary(vec![var("t", "datetime", 1)], Endian::Big);
        let buf = 1.5f64.to_be_bytes();
        let record = RecordDecoder::new(&schema).unwrap().decode(&buf).unwrap();
        assert_eq!(
            record.get(&var("t", "datetime", 1)),
            Some(&Some(Value::Double(1.5)))
        );
    }
}
