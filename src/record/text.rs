//! Text record strategies: delimiter splitting and whole-record patterns.

use regex::Regex;
use tracing::trace;

use crate::error::ParseError;
use crate::schema::{RecordSchema, Variable, WireType};

use super::{DecodedRecord, Value};

/// Split the record on the schema separator and coerce each token.
///
/// The token count must equal the schema's variable count exactly; any
/// mismatch fails the whole record.
pub(super) fn decode_delimited(
    schema: &RecordSchema,
    sub_patterns: &[Option<Regex>],
    separator: &Regex,
    buf: &[u8],
) -> Result<DecodedRecord, ParseError> {
    let text = String::from_utf8_lossy(buf);
    let text = text.trim();
    let mut tokens: Vec<&str> = separator.split(text).collect();
    // A split keeps trailing empty fields; records never carry them
    while tokens.last() == Some(&"") {
        tokens.pop();
    }

    let expected = schema.variables.len();
    if tokens.len() != expected {
        trace!(
            expected,
            actual = tokens.len(),
            "token count mismatch, rejecting record"
        );
        return Err(ParseError::FieldCount {
            expected,
            actual: tokens.len(),
        });
    }

    let mut record = DecodedRecord::default();
    for (variable, sub_pattern) in schema.variables.iter().zip(sub_patterns) {
        let Some(token) = tokens.get(variable.column_index.wrapping_sub(1)) else {
            record.diagnose(format!(
                "variable {} names column {} outside the record",
                variable.name, variable.column_index
            ));
            continue;
        };
        coerce(variable, sub_pattern.as_ref(), token, &mut record);
    }
    Ok(record)
}

/// Match the whole record against the schema pattern; capture group *i*
/// holds the token for the variable at column *i*.
pub(super) fn decode_pattern(
    schema: &RecordSchema,
    sub_patterns: &[Option<Regex>],
    pattern: &Regex,
    buf: &[u8],
) -> Result<DecodedRecord, ParseError> {
    let text = String::from_utf8_lossy(buf);
    let text = text.trim();
    let Some(captures) = pattern.captures(text) else {
        trace!("record does not match schema pattern, rejecting");
        return Err(ParseError::PatternMismatch);
    };

    let mut record = DecodedRecord::default();
    for (variable, sub_pattern) in schema.variables.iter().zip(sub_patterns) {
        let Some(m) = captures.get(variable.column_index) else {
            record.diagnose(format!(
                "pattern has no capture group {} for variable {}",
                variable.column_index, variable.name
            ));
            continue;
        };
        coerce(variable, sub_pattern.as_ref(), m.as_str(), &mut record);
    }
    Ok(record)
}

/// Refine one token and coerce it to the variable's wire type.
///
/// Coercion failures are per-field only: the variable lands in the record
/// with no value plus a diagnostic, and decoding continues.
fn coerce(
    variable: &Variable,
    sub_pattern: Option<&Regex>,
    token: &str,
    record: &mut DecodedRecord,
) {
    let Some(wire_type) = variable.wire_type() else {
        record.diagnose(format!(
            "skipped variable {}: unrecognized format {:?}",
            variable.name, variable.format
        ));
        return;
    };

    let mut token = token.trim();
    if let Some(re) = sub_pattern {
        // the sub-pattern must match the whole token; a partial match
        // leaves the raw token in place
        if let Some(captures) = re.captures(token) {
            let whole = captures
                .get(0)
                .is_some_and(|m| m.start() == 0 && m.end() == token.len());
            if whole {
                if let Some(m) = captures.get(1) {
                    token = m.as_str();
                }
            }
        }
    }
    let token = token.strip_prefix('+').unwrap_or(token);

    let value = match wire_type {
        WireType::Text => Some(Value::Text(token.to_string())),
        WireType::Byte => token.parse::<i8>().ok().map(Value::Byte),
        WireType::Short => token.parse::<i16>().ok().map(Value::Short),
        WireType::Int => parse_int(token).map(Value::Int),
        WireType::Long => token.parse::<i64>().ok().map(Value::Long),
        WireType::Float => token.parse::<f32>().ok().map(Value::Float),
        WireType::Double => token.parse::<f64>().ok().map(Value::Double),
    };
    if value.is_none() {
        record.diagnose(format!(
            "could not parse {} {:?} value {token:?}",
            variable.name, variable.format
        ));
    }
    record.push(variable, value);
}

/// Integer parse with a truncation fallback: `"12.7"` parses as `12`.
fn parse_int(token: &str) -> Option<i32> {
    match token.parse::<i32>() {
        Ok(v) => Some(v),
        Err(_) => {
            let head = token.split_once('.')?.0;
            head.parse::<i32>().ok()
        }
    }
}
