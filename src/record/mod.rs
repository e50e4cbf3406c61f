//! Schema-driven record decoding.
//!
//! A [RecordDecoder] is built once from a [RecordSchema] and then applied to
//! each raw record buffer, producing a [DecodedRecord]: per-variable typed
//! values plus any diagnostics accumulated along the way. Decoders keep no
//! state between calls and may be shared read-only across threads.

mod binary;
mod text;

use std::fmt::Display;

use regex::Regex;
use tracing::warn;

use crate::error::ParseError;
use crate::schema::{Framing, RecordSchema, Variable};

/// One decoded field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
}

impl Value {
    /// True for every variant except [Value::Text].
    #[must_use]
    pub fn is_number(&self) -> bool {
        !matches!(self, Value::Text(_))
    }

    /// Numeric view of the value, when it has one.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Text(_) => None,
            Value::Byte(v) => Some(f64::from(*v)),
            Value::Short(v) => Some(f64::from(*v)),
            Value::Int(v) => Some(f64::from(*v)),
            Value::Long(v) => Some(*v as f64),
            Value::Float(v) => Some(f64::from(*v)),
            Value::Double(v) => Some(*v),
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Text(v) => write!(f, "{v}"),
            Value::Byte(v) => write!(f, "{v}"),
            Value::Short(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Long(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
        }
    }
}

/// One record's values keyed by variable.
///
/// A variable can be in three states: absent entirely (the decoder skipped
/// it, e.g. for an unrecognizable format), present with no value (its token
/// failed type coercion), or present with a value. Absence and present-null
/// both surface as "no value" to the alignment layer but are distinct here.
#[derive(Debug, Clone, Default)]
pub struct DecodedRecord {
    entries: Vec<(Variable, Option<Value>)>,
    diagnostics: Vec<String>,
}

impl DecodedRecord {
    pub(crate) fn push(&mut self, variable: &Variable, value: Option<Value>) {
        self.entries.push((variable.clone(), value));
    }

    pub(crate) fn diagnose(&mut self, message: String) {
        self.diagnostics.push(message);
    }

    /// Look up a variable's value using the schema identity rule.
    ///
    /// `None` means the variable is absent; `Some(None)` means it is present
    /// but has no value for this record.
    #[must_use]
    pub fn get(&self, variable: &Variable) -> Option<&Option<Value>> {
        self.entries
            .iter()
            .find(|(v, _)| v.matches(variable))
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Variable, &Option<Value>)> {
        self.entries.iter().map(|(v, value)| (v, value))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Messages describing per-field coercion failures and skipped
    /// variables. Never fatal; see [crate::ParseError] for what is.
    #[must_use]
    pub fn diagnostics(&self) -> &[String] {
        &self.diagnostics
    }
}

/// Tokenization strategy, selected by the schema's framing.
enum Strategy {
    Delimited(Regex),
    Pattern(Regex),
    Binary,
}

/// Decodes raw record buffers against one schema.
pub struct RecordDecoder {
    schema: RecordSchema,
    strategy: Strategy,
    /// Compiled per-variable sub-patterns, parallel to `schema.variables`.
    sub_patterns: Vec<Option<Regex>>,
}

impl RecordDecoder {
    /// Build a decoder, compiling the schema's patterns once.
    ///
    /// # Errors
    /// [ParseError::BadPattern] if the record pattern or delimiter does not
    /// compile. A broken per-variable sub-pattern is not fatal; the pattern
    /// is dropped with a warning and the raw token used as-is.
    pub fn new(schema: &RecordSchema) -> Result<Self, ParseError> {
        let strategy = match &schema.framing {
            Framing::Delimited { separator } => {
                Strategy::Delimited(Regex::new(&resolve_separator(separator))?)
            }
            Framing::Pattern { pattern } => Strategy::Pattern(Regex::new(pattern)?),
            Framing::FixedBinary => Strategy::Binary,
        };
        let sub_patterns = schema
            .variables
            .iter()
            .map(|v| {
                let pattern = v.parse_regex.as_deref().filter(|p| !p.is_empty())?;
                match Regex::new(pattern) {
                    Ok(re) => Some(re),
                    Err(err) => {
                        warn!(
                            variable = %v.name,
                            pattern, %err,
                            "could not compile sub-pattern; using raw tokens"
                        );
                        None
                    }
                }
            })
            .collect();
        Ok(RecordDecoder {
            schema: schema.clone(),
            strategy,
            sub_patterns,
        })
    }

    /// Decode one raw record buffer.
    ///
    /// # Errors
    /// A [ParseError] on structural mismatch: wrong token count, a
    /// non-matching record pattern, or a short fixed-width read. Callers
    /// should skip the record and continue with the next one.
    pub fn decode(&self, buf: &[u8]) -> Result<DecodedRecord, ParseError> {
        match &self.strategy {
            Strategy::Delimited(sep) => {
                text::decode_delimited(&self.schema, &self.sub_patterns, sep, buf)
            }
            Strategy::Pattern(re) => {
                text::decode_pattern(&self.schema, &self.sub_patterns, re, buf)
            }
            Strategy::Binary => binary::decode(&self.schema, buf),
        }
    }
}

/// Expand the delimiter aliases schema authors use into a split regex.
fn resolve_separator(separator: &str) -> String {
    match separator {
        "" | " " | "space" | "tab" | "whitespace" => r"\s+".to_string(),
        "comma" => ",".to_string(),
        other => other.to_string(),
    }
}
