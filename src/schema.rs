//! Record schema model.
//!
//! A schema describes the records one data source emits: an ordered set of
//! variables plus the framing used to carve a raw buffer into per-variable
//! values. Schemas are authored once per source, outside this crate, and are
//! immutable here.

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

/// Decoded width and type of a single variable on the wire.
///
/// Parsed from the free-text `format` strings schema authors use; the alias
/// table matches what historical schemas contain (`"integer"`, `"%f"`,
/// `"datetime"`, ...). Unrecognized formats parse to `None` and the variable
/// is skipped by the decoders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireType {
    Text,
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
}

impl WireType {
    /// Map a schema format string to a wire type.
    #[must_use]
    pub fn parse(format: &str) -> Option<WireType> {
        let f = format.trim();
        if f.eq_ignore_ascii_case("byte") {
            Some(WireType::Byte)
        } else if f.eq_ignore_ascii_case("short") {
            Some(WireType::Short)
        } else if f.eq_ignore_ascii_case("int") || f.eq_ignore_ascii_case("integer") || f == "%i" {
            Some(WireType::Int)
        } else if f.eq_ignore_ascii_case("long") {
            Some(WireType::Long)
        } else if f.eq_ignore_ascii_case("float") || f.eq_ignore_ascii_case("float4") || f == "%f" {
            Some(WireType::Float)
        } else if f.eq_ignore_ascii_case("double")
            || f.eq_ignore_ascii_case("float8")
            || f == "%d"
        {
            Some(WireType::Double)
        } else if f.eq_ignore_ascii_case("string")
            || f.eq_ignore_ascii_case("datetime")
            || f == "%s"
        {
            Some(WireType::Text)
        } else {
            None
        }
    }

    /// Number of bytes one value of this type occupies in a fixed-width
    /// binary record. Text has no native width and decodes as a double.
    #[must_use]
    pub fn byte_width(self) -> usize {
        match self {
            WireType::Byte => 1,
            WireType::Short => 2,
            WireType::Int | WireType::Float => 4,
            WireType::Long | WireType::Double | WireType::Text => 8,
        }
    }
}

/// One named variable within a record.
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
pub struct Variable {
    /// Catalog id, when the variable came from a metadata store.
    #[builder(default)]
    pub id: Option<i64>,
    #[builder(setter(into))]
    pub name: String,
    /// Free-text wire format tag, e.g. `"float"`, `"datetime"`. See [WireType::parse].
    #[builder(setter(into))]
    pub format: String,
    /// Free-text units string. Doubles as a mini date-format specification
    /// for the timestamp resolver.
    #[builder(default, setter(into))]
    pub units: String,
    /// 1-based position in delimited and fixed-width layouts.
    pub column_index: usize,
    /// Optional capture pattern applied to the tokenized value before type
    /// coercion; when it matches the whole token, capture group 1 replaces
    /// the token, otherwise the raw token is used unchanged.
    #[builder(default)]
    pub parse_regex: Option<String>,
    #[builder(default)]
    pub long_name: Option<String>,
    #[builder(default)]
    pub missing_value: Option<String>,
    #[builder(default)]
    pub valid_min: Option<String>,
    #[builder(default)]
    pub valid_max: Option<String>,
}

impl Variable {
    #[must_use]
    pub fn wire_type(&self) -> Option<WireType> {
        WireType::parse(&self.format)
    }

    /// Identity across schema instances: equal ids when both are present,
    /// otherwise case-insensitive name equality plus equal column index.
    #[must_use]
    pub fn matches(&self, other: &Variable) -> bool {
        if let (Some(a), Some(b)) = (self.id, other.id) {
            return a == b;
        }
        self.name.eq_ignore_ascii_case(&other.name) && self.column_index == other.column_index
    }
}

/// Byte order of a fixed-width binary record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Endian {
    #[default]
    Big,
    Little,
}

/// How one record's bytes are carved into variable tokens.
///
/// Exactly one framing is active per schema: text records are either split on
/// a delimiter or matched against a whole-record pattern, and binary records
/// are decoded strictly in column order with no delimiter at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Framing {
    /// Split the record text on a separator. The separator is a regular
    /// expression; the aliases `""`, `"space"`, `"tab"`, and `"whitespace"`
    /// mean one-or-more whitespace, and `"comma"` means `,`.
    Delimited { separator: String },
    /// Match the whole record against a pattern; capture group *i* holds the
    /// value for the variable at column *i*.
    Pattern { pattern: String },
    /// Fixed-width binary, decoded sequentially in column-index order.
    FixedBinary,
}

/// Immutable description of a record: its variables and framing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordSchema {
    /// Ordered, unique (per [Variable::matches]) set of variables.
    pub variables: Vec<Variable>,
    pub framing: Framing,
    #[serde(default)]
    pub endian: Endian,
    /// Optional record terminator, kept for catalog fidelity; the decoders
    /// operate on records already framed by the transport layer.
    #[serde(default)]
    pub terminator: Option<String>,
}

impl RecordSchema {
    #[must_use]
    pub fn delimited(variables: Vec<Variable>, separator: &str) -> Self {
        RecordSchema {
            variables,
            framing: Framing::Delimited {
                separator: separator.to_string(),
            },
            endian: Endian::Big,
            terminator: None,
        }
    }

    #[must_use]
    pub fn with_pattern(variables: Vec<Variable>, pattern: &str) -> Self {
        RecordSchema {
            variables,
            framing: Framing::Pattern {
                pattern: pattern.to_string(),
            },
            endian: Endian::Big,
            terminator: None,
        }
    }

    #[must_use]
    pub fn fixed_binary(variables: Vec<Variable>, endian: Endian) -> Self {
        RecordSchema {
            variables,
            framing: Framing::FixedBinary,
            endian,
            terminator: None,
        }
    }

    /// Find a schema variable for the given column index, if any.
    #[must_use]
    pub fn variable_at_column(&self, column: usize) -> Option<&Variable> {
        self.variables.iter().find(|v| v.column_index == column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("byte", Some(WireType::Byte))]
    #[test_case("short", Some(WireType::Short))]
    #[test_case("int", Some(WireType::Int))]
    #[test_case("integer", Some(WireType::Int))]
    #[test_case("%i", Some(WireType::Int))]
    #[test_case("long", Some(WireType::Long))]
    #[test_case("float", Some(WireType::Float))]
    #[test_case("float4", Some(WireType::Float))]
    #[test_case("%f", Some(WireType::Float))]
    #[test_case("double", Some(WireType::Double))]
    #[test_case("float8", Some(WireType::Double))]
    #[test_case("%d", Some(WireType::Double))]
    #[test_case("string", Some(WireType::Text))]
    #[test_case("String", Some(WireType::Text); "capitalized string")]
    #[test_case("datetime", Some(WireType::Text))]
    #[test_case("%s", Some(WireType::Text))]
    #[test_case("voltage", None)]
    #[test_case("", None)]
    fn format_aliases(format: &str, expected: Option<WireType>) {
        assert_eq!(WireType::parse(format), expected);
    }

    #[test_case(WireType::Byte, 1)]
    #[test_case(WireType::Short, 2)]
    #[test_case(WireType::Int, 4)]
    #[test_case(WireType::Float, 4)]
    #[test_case(WireType::Long, 8)]
    #[test_case(WireType::Double, 8)]
    #[test_case(WireType::Text, 8)]
    fn fixed_width_byte_widths(wire_type: WireType, width: usize) {
        assert_eq!(wire_type.byte_width(), width);
    }

    #[test]
    fn identity_prefers_ids() {
        let a = Variable::builder()
            .id(Some(7))
            .name("temp")
            .format("float")
            .column_index(1)
            .build();
        let b = Variable::builder()
            .id(Some(7))
            .name("temperature")
            .format("float")
            .column_index(3)
            .build();
        assert!(a.matches(&b));
    }

    #[test]
    fn identity_falls_back_to_name_and_column() {
        let a = Variable::builder()
            .name("Temp")
            .format("float")
            .column_index(2)
            .build();
        let b = Variable::builder()
            .name("temp")
            .format("double")
            .column_index(2)
            .build();
        let c = Variable::builder()
            .name("temp")
            .format("float")
            .column_index(3)
            .build();
        assert!(a.matches(&b));
        assert!(!a.matches(&c));
    }

    #[test]
    fn schema_round_trips_through_json() {
        let schema = RecordSchema::delimited(
            vec![Variable::builder()
                .name("t")
                .format("long")
                .units("epoch seconds")
                .column_index(1)
                .build()],
            ",",
        );
        let txt = serde_json::to_string(&schema).unwrap();
        let back: RecordSchema = serde_json::from_str(&txt).unwrap();
        assert_eq!(back.variables.len(), 1);
        assert_eq!(
            back.framing,
            Framing::Delimited {
                separator: ",".to_string()
            }
        );
    }
}
