use crate::types::ValueType;
use serde::{Serialize, Serializer};
use serde_json::Value as JsonValue;
use std::cmp::Ordering;

/// Scalar cell value extracted from a batch row or produced by the engine.
///
/// Coercion rules:
/// - `Number` is numeric as-is (non-finite values are treated as missing).
/// - `Text` is numeric when its trimmed content parses as `f64`; a parse
///   failure excludes the value from numeric work, it never fails the report.
/// - `Date` and `Missing` are never numeric.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Text(String),
    Number(f64),
    /// ISO-8601 style date text taken from a date-typed field.
    Date(String),
    Missing,
}

impl Scalar {
    /// Converts a JSON row value. Returns `None` for nested arrays/objects,
    /// which have no scalar interpretation.
    pub fn from_json(value: &JsonValue) -> Option<Self> {
        match value {
            JsonValue::Null => Some(Self::Missing),
            JsonValue::Bool(b) => Some(Self::Text(b.to_string())),
            JsonValue::Number(n) => Some(n.as_f64().map_or(Self::Missing, Self::Number)),
            JsonValue::String(s) => Some(Self::Text(s.clone())),
            JsonValue::Array(_) | JsonValue::Object(_) => None,
        }
    }

    /// Applies the declared field type to a raw value.
    pub fn typed(self, value_type: ValueType) -> Self {
        match (value_type, self) {
            (ValueType::Number, Self::Text(s)) => match parse_number(&s) {
                Some(n) => Self::Number(n),
                None => Self::Text(s),
            },
            (ValueType::Date, Self::Text(s)) if !s.trim().is_empty() => Self::Date(s),
            (_, other) => other,
        }
    }

    #[inline]
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }

    /// Missing or empty text. Such values never win a candidate-key probe.
    #[inline]
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Missing => true,
            Self::Text(s) | Self::Date(s) => s.is_empty(),
            Self::Number(_) => false,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) if n.is_finite() => Some(*n),
            Self::Text(s) => parse_number(s),
            _ => None,
        }
    }

    /// `0`, `"0"`, `""` or null: the values a NULL-inclusive grouping pass
    /// leaves behind on synthetic total rows.
    pub fn is_total_placeholder(&self) -> bool {
        match self {
            Self::Missing => true,
            Self::Number(n) => *n == 0.0,
            Self::Text(s) | Self::Date(s) => s.is_empty() || s == "0",
        }
    }

    /// Canonical text used as a grouping key, so that `10` and `"10"` land in
    /// the same group the way text extraction from a document store would.
    pub fn group_key(&self) -> Option<String> {
        match self {
            Self::Missing => None,
            Self::Number(n) => Some(format_number(*n)),
            Self::Text(s) | Self::Date(s) => Some(s.clone()),
        }
    }

    pub fn display_text(&self) -> String {
        self.group_key().unwrap_or_default()
    }

    /// Total order used by sorting and filter comparison.
    ///
    /// Values that coerce to a number rank first and compare numerically,
    /// text ranks next, missing values last. Text goes through
    /// `lexicmp::lexical_cmp` (transliterated to ASCII, case-insensitive),
    /// then plain code-point order, so "Carp" precedes "carp" where ICU root
    /// collation would put lowercase first.
    pub fn compare(&self, other: &Self) -> Ordering {
        let (lhs, rhs) = (self.as_number(), other.as_number());
        self.sort_rank().cmp(&other.sort_rank()).then_with(|| match (lhs, rhs) {
            (Some(l), Some(r)) => l.total_cmp(&r),
            _ => {
                let (l, r) = (self.display_text(), other.display_text());
                lexicmp::lexical_cmp(&l, &r).then_with(|| l.cmp(&r))
            }
        })
    }

    fn sort_rank(&self) -> u8 {
        match self {
            Self::Missing => 2,
            _ if self.as_number().is_some() => 0,
            _ => 1,
        }
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl Serialize for Scalar {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Text(s) | Self::Date(s) => serializer.serialize_str(s),
            Self::Number(n) if n.is_finite() && n.fract() == 0.0 && n.abs() < 9.0e15 => {
                serializer.serialize_i64(*n as i64)
            }
            Self::Number(n) if n.is_finite() => serializer.serialize_f64(*n),
            Self::Number(_) | Self::Missing => serializer.serialize_none(),
        }
    }
}

pub fn parse_number(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|n| n.is_finite())
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 9.0e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}
