use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

/// A dynamically typed attribute, context field or config payload value.
///
/// Equality is deep and structural.
///
/// # Examples
///
/// ```rust
/// use bucket::Value;
///
/// let bool_val = Value::from(true);
/// let int_val = Value::from(42);
/// assert_eq!(int_val.to_invariant_string(), "42");
/// ```
#[derive(PartialEq, Debug, Clone, Default, Deserialize)]
#[serde(from = "serde_json::Value")]
pub enum Value {
    /// The absence of a value.
    #[default]
    Null,
    /// A boolean value.
    Bool(bool),
    /// A whole number.
    Int(i64),
    /// A decimal number.
    Float(f64),
    /// A text value.
    String(String),
    /// A point in time, always kept in UTC.
    DateTime(DateTime<Utc>),
    /// A list of values.
    Array(Vec<Value>),
    /// A string-keyed map of values.
    Object(BTreeMap<String, Value>),
}

impl Value {
    /// Formats the value culture-independently.
    ///
    /// `Null` formats as the empty string, date-times as RFC 3339 in UTC,
    /// arrays and objects as JSON.
    pub fn to_invariant_string(&self) -> String {
        match self {
            Value::Null => String::default(),
            Value::Bool(val) => val.to_string(),
            Value::Int(val) => val.to_string(),
            Value::Float(val) => format_float(*val),
            Value::String(val) => val.clone(),
            Value::DateTime(val) => val.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            Value::Array(_) | Value::Object(_) => serde_json::to_string(self).unwrap_or_default(),
        }
    }

    /// Returns `true` unless the value formats to the empty string.
    pub fn is_set(&self) -> bool {
        !self.to_invariant_string().is_empty()
    }

    /// Reads the value as `bool`. Returns [`None`] if it's not a [`Value::Bool`].
    pub fn as_bool(&self) -> Option<bool> {
        if let Value::Bool(val) = self {
            return Some(*val);
        }
        None
    }

    /// Reads the value as `&str`. Returns [`None`] if it's not a [`Value::String`].
    pub fn as_str(&self) -> Option<&str> {
        if let Value::String(val) = self {
            return Some(val.as_str());
        }
        None
    }

    /// Converts the value to a number.
    ///
    /// Numbers are taken as they are, everything else is formatted with
    /// [`Value::to_invariant_string`] and parsed.
    pub fn coerce_number(&self) -> Option<f64> {
        match self {
            Value::Int(val) => Some(*val as f64),
            Value::Float(val) => Some(*val),
            _ => parse_float(self.to_invariant_string().as_str()),
        }
    }

    /// Converts the value to a boolean. Text is accepted when it reads `true` or `false` (case-insensitive).
    pub fn coerce_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(val) => Some(*val),
            _ => {
                let text = self.to_invariant_string();
                let trimmed = text.trim();
                if trimmed.eq_ignore_ascii_case("true") {
                    Some(true)
                } else if trimmed.eq_ignore_ascii_case("false") {
                    Some(false)
                } else {
                    None
                }
            }
        }
    }

    /// Converts the value to a UTC timestamp. Text without an offset is assumed to be UTC.
    pub fn coerce_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::DateTime(val) => Some(*val),
            _ => parse_datetime(self.to_invariant_string().trim()),
        }
    }

    /// Creates a [`Value`] from a [`serde_json::Value`].
    ///
    /// # Examples
    ///
    /// ```rust
    /// use bucket::Value;
    ///
    /// let json_str = serde_json::Value::String("foo".to_owned());
    /// assert_eq!(Value::String("foo".to_owned()), Value::from_json_val(&json_str))
    /// ```
    pub fn from_json_val(json_val: &serde_json::Value) -> Value {
        match json_val {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(val) => Value::Bool(*val),
            serde_json::Value::String(val) => Value::String(val.clone()),
            serde_json::Value::Number(val) => {
                if let Some(int_val) = val.as_i64() {
                    return Value::Int(int_val);
                }
                match val.as_f64() {
                    Some(float_val) => Value::Float(float_val),
                    None => Value::Null,
                }
            }
            serde_json::Value::Array(items) => {
                Value::Array(items.iter().map(Value::from_json_val).collect())
            }
            serde_json::Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json_val(v)))
                    .collect(),
            ),
        }
    }

    /// Converts the value into a [`serde_json::Value`]. Non-finite floats become `null`.
    pub fn to_json_val(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

fn format_float(val: f64) -> String {
    if val.is_nan() {
        "NaN".to_owned()
    } else if val.is_infinite() && val.is_sign_positive() {
        "Infinity".to_owned()
    } else if val.is_infinite() {
        "-Infinity".to_owned()
    } else {
        val.to_string()
    }
}

pub(crate) fn parse_float(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    match trimmed {
        "" => None,
        "Infinity" | "+Infinity" => Some(f64::INFINITY),
        "-Infinity" => Some(f64::NEG_INFINITY),
        "NaN" => Some(f64::NAN),
        _ => {
            // Rust also accepts "inf"/"nan" spellings which are not invariant number formats.
            if trimmed.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') {
                return None;
            }
            trimmed.parse().ok()
        }
    }
}

fn parse_datetime(text: &str) -> Option<DateTime<Utc>> {
    if text.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.to_invariant_string().as_str())
    }
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(val) => serializer.serialize_bool(*val),
            Value::Int(val) => serializer.serialize_i64(*val),
            Value::Float(val) if val.is_finite() => serializer.serialize_f64(*val),
            Value::Float(_) => serializer.serialize_unit(),
            Value::String(val) => serializer.serialize_str(val),
            Value::DateTime(_) => serializer.serialize_str(self.to_invariant_string().as_str()),
            Value::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Object(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (k, v) in entries {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        Value::from_json_val(&value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

from_val_to_enum!(Value Bool bool);
from_val_to_enum!(Value String String);
from_val_to_enum!(Value DateTime DateTime<Utc>);
from_val_to_enum!(Value Array Vec<Value>);
from_val_to_enum!(Value Object BTreeMap<String, Value>);
from_val_to_enum_into!(Value Float f64 f32);
from_val_to_enum_into!(Value Int i8 i16 i32 i64 u8 u16 u32);
from_val_to_enum_into!(Value String &str);
