use std::{collections::HashMap, fmt};

use derive_more::From;
use serde::{
    de::{self, Visitor},
    Deserialize, Deserializer, Serialize,
};

/// Type alias for a HashMap representing user attributes.
///
/// Keys are attribute keys as known to the host application (not attribute ids).
///
/// # Examples
/// ```
/// # use ab_core::{Attributes, AttributeValue};
/// let attributes = [
///     ("age".to_owned(), 30.into()),
///     ("is_premium_member".to_owned(), true.into()),
///     ("browser_type".to_owned(), "firefox".into()),
/// ].into_iter().collect::<Attributes>();
/// ```
pub type Attributes = HashMap<String, AttributeValue>;

/// 2^53, the largest magnitude at which every integer is exactly representable as `f64`.
pub(crate) const MAX_SAFE_INTEGER: i64 = 1 << 53;

/// Enum representing possible values of a user attribute.
///
/// Conveniently implements `From` conversions for `String`, `&str`, `i64`, `i32`, `f64`, and
/// `bool` types.
#[derive(Debug, Serialize, PartialEq, PartialOrd, From, Clone)]
#[serde(untagged)]
pub enum AttributeValue {
    /// A string value.
    String(String),
    /// An integral value. Deserialized integers above `i64::MAX` saturate to `i64::MAX`, which
    /// keeps them outside the safe numeric range.
    Integer(i64),
    /// A floating point value.
    Number(f64),
    /// A boolean value.
    Boolean(bool),
    /// An explicit null. Present, but carries no value.
    #[from(ignore)]
    Null,
}

impl AttributeValue {
    /// Returns the string if this is a string value.
    pub fn as_str(&self) -> Option<&str> {
        if let AttributeValue::String(s) = self {
            Some(s.as_str())
        } else {
            None
        }
    }

    /// Returns the value as `f64` if it is a number that can be compared safely: integers must not
    /// exceed 2^53 in magnitude and floats must be finite.
    pub fn as_valid_number(&self) -> Option<f64> {
        match *self {
            AttributeValue::Integer(i) if i.unsigned_abs() <= MAX_SAFE_INTEGER as u64 => {
                Some(i as f64)
            }
            AttributeValue::Number(n) if n.is_finite() => Some(n),
            _ => None,
        }
    }

    /// Returns the boolean if this is a boolean value.
    pub fn as_bool(&self) -> Option<bool> {
        if let AttributeValue::Boolean(b) = self {
            Some(*b)
        } else {
            None
        }
    }

    pub(crate) fn type_name(&self) -> &'static str {
        match self {
            AttributeValue::String(_) => "string",
            AttributeValue::Integer(_) => "integer",
            AttributeValue::Number(_) => "number",
            AttributeValue::Boolean(_) => "boolean",
            AttributeValue::Null => "null",
        }
    }
}

impl<'de> Deserialize<'de> for AttributeValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(AttributeValueVisitor)
    }
}

struct AttributeValueVisitor;

impl<'de> Visitor<'de> for AttributeValueVisitor {
    type Value = AttributeValue;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a string, number, boolean, or null")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<AttributeValue, E> {
        Ok(AttributeValue::Boolean(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<AttributeValue, E> {
        Ok(AttributeValue::Integer(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<AttributeValue, E> {
        Ok(AttributeValue::Integer(i64::try_from(v).unwrap_or(i64::MAX)))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<AttributeValue, E> {
        Ok(AttributeValue::Number(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<AttributeValue, E> {
        Ok(AttributeValue::String(v.to_owned()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<AttributeValue, E> {
        Ok(AttributeValue::String(v))
    }

    fn visit_unit<E: de::Error>(self) -> Result<AttributeValue, E> {
        Ok(AttributeValue::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<AttributeValue, E> {
        Ok(AttributeValue::Null)
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<i32> for AttributeValue {
    fn from(value: i32) -> Self {
        Self::Integer(value.into())
    }
}
