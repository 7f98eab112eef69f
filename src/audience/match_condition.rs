use std::fmt;

use derive_more::From;
use serde::{Deserialize, Serialize};

use crate::{attributes::MAX_SAFE_INTEGER, AttributeValue, Attributes};

use super::ConditionError;

/// The only condition kind this library knows how to evaluate.
pub const CUSTOM_ATTRIBUTE: &str = "custom_attribute";

/// Literal carried by a leaf condition.
///
/// Subset of [`serde_json::Value`]: nested structures and nulls are never valid literals.
#[derive(Debug, Serialize, Deserialize, PartialEq, From, Clone)]
#[serde(untagged)]
pub enum Value {
    /// A boolean literal.
    Boolean(bool),
    /// A numeric literal, already checked to be a valid number.
    Number(f64),
    /// A string literal.
    String(String),
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => write!(f, "'{s}'"),
        }
    }
}

/// Typed matcher of a leaf condition, compiled from the `match` and `value` fields.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchCondition {
    /// Attribute key is present, whatever the value.
    Exists,
    /// Attribute value equals the literal. String, number and boolean literals only match
    /// attribute values of the same type.
    Exact(Value),
    /// Attribute value is a string that contains the literal.
    Substring(String),
    /// Attribute value is a number greater than the literal.
    Gt(f64),
    /// Attribute value is a number less than the literal.
    Lt(f64),
}

impl MatchCondition {
    /// Compile a matcher from the raw `match` operator and literal.
    ///
    /// A missing operator is accepted only for string literals, which match by equality.
    pub fn compile(
        match_type: Option<&str>,
        value: Option<&serde_json::Value>,
    ) -> Result<MatchCondition, ConditionError> {
        let incompatible = || ConditionError::IncompatibleMatchValue {
            match_type: match_type.unwrap_or("legacy").to_owned(),
            value: value.cloned().unwrap_or(serde_json::Value::Null),
        };

        let Some(match_type) = match_type else {
            return match value {
                Some(serde_json::Value::String(s)) => Ok(MatchCondition::Exact(s.as_str().into())),
                _ => Err(incompatible()),
            };
        };

        match match_type {
            "exists" => Ok(MatchCondition::Exists),
            "exact" => match value {
                Some(serde_json::Value::String(s)) => Ok(MatchCondition::Exact(s.as_str().into())),
                Some(serde_json::Value::Bool(b)) => Ok(MatchCondition::Exact((*b).into())),
                Some(serde_json::Value::Number(n)) => valid_literal(n)
                    .map(|n| MatchCondition::Exact(n.into()))
                    .ok_or_else(incompatible),
                _ => Err(incompatible()),
            },
            "substring" => match value {
                Some(serde_json::Value::String(s)) => Ok(MatchCondition::Substring(s.clone())),
                _ => Err(incompatible()),
            },
            "gt" | "lt" => {
                let n = match value {
                    Some(serde_json::Value::Number(n)) => valid_literal(n),
                    _ => None,
                }
                .ok_or_else(incompatible)?;
                Ok(if match_type == "gt" {
                    MatchCondition::Gt(n)
                } else {
                    MatchCondition::Lt(n)
                })
            }
            other => Err(ConditionError::UnknownMatchType(other.to_owned())),
        }
    }

    /// Apply the matcher to the attribute named `name`. Returns `None` if the matcher does not
    /// apply: attribute is missing or has a type the matcher cannot compare against.
    pub fn eval(&self, name: &str, attributes: &Attributes) -> Option<bool> {
        if let Self::Exists = self {
            return Some(attributes.contains_key(name));
        }

        let Some(attribute) = attributes.get(name) else {
            log::info!(target: "ab_core", attribute = name;
                "unable to evaluate condition because no value was given for the attribute");
            return None;
        };

        let result = self.try_eval(attribute);
        if result.is_none() {
            log::warn!(target: "ab_core",
                attribute = name,
                attribute_type = attribute.type_name();
                "unable to evaluate condition because of an incompatible attribute type");
        }
        result
    }

    fn try_eval(&self, attribute: &AttributeValue) -> Option<bool> {
        match self {
            Self::Exists => Some(true),
            Self::Exact(Value::String(expected)) => Some(attribute.as_str()? == expected),
            Self::Exact(Value::Number(expected)) => Some(attribute.as_valid_number()? == *expected),
            Self::Exact(Value::Boolean(expected)) => Some(attribute.as_bool()? == *expected),
            Self::Substring(needle) => Some(attribute.as_str()?.contains(needle.as_str())),
            Self::Gt(bound) => Some(attribute.as_valid_number()? > *bound),
            Self::Lt(bound) => Some(attribute.as_valid_number()? < *bound),
        }
    }

    /// Operator name as it appears in the datafile.
    pub fn match_type(&self) -> &'static str {
        match self {
            Self::Exists => "exists",
            Self::Exact(_) => "exact",
            Self::Substring(_) => "substring",
            Self::Gt(_) => "gt",
            Self::Lt(_) => "lt",
        }
    }
}

/// Literal numbers must be comparable as `f64` without loss: integers up to 2^53 in magnitude,
/// finite floats.
fn valid_literal(n: &serde_json::Number) -> Option<f64> {
    if let Some(i) = n.as_i64() {
        return (i.unsigned_abs() <= MAX_SAFE_INTEGER as u64).then_some(i as f64);
    }
    if n.is_u64() {
        // Only reached for values above i64::MAX.
        return None;
    }
    n.as_f64().filter(|f| f.is_finite())
}
