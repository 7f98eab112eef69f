//! Audiences and their condition trees.
mod condition;
mod match_condition;

pub use condition::{Condition, LeafKind, UserAttribute};
pub use match_condition::{MatchCondition, Value, CUSTOM_ATTRIBUTE};

use crate::{datafile::AudienceWire, Attributes};

/// Errors compiling a condition tree.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum ConditionError {
    /// Leaf condition uses a `match` operator this library does not know.
    #[error("unknown match type {0:?}, try upgrading")]
    UnknownMatchType(String),

    /// Leaf literal cannot be used with its `match` operator (or, without an operator, the
    /// literal is not a string).
    #[error("value {value} is not compatible with match type {match_type:?}")]
    IncompatibleMatchValue {
        /// Operator of the leaf (`legacy` when the operator is omitted).
        match_type: String,
        /// Offending literal.
        value: serde_json::Value,
    },

    /// Stringified conditions are not valid JSON.
    #[error("conditions are not valid JSON: {0}")]
    InvalidJson(String),

    /// Conditions are valid JSON but not a condition tree.
    #[error("invalid condition tree: {0}")]
    InvalidStructure(String),
}

/// A named condition tree defining eligibility criteria for a user.
#[derive(Debug, Clone)]
pub struct Audience {
    #[allow(missing_docs)]
    pub id: String,
    #[allow(missing_docs)]
    pub name: String,
    /// Compiled conditions. An audience whose conditions failed to compile is kept (so it still
    /// resolves by id) but always evaluates to indeterminate.
    pub conditions: Result<Condition, ConditionError>,
}

impl Audience {
    /// Compile a datafile audience. Legacy audiences carry their tree as a JSON-encoded string,
    /// typed audiences carry it inline.
    pub(crate) fn compile(wire: AudienceWire) -> Audience {
        let conditions = match &wire.conditions {
            serde_json::Value::String(s) => s.parse(),
            other => Condition::from_json(other),
        };
        Audience {
            id: wire.id,
            name: wire.name,
            conditions,
        }
    }

    /// Evaluate audience conditions against user attributes.
    pub fn evaluate(&self, attributes: &Attributes) -> Option<bool> {
        let result = match &self.conditions {
            Ok(condition) => condition.evaluate(attributes),
            Err(_) => None,
        };
        log::trace!(target: "ab_core",
            audience_id:display = self.id,
            result:? = result;
            "evaluated audience");
        result
    }
}
