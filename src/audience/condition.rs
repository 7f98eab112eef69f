use std::{fmt, str::FromStr};

use crate::Attributes;

use super::{match_condition::CUSTOM_ATTRIBUTE, ConditionError, MatchCondition};

/// Audience condition tree.
///
/// Evaluation uses three-valued logic: `Some(true)`, `Some(false)`, or `None` when the condition
/// does not apply to the given attributes (e.g., the attribute is missing).
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// All children must be true.
    And(Vec<Condition>),
    /// At least one child must be true.
    Or(Vec<Condition>),
    /// Negation of the child.
    Not(Box<Condition>),
    /// Comparison against a single user attribute.
    Leaf(UserAttribute),
}

/// Leaf condition: compares one named user attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct UserAttribute {
    /// Attribute key.
    pub name: String,
    /// What the leaf compares against.
    pub kind: LeafKind,
}

/// Kind of a leaf condition (the `type` field in the datafile).
#[derive(Debug, Clone, PartialEq)]
pub enum LeafKind {
    /// `custom_attribute` leaf with its compiled matcher.
    CustomAttribute(MatchCondition),
    /// A kind this library does not know. Always evaluates to indeterminate.
    Unknown(String),
}

impl Condition {
    /// Evaluate the tree against user attributes.
    pub fn evaluate(&self, attributes: &Attributes) -> Option<bool> {
        match self {
            Condition::And(children) => {
                let mut indeterminate = false;
                for child in children {
                    match child.evaluate(attributes) {
                        Some(false) => return Some(false),
                        None => indeterminate = true,
                        Some(true) => {}
                    }
                }
                if indeterminate {
                    None
                } else {
                    Some(true)
                }
            }
            Condition::Or(children) => {
                let mut indeterminate = false;
                for child in children {
                    match child.evaluate(attributes) {
                        Some(true) => return Some(true),
                        None => indeterminate = true,
                        Some(false) => {}
                    }
                }
                if indeterminate {
                    None
                } else {
                    Some(false)
                }
            }
            Condition::Not(child) => child.evaluate(attributes).map(|result| !result),
            Condition::Leaf(leaf) => leaf.evaluate(attributes),
        }
    }

    /// Build a condition tree from its JSON representation.
    ///
    /// The tree is a JSON array whose first element is an optional operator (`"and"`, `"or"`,
    /// `"not"`). Without an operator the array is an implicit `or`. Every other element is
    /// either a nested array or a leaf object. A single leaf object is also accepted.
    pub fn from_json(value: &serde_json::Value) -> Result<Condition, ConditionError> {
        match value {
            serde_json::Value::Array(items) => Self::from_json_array(items),
            serde_json::Value::Object(_) => Ok(Condition::Leaf(UserAttribute::from_json(value)?)),
            other => Err(ConditionError::InvalidStructure(format!(
                "expected an array or an object, found {other}"
            ))),
        }
    }

    fn from_json_array(items: &[serde_json::Value]) -> Result<Condition, ConditionError> {
        let (operator, operands) = match items.split_first() {
            Some((serde_json::Value::String(operator), rest)) => (operator.as_str(), rest),
            _ => ("or", items),
        };

        let children = operands
            .iter()
            .map(Condition::from_json)
            .collect::<Result<Vec<_>, _>>()?;

        match operator {
            "and" => Ok(Condition::And(children)),
            "or" => Ok(Condition::Or(children)),
            "not" => {
                let child = children.into_iter().next().ok_or_else(|| {
                    ConditionError::InvalidStructure("\"not\" requires an operand".to_owned())
                })?;
                Ok(Condition::Not(Box::new(child)))
            }
            other => Err(ConditionError::InvalidStructure(format!(
                "unknown logical operator {other:?}"
            ))),
        }
    }
}

impl FromStr for Condition {
    type Err = ConditionError;

    /// Parse the stringified form used by legacy audiences.
    fn from_str(s: &str) -> Result<Condition, ConditionError> {
        let value: serde_json::Value =
            serde_json::from_str(s).map_err(|err| ConditionError::InvalidJson(err.to_string()))?;
        Condition::from_json(&value)
    }
}

impl UserAttribute {
    /// Create a `custom_attribute` leaf.
    pub fn custom(name: impl Into<String>, matcher: MatchCondition) -> UserAttribute {
        UserAttribute {
            name: name.into(),
            kind: LeafKind::CustomAttribute(matcher),
        }
    }

    fn from_json(value: &serde_json::Value) -> Result<UserAttribute, ConditionError> {
        let name = string_field(value, "name")?;
        let condition_type = string_field(value, "type")?;

        let kind = if condition_type == CUSTOM_ATTRIBUTE {
            let match_type = match value.get("match") {
                None | Some(serde_json::Value::Null) => None,
                Some(serde_json::Value::String(s)) => Some(s.as_str()),
                Some(other) => {
                    return Err(ConditionError::InvalidStructure(format!(
                        "\"match\" must be a string, found {other}"
                    )))
                }
            };
            LeafKind::CustomAttribute(MatchCondition::compile(match_type, value.get("value"))?)
        } else {
            LeafKind::Unknown(condition_type.to_owned())
        };

        Ok(UserAttribute {
            name: name.to_owned(),
            kind,
        })
    }

    fn evaluate(&self, attributes: &Attributes) -> Option<bool> {
        match &self.kind {
            LeafKind::CustomAttribute(matcher) => matcher.eval(&self.name, attributes),
            LeafKind::Unknown(_) => {
                log::warn!(target: "ab_core", condition:display = self;
                    "audience condition has an unknown condition type, consider upgrading");
                None
            }
        }
    }
}

fn string_field<'a>(value: &'a serde_json::Value, key: &str) -> Result<&'a str, ConditionError> {
    value.get(key).and_then(|v| v.as_str()).ok_or_else(|| {
        ConditionError::InvalidStructure(format!("leaf condition requires a string {key:?}"))
    })
}

impl fmt::Display for UserAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            LeafKind::CustomAttribute(matcher) => {
                write!(f, "{{name='{}', type='{CUSTOM_ATTRIBUTE}', match='{}'", self.name, matcher.match_type())?;
                match matcher {
                    MatchCondition::Exists => write!(f, "}}"),
                    MatchCondition::Exact(value) => write!(f, ", value={value}}}"),
                    MatchCondition::Substring(s) => write!(f, ", value='{s}'}}"),
                    MatchCondition::Gt(n) | MatchCondition::Lt(n) => write!(f, ", value={n}}}"),
                }
            }
            LeafKind::Unknown(condition_type) => {
                write!(f, "{{name='{}', type='{condition_type}'}}", self.name)
            }
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::And(children) => write_operator(f, "and", children),
            Condition::Or(children) => write_operator(f, "or", children),
            Condition::Not(child) => write_operator(f, "not", std::slice::from_ref(child.as_ref())),
            Condition::Leaf(leaf) => write!(f, "{leaf}"),
        }
    }
}

fn write_operator(f: &mut fmt::Formatter<'_>, operator: &str, children: &[Condition]) -> fmt::Result {
    write!(f, "[\"{operator}\"")?;
    for child in children {
        write!(f, ", {child}")?;
    }
    write!(f, "]")
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde_json::json;

    use super::{Condition, LeafKind, UserAttribute};
    use crate::{
        audience::{ConditionError, MatchCondition},
        Attributes,
    };

    const TRUE: Option<bool> = Some(true);
    const FALSE: Option<bool> = Some(false);
    const NULL: Option<bool> = None;

    /// Leaf evaluating to the requested state against `attrs()`.
    fn leaf(state: Option<bool>) -> Condition {
        let name = match state {
            Some(true) => "yes",
            Some(false) => "no",
            None => "missing",
        };
        Condition::Leaf(UserAttribute::custom(name, MatchCondition::Exact("y".into())))
    }

    fn attrs() -> Attributes {
        HashMap::from([("yes".into(), "y".into()), ("no".into(), "n".into())])
    }

    fn and(children: Vec<Condition>) -> Condition {
        Condition::And(children)
    }

    fn or(children: Vec<Condition>) -> Condition {
        Condition::Or(children)
    }

    fn not(child: Condition) -> Condition {
        Condition::Not(Box::new(child))
    }

    #[test]
    fn empty_combinators() {
        assert_eq!(and(vec![]).evaluate(&attrs()), TRUE);
        assert_eq!(or(vec![]).evaluate(&attrs()), FALSE);
    }

    #[test]
    fn and_three_valued() {
        assert_eq!(and(vec![leaf(TRUE), leaf(TRUE)]).evaluate(&attrs()), TRUE);
        assert_eq!(and(vec![leaf(TRUE), leaf(FALSE)]).evaluate(&attrs()), FALSE);
        assert_eq!(and(vec![leaf(NULL), leaf(FALSE)]).evaluate(&attrs()), FALSE);
        assert_eq!(and(vec![leaf(TRUE), leaf(NULL)]).evaluate(&attrs()), NULL);
    }

    #[test]
    fn or_three_valued() {
        assert_eq!(or(vec![leaf(FALSE), leaf(TRUE)]).evaluate(&attrs()), TRUE);
        assert_eq!(or(vec![leaf(NULL), leaf(TRUE)]).evaluate(&attrs()), TRUE);
        assert_eq!(or(vec![leaf(FALSE), leaf(NULL)]).evaluate(&attrs()), NULL);
        assert_eq!(or(vec![leaf(FALSE), leaf(FALSE)]).evaluate(&attrs()), FALSE);
    }

    #[test]
    fn double_negation_is_identity() {
        for state in [TRUE, FALSE, NULL] {
            assert_eq!(not(leaf(state)).evaluate(&attrs()), state.map(|b| !b));
            assert_eq!(not(not(leaf(state))).evaluate(&attrs()), state);
        }
    }

    #[test]
    fn missing_attribute_is_indeterminate() {
        let condition = Condition::Leaf(UserAttribute::custom("age", MatchCondition::Gt(10.0)));
        assert_eq!(condition.evaluate(&HashMap::new()), NULL);
        assert_eq!(
            condition.evaluate(&HashMap::from([("name".into(), "alice".into())])),
            NULL
        );
    }

    #[test]
    fn unknown_leaf_kind_is_indeterminate() {
        let condition: Condition = r#"["and", {"name": "x", "type": "third_party_dimension", "match": "weird", "value": {}}]"#
            .parse()
            .unwrap();
        let Condition::And(children) = &condition else {
            panic!("expected and, got {condition:?}");
        };
        assert!(matches!(
            &children[0],
            Condition::Leaf(UserAttribute { kind: LeafKind::Unknown(t), .. }) if t == "third_party_dimension"
        ));
        assert_eq!(
            condition.evaluate(&HashMap::from([("x".into(), "y".into())])),
            NULL
        );
    }

    #[test]
    fn parses_legacy_audience() {
        let condition: Condition = r#"["and", ["or", ["not", ["or", {"name": "browser_type", "type": "custom_attribute", "value": "firefox"}]]]]"#
            .parse()
            .unwrap();
        let expected = and(vec![or(vec![not(or(vec![Condition::Leaf(UserAttribute::custom(
            "browser_type",
            MatchCondition::Exact("firefox".into()),
        ))]))])]);
        assert_eq!(condition, expected);

        let firefox = HashMap::from([("browser_type".into(), "firefox".into())]);
        let chrome = HashMap::from([("browser_type".into(), "chrome".into())]);
        assert_eq!(condition.evaluate(&firefox), FALSE);
        assert_eq!(condition.evaluate(&chrome), TRUE);
        assert_eq!(condition.evaluate(&HashMap::new()), NULL);
    }

    #[test]
    fn implicit_or_and_single_leaf() {
        let implicit = Condition::from_json(&json!([
            {"name": "a", "type": "custom_attribute", "match": "exists"},
            {"name": "b", "type": "custom_attribute", "match": "exists"}
        ]))
        .unwrap();
        assert!(matches!(&implicit, Condition::Or(children) if children.len() == 2));
        assert_eq!(
            implicit.evaluate(&HashMap::from([("b".into(), 1.into())])),
            TRUE
        );

        let single = Condition::from_json(
            &json!({"name": "a", "type": "custom_attribute", "match": "lt", "value": 3}),
        )
        .unwrap();
        assert_eq!(
            single,
            Condition::Leaf(UserAttribute::custom("a", MatchCondition::Lt(3.0)))
        );
    }

    #[test]
    fn malformed_trees() {
        assert!(matches!(
            "not json".parse::<Condition>(),
            Err(ConditionError::InvalidJson(_))
        ));
        assert!(matches!(
            Condition::from_json(&json!(["not"])),
            Err(ConditionError::InvalidStructure(_))
        ));
        assert!(matches!(
            Condition::from_json(&json!(["xor", {"name": "a", "type": "custom_attribute", "match": "exists"}])),
            Err(ConditionError::InvalidStructure(_))
        ));
        assert!(matches!(
            Condition::from_json(&json!(["and", 42])),
            Err(ConditionError::InvalidStructure(_))
        ));
        assert!(matches!(
            Condition::from_json(&json!(["and", {"type": "custom_attribute", "value": "x"}])),
            Err(ConditionError::InvalidStructure(_))
        ));
        assert!(matches!(
            Condition::from_json(&json!(["and", {"name": "a", "type": "custom_attribute", "match": "regex", "value": "x"}])),
            Err(ConditionError::UnknownMatchType(_))
        ));
        assert!(matches!(
            Condition::from_json(&json!(["and", {"name": "a", "type": "custom_attribute", "value": 42}])),
            Err(ConditionError::IncompatibleMatchValue { .. })
        ));
    }

    #[test]
    fn display_renders_tree() {
        let condition = and(vec![not(Condition::Leaf(UserAttribute::custom(
            "browser_type",
            MatchCondition::Exact("firefox".into()),
        )))]);
        assert_eq!(
            condition.to_string(),
            r#"["and", ["not", {name='browser_type', type='custom_attribute', match='exact', value='firefox'}]]"#
        );
    }
}
