//! Plan document wire format.
//!
//! ```text
//! {"filter": Node | null}
//! Node := {"logical_operator": "AND" | "OR", "filter": [Node, ...]}
//!       | {"logical_operator": "NOT", "filterA": Node, "filterB": Node}
//!       | {"filter_name": string, "instruction": string}
//! ```
//!
//! Documents are decoded into `serde_json::Value` first and lowered by
//! hand so shape errors carry a location and an operator tag. Lowering
//! recurses, but `serde_json` already caps nesting depth while parsing.

use crate::plan::{Node, Operator, Plan, PlanError};
use serde::{
    Deserialize, Deserializer, Serialize, Serializer,
    de::Error as _,
    ser::SerializeMap,
};
use serde_json::{Map, Value};

const KEY_FILTER: &str = "filter";
const KEY_OPERATOR: &str = "logical_operator";
const KEY_FILTER_A: &str = "filterA";
const KEY_FILTER_B: &str = "filterB";
const KEY_FILTER_NAME: &str = "filter_name";
const KEY_INSTRUCTION: &str = "instruction";

// Schema documents call the leaf text `question`; generators following
// the schema literally emit that key instead of `instruction`.
const KEY_QUESTION: &str = "question";

// Operator keys of the schema's wrapper form. Plans must use
// `logical_operator`; the wrapper form is reported, not guessed at.
const WRAPPER_KEYS: [&str; 4] = ["AND", "OR", "XOR", "NOT"];

pub(super) fn lower_document(value: &Value) -> Result<Plan, PlanError> {
    let Value::Object(map) = value else {
        return Err(malformed("$", "plan document must be a JSON object"));
    };

    match map.get(KEY_FILTER) {
        None | Some(Value::Null) => Ok(Plan::unfiltered()),
        Some(node) => Ok(Plan::new(lower_node(node, "$.filter")?)),
    }
}

fn lower_node(value: &Value, at: &str) -> Result<Node, PlanError> {
    let Value::Object(map) = value else {
        return Err(malformed(at, "node must be a JSON object"));
    };

    if let Some(tag) = map.get(KEY_OPERATOR) {
        let Value::String(tag) = tag else {
            return Err(malformed(at, "'logical_operator' must be a string"));
        };
        let op = tag
            .parse::<Operator>()
            .map_err(|tag| PlanError::UnsupportedOperator {
                path: at.to_string(),
                tag,
            })?;

        return match op {
            Operator::And => Ok(Node::And(lower_children(map, at, op)?)),
            Operator::Or => Ok(Node::Or(lower_children(map, at, op)?)),
            Operator::Not => {
                let a = lower_operand(map, at, KEY_FILTER_A)?;
                let b = lower_operand(map, at, KEY_FILTER_B)?;

                Ok(Node::not(a, b))
            }
        };
    }

    if let Some(name) = map.get(KEY_FILTER_NAME) {
        let Value::String(name) = name else {
            return Err(malformed(at, "'filter_name' must be a string"));
        };
        let instruction = match map.get(KEY_INSTRUCTION).or_else(|| map.get(KEY_QUESTION)) {
            Some(Value::String(text)) => text.clone(),
            Some(_) => return Err(malformed(at, "'instruction' must be a string")),
            None => return Err(malformed(at, "leaf is missing 'instruction'")),
        };

        return Ok(Node::leaf(name.clone(), instruction));
    }

    if let Some(key) = WRAPPER_KEYS.iter().find(|key| map.contains_key(**key)) {
        return Err(PlanError::UnsupportedOperator {
            path: at.to_string(),
            tag: (*key).to_string(),
        });
    }

    Err(malformed(at, "node is neither a filter leaf nor a logical operator"))
}

fn lower_children(
    map: &Map<String, Value>,
    at: &str,
    op: Operator,
) -> Result<Vec<Node>, PlanError> {
    match map.get(KEY_FILTER) {
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(i, item)| lower_node(item, &format!("{at}.filter[{i}]")))
            .collect(),
        Some(_) => Err(malformed(at, &format!("'{op}' requires a 'filter' array"))),
        None => Err(malformed(at, &format!("'{op}' is missing 'filter'"))),
    }
}

fn lower_operand(map: &Map<String, Value>, at: &str, key: &str) -> Result<Node, PlanError> {
    match map.get(key) {
        Some(value) => lower_node(value, &format!("{at}.{key}")),
        None => Err(malformed(at, &format!("'NOT' is missing '{key}'"))),
    }
}

fn malformed(at: &str, reason: &str) -> PlanError {
    PlanError::MalformedNode {
        path: at.to_string(),
        reason: reason.to_string(),
    }
}

///
/// Serialization
///

impl Serialize for Plan {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(KEY_FILTER, &self.root)?;
        map.end()
    }
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Leaf(leaf) => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry(KEY_FILTER_NAME, &leaf.filter_name)?;
                map.serialize_entry(KEY_INSTRUCTION, &leaf.instruction)?;
                map.end()
            }
            Self::And(children) | Self::Or(children) => {
                let tag = self.operator().map_or("", Operator::tag);
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry(KEY_OPERATOR, tag)?;
                map.serialize_entry(KEY_FILTER, children)?;
                map.end()
            }
            Self::Not { a, b } => {
                let mut map = serializer.serialize_map(Some(3))?;
                map.serialize_entry(KEY_OPERATOR, Operator::Not.tag())?;
                map.serialize_entry(KEY_FILTER_A, a)?;
                map.serialize_entry(KEY_FILTER_B, b)?;
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for Plan {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;

        lower_document(&value).map_err(D::Error::custom)
    }
}

impl<'de> Deserialize<'de> for Node {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;

        lower_node(&value, "$").map_err(D::Error::custom)
    }
}
