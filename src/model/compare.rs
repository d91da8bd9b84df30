//! Filter comparison.
//!
//! `Compare` is the typed form of a filter's `compare` document: a list of
//! alternatives, an object whose fields must match, or a leaf value that must
//! be strictly equal. `check_compare` walks it against a lookup response.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// How the elements of a list comparison combine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Condition {
    #[default]
    And,
    Or,
}

impl Condition {
    /// Outcome when nothing short-circuited (or nothing could be compared).
    fn exhausted(self) -> bool {
        matches!(self, Condition::And)
    }
}

/// A comparison tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub enum Compare {
    /// Strict equality with the datum.
    Leaf(Value),
    /// Every field must match the datum's field of the same name.
    Object(Vec<(String, Compare)>),
    /// Elements combined under the filter's condition.
    List(Vec<Compare>),
}

impl From<Value> for Compare {
    fn from(value: Value) -> Self {
        match value {
            Value::Array(items) => Compare::List(items.into_iter().map(Compare::from).collect()),
            Value::Object(fields) => Compare::Object(
                fields
                    .into_iter()
                    .map(|(k, v)| (k, Compare::from(v)))
                    .collect(),
            ),
            leaf => Compare::Leaf(leaf),
        }
    }
}

impl From<Compare> for Value {
    fn from(compare: Compare) -> Self {
        match compare {
            Compare::Leaf(v) => v,
            Compare::Object(fields) => {
                let map: Map<String, Value> =
                    fields.into_iter().map(|(k, v)| (k, Value::from(v))).collect();
                Value::Object(map)
            }
            Compare::List(items) => Value::Array(items.into_iter().map(Value::from).collect()),
        }
    }
}

/// Check a lookup response against a comparison tree.
///
/// Lists short-circuit: `Or` returns on the first match, `And` on the first
/// miss; a list that runs out falls back to `And → true`, `Or → false`. The
/// same fallback applies when either side is missing.
pub fn check_compare(compare: Option<&Compare>, data: Option<&Value>, condition: Condition) -> bool {
    let data = data.filter(|d| !d.is_null());

    match (compare, data) {
        (Some(Compare::List(items)), _) => {
            for item in items {
                let matched = check_compare(Some(item), data, condition);
                match condition {
                    Condition::Or if matched => return true,
                    Condition::And if !matched => return false,
                    _ => {}
                }
            }
        }
        (Some(Compare::Object(fields)), Some(data)) => {
            return fields.iter().all(|(key, expected)| match expected {
                Compare::Leaf(value) => data.get(key) == Some(value),
                nested => data
                    .get(key)
                    .filter(|d| !d.is_null())
                    .is_some_and(|d| check_compare(Some(nested), Some(d), Condition::And)),
            });
        }
        (Some(Compare::Leaf(expected)), Some(data)) => return expected == data,
        _ => {}
    }

    condition.exhausted()
}
