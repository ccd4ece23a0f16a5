use std::cmp::Ordering;
use std::fmt::Display;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use super::node::NodeError;

/// A typed value attached to a node under a user-chosen key.
///
/// Features are totally ordered and hashable (floats compare with
/// [`f64::total_cmp`]) so they can be collected into sets and used to sort
/// clades.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Feature {
    /// Floating point value
    Float(f64),
    /// Integer value
    Int(i64),
    /// Free text
    Text(String),
    /// Boolean flag
    Bool(bool),
}

impl Feature {
    /// Name of the variant, used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Feature::Float(_) => "float",
            Feature::Int(_) => "int",
            Feature::Text(_) => "text",
            Feature::Bool(_) => "bool",
        }
    }

    /// Numeric view of the feature. Integers are widened and text is parsed.
    /// ```
    /// use phylonode::tree::Feature;
    ///
    /// assert_eq!(Feature::Int(2).as_float(), Some(2.0));
    /// assert_eq!(Feature::from("0.25").as_float(), Some(0.25));
    /// assert_eq!(Feature::Bool(true).as_float(), None);
    /// ```
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Feature::Float(v) => Some(*v),
            Feature::Int(v) => Some(*v as f64),
            Feature::Text(s) => s.trim().parse().ok(),
            Feature::Bool(_) => None,
        }
    }

    /// Integer value, if the feature holds one
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Feature::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Text value, if the feature holds one
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Feature::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Boolean value, if the feature holds one
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Feature::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Numeric conversion used when writing built-in numeric fields
    pub(crate) fn to_float(&self, key: &str) -> Result<f64, NodeError> {
        self.as_float().ok_or_else(|| NodeError::TypeMismatch {
            key: key.to_owned(),
            expected: "float",
            found: self.type_name(),
        })
    }

    fn rank(&self) -> u8 {
        match self {
            Feature::Bool(_) => 0,
            Feature::Int(_) => 1,
            Feature::Float(_) => 2,
            Feature::Text(_) => 3,
        }
    }
}

impl PartialEq for Feature {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Feature {}

impl PartialOrd for Feature {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Feature {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Feature::Float(a), Feature::Float(b)) => a.total_cmp(b),
            (Feature::Int(a), Feature::Int(b)) => a.cmp(b),
            (Feature::Text(a), Feature::Text(b)) => a.cmp(b),
            (Feature::Bool(a), Feature::Bool(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl Hash for Feature {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Feature::Float(v) => v.to_bits().hash(state),
            Feature::Int(v) => v.hash(state),
            Feature::Text(s) => s.hash(state),
            Feature::Bool(b) => b.hash(state),
        }
    }
}

impl Display for Feature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Feature::Float(v) => write!(f, "{v}"),
            Feature::Int(v) => write!(f, "{v}"),
            Feature::Text(s) => write!(f, "{s}"),
            Feature::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<f64> for Feature {
    fn from(value: f64) -> Self {
        Feature::Float(value)
    }
}

impl From<i64> for Feature {
    fn from(value: i64) -> Self {
        Feature::Int(value)
    }
}

impl From<bool> for Feature {
    fn from(value: bool) -> Self {
        Feature::Bool(value)
    }
}

impl From<&str> for Feature {
    fn from(value: &str) -> Self {
        Feature::Text(value.to_owned())
    }
}

impl From<String> for Feature {
    fn from(value: String) -> Self {
        Feature::Text(value)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeSet, HashSet};

    use super::*;

    #[test]
    fn ordering_is_total() {
        let mut values = vec![
            Feature::from("b"),
            Feature::Float(2.5),
            Feature::Int(3),
            Feature::from("a"),
            Feature::Float(-1.0),
            Feature::Bool(true),
        ];
        values.sort();
        assert_eq!(
            values,
            vec![
                Feature::Bool(true),
                Feature::Int(3),
                Feature::Float(-1.0),
                Feature::Float(2.5),
                Feature::from("a"),
                Feature::from("b"),
            ]
        );
    }

    #[test]
    fn usable_in_sets() {
        let hashed: HashSet<_> = [Feature::Float(0.1), Feature::Float(0.1), Feature::Int(1)]
            .into_iter()
            .collect();
        assert_eq!(hashed.len(), 2);

        let ordered: BTreeSet<_> = [Feature::from("x"), Feature::from("x")]
            .into_iter()
            .collect();
        assert_eq!(ordered.len(), 1);
    }

    #[test]
    fn float_conversion() {
        assert_eq!(Feature::Float(1.5).to_float("dist").unwrap(), 1.5);
        assert!(matches!(
            Feature::from("abc").to_float("dist"),
            Err(NodeError::TypeMismatch {
                expected: "float",
                found: "text",
                ..
            })
        ));
        assert!(Feature::Bool(false).to_float("support").is_err());
    }
}
