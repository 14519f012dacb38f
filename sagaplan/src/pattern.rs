use std::{fmt, rc::Rc};

use serde_json::Value;

/// Decides which dispatched actions a `take` or `actionChannel` accepts.
///
/// Actions are JSON objects with a string `"type"` field, Redux style.
///
/// ```rust
/// use sagaplan::Pattern;
/// use serde_json::json;
///
/// assert!(Pattern::from("FOO").matches(&json!({"type": "FOO"})));
/// assert!(Pattern::from("*").matches(&json!({"type": "BAR"})));
/// assert!(Pattern::from(["A", "B"]).matches(&json!({"type": "B"})));
///
/// let big = Pattern::predicate("isBig", |a| a["size"].as_u64() > Some(10));
/// assert!(big.matches(&json!({"type": "X", "size": 11})));
/// ```
#[derive(Clone)]
pub enum Pattern {
    /// `"*"`: every action.
    Any,
    /// Actions whose `"type"` equals the string.
    Type(String),
    /// Actions matching any of the nested patterns.
    OneOf(Vec<Pattern>),
    /// Actions accepted by a named predicate. Compared by identity.
    Predicate(Predicate),
}

/// A named action predicate.
#[derive(Clone)]
pub struct Predicate {
    name: Rc<str>,
    test: Rc<dyn Fn(&Value) -> bool>,
}

impl Pattern {
    pub fn predicate<F>(name: &str, test: F) -> Self
    where
        F: Fn(&Value) -> bool + 'static,
    {
        Pattern::Predicate(Predicate {
            name: Rc::from(name),
            test: Rc::new(test),
        })
    }

    /// Returns true if `action` is accepted by this pattern.
    pub fn matches(&self, action: &Value) -> bool {
        match self {
            Pattern::Any => true,
            Pattern::Type(kind) => action_type(action) == Some(kind.as_str()),
            Pattern::OneOf(patterns) => patterns.iter().any(|p| p.matches(action)),
            Pattern::Predicate(predicate) => (predicate.test)(action),
        }
    }
}

/// Returns the `"type"` field of a Redux-style action.
pub(crate) fn action_type(action: &Value) -> Option<&str> {
    action.get("type").and_then(Value::as_str)
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Pattern::Any, Pattern::Any) => true,
            (Pattern::Type(a), Pattern::Type(b)) => a == b,
            (Pattern::OneOf(a), Pattern::OneOf(b)) => a == b,
            (Pattern::Predicate(a), Pattern::Predicate(b)) => Rc::ptr_eq(&a.test, &b.test),
            _ => false,
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Any => write!(f, "\"*\""),
            Pattern::Type(kind) => write!(f, "{kind:?}"),
            Pattern::OneOf(patterns) => {
                write!(f, "[")?;
                for (i, pattern) in patterns.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{pattern}")?;
                }
                write!(f, "]")
            }
            Pattern::Predicate(predicate) => write!(f, "{}", predicate.name),
        }
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pattern({self})")
    }
}

impl From<&str> for Pattern {
    fn from(kind: &str) -> Self {
        if kind == "*" {
            Pattern::Any
        } else {
            Pattern::Type(kind.to_string())
        }
    }
}

impl From<String> for Pattern {
    fn from(kind: String) -> Self {
        Pattern::from(kind.as_str())
    }
}

impl<const N: usize> From<[&str; N]> for Pattern {
    fn from(kinds: [&str; N]) -> Self {
        Pattern::OneOf(kinds.into_iter().map(Pattern::from).collect())
    }
}

impl From<Vec<Pattern>> for Pattern {
    fn from(patterns: Vec<Pattern>) -> Self {
        Pattern::OneOf(patterns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn type_pattern_matches_action_type() {
        let pattern = Pattern::from("FOO");
        assert!(pattern.matches(&json!({"type": "FOO"})));
        assert!(!pattern.matches(&json!({"type": "BAR"})));
        assert!(!pattern.matches(&json!("FOO")));
    }

    #[test]
    fn star_is_wildcard() {
        assert_eq!(Pattern::from("*"), Pattern::Any);
        assert!(Pattern::Any.matches(&json!({"type": "ANYTHING"})));
    }

    #[test]
    fn predicates_compare_by_identity() {
        let a = Pattern::predicate("even", |v| v["n"].as_u64().is_some_and(|n| n % 2 == 0));
        let b = Pattern::predicate("even", |v| v["n"].as_u64().is_some_and(|n| n % 2 == 0));
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
        assert_eq!(a.to_string(), "even");
    }

    #[test]
    fn one_of_displays_as_list() {
        let pattern = Pattern::from(["A", "B"]);
        assert_eq!(pattern.to_string(), "[\"A\", \"B\"]");
    }
}
