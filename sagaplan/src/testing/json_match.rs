use serde_json::Value;

/// Partial deep comparison: every key of an `expected` object must match in
/// `actual`, extra keys are ignored. Arrays match when each expected element
/// matches a distinct actual element, in any order. Scalars compare equal.
pub(crate) fn is_match(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Object(actual), Value::Object(expected)) => expected
            .iter()
            .all(|(key, want)| actual.get(key).is_some_and(|got| is_match(got, want))),
        (Value::Array(actual), Value::Array(expected)) => {
            if expected.len() > actual.len() {
                return false;
            }
            let mut used = vec![false; actual.len()];
            expected.iter().all(|want| {
                let found = actual
                    .iter()
                    .enumerate()
                    .position(|(i, got)| !used[i] && is_match(got, want));
                match found {
                    Some(i) => {
                        used[i] = true;
                        true
                    }
                    None => false,
                }
            })
        }
        _ => actual == expected,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn objects_match_on_subset_of_keys() {
        let action = json!({"type": "DONE", "payload": {"id": 1, "name": "a"}});
        assert!(is_match(&action, &json!({"type": "DONE"})));
        assert!(is_match(&action, &json!({"payload": {"id": 1}})));
        assert!(!is_match(&action, &json!({"payload": {"id": 2}})));
        assert!(!is_match(&action, &json!({"missing": null})));
    }

    #[test]
    fn arrays_match_unordered_without_reuse() {
        assert!(is_match(&json!([1, 2, 3]), &json!([3, 1])));
        assert!(!is_match(&json!([1, 2]), &json!([1, 1])));
        assert!(!is_match(&json!([1]), &json!([1, 2])));
    }

    #[test]
    fn scalars_compare_equal() {
        assert!(is_match(&json!("a"), &json!("a")));
        assert!(!is_match(&json!(1), &json!("1")));
    }
}
