//! Structural comparison of two effects, with readable failure messages.

use crate::{Effect, effect::diff_effects};

use super::{
    report::{assertion_failed, field_diffs},
    validate_helper,
};

/// Compares the effect a saga yielded against the one a test expected.
///
/// Returns `None` on a match, otherwise a message of the form
/// `Assertion {step} failed: {header}` followed by the two effects. When
/// either side is a helper fork, the comparison drives both helpers and
/// checks the effects they expand to instead.
pub fn compare_effects(
    actual: Option<&Effect>,
    expected: &Effect,
    effect_name: &str,
    step: usize,
) -> Option<String> {
    let final_name = if expected.as_helper().is_some() {
        format!("{effect_name} helper")
    } else {
        effect_name.to_string()
    };

    let Some(actual) = actual else {
        return Some(assertion_failed(
            step,
            &format!("expected {final_name} effect, but the saga yielded nothing"),
            Some(expected.to_string()),
            None,
        ));
    };

    if validate_helper::involves_helper(actual, expected) {
        return validate_helper::compare_helpers(actual, expected, effect_name, step);
    }

    let header = match (actual.is_parallel(), expected.is_parallel()) {
        (true, false) => Some(format!(
            "expected {final_name} effect, but the saga yielded parallel effects"
        )),
        (false, true) => Some("expected parallel effects, but the saga yielded a single effect".into()),
        _ if actual.tag() != expected.tag() => Some(format!(
            "expected {final_name} effect, but the saga yielded a different effect"
        )),
        _ => None,
    };
    if let Some(header) = header {
        return Some(assertion_failed(
            step,
            &header,
            Some(expected.to_string()),
            Some(actual.to_string()),
        ));
    }

    if actual == expected {
        return None;
    }
    let mut message = assertion_failed(
        step,
        &format!("{final_name} effects do not match"),
        Some(expected.to_string()),
        Some(actual.to_string()),
    );
    let diffs = diff_effects(actual, expected);
    if !diffs.is_empty() {
        message.push_str(&field_diffs(&diffs));
    }
    Some(message)
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::*;
    use crate::{Func, effects};

    #[test]
    fn equal_effects_match() {
        let fetch = Func::value("fetch", |_| Value::Null);
        let effect = effects::call(&fetch, [json!(1)]);
        assert_eq!(compare_effects(Some(&effect), &effect.clone(), "call", 1), None);
    }

    #[test]
    fn nothing_yielded() {
        let message = compare_effects(None, &effects::take("FOO"), "take", 3);
        assert_eq!(
            message.as_deref(),
            Some("Assertion 3 failed: expected take effect, but the saga yielded nothing\n\nExpected\n--------\ntake(\"FOO\")")
        );
    }

    #[test]
    fn parallel_mismatch_in_both_directions() {
        let all = effects::all([effects::take("A")]);
        let single = effects::take("A");

        let message = compare_effects(Some(&all), &single, "take", 1).unwrap_or_default();
        assert!(message.contains("expected take effect, but the saga yielded parallel effects"));
        let message = compare_effects(Some(&single), &all, "all", 1).unwrap_or_default();
        assert!(message.contains("expected parallel effects, but the saga yielded a single effect"));
    }

    #[test]
    fn different_tag() {
        let message = compare_effects(Some(&effects::take("A")), &effects::put(json!({"type": "A"})), "put", 2)
            .unwrap_or_default();
        assert!(message.starts_with("Assertion 2 failed: expected put effect, but the saga yielded a different effect"));
    }

    #[test]
    fn mismatch_lists_fields() {
        let add = Func::value("add", |_| Value::Null);
        let message = compare_effects(
            Some(&effects::call(&add, [json!(1), json!(2)])),
            &effects::call(&add, [json!(1), json!(3)]),
            "call",
            1,
        )
        .unwrap_or_default();
        assert!(message.starts_with("Assertion 1 failed: call effects do not match"));
        assert!(message.ends_with("Mismatched fields\n-----------------\nargs: expected [1, 3], actual [1, 2]"));
    }
}
