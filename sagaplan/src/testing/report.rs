use serde_json::Value;

use crate::{
    Effect, SagaError,
    effect::{FieldDiff, diff_effects},
};

use super::EffectStore;

pub(crate) fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

/// `Assertion {step} failed: {header}`, with the two sides when known.
pub(crate) fn assertion_failed(
    step: usize,
    header: &str,
    expected: Option<String>,
    actual: Option<String>,
) -> String {
    let mut message = format!("Assertion {step} failed: {header}");
    if let Some(expected) = expected {
        message.push_str(&format!("\n\nExpected\n--------\n{expected}"));
    }
    if let Some(actual) = actual {
        message.push_str(&format!("\n\nActual\n------\n{actual}"));
    }
    message
}

pub(crate) fn field_diffs(diffs: &[FieldDiff]) -> String {
    let mut out = String::from("\n\nMismatched fields\n-----------------");
    for diff in diffs {
        out.push_str(&format!("\n{diff}"));
    }
    out
}

/// Numbered list of the effects recorded for one tag.
pub(crate) fn actual_effects(store: &EffectStore, effect_name: &str) -> String {
    if store.is_empty() {
        return format!("\nActual:\n------\nNo {effect_name} effects were yielded.\n");
    }
    let mut out = String::from("\nActual:\n------\n");
    for (i, effect) in store.values().iter().enumerate() {
        out.push_str(&format!("{}. {effect}\n", i + 1));
    }
    out
}

/// Field diffs against the recorded effect closest to `expected`: same tag,
/// fewest differing fields.
pub(crate) fn closest_mismatch(store: &EffectStore, expected: &Effect) -> Option<String> {
    let diffs = store
        .values()
        .iter()
        .map(|actual| diff_effects(actual, expected))
        .filter(|diffs| !diffs.is_empty() && diffs.iter().all(|d| d.field != "type"))
        .min_by_key(Vec::len)?;
    let mut out = String::from("\nClosest match differs in:\n");
    for diff in diffs {
        out.push_str(&format!("  {diff}\n"));
    }
    Some(out)
}

/// An expectation on a tag the harness keeps no store for.
pub(crate) fn unrecorded(effect_name: &str, described: &str) -> String {
    format!(
        "\n{effect_name} expectation unmet:\n\n{effect_name} effects are not recorded by expect_saga; assert them with test_saga\n------------\n{described}\n"
    )
}

/// `Expected to return` / `Did not expect to return` blocks. `actual` is
/// `None` when the saga never returned.
pub(crate) fn return_mismatch(expected: &Value, actual: Option<&Value>, expect_to_have: bool) -> String {
    if expect_to_have {
        let instead = match actual {
            Some(actual) => format!("But returned instead:\n---------------------\n{}", pretty(actual)),
            None => "But did not return".to_string(),
        };
        format!(
            "\nExpected to return:\n-------------------\n{}\n\n{instead}\n",
            pretty(expected)
        )
    } else {
        format!(
            "\nDid not expect to return:\n-------------------------\n{}\n",
            pretty(expected)
        )
    }
}

pub(crate) fn throw_mismatch(
    expected: &SagaError,
    actual: Option<&SagaError>,
    expect_to_have: bool,
) -> String {
    if !expect_to_have {
        return format!("\nDid not expect to throw:\n------------------------\n{expected}\n");
    }
    let instead = match actual {
        Some(actual) => format!("But threw instead:\n------------------\n{actual}"),
        None => "But did not throw".to_string(),
    };
    format!("\nExpected to throw:\n------------------\n{expected}\n\n{instead}\n")
}

pub(crate) fn state_mismatch(expected: &Value, actual: &Value, expect_to_have: bool) -> String {
    if expect_to_have {
        format!(
            "\nExpected to have final store state:\n-----------------------------------\n{}\n\nBut instead had final store state:\n---------------------------------\n{}\n",
            pretty(expected),
            pretty(actual)
        )
    } else {
        format!(
            "\nExpected to not have final store state:\n---------------------------------------\n{}\n",
            pretty(expected)
        )
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{Func, effects};

    #[test]
    fn actual_effects_lists_in_order() {
        let mut store = EffectStore::default();
        store.add(effects::take("A"));
        store.add(effects::take("B"));
        assert_eq!(
            actual_effects(&store, "take"),
            "\nActual:\n------\n1. take(\"A\")\n2. take(\"B\")\n"
        );
        assert!(actual_effects(&EffectStore::default(), "put").contains("No put effects"));
    }

    #[test]
    fn closest_mismatch_names_the_field() {
        let add = Func::value("add", |_| json!(0));
        let mut store = EffectStore::default();
        store.add(effects::call(&add, [json!(1), json!(2)]));

        let report = closest_mismatch(&store, &effects::call(&add, [json!(1), json!(3)]));
        assert_eq!(
            report.as_deref(),
            Some("\nClosest match differs in:\n  args: expected [1, 3], actual [1, 2]\n")
        );
    }

    #[test]
    fn return_mismatch_without_a_return_value() {
        assert_eq!(
            return_mismatch(&Value::Null, None, true),
            "\nExpected to return:\n-------------------\nnull\n\nBut did not return\n"
        );
        assert!(return_mismatch(&json!(1), Some(&json!(2)), true).contains("But returned instead"));
    }

    #[test]
    fn assertion_failed_layout() {
        let message = assertion_failed(2, "put effects do not match", Some("a".into()), Some("b".into()));
        assert_eq!(
            message,
            "Assertion 2 failed: put effects do not match\n\nExpected\n--------\na\n\nActual\n------\nb"
        );
    }
}
