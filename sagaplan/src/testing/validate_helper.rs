//! Comparison of helper forks by the effects they expand to.
//!
//! Both sides are driven in lock-step with canned inputs: a null action for
//! every take, a detached channel for the throttle's action channel and a
//! `"debounced"` win for the debounce race.

use serde_json::Value;

use crate::{
    CallReturn, Effect, Output, Pattern, Saga, Step,
    effect::{ForkTarget, TakeSource},
    helper::HelperKind,
    runtime::Channel,
};

use super::report::assertion_failed;

/// True when either side is a helper fork and the other is a helper fork
/// or a fork of a plain function that may delegate to one.
pub(crate) fn involves_helper(actual: &Effect, expected: &Effect) -> bool {
    let forkish = |e: &Effect| e.as_helper().is_some() || e.as_fork_fn().is_some();
    (actual.as_helper().is_some() || expected.as_helper().is_some())
        && forkish(actual)
        && forkish(expected)
}

/// The routine behind a helper fork, or behind a plain fork whose function
/// returns a saga.
fn open(effect: &Effect) -> Option<Box<dyn Saga>> {
    if let Some(helper) = effect.as_helper() {
        return Some(Box::new(helper.expand()));
    }
    let fork = effect.as_fork_fn()?;
    let ForkTarget::Func(func) = &fork.target else {
        return None;
    };
    match func.invoke(fork.context.as_ref(), &fork.args) {
        Ok(CallReturn::Saga(saga)) => Some(saga),
        _ => None,
    }
}

fn advance(saga: &mut Option<Box<dyn Saga>>, input: Output) -> Option<Effect> {
    match saga.as_mut()?.resume(Ok(input)) {
        Ok(Step::Yield(effect)) => Some(effect),
        _ => None,
    }
}

fn fail(step: usize, header: String) -> Option<String> {
    Some(assertion_failed(step, &header, None, None))
}

fn mismatch(step: usize, header: String, expected: String, actual: String) -> Option<String> {
    Some(assertion_failed(step, &header, Some(expected), Some(actual)))
}

pub(crate) fn compare_helpers(
    actual: &Effect,
    expected: &Effect,
    effect_name: &str,
    step: usize,
) -> Option<String> {
    let expected_kind = expected.as_helper().map(|h| h.kind);
    let actual_kind = actual.as_helper().map(|h| h.kind);

    if let (Some(want), Some(got)) = (expected_kind, actual_kind) {
        if want != got {
            return fail(
                step,
                format!("expected a {want} helper effect, but the saga used a {got} helper effect"),
            );
        }
    }

    let kind = expected_kind.or(actual_kind);
    let name = kind.map_or(effect_name, |k| k.name());
    let mut expected = open(expected);
    let mut actual = open(actual);

    match kind {
        Some(HelperKind::Throttle) => compare_throttle(&mut actual, &mut expected, name, step),
        _ => compare_take_helper(
            &mut actual,
            &mut expected,
            name,
            kind == Some(HelperKind::Debounce),
            step,
        ),
    }
}

fn take_pattern(effect: Option<Effect>) -> Option<Pattern> {
    match effect? {
        Effect::Take(take) => match take.source {
            TakeSource::Pattern(pattern) => Some(pattern),
            TakeSource::Channel(_) => None,
        },
        _ => None,
    }
}

fn channel_pattern(effect: Option<Effect>) -> Option<Pattern> {
    match effect? {
        Effect::ActionChannel(ac) => Some(ac.pattern),
        _ => None,
    }
}

fn compare_take_helper(
    actual: &mut Option<Box<dyn Saga>>,
    expected: &mut Option<Box<dyn Saga>>,
    name: &str,
    debounce: bool,
    step: usize,
) -> Option<String> {
    let Some(want) = take_pattern(advance(expected, Output::null())) else {
        return fail(step, format!("expected {name} did not take a pattern"));
    };
    let Some(got) = take_pattern(advance(actual, Output::null())) else {
        return fail(step, format!("actual {name} did not take a pattern"));
    };
    if want != got {
        return mismatch(
            step,
            format!("expected {name} to watch pattern {want}"),
            want.to_string(),
            got.to_string(),
        );
    }

    let want = fork_step(expected, debounce);
    let got = fork_step(actual, debounce);
    compare_forks(want, got, name, step)
}

/// Moves a take-style helper from its take to its fork.
fn fork_step(saga: &mut Option<Box<dyn Saga>>, debounce: bool) -> Option<Effect> {
    let next = advance(saga, Output::null());
    if debounce && matches!(next, Some(Effect::Race(_))) {
        let won = Output::Race {
            winner: "debounced".into(),
            value: Box::new(Output::Value(Value::Bool(true))),
        };
        return advance(saga, won);
    }
    next
}

fn compare_forks(want: Option<Effect>, got: Option<Effect>, name: &str, step: usize) -> Option<String> {
    let Some(want) = want.as_ref().and_then(Effect::as_fork_fn) else {
        return fail(step, format!("expected {name} did not fork"));
    };
    let Some(got) = got.as_ref().and_then(Effect::as_fork_fn) else {
        return fail(step, format!("actual {name} did not fork"));
    };
    if want.target != got.target {
        let worker = |target: &ForkTarget| match target {
            ForkTarget::Func(func) => func.to_string(),
            ForkTarget::Helper(helper) => helper.to_string(),
        };
        return mismatch(
            step,
            format!("expected {name} to fork {}", worker(&want.target)),
            worker(&want.target),
            worker(&got.target),
        );
    }
    if want.args != got.args {
        return mismatch(
            step,
            format!("arguments to {name} do not match"),
            Value::Array(want.args.clone()).to_string(),
            Value::Array(got.args.clone()).to_string(),
        );
    }
    None
}

fn compare_throttle(
    actual: &mut Option<Box<dyn Saga>>,
    expected: &mut Option<Box<dyn Saga>>,
    name: &str,
    step: usize,
) -> Option<String> {
    let Some(want) = channel_pattern(advance(expected, Output::null())) else {
        return fail(step, format!("expected {name} did not request an action channel"));
    };
    let Some(got) = channel_pattern(advance(actual, Output::null())) else {
        return fail(step, format!("actual {name} did not request an action channel"));
    };
    if want != got {
        return mismatch(
            step,
            format!("expected {name} to watch pattern {want}"),
            want.to_string(),
            got.to_string(),
        );
    }

    // the channel take itself is not compared
    advance(expected, Output::Channel(Channel::detached()));
    advance(actual, Output::Channel(Channel::detached()));

    let want_fork = advance(expected, Output::null());
    let got_fork = advance(actual, Output::null());
    if let Some(message) = compare_forks(want_fork, got_fork, name, step) {
        return Some(message);
    }

    let Some(want) = delay_ms(advance(expected, Output::null())) else {
        return fail(step, format!("expected {name} did not call delay"));
    };
    let Some(got) = delay_ms(advance(actual, Output::null())) else {
        return fail(step, format!("actual {name} did not call delay"));
    };
    if want != got {
        return mismatch(
            step,
            format!("expected {name} to be delayed by {want} ms"),
            want.to_string(),
            got.to_string(),
        );
    }
    None
}

fn delay_ms(effect: Option<Effect>) -> Option<Value> {
    match effect? {
        Effect::Call(call) => Some(call.args.first().cloned().unwrap_or(Value::Null)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{Func, effects, saga};

    fn worker(name: &str) -> Func {
        Func::value(name, |_| Value::Null)
    }

    #[test]
    fn identical_helpers_match() {
        let w = worker("worker");
        let every = effects::take_every("FOO", &w, [json!(1)]);
        assert_eq!(compare_helpers(&every, &every.clone(), "takeEvery", 1), None);

        let throttle = effects::throttle(100, "FOO", &w, []);
        assert_eq!(compare_helpers(&throttle, &throttle.clone(), "throttle", 1), None);

        let debounce = effects::debounce(50, "FOO", &w, []);
        assert_eq!(compare_helpers(&debounce, &debounce.clone(), "debounce", 1), None);
    }

    #[test]
    fn different_worker_is_named() {
        let actual = effects::take_every("FOO", &worker("worker1"), []);
        let expected = effects::take_every("FOO", &worker("worker2"), []);
        let message = compare_helpers(&actual, &expected, "takeEvery", 1).unwrap_or_default();
        assert!(message.starts_with("Assertion 1 failed: expected takeEvery to fork worker2"));
    }

    #[test]
    fn different_pattern_and_kind() {
        let w = worker("worker");
        let message = compare_helpers(
            &effects::take_every("BAR", &w, []),
            &effects::take_every("FOO", &w, []),
            "takeEvery",
            2,
        )
        .unwrap_or_default();
        assert!(message.contains("expected takeEvery to watch pattern \"FOO\""));

        let message = compare_helpers(
            &effects::take_latest("FOO", &w, []),
            &effects::take_every("FOO", &w, []),
            "takeEvery",
            2,
        )
        .unwrap_or_default();
        assert!(message.contains("expected a takeEvery helper effect, but the saga used a takeLatest helper effect"));
    }

    #[test]
    fn throttle_delay_mismatch() {
        let w = worker("worker");
        let message = compare_helpers(
            &effects::throttle(200, "FOO", &w, []),
            &effects::throttle(100, "FOO", &w, []),
            "throttle",
            1,
        )
        .unwrap_or_default();
        assert!(message.contains("expected throttle to be delayed by 100 ms"));
    }

    #[test]
    fn delegated_routine_matches_helper() {
        let w = worker("worker");
        let inner = w.clone();
        let watcher = Func::saga("watcher", move |_| {
            let w = inner.clone();
            saga(move |co| async move {
                loop {
                    let action = co.take("FOO").await?;
                    co.fork(&w, [action]).await?;
                }
            })
        });

        let expected = effects::take_every("FOO", &w, []);
        let actual = effects::fork(&watcher, []);
        assert!(involves_helper(&actual, &expected));
        assert_eq!(compare_helpers(&actual, &expected, "takeEvery", 1), None);
    }
}
