use std::{rc::Rc, time::Duration};

use serde_json::{Value, json};
use tokio::task::LocalSet;

use crate::{
    Effect, EffectTag, Error, Func, Pattern, Result, RunConfig, Saga, SagaError, Selector, Store,
    effects,
    monitoring::SagaMonitor,
    runtime::{Buffer, RuntimeIo, Task, TaskOutcome, run_saga},
};

use super::{
    EffectMatcher, EffectStores, Like, Providers,
    expectation::{Expectation, Expected},
    harness::{Harness, HarnessSetup, INIT_ACTION_TYPE, QueuedAction, Reducer},
    interceptor::TracedSaga,
    report,
};

/// Declarative assertions over a whole saga run.
///
/// Register the effects you expect, optionally a reducer, providers and
/// actions to dispatch, then [`run`](ExpectSaga::run). The saga runs against
/// a simulated store until it and everything it forked has settled, or the
/// timeout cancels it. Expectations are checked afterwards, in no particular
/// order: each one consumes one matching effect of its kind.
///
/// # Example
///
/// ```ignore
/// expect_saga(load_user(json!(1)))
///     .provide(Providers::call_fn(&fetch_user, json!({"id": 1})))
///     .with_reducer(users_reducer, None)
///     .put(json!({"type": "USER_LOADED", "user": {"id": 1}}))
///     .not()
///     .put_action_type("USER_FAILED")
///     .has_final_state(json!({"users": [{"id": 1}]}))
///     .run()
///     .await?;
/// ```
///
/// # Timeouts
///
/// Watchers never finish on their own. A run gives up after
/// [`RunConfig::DEFAULT_TIMEOUT`], cancels the main task and logs a warning
/// (see [`RunConfig::silence_timeout`]); expectations are still checked.
pub struct ExpectSaga {
    saga: Box<dyn Saga>,
    checks: Checks,
    negate: bool,
    state: Value,
    reducer: Option<Reducer>,
    providers: Vec<Providers>,
    queued: Vec<QueuedAction>,
    next_delay: Option<Duration>,
    monitors: Vec<Rc<dyn SagaMonitor>>,
}

/// Starts an [`ExpectSaga`] run plan for `saga`.
pub fn expect_saga(saga: impl Saga + 'static) -> ExpectSaga {
    ExpectSaga {
        saga: Box::new(saga),
        checks: Checks::default(),
        negate: false,
        state: Value::Null,
        reducer: None,
        providers: Vec::new(),
        queued: Vec::new(),
        next_delay: None,
        monitors: Vec::new(),
    }
}

impl ExpectSaga {
    /// Negates the next assertion.
    pub fn not(mut self) -> Self {
        self.negate = true;
        self
    }

    fn polarity(&mut self) -> bool {
        !std::mem::take(&mut self.negate)
    }

    fn expect(mut self, effect_name: &str, tag: EffectTag, expected: Expected) -> Self {
        let expect_to_have = self.polarity();
        self.checks.expectations.push(Expectation {
            effect_name: effect_name.to_string(),
            tag,
            expected,
            expect_to_have,
        });
        self
    }

    fn exact(self, effect_name: &str, effect: Effect) -> Self {
        let tag = effect.tag();
        self.expect(effect_name, tag, Expected::Exact(effect))
    }

    fn matching(self, effect_name: &str, tag: EffectTag, matcher: impl Into<EffectMatcher>) -> Self {
        self.expect(effect_name, tag, Expected::Like(matcher.into()))
    }

    /// Expect exactly `effect`, whatever its kind.
    ///
    /// Cancel, cancelled, join, flush and parallel effects are not recorded,
    /// so expecting one always fails. Step through those with
    /// [`test_saga`](super::test_saga).
    pub fn effect(self, effect: Effect) -> Self {
        let name = effect.tag().as_str().to_lowercase();
        self.exact(&name, effect)
    }

    /// Expect an effect of kind `tag` accepted by `matcher`.
    pub fn like(self, tag: EffectTag, matcher: impl Into<EffectMatcher>) -> Self {
        let name = tag.as_str().to_lowercase();
        self.matching(&name, tag, matcher)
    }

    pub fn take(self, pattern: impl Into<Pattern>) -> Self {
        self.exact("take", effects::take(pattern))
    }

    pub fn take_maybe(self, pattern: impl Into<Pattern>) -> Self {
        self.exact("take", effects::take_maybe(pattern))
    }

    pub fn put(self, action: Value) -> Self {
        self.exact("put", effects::put(action))
    }

    pub fn put_resolve(self, action: Value) -> Self {
        self.exact("put", effects::put_resolve(action))
    }

    /// Expect a put whose action contains `like`'s action.
    pub fn put_like(self, like: Like) -> Self {
        self.matching("put", EffectTag::Put, like)
    }

    pub fn put_action_type(self, action_type: &str) -> Self {
        self.put_like(Like::action(json!({ "type": action_type })))
    }

    pub fn call(self, func: &Func, args: impl IntoIterator<Item = Value>) -> Self {
        self.exact("call", effects::call(func, args))
    }

    /// Expect a call of `func`, with any arguments.
    pub fn call_fn(self, func: &Func) -> Self {
        self.call_like(Like::func(func))
    }

    pub fn call_like(self, like: Like) -> Self {
        self.matching("call", EffectTag::Call, like)
    }

    pub fn apply(self, context: Value, func: &Func, args: impl IntoIterator<Item = Value>) -> Self {
        self.exact("apply", effects::apply(context, func, args))
    }

    pub fn cps(self, func: &Func, args: impl IntoIterator<Item = Value>) -> Self {
        self.exact("cps", effects::cps(func, args))
    }

    pub fn cps_fn(self, func: &Func) -> Self {
        self.cps_like(Like::func(func))
    }

    pub fn cps_like(self, like: Like) -> Self {
        self.matching("cps", EffectTag::Cps, like)
    }

    pub fn fork(self, func: &Func, args: impl IntoIterator<Item = Value>) -> Self {
        self.exact("fork", effects::fork(func, args))
    }

    pub fn fork_fn(self, func: &Func) -> Self {
        self.fork_like(Like::func(func))
    }

    pub fn fork_like(self, like: Like) -> Self {
        self.matching("fork", EffectTag::Fork, like.detached(false))
    }

    pub fn spawn(self, func: &Func, args: impl IntoIterator<Item = Value>) -> Self {
        self.exact("spawn", effects::spawn(func, args))
    }

    pub fn spawn_fn(self, func: &Func) -> Self {
        self.spawn_like(Like::func(func))
    }

    pub fn spawn_like(self, like: Like) -> Self {
        self.matching("spawn", EffectTag::Fork, like.detached(true))
    }

    pub fn select(self, selector: &Selector, args: impl IntoIterator<Item = Value>) -> Self {
        self.exact("select", effects::select(selector, args))
    }

    pub fn select_state(self) -> Self {
        self.exact("select", effects::select_state())
    }

    /// Expect a select through `selector`, with any arguments.
    pub fn select_selector(self, selector: &Selector) -> Self {
        self.matching("select", EffectTag::Select, Like::selector(selector))
    }

    pub fn race<K: Into<String>>(self, branches: impl IntoIterator<Item = (K, Effect)>) -> Self {
        self.exact("race", effects::race(branches))
    }

    pub fn action_channel(self, pattern: impl Into<Pattern>) -> Self {
        self.exact("actionChannel", effects::action_channel(pattern))
    }

    pub fn action_channel_with(self, pattern: impl Into<Pattern>, buffer: Buffer) -> Self {
        self.exact("actionChannel", effects::action_channel_with(pattern, buffer))
    }

    /// Expect an action channel on `pattern`, with any buffer.
    pub fn action_channel_pattern(self, pattern: impl Into<Pattern>) -> Self {
        self.matching("actionChannel", EffectTag::ActionChannel, Like::pattern(pattern))
    }

    pub fn take_every(
        self,
        pattern: impl Into<Pattern>,
        worker: &Func,
        args: impl IntoIterator<Item = Value>,
    ) -> Self {
        self.exact("takeEvery", effects::take_every(pattern, worker, args))
    }

    pub fn take_latest(
        self,
        pattern: impl Into<Pattern>,
        worker: &Func,
        args: impl IntoIterator<Item = Value>,
    ) -> Self {
        self.exact("takeLatest", effects::take_latest(pattern, worker, args))
    }

    pub fn throttle(
        self,
        ms: u64,
        pattern: impl Into<Pattern>,
        worker: &Func,
        args: impl IntoIterator<Item = Value>,
    ) -> Self {
        self.exact("throttle", effects::throttle(ms, pattern, worker, args))
    }

    pub fn debounce(
        self,
        ms: u64,
        pattern: impl Into<Pattern>,
        worker: &Func,
        args: impl IntoIterator<Item = Value>,
    ) -> Self {
        self.exact("debounce", effects::debounce(ms, pattern, worker, args))
    }

    /// Expect the saga to return `value`.
    pub fn returns(mut self, value: Value) -> Self {
        let expect_to_have = self.polarity();
        self.checks.returns = Some((value, expect_to_have));
        self
    }

    /// Expect the saga to throw `error` out of its body.
    pub fn throws(mut self, error: impl Into<SagaError>) -> Self {
        let expect_to_have = self.polarity();
        self.checks.throws = Some((error.into(), expect_to_have));
        self
    }

    /// Expect the store to end up in `state`.
    pub fn has_final_state(mut self, state: Value) -> Self {
        let expect_to_have = self.polarity();
        self.checks.final_state = Some((state, expect_to_have));
        self
    }

    /// Start the store in `state`.
    pub fn with_state(mut self, state: Value) -> Self {
        self.state = state;
        self
    }

    /// Run every action through `reducer`.
    ///
    /// Without `initial`, the store starts in the state the reducer returns
    /// for `null` and an init action of type [`INIT_ACTION_TYPE`].
    pub fn with_reducer<F>(mut self, reducer: F, initial: Option<Value>) -> Self
    where
        F: Fn(&Value, &Value) -> Value + 'static,
    {
        self.state = match initial {
            Some(state) => state,
            None => reducer(&Value::Null, &json!({ "type": INIT_ACTION_TYPE })),
        };
        self.reducer = Some(Rc::new(reducer));
        self
    }

    /// Answer effects with `providers` before they run.
    pub fn provide(mut self, providers: Providers) -> Self {
        self.providers.push(providers);
        self
    }

    /// Like [`provide`](Self::provide) with several tables; the first answer wins.
    pub fn provide_all(mut self, providers: impl IntoIterator<Item = Providers>) -> Self {
        self.providers.extend(providers);
        self
    }

    /// Queue `action`. It is dispatched once the saga takes an action it
    /// matches, together with every action queued before it.
    pub fn dispatch(mut self, action: Value) -> Self {
        let delay = self.next_delay.take();
        self.queued.push(QueuedAction { action, delay });
        self
    }

    /// Delay the next dispatch by `ms`.
    pub fn delay(mut self, ms: u64) -> Self {
        self.next_delay = Some(Duration::from_millis(ms));
        self
    }

    /// Report the run's effects to `monitor` as well.
    pub fn with_monitor(mut self, monitor: impl SagaMonitor + 'static) -> Self {
        self.monitors.push(Rc::new(monitor));
        self
    }

    /// Run with the default 250 ms timeout.
    pub async fn run(self) -> Result<RunResult> {
        self.run_with(RunConfig::default()).await
    }

    /// Run with a custom timeout. Accepts a [`RunConfig`], a [`Duration`] or
    /// plain milliseconds.
    pub async fn run_with(self, config: impl Into<RunConfig>) -> Result<RunResult> {
        let config = config.into();
        LocalSet::new()
            .run_until(async move { self.start().stop(config).await })
            .await
    }

    /// Start the saga without waiting for it, to dispatch while it runs.
    ///
    /// Must be called within a [`LocalSet`].
    pub fn start(self) -> Running {
        let harness = Harness::new(HarnessSetup {
            state: self.state,
            reducer: self.reducer,
            providers: Providers::chain(self.providers),
            queued: self.queued,
        });

        let mut io = RuntimeIo::new(harness.clone()).with_monitor(harness.clone());
        for monitor in self.monitors {
            io = io.with_monitor(monitor);
        }
        let main = run_saga(TracedSaga::new(self.saga, harness.clone()), io);
        let done = main.clone();
        harness.wait_set.register(async move {
            done.done().await;
        });
        tracing::debug!(task = %main, name = %main.name(), "saga started");

        Running {
            harness,
            main,
            checks: self.checks,
            next_delay: self.next_delay,
        }
    }
}

/// A started [`ExpectSaga`].
pub struct Running {
    harness: Rc<Harness>,
    main: Task,
    checks: Checks,
    next_delay: Option<Duration>,
}

impl Running {
    /// Dispatch `action` now.
    pub fn dispatch(&mut self, action: Value) -> &mut Self {
        let delay = self.next_delay.take();
        self.harness.send(action, delay, true);
        self
    }

    /// Delay the next dispatch by `ms`.
    pub fn delay(&mut self, ms: u64) -> &mut Self {
        self.next_delay = Some(Duration::from_millis(ms));
        self
    }

    pub fn dispatch_delayed(&mut self, action: Value, ms: u64) -> &mut Self {
        self.delay(ms).dispatch(action)
    }

    pub fn main_task(&self) -> &Task {
        &self.main
    }

    /// Tasks forked so far, including helper workers.
    pub fn forked_tasks(&self) -> Vec<Task> {
        self.harness.forked_tasks()
    }

    /// Wait for the run to settle (or time out), then check expectations.
    pub async fn stop(self, config: impl Into<RunConfig>) -> Result<RunResult> {
        let config = config.into();
        let timed_out = match config.timeout() {
            Some(limit) => {
                let expired = tokio::time::timeout(limit, self.harness.wait_set.idle())
                    .await
                    .is_err();
                if expired && !config.is_timeout_silenced() {
                    tracing::warn!("Saga exceeded async timeout of {}ms", limit.as_millis());
                }
                expired
            }
            None => {
                self.harness.wait_set.idle().await;
                false
            }
        };

        if self.main.is_running() {
            self.main.cancel();
        }
        let (return_value, error) = match self.main.done().await {
            TaskOutcome::Done(value) => (Some(value), None),
            TaskOutcome::Failed(error) => (None, Some(error)),
            TaskOutcome::Cancelled => (None, None),
        };

        let result = RunResult {
            timed_out,
            return_value,
            error,
            store_state: self.harness.state(),
            effects: self.harness.stores(),
        };
        tracing::debug!(
            timed_out,
            error = ?result.error,
            "saga run finished"
        );

        let failures = self.checks.reconcile(&result);
        if failures.is_empty() {
            Ok(result)
        } else {
            Err(Error::expectation(failures.concat()))
        }
    }
}

/// What a finished run looked like.
#[derive(Debug, Clone)]
pub struct RunResult {
    /// The timeout cancelled the main task before it settled.
    pub timed_out: bool,
    /// Return value of the main saga, if it finished normally.
    pub return_value: Option<Value>,
    /// Error the main saga threw, if any.
    pub error: Option<SagaError>,
    pub store_state: Value,
    /// Every recorded effect, before expectations consumed any.
    pub effects: EffectStores,
}

#[derive(Default)]
struct Checks {
    expectations: Vec<Expectation>,
    returns: Option<(Value, bool)>,
    throws: Option<(SagaError, bool)>,
    final_state: Option<(Value, bool)>,
}

impl Checks {
    fn reconcile(&self, result: &RunResult) -> Vec<String> {
        let mut stores = result.effects.clone();
        let mut failures: Vec<String> = self
            .expectations
            .iter()
            .filter_map(|expectation| expectation.check(&mut stores))
            .collect();

        if let Some((expected, expect_to_have)) = &self.returns {
            let actual = result.return_value.as_ref();
            if (actual == Some(expected)) != *expect_to_have {
                failures.push(report::return_mismatch(expected, actual, *expect_to_have));
            }
        }
        if let Some((expected, expect_to_have)) = &self.throws {
            if (result.error.as_ref() == Some(expected)) != *expect_to_have {
                failures.push(report::throw_mismatch(
                    expected,
                    result.error.as_ref(),
                    *expect_to_have,
                ));
            }
        }
        if let Some((expected, expect_to_have)) = &self.final_state {
            if (result.store_state == *expected) != *expect_to_have {
                failures.push(report::state_mismatch(
                    expected,
                    &result.store_state,
                    *expect_to_have,
                ));
            }
        }
        failures
    }
}
