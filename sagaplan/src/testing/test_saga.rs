use serde_json::Value;

use crate::{
    Effect, Error, Func, Output, Pattern, Result, Saga, SagaError, Selector, Step, effects,
    runtime::{Buffer, Channel, Task},
};

use super::{
    report::{assertion_failed, pretty},
    validate::compare_effects,
};

type Factory = Box<dyn Fn() -> Box<dyn Saga>>;

/// Step-by-step assertions over the effects a saga yields.
///
/// Nothing runs: each `next*` call resumes the saga by hand with the value
/// the test supplies, and each assertion checks the effect it yielded.
///
/// # Example
///
/// ```ignore
/// let mut test = test_saga(|| load_user(json!(1)));
///
/// test.next()
///     .call(&fetch_user, [json!(1)])?
///     .next_with(json!({"id": 1}))
///     .put(json!({"type": "USER_LOADED", "user": {"id": 1}}))?
///     .next()
///     .is_done()?;
///
/// // Back to the start, this time failing the fetch
/// test.restart()
///     .next()
///     .call(&fetch_user, [json!(1)])?
///     .throw("offline")
///     .put(json!({"type": "USER_FAILED"}))?;
/// ```
pub struct TestSaga {
    factory: Factory,
    saga: Box<dyn Saga>,
    step: usize,
    last: Option<std::result::Result<Step, SagaError>>,
}

/// Starts a [`TestSaga`] over the saga built by `factory`.
///
/// The factory runs again on [`TestSaga::restart`].
pub fn test_saga<F, S>(factory: F) -> TestSaga
where
    F: Fn() -> S + 'static,
    S: Saga + 'static,
{
    let factory: Factory = Box::new(move || Box::new(factory()));
    let saga = factory();
    TestSaga {
        factory,
        saga,
        step: 0,
        last: None,
    }
}

impl TestSaga {
    /// Resume with no value.
    pub fn next(&mut self) -> &mut Self {
        self.resume(Ok(Output::null()))
    }

    /// Resume with the result of the previous effect.
    pub fn next_with(&mut self, output: impl Into<Output>) -> &mut Self {
        self.resume(Ok(output.into()))
    }

    /// Throw `error` into the saga at its current effect.
    pub fn throw(&mut self, error: impl Into<SagaError>) -> &mut Self {
        self.resume(Err(error.into()))
    }

    /// Rebuild the saga and start over.
    pub fn restart(&mut self) -> &mut Self {
        self.saga = (self.factory)();
        self.step = 0;
        self.last = None;
        self
    }

    fn resume(&mut self, input: std::result::Result<Output, SagaError>) -> &mut Self {
        self.step += 1;
        let result = self.saga.resume(input);
        tracing::trace!(step = self.step, result = ?result, "saga resumed");
        self.last = Some(result);
        self
    }

    /// The effect yielded by the last resume, if any.
    pub fn yielded(&self) -> Option<&Effect> {
        match &self.last {
            Some(Ok(Step::Yield(effect))) => Some(effect),
            _ => None,
        }
    }

    fn outcome(&self) -> String {
        match &self.last {
            None => "was never resumed".into(),
            Some(Ok(Step::Yield(effect))) => format!("yielded {effect}"),
            Some(Ok(Step::Done(value))) => format!("returned {value}"),
            Some(Err(error)) => format!("threw {error}"),
        }
    }

    fn verdict(&mut self, failure: Option<String>) -> Result<&mut Self> {
        match failure {
            None => Ok(self),
            Some(message) => Err(Error::expectation(message)),
        }
    }

    /// Assert the last yielded effect equals `expected`.
    pub fn effect(&mut self, expected: Effect) -> Result<&mut Self> {
        let name = expected.tag().as_str().to_lowercase();
        self.assert_effect(&name, expected)
    }

    fn assert_effect(&mut self, effect_name: &str, expected: Effect) -> Result<&mut Self> {
        let failure = compare_effects(self.yielded(), &expected, effect_name, self.step);
        self.verdict(failure)
    }

    pub fn take(&mut self, pattern: impl Into<Pattern>) -> Result<&mut Self> {
        self.assert_effect("take", effects::take(pattern))
    }

    pub fn take_maybe(&mut self, pattern: impl Into<Pattern>) -> Result<&mut Self> {
        self.assert_effect("take", effects::take_maybe(pattern))
    }

    pub fn take_from(&mut self, channel: &Channel) -> Result<&mut Self> {
        self.assert_effect("take", effects::take_channel(channel))
    }

    pub fn put(&mut self, action: Value) -> Result<&mut Self> {
        self.assert_effect("put", effects::put(action))
    }

    pub fn put_resolve(&mut self, action: Value) -> Result<&mut Self> {
        self.assert_effect("put", effects::put_resolve(action))
    }

    pub fn call(&mut self, func: &Func, args: impl IntoIterator<Item = Value>) -> Result<&mut Self> {
        self.assert_effect("call", effects::call(func, args))
    }

    pub fn apply(
        &mut self,
        context: Value,
        func: &Func,
        args: impl IntoIterator<Item = Value>,
    ) -> Result<&mut Self> {
        self.assert_effect("apply", effects::apply(context, func, args))
    }

    pub fn cps(&mut self, func: &Func, args: impl IntoIterator<Item = Value>) -> Result<&mut Self> {
        self.assert_effect("cps", effects::cps(func, args))
    }

    pub fn fork(&mut self, func: &Func, args: impl IntoIterator<Item = Value>) -> Result<&mut Self> {
        self.assert_effect("fork", effects::fork(func, args))
    }

    pub fn spawn(&mut self, func: &Func, args: impl IntoIterator<Item = Value>) -> Result<&mut Self> {
        self.assert_effect("spawn", effects::spawn(func, args))
    }

    pub fn select(
        &mut self,
        selector: &Selector,
        args: impl IntoIterator<Item = Value>,
    ) -> Result<&mut Self> {
        self.assert_effect("select", effects::select(selector, args))
    }

    pub fn select_state(&mut self) -> Result<&mut Self> {
        self.assert_effect("select", effects::select_state())
    }

    pub fn race<K: Into<String>>(
        &mut self,
        branches: impl IntoIterator<Item = (K, Effect)>,
    ) -> Result<&mut Self> {
        self.assert_effect("race", effects::race(branches))
    }

    pub fn all(&mut self, members: impl IntoIterator<Item = Effect>) -> Result<&mut Self> {
        self.assert_effect("all", effects::all(members))
    }

    pub fn action_channel(&mut self, pattern: impl Into<Pattern>) -> Result<&mut Self> {
        self.assert_effect("actionChannel", effects::action_channel(pattern))
    }

    pub fn action_channel_with(
        &mut self,
        pattern: impl Into<Pattern>,
        buffer: Buffer,
    ) -> Result<&mut Self> {
        self.assert_effect("actionChannel", effects::action_channel_with(pattern, buffer))
    }

    pub fn cancel(&mut self, task: &Task) -> Result<&mut Self> {
        self.assert_effect("cancel", effects::cancel(task))
    }

    pub fn cancel_self(&mut self) -> Result<&mut Self> {
        self.assert_effect("cancel", effects::cancel_self())
    }

    pub fn cancelled(&mut self) -> Result<&mut Self> {
        self.assert_effect("cancelled", effects::cancelled())
    }

    pub fn join(&mut self, task: &Task) -> Result<&mut Self> {
        self.assert_effect("join", effects::join(task))
    }

    pub fn flush(&mut self, channel: &Channel) -> Result<&mut Self> {
        self.assert_effect("flush", effects::flush(channel))
    }

    pub fn take_every(
        &mut self,
        pattern: impl Into<Pattern>,
        worker: &Func,
        args: impl IntoIterator<Item = Value>,
    ) -> Result<&mut Self> {
        self.assert_effect("takeEvery", effects::take_every(pattern, worker, args))
    }

    pub fn take_latest(
        &mut self,
        pattern: impl Into<Pattern>,
        worker: &Func,
        args: impl IntoIterator<Item = Value>,
    ) -> Result<&mut Self> {
        self.assert_effect("takeLatest", effects::take_latest(pattern, worker, args))
    }

    pub fn throttle(
        &mut self,
        ms: u64,
        pattern: impl Into<Pattern>,
        worker: &Func,
        args: impl IntoIterator<Item = Value>,
    ) -> Result<&mut Self> {
        self.assert_effect("throttle", effects::throttle(ms, pattern, worker, args))
    }

    pub fn debounce(
        &mut self,
        ms: u64,
        pattern: impl Into<Pattern>,
        worker: &Func,
        args: impl IntoIterator<Item = Value>,
    ) -> Result<&mut Self> {
        self.assert_effect("debounce", effects::debounce(ms, pattern, worker, args))
    }

    /// Assert the saga finished with `value`.
    pub fn returns(&mut self, value: Value) -> Result<&mut Self> {
        let failure = match &self.last {
            Some(Ok(Step::Done(actual))) if *actual == value => None,
            Some(Ok(Step::Done(actual))) => Some(assertion_failed(
                self.step,
                "saga returned a different value",
                Some(pretty(&value)),
                Some(pretty(actual)),
            )),
            _ => Some(assertion_failed(
                self.step,
                &format!("expected saga to return, but it {}", self.outcome()),
                Some(pretty(&value)),
                None,
            )),
        };
        self.verdict(failure)
    }

    /// Assert the saga finished, whatever it returned.
    pub fn is_done(&mut self) -> Result<&mut Self> {
        let failure = match &self.last {
            Some(Ok(Step::Done(_))) => None,
            _ => Some(assertion_failed(
                self.step,
                &format!("expected saga to be done, but it {}", self.outcome()),
                None,
                None,
            )),
        };
        self.verdict(failure)
    }

    /// Assert the saga threw `error` out of its body.
    pub fn throws(&mut self, error: impl Into<SagaError>) -> Result<&mut Self> {
        let error = error.into();
        let failure = match &self.last {
            Some(Err(actual)) if *actual == error => None,
            Some(Err(actual)) => Some(assertion_failed(
                self.step,
                "saga threw a different error",
                Some(error.to_string()),
                Some(actual.to_string()),
            )),
            _ => Some(assertion_failed(
                self.step,
                &format!("expected saga to throw, but it {}", self.outcome()),
                Some(error.to_string()),
                None,
            )),
        };
        self.verdict(failure)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::saga;

    fn load_user(fetch: Func) -> impl Saga {
        saga(move |co| async move {
            match co.call(&fetch, [json!(1)]).await {
                Ok(user) => co.put(json!({"type": "USER_LOADED", "user": user})).await?,
                Err(_) => co.put(json!({"type": "USER_FAILED"})).await?,
            };
            Ok(json!("loaded"))
        })
    }

    fn fetch() -> Func {
        Func::value("fetchUser", |args| json!({"id": args[0]}))
    }

    #[test]
    fn happy_path_round_trip() -> Result {
        let fetch = fetch();
        let inner = fetch.clone();
        let mut test = test_saga(move || load_user(inner.clone()));

        test.next()
            .call(&fetch, [json!(1)])?
            .next_with(json!({"id": 1}))
            .put(json!({"type": "USER_LOADED", "user": {"id": 1}}))?
            .next()
            .returns(json!("loaded"))?
            .is_done()?;
        Ok(())
    }

    #[test]
    fn wrong_arguments_fail_with_field_diff() {
        let fetch = fetch();
        let inner = fetch.clone();
        let mut test = test_saga(move || load_user(inner.clone()));

        let error = test.next().call(&fetch, [json!(2)]).err();
        let message = error.and_then(|e| e.message().map(str::to_string)).unwrap_or_default();
        assert!(message.starts_with("Assertion 1 failed: call effects do not match"));
        assert!(message.contains("args: expected [2], actual [1]"));
    }

    #[test]
    fn throw_and_restart() -> Result {
        let fetch = fetch();
        let inner = fetch.clone();
        let mut test = test_saga(move || load_user(inner.clone()));

        test.next()
            .call(&fetch, [json!(1)])?
            .throw("offline")
            .put(json!({"type": "USER_FAILED"}))?;

        test.restart().next().call(&fetch, [json!(1)])?;
        Ok(())
    }

    #[test]
    fn uncaught_error_is_thrown_out() -> Result {
        let mut test = test_saga(|| {
            saga(|co| async move {
                co.take("GO").await?;
                Err(SagaError::new("boom"))
            })
        });
        test.next().take("GO")?.next().throws("boom")?;
        assert!(test.is_done().is_err());
        Ok(())
    }

    #[test]
    fn take_every_helper_assertion() -> Result {
        let worker = Func::value("worker", |_| Value::Null);
        let other = Func::value("other", |_| Value::Null);
        let w = worker.clone();
        let mut test = test_saga(move || {
            let w = w.clone();
            saga(move |co| async move {
                co.take_every("FOO", &w, []).await?;
                Ok(Value::Null)
            })
        });

        test.next().take_every("FOO", &worker, [])?;
        let message = test
            .take_every("FOO", &other, [])
            .err()
            .and_then(|e| e.message().map(str::to_string))
            .unwrap_or_default();
        assert!(message.contains("expected takeEvery to fork other"));
        Ok(())
    }
}
