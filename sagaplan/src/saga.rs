use std::{
    cell::RefCell,
    future::Future,
    pin::Pin,
    rc::Rc,
    task::{Context, Poll},
};

use futures_util::{FutureExt, future::LocalBoxFuture, task::noop_waker};
use serde_json::Value;

use crate::{
    Effect, Func, Output, Pattern, SagaError, Selector, effects,
    runtime::{Channel, Task},
};

/// One step of a saga.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// The saga requests an effect and suspends until it resolves.
    Yield(Effect),
    /// The saga returned.
    Done(Value),
}

/// A resumable routine that yields effects.
///
/// The first `resume` starts the routine; its input is ignored. Each later
/// call resolves the previously yielded effect: `Ok` resumes with the
/// result, `Err` throws at the yield point. An `Err` return means the
/// routine threw.
///
/// Most sagas are written with [`saga`] rather than by implementing this
/// trait directly.
pub trait Saga {
    fn resume(&mut self, input: Result<Output, SagaError>) -> Result<Step, SagaError>;

    /// Name used in logs and failure reports.
    fn name(&self) -> &str {
        "anonymous"
    }
}

impl<S: Saga + ?Sized> Saga for Box<S> {
    fn resume(&mut self, input: Result<Output, SagaError>) -> Result<Step, SagaError> {
        (**self).resume(input)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

#[derive(Default)]
struct Slot {
    yielded: Option<Effect>,
    input: Option<Result<Output, SagaError>>,
}

/// The yield handle passed to a [`saga`] body.
///
/// Every method yields one effect and resolves with its result once the
/// runtime (or a test driver) resumes the saga.
#[derive(Clone)]
pub struct Co {
    slot: Rc<RefCell<Slot>>,
}

struct YieldFuture {
    slot: Rc<RefCell<Slot>>,
    effect: Option<Effect>,
}

impl Future for YieldFuture {
    type Output = Result<Output, SagaError>;

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(effect) = self.effect.take() {
            self.slot.borrow_mut().yielded = Some(effect);
            return Poll::Pending;
        }
        match self.slot.borrow_mut().input.take() {
            Some(input) => Poll::Ready(input),
            None => Poll::Pending,
        }
    }
}

fn expect_value(effect: &'static str, output: Output) -> Result<Value, SagaError> {
    match output {
        Output::Value(value) => Ok(value),
        other => Err(SagaError::UnexpectedOutput {
            effect,
            expected: "a value",
            got: format!("{other:?}"),
        }),
    }
}

impl Co {
    /// Yield any effect and resume with its raw output.
    pub fn effect(&self, effect: Effect) -> impl Future<Output = Result<Output, SagaError>> + use<> {
        YieldFuture {
            slot: self.slot.clone(),
            effect: Some(effect),
        }
    }

    async fn value(&self, name: &'static str, effect: Effect) -> Result<Value, SagaError> {
        expect_value(name, self.effect(effect).await?)
    }

    pub async fn take(&self, pattern: impl Into<Pattern>) -> Result<Value, SagaError> {
        self.value("take", effects::take(pattern)).await
    }

    pub async fn take_maybe(&self, pattern: impl Into<Pattern>) -> Result<Value, SagaError> {
        self.value("take", effects::take_maybe(pattern)).await
    }

    pub async fn take_from(&self, channel: &Channel) -> Result<Value, SagaError> {
        self.value("take", effects::take_channel(channel)).await
    }

    pub async fn put(&self, action: Value) -> Result<Value, SagaError> {
        self.value("put", effects::put(action)).await
    }

    pub async fn put_resolve(&self, action: Value) -> Result<Value, SagaError> {
        self.value("put", effects::put_resolve(action)).await
    }

    pub async fn call(
        &self,
        func: &Func,
        args: impl IntoIterator<Item = Value>,
    ) -> Result<Value, SagaError> {
        self.value("call", effects::call(func, args)).await
    }

    pub async fn apply(
        &self,
        context: Value,
        func: &Func,
        args: impl IntoIterator<Item = Value>,
    ) -> Result<Value, SagaError> {
        self.value("call", effects::apply(context, func, args)).await
    }

    pub async fn cps(
        &self,
        func: &Func,
        args: impl IntoIterator<Item = Value>,
    ) -> Result<Value, SagaError> {
        self.value("cps", effects::cps(func, args)).await
    }

    async fn task(&self, effect: Effect) -> Result<Task, SagaError> {
        match self.effect(effect).await? {
            Output::Task(task) => Ok(task),
            other => Err(SagaError::UnexpectedOutput {
                effect: "fork",
                expected: "a task",
                got: format!("{other:?}"),
            }),
        }
    }

    /// Fork `func` and resume with its task. A provider may substitute a
    /// plain value, so the raw output is also reachable through
    /// [`Co::effect`].
    pub async fn fork(
        &self,
        func: &Func,
        args: impl IntoIterator<Item = Value>,
    ) -> Result<Task, SagaError> {
        self.task(effects::fork(func, args)).await
    }

    pub async fn spawn(
        &self,
        func: &Func,
        args: impl IntoIterator<Item = Value>,
    ) -> Result<Task, SagaError> {
        self.task(effects::spawn(func, args)).await
    }

    pub async fn select(
        &self,
        selector: &Selector,
        args: impl IntoIterator<Item = Value>,
    ) -> Result<Value, SagaError> {
        self.value("select", effects::select(selector, args)).await
    }

    /// Select the whole state.
    pub async fn state(&self) -> Result<Value, SagaError> {
        self.value("select", effects::select_state()).await
    }

    /// Race keyed effects. Resolves with the winning key and its output.
    pub async fn race<K: Into<String>>(
        &self,
        branches: impl IntoIterator<Item = (K, Effect)>,
    ) -> Result<(String, Output), SagaError> {
        match self.effect(effects::race(branches)).await? {
            Output::Race { winner, value } => Ok((winner, *value)),
            other => Err(SagaError::UnexpectedOutput {
                effect: "race",
                expected: "a race result",
                got: format!("{other:?}"),
            }),
        }
    }

    pub async fn all(
        &self,
        members: impl IntoIterator<Item = Effect>,
    ) -> Result<Vec<Output>, SagaError> {
        match self.effect(effects::all(members)).await? {
            Output::List(outputs) => Ok(outputs),
            other => Err(SagaError::UnexpectedOutput {
                effect: "all",
                expected: "a list",
                got: format!("{other:?}"),
            }),
        }
    }

    pub async fn action_channel(&self, pattern: impl Into<Pattern>) -> Result<Channel, SagaError> {
        match self.effect(effects::action_channel(pattern)).await? {
            Output::Channel(channel) => Ok(channel),
            other => Err(SagaError::UnexpectedOutput {
                effect: "actionChannel",
                expected: "a channel",
                got: format!("{other:?}"),
            }),
        }
    }

    pub async fn cancel(&self, task: &Task) -> Result<(), SagaError> {
        self.effect(effects::cancel(task)).await.map(drop)
    }

    pub async fn cancelled(&self) -> Result<bool, SagaError> {
        Ok(self
            .value("cancelled", effects::cancelled())
            .await?
            .as_bool()
            .unwrap_or(false))
    }

    pub async fn join(&self, task: &Task) -> Result<Value, SagaError> {
        self.value("join", effects::join(task)).await
    }

    pub async fn flush(&self, channel: &Channel) -> Result<Vec<Value>, SagaError> {
        match self.value("flush", effects::flush(channel)).await? {
            Value::Array(items) => Ok(items),
            other => Ok(vec![other]),
        }
    }

    pub async fn delay(&self, ms: u64) -> Result<(), SagaError> {
        self.effect(effects::delay(ms)).await.map(drop)
    }

    pub async fn take_every(
        &self,
        pattern: impl Into<Pattern>,
        worker: &Func,
        args: impl IntoIterator<Item = Value>,
    ) -> Result<Output, SagaError> {
        self.effect(effects::take_every(pattern, worker, args)).await
    }

    pub async fn take_latest(
        &self,
        pattern: impl Into<Pattern>,
        worker: &Func,
        args: impl IntoIterator<Item = Value>,
    ) -> Result<Output, SagaError> {
        self.effect(effects::take_latest(pattern, worker, args)).await
    }

    pub async fn throttle(
        &self,
        ms: u64,
        pattern: impl Into<Pattern>,
        worker: &Func,
        args: impl IntoIterator<Item = Value>,
    ) -> Result<Output, SagaError> {
        self.effect(effects::throttle(ms, pattern, worker, args)).await
    }

    pub async fn debounce(
        &self,
        ms: u64,
        pattern: impl Into<Pattern>,
        worker: &Func,
        args: impl IntoIterator<Item = Value>,
    ) -> Result<Output, SagaError> {
        self.effect(effects::debounce(ms, pattern, worker, args)).await
    }
}

/// A saga written as an async body. Built by [`saga`].
///
/// The body is polled by hand: it may only await [`Co`] effects, never
/// runtime futures directly. Asynchronous work goes through `call`.
pub struct AsyncSaga {
    name: String,
    slot: Rc<RefCell<Slot>>,
    body: Option<LocalBoxFuture<'static, Result<Value, SagaError>>>,
    started: bool,
}

/// Build a saga from an async body.
///
/// ```rust
/// use sagaplan::{Step, Saga, saga};
/// use serde_json::json;
///
/// let mut greet = saga(|co| async move {
///     let action = co.take("HELLO").await?;
///     co.put(json!({"type": "GREETED", "to": action["name"]})).await?;
///     Ok(json!("done"))
/// });
///
/// let Ok(Step::Yield(take)) = greet.resume(Ok(json!(null).into())) else { panic!() };
/// assert_eq!(take.to_string(), "take(\"HELLO\")");
/// ```
pub fn saga<F, Fut>(body: F) -> AsyncSaga
where
    F: FnOnce(Co) -> Fut,
    Fut: Future<Output = Result<Value, SagaError>> + 'static,
{
    let slot = Rc::new(RefCell::new(Slot::default()));
    let co = Co { slot: slot.clone() };
    AsyncSaga {
        name: "anonymous".into(),
        slot,
        body: Some(body(co).boxed_local()),
        started: false,
    }
}

impl AsyncSaga {
    pub fn named(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }
}

impl Saga for AsyncSaga {
    fn resume(&mut self, input: Result<Output, SagaError>) -> Result<Step, SagaError> {
        let Some(body) = self.body.as_mut() else {
            return Ok(Step::Done(Value::Null));
        };

        if self.started {
            self.slot.borrow_mut().input = Some(input);
        }
        self.started = true;

        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        match body.as_mut().poll(&mut cx) {
            Poll::Ready(result) => {
                self.body = None;
                result.map(Step::Done)
            }
            Poll::Pending => match self.slot.borrow_mut().yielded.take() {
                Some(effect) => Ok(Step::Yield(effect)),
                None => {
                    self.body = None;
                    Err(SagaError::new(format!(
                        "saga '{}' awaited something other than an effect",
                        self.name
                    )))
                }
            },
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn step(saga: &mut impl Saga, input: Result<Output, SagaError>) -> Step {
        saga.resume(input).unwrap()
    }

    #[test]
    fn yields_effects_in_order_and_returns() {
        let mut s = saga(|co| async move {
            let action = co.take("FOO").await?;
            co.put(json!({"type": "BAR", "payload": action["payload"]})).await?;
            Ok(json!(42))
        });

        assert_eq!(step(&mut s, Ok(Output::null())), Step::Yield(effects::take("FOO")));
        assert_eq!(
            step(&mut s, Ok(json!({"type": "FOO", "payload": 1}).into())),
            Step::Yield(effects::put(json!({"type": "BAR", "payload": 1})))
        );
        assert_eq!(step(&mut s, Ok(Output::null())), Step::Done(json!(42)));
        assert_eq!(step(&mut s, Ok(Output::null())), Step::Done(Value::Null));
    }

    #[test]
    fn thrown_errors_can_be_caught() {
        let fetch = Func::value("fetch", |_| Value::Null);
        let mut s = saga(move |co| async move {
            match co.call(&fetch, []).await {
                Ok(_) => co.put(json!({"type": "OK"})).await?,
                Err(e) => co.put(json!({"type": "FAILED", "error": e.to_string()})).await?,
            };
            Ok(Value::Null)
        });

        step(&mut s, Ok(Output::null()));
        assert_eq!(
            step(&mut s, Err(SagaError::new("boom"))),
            Step::Yield(effects::put(json!({"type": "FAILED", "error": "boom"})))
        );
    }

    #[test]
    fn uncaught_errors_propagate() {
        let mut s = saga(|co| async move {
            co.take("FOO").await?;
            Ok(Value::Null)
        })
        .named("watcher");

        step(&mut s, Ok(Output::null()));
        assert_eq!(
            s.resume(Err(SagaError::new("boom"))).unwrap_err(),
            SagaError::new("boom")
        );
        assert_eq!(s.name(), "watcher");
    }

    #[test]
    fn unexpected_output_is_reported() {
        let mut s = saga(|co| async move {
            co.race([("a", effects::take("A"))]).await?;
            Ok(Value::Null)
        });

        step(&mut s, Ok(Output::null()));
        assert!(matches!(
            s.resume(Ok(Output::null())),
            Err(SagaError::UnexpectedOutput { effect: "race", .. })
        ));
    }
}
