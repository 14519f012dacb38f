use std::{cell::RefCell, fmt, future::Future, rc::Rc};

use futures_util::{FutureExt, future::LocalBoxFuture};
use serde_json::Value;

use crate::{Output, Saga, SagaError};

/// An in-flight call result.
pub type CallFuture = LocalBoxFuture<'static, Result<Output, SagaError>>;

/// What invoking a [`Func`] produces.
pub enum CallReturn {
    /// A value available immediately.
    Value(Output),
    /// A future the runtime awaits.
    Future(CallFuture),
    /// A routine the runtime drives as a sub-task.
    Saga(Box<dyn Saga>),
}

impl fmt::Debug for CallReturn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallReturn::Value(output) => f.debug_tuple("Value").field(output).finish(),
            CallReturn::Future(_) => f.write_str("Future(..)"),
            CallReturn::Saga(saga) => f.debug_tuple("Saga").field(&saga.name()).finish(),
        }
    }
}

type Body = dyn Fn(Option<&Value>, &[Value]) -> Result<CallReturn, SagaError>;

/// A named function referenced by `call`, `fork` and helper effects.
///
/// Functions compare by identity: two `Func`s are equal only if one is a
/// clone of the other. Keep a single instance per function and clone it
/// into sagas and expectations.
///
/// ```rust
/// use sagaplan::Func;
/// use serde_json::json;
///
/// let add = Func::value("add", |args| json!(args[0].as_i64().unwrap_or(0) + 1));
/// assert_eq!(add, add.clone());
/// assert_ne!(add, Func::value("add", |_| json!(0)));
/// ```
#[derive(Clone)]
pub struct Func {
    name: Rc<str>,
    body: Rc<Body>,
}

impl Func {
    /// Create a function from a raw body.
    pub fn new<F>(name: &str, body: F) -> Self
    where
        F: Fn(&[Value]) -> Result<CallReturn, SagaError> + 'static,
    {
        Self::with_context(name, move |_context, args| body(args))
    }

    /// Create a function that also receives the `apply` context.
    pub fn with_context<F>(name: &str, body: F) -> Self
    where
        F: Fn(Option<&Value>, &[Value]) -> Result<CallReturn, SagaError> + 'static,
    {
        Self {
            name: Rc::from(name),
            body: Rc::new(body),
        }
    }

    /// A synchronous function returning a plain value.
    pub fn value<F>(name: &str, body: F) -> Self
    where
        F: Fn(&[Value]) -> Value + 'static,
    {
        Self::new(name, move |args| Ok(CallReturn::Value(Output::Value(body(args)))))
    }

    /// A synchronous function that may fail.
    pub fn fallible<F>(name: &str, body: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, SagaError> + 'static,
    {
        Self::new(name, move |args| body(args).map(|v| CallReturn::Value(Output::Value(v))))
    }

    /// An asynchronous function. The runtime awaits the returned future.
    pub fn future<F, Fut>(name: &str, body: F) -> Self
    where
        F: Fn(Vec<Value>) -> Fut + 'static,
        Fut: Future<Output = Result<Value, SagaError>> + 'static,
    {
        Self::new(name, move |args| {
            let fut = body(args.to_vec());
            Ok(CallReturn::Future(
                async move { fut.await.map(Output::Value) }.boxed_local(),
            ))
        })
    }

    /// A generator function: each invocation builds a new routine.
    pub fn saga<F, S>(name: &str, body: F) -> Self
    where
        F: Fn(&[Value]) -> S + 'static,
        S: Saga + 'static,
    {
        Self::new(name, move |args| Ok(CallReturn::Saga(Box::new(body(args)))))
    }

    /// A function that hands out an already built result exactly once.
    ///
    /// Used to re-issue a fork or call whose target has already been
    /// invoked, e.g. after wrapping its routine.
    pub(crate) fn once(name: &str, result: CallReturn) -> Self {
        let slot = RefCell::new(Some(result));
        let owner = name.to_string();
        Self::new(name, move |_| {
            slot.borrow_mut()
                .take()
                .ok_or_else(|| SagaError::Exhausted(owner.clone()))
        })
    }

    /// Returns the display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invoke the function.
    pub fn invoke(&self, context: Option<&Value>, args: &[Value]) -> Result<CallReturn, SagaError> {
        (self.body)(context, args)
    }
}

impl PartialEq for Func {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.body, &other.body)
    }
}

impl fmt::Debug for Func {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Func({})", self.name)
    }
}

impl fmt::Display for Func {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// A named state selector used by `select` effects. Compared by identity.
#[derive(Clone)]
pub struct Selector {
    name: Rc<str>,
    body: Rc<dyn Fn(&Value, &[Value]) -> Value>,
}

impl Selector {
    pub fn new<F>(name: &str, body: F) -> Self
    where
        F: Fn(&Value, &[Value]) -> Value + 'static,
    {
        Self {
            name: Rc::from(name),
            body: Rc::new(body),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn select(&self, state: &Value, args: &[Value]) -> Value {
        (self.body)(state, args)
    }
}

impl PartialEq for Selector {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.body, &other.body)
    }
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Selector({})", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn value_function_returns_output() {
        let double = Func::value("double", |args| json!(args[0].as_i64().unwrap_or(0) * 2));
        match double.invoke(None, &[json!(21)]).unwrap() {
            CallReturn::Value(output) => assert_eq!(output, Output::Value(json!(42))),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn context_is_passed_through() {
        let this = Func::with_context("this", |ctx, _| {
            Ok(CallReturn::Value(Output::Value(ctx.cloned().unwrap_or(Value::Null))))
        });
        match this.invoke(Some(&json!({"id": 1})), &[]).unwrap() {
            CallReturn::Value(output) => assert_eq!(output, Output::Value(json!({"id": 1}))),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn once_is_exhausted_after_first_invoke() {
        let once = Func::once("worker", CallReturn::Value(Output::null()));
        assert!(once.invoke(None, &[]).is_ok());
        assert_eq!(
            once.invoke(None, &[]).unwrap_err(),
            SagaError::Exhausted("worker".into())
        );
    }

    #[test]
    fn selectors_compare_by_identity() {
        let user = Selector::new("getUser", |state, _| state["user"].clone());
        assert_eq!(user, user.clone());
        assert_eq!(user.select(&json!({"user": 7}), &[]), json!(7));
    }
}
