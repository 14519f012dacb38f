//! Effect constructors.
//!
//! Free functions building [`Effect`] descriptors, named after the effect
//! creators sagas are usually written with. Inside a [`saga`](crate::saga)
//! body, the matching [`Co`](crate::Co) methods yield them directly.

use std::time::Duration;

use serde_json::Value;

use crate::{
    Effect, Func, Pattern, Selector,
    effect::{
        ActionChannelEffect, CallEffect, ForkEffect, ForkTarget, PutEffect, RaceEffect,
        SelectEffect, TakeEffect, TakeSource,
    },
    helper::{HelperEffect, HelperKind},
    runtime::{Buffer, Channel, Task},
};

thread_local! {
    static DELAY: Func = Func::future("delay", |args| async move {
        let ms = args.first().and_then(Value::as_u64).unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok(args.get(1).cloned().unwrap_or(Value::Bool(true)))
    });
}

/// The function behind [`delay`]. Resolves with `true` after `args[0]` ms.
pub fn delay_fn() -> Func {
    DELAY.with(Func::clone)
}

/// Wait for an action matching `pattern`.
pub fn take(pattern: impl Into<Pattern>) -> Effect {
    Effect::Take(TakeEffect {
        source: TakeSource::Pattern(pattern.into()),
        maybe: false,
    })
}

pub fn take_maybe(pattern: impl Into<Pattern>) -> Effect {
    Effect::Take(TakeEffect {
        source: TakeSource::Pattern(pattern.into()),
        maybe: true,
    })
}

/// Wait for the next message of a channel.
pub fn take_channel(channel: &Channel) -> Effect {
    Effect::Take(TakeEffect {
        source: TakeSource::Channel(channel.clone()),
        maybe: false,
    })
}

pub fn take_maybe_channel(channel: &Channel) -> Effect {
    Effect::Take(TakeEffect {
        source: TakeSource::Channel(channel.clone()),
        maybe: true,
    })
}

/// Dispatch an action to the store.
pub fn put(action: Value) -> Effect {
    Effect::Put(PutEffect {
        action,
        resolve: false,
    })
}

pub fn put_resolve(action: Value) -> Effect {
    Effect::Put(PutEffect {
        action,
        resolve: true,
    })
}

/// Call `func` with `args` and resume with its result.
pub fn call(func: &Func, args: impl IntoIterator<Item = Value>) -> Effect {
    Effect::Call(CallEffect {
        func: func.clone(),
        context: None,
        args: args.into_iter().collect(),
    })
}

/// Like [`call`], with a `this` context.
pub fn apply(context: Value, func: &Func, args: impl IntoIterator<Item = Value>) -> Effect {
    Effect::Call(CallEffect {
        func: func.clone(),
        context: Some(context),
        args: args.into_iter().collect(),
    })
}

/// Call a callback-style function.
pub fn cps(func: &Func, args: impl IntoIterator<Item = Value>) -> Effect {
    Effect::Cps(CallEffect {
        func: func.clone(),
        context: None,
        args: args.into_iter().collect(),
    })
}

/// Start `func` as an attached child task.
pub fn fork(func: &Func, args: impl IntoIterator<Item = Value>) -> Effect {
    fork_effect(func, args, false)
}

/// Start `func` as a detached task.
pub fn spawn(func: &Func, args: impl IntoIterator<Item = Value>) -> Effect {
    fork_effect(func, args, true)
}

fn fork_effect(func: &Func, args: impl IntoIterator<Item = Value>, detached: bool) -> Effect {
    Effect::Fork(ForkEffect {
        target: ForkTarget::Func(func.clone()),
        context: None,
        args: args.into_iter().collect(),
        detached,
    })
}

/// Read part of the store state.
pub fn select(selector: &Selector, args: impl IntoIterator<Item = Value>) -> Effect {
    Effect::Select(SelectEffect {
        selector: Some(selector.clone()),
        args: args.into_iter().collect(),
    })
}

/// Read the whole store state.
pub fn select_state() -> Effect {
    Effect::Select(SelectEffect {
        selector: None,
        args: Vec::new(),
    })
}

/// Run keyed effects concurrently and resume with the first to finish.
pub fn race<K: Into<String>>(branches: impl IntoIterator<Item = (K, Effect)>) -> Effect {
    Effect::Race(RaceEffect {
        branches: branches.into_iter().map(|(k, e)| (k.into(), e)).collect(),
    })
}

/// Run effects concurrently and resume with all results.
pub fn all(effects: impl IntoIterator<Item = Effect>) -> Effect {
    Effect::Parallel(effects.into_iter().collect())
}

/// Buffer actions matching `pattern` in a channel.
pub fn action_channel(pattern: impl Into<Pattern>) -> Effect {
    action_channel_with(pattern, Buffer::Expanding)
}

pub fn action_channel_with(pattern: impl Into<Pattern>, buffer: Buffer) -> Effect {
    Effect::ActionChannel(ActionChannelEffect {
        pattern: pattern.into(),
        buffer,
    })
}

pub fn cancel(task: &Task) -> Effect {
    Effect::Cancel(Some(task.clone()))
}

/// Cancel the task yielding the effect.
pub fn cancel_self() -> Effect {
    Effect::Cancel(None)
}

/// Resume with `true` if the current task is being cancelled.
pub fn cancelled() -> Effect {
    Effect::Cancelled
}

/// Wait for a task to finish and resume with its result.
pub fn join(task: &Task) -> Effect {
    Effect::Join(task.clone())
}

/// Drain all buffered messages of a channel.
pub fn flush(channel: &Channel) -> Effect {
    Effect::Flush(channel.clone())
}

/// Block for `ms` milliseconds.
pub fn delay(ms: u64) -> Effect {
    call(&delay_fn(), [Value::from(ms)])
}

/// Fork `worker` for every action matching `pattern`.
pub fn take_every(
    pattern: impl Into<Pattern>,
    worker: &Func,
    args: impl IntoIterator<Item = Value>,
) -> Effect {
    helper(HelperKind::TakeEvery, pattern.into(), worker, args, None)
}

/// Like [`take_every`], cancelling the previous worker first.
pub fn take_latest(
    pattern: impl Into<Pattern>,
    worker: &Func,
    args: impl IntoIterator<Item = Value>,
) -> Effect {
    helper(HelperKind::TakeLatest, pattern.into(), worker, args, None)
}

/// Fork `worker` for a matching action, then ignore actions for `ms`.
pub fn throttle(
    ms: u64,
    pattern: impl Into<Pattern>,
    worker: &Func,
    args: impl IntoIterator<Item = Value>,
) -> Effect {
    helper(HelperKind::Throttle, pattern.into(), worker, args, Some(ms))
}

/// Fork `worker` once no matching action arrived for `ms`.
pub fn debounce(
    ms: u64,
    pattern: impl Into<Pattern>,
    worker: &Func,
    args: impl IntoIterator<Item = Value>,
) -> Effect {
    helper(HelperKind::Debounce, pattern.into(), worker, args, Some(ms))
}

fn helper(
    kind: HelperKind,
    pattern: Pattern,
    worker: &Func,
    args: impl IntoIterator<Item = Value>,
    ms: Option<u64>,
) -> Effect {
    Effect::Fork(ForkEffect {
        target: ForkTarget::Helper(HelperEffect {
            kind,
            pattern,
            worker: worker.clone(),
            args: args.into_iter().collect(),
            ms,
        }),
        context: None,
        args: Vec::new(),
        detached: false,
    })
}
