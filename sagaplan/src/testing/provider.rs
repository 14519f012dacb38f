//! Canned results for effects.
//!
//! A provider sees an effect before the runtime does and either answers it
//! with a value, throws an error into the saga, or passes it on with
//! [`Next::proceed`].

use std::{fmt, rc::Rc};

use crate::{
    Effect, EffectTag, Func, Output, SagaError,
    effect::{ActionChannelEffect, CallEffect, ForkEffect, PutEffect, RaceEffect, SelectEffect, TakeEffect},
    runtime::{Channel, Task},
};

/// What a provider decided.
#[derive(Debug)]
pub enum Provision {
    /// Resume the saga with this output instead of running the effect.
    Provide(Output),
    /// Let the effect run normally.
    Next,
}

/// Token handed to every provider; returning [`Next::proceed`] defers to
/// the next table or the runtime.
#[derive(Debug)]
pub struct Next(());

impl Next {
    pub fn proceed(self) -> ProviderResult {
        Ok(Provision::Next)
    }
}

pub type ProviderResult = Result<Provision, SagaError>;

/// Answer the effect with `value`.
pub fn provide(value: impl Into<Output>) -> ProviderResult {
    Ok(Provision::Provide(value.into()))
}

/// Throw `error` into the saga at the effect.
pub fn throw_error(error: impl Into<SagaError>) -> ProviderResult {
    Err(error.into())
}

type Handler<P> = Rc<dyn Fn(&P, Next) -> ProviderResult>;

/// A table of per-tag providers.
///
/// # Example
///
/// ```ignore
/// let providers = Providers::new()
///     .call(move |call, next| {
///         if call.func == fetch_user {
///             provide(json!({"id": 1, "name": "Ada"}))
///         } else {
///             next.proceed()
///         }
///     })
///     .select(|_, _| provide(json!(42)));
/// ```
#[derive(Clone, Default)]
pub struct Providers {
    take: Option<Handler<TakeEffect>>,
    put: Option<Handler<PutEffect>>,
    call: Option<Handler<CallEffect>>,
    cps: Option<Handler<CallEffect>>,
    fork: Option<Handler<ForkEffect>>,
    spawn: Option<Handler<ForkEffect>>,
    select: Option<Handler<SelectEffect>>,
    race: Option<Handler<RaceEffect>>,
    parallel: Option<Handler<[Effect]>>,
    action_channel: Option<Handler<ActionChannelEffect>>,
    cancel: Option<Handler<Option<Task>>>,
    cancelled: Option<Handler<()>>,
    join: Option<Handler<Task>>,
    flush: Option<Handler<Channel>>,
}

macro_rules! handler_setter {
    ($(#[$doc:meta])* $name:ident, $payload:ty) => {
        $(#[$doc])*
        pub fn $name<F>(mut self, handler: F) -> Self
        where
            F: Fn(&$payload, Next) -> ProviderResult + 'static,
        {
            self.$name = Some(Rc::new(handler));
            self
        }
    };
}

impl Providers {
    pub fn new() -> Self {
        Self::default()
    }

    handler_setter!(take, TakeEffect);
    handler_setter!(put, PutEffect);
    handler_setter!(call, CallEffect);
    handler_setter!(cps, CallEffect);
    handler_setter!(
        /// Handles attached forks (including helper forks).
        fork,
        ForkEffect
    );
    handler_setter!(
        /// Handles detached forks.
        spawn,
        ForkEffect
    );
    handler_setter!(select, SelectEffect);
    handler_setter!(race, RaceEffect);
    handler_setter!(parallel, [Effect]);
    handler_setter!(action_channel, ActionChannelEffect);
    handler_setter!(
        /// The payload is `None` for self-cancellation.
        cancel,
        Option<Task>
    );
    handler_setter!(cancelled, ());
    handler_setter!(join, Task);
    handler_setter!(flush, Channel);

    /// A table answering every call to `func` with `value`.
    pub fn call_fn(func: &Func, value: impl Into<Output>) -> Self {
        let func = func.clone();
        let value = value.into();
        Self::new().call(move |call, next| {
            if call.func == func {
                provide(value.clone())
            } else {
                next.proceed()
            }
        })
    }

    /// Coalesces tables left to right: for each effect, the first table
    /// whose handler does not proceed wins.
    pub fn chain(tables: impl IntoIterator<Item = Providers>) -> Self {
        let tables: Vec<Providers> = tables.into_iter().collect();
        Self {
            take: chained(&tables, |t| t.take.clone()),
            put: chained(&tables, |t| t.put.clone()),
            call: chained(&tables, |t| t.call.clone()),
            cps: chained(&tables, |t| t.cps.clone()),
            fork: chained(&tables, |t| t.fork.clone()),
            spawn: chained(&tables, |t| t.spawn.clone()),
            select: chained(&tables, |t| t.select.clone()),
            race: chained(&tables, |t| t.race.clone()),
            parallel: chained(&tables, |t| t.parallel.clone()),
            action_channel: chained(&tables, |t| t.action_channel.clone()),
            cancel: chained(&tables, |t| t.cancel.clone()),
            cancelled: chained(&tables, |t| t.cancelled.clone()),
            join: chained(&tables, |t| t.join.clone()),
            flush: chained(&tables, |t| t.flush.clone()),
        }
    }

    /// Whether any handler is registered for `tag`. Forks are split by
    /// `detached`, see [`handles_fork`](Self::handles_fork).
    pub fn handles(&self, tag: EffectTag) -> bool {
        match tag {
            EffectTag::Take => self.take.is_some(),
            EffectTag::Put => self.put.is_some(),
            EffectTag::Call => self.call.is_some(),
            EffectTag::Cps => self.cps.is_some(),
            EffectTag::Fork => self.fork.is_some() || self.spawn.is_some(),
            EffectTag::Select => self.select.is_some(),
            EffectTag::Race => self.race.is_some(),
            EffectTag::Parallel => self.parallel.is_some(),
            EffectTag::ActionChannel => self.action_channel.is_some(),
            EffectTag::Cancel => self.cancel.is_some(),
            EffectTag::Cancelled => self.cancelled.is_some(),
            EffectTag::Join => self.join.is_some(),
            EffectTag::Flush => self.flush.is_some(),
            EffectTag::Promise | EffectTag::None => false,
        }
    }

    pub fn handles_fork(&self, detached: bool) -> bool {
        if detached {
            self.spawn.is_some()
        } else {
            self.fork.is_some()
        }
    }
}

impl fmt::Debug for Providers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Providers").finish_non_exhaustive()
    }
}

fn chained<P: ?Sized + 'static>(
    tables: &[Providers],
    pick: impl Fn(&Providers) -> Option<Handler<P>>,
) -> Option<Handler<P>> {
    let handlers: Vec<Handler<P>> = tables.iter().filter_map(pick).collect();
    match handlers.len() {
        0 => None,
        1 => handlers.into_iter().next(),
        _ => Some(Rc::new(move |payload: &P, _next: Next| {
            for handler in &handlers {
                match handler(payload, Next(()))? {
                    Provision::Next => continue,
                    provided => return Ok(provided),
                }
            }
            Ok(Provision::Next)
        })),
    }
}

fn ask<P: ?Sized>(handler: &Option<Handler<P>>, payload: &P) -> ProviderResult {
    match handler {
        Some(handler) => handler(payload, Next(())),
        None => Ok(Provision::Next),
    }
}

/// Asks `providers` about `effect`.
pub fn provide_value(providers: &Providers, effect: &Effect) -> ProviderResult {
    match effect {
        Effect::Take(take) => ask(&providers.take, take),
        Effect::Put(put) => ask(&providers.put, put),
        Effect::Call(call) => ask(&providers.call, call),
        Effect::Cps(call) => ask(&providers.cps, call),
        Effect::Fork(fork) if fork.detached => ask(&providers.spawn, fork),
        Effect::Fork(fork) => ask(&providers.fork, fork),
        Effect::Select(select) => ask(&providers.select, select),
        Effect::Race(race) => ask(&providers.race, race),
        Effect::Parallel(members) => ask(&providers.parallel, members.as_slice()),
        Effect::ActionChannel(ac) => ask(&providers.action_channel, ac),
        Effect::Cancel(target) => ask(&providers.cancel, target),
        Effect::Cancelled => ask(&providers.cancelled, &()),
        Effect::Join(task) => ask(&providers.join, task),
        Effect::Flush(channel) => ask(&providers.flush, channel),
        Effect::Promise(_) | Effect::Plain(_) => Ok(Provision::Next),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::*;
    use crate::{Selector, effects};

    fn provided(result: ProviderResult) -> Option<Value> {
        match result {
            Ok(Provision::Provide(output)) => Some(output.into_value()),
            _ => None,
        }
    }

    #[test]
    fn call_fn_only_answers_its_function() {
        let fetch = Func::value("fetch", |_| json!("real"));
        let other = Func::value("other", |_| json!("real"));
        let providers = Providers::call_fn(&fetch, json!("canned"));

        let hit = provide_value(&providers, &effects::call(&fetch, [json!(1)]));
        assert_eq!(provided(hit), Some(json!("canned")));
        let miss = provide_value(&providers, &effects::call(&other, []));
        assert!(matches!(miss, Ok(Provision::Next)));
    }

    #[test]
    fn fork_and_spawn_use_separate_handlers() {
        let worker = Func::value("worker", |_| Value::Null);
        let providers = Providers::new().spawn(|_, _| provide(json!("spawned")));

        assert!(matches!(
            provide_value(&providers, &effects::fork(&worker, [])),
            Ok(Provision::Next)
        ));
        assert_eq!(
            provided(provide_value(&providers, &effects::spawn(&worker, []))),
            Some(json!("spawned"))
        );
        assert!(providers.handles_fork(true));
        assert!(!providers.handles_fork(false));
    }

    #[test]
    fn chain_takes_first_answer() {
        let first = Providers::new().select(|select, next| match &select.selector {
            Some(selector) if selector.name() == "count" => provide(json!(1)),
            _ => next.proceed(),
        });
        let second = Providers::new().select(|_, _| provide(json!(2)));
        let chained = Providers::chain([first, second]);

        let count = Selector::new("count", |_, _| Value::Null);
        let other = Selector::new("other", |_, _| Value::Null);
        assert_eq!(provided(provide_value(&chained, &effects::select(&count, []))), Some(json!(1)));
        assert_eq!(provided(provide_value(&chained, &effects::select(&other, []))), Some(json!(2)));
    }

    #[test]
    fn throw_error_rejects_the_effect() {
        let providers = Providers::new().take(|_, _| throw_error("no actions today"));
        let result = provide_value(&providers, &effects::take("FOO"));
        assert_eq!(result.err(), Some(SagaError::new("no actions today")));
    }

    #[test]
    fn parallel_handler_sees_members() {
        let providers = Providers::new().parallel(|members, _| provide(json!(members.len())));
        let all = effects::all([effects::take("A"), effects::take("B")]);
        assert_eq!(provided(provide_value(&providers, &all)), Some(json!(2)));
        assert!(providers.handles(EffectTag::Parallel));
        assert!(!providers.handles(EffectTag::Race));
    }
}
