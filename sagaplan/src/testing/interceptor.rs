use std::rc::Rc;

use crate::{
    CallReturn, Effect, EffectTag, Func, Output, Saga, SagaError, Step,
    effect::{ForkEffect, ForkTarget, PromiseEffect, RaceEffect},
    effects,
    runtime::routine,
};

use super::{
    Harness,
    provider::{Provision, provide_value},
};

/// Wraps a saga so that everything it yields passes through
/// [`Harness::refine`] before the runtime sees it.
///
/// Effects answered on the spot (provided values, plain results of direct
/// calls) resume the inner saga without a round trip through the runtime.
pub(crate) struct TracedSaga {
    inner: Box<dyn Saga>,
    harness: Rc<Harness>,
}

impl TracedSaga {
    pub(crate) fn new(inner: Box<dyn Saga>, harness: Rc<Harness>) -> Self {
        Self { inner, harness }
    }
}

impl Saga for TracedSaga {
    fn resume(&mut self, input: Result<Output, SagaError>) -> Result<Step, SagaError> {
        let mut input = input;
        loop {
            let effect = match self.inner.resume(input)? {
                Step::Yield(effect) => effect,
                done @ Step::Done(_) => return Ok(done),
            };
            input = match self.harness.refine(effect) {
                Ok(Effect::Plain(output)) => Ok(output),
                Ok(effect) => return Ok(Step::Yield(effect)),
                Err(error) => Err(error),
            };
        }
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

impl Harness {
    fn trace(self: &Rc<Self>, saga: Box<dyn Saga>) -> Box<dyn Saga> {
        Box::new(TracedSaga::new(saga, self.clone()))
    }

    fn record(&self, effect: &Effect) {
        self.process_effect(effect, None);
    }

    /// Asks the providers; a provided outcome is recorded as if the effect
    /// had run.
    fn provided(&self, effect: Effect) -> Result<Effect, SagaError> {
        match provide_value(&self.providers, &effect) {
            Ok(Provision::Next) => Ok(effect),
            Ok(Provision::Provide(output)) => {
                self.record(&effect);
                Ok(Effect::Plain(output))
            }
            Err(error) => {
                self.record(&effect);
                Err(error)
            }
        }
    }

    /// Rewrites a yielded effect before it reaches the runtime.
    ///
    /// Races and parallel effects are refined member by member. Forks run
    /// their target here, wrapped so the child is traced too. Calls are
    /// invoked directly. Everything else goes through the providers. An
    /// `Err` is thrown into the saga.
    pub(crate) fn refine(self: &Rc<Self>, effect: Effect) -> Result<Effect, SagaError> {
        match effect {
            Effect::Race(race) if !self.providers.handles(EffectTag::Race) => {
                self.record(&Effect::Race(race.clone()));
                let branches = race
                    .branches
                    .into_iter()
                    .map(|(key, branch)| Ok((key, self.refine(branch)?)))
                    .collect::<Result<Vec<_>, SagaError>>()?;
                Ok(Effect::Race(RaceEffect { branches }))
            }
            Effect::Parallel(members) if !self.providers.handles(EffectTag::Parallel) => {
                let members = members
                    .into_iter()
                    .map(|member| self.refine(member))
                    .collect::<Result<Vec<_>, SagaError>>()?;
                Ok(Effect::Parallel(members))
            }
            Effect::Fork(fork) if !self.providers.handles_fork(fork.detached) => {
                self.record(&Effect::Fork(fork.clone()));
                let (name, child): (String, Box<dyn Saga>) = match &fork.target {
                    ForkTarget::Helper(helper) => {
                        (helper.kind.to_string(), Box::new(helper.expand()))
                    }
                    ForkTarget::Func(func) => (
                        func.name().to_string(),
                        routine(func.invoke(fork.context.as_ref(), &fork.args)),
                    ),
                };
                let wrapped = Func::once(&name, CallReturn::Saga(self.trace(child)));
                Ok(Effect::Fork(ForkEffect {
                    target: ForkTarget::Func(wrapped),
                    context: None,
                    args: Vec::new(),
                    detached: fork.detached,
                }))
            }
            Effect::Call(call) => {
                let effect = self.provided(Effect::Call(call))?;
                let Effect::Call(call) = &effect else {
                    return Ok(effect);
                };
                self.record(&effect);
                match call.func.invoke(call.context.as_ref(), &call.args)? {
                    CallReturn::Value(output) => Ok(Effect::Plain(output)),
                    CallReturn::Future(future) => Ok(Effect::Promise(PromiseEffect::new(future))),
                    CallReturn::Saga(saga) => {
                        let wrapped = Func::once(call.func.name(), CallReturn::Saga(self.trace(saga)));
                        Ok(effects::call(&wrapped, []))
                    }
                }
            }
            other => self.provided(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use serde_json::{Value, json};
    use tokio::task::LocalSet;

    use super::*;
    use crate::testing::{
        Providers,
        harness::HarnessSetup,
        provider::{provide, throw_error},
    };

    fn harness(providers: Providers) -> Rc<Harness> {
        Harness::new(HarnessSetup {
            state: Value::Null,
            reducer: None,
            providers,
            queued: Vec::new(),
        })
    }

    #[tokio::test]
    async fn plain_call_resolves_in_place() {
        LocalSet::new()
            .run_until(async {
                let harness = harness(Providers::new());
                let double = Func::value("double", |args| json!(args[0].as_i64().unwrap_or(0) * 2));
                let refined = harness.refine(effects::call(&double, [json!(21)]));

                assert_eq!(refined, Ok(Effect::Plain(Output::Value(json!(42)))));
                assert_eq!(harness.stores().call.values(), &[effects::call(&double, [json!(21)])]);
            })
            .await;
    }

    #[tokio::test]
    async fn provided_call_skips_the_function() {
        LocalSet::new()
            .run_until(async {
                let ran = Rc::new(Cell::new(false));
                let flag = ran.clone();
                let fetch = Func::value("fetch", move |_| {
                    flag.set(true);
                    json!("real")
                });
                let harness = harness(Providers::call_fn(&fetch, json!("canned")));

                let refined = harness.refine(effects::call(&fetch, []));
                assert_eq!(refined, Ok(Effect::Plain(Output::Value(json!("canned")))));
                assert!(!ran.get());
                assert_eq!(harness.stores().call.len(), 1);
            })
            .await;
    }

    #[tokio::test]
    async fn provider_error_is_recorded_and_thrown() {
        LocalSet::new()
            .run_until(async {
                let harness = harness(Providers::new().select(|_, _| throw_error("no state")));
                let refined = harness.refine(effects::select_state());
                assert_eq!(refined, Err(SagaError::new("no state")));
                assert_eq!(harness.stores().select.len(), 1);
            })
            .await;
    }

    #[tokio::test]
    async fn fork_is_recorded_and_rewrapped() {
        LocalSet::new()
            .run_until(async {
                let harness = harness(Providers::new());
                let worker = Func::value("worker", |_| Value::Null);
                let original = effects::spawn(&worker, [json!(1)]);

                let refined = harness.refine(original.clone());
                let Ok(Effect::Fork(fork)) = refined else {
                    panic!("expected a fork, got {refined:?}");
                };
                assert!(fork.detached);
                assert_ne!(Effect::Fork(fork), original);
                assert_eq!(harness.stores().fork.values(), &[original]);
            })
            .await;
    }

    #[tokio::test]
    async fn race_branches_are_refined() {
        LocalSet::new()
            .run_until(async {
                let harness = harness(Providers::new().take(|_, _| provide(json!({"type": "X"}))));
                let race = effects::race([("a", effects::take("X")), ("b", effects::take("Y"))]);

                let refined = harness.refine(race.clone());
                let Ok(Effect::Race(refined)) = refined else {
                    panic!("expected a race");
                };
                assert!(matches!(refined.branches[0].1, Effect::Plain(_)));
                assert_eq!(harness.stores().race.values(), &[race]);
                assert_eq!(harness.stores().take.len(), 2);
            })
            .await;
    }
}
