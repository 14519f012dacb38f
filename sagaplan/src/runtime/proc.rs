use std::rc::Rc;

use futures_util::{
    FutureExt,
    future::{self, LocalBoxFuture},
};
use serde_json::Value;
use tokio::select;
use tokio_util::sync::CancellationToken;

use crate::{
    CallReturn, Effect, Output, Saga, SagaError, Step,
    effect::{ForkTarget, PromiseEffect, TakeSource},
    monitoring::EffectId,
    runtime::{Channel, Task, TaskOutcome, env::Env},
};

type EffectFuture = LocalBoxFuture<'static, Result<Output, SagaError>>;

/// Start driving `saga` as a new task on the current `LocalSet`.
///
/// With a `parent`, the task is attached: its failure is reported to the
/// parent, and the parent waits for it before finishing.
pub(crate) fn spawn(
    env: &Rc<Env>,
    saga: Box<dyn Saga>,
    name: &str,
    token: CancellationToken,
    parent: Option<&Task>,
) -> Task {
    let (task, mut slot) = Task::new(env.next_task_id(), name, token);
    if let Some(parent) = parent {
        parent.attach(task.clone());
    }
    tracing::trace!(task = %task, name = %task.name(), "task started");

    let env = env.clone();
    let parent = parent.cloned();
    let handle = task.clone();
    tokio::task::spawn_local(async move {
        let outcome = drive(&env, saga, &handle, &mut slot.failures).await;
        match &outcome {
            TaskOutcome::Done(_) => tracing::debug!(task = %handle, "task done"),
            TaskOutcome::Cancelled => tracing::debug!(task = %handle, "task cancelled"),
            TaskOutcome::Failed(error) => {
                tracing::debug!(task = %handle, error = %error, "task failed");
                if let Some(parent) = &parent {
                    parent.child_failed(error.clone());
                }
            }
        }
        slot.outcome.send_replace(Some(outcome));
    });
    task
}

enum Interrupt {
    Settled(Result<Output, SagaError>),
    Cancelled,
    ChildFailed(SagaError),
}

async fn drive(
    env: &Rc<Env>,
    mut saga: Box<dyn Saga>,
    task: &Task,
    failures: &mut tokio::sync::mpsc::UnboundedReceiver<SagaError>,
) -> TaskOutcome {
    let token = task.token().clone();
    let mut cancelling = false;
    let mut input = Ok(Output::null());

    let result = loop {
        let effect = match saga.resume(input) {
            Ok(Step::Yield(effect)) => effect,
            Ok(Step::Done(value)) => break Ok(value),
            Err(error) => break Err(error),
        };

        let effect_id = env.next_effect_id();
        env.effect_triggered(effect_id, None, task, &effect);
        let run = digest(env.clone(), effect, effect_id, task.clone());

        // once cancelled, the saga may still run effects to clean up
        let interrupt = if cancelling {
            Interrupt::Settled(run.await)
        } else {
            select! {
                biased;
                _ = token.cancelled() => Interrupt::Cancelled,
                Some(error) = failures.recv() => Interrupt::ChildFailed(error),
                result = run => Interrupt::Settled(result),
            }
        };

        input = match interrupt {
            Interrupt::Settled(result) if !cancelling && token.is_cancelled() => {
                drop(result);
                cancelling = true;
                Err(SagaError::Cancelled)
            }
            Interrupt::Settled(result) => result,
            Interrupt::Cancelled => {
                env.effect_cancelled(effect_id);
                cancelling = true;
                Err(SagaError::Cancelled)
            }
            Interrupt::ChildFailed(error) => {
                env.effect_cancelled(effect_id);
                token.cancel();
                break Err(error);
            }
        };
    };

    if cancelling {
        return TaskOutcome::Cancelled;
    }
    let value = match result {
        Ok(value) => value,
        Err(error) => {
            token.cancel();
            return TaskOutcome::Failed(error);
        }
    };

    // a finished body still waits for its attached forks
    let children = task.attached();
    let joined = future::join_all(children.iter().map(Task::done));
    select! {
        biased;
        _ = token.cancelled() => TaskOutcome::Cancelled,
        Some(error) = failures.recv() => {
            token.cancel();
            TaskOutcome::Failed(error)
        }
        _ = joined => TaskOutcome::Done(value),
    }
}

/// Run an effect and report how it settled.
fn digest(env: Rc<Env>, effect: Effect, effect_id: EffectId, task: Task) -> EffectFuture {
    let run = run_effect(&env, effect, effect_id, &task);
    async move {
        let result = run.await;
        env.effect_settled(effect_id, &result);
        result
    }
    .boxed_local()
}

fn ready(result: Result<Output, SagaError>) -> EffectFuture {
    future::ready(result).boxed_local()
}

fn value(value: Value) -> EffectFuture {
    ready(Ok(Output::Value(value)))
}

/// Starts the effect. Registration with the store or a channel happens
/// here, before the returned future is polled.
fn run_effect(env: &Rc<Env>, effect: Effect, effect_id: EffectId, task: &Task) -> EffectFuture {
    match effect {
        Effect::Take(take) => {
            let next: LocalBoxFuture<'static, Option<Value>> = match take.source {
                TakeSource::Pattern(pattern) => env.take(pattern).map(Result::ok).boxed_local(),
                TakeSource::Channel(channel) => channel.take().boxed_local(),
            };
            let maybe = take.maybe;
            async move {
                match next.await {
                    Some(action) => Ok(Output::Value(action)),
                    None if maybe => Ok(Output::null()),
                    None => Err(SagaError::new("channel closed")),
                }
            }
            .boxed_local()
        }
        Effect::Put(put) => {
            env.store.dispatch(put.action.clone());
            value(put.action)
        }
        Effect::Call(call) | Effect::Cps(call) => {
            match call.func.invoke(call.context.as_ref(), &call.args) {
                Err(error) => ready(Err(error)),
                Ok(CallReturn::Value(output)) => ready(Ok(output)),
                Ok(CallReturn::Future(future)) => future,
                Ok(CallReturn::Saga(saga)) => {
                    let child = spawn(env, saga, call.func.name(), task.token().child_token(), None);
                    async move { child.done().await.into_result().map(Output::Value) }.boxed_local()
                }
            }
        }
        Effect::Fork(fork) => {
            let (saga, name): (Box<dyn Saga>, String) = match &fork.target {
                ForkTarget::Helper(helper) => (Box::new(helper.expand()), helper.kind.to_string()),
                ForkTarget::Func(func) => (
                    routine(func.invoke(fork.context.as_ref(), &fork.args)),
                    func.name().to_string(),
                ),
            };
            let child = if fork.detached {
                spawn(env, saga, &name, CancellationToken::new(), None)
            } else {
                spawn(env, saga, &name, task.token().child_token(), Some(task))
            };
            ready(Ok(Output::Task(child)))
        }
        Effect::Select(select) => {
            let state = env.store.state();
            match &select.selector {
                Some(selector) => value(selector.select(&state, &select.args)),
                None => value(state),
            }
        }
        Effect::Race(race) => {
            if race.branches.is_empty() {
                return ready(Err(SagaError::new("race requires at least one effect")));
            }
            let mut keys = Vec::with_capacity(race.branches.len());
            let mut ids = Vec::with_capacity(race.branches.len());
            let mut runs = Vec::with_capacity(race.branches.len());
            for (key, branch) in race.branches {
                let id = env.next_effect_id();
                env.effect_triggered(id, Some(effect_id), task, &branch);
                runs.push(digest(env.clone(), branch, id, task.clone()));
                keys.push(key);
                ids.push(id);
            }
            let env = env.clone();
            async move {
                let (result, index, _losers) = future::select_all(runs).await;
                for (i, id) in ids.into_iter().enumerate() {
                    if i != index {
                        env.effect_cancelled(id);
                    }
                }
                let winner = keys.swap_remove(index);
                result.map(|value| Output::Race {
                    winner,
                    value: Box::new(value),
                })
            }
            .boxed_local()
        }
        Effect::Parallel(members) => {
            let runs: Vec<EffectFuture> = members
                .into_iter()
                .map(|member| {
                    let id = env.next_effect_id();
                    env.effect_triggered(id, Some(effect_id), task, &member);
                    digest(env.clone(), member, id, task.clone())
                })
                .collect();
            future::try_join_all(runs).map(|r| r.map(Output::List)).boxed_local()
        }
        Effect::ActionChannel(ac) => {
            let channel = Channel::new(ac.buffer);
            env.connect(ac.pattern, &channel);
            ready(Ok(Output::Channel(channel)))
        }
        Effect::Promise(promise) => promise.future.boxed_local(),
        Effect::Cancel(target) => {
            target.as_ref().unwrap_or(task).cancel();
            value(Value::Null)
        }
        Effect::Cancelled => value(Value::Bool(task.is_cancelled())),
        Effect::Join(joined) => {
            async move { joined.done().await.into_result().map(Output::Value) }.boxed_local()
        }
        Effect::Flush(channel) => value(Value::Array(channel.flush())),
        Effect::Plain(output) => ready(Ok(output)),
    }
}

/// Turns whatever a forked function returned into something the runtime
/// can drive as a task.
pub(crate) fn routine(result: Result<CallReturn, SagaError>) -> Box<dyn Saga> {
    match result {
        Ok(CallReturn::Saga(saga)) => saga,
        Ok(CallReturn::Future(future)) => Box::new(Await::Promise(PromiseEffect::new(future))),
        Ok(CallReturn::Value(output)) => Box::new(Await::Ready(Ok(output))),
        Err(error) => Box::new(Await::Ready(Err(error))),
    }
}

/// A task body that waits for a single promise or value.
enum Await {
    Promise(PromiseEffect),
    Waiting,
    Ready(Result<Output, SagaError>),
    Finished,
}

impl Saga for Await {
    fn resume(&mut self, input: Result<Output, SagaError>) -> Result<Step, SagaError> {
        match std::mem::replace(self, Await::Finished) {
            Await::Promise(promise) => {
                *self = Await::Waiting;
                Ok(Step::Yield(Effect::Promise(promise)))
            }
            Await::Waiting => input.map(|output| Step::Done(output.into_value())),
            Await::Ready(result) => result.map(|output| Step::Done(output.into_value())),
            Await::Finished => Ok(Step::Done(Value::Null)),
        }
    }
}
