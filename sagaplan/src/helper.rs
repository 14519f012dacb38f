use std::fmt;

use serde_json::Value;

use crate::{
    Effect, Func, Output, Pattern, Saga, SagaError, Step, effects,
    runtime::{Buffer, Channel, Task},
};

/// The helper a helper fork stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub enum HelperKind {
    TakeEvery,
    TakeLatest,
    Throttle,
    Debounce,
}

impl HelperKind {
    pub fn name(&self) -> &'static str {
        match self {
            HelperKind::TakeEvery => "takeEvery",
            HelperKind::TakeLatest => "takeLatest",
            HelperKind::Throttle => "throttle",
            HelperKind::Debounce => "debounce",
        }
    }
}

impl fmt::Display for HelperKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A helper effect: sugar for a watcher loop over primitive effects.
///
/// When forked, the runtime drives [`HelperEffect::expand`]:
///
/// | kind         | loop body                                              |
/// |--------------|--------------------------------------------------------|
/// | `takeEvery`  | `take` then `fork(worker)`                             |
/// | `takeLatest` | `take`, `cancel(previous)` then `fork(worker)`         |
/// | `throttle`   | `take(channel)`, `fork(worker)` then `call(delay)`     |
/// | `debounce`   | `take`, `race(delay, take)` until quiet, `fork(worker)`|
///
/// The worker receives `args` followed by the taken action.
#[derive(Debug, Clone, PartialEq)]
pub struct HelperEffect {
    pub kind: HelperKind,
    pub pattern: Pattern,
    pub worker: Func,
    pub args: Vec<Value>,
    /// Throttle window or debounce delay.
    pub ms: Option<u64>,
}

impl HelperEffect {
    /// Builds the routine this helper expands to.
    pub fn expand(&self) -> HelperSaga {
        HelperSaga {
            helper: self.clone(),
            state: State::Start,
            last_task: None,
            last_channel: None,
        }
    }

    fn fork_worker(&self, action: Value) -> Effect {
        let mut args = self.args.clone();
        args.push(action);
        effects::fork(&self.worker, args)
    }

    fn debounce_race(&self) -> Effect {
        effects::race([
            ("debounced", effects::delay(self.ms.unwrap_or(0))),
            ("latestAction", effects::take(self.pattern.clone())),
        ])
    }
}

impl fmt::Display for HelperEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.kind)?;
        if let Some(ms) = self.ms {
            write!(f, "{ms}, ")?;
        }
        let args: Vec<String> = self.args.iter().map(Value::to_string).collect();
        write!(f, "{}, {}, [{}])", self.pattern, self.worker, args.join(", "))
    }
}

#[derive(Debug)]
enum State {
    Start,
    Channel,
    Taking,
    Cancelling(Value),
    Forking,
    Delaying,
    Racing(Value),
}

/// The routine behind a [`HelperEffect`]. Runs until cancelled.
#[derive(Debug)]
pub struct HelperSaga {
    helper: HelperEffect,
    state: State,
    last_task: Option<Task>,
    last_channel: Option<Channel>,
}

impl HelperSaga {
    fn take_next(&mut self, channel: Option<&Channel>) -> Step {
        self.state = State::Taking;
        match channel {
            Some(channel) => Step::Yield(effects::take_channel(channel)),
            None => Step::Yield(effects::take(self.helper.pattern.clone())),
        }
    }

    fn fork(&mut self, action: Value) -> Step {
        self.state = State::Forking;
        Step::Yield(self.helper.fork_worker(action))
    }
}

fn expect_action(effect: &'static str, output: Output) -> Result<Value, SagaError> {
    match output {
        Output::Value(action) => Ok(action),
        other => Err(SagaError::UnexpectedOutput {
            effect,
            expected: "an action",
            got: format!("{other:?}"),
        }),
    }
}

impl Saga for HelperSaga {
    fn resume(&mut self, input: Result<Output, SagaError>) -> Result<Step, SagaError> {
        let state = std::mem::replace(&mut self.state, State::Start);
        if matches!(state, State::Start) {
            return Ok(match self.helper.kind {
                HelperKind::Throttle => {
                    self.state = State::Channel;
                    Step::Yield(effects::action_channel_with(
                        self.helper.pattern.clone(),
                        Buffer::Sliding(1),
                    ))
                }
                _ => self.take_next(None),
            });
        }
        let output = input?;

        let step = match (self.helper.kind, state) {
            (HelperKind::Throttle, State::Channel) => {
                let channel = output.into_channel().ok_or_else(|| SagaError::UnexpectedOutput {
                    effect: "actionChannel",
                    expected: "a channel",
                    got: "another value".into(),
                })?;
                self.last_channel = Some(channel.clone());
                self.take_next(Some(&channel))
            }
            (HelperKind::TakeLatest, State::Taking) => {
                let action = expect_action("take", output)?;
                match self.last_task.clone() {
                    Some(task) => {
                        let effect = effects::cancel(&task);
                        self.state = State::Cancelling(action);
                        Step::Yield(effect)
                    }
                    None => self.fork(action),
                }
            }
            (HelperKind::Debounce, State::Taking) => {
                let action = expect_action("take", output)?;
                self.state = State::Racing(action);
                Step::Yield(self.helper.debounce_race())
            }
            (_, State::Taking) => {
                let action = expect_action("take", output)?;
                self.fork(action)
            }
            (_, State::Cancelling(action)) => self.fork(action),
            (HelperKind::Debounce, State::Racing(action)) => match output {
                Output::Race { winner, .. } if winner == "debounced" => self.fork(action),
                Output::Race { value, .. } => {
                    let latest = expect_action("race", *value)?;
                    self.state = State::Racing(latest);
                    Step::Yield(self.helper.debounce_race())
                }
                other => {
                    return Err(SagaError::UnexpectedOutput {
                        effect: "race",
                        expected: "a race result",
                        got: format!("{other:?}"),
                    });
                }
            },
            (HelperKind::Throttle, State::Forking) => {
                self.state = State::Delaying;
                Step::Yield(effects::delay(self.helper.ms.unwrap_or(0)))
            }
            (_, State::Forking) => {
                if let Output::Task(task) = output {
                    self.last_task = Some(task);
                }
                self.take_next(None)
            }
            (_, State::Delaying) => {
                let channel = self.last_channel.clone();
                self.take_next(channel.as_ref())
            }
            (_, state) => {
                return Err(SagaError::new(format!(
                    "{} resumed in unexpected state {state:?}",
                    self.helper.kind
                )));
            }
        };
        Ok(step)
    }

    fn name(&self) -> &str {
        self.helper.kind.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn worker() -> Func {
        Func::value("worker", |_| Value::Null)
    }

    fn next(saga: &mut HelperSaga, output: Output) -> Effect {
        match saga.resume(Ok(output)).unwrap() {
            Step::Yield(effect) => effect,
            Step::Done(value) => panic!("helper finished with {value}"),
        }
    }

    #[test]
    fn take_every_loops_take_then_fork() {
        let worker = worker();
        let helper = effects::take_every("FOO", &worker, [json!(1)]);
        let mut saga = helper.as_helper().unwrap().expand();

        assert_eq!(next(&mut saga, Output::null()), effects::take("FOO"));
        let action = json!({"type": "FOO"});
        assert_eq!(
            next(&mut saga, action.clone().into()),
            effects::fork(&worker, [json!(1), action])
        );
        assert_eq!(next(&mut saga, Output::null()), effects::take("FOO"));
    }

    #[test]
    fn throttle_delays_after_fork() {
        let worker = worker();
        let helper = effects::throttle(100, "FOO", &worker, []);
        let mut saga = helper.as_helper().unwrap().expand();

        assert_eq!(
            next(&mut saga, Output::null()),
            effects::action_channel_with("FOO", Buffer::Sliding(1))
        );
        let channel = Channel::detached();
        assert_eq!(
            next(&mut saga, Output::Channel(channel.clone())),
            effects::take_channel(&channel)
        );
        assert_eq!(
            next(&mut saga, Output::null()),
            effects::fork(&worker, [Value::Null])
        );
        assert_eq!(next(&mut saga, Output::null()), effects::delay(100));
        assert_eq!(next(&mut saga, Output::null()), effects::take_channel(&channel));
    }

    #[test]
    fn debounce_restarts_race_on_new_action() {
        let worker = worker();
        let helper = effects::debounce(50, "FOO", &worker, []);
        let mut saga = helper.as_helper().unwrap().expand();

        next(&mut saga, Output::null());
        let race = next(&mut saga, json!({"type": "FOO", "n": 1}).into());
        assert_eq!(race.tag(), crate::EffectTag::Race);

        let again = next(
            &mut saga,
            Output::Race {
                winner: "latestAction".into(),
                value: Box::new(json!({"type": "FOO", "n": 2}).into()),
            },
        );
        assert_eq!(again, race);

        let fork = next(
            &mut saga,
            Output::Race {
                winner: "debounced".into(),
                value: Box::new(json!(true).into()),
            },
        );
        assert_eq!(fork, effects::fork(&worker, [json!({"type": "FOO", "n": 2})]));
    }

    #[test]
    fn errors_are_rethrown() {
        let helper = effects::take_every("FOO", &worker(), []);
        let mut saga = helper.as_helper().unwrap().expand();
        next(&mut saga, Output::null());
        assert_eq!(
            saga.resume(Err(SagaError::new("boom"))).unwrap_err(),
            SagaError::new("boom")
        );
    }

    #[test]
    fn display_includes_window() {
        let helper = effects::throttle(100, "FOO", &worker(), []);
        assert_eq!(helper.to_string(), "throttle(100, \"FOO\", worker, [])");
    }
}
