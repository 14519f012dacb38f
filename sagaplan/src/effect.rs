use std::fmt;

use futures_util::future::Shared;
use serde_json::Value;

use crate::{
    EffectTag, Func, Output, Pattern, Selector,
    func::CallFuture,
    helper::HelperEffect,
    runtime::{Buffer, Channel, Task},
};

/// A descriptor of a side effect requested by a saga.
///
/// Effects are plain data: the runtime interprets them, the harness records
/// and compares them. Build them with the constructors in
/// [`effects`](crate::effects) or the [`Co`](crate::Co) methods.
#[derive(Clone, Debug, PartialEq)]
pub enum Effect {
    Take(TakeEffect),
    Put(PutEffect),
    Call(CallEffect),
    Cps(CallEffect),
    Fork(ForkEffect),
    Select(SelectEffect),
    Race(RaceEffect),
    Parallel(Vec<Effect>),
    ActionChannel(ActionChannelEffect),
    Promise(PromiseEffect),
    /// Cancel a task, or the current task when `None`.
    Cancel(Option<Task>),
    Cancelled,
    Join(Task),
    Flush(Channel),
    /// A non-effect value. Resumes the saga with the value itself.
    Plain(Output),
}

#[derive(Clone, Debug, PartialEq)]
pub enum TakeSource {
    Pattern(Pattern),
    Channel(Channel),
}

#[derive(Clone, Debug, PartialEq)]
pub struct TakeEffect {
    pub source: TakeSource,
    /// `takeMaybe`: resolve with `null` instead of terminating when the
    /// channel closes.
    pub maybe: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PutEffect {
    pub action: Value,
    /// `putResolve`: wait for the dispatch to settle.
    pub resolve: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CallEffect {
    pub func: Func,
    /// The `this` context of `apply`.
    pub context: Option<Value>,
    pub args: Vec<Value>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ForkTarget {
    Func(Func),
    Helper(HelperEffect),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ForkEffect {
    pub target: ForkTarget,
    pub context: Option<Value>,
    pub args: Vec<Value>,
    /// `spawn`: the child is not attached to the parent.
    pub detached: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SelectEffect {
    /// `None` selects the whole state.
    pub selector: Option<Selector>,
    pub args: Vec<Value>,
}

/// Keyed race branches, in declaration order.
#[derive(Clone, Debug, PartialEq)]
pub struct RaceEffect {
    pub branches: Vec<(String, Effect)>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ActionChannelEffect {
    pub pattern: Pattern,
    pub buffer: Buffer,
}

/// An in-flight future yielded by a saga. Compared by id.
#[derive(Clone)]
pub struct PromiseEffect {
    pub(crate) id: u64,
    pub(crate) future: Shared<CallFuture>,
}

impl PromiseEffect {
    pub(crate) fn new(future: CallFuture) -> Self {
        use futures_util::FutureExt;
        use std::sync::atomic::{AtomicU64, Ordering};

        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            future: future.shared(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

impl PartialEq for PromiseEffect {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl fmt::Debug for PromiseEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Promise(#{})", self.id)
    }
}

impl Effect {
    pub fn tag(&self) -> EffectTag {
        match self {
            Effect::Take(_) => EffectTag::Take,
            Effect::Put(_) => EffectTag::Put,
            Effect::Call(_) => EffectTag::Call,
            Effect::Cps(_) => EffectTag::Cps,
            Effect::Fork(_) => EffectTag::Fork,
            Effect::Select(_) => EffectTag::Select,
            Effect::Race(_) => EffectTag::Race,
            Effect::Parallel(_) => EffectTag::Parallel,
            Effect::ActionChannel(_) => EffectTag::ActionChannel,
            Effect::Promise(_) => EffectTag::Promise,
            Effect::Cancel(_) => EffectTag::Cancel,
            Effect::Cancelled => EffectTag::Cancelled,
            Effect::Join(_) => EffectTag::Join,
            Effect::Flush(_) => EffectTag::Flush,
            Effect::Plain(_) => EffectTag::None,
        }
    }

    /// Returns the helper behind a helper fork (`takeEvery`, `throttle`, ...).
    pub fn as_helper(&self) -> Option<&HelperEffect> {
        match self {
            Effect::Fork(ForkEffect {
                target: ForkTarget::Helper(helper),
                ..
            }) => Some(helper),
            _ => None,
        }
    }

    /// Returns the forked function of a plain (non-helper) fork.
    pub(crate) fn as_fork_fn(&self) -> Option<&ForkEffect> {
        match self {
            Effect::Fork(fork @ ForkEffect {
                target: ForkTarget::Func(_),
                ..
            }) => Some(fork),
            _ => None,
        }
    }

    pub fn is_parallel(&self) -> bool {
        matches!(self, Effect::Parallel(_))
    }
}

fn json(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| value.to_string())
}

fn json_list(values: &[Value]) -> String {
    let items: Vec<String> = values.iter().map(json).collect();
    format!("[{}]", items.join(", "))
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Effect::Take(take) => {
                let name = if take.maybe { "takeMaybe" } else { "take" };
                match &take.source {
                    TakeSource::Pattern(pattern) => write!(f, "{name}({pattern})"),
                    TakeSource::Channel(channel) => write!(f, "{name}({channel})"),
                }
            }
            Effect::Put(put) => {
                let name = if put.resolve { "putResolve" } else { "put" };
                write!(f, "{name}({})", json(&put.action))
            }
            Effect::Call(call) => match &call.context {
                Some(context) => write!(
                    f,
                    "apply({}, {}, {})",
                    json(context),
                    call.func,
                    json_list(&call.args)
                ),
                None => write!(f, "call({}, {})", call.func, json_list(&call.args)),
            },
            Effect::Cps(call) => write!(f, "cps({}, {})", call.func, json_list(&call.args)),
            Effect::Fork(fork) => match &fork.target {
                ForkTarget::Helper(helper) => write!(f, "{helper}"),
                ForkTarget::Func(func) => {
                    let name = if fork.detached { "spawn" } else { "fork" };
                    write!(f, "{name}({func}, {})", json_list(&fork.args))
                }
            },
            Effect::Select(select) => match &select.selector {
                Some(selector) => {
                    write!(f, "select({}, {})", selector.name(), json_list(&select.args))
                }
                None => write!(f, "select()"),
            },
            Effect::Race(race) => {
                write!(f, "race({{")?;
                for (i, (key, effect)) in race.branches.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key:?}: {effect}")?;
                }
                write!(f, "}})")
            }
            Effect::Parallel(effects) => {
                write!(f, "all([")?;
                for (i, effect) in effects.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{effect}")?;
                }
                write!(f, "])")
            }
            Effect::ActionChannel(ac) => write!(f, "actionChannel({}, {})", ac.pattern, ac.buffer),
            Effect::Promise(promise) => write!(f, "promise(#{})", promise.id),
            Effect::Cancel(Some(task)) => write!(f, "cancel({task})"),
            Effect::Cancel(None) => write!(f, "cancel(@@SELF)"),
            Effect::Cancelled => write!(f, "cancelled()"),
            Effect::Join(task) => write!(f, "join({task})"),
            Effect::Flush(channel) => write!(f, "flush({channel})"),
            Effect::Plain(output) => write!(f, "{}", json(&output.clone().into_value())),
        }
    }
}

/// One mismatching field between two effects of the same tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDiff {
    pub field: &'static str,
    pub expected: String,
    pub actual: String,
}

impl fmt::Display for FieldDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: expected {}, actual {}",
            self.field, self.expected, self.actual
        )
    }
}

fn push_diff<T: PartialEq>(
    out: &mut Vec<FieldDiff>,
    field: &'static str,
    expected: &T,
    actual: &T,
    show: impl Fn(&T) -> String,
) {
    if expected != actual {
        out.push(FieldDiff {
            field,
            expected: show(expected),
            actual: show(actual),
        });
    }
}

fn show_context(context: &Option<Value>) -> String {
    context.as_ref().map(json).unwrap_or_else(|| "none".into())
}

/// Lists the fields in which `actual` differs from `expected`.
///
/// Effects with different tags differ as a whole and yield a single `type`
/// entry.
pub fn diff_effects(actual: &Effect, expected: &Effect) -> Vec<FieldDiff> {
    let mut out = Vec::new();
    match (expected, actual) {
        (Effect::Take(e), Effect::Take(a)) => {
            push_diff(&mut out, "pattern", &e.source, &a.source, |s| match s {
                TakeSource::Pattern(p) => p.to_string(),
                TakeSource::Channel(c) => c.to_string(),
            });
            push_diff(&mut out, "maybe", &e.maybe, &a.maybe, bool::to_string);
        }
        (Effect::Put(e), Effect::Put(a)) => {
            push_diff(&mut out, "action", &e.action, &a.action, json);
            push_diff(&mut out, "resolve", &e.resolve, &a.resolve, bool::to_string);
        }
        (Effect::Call(e), Effect::Call(a)) | (Effect::Cps(e), Effect::Cps(a)) => {
            push_diff(&mut out, "func", &e.func, &a.func, Func::to_string);
            push_diff(&mut out, "context", &e.context, &a.context, show_context);
            push_diff(&mut out, "args", &e.args, &a.args, |v| json_list(v));
        }
        (Effect::Fork(e), Effect::Fork(a)) => {
            push_diff(&mut out, "fn", &e.target, &a.target, |t| match t {
                ForkTarget::Func(func) => func.to_string(),
                ForkTarget::Helper(helper) => helper.to_string(),
            });
            push_diff(&mut out, "context", &e.context, &a.context, show_context);
            push_diff(&mut out, "args", &e.args, &a.args, |v| json_list(v));
            push_diff(&mut out, "detached", &e.detached, &a.detached, bool::to_string);
        }
        (Effect::Select(e), Effect::Select(a)) => {
            push_diff(&mut out, "selector", &e.selector, &a.selector, |s| {
                s.as_ref().map_or_else(|| "identity".into(), |s| s.name().to_string())
            });
            push_diff(&mut out, "args", &e.args, &a.args, |v| json_list(v));
        }
        (Effect::ActionChannel(e), Effect::ActionChannel(a)) => {
            push_diff(&mut out, "pattern", &e.pattern, &a.pattern, Pattern::to_string);
            push_diff(&mut out, "buffer", &e.buffer, &a.buffer, Buffer::to_string);
        }
        (e, a) if e.tag() != a.tag() => out.push(FieldDiff {
            field: "type",
            expected: e.tag().to_string(),
            actual: a.tag().to_string(),
        }),
        (e, a) => push_diff(&mut out, "payload", e, a, Effect::to_string),
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects;
    use serde_json::json;

    #[test]
    fn display_follows_effect_creator_syntax() {
        let fetch = Func::value("fetchUser", |_| Value::Null);
        assert_eq!(effects::take("FOO").to_string(), "take(\"FOO\")");
        assert_eq!(
            effects::put(json!({"type": "DONE"})).to_string(),
            "put({\"type\":\"DONE\"})"
        );
        assert_eq!(
            effects::call(&fetch, [json!(1), json!("a")]).to_string(),
            "call(fetchUser, [1, \"a\"])"
        );
        assert_eq!(effects::spawn(&fetch, []).to_string(), "spawn(fetchUser, [])");
    }

    #[test]
    fn diff_names_mismatched_args() {
        let fetch = Func::value("fetchUser", |_| Value::Null);
        let expected = effects::call(&fetch, [json!(1), json!(3)]);
        let actual = effects::call(&fetch, [json!(1), json!(2)]);
        let diff = diff_effects(&actual, &expected);
        assert_eq!(diff.len(), 1);
        assert_eq!(diff[0].field, "args");
        assert_eq!(diff[0].to_string(), "args: expected [1, 3], actual [1, 2]");
    }

    #[test]
    fn diff_of_different_tags_is_type() {
        let diff = diff_effects(&effects::take("FOO"), &effects::put(json!({"type": "FOO"})));
        assert_eq!(diff[0].field, "type");
        assert_eq!(diff[0].expected, "PUT");
    }

    #[test]
    fn helper_forks_are_detected() {
        let worker = Func::value("worker", |_| Value::Null);
        let every = effects::take_every("FOO", &worker, []);
        assert!(every.as_helper().is_some());
        assert!(effects::fork(&worker, []).as_helper().is_none());
        assert_eq!(every.tag(), EffectTag::Fork);
    }
}
