//! Partial effect matching for `*_like` assertions.

use std::{fmt, rc::Rc};

use serde_json::Value;

use crate::{
    Effect, Func, Pattern, Selector,
    effect::{ForkTarget, TakeSource},
    runtime::Buffer,
};

use super::json_match::is_match;

type MatchFn = Rc<dyn Fn(&Effect) -> bool>;

/// A named predicate over effects.
///
/// # Example
///
/// ```ignore
/// // From a partial description
/// let matcher = EffectMatcher::from(Like::func(&fetch_user).args([json!(1)]));
///
/// // From a custom predicate
/// let matcher = EffectMatcher::new("any put with a payload", |effect| match effect {
///     Effect::Put(put) => put.action.get("payload").is_some(),
///     _ => false,
/// });
/// ```
#[derive(Clone)]
pub struct EffectMatcher {
    description: String,
    matcher: MatchFn,
}

impl EffectMatcher {
    pub fn new<F>(description: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Effect) -> bool + 'static,
    {
        Self {
            description: description.into(),
            matcher: Rc::new(predicate),
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn matches(&self, effect: &Effect) -> bool {
        (self.matcher)(effect)
    }
}

impl fmt::Debug for EffectMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EffectMatcher").field(&self.description).finish()
    }
}

impl fmt::Display for EffectMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description)
    }
}

impl From<Like> for EffectMatcher {
    fn from(like: Like) -> Self {
        let description = like.to_string();
        EffectMatcher::new(description, move |effect| like.matches(effect))
    }
}

/// A partial effect description: unset fields match anything.
///
/// Actions and args compare partially, so `{"type": "DONE"}` is like any
/// `DONE` action whatever its payload. Setting a field the effect does not
/// carry (an action on a call, say) never matches.
#[derive(Clone, Default)]
pub struct Like {
    func: Option<Func>,
    context: Option<Value>,
    args: Option<Vec<Value>>,
    action: Option<Value>,
    pattern: Option<Pattern>,
    selector: Option<Selector>,
    buffer: Option<Buffer>,
    detached: Option<bool>,
}

impl Like {
    pub fn func(func: &Func) -> Self {
        Self::default().with_func(func)
    }

    pub fn action(action: Value) -> Self {
        Self::default().with_action(action)
    }

    pub fn pattern(pattern: impl Into<Pattern>) -> Self {
        Self::default().with_pattern(pattern)
    }

    pub fn selector(selector: &Selector) -> Self {
        Self {
            selector: Some(selector.clone()),
            ..Self::default()
        }
    }

    pub fn with_func(mut self, func: &Func) -> Self {
        self.func = Some(func.clone());
        self
    }

    pub fn with_action(mut self, action: Value) -> Self {
        self.action = Some(action);
        self
    }

    pub fn with_pattern(mut self, pattern: impl Into<Pattern>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    pub fn context(mut self, context: Value) -> Self {
        self.context = Some(context);
        self
    }

    pub fn args(mut self, args: impl IntoIterator<Item = Value>) -> Self {
        self.args = Some(args.into_iter().collect());
        self
    }

    pub fn buffer(mut self, buffer: Buffer) -> Self {
        self.buffer = Some(buffer);
        self
    }

    pub(crate) fn detached(mut self, detached: bool) -> Self {
        self.detached = Some(detached);
        self
    }

    pub fn matches(&self, effect: &Effect) -> bool {
        let fields = Fields::of(effect);
        check(&self.func, &fields.func, |want, got| want == got)
            && check(&self.context, &fields.context, |want, got| is_match(got, want))
            && check(&self.args, &fields.args, |want, got| {
                is_match(&Value::Array(got.clone()), &Value::Array(want.clone()))
            })
            && check(&self.action, &fields.action, |want, got| is_match(got, want))
            && check(&self.pattern, &fields.pattern, |want, got| want == got)
            && check(&self.selector, &fields.selector, |want, got| want == got)
            && check(&self.buffer, &fields.buffer, |want, got| want == got)
            && check(&self.detached, &fields.detached, |want, got| want == got)
    }
}

/// An unset expectation matches; a set one needs the field to be present.
fn check<T>(want: &Option<T>, got: &Option<T>, same: impl Fn(&T, &T) -> bool) -> bool {
    match (want, got) {
        (None, _) => true,
        (Some(want), Some(got)) => same(want, got),
        (Some(_), None) => false,
    }
}

#[derive(Default)]
struct Fields {
    func: Option<Func>,
    context: Option<Value>,
    args: Option<Vec<Value>>,
    action: Option<Value>,
    pattern: Option<Pattern>,
    selector: Option<Selector>,
    buffer: Option<Buffer>,
    detached: Option<bool>,
}

impl Fields {
    fn of(effect: &Effect) -> Self {
        match effect {
            Effect::Take(take) => Self {
                pattern: match &take.source {
                    TakeSource::Pattern(pattern) => Some(pattern.clone()),
                    TakeSource::Channel(_) => None,
                },
                ..Self::default()
            },
            Effect::Put(put) => Self {
                action: Some(put.action.clone()),
                ..Self::default()
            },
            Effect::Call(call) | Effect::Cps(call) => Self {
                func: Some(call.func.clone()),
                context: call.context.clone(),
                args: Some(call.args.clone()),
                ..Self::default()
            },
            Effect::Fork(fork) => match &fork.target {
                ForkTarget::Func(func) => Self {
                    func: Some(func.clone()),
                    context: fork.context.clone(),
                    args: Some(fork.args.clone()),
                    detached: Some(fork.detached),
                    ..Self::default()
                },
                ForkTarget::Helper(helper) => Self {
                    func: Some(helper.worker.clone()),
                    args: Some(helper.args.clone()),
                    pattern: Some(helper.pattern.clone()),
                    detached: Some(fork.detached),
                    ..Self::default()
                },
            },
            Effect::Select(select) => Self {
                selector: select.selector.clone(),
                args: Some(select.args.clone()),
                ..Self::default()
            },
            Effect::ActionChannel(ac) => Self {
                pattern: Some(ac.pattern.clone()),
                buffer: Some(ac.buffer.clone()),
                ..Self::default()
            },
            _ => Self::default(),
        }
    }
}

impl fmt::Display for Like {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(func) = &self.func {
            parts.push(format!("fn: {func}"));
        }
        if let Some(context) = &self.context {
            parts.push(format!("context: {context}"));
        }
        if let Some(args) = &self.args {
            parts.push(format!("args: {}", Value::Array(args.clone())));
        }
        if let Some(action) = &self.action {
            parts.push(format!("action: {action}"));
        }
        if let Some(pattern) = &self.pattern {
            parts.push(format!("pattern: {pattern}"));
        }
        if let Some(selector) = &self.selector {
            parts.push(format!("selector: {}", selector.name()));
        }
        if let Some(buffer) = &self.buffer {
            parts.push(format!("buffer: {buffer}"));
        }
        if let Some(detached) = self.detached {
            parts.push(format!("detached: {detached}"));
        }
        write!(f, "like {{ {} }}", parts.join(", "))
    }
}

impl fmt::Debug for Like {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
