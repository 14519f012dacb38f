use std::{
    cell::RefCell,
    collections::{HashMap, HashSet, VecDeque},
    rc::{Rc, Weak},
    time::Duration,
};

use serde_json::Value;
use tokio::sync::mpsc;

use crate::{
    Effect, Output, Pattern, SagaError, Store,
    effect::TakeSource,
    monitoring::{EffectEvent, EffectId, SagaMonitor},
    runtime::Task,
    store::Listener,
};

use super::{EffectStores, Providers, wait_set::WaitSet};

pub(crate) type Reducer = Rc<dyn Fn(&Value, &Value) -> Value>;

/// Type of the action a reducer sees when no initial state is given.
pub const INIT_ACTION_TYPE: &str = "@@sagaplan/INIT";

/// An action dispatched before the run started.
#[derive(Debug, Clone)]
pub(crate) struct QueuedAction {
    pub(crate) action: Value,
    pub(crate) delay: Option<Duration>,
}

struct Delivery {
    action: Value,
    delay: Option<Duration>,
    notify: bool,
}

pub(crate) struct HarnessSetup {
    pub(crate) state: Value,
    pub(crate) reducer: Option<Reducer>,
    pub(crate) providers: Providers,
    pub(crate) queued: Vec<QueuedAction>,
}

/// The simulated environment a saga runs against under
/// [`ExpectSaga`](super::ExpectSaga).
///
/// It is the store the runtime dispatches to and one of its monitors: every
/// triggered effect lands in the per-tag [`EffectStores`], takes release
/// queued actions, and forks and promises join the wait-set that decides
/// when the run is over.
///
/// All deliveries go through one ordered queue, so actions apply in the
/// order they were dispatched even when some are delayed.
pub(crate) struct Harness {
    stores: RefCell<EffectStores>,
    queued: RefCell<VecDeque<QueuedAction>>,
    listeners: RefCell<Vec<Listener>>,
    state: RefCell<Value>,
    reducer: Option<Reducer>,
    pub(crate) providers: Providers,
    outstanding_forks: RefCell<HashSet<EffectId>>,
    outstanding_action_channels: RefCell<HashMap<EffectId, Pattern>>,
    channels_to_patterns: RefCell<HashMap<u64, Pattern>>,
    forked_tasks: RefCell<Vec<Task>>,
    pub(crate) wait_set: WaitSet,
    deliveries: mpsc::UnboundedSender<Delivery>,
}

impl Harness {
    /// Must be called within a `LocalSet`: the delivery loop is spawned here.
    pub(crate) fn new(setup: HarnessSetup) -> Rc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let harness = Rc::new(Self {
            stores: RefCell::new(EffectStores::default()),
            queued: RefCell::new(setup.queued.into()),
            listeners: RefCell::new(Vec::new()),
            state: RefCell::new(setup.state),
            reducer: setup.reducer,
            providers: setup.providers,
            outstanding_forks: RefCell::new(HashSet::new()),
            outstanding_action_channels: RefCell::new(HashMap::new()),
            channels_to_patterns: RefCell::new(HashMap::new()),
            forked_tasks: RefCell::new(Vec::new()),
            wait_set: WaitSet::new(),
            deliveries: tx,
        });
        tokio::task::spawn_local(deliver(Rc::downgrade(&harness), rx));
        harness
    }

    /// Queue `action` for delivery. Delivery runs the reducer and, when
    /// `notify` is set, the store listeners.
    pub(crate) fn send(&self, action: Value, delay: Option<Duration>, notify: bool) {
        self.wait_set.enter();
        let delivery = Delivery {
            action,
            delay,
            notify,
        };
        if self.deliveries.send(delivery).is_err() {
            self.wait_set.exit();
        }
    }

    fn apply(&self, action: &Value, notify: bool) {
        if let Some(reducer) = &self.reducer {
            let next = reducer(&self.state.borrow(), action);
            *self.state.borrow_mut() = next;
        }
        tracing::trace!(action = %action, notify, "action applied");
        if notify {
            let listeners = self.listeners.borrow().clone();
            for listener in listeners {
                listener(action);
            }
        }
    }

    /// Records `effect` in its tag's store and reacts to it. Synthetic
    /// records (provided or pre-expanded effects) carry no effect id.
    pub(crate) fn process_effect(&self, effect: &Effect, effect_id: Option<EffectId>) {
        match self.stores.borrow_mut().get_mut(effect.tag()) {
            Some(store) => store.add(effect.clone()),
            None => return,
        }

        match effect {
            Effect::Fork(_) => {
                if let Some(id) = effect_id {
                    self.outstanding_forks.borrow_mut().insert(id);
                }
            }
            Effect::Take(take) => {
                let pattern = match &take.source {
                    TakeSource::Pattern(pattern) => Some(pattern.clone()),
                    TakeSource::Channel(channel) => {
                        self.channels_to_patterns.borrow().get(&channel.id()).cloned()
                    }
                };
                if let Some(pattern) = pattern {
                    self.release_queued(&pattern);
                }
            }
            Effect::ActionChannel(ac) => {
                if let Some(id) = effect_id {
                    self.outstanding_action_channels
                        .borrow_mut()
                        .insert(id, ac.pattern.clone());
                }
            }
            Effect::Promise(promise) => self.wait_set.register(promise.future.clone()),
            _ => {}
        }
    }

    /// Delivers queued actions up to and including the first one matching
    /// `pattern`. Only the last one notifies listeners; the rest just run
    /// through the reducer.
    fn release_queued(&self, pattern: &Pattern) {
        let batch: Vec<QueuedAction> = {
            let mut queued = self.queued.borrow_mut();
            match queued.iter().position(|q| pattern.matches(&q.action)) {
                Some(index) => queued.drain(..=index).collect(),
                None => return,
            }
        };
        tracing::debug!(pattern = %pattern, released = batch.len(), "releasing queued actions");
        let last = batch.len() - 1;
        for (i, queued) in batch.into_iter().enumerate() {
            self.send(queued.action, queued.delay, i == last);
        }
    }

    fn add_forked_task(&self, task: Task) {
        self.forked_tasks.borrow_mut().push(task.clone());
        self.wait_set.register(async move {
            task.done().await;
        });
    }

    pub(crate) fn stores(&self) -> EffectStores {
        self.stores.borrow().clone()
    }

    pub(crate) fn forked_tasks(&self) -> Vec<Task> {
        self.forked_tasks.borrow().clone()
    }
}

async fn deliver(harness: Weak<Harness>, mut deliveries: mpsc::UnboundedReceiver<Delivery>) {
    while let Some(delivery) = deliveries.recv().await {
        if let Some(delay) = delivery.delay {
            tokio::time::sleep(delay).await;
        }
        let Some(harness) = harness.upgrade() else {
            break;
        };
        harness.apply(&delivery.action, delivery.notify);
        harness.wait_set.exit();
    }
}

impl Store for Harness {
    fn dispatch(&self, action: Value) {
        self.apply(&action, true);
    }

    fn state(&self) -> Value {
        self.state.borrow().clone()
    }

    fn subscribe(&self, listener: Listener) {
        self.listeners.borrow_mut().push(listener);
    }
}

impl SagaMonitor for Harness {
    fn effect_triggered(&self, event: &EffectEvent<'_>) {
        self.process_effect(event.effect, Some(event.effect_id));
    }

    fn effect_resolved(&self, effect_id: EffectId, output: &Output) {
        if self.outstanding_forks.borrow_mut().remove(&effect_id) {
            if let Output::Task(task) = output {
                self.add_forked_task(task.clone());
            }
            return;
        }
        let pattern = self.outstanding_action_channels.borrow_mut().remove(&effect_id);
        if let (Some(pattern), Output::Channel(channel)) = (pattern, output) {
            self.channels_to_patterns
                .borrow_mut()
                .insert(channel.id(), pattern);
        }
    }

    fn effect_rejected(&self, effect_id: EffectId, _error: &SagaError) {
        self.outstanding_forks.borrow_mut().remove(&effect_id);
        self.outstanding_action_channels.borrow_mut().remove(&effect_id);
    }

    fn effect_cancelled(&self, effect_id: EffectId) {
        self.outstanding_forks.borrow_mut().remove(&effect_id);
        self.outstanding_action_channels.borrow_mut().remove(&effect_id);
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use serde_json::json;
    use tokio::task::LocalSet;

    use super::*;
    use crate::{
        effects,
        runtime::{Buffer, Channel},
    };

    fn counting_harness(queued: &[&str]) -> (Rc<Harness>, Rc<Cell<usize>>) {
        let reductions = Rc::new(Cell::new(0));
        let seen = reductions.clone();
        let reducer: Reducer = Rc::new(move |state, action| {
            seen.set(seen.get() + 1);
            let mut log = state.as_array().cloned().unwrap_or_default();
            log.push(action["type"].clone());
            Value::Array(log)
        });
        let harness = Harness::new(HarnessSetup {
            state: json!([]),
            reducer: Some(reducer),
            providers: Providers::new(),
            queued: queued
                .iter()
                .map(|t| QueuedAction {
                    action: json!({"type": t}),
                    delay: None,
                })
                .collect(),
        });
        (harness, reductions)
    }

    #[tokio::test]
    async fn take_releases_queue_up_to_first_match() {
        LocalSet::new()
            .run_until(async {
                let (harness, reductions) = counting_harness(&["A", "B", "C", "D"]);
                let notified = Rc::new(RefCell::new(Vec::new()));
                let log = notified.clone();
                harness.subscribe(Rc::new(move |action: &Value| {
                    log.borrow_mut().push(action["type"].clone());
                }));

                harness.process_effect(&effects::take("C"), Some(1));
                harness.wait_set.idle().await;

                assert_eq!(reductions.get(), 3);
                assert_eq!(*notified.borrow(), vec![json!("C")]);
                assert_eq!(harness.state(), json!(["A", "B", "C"]));
                assert_eq!(harness.queued.borrow().len(), 1);
                assert_eq!(harness.stores().take.len(), 1);
            })
            .await;
    }

    #[tokio::test]
    async fn delayed_deliveries_keep_dispatch_order() {
        LocalSet::new()
            .run_until(async {
                let (harness, _) = counting_harness(&[]);
                harness.send(json!({"type": "SLOW"}), Some(Duration::from_millis(10)), true);
                harness.send(json!({"type": "FAST"}), None, true);
                assert_eq!(harness.wait_set.pending(), 2);

                harness.wait_set.idle().await;
                assert_eq!(harness.state(), json!(["SLOW", "FAST"]));
            })
            .await;
    }

    #[tokio::test]
    async fn channel_take_releases_by_the_channel_pattern() {
        LocalSet::new()
            .run_until(async {
                let (harness, reductions) = counting_harness(&["OTHER", "REQ", "LATER"]);
                let notified = Rc::new(RefCell::new(Vec::new()));
                let log = notified.clone();
                harness.subscribe(Rc::new(move |action: &Value| {
                    log.borrow_mut().push(action["type"].clone());
                }));

                let channel = Channel::new(Buffer::None);
                harness.process_effect(&effects::action_channel("REQ"), Some(1));
                harness.effect_resolved(1, &Output::Channel(channel.clone()));
                assert!(harness.outstanding_action_channels.borrow().is_empty());

                harness.process_effect(&effects::take_channel(&channel), Some(2));
                harness.wait_set.idle().await;

                assert_eq!(reductions.get(), 2);
                assert_eq!(harness.state(), json!(["OTHER", "REQ"]));
                assert_eq!(*notified.borrow(), vec![json!("REQ")]);
                assert_eq!(harness.queued.borrow().len(), 1);
            })
            .await;
    }

    #[tokio::test]
    async fn take_on_an_unknown_channel_releases_nothing() {
        LocalSet::new()
            .run_until(async {
                let (harness, reductions) = counting_harness(&["REQ"]);
                harness.process_effect(&effects::take_channel(&Channel::detached()), Some(1));
                harness.wait_set.idle().await;
                assert_eq!(reductions.get(), 0);
                assert_eq!(harness.queued.borrow().len(), 1);
            })
            .await;
    }

    #[tokio::test]
    async fn unrecorded_tags_are_ignored() {
        LocalSet::new()
            .run_until(async {
                let (harness, _) = counting_harness(&["A"]);
                harness.process_effect(&effects::cancelled(), None);
                harness.process_effect(&effects::take("NOPE"), None);
                assert_eq!(harness.queued.borrow().len(), 1);
                assert_eq!(harness.stores().take.len(), 1);
            })
            .await;
    }
}
