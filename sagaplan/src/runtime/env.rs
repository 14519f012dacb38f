use std::{
    cell::{Cell, RefCell},
    rc::{Rc, Weak},
};

use serde_json::Value;
use tokio::sync::oneshot;

use crate::{
    Effect, Output, Pattern, SagaError, Store,
    monitoring::{EffectEvent, EffectId, SagaMonitor},
    runtime::{Channel, Task, channel::ChannelInner},
};

struct Taker {
    pattern: Pattern,
    tx: oneshot::Sender<Value>,
}

/// Shared state of one runtime instance: the store, the monitors, and the
/// sagas currently waiting for actions.
pub(crate) struct Env {
    pub(crate) store: Rc<dyn Store>,
    monitors: Vec<Rc<dyn SagaMonitor>>,
    next_effect_id: Cell<EffectId>,
    next_task_id: Cell<u64>,
    takers: RefCell<Vec<Taker>>,
    channels: RefCell<Vec<(Pattern, Weak<ChannelInner>)>>,
}

impl Env {
    /// Creates the environment and subscribes it to the store.
    pub(crate) fn new(store: Rc<dyn Store>, monitors: Vec<Rc<dyn SagaMonitor>>) -> Rc<Self> {
        let env = Rc::new(Self {
            store: store.clone(),
            monitors,
            next_effect_id: Cell::new(1),
            next_task_id: Cell::new(1),
            takers: RefCell::new(Vec::new()),
            channels: RefCell::new(Vec::new()),
        });
        let weak = Rc::downgrade(&env);
        store.subscribe(Rc::new(move |action: &Value| {
            if let Some(env) = weak.upgrade() {
                env.emit(action);
            }
        }));
        env
    }

    pub(crate) fn next_effect_id(&self) -> EffectId {
        let id = self.next_effect_id.get();
        self.next_effect_id.set(id + 1);
        id
    }

    pub(crate) fn next_task_id(&self) -> u64 {
        let id = self.next_task_id.get();
        self.next_task_id.set(id + 1);
        id
    }

    /// Wait for the next action matching `pattern`.
    ///
    /// The taker is registered immediately, so an action emitted before the
    /// receiver is first polled is not lost.
    pub(crate) fn take(&self, pattern: Pattern) -> oneshot::Receiver<Value> {
        let (tx, rx) = oneshot::channel();
        self.takers.borrow_mut().push(Taker { pattern, tx });
        rx
    }

    /// Feed actions matching `pattern` into `channel` for as long as it lives.
    pub(crate) fn connect(&self, pattern: Pattern, channel: &Channel) {
        self.channels.borrow_mut().push((pattern, channel.downgrade()));
    }

    /// Deliver a dispatched action to action channels and waiting takers.
    pub(crate) fn emit(&self, action: &Value) {
        let connected: Vec<Channel> = {
            let mut channels = self.channels.borrow_mut();
            channels.retain(|(_, weak)| weak.strong_count() > 0);
            channels
                .iter()
                .filter(|(pattern, _)| pattern.matches(action))
                .filter_map(|(_, weak)| Channel::upgrade(weak))
                .collect()
        };
        for channel in connected {
            channel.put(action.clone());
        }

        let waiting = std::mem::take(&mut *self.takers.borrow_mut());
        let (matched, rest): (Vec<_>, Vec<_>) = waiting
            .into_iter()
            .filter(|taker| !taker.tx.is_closed())
            .partition(|taker| taker.pattern.matches(action));
        self.takers.borrow_mut().extend(rest);

        tracing::trace!(action = %action, takers = matched.len(), "action emitted");
        for taker in matched {
            let _ = taker.tx.send(action.clone());
        }
    }

    pub(crate) fn effect_triggered(
        &self,
        effect_id: EffectId,
        parent_id: Option<EffectId>,
        task: &Task,
        effect: &Effect,
    ) {
        let event = EffectEvent {
            effect_id,
            parent_id,
            task,
            effect,
        };
        for monitor in &self.monitors {
            monitor.effect_triggered(&event);
        }
    }

    pub(crate) fn effect_settled(&self, effect_id: EffectId, result: &Result<Output, SagaError>) {
        for monitor in &self.monitors {
            match result {
                Ok(output) => monitor.effect_resolved(effect_id, output),
                Err(error) => monitor.effect_rejected(effect_id, error),
            }
        }
    }

    pub(crate) fn effect_cancelled(&self, effect_id: EffectId) {
        for monitor in &self.monitors {
            monitor.effect_cancelled(effect_id);
        }
    }
}
