use std::{cell::RefCell, collections::HashMap, fmt, rc::Rc};

use crate::{
    Effect, Output, SagaError,
    monitoring::{EffectEvent, EffectId, SagaMonitor},
};

/// How a logged effect settled.
#[derive(Debug, Clone, PartialEq)]
pub enum EffectStatus {
    Pending,
    Resolved(Output),
    Rejected(SagaError),
    Cancelled,
}

/// One triggered effect.
#[derive(Debug, Clone)]
pub struct LoggedEffect {
    pub effect_id: EffectId,
    pub parent_id: Option<EffectId>,
    pub task_id: u64,
    pub effect: Effect,
    pub status: EffectStatus,
}

/// Monitor that keeps every triggered effect in order, with its status.
///
/// Clones share the same log, so keep one to query while the other is
/// registered.
///
/// ```ignore
/// let log = EffectLog::new();
/// let query = log.clone();
/// expect_saga(my_saga).with_monitor(log).run().await?;
///
/// let puts = query.effects().iter().filter(|e| e.effect.tag() == EffectTag::Put).count();
/// ```
#[derive(Clone, Default)]
pub struct EffectLog {
    inner: Rc<RefCell<EffectLogInner>>,
}

#[derive(Default)]
struct EffectLogInner {
    entries: Vec<LoggedEffect>,
    index: HashMap<EffectId, usize>,
}

impl EffectLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all logged effects in trigger order.
    pub fn effects(&self) -> Vec<LoggedEffect> {
        self.inner.borrow().entries.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the status of an effect, if it was logged.
    pub fn status(&self, effect_id: EffectId) -> Option<EffectStatus> {
        let inner = self.inner.borrow();
        inner
            .index
            .get(&effect_id)
            .map(|&i| inner.entries[i].status.clone())
    }

    fn settle(&self, effect_id: EffectId, status: EffectStatus) {
        let mut inner = self.inner.borrow_mut();
        if let Some(&i) = inner.index.get(&effect_id) {
            inner.entries[i].status = status;
        }
    }
}

impl fmt::Debug for EffectLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectLog").field("len", &self.len()).finish()
    }
}

impl SagaMonitor for EffectLog {
    fn effect_triggered(&self, event: &EffectEvent<'_>) {
        let mut inner = self.inner.borrow_mut();
        let position = inner.entries.len();
        inner.index.insert(event.effect_id, position);
        inner.entries.push(LoggedEffect {
            effect_id: event.effect_id,
            parent_id: event.parent_id,
            task_id: event.task.id(),
            effect: event.effect.clone(),
            status: EffectStatus::Pending,
        });
    }

    fn effect_resolved(&self, effect_id: EffectId, output: &Output) {
        self.settle(effect_id, EffectStatus::Resolved(output.clone()));
    }

    fn effect_rejected(&self, effect_id: EffectId, error: &SagaError) {
        self.settle(effect_id, EffectStatus::Rejected(error.clone()));
    }

    fn effect_cancelled(&self, effect_id: EffectId) {
        self.settle(effect_id, EffectStatus::Cancelled);
    }
}
