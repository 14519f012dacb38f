use crate::{Effect, Output, SagaError, runtime::Task};

/// Identifier the runtime assigns to every effect it digests.
pub type EffectId = u64;

/// An effect the runtime is about to run.
#[derive(Debug, Clone, Copy)]
pub struct EffectEvent<'a> {
    pub effect_id: EffectId,
    /// The race or parallel effect this one is a branch of.
    pub parent_id: Option<EffectId>,
    pub task: &'a Task,
    pub effect: &'a Effect,
}

/// Trait for observing effects as the runtime processes them.
///
/// All methods have default no-op implementations, so you only need to
/// override the ones you care about.
///
/// # Example
///
/// ```rust
/// use sagaplan::monitoring::{EffectEvent, SagaMonitor};
///
/// struct EffectLogger;
///
/// impl SagaMonitor for EffectLogger {
///     fn effect_triggered(&self, event: &EffectEvent<'_>) {
///         println!("[{}] {} yielded {}", event.effect_id, event.task, event.effect);
///     }
/// }
/// ```
///
/// # Effect Lifecycle
///
/// 1. **Triggered** - the saga yielded the effect and the runtime starts it
/// 2. **Resolved** / **Rejected** - the effect produced a result or an error
/// 3. **Cancelled** - instead of 2, when the task was cancelled or the
///    effect lost a race
pub trait SagaMonitor {
    /// Called before the runtime runs an effect.
    fn effect_triggered(&self, event: &EffectEvent<'_>) {
        let _e = event;
    }

    /// Called when an effect resolved. For `fork` the output is the task.
    fn effect_resolved(&self, effect_id: EffectId, output: &Output) {
        let _i = effect_id;
        let _o = output;
    }

    fn effect_rejected(&self, effect_id: EffectId, error: &SagaError) {
        let _i = effect_id;
        let _e = error;
    }

    fn effect_cancelled(&self, effect_id: EffectId) {
        let _i = effect_id;
    }
}
