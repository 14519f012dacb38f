use crate::{
    Output, SagaError,
    monitoring::{EffectEvent, EffectId, SagaMonitor},
};

/// A monitor that logs the effect lifecycle to the `tracing` crate.
///
/// Provides visibility into a saga run without custom code. Log levels:
/// - `trace` - effect resolved/cancelled (high volume)
/// - `debug` - effect triggered
/// - `warn` - effect rejected
///
/// # Example
///
/// ```ignore
/// use sagaplan::monitors::Tracer;
///
/// expect_saga(my_saga).with_monitor(Tracer).run().await?;
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct Tracer;

impl SagaMonitor for Tracer {
    fn effect_triggered(&self, event: &EffectEvent<'_>) {
        tracing::debug!(
            effect_id = event.effect_id,
            parent_id = ?event.parent_id,
            task = %event.task,
            tag = %event.effect.tag(),
            effect = %event.effect,
            "effect triggered"
        );
    }

    fn effect_resolved(&self, effect_id: EffectId, output: &Output) {
        tracing::trace!(effect_id, output = ?output, "effect resolved");
    }

    fn effect_rejected(&self, effect_id: EffectId, error: &SagaError) {
        tracing::warn!(effect_id, error = %error, "effect rejected");
    }

    fn effect_cancelled(&self, effect_id: EffectId) {
        tracing::trace!(effect_id, "effect cancelled");
    }
}
