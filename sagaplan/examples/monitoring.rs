use sagaplan::{
    monitoring::{EffectEvent, EffectId, SagaMonitor},
    monitors::Tracer,
    *,
};
use serde_json::{Value, json};

// Custom monitor demonstrating the SagaMonitor trait.
// For simple tracing, consider using `sagaplan::monitors::Tracer` instead.
struct Printer;

impl SagaMonitor for Printer {
    fn effect_triggered(&self, event: &EffectEvent<'_>) {
        println!("#{} {} yielded {}", event.effect_id, event.task, event.effect);
    }

    fn effect_resolved(&self, effect_id: EffectId, output: &Output) {
        println!("#{effect_id} resolved with {output:?}");
    }

    fn effect_rejected(&self, effect_id: EffectId, error: &SagaError) {
        eprintln!("#{effect_id} rejected: {error}");
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let greeter = saga(|co| async move {
        let action = co.take("HELLO").await?;
        co.delay(10).await?;
        co.put(json!({ "type": "GREETED", "name": action["name"] })).await?;
        Ok(Value::Null)
    })
    .named("greeter");

    let result = expect_saga(greeter)
        .with_monitor(Printer)
        .with_monitor(Tracer)
        .dispatch(json!({ "type": "HELLO", "name": "World" }))
        .put(json!({ "type": "GREETED", "name": "World" }))
        .run()
        .await?;

    println!("timed out: {}", result.timed_out);
    Ok(())
}
