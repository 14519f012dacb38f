use sagaplan::{
    testing::{Providers, throw_error},
    *,
};
use serde_json::{Value, json};

// The saga under test: waits for a request, fetches the user and reports
// the outcome to the store.
fn load_user(fetch_user: Func) -> AsyncSaga {
    saga(move |co| async move {
        let request = co.take("LOAD_USER").await?;
        match co.call(&fetch_user, [request["id"].clone()]).await {
            Ok(user) => co.put(json!({ "type": "USER_LOADED", "user": user })).await?,
            Err(error) => {
                co.put(json!({ "type": "USER_FAILED", "error": error.to_string() }))
                    .await?
            }
        };
        Ok(Value::Null)
    })
    .named("loadUser")
}

fn users(state: &Value, action: &Value) -> Value {
    match action["type"].as_str() {
        Some("USER_LOADED") => json!({ "user": action["user"], "error": null }),
        Some("USER_FAILED") => json!({ "user": null, "error": action["error"] }),
        _ => state.clone(),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result {
    let fetch_user = Func::future("fetchUser", |args| async move {
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        Ok(json!({ "id": args[0], "name": "Ada" }))
    });

    // Integration style: the real call runs, order of assertions is free
    let result = expect_saga(load_user(fetch_user.clone()))
        .with_reducer(users, None)
        .dispatch(json!({ "type": "LOAD_USER", "id": 1 }))
        .put_action_type("USER_LOADED")
        .call(&fetch_user, [json!(1)])
        .not()
        .put_action_type("USER_FAILED")
        .has_final_state(json!({ "user": { "id": 1, "name": "Ada" }, "error": null }))
        .run()
        .await?;
    println!("final state: {}", result.store_state);

    // Same saga with the call answered by a provider
    expect_saga(load_user(fetch_user.clone()))
        .provide(Providers::new().call(|_, _| throw_error("offline")))
        .dispatch(json!({ "type": "LOAD_USER", "id": 1 }))
        .put(json!({ "type": "USER_FAILED", "error": "offline" }))
        .run()
        .await?;

    // Unit style: drive the saga by hand, one effect at a time
    let fetch = fetch_user.clone();
    test_saga(move || load_user(fetch.clone()))
        .next()
        .take("LOAD_USER")?
        .next_with(json!({ "type": "LOAD_USER", "id": 1 }))
        .call(&fetch_user, [json!(1)])?
        .next_with(json!({ "id": 1 }))
        .put(json!({ "type": "USER_LOADED", "user": { "id": 1 } }))?
        .next()
        .is_done()?;

    println!("all plans passed");
    Ok(())
}
