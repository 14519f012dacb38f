//! A minimal saga runtime on a tokio `LocalSet`.
//!
//! It interprets effects against a [`Store`], reports them to
//! [`SagaMonitor`]s and drives forked sagas as tasks. It exists to give the
//! test harness something to run sagas on, and is deliberately small: no
//! thread-safety, no channels beyond action channels.
//!
//! # Example
//!
//! ```rust,ignore
//! let local = tokio::task::LocalSet::new();
//! local.run_until(async {
//!     let task = run_saga(my_saga, RuntimeIo::new(store));
//!     task.done().await
//! }).await;
//! ```

mod channel;
mod env;
mod proc;
mod task;

use std::rc::Rc;

use tokio_util::sync::CancellationToken;

pub use channel::{Buffer, Channel};
pub use task::{Task, TaskOutcome};

pub(crate) use proc::routine;

use crate::{Saga, Store, monitoring::SagaMonitor};

/// What a saga runs against.
pub struct RuntimeIo {
    pub store: Rc<dyn Store>,
    pub monitors: Vec<Rc<dyn SagaMonitor>>,
}

impl RuntimeIo {
    pub fn new(store: Rc<dyn Store>) -> Self {
        Self {
            store,
            monitors: Vec::new(),
        }
    }

    pub fn with_monitor(mut self, monitor: Rc<dyn SagaMonitor>) -> Self {
        self.monitors.push(monitor);
        self
    }
}

/// Start `saga` as a root task.
///
/// Must be called from within a [`tokio::task::LocalSet`].
pub fn run_saga(saga: impl Saga + 'static, io: RuntimeIo) -> Task {
    let name = saga.name().to_string();
    let env = env::Env::new(io.store, io.monitors);
    proc::spawn(&env, Box::new(saga), &name, CancellationToken::new(), None)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use serde_json::{Value, json};
    use tokio::task::LocalSet;

    use super::*;
    use crate::{Func, Output, SagaError, effects, saga, store::Listener};

    /// A bare store: state is the list of dispatched actions.
    #[derive(Default)]
    struct ListStore {
        actions: RefCell<Vec<Value>>,
        listeners: RefCell<Vec<Listener>>,
    }

    impl Store for ListStore {
        fn dispatch(&self, action: Value) {
            self.actions.borrow_mut().push(action.clone());
            let listeners = self.listeners.borrow().clone();
            for listener in listeners {
                listener(&action);
            }
        }

        fn state(&self) -> Value {
            Value::Array(self.actions.borrow().clone())
        }

        fn subscribe(&self, listener: Listener) {
            self.listeners.borrow_mut().push(listener);
        }
    }

    /// Let spawned tasks run up to their next wait.
    async fn settle() {
        tokio::time::sleep(std::time::Duration::from_millis(1)).await;
    }

    fn io() -> (Rc<ListStore>, RuntimeIo) {
        let store = Rc::new(ListStore::default());
        (store.clone(), RuntimeIo::new(store))
    }

    #[tokio::test]
    async fn take_resolves_with_dispatched_action() {
        LocalSet::new()
            .run_until(async {
                let (store, io) = io();
                let task = run_saga(
                    saga(|co| async move {
                        let action = co.take("PING").await?;
                        co.put(json!({"type": "PONG", "n": action["n"]})).await?;
                        Ok(json!("done"))
                    }),
                    io,
                );
                settle().await;
                store.dispatch(json!({"type": "OTHER"}));
                store.dispatch(json!({"type": "PING", "n": 1}));

                assert_eq!(task.done().await, TaskOutcome::Done(json!("done")));
                assert_eq!(
                    store.state(),
                    json!([{"type": "OTHER"}, {"type": "PING", "n": 1}, {"type": "PONG", "n": 1}])
                );
            })
            .await;
    }

    #[tokio::test]
    async fn parent_waits_for_attached_forks() {
        LocalSet::new()
            .run_until(async {
                let (store, io) = io();
                let worker = Func::saga("worker", |_| {
                    saga(|co| async move {
                        co.delay(10).await?;
                        co.put(json!({"type": "WORKED"})).await?;
                        Ok(Value::Null)
                    })
                });
                let task = run_saga(
                    saga(move |co| async move {
                        co.fork(&worker, []).await?;
                        Ok(json!("parent"))
                    }),
                    io,
                );
                assert_eq!(task.done().await, TaskOutcome::Done(json!("parent")));
                assert_eq!(store.state(), json!([{"type": "WORKED"}]));
            })
            .await;
    }

    #[tokio::test]
    async fn failing_fork_fails_parent() {
        LocalSet::new()
            .run_until(async {
                let (_, io) = io();
                let worker = Func::fallible("worker", |_| Err(SagaError::new("boom")));
                let task = run_saga(
                    saga(move |co| async move {
                        co.fork(&worker, []).await?;
                        co.take("NEVER").await?;
                        Ok(Value::Null)
                    }),
                    io,
                );
                assert_eq!(task.done().await, TaskOutcome::Failed(SagaError::new("boom")));
            })
            .await;
    }

    #[tokio::test]
    async fn cancelling_parent_cancels_forks_but_not_spawns() {
        LocalSet::new()
            .run_until(async {
                let (_, io) = io();
                let blocked = Func::saga("blocked", |_| {
                    saga(|co| async move {
                        co.take("NEVER").await?;
                        Ok(Value::Null)
                    })
                });
                let tasks = Rc::new(RefCell::new(Vec::new()));
                let seen = tasks.clone();
                let task = run_saga(
                    saga(move |co| async move {
                        let forked = co.fork(&blocked, []).await?;
                        let spawned = co.spawn(&blocked, []).await?;
                        seen.borrow_mut().extend([forked, spawned]);
                        co.take("NEVER").await?;
                        Ok(Value::Null)
                    }),
                    io,
                );
                settle().await;
                task.cancel();

                assert_eq!(task.done().await, TaskOutcome::Cancelled);
                let tasks = tasks.borrow().clone();
                assert_eq!(tasks[0].done().await, TaskOutcome::Cancelled);
                assert!(!tasks[1].is_cancelled());
                tasks[1].cancel();
            })
            .await;
    }

    #[tokio::test]
    async fn race_resolves_with_first_winner() {
        LocalSet::new()
            .run_until(async {
                let (_, io) = io();
                let task = run_saga(
                    saga(|co| async move {
                        let (winner, _) = co
                            .race([("timeout", effects::delay(5)), ("action", effects::take("NEVER"))])
                            .await?;
                        Ok(json!(winner))
                    }),
                    io,
                );
                assert_eq!(task.done().await, TaskOutcome::Done(json!("timeout")));
            })
            .await;
    }

    #[tokio::test]
    async fn all_collects_results_in_order() {
        LocalSet::new()
            .run_until(async {
                let (_, io) = io();
                let slow = Func::future("slow", |args| async move {
                    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                    Ok(args[0].clone())
                });
                let fast = Func::value("fast", |args| args[0].clone());
                let task = run_saga(
                    saga(move |co| async move {
                        let outputs = co
                            .all([effects::call(&slow, [json!(1)]), effects::call(&fast, [json!(2)])])
                            .await?;
                        Ok(Output::List(outputs).into_value())
                    }),
                    io,
                );
                assert_eq!(task.done().await, TaskOutcome::Done(json!([1, 2])));
            })
            .await;
    }

    #[tokio::test]
    async fn action_channel_buffers_until_taken() {
        LocalSet::new()
            .run_until(async {
                let (store, io) = io();
                let task = run_saga(
                    saga(|co| async move {
                        let channel = co.action_channel("REQ").await?;
                        co.take("GO").await?;
                        let first = co.take_from(&channel).await?;
                        let rest = co.flush(&channel).await?;
                        Ok(json!([first["n"], rest.len()]))
                    }),
                    io,
                );
                settle().await;
                for n in 0..3 {
                    store.dispatch(json!({"type": "REQ", "n": n}));
                }
                store.dispatch(json!({"type": "GO"}));
                assert_eq!(task.done().await, TaskOutcome::Done(json!([0, 2])));
            })
            .await;
    }

    #[tokio::test]
    async fn take_latest_cancels_previous_worker() {
        LocalSet::new()
            .run_until(async {
                let (store, io) = io();
                let worker = Func::saga("worker", |args| {
                    let n = args[0]["n"].clone();
                    saga(move |co| async move {
                        co.delay(20).await?;
                        co.put(json!({"type": "DONE", "n": n})).await?;
                        Ok(Value::Null)
                    })
                });
                let task = run_saga(
                    saga(move |co| async move {
                        co.take_latest("REQ", &worker, []).await?;
                        Ok(Value::Null)
                    }),
                    io,
                );
                settle().await;
                store.dispatch(json!({"type": "REQ", "n": 1}));
                settle().await;
                store.dispatch(json!({"type": "REQ", "n": 2}));
                tokio::time::sleep(std::time::Duration::from_millis(60)).await;
                task.cancel();
                task.done().await;

                let done: Vec<Value> = store
                    .actions
                    .borrow()
                    .iter()
                    .filter(|a| a["type"] == "DONE")
                    .cloned()
                    .collect();
                assert_eq!(done, vec![json!({"type": "DONE", "n": 2})]);
            })
            .await;
    }
}
