#![cfg_attr(docsrs, feature(doc_cfg))]
//! # Sagaplan
//!
//! Effect-level test plans for saga-style routines.
//!
//! A saga is a routine that never performs side effects itself. It yields
//! plain descriptors (*effects*: take an action, put an action, call a
//! function, fork a task...) and a runtime carries them out. Because the
//! effects are data, tests can assert on them directly instead of mocking
//! the world.
//!
//! Sagaplan gives you two ways to do that, plus the small runtime they need:
//!
//! - [`expect_saga`] runs the saga against a simulated store and checks
//!   afterwards which effects it yielded, in any order.
//! - [`test_saga`] steps the saga by hand and checks every effect in order.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sagaplan::*;
//! use serde_json::{Value, json};
//!
//! let fetch_user = Func::value("fetchUser", |args| json!({ "id": args[0] }));
//!
//! let fetch = fetch_user.clone();
//! let load_user = saga(move |co| async move {
//!     let request = co.take("LOAD_USER").await?;
//!     let user = co.call(&fetch, [request["id"].clone()]).await?;
//!     co.put(json!({ "type": "USER_LOADED", "user": user })).await?;
//!     Ok(Value::Null)
//! });
//!
//! # async fn run(load_user: AsyncSaga, fetch_user: Func) -> Result {
//! expect_saga(load_user)
//!     .dispatch(json!({ "type": "LOAD_USER", "id": 1 }))
//!     .call(&fetch_user, [json!(1)])
//!     .put(json!({ "type": "USER_LOADED", "user": { "id": 1 } }))
//!     .run()
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Saga`] | The generator protocol: resume with a result, get the next effect |
//! | [`saga`] / [`Co`] | Write a saga as an `async` body |
//! | [`Effect`] | Closed set of effect descriptors, built with [`effects`] |
//! | [`Func`] / [`Selector`] | Named functions referenced by effects, compared by identity |
//! | [`Pattern`] | What a `take` waits for |
//! | [`HelperEffect`] | `takeEvery`, `takeLatest`, `throttle` and `debounce` watchers |
//! | [`testing::ExpectSaga`] | Run-and-check test plan |
//! | [`testing::TestSaga`] | Step-by-step test plan |
//! | [`testing::Providers`] | Canned answers for effects |
//!
//! ## Runtime
//!
//! Sagas run on a tokio [`LocalSet`](tokio::task::LocalSet): values are
//! `Rc`-based and `!Send`. [`runtime::run_saga`] starts a saga against any
//! [`Store`]; every effect it digests is reported to the
//! [`monitoring::SagaMonitor`]s it was given.
//!
//! ## Features
//!
//! - **`serde`** - `Serialize`/`Deserialize` for plain data types
//!   ([`EffectTag`], [`HelperKind`], [`RunConfig`])
//!
//! ## Examples
//!
//! See the `examples/` directory:
//!
//! - `fetch_user.rs` - Both test plans against one saga

mod config;
pub mod effect;
mod effect_tag;
pub mod effects;
mod error;
mod func;
pub mod helper;
mod output;
mod pattern;
mod saga;
mod store;

pub mod monitoring;
pub mod monitors;
pub mod runtime;
pub mod testing;

pub use config::RunConfig;
pub use effect::Effect;
pub use effect_tag::EffectTag;
pub use error::{Error, SagaError};
pub use func::{CallFuture, CallReturn, Func, Selector};
pub use helper::{HelperEffect, HelperKind};
pub use output::Output;
pub use pattern::Pattern;
pub use saga::{AsyncSaga, Co, Saga, Step, saga};
pub use store::{Listener, Store};
pub use testing::{expect_saga, test_saga};

/// Convenience alias for `Result<T, sagaplan::Error>`.
pub type Result<T = ()> = std::result::Result<T, Error>;
