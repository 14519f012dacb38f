//! Test plans for sagas.
//!
//! Two complementary styles:
//!
//! - [`expect_saga`] runs the saga for real against a simulated store and
//!   checks afterwards which effects it yielded, in any order. Providers
//!   stand in for effects you don't want to execute.
//! - [`test_saga`] steps the saga by hand and asserts every yielded effect
//!   in the exact order it appears.
//!
//! # Example
//!
//! ```ignore
//! use sagaplan::testing::{Providers, expect_saga, test_saga};
//!
//! // Integration style: order-independent, runs forks and helpers
//! expect_saga(load_user(json!(1)))
//!     .provide(Providers::call_fn(&fetch_user, json!({"id": 1})))
//!     .put(json!({"type": "USER_LOADED", "user": {"id": 1}}))
//!     .run()
//!     .await?;
//!
//! // Unit style: one assertion per step
//! test_saga(|| load_user(json!(1)))
//!     .next()
//!     .call(&fetch_user, [json!(1)])?
//!     .next_with(json!({"id": 1}))
//!     .put(json!({"type": "USER_LOADED", "user": {"id": 1}}))?
//!     .next()
//!     .is_done()?;
//! ```
//!
//! # Note
//!
//! Effects, functions and the harness use `Rc` internally and are `!Send`.
//! [`ExpectSaga::run`] drives everything on a `LocalSet` of the current
//! runtime.

mod effect_matcher;
mod effect_store;
mod expect_saga;
pub(crate) mod expectation;
pub(crate) mod harness;
mod interceptor;
mod json_match;
pub(crate) mod provider;
mod report;
mod test_saga;
mod validate;
mod validate_helper;
mod wait_set;

pub use effect_matcher::{EffectMatcher, Like};
pub use effect_store::{EffectStore, EffectStores};
pub use expect_saga::{ExpectSaga, RunResult, Running, expect_saga};
pub use harness::INIT_ACTION_TYPE;
pub use provider::{Next, ProviderResult, Providers, Provision, provide, provide_value, throw_error};
pub use test_saga::{TestSaga, test_saga};
pub use validate::compare_effects;

pub(crate) use harness::Harness;
