//! Monitoring API for observing effects as sagas run.
//!
//! # Overview
//!
//! The runtime reports every effect it digests:
//! - Effect triggered, with the yielding task and the parent race/parallel
//! - Effect resolved, rejected or cancelled
//!
//! The test harness is itself a monitor; extra monitors are added with
//! [`ExpectSaga::with_monitor`](crate::testing::ExpectSaga::with_monitor)
//! or passed to [`run_saga`](crate::runtime::run_saga) directly.
//!
//! # Example
//!
//! ```ignore
//! use sagaplan::monitors::Tracer;
//!
//! expect_saga(my_saga).with_monitor(Tracer).run().await?;
//! ```

mod monitor;

pub use monitor::{EffectEvent, EffectId, SagaMonitor};
