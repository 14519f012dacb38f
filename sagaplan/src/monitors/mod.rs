//! Ready-to-use monitor implementations.
//!
//! This module contains concrete [`SagaMonitor`](crate::monitoring::SagaMonitor)
//! implementations for common use cases.
//!
//! # Available Monitors
//!
//! - [`Tracer`] - Logs the effect lifecycle via `tracing` crate
//! - [`EffectLog`] - Keeps a shared list of every triggered effect
//!
//! # Example
//!
//! ```ignore
//! use sagaplan::monitors::Tracer;
//!
//! expect_saga(my_saga).with_monitor(Tracer).run().await?;
//! ```

mod tracer;
pub use tracer::Tracer;

mod effect_log;
pub use effect_log::EffectLog;
