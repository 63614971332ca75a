//! Event-loop services used by the pipeline: software timers.
//!
//! The event loop is a tokio current-thread runtime driving a
//! [`tokio::task::LocalSet`]; every pipeline object lives on it.

pub mod timer;

pub use timer::{Timer, TimerKind};
