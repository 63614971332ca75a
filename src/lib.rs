//! Flow-controlled sample-stream pipeline for ham-radio voice applications.
//!
//! ```text
//! foreign thread ─▶ ThreadSource ─▶ AudioDecimator ─▶ AudioInterpolator
//!                                                         │
//!                       sink ◀── AudioPacer ◀── AudioFifo ◀┘
//!
//! Rx1 ─┐
//! Rx2 ─┼─▶ Voter ─▶ combined source
//! Rx3 ─┘
//! ```
//!
//! Every stage speaks the pull/push protocol in [`pipeline`]: writes return
//! how many samples were accepted, a short count is backpressure that the
//! sink later lifts with `resume_output`, and a flush is acknowledged exactly
//! once after everything written before it has gone downstream.
//!
//! All pipeline objects are single-threaded (`Rc` + interior mutability) and
//! are meant to run inside a tokio `LocalSet`.  The only cross-thread entry
//! point is [`pipeline::ThreadSource`].

pub mod audio;
pub mod config;
pub mod pipeline;
pub mod runtime;
pub mod voter;

/// Sample rate used inside the pipeline, in Hz.
pub const INTERNAL_SAMPLE_RATE: u32 = 16_000;
