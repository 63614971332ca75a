//! Flow-controlled streaming stages.
//!
//! # Architecture
//!
//! ```text
//! foreign thread
//!      │ ThreadSourceWriter::write / flush
//!      ▼
//! ThreadSource ─▶ AudioDecimator ─▶ AudioInterpolator ─▶ AudioFifo ─▶ AudioPacer ─▶ sink
//!      ▲                                                                              │
//!      └───────────── resume_output / all_samples_flushed (upstream) ◀────────────────┘
//! ```
//!
//! Every stage implements [`AudioSink`] towards its source and [`AudioSource`]
//! towards its sink.  See [`endpoint`] for the protocol rules.
//!
//! # Quick start
//!
//! ```rust
//! use std::rc::Rc;
//! use ham_stream::pipeline::{connect, AudioFifo, CallbackSink, PushSource};
//!
//! let source = Rc::new(PushSource::new());
//! let fifo = Rc::new(AudioFifo::new(1024));
//! let sink = Rc::new(CallbackSink::new(|samples: &[f32]| samples.len()));
//!
//! connect(source.clone(), fifo.clone()).unwrap();
//! connect(fifo.clone(), sink).unwrap();
//!
//! assert_eq!(source.write(&[0.0; 160]), 160);
//! source.flush();
//! ```

pub mod adapters;
pub mod endpoint;
pub mod fifo;
pub mod pacer;
pub mod processor;
pub mod state;
pub mod thread_source;

#[cfg(test)]
pub(crate) mod testing;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use adapters::{CallbackSink, PushSource};
pub use endpoint::{
    connect, disconnect, AudioSink, AudioSource, SinkSlot, SourceSlot, StreamError,
};
pub use fifo::AudioFifo;
pub use pacer::AudioPacer;
pub use processor::{AudioDecimator, AudioInterpolator, AudioProcessor, SampleProcessor};
pub use state::StreamState;
pub use thread_source::{ThreadSource, ThreadSourceWriter};
