//! The stream endpoint protocol.
//!
//! ```text
//!            write_samples ─▶          flush_samples ─▶
//!   Source                     Sink
//!            ◀─ resume_output         ◀─ all_samples_flushed
//! ```
//!
//! * `write_samples` returns how many samples the sink took.  A short count
//!   (including 0) is backpressure: the source keeps the rest and waits for
//!   `resume_output` before offering it again.
//! * `flush_samples` asks the sink to deliver everything it has accepted and
//!   then answer with exactly one `all_samples_flushed`.
//! * A source does not write while a flush it issued is unacknowledged.
//!
//! A source owns its sink (`Rc`) through a [`SinkSlot`]; the sink refers back
//! to the source weakly through a [`SourceSlot`], so a chain is kept alive by
//! whoever holds its first stage.
//!
//! All methods take `&self`.  Implementations keep their state in `Cell` /
//! `RefCell` and must not hold a borrow across a call into another stage,
//! because the other stage may call straight back.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use thiserror::Error;

use super::StreamState;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised while wiring stages together.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// The source already feeds a sink.
    #[error("source is already connected to a sink")]
    SourceConnected,

    /// The sink already has a source.
    #[error("sink is already connected to a source")]
    SinkConnected,
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// The receiving end of a connection.
pub trait AudioSink {
    /// Offer `samples`; returns how many were accepted.
    fn write_samples(&self, samples: &[f32]) -> usize;

    /// Deliver everything accepted so far, then acknowledge through
    /// [`SourceSlot::flushed`].
    fn flush_samples(&self);

    /// Back-reference to the connected source.
    fn source_slot(&self) -> &SourceSlot;
}

/// The sending end of a connection.
pub trait AudioSource {
    /// The sink can take more samples.  Spurious calls must be harmless.
    fn resume_output(&self);

    /// The sink has delivered everything written before the last flush.
    fn all_samples_flushed(&self);

    /// The connected sink.
    fn sink_slot(&self) -> &SinkSlot;
}

// ---------------------------------------------------------------------------
// SinkSlot
// ---------------------------------------------------------------------------

/// A source's handle on its sink, plus the connection state.
#[derive(Default)]
pub struct SinkSlot {
    sink: RefCell<Option<Rc<dyn AudioSink>>>,
    state: Cell<StreamState>,
}

impl SinkSlot {
    pub fn new() -> Self {
        Self::default()
    }

    fn sink(&self) -> Option<Rc<dyn AudioSink>> {
        self.sink.borrow().clone()
    }

    /// Write to the sink.  Without a sink the samples are discarded and
    /// reported as accepted.
    pub fn write(&self, samples: &[f32]) -> usize {
        debug_assert!(
            self.state.get() != StreamState::Flushing,
            "write while a flush is outstanding"
        );
        if samples.is_empty() {
            return 0;
        }
        self.state.set(StreamState::Active);
        match self.sink() {
            Some(sink) => sink.write_samples(samples),
            None => samples.len(),
        }
    }

    /// Issue a flush.
    ///
    /// Returns `false` when no sink is connected; the flush then counts as
    /// complete and the caller acknowledges its own upstream directly.  When
    /// `true` is returned the acknowledgement may already have arrived.
    pub fn flush(&self) -> bool {
        match self.sink() {
            Some(sink) => {
                self.state.set(StreamState::Flushing);
                sink.flush_samples();
                true
            }
            None => {
                self.state.set(StreamState::Idle);
                false
            }
        }
    }

    /// Record the sink's acknowledgement.  Returns `true` if a flush was
    /// outstanding.
    pub fn flush_done(&self) -> bool {
        let was_flushing = self.state.get() == StreamState::Flushing;
        debug_assert!(was_flushing, "flush acknowledged without a matching flush");
        if was_flushing {
            self.state.set(StreamState::Idle);
        }
        was_flushing
    }

    pub fn is_flushing(&self) -> bool {
        self.state.get() == StreamState::Flushing
    }

    pub fn is_connected(&self) -> bool {
        self.sink.borrow().is_some()
    }

    pub fn state(&self) -> StreamState {
        self.state.get()
    }

    /// Samples or a flush are still unacknowledged.
    pub fn is_busy(&self) -> bool {
        self.state.get().is_busy()
    }
}

impl fmt::Debug for SinkSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SinkSlot")
            .field("connected", &self.is_connected())
            .field("state", &self.state.get())
            .field("busy", &self.is_busy())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// SourceSlot
// ---------------------------------------------------------------------------

/// A sink's weak handle on its source.
#[derive(Default)]
pub struct SourceSlot {
    source: RefCell<Option<Weak<dyn AudioSource>>>,
}

impl SourceSlot {
    pub fn new() -> Self {
        Self::default()
    }

    fn source(&self) -> Option<Rc<dyn AudioSource>> {
        self.source.borrow().as_ref().and_then(Weak::upgrade)
    }

    /// Tell the source it may write again.
    pub fn resume(&self) {
        if let Some(source) = self.source() {
            source.resume_output();
        }
    }

    /// Acknowledge the source's flush.
    pub fn flushed(&self) {
        if let Some(source) = self.source() {
            source.all_samples_flushed();
        }
    }

    pub fn is_connected(&self) -> bool {
        self.source().is_some()
    }
}

impl fmt::Debug for SourceSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceSlot")
            .field("connected", &self.is_connected())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

/// Connect `source` to `sink`.  Each side may have at most one counterpart.
pub fn connect(source: Rc<dyn AudioSource>, sink: Rc<dyn AudioSink>) -> Result<(), StreamError> {
    if source.sink_slot().is_connected() {
        return Err(StreamError::SourceConnected);
    }
    if sink.source_slot().is_connected() {
        return Err(StreamError::SinkConnected);
    }

    *sink.source_slot().source.borrow_mut() = Some(Rc::downgrade(&source));
    let slot = source.sink_slot();
    *slot.sink.borrow_mut() = Some(sink);
    slot.state.set(StreamState::Idle);
    Ok(())
}

/// Detach `source` from its sink.
///
/// An outstanding flush is acknowledged to the source; otherwise the source
/// is resumed, since the sink that may have stalled it is gone.
pub fn disconnect(source: &dyn AudioSource) {
    let slot = source.sink_slot();
    let Some(sink) = slot.sink.borrow_mut().take() else {
        return;
    };
    *sink.source_slot().source.borrow_mut() = None;

    if slot.is_busy() {
        log::debug!("disconnecting a {} stream", slot.state.get());
    }
    if slot.is_flushing() {
        source.all_samples_flushed();
    } else {
        source.resume_output();
    }
    slot.state.set(StreamState::Idle);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
