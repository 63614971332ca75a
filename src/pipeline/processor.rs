//! Stream stage wrapping a sample-rate converting [`SampleProcessor`].
//!
//! Input is processed in blocks producing at most [`BLOCK_SIZE`] output
//! samples.  Output the sink refuses is kept and delivered on resume; while
//! any is kept, new input is refused.

use std::cell::{Cell, RefCell};

use crate::audio::{Decimator, FirCoefficients, Interpolator};

use super::endpoint::{AudioSink, AudioSource, SinkSlot, SourceSlot};

/// Upper bound on output samples produced per processing block.
pub const BLOCK_SIZE: usize = 256;

// ---------------------------------------------------------------------------
// SampleProcessor
// ---------------------------------------------------------------------------

/// A stateful block transform with a fixed input:output rate ratio.
pub trait SampleProcessor {
    /// Process `input`, appending the result to `output`.
    fn process(&mut self, input: &[f32], output: &mut Vec<f32>);

    /// `(input, output)` rate ratio.
    fn rate_ratio(&self) -> (usize, usize);
}

impl SampleProcessor for Decimator {
    fn process(&mut self, input: &[f32], output: &mut Vec<f32>) {
        self.decimate(input, output);
    }

    fn rate_ratio(&self) -> (usize, usize) {
        (self.factor(), 1)
    }
}

impl SampleProcessor for Interpolator {
    fn process(&mut self, input: &[f32], output: &mut Vec<f32>) {
        self.interpolate(input, output);
    }

    fn rate_ratio(&self) -> (usize, usize) {
        (1, self.factor())
    }
}

// ---------------------------------------------------------------------------
// AudioProcessor
// ---------------------------------------------------------------------------

pub struct AudioProcessor<P> {
    processor: RefCell<P>,
    pending: RefCell<Vec<f32>>,
    pending_pos: Cell<usize>,
    input_stopped: Cell<bool>,
    output_stopped: Cell<bool>,
    /// Upstream flush not yet forwarded.
    flush_requested: Cell<bool>,
    /// Forwarded flush whose acknowledgement goes upstream.
    is_flushing: Cell<bool>,
    writing: Cell<bool>,
    resume_pending: Cell<bool>,
    source: SourceSlot,
    sink: SinkSlot,
}

/// M:1 decimating stage.
pub type AudioDecimator = AudioProcessor<Decimator>;

/// 1:L interpolating stage.
pub type AudioInterpolator = AudioProcessor<Interpolator>;

impl AudioProcessor<Decimator> {
    pub fn decimator(factor: usize, coeffs: FirCoefficients) -> Self {
        Self::new(Decimator::new(factor, coeffs))
    }
}

impl AudioProcessor<Interpolator> {
    pub fn interpolator(factor: usize, coeffs: FirCoefficients) -> Self {
        Self::new(Interpolator::new(factor, coeffs))
    }
}

impl<P: SampleProcessor> AudioProcessor<P> {
    pub fn new(processor: P) -> Self {
        Self {
            processor: RefCell::new(processor),
            pending: RefCell::new(Vec::with_capacity(BLOCK_SIZE)),
            pending_pos: Cell::new(0),
            input_stopped: Cell::new(false),
            output_stopped: Cell::new(false),
            flush_requested: Cell::new(false),
            is_flushing: Cell::new(false),
            writing: Cell::new(false),
            resume_pending: Cell::new(false),
            source: SourceSlot::new(),
            sink: SinkSlot::new(),
        }
    }

    /// Input samples per block, so that a block yields at most
    /// [`BLOCK_SIZE`] outputs.
    fn block_input_len(&self) -> usize {
        let (input, output) = self.processor.borrow().rate_ratio();
        (BLOCK_SIZE * input / output.max(1)).max(1)
    }

    fn has_pending(&self) -> bool {
        self.pending_pos.get() < self.pending.borrow().len()
    }

    /// Try to hand the kept output to the sink.  Returns `true` when nothing
    /// is left.
    fn drain_pending(&self) -> bool {
        if !self.has_pending() {
            return true;
        }
        if self.output_stopped.get() || self.writing.get() || self.sink.is_flushing() {
            return false;
        }

        let mut pending = self.pending.take();
        let mut pos = self.pending_pos.get();

        self.writing.set(true);
        while pos < pending.len() {
            pos += self.sink.write(&pending[pos..]);
            if pos < pending.len() && !self.resume_pending.replace(false) {
                self.output_stopped.set(true);
                break;
            }
        }
        self.resume_pending.set(false);
        self.writing.set(false);

        let done = pos >= pending.len();
        if done {
            pending.clear();
            pos = 0;
        }
        self.pending.replace(pending);
        self.pending_pos.set(pos);
        done
    }

    fn flush_downstream(&self) {
        if !self.flush_requested.get() || self.has_pending() || self.sink.is_flushing() {
            return;
        }
        self.flush_requested.set(false);
        self.is_flushing.set(true);
        if !self.sink.flush() {
            self.flush_completed();
        }
    }

    fn flush_completed(&self) {
        if self.is_flushing.replace(false) {
            self.source.flushed();
        }
    }
}

impl<P: SampleProcessor> AudioSink for AudioProcessor<P> {
    fn write_samples(&self, samples: &[f32]) -> usize {
        if samples.is_empty() {
            return 0;
        }
        self.flush_requested.set(false);
        self.input_stopped.set(false);

        if !self.drain_pending() {
            self.input_stopped.set(true);
            return 0;
        }

        let block = self.block_input_len();
        let mut consumed = 0;
        while consumed < samples.len() {
            let n = block.min(samples.len() - consumed);
            {
                let mut pending = self.pending.borrow_mut();
                pending.clear();
                self.processor
                    .borrow_mut()
                    .process(&samples[consumed..consumed + n], &mut pending);
            }
            self.pending_pos.set(0);
            consumed += n;

            if !self.drain_pending() {
                break;
            }
        }

        if consumed < samples.len() {
            self.input_stopped.set(true);
        }
        consumed
    }

    fn flush_samples(&self) {
        self.flush_requested.set(true);
        self.flush_downstream();
    }

    fn source_slot(&self) -> &SourceSlot {
        &self.source
    }
}

impl<P: SampleProcessor> AudioSource for AudioProcessor<P> {
    fn resume_output(&self) {
        if self.writing.get() {
            self.output_stopped.set(false);
            self.resume_pending.set(true);
            return;
        }
        if !self.output_stopped.replace(false) || !self.drain_pending() {
            return;
        }
        self.flush_downstream();
        if self.input_stopped.replace(false) {
            self.source.resume();
        }
    }

    fn all_samples_flushed(&self) {
        self.sink.flush_done();
        self.flush_completed();
    }

    fn sink_slot(&self) -> &SinkSlot {
        &self.sink
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
