//! One receiver taking part in the vote, with its lookahead buffer.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use super::output::{SatGate, VoterOutput};
use super::receiver::Receiver;
use crate::pipeline::{connect, AudioFifo, StreamError};

/// A DTMF digit held back while the satellite's output is paused.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct HeldDigit {
    pub digit: char,
    pub duration_ms: u32,
}

/// A receiver, the paused overwrite fifo collecting its audio since its
/// squelch opened, and the gate into the combined output.
pub(crate) struct Satellite {
    index: usize,
    rx: Rc<dyn Receiver>,
    fifo: Rc<AudioFifo>,
    gate: Rc<SatGate>,
    output_paused: Cell<bool>,
    enabled: Cell<bool>,
    dtmf: RefCell<Vec<HeldDigit>>,
}

impl Satellite {
    pub fn new(
        rx: Rc<dyn Receiver>,
        output: &Rc<VoterOutput>,
        fifo_capacity: usize,
    ) -> Result<Self, StreamError> {
        let fifo = Rc::new(
            AudioFifo::new(fifo_capacity)
                .with_overwrite(true)
                .with_output_paused(true),
        );
        let gate = output.add_gate();
        connect(rx.audio_source(), fifo.clone())?;
        connect(fifo.clone(), gate.clone())?;

        Ok(Self {
            index: gate.index(),
            rx,
            fifo,
            gate,
            output_paused: Cell::new(true),
            enabled: Cell::new(true),
            dtmf: RefCell::new(Vec::new()),
        })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// 1-based id reported through `sql_rx_id`.
    pub fn id(&self) -> usize {
        self.index + 1
    }

    pub fn rx(&self) -> &Rc<dyn Receiver> {
        &self.rx
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.get()
    }

    /// Returns the previous setting.
    pub fn set_enabled(&self, enabled: bool) -> bool {
        self.enabled.replace(enabled)
    }

    /// Pause or release the output.  Releasing forwards the buffered audio
    /// and returns the digits held meanwhile, oldest first.
    pub fn stop_output(&self, stop: bool) -> Vec<HeldDigit> {
        self.output_paused.set(stop);
        self.fifo.set_output_paused(stop);
        if stop {
            Vec::new()
        } else {
            self.dtmf.take()
        }
    }

    /// Hold `digit` if the output is paused.  Returns `false` when the digit
    /// should pass straight through.
    pub fn hold_dtmf(&self, digit: char, duration_ms: u32) -> bool {
        if !self.output_paused.get() {
            return false;
        }
        self.dtmf.borrow_mut().push(HeldDigit { digit, duration_ms });
        true
    }

    /// Drop buffered audio and held digits.
    pub fn clear(&self) {
        self.fifo.clear();
        self.dtmf.borrow_mut().clear();
    }
}

impl std::fmt::Debug for Satellite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Satellite")
            .field("id", &self.id())
            .field("rx", &self.rx.name())
            .field("gate", &self.gate.index())
            .field("buffered", &self.fifo.samples_in_fifo(true))
            .field("output_paused", &self.output_paused.get())
            .field("enabled", &self.enabled.get())
            .finish()
    }
}
