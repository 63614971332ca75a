//! The receiver abstraction the voter votes between.

use std::rc::Rc;

use crate::pipeline::AudioSource;

/// A discrete event reported by a receiver alongside its audio.
#[derive(Debug, Clone, PartialEq)]
pub enum RxEvent {
    /// The squelch opened or closed.
    Squelch { open: bool },
    /// A DTMF digit was decoded.
    DtmfDigit { digit: char, duration_ms: u32 },
    /// A tone of frequency `fq` Hz was detected.
    ToneDetected { fq: f32 },
}

/// Callback receiving a receiver's events.
pub type RxEventHandler = Box<dyn Fn(RxEvent)>;

/// A radio receiver: squelch state, signal level, an audio stream and a
/// stream of [`RxEvent`]s.
///
/// Implementations live on the event loop.  Event handlers may be invoked
/// synchronously from any of these methods (e.g. unmuting a receiver whose
/// squelch is open may report the opening at once).
pub trait Receiver {
    fn name(&self) -> &str;

    /// Current signal level.  Higher is better; the scale is receiver
    /// specific but must be comparable across the receivers of one voter.
    fn signal_strength(&self) -> f32;

    fn squelch_is_open(&self) -> bool;

    /// A muted receiver stops producing audio.
    fn set_muted(&self, muted: bool);

    fn reset(&self);

    /// The receiver's audio output.  Connected once by whoever consumes it.
    fn audio_source(&self) -> Rc<dyn AudioSource>;

    fn set_event_handler(&self, handler: RxEventHandler);
}
