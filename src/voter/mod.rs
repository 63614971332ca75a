//! Diversity voter: picks the strongest of several receivers.
//!
//! # Architecture
//!
//! ```text
//!  Rx1 ──audio──▶ fifo (paused, overwrite) ─▶ gate ─┐
//!  Rx2 ──audio──▶ fifo (paused, overwrite) ─▶ gate ─┼─▶ combined output
//!  Rx3 ──audio──▶ fifo (paused, overwrite) ─▶ gate ─┘
//!   │
//!   └─ squelch / DTMF / tone events ─▶ VotingState ─▶ combined events
//! ```
//!
//! When a squelch opens the voter starts a voting round of `VOTING_DELAY`
//! milliseconds.  Every receiver that opens during the round buffers its
//! audio from its own opening onwards.  At expiry the strongest receiver
//! wins: the others are muted and the winner's buffer is released, so the
//! start of the transmission is not lost.  When the winner's squelch closes
//! the others are unmuted and the voter is idle again.
//!
//! The voter is itself a [`Receiver`], so voters can be cascaded.

pub mod decision;
pub mod receiver;

mod output;
mod satellite;

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::Duration;

use thiserror::Error;

use crate::config::ConfigLookup;
use crate::pipeline::{AudioSource, StreamError};
use crate::runtime::{Timer, TimerKind};
use crate::INTERNAL_SAMPLE_RATE;

use output::VoterOutput;
use satellite::Satellite;

pub use decision::{CloseOutcome, OpenOutcome, VotingState, BEST_RX_SIGLEV_RESET};
pub use receiver::{Receiver, RxEvent, RxEventHandler};

/// Upper bound for `VOTING_DELAY`.
pub const MAX_VOTING_DELAY_MS: u64 = 5000;

/// Upper bound for `BUFFER_LENGTH`.
pub const MAX_BUFFER_LENGTH_MS: u64 = MAX_VOTING_DELAY_MS;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VoterError {
    #[error("config variable {section}/{key} not set")]
    MissingConfig { section: String, key: String },

    #[error("invalid value {value:?} for config variable {section}/{key}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
    },

    #[error("no receivers listed in {section}/RECEIVERS")]
    NoReceivers { section: String },

    #[error("could not create receiver {0}")]
    ReceiverCreation(String),

    #[error(transparent)]
    Stream(#[from] StreamError),
}

// ---------------------------------------------------------------------------
// VoterConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoterConfig {
    /// Receiver names, in voting order.
    pub receivers: Vec<String>,
    pub voting_delay: Duration,
    /// How much audio each satellite keeps from its squelch opening on.
    pub buffer_length: Duration,
}

impl VoterConfig {
    /// Read `section`:
    ///
    /// * `RECEIVERS`: required, comma separated
    /// * `VOTING_DELAY`: milliseconds, default 0, at most [`MAX_VOTING_DELAY_MS`]
    /// * `BUFFER_LENGTH`: milliseconds, defaults to the voting delay, at most
    ///   [`MAX_BUFFER_LENGTH_MS`]
    pub fn from_lookup(cfg: &dyn ConfigLookup, section: &str) -> Result<Self, VoterError> {
        let receivers =
            cfg.get_value(section, "RECEIVERS")
                .ok_or_else(|| VoterError::MissingConfig {
                    section: section.to_owned(),
                    key: "RECEIVERS".to_owned(),
                })?;
        let receivers: Vec<String> = receivers
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(String::from)
            .collect();
        if receivers.is_empty() {
            return Err(VoterError::NoReceivers {
                section: section.to_owned(),
            });
        }

        let delay_ms = read_ms(cfg, section, "VOTING_DELAY", 0, MAX_VOTING_DELAY_MS)?;
        let buffer_ms = read_ms(cfg, section, "BUFFER_LENGTH", delay_ms, MAX_BUFFER_LENGTH_MS)?;

        Ok(Self {
            receivers,
            voting_delay: Duration::from_millis(delay_ms),
            buffer_length: Duration::from_millis(buffer_ms),
        })
    }

    /// Per-satellite buffer size in samples, at least one.
    pub fn fifo_capacity(&self) -> usize {
        let ms = self.buffer_length.as_millis() as u64;
        ((ms * u64::from(INTERNAL_SAMPLE_RATE) / 1000) as usize).max(1)
    }
}

/// A millisecond value in `0..=max`, or `default` when unset.
fn read_ms(
    cfg: &dyn ConfigLookup,
    section: &str,
    key: &str,
    default: u64,
    max: u64,
) -> Result<u64, VoterError> {
    let Some(value) = cfg.get_value(section, key) else {
        return Ok(default);
    };
    match value.trim().parse::<u64>() {
        Ok(ms) if ms <= max => Ok(ms),
        _ => Err(VoterError::InvalidValue {
            section: section.to_owned(),
            key: key.to_owned(),
            value,
        }),
    }
}

// ---------------------------------------------------------------------------
// Voter
// ---------------------------------------------------------------------------

pub struct Voter {
    name: String,
    config: VoterConfig,
    satellites: Vec<Satellite>,
    state: RefCell<VotingState>,
    timer: Timer,
    output: Rc<VoterOutput>,
    muted: Cell<bool>,
    sql_rx_id: Cell<usize>,
    handler: RefCell<Option<Rc<dyn Fn(RxEvent)>>>,
    weak_self: Weak<Voter>,
}

impl Voter {
    /// Read the configuration from `section` and create the receivers it
    /// lists through `create_rx`.
    pub fn initialize(
        cfg: &dyn ConfigLookup,
        section: &str,
        create_rx: impl FnMut(&str) -> Option<Rc<dyn Receiver>>,
    ) -> Result<Rc<Self>, VoterError> {
        let config = VoterConfig::from_lookup(cfg, section)?;
        Self::with_config(section, config, create_rx)
    }

    pub fn with_config(
        name: &str,
        config: VoterConfig,
        mut create_rx: impl FnMut(&str) -> Option<Rc<dyn Receiver>>,
    ) -> Result<Rc<Self>, VoterError> {
        let output = Rc::new(VoterOutput::new());
        let capacity = config.fifo_capacity();

        let mut satellites = Vec::with_capacity(config.receivers.len());
        for rx_name in &config.receivers {
            log::info!("{name}: adding receiver {rx_name}");
            let rx = create_rx(rx_name)
                .ok_or_else(|| VoterError::ReceiverCreation(rx_name.clone()))?;
            satellites.push(Satellite::new(rx, &output, capacity)?);
        }

        let voter = Rc::new_cyclic(|weak| Self {
            name: name.to_owned(),
            timer: Timer::new(config.voting_delay, TimerKind::OneShot),
            config,
            satellites,
            state: RefCell::new(VotingState::new()),
            output,
            muted: Cell::new(false),
            sql_rx_id: Cell::new(0),
            handler: RefCell::new(None),
            weak_self: weak.clone(),
        });

        for sat in &voter.satellites {
            let weak = Rc::downgrade(&voter);
            let index = sat.index();
            sat.rx().set_event_handler(Box::new(move |event| {
                if let Some(voter) = weak.upgrade() {
                    voter.handle_rx_event(index, event);
                }
            }));
        }
        for sat in &voter.satellites {
            voter.apply_mute(sat, false);
        }

        Ok(voter)
    }

    pub fn voting_delay(&self) -> Duration {
        self.config.voting_delay
    }

    pub fn receiver_count(&self) -> usize {
        self.satellites.len()
    }

    /// 1-based id of the receiver that last opened or closed the combined
    /// squelch; 0 before the first decision.
    pub fn sql_rx_id(&self) -> usize {
        self.sql_rx_id.get()
    }

    /// Index of the receiver whose audio currently passes.
    pub fn active_rx(&self) -> Option<usize> {
        self.state.borrow().active_rx()
    }

    /// Index of the strongest receiver of the round in progress.
    pub fn best_rx(&self) -> Option<usize> {
        self.state.borrow().best_rx()
    }

    pub fn is_muted(&self) -> bool {
        self.muted.get()
    }

    /// Mute or unmute every receiver.  Either way a decision in progress is
    /// abandoned.
    pub fn set_muted(&self, muted: bool) {
        if muted == self.muted.replace(muted) {
            return;
        }
        log::debug!("{}: {}", self.name, if muted { "muted" } else { "unmuted" });
        self.abandon();
        for sat in &self.satellites {
            self.apply_mute(sat, muted);
        }
    }

    /// Reset every receiver and all voting state.
    pub fn reset(&self) {
        self.abandon();
        for sat in &self.satellites {
            sat.rx().reset();
        }
        let muted = self.muted.get();
        for sat in &self.satellites {
            self.apply_mute(sat, muted);
        }
    }

    /// Take receiver `name` in or out of the vote.  A disabled receiver is
    /// muted and its squelch is ignored; disabling the active receiver closes
    /// the combined squelch.  Returns `false` for an unknown name.
    pub fn set_receiver_enabled(&self, name: &str, enabled: bool) -> bool {
        let Some(sat) = self.satellites.iter().find(|s| s.rx().name() == name) else {
            return false;
        };
        if enabled == sat.set_enabled(enabled) {
            return true;
        }
        log::info!(
            "{}: receiver {name} {}",
            self.name,
            if enabled { "enabled" } else { "disabled" }
        );

        if enabled {
            let others_active = self.active_rx().is_some_and(|i| i != sat.index());
            self.apply_mute(sat, self.muted.get() || others_active);
        } else {
            if !self.muted.get() {
                self.squelch_closed(sat);
            }
            sat.rx().set_muted(true);
            sat.stop_output(true);
            sat.clear();
        }
        true
    }

    pub fn receiver_enabled(&self, name: &str) -> Option<bool> {
        self.satellites
            .iter()
            .find(|s| s.rx().name() == name)
            .map(Satellite::is_enabled)
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Disabled receivers stay muted regardless of `muted`.
    fn apply_mute(&self, sat: &Satellite, muted: bool) {
        sat.rx().set_muted(muted || !sat.is_enabled());
    }

    fn emit(&self, event: RxEvent) {
        let handler = self.handler.borrow().clone();
        if let Some(handler) = handler {
            handler(event);
        }
    }

    fn handle_rx_event(&self, index: usize, event: RxEvent) {
        let Some(sat) = self.satellites.get(index) else {
            return;
        };
        match event {
            RxEvent::Squelch { open } => {
                if self.muted.get() || !sat.is_enabled() {
                    log::trace!("{}: {} squelch event ignored", self.name, sat.rx().name());
                } else if open {
                    self.squelch_opened(sat);
                } else {
                    self.squelch_closed(sat);
                }
            }
            RxEvent::DtmfDigit { digit, duration_ms } => {
                if !sat.hold_dtmf(digit, duration_ms) {
                    self.emit(RxEvent::DtmfDigit { digit, duration_ms });
                }
            }
            RxEvent::ToneDetected { .. } => self.emit(event),
        }
    }

    fn squelch_opened(&self, sat: &Satellite) {
        let level = sat.rx().signal_strength();
        let outcome = self.state.borrow_mut().squelch_opened(sat.index(), level);
        match outcome {
            OpenOutcome::Ignored => {
                log::debug!(
                    "{}: {} opened while another receiver is active",
                    self.name,
                    sat.rx().name()
                );
                return;
            }
            OpenOutcome::FirstCandidate => {
                let weak = self.weak_self.clone();
                self.timer.start(move || {
                    if let Some(voter) = weak.upgrade() {
                        voter.choose_best_rx();
                    }
                });
                log::debug!("{}: voting started by {} ({level})", self.name, sat.rx().name());
            }
            OpenOutcome::NewCandidate => {
                log::debug!("{}: new best receiver {} ({level})", self.name, sat.rx().name());
            }
            OpenOutcome::Weaker => {}
        }
        sat.clear();
    }

    fn squelch_closed(&self, sat: &Satellite) {
        let still_open: Vec<(usize, f32)> = self
            .satellites
            .iter()
            .filter(|other| {
                other.index() != sat.index() && other.is_enabled() && other.rx().squelch_is_open()
            })
            .map(|other| (other.index(), other.rx().signal_strength()))
            .collect();
        let outcome = self
            .state
            .borrow_mut()
            .squelch_closed(sat.index(), &still_open);

        match outcome {
            CloseOutcome::ActiveClosed => {
                log::info!(
                    "{}: The squelch is CLOSED ({}={})",
                    self.name,
                    sat.rx().name(),
                    sat.rx().signal_strength()
                );
                self.output.set_active(None);
                sat.stop_output(true);
                sat.clear();
                self.sql_rx_id.set(sat.id());
                self.emit(RxEvent::Squelch { open: false });
                for other in self.satellites.iter().filter(|o| o.index() != sat.index()) {
                    self.apply_mute(other, false);
                }
            }
            CloseOutcome::CandidateClosed { new_best } => {
                let best = new_best
                    .and_then(|i| self.satellites.get(i))
                    .map_or("none", |s| s.rx().name());
                log::debug!("{}: {} closed, best receiver now {best}", self.name, sat.rx().name());
            }
            CloseOutcome::Ignored => {}
        }
    }

    fn choose_best_rx(&self) {
        let chosen = self.state.borrow_mut().choose_best();
        let Some((index, level)) = chosen else {
            return;
        };
        let Some(sat) = self.satellites.get(index) else {
            return;
        };

        for other in self.satellites.iter().filter(|o| o.index() != index) {
            other.rx().set_muted(true);
        }
        log::info!(
            "{}: The squelch is OPEN ({}={level})",
            self.name,
            sat.rx().name()
        );
        self.sql_rx_id.set(sat.id());
        self.emit(RxEvent::Squelch { open: true });

        self.output.set_active(Some(index));
        for held in sat.stop_output(false) {
            self.emit(RxEvent::DtmfDigit {
                digit: held.digit,
                duration_ms: held.duration_ms,
            });
        }
    }

    /// Drop the active receiver and any round in progress.
    fn abandon(&self) {
        self.timer.stop();
        let was_active = self.state.borrow().active_rx();
        self.state.borrow_mut().reset();
        self.output.set_active(None);
        for sat in &self.satellites {
            sat.stop_output(true);
            sat.clear();
        }
        if let Some(sat) = was_active.and_then(|i| self.satellites.get(i)) {
            self.sql_rx_id.set(sat.id());
            self.emit(RxEvent::Squelch { open: false });
        }
    }
}

impl Receiver for Voter {
    fn name(&self) -> &str {
        &self.name
    }

    /// Level of the active receiver, or [`BEST_RX_SIGLEV_RESET`] when the
    /// combined squelch is closed.
    fn signal_strength(&self) -> f32 {
        self.active_rx()
            .and_then(|i| self.satellites.get(i))
            .map_or(BEST_RX_SIGLEV_RESET, |sat| sat.rx().signal_strength())
    }

    fn squelch_is_open(&self) -> bool {
        self.active_rx().is_some()
    }

    fn set_muted(&self, muted: bool) {
        Voter::set_muted(self, muted);
    }

    fn reset(&self) {
        Voter::reset(self);
    }

    fn audio_source(&self) -> Rc<dyn AudioSource> {
        self.output.clone()
    }

    fn set_event_handler(&self, handler: RxEventHandler) {
        *self.handler.borrow_mut() = Some(Rc::from(handler));
    }
}

impl std::fmt::Debug for Voter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Voter")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("satellites", &self.satellites)
            .field("state", &*self.state.borrow())
            .field("output_active", &self.output.active())
            .field("muted", &self.muted.get())
            .field("sql_rx_id", &self.sql_rx_id.get())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
