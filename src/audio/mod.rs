//! Sample-level DSP building blocks: ring storage and integer-ratio FIR
//! resampling.
//!
//! # Layout
//!
//! ```text
//! SampleRing      fixed-capacity circular storage (bounded / overwrite)
//! FirCoefficients shared, read-only coefficient table
//! DelayLine       newest-first input history
//! Decimator       M:1, phase carried across calls
//! Interpolator    1:L polyphase
//! ```
//!
//! # Quick Start
//!
//! ```rust
//! use ham_stream::audio::{Decimator, FirCoefficients, Interpolator};
//!
//! let coeffs = FirCoefficients::lowpass(32, 0.2);
//! let mut down = Decimator::new(2, coeffs.clone());
//! let mut up = Interpolator::new(2, coeffs);
//!
//! let mut half = Vec::new();
//! down.decimate(&[0.0; 160], &mut half);
//! let mut full = Vec::new();
//! up.interpolate(&half, &mut full);
//! assert_eq!(full.len(), 160);
//! ```

pub mod buffer;
pub mod decimator;
pub mod fir;
pub mod interpolator;

pub use buffer::SampleRing;
pub use decimator::Decimator;
pub use fir::{DelayLine, FirCoefficients};
pub use interpolator::Interpolator;
