//! Delay-line FIR core shared by the decimator and the interpolator.
//!
//! A [`DelayLine`] holds the most recent input samples with the newest one
//! at index 0.  Coefficients live in a [`FirCoefficients`] table that is
//! immutable and reference counted, so any number of filters can share one
//! table without copying it.

use std::sync::Arc;

// ---------------------------------------------------------------------------
// FirCoefficients
// ---------------------------------------------------------------------------

/// Shared, read-only FIR coefficient table.
///
/// Cloning is an `Arc` clone; the coefficient data itself is never copied.
#[derive(Debug, Clone, PartialEq)]
pub struct FirCoefficients(Arc<[f32]>);

impl FirCoefficients {
    /// Build a table from a coefficient slice.
    pub fn new(coeffs: &[f32]) -> Self {
        Self(Arc::from(coeffs))
    }

    /// Number of taps.
    pub fn taps(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// Windowed-sinc lowpass design.
    ///
    /// `cutoff` is the normalised cutoff frequency (0.0 – 0.5, a fraction of
    /// the sample rate).  A Hamming window is applied and the taps are
    /// scaled to unity gain at DC.
    ///
    /// # Panics
    ///
    /// Panics if `taps == 0` or `cutoff` is outside `(0.0, 0.5]`.
    pub fn lowpass(taps: usize, cutoff: f32) -> Self {
        assert!(taps > 0, "lowpass needs at least one tap");
        assert!(
            cutoff > 0.0 && cutoff <= 0.5,
            "lowpass cutoff must be in (0.0, 0.5]"
        );

        let centre = (taps - 1) as f32 / 2.0;
        let mut coeffs: Vec<f32> = (0..taps)
            .map(|n| {
                let x = n as f32 - centre;
                let sinc = if x == 0.0 {
                    2.0 * cutoff
                } else {
                    (2.0 * std::f32::consts::PI * cutoff * x).sin() / (std::f32::consts::PI * x)
                };
                let window = if taps == 1 {
                    1.0
                } else {
                    0.54 - 0.46
                        * (2.0 * std::f32::consts::PI * n as f32 / (taps - 1) as f32).cos()
                };
                sinc * window
            })
            .collect();

        let sum: f32 = coeffs.iter().sum();
        if sum != 0.0 {
            for c in &mut coeffs {
                *c /= sum;
            }
        }

        Self::from(coeffs)
    }
}

impl From<Vec<f32>> for FirCoefficients {
    fn from(coeffs: Vec<f32>) -> Self {
        Self(Arc::from(coeffs))
    }
}

// ---------------------------------------------------------------------------
// DelayLine
// ---------------------------------------------------------------------------

/// Fixed-length history of input samples, newest at index 0.
#[derive(Debug, Clone)]
pub struct DelayLine {
    z: Vec<f32>,
}

impl DelayLine {
    /// A zero-filled delay line of `len` samples.
    pub fn new(len: usize) -> Self {
        Self { z: vec![0.0; len] }
    }

    /// Shift every sample one position back, dropping the oldest, and store
    /// `sample` at index 0.
    pub fn push(&mut self, sample: f32) {
        let len = self.z.len();
        if len == 0 {
            return;
        }
        self.z.copy_within(0..len - 1, 1);
        self.z[0] = sample;
    }

    /// `Σ coeffs[i] * z[i]` over the shorter of the two.
    pub fn dot(&self, coeffs: &[f32]) -> f32 {
        self.z.iter().zip(coeffs).map(|(z, c)| z * c).sum()
    }

    /// `Σ coeffs[i * stride + phase] * z[i]`, stopping at whichever of the
    /// delay line or the coefficient table runs out first.
    pub fn dot_strided(&self, coeffs: &[f32], phase: usize, stride: usize) -> f32 {
        self.z
            .iter()
            .zip(coeffs.iter().skip(phase).step_by(stride.max(1)))
            .map(|(z, c)| z * c)
            .sum()
    }

    pub fn len(&self) -> usize {
        self.z.len()
    }

    pub fn is_empty(&self) -> bool {
        self.z.is_empty()
    }

    /// Zero the history.
    pub fn reset(&mut self) {
        self.z.fill(0.0);
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.z
    }
}
