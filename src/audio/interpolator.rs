//! Integer-ratio polyphase interpolation (1:L).
//!
//! The H-tap prototype filter is split into L branches of H/L taps:
//! branch `p` uses `coeff[p], coeff[p + L], coeff[p + 2L], …`.  Each input
//! sample is pushed once into a delay line of H/L samples and then every
//! branch produces one output, scaled by L to make up for the zero stuffing.

use super::fir::{DelayLine, FirCoefficients};

#[derive(Debug, Clone)]
pub struct Interpolator {
    factor: usize,
    coeffs: FirCoefficients,
    z: DelayLine,
}

impl Interpolator {
    /// # Panics
    ///
    /// Panics if `factor == 0`.
    pub fn new(factor: usize, coeffs: FirCoefficients) -> Self {
        assert!(factor >= 1, "interpolation factor must be >= 1");
        let z = DelayLine::new(coeffs.taps() / factor);
        Self { factor, coeffs, z }
    }

    pub fn factor(&self) -> usize {
        self.factor
    }

    /// Filter `input` and append exactly `factor * input.len()` samples to
    /// `output`.
    pub fn interpolate(&mut self, input: &[f32], output: &mut Vec<f32>) -> usize {
        let gain = self.factor as f32;
        output.reserve(input.len() * self.factor);
        for &sample in input {
            self.z.push(sample);
            for phase in 0..self.factor {
                let acc = self
                    .z
                    .dot_strided(self.coeffs.as_slice(), phase, self.factor);
                output.push(gain * acc);
            }
        }
        input.len() * self.factor
    }

    pub fn reset(&mut self) {
        self.z.reset();
    }
}
