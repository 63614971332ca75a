//! Integer-ratio decimation (M:1).
//!
//! Every input sample enters the delay line; every M-th sample one output is
//! computed over all H taps.  The phase counter survives across calls, so the
//! output count over any chunking of the input is `floor(total / M)`.
//!
//! H does not have to be a multiple of M.  That case is filtered correctly,
//! just not as cheaply as it could be, and the output timing depends on it,
//! so it is accepted as is.

use super::fir::{DelayLine, FirCoefficients};

#[derive(Debug, Clone)]
pub struct Decimator {
    factor: usize,
    coeffs: FirCoefficients,
    z: DelayLine,
    phase: usize,
}

impl Decimator {
    /// # Panics
    ///
    /// Panics if `factor == 0`.
    pub fn new(factor: usize, coeffs: FirCoefficients) -> Self {
        assert!(factor >= 1, "decimation factor must be >= 1");
        let z = DelayLine::new(coeffs.taps());
        Self {
            factor,
            coeffs,
            z,
            phase: 0,
        }
    }

    pub fn factor(&self) -> usize {
        self.factor
    }

    /// Filter `input` and append the decimated samples to `output`.
    ///
    /// Returns the number of samples appended.
    pub fn decimate(&mut self, input: &[f32], output: &mut Vec<f32>) -> usize {
        let before = output.len();
        for &sample in input {
            self.z.push(sample);
            self.phase += 1;
            if self.phase == self.factor {
                self.phase = 0;
                output.push(self.z.dot(self.coeffs.as_slice()));
            }
        }
        output.len() - before
    }

    /// How many outputs a call with `count` input samples will produce.
    pub fn output_len(&self, count: usize) -> usize {
        (self.phase + count) / self.factor
    }

    /// Clear the filter history and the phase counter.
    pub fn reset(&mut self) {
        self.z.reset();
        self.phase = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coeffs() -> FirCoefficients {
        FirCoefficients::new(&[0.1, 0.2, 0.3, 0.4])
    }

    #[test]
    fn impulse_response_is_every_mth_tap() {
        let mut d = Decimator::new(2, coeffs());
        let mut out = Vec::new();
        d.decimate(&[1.0, 0.0, 0.0, 0.0, 0.0, 0.0], &mut out);
        // Outputs at inputs 2, 4, 6 see the impulse at delay 1, 3, 5.
        assert_eq!(out, vec![0.2, 0.4, 0.0]);
    }

    #[test]
    fn factor_one_is_plain_fir() {
        let mut d = Decimator::new(1, coeffs());
        let mut out = Vec::new();
        d.decimate(&[1.0, 0.0, 0.0, 0.0], &mut out);
        assert_eq!(out, vec![0.1, 0.2, 0.3, 0.4]);
    }

    #[test]
    fn output_count_is_independent_of_chunking() {
        let chunkings: [&[usize]; 4] = [&[10], &[1, 1, 1, 7], &[3, 3, 4], &[0, 9, 0, 1]];
        for factor in 1..=4 {
            for chunks in chunkings {
                let mut d = Decimator::new(factor, coeffs());
                let mut out = Vec::new();
                for &n in chunks {
                    let expected = d.output_len(n);
                    assert_eq!(d.decimate(&vec![0.5; n], &mut out), expected);
                }
                assert_eq!(out.len(), 10 / factor, "factor {factor} chunks {chunks:?}");
            }
        }
    }

    #[test]
    fn chunked_output_matches_single_call() {
        let input: Vec<f32> = (0..23).map(|i| (i as f32 * 0.37).sin()).collect();

        let mut whole = Decimator::new(3, coeffs());
        let mut expected = Vec::new();
        whole.decimate(&input, &mut expected);

        let mut chunked = Decimator::new(3, coeffs());
        let mut out = Vec::new();
        for chunk in input.chunks(4) {
            chunked.decimate(chunk, &mut out);
        }
        assert_eq!(out, expected);
    }

    #[test]
    fn taps_not_multiple_of_factor_are_tolerated() {
        let mut d = Decimator::new(3, coeffs());
        let mut out = Vec::new();
        d.decimate(&[1.0, 0.0, 0.0, 0.0, 0.0, 0.0], &mut out);
        assert_eq!(out, vec![0.3, 0.0]);
    }

    #[test]
    fn reset_restarts_phase() {
        let mut d = Decimator::new(2, coeffs());
        let mut out = Vec::new();
        d.decimate(&[1.0], &mut out);
        d.reset();
        assert_eq!(d.output_len(1), 0);
    }

    #[test]
    #[should_panic(expected = "decimation factor must be >= 1")]
    fn zero_factor_panics() {
        let _ = Decimator::new(0, coeffs());
    }
}
