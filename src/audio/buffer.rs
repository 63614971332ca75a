//! Fixed-capacity circular (ring) storage for `f32` audio samples.
//!
//! [`SampleRing`] is the storage behind every elastic buffer in the pipeline.
//! It supports two overflow policies, chosen per call:
//!
//! * **bounded**: excess samples are rejected and the caller sees a short
//!   count (backpressure),
//! * **overwrite**: the oldest samples are discarded so the most recent
//!   `capacity` samples are always kept.
//!
//! Reading is done without copying through [`peek`](SampleRing::peek) +
//! [`consume`](SampleRing::consume), so a consumer can hand the contiguous
//! front of the buffer to a sink and only drop what the sink accepted.
//!
//! # Example
//!
//! ```rust
//! use ham_stream::audio::SampleRing;
//!
//! let mut ring = SampleRing::new(4);
//! ring.push_slice(&[1.0, 2.0, 3.0, 4.0, 5.0], true); // overwrite: 1.0 is dropped
//! assert_eq!(ring.drain(), vec![2.0, 3.0, 4.0, 5.0]);
//!
//! let mut bounded = SampleRing::new(2);
//! assert_eq!(bounded.push_slice(&[1.0, 2.0, 3.0], false), 2);
//! ```

// ---------------------------------------------------------------------------
// SampleRing
// ---------------------------------------------------------------------------

/// A fixed-capacity circular sample buffer.
///
/// The buffer never allocates beyond the capacity it was created (or last
/// resized) with.
#[derive(Debug, Clone)]
pub struct SampleRing {
    buf: Vec<f32>,
    /// Index of the *next* write position (wraps around `capacity`).
    head: usize,
    /// Index of the oldest stored sample.
    tail: usize,
    /// Number of valid samples currently stored (≤ `capacity`).
    len: usize,
}

impl SampleRing {
    /// Create a new ring with room for `capacity` samples.
    ///
    /// # Panics
    ///
    /// Panics if `capacity == 0`.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "SampleRing capacity must be > 0");
        Self {
            buf: vec![0.0; capacity],
            head: 0,
            tail: 0,
            len: 0,
        }
    }

    /// Append `data` to the ring and return how many samples were taken.
    ///
    /// With `overwrite` set every sample is taken and the oldest stored
    /// samples are discarded as needed.  Without it only the free space is
    /// filled and the rest of `data` is left to the caller.
    pub fn push_slice(&mut self, data: &[f32], overwrite: bool) -> usize {
        let capacity = self.capacity();
        let count = if overwrite {
            data.len()
        } else {
            data.len().min(capacity - self.len)
        };

        // Only the newest `capacity` samples can survive an overwrite.
        let skip = count.saturating_sub(capacity);
        for &sample in &data[skip..count] {
            self.buf[self.head] = sample;
            self.head = (self.head + 1) % capacity;
            if self.len == capacity {
                self.tail = (self.tail + 1) % capacity;
            } else {
                self.len += 1;
            }
        }

        count
    }

    /// The contiguous run of samples at the front of the ring, at most `max`
    /// long.
    ///
    /// When the stored samples wrap around the end of the storage only the
    /// part up to the end is returned; call again after
    /// [`consume`](Self::consume) to get the rest.
    pub fn peek(&self, max: usize) -> &[f32] {
        let count = max.min(self.len).min(self.capacity() - self.tail);
        &self.buf[self.tail..self.tail + count]
    }

    /// Drop up to `count` samples from the front of the ring.
    pub fn consume(&mut self, count: usize) {
        let count = count.min(self.len);
        self.tail = (self.tail + count) % self.capacity();
        self.len -= count;
    }

    /// Drain all stored samples in chronological order and reset the ring.
    ///
    /// After this call `len() == 0`.
    pub fn drain(&mut self) -> Vec<f32> {
        let mut result = Vec::with_capacity(self.len);
        while !self.is_empty() {
            let chunk = self.peek(self.len);
            result.extend_from_slice(chunk);
            let taken = chunk.len();
            self.consume(taken);
        }
        self.clear();
        result
    }

    /// Discard all samples and reset the read/write positions.
    pub fn clear(&mut self) {
        self.head = 0;
        self.tail = 0;
        self.len = 0;
    }

    /// Replace the storage with one of `capacity` samples.  Stored samples
    /// are discarded.
    ///
    /// # Panics
    ///
    /// Panics if `capacity == 0`.
    pub fn resize(&mut self, capacity: usize) {
        assert!(capacity > 0, "SampleRing capacity must be > 0");
        self.buf = vec![0.0; capacity];
        self.clear();
    }

    /// Number of valid samples currently stored.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` when the ring holds no samples.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Maximum number of samples the ring can hold.
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Returns `true` when the ring is filled to capacity.
    pub fn is_full(&self) -> bool {
        self.len == self.capacity()
    }

    /// Free space in samples.
    pub fn space(&self) -> usize {
        self.capacity() - self.len
    }

    /// Duration of the stored audio in seconds, assuming `sample_rate` Hz mono.
    pub fn duration_secs(&self, sample_rate: u32) -> f32 {
        if sample_rate == 0 {
            return 0.0;
        }
        self.len as f32 / sample_rate as f32
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
