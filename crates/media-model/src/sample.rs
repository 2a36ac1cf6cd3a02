//! Demuxed sample types.
//!
//! A sample is one encoded access unit as delivered by the external
//! demuxer. Timestamps stay rational (`cts / timescale`) so no precision is
//! lost until a caller asks for microseconds.

use bytes::Bytes;

/// Microseconds per second.
pub const US_PER_SEC: i64 = 1_000_000;

/// Convert a rational timestamp to integer microseconds (floor).
pub fn ticks_to_us(ticks: i64, timescale: u32) -> i64 {
    if timescale == 0 {
        return 0;
    }
    (ticks as i128 * US_PER_SEC as i128).div_euclid(timescale as i128) as i64
}

/// Convert integer microseconds to ticks of the given timescale (floor).
pub fn us_to_ticks(us: i64, timescale: u32) -> i64 {
    (us as i128 * timescale as i128).div_euclid(US_PER_SEC as i128) as i64
}

/// One encoded sample. Immutable once demuxed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    /// Composition timestamp in `timescale` units.
    pub cts: i64,

    /// Duration in `timescale` units.
    pub duration: u32,

    /// Ticks per second for `cts` and `duration`.
    pub timescale: u32,

    /// Whether the sample is decodable without reference to earlier samples.
    pub is_keyframe: bool,

    /// Opaque encoded bitstream.
    pub data: Bytes,
}

impl Sample {
    /// Create a sample.
    pub fn new(cts: i64, duration: u32, timescale: u32, is_keyframe: bool, data: Bytes) -> Self {
        Self {
            cts,
            duration,
            timescale,
            is_keyframe,
            data,
        }
    }

    /// Composition timestamp in microseconds.
    pub fn timestamp_us(&self) -> i64 {
        ticks_to_us(self.cts, self.timescale)
    }

    /// Duration in microseconds.
    pub fn duration_us(&self) -> i64 {
        ticks_to_us(self.duration as i64, self.timescale)
    }

    /// Payload size in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// Ascending indices of keyframe samples within a sample table.
///
/// Derived once at demux time and read-only thereafter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyframeIndex {
    indices: Vec<usize>,
}

impl KeyframeIndex {
    /// Build the index by scanning a sample table.
    pub fn from_samples(samples: &[Sample]) -> Self {
        Self {
            indices: samples
                .iter()
                .enumerate()
                .filter(|(_, s)| s.is_keyframe)
                .map(|(i, _)| i)
                .collect(),
        }
    }

    /// Build from explicit indices. Unsorted or duplicated input is normalized.
    pub fn from_indices(mut indices: Vec<usize>) -> Self {
        indices.sort_unstable();
        indices.dedup();
        Self { indices }
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.indices
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}
