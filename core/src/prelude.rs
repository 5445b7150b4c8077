use serde::{Deserialize, Serialize};
use std::fmt;

use crate::source_interface::AdapterError;

/// Identity of one of the two aligned receive channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    A,
    B,
}

impl Channel {
    pub fn index(self) -> usize {
        match self {
            Channel::A => 0,
            Channel::B => 1,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::A => write!(f, "A"),
            Channel::B => write!(f, "B"),
        }
    }
}

/// Interleaved I/Q samples captured by one channel adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct RawBuffer {
    samples: Vec<i16>,
    timestamp_ns: u64,
}

impl RawBuffer {
    pub fn new(samples: Vec<i16>, timestamp_ns: u64) -> Self {
        Self {
            samples,
            timestamp_ns,
        }
    }

    /// Interleaved `[I0, Q0, I1, Q1, ...]` samples.
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn timestamp_ns(&self) -> u64 {
        self.timestamp_ns
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn into_samples(self) -> Vec<i16> {
        self.samples
    }
}

/// One buffer from each channel judged to cover the same capture interval.
///
/// Both sample vectors always have the same length; the timestamp is the
/// later of the two capture timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedPair {
    channel_a: Vec<i16>,
    channel_b: Vec<i16>,
    timestamp_ns: u64,
}

impl AlignedPair {
    /// Pairs two buffers, refusing pairs whose sample counts differ.
    pub fn try_new(a: RawBuffer, b: RawBuffer) -> AlignerResult<Self> {
        if a.len() != b.len() {
            return Err(AlignerError::ProtocolMismatch {
                len_a: a.len(),
                len_b: b.len(),
            });
        }

        let timestamp_ns = a.timestamp_ns().max(b.timestamp_ns());
        Ok(Self {
            channel_a: a.into_samples(),
            channel_b: b.into_samples(),
            timestamp_ns,
        })
    }

    pub fn channel_a(&self) -> &[i16] {
        &self.channel_a
    }

    pub fn channel_b(&self) -> &[i16] {
        &self.channel_b
    }

    pub fn timestamp_ns(&self) -> u64 {
        self.timestamp_ns
    }

    /// Number of complex samples per channel.
    pub fn sample_count(&self) -> usize {
        self.channel_a.len() / 2
    }
}

/// Failures surfaced synchronously by the aligner.
#[derive(thiserror::Error, Debug)]
pub enum AlignerError {
    #[error("failed to open channel(s) {failed:?}")]
    OpenFailure { failed: Vec<Channel> },
    #[error("protocol mismatch: channel A delivered {len_a} samples, channel B delivered {len_b}")]
    ProtocolMismatch { len_a: usize, len_b: usize },
    #[error("aligner closed")]
    Closed,
    #[error("configuring channel {channel} failed: {source}")]
    Configuration {
        channel: Channel,
        #[source]
        source: AdapterError,
    },
}

pub type AlignerResult<T> = Result<T, AlignerError>;
