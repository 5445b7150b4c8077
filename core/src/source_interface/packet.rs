use serde::{Deserialize, Serialize};

/// Generic complex sample container handed to best-effort consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplePacket {
    re: Vec<f32>,
    im: Vec<f32>,
    capacity: usize,
    pub sample_rate: u32,
    pub frequency: u64,
}

impl SamplePacket {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            re: Vec::with_capacity(capacity),
            im: Vec::with_capacity(capacity),
            capacity,
            sample_rate: 0,
            frequency: 0,
        }
    }

    /// Appends one complex sample; returns `false` once the packet is full.
    pub fn push(&mut self, re: f32, im: f32) -> bool {
        if self.is_full() {
            return false;
        }
        self.re.push(re);
        self.im.push(im);
        true
    }

    pub fn re(&self) -> &[f32] {
        &self.re
    }

    pub fn im(&self) -> &[f32] {
        &self.im
    }

    pub fn len(&self) -> usize {
        self.re.len()
    }

    pub fn is_empty(&self) -> bool {
        self.re.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.re.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.re.clear();
        self.im.clear();
    }
}
