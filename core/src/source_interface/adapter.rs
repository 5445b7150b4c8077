use std::sync::Arc;
use std::time::Duration;

use crate::prelude::RawBuffer;

/// Errors reported by a channel adapter.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AdapterError {
    #[error("operation interrupted")]
    Interrupted,
    #[error("source is not open")]
    NotOpen,
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("malformed packet: {0}")]
    MalformedPacket(String),
}

/// Notifications an adapter delivers from its own capture thread.
pub trait ChannelCallback: Send + Sync {
    fn on_ready(&self);
    fn on_error(&self, message: &str);
    /// May block the adapter's thread when the receiver applies backpressure.
    fn on_buffer_ready(&self, buffer: RawBuffer);
}

/// Per-antenna receive source driven by hardware outside this crate.
pub trait ChannelAdapter: Send + Sync {
    fn name(&self) -> String;

    /// Starts capture. Returns `false` when the hardware could not be opened.
    fn open(&self, callback: Arc<dyn ChannelCallback>) -> bool;
    fn close(&self);
    fn is_open(&self) -> bool;

    fn sample_rate(&self) -> u32;
    fn packet_size(&self) -> usize;
    fn frequency(&self) -> u64;

    fn set_frequency(&self, frequency: u64) -> Result<(), AdapterError>;
    fn set_sample_rate(&self, sample_rate: u32) -> Result<(), AdapterError>;
}

/// Pull-mode access to raw packets, used by consumers polling a source directly.
pub trait PacketSource: ChannelAdapter {
    /// Waits up to `timeout` for the next packet; `Ok(None)` means the wait expired.
    fn get_packet(&self, timeout: Duration) -> Result<Option<Vec<u8>>, AdapterError>;

    /// Converts a raw packet into samples appended to `target`, returning how many were added.
    fn fill_sample_packet(
        &self,
        packet: &[u8],
        target: &mut super::SamplePacket,
    ) -> Result<usize, AdapterError>;

    /// Hands a packet buffer back to the source's pool.
    fn return_packet(&self, packet: Vec<u8>);
}
