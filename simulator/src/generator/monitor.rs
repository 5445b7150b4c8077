use crate::generator::profile::{GeneratorConfig, ToneGenerator};
use dfcore::source_interface::{
    AdapterError, ChannelAdapter, ChannelCallback, PacketSource, SamplePacket,
};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

const POOL_LIMIT: usize = 16;

/// Pull-mode synthetic source producing 8-bit offset-binary I/Q packets.
pub struct SyntheticPacketSource {
    name: String,
    config: GeneratorConfig,
    open: AtomicBool,
    sample_rate: AtomicU32,
    frequency: AtomicU64,
    tone: Mutex<ToneGenerator>,
    pool: Mutex<Vec<Vec<u8>>>,
}

impl SyntheticPacketSource {
    pub fn new(name: &str, config: GeneratorConfig, seed: u64) -> Self {
        Self {
            name: name.to_string(),
            open: AtomicBool::new(false),
            sample_rate: AtomicU32::new(config.sample_rate),
            frequency: AtomicU64::new(config.frequency_hz),
            tone: Mutex::new(ToneGenerator::new(&config, 0.0, seed)),
            pool: Mutex::new(Vec::new()),
            config,
        }
    }

    #[cfg(test)]
    pub fn pooled_packets(&self) -> usize {
        self.pool.lock().map(|pool| pool.len()).unwrap_or(0)
    }
}

impl ChannelAdapter for SyntheticPacketSource {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn open(&self, callback: Arc<dyn ChannelCallback>) -> bool {
        self.open.store(true, Ordering::SeqCst);
        callback.on_ready();
        true
    }

    fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate.load(Ordering::SeqCst)
    }

    fn packet_size(&self) -> usize {
        self.config.normalized_packet_size()
    }

    fn frequency(&self) -> u64 {
        self.frequency.load(Ordering::SeqCst)
    }

    fn set_frequency(&self, frequency: u64) -> Result<(), AdapterError> {
        self.frequency.store(frequency, Ordering::SeqCst);
        Ok(())
    }

    fn set_sample_rate(&self, sample_rate: u32) -> Result<(), AdapterError> {
        self.sample_rate.store(sample_rate, Ordering::SeqCst);
        Ok(())
    }
}

impl PacketSource for SyntheticPacketSource {
    fn get_packet(&self, timeout: Duration) -> Result<Option<Vec<u8>>, AdapterError> {
        if !self.is_open() {
            return Ok(None);
        }

        let interval = Duration::from_millis(self.config.interval_ms);
        thread::sleep(interval.min(timeout));
        if !self.is_open() {
            return Ok(None);
        }

        let mut packet = self
            .pool
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
            .unwrap_or_else(|| Vec::with_capacity(self.packet_size()));
        packet.clear();

        self.tone
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .fill_u8(self.sample_rate(), self.packet_size() / 2, &mut packet);
        Ok(Some(packet))
    }

    fn fill_sample_packet(
        &self,
        packet: &[u8],
        target: &mut SamplePacket,
    ) -> Result<usize, AdapterError> {
        if packet.len() % 2 != 0 {
            return Err(AdapterError::MalformedPacket(format!(
                "{} bytes is not a whole number of I/Q pairs",
                packet.len()
            )));
        }

        let mut added = 0;
        for pair in packet.chunks_exact(2) {
            let re = (f32::from(pair[0]) - 127.4) / 128.0;
            let im = (f32::from(pair[1]) - 127.4) / 128.0;
            if !target.push(re, im) {
                break;
            }
            added += 1;
        }
        Ok(added)
    }

    fn return_packet(&self, packet: Vec<u8>) {
        let mut pool = self.pool.lock().unwrap_or_else(PoisonError::into_inner);
        if pool.len() < POOL_LIMIT {
            pool.push(packet);
        }
    }
}
