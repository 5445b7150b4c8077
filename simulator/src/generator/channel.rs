use crate::generator::profile::{monotonic_ns, GeneratorConfig, ToneGenerator};
use dfcore::source_interface::{AdapterError, ChannelAdapter, ChannelCallback};
use dfcore::RawBuffer;
use log::{debug, error};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

struct Tuning {
    running: AtomicBool,
    session: AtomicU64,
    sample_rate: AtomicU32,
    frequency: AtomicU64,
}

/// Push-mode synthetic receiver that emits tone buffers from its own thread.
pub struct SyntheticChannel {
    name: String,
    config: GeneratorConfig,
    phase_offset: f64,
    seed: u64,
    tuning: Arc<Tuning>,
}

impl SyntheticChannel {
    pub fn new(name: &str, config: GeneratorConfig, phase_offset: f64, seed: u64) -> Self {
        let tuning = Arc::new(Tuning {
            running: AtomicBool::new(false),
            session: AtomicU64::new(0),
            sample_rate: AtomicU32::new(config.sample_rate),
            frequency: AtomicU64::new(config.frequency_hz),
        });
        Self {
            name: name.to_string(),
            config,
            phase_offset,
            seed,
            tuning,
        }
    }
}

impl ChannelAdapter for SyntheticChannel {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn open(&self, callback: Arc<dyn ChannelCallback>) -> bool {
        if self.tuning.running.swap(true, Ordering::SeqCst) {
            return true;
        }

        // A producer from an earlier session exits once it sees the new session id.
        let session = self.tuning.session.fetch_add(1, Ordering::SeqCst) + 1;
        let tuning = self.tuning.clone();
        let mut tone = ToneGenerator::new(&self.config, self.phase_offset, self.seed);
        let complex_per_buffer = self.config.normalized_packet_size() / 2;
        let interval = Duration::from_millis(self.config.interval_ms);
        let name = self.name.clone();

        let spawned = thread::Builder::new()
            .name(format!("synthetic-{}", self.name))
            .spawn(move || {
                callback.on_ready();
                while tuning.running.load(Ordering::SeqCst)
                    && tuning.session.load(Ordering::SeqCst) == session
                {
                    let sample_rate = tuning.sample_rate.load(Ordering::SeqCst);
                    let samples = tone.fill_i16(sample_rate, complex_per_buffer);
                    callback.on_buffer_ready(RawBuffer::new(samples, monotonic_ns()));
                    if !interval.is_zero() {
                        thread::sleep(interval);
                    }
                }
                debug!("synthetic channel {} stopped", name);
            });

        match spawned {
            Ok(_) => true,
            Err(err) => {
                error!("failed to start synthetic channel {}: {}", self.name, err);
                self.tuning.running.store(false, Ordering::SeqCst);
                false
            }
        }
    }

    fn close(&self) {
        self.tuning.running.store(false, Ordering::SeqCst);
    }

    fn is_open(&self) -> bool {
        self.tuning.running.load(Ordering::SeqCst)
    }

    fn sample_rate(&self) -> u32 {
        self.tuning.sample_rate.load(Ordering::SeqCst)
    }

    fn packet_size(&self) -> usize {
        self.config.normalized_packet_size()
    }

    fn frequency(&self) -> u64 {
        self.tuning.frequency.load(Ordering::SeqCst)
    }

    fn set_frequency(&self, frequency: u64) -> Result<(), AdapterError> {
        if frequency == 0 {
            return Err(AdapterError::Hardware("cannot tune to 0 Hz".into()));
        }
        self.tuning.frequency.store(frequency, Ordering::SeqCst);
        Ok(())
    }

    fn set_sample_rate(&self, sample_rate: u32) -> Result<(), AdapterError> {
        if sample_rate == 0 {
            return Err(AdapterError::Hardware("sample rate must be non-zero".into()));
        }
        self.tuning.sample_rate.store(sample_rate, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::mpsc;
    use std::sync::Mutex;
    use std::thread::ThreadId;

    struct Collector {
        ready: AtomicBool,
        buffers: Mutex<mpsc::Sender<RawBuffer>>,
    }

    impl ChannelCallback for Collector {
        fn on_ready(&self) {
            self.ready.store(true, Ordering::SeqCst);
        }

        fn on_error(&self, _message: &str) {}

        fn on_buffer_ready(&self, buffer: RawBuffer) {
            let _ = self.buffers.lock().unwrap().send(buffer);
        }
    }

    #[test]
    fn channel_emits_buffers_until_closed() {
        let config = GeneratorConfig {
            packet_size: 64,
            interval_ms: 1,
            ..GeneratorConfig::default()
        };
        let channel = SyntheticChannel::new("test", config, 0.0, 1);
        let (tx, rx) = mpsc::channel();
        let collector = Arc::new(Collector {
            ready: AtomicBool::new(false),
            buffers: Mutex::new(tx),
        });

        assert!(channel.open(collector.clone()));
        let first = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        let second = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        channel.close();

        assert!(collector.ready.load(Ordering::SeqCst));
        assert_eq!(first.len(), 64);
        assert!(second.timestamp_ns() >= first.timestamp_ns());
        assert!(!channel.is_open());
    }

    #[test]
    fn zero_frequency_is_rejected() {
        let channel = SyntheticChannel::new("test", GeneratorConfig::default(), 0.0, 1);
        assert!(channel.set_frequency(0).is_err());
        assert!(channel.set_frequency(433_000_000).is_ok());
        assert_eq!(channel.frequency(), 433_000_000);
    }

    #[derive(Default)]
    struct ProducerTracker {
        producers: Mutex<HashSet<ThreadId>>,
    }

    impl ChannelCallback for ProducerTracker {
        fn on_ready(&self) {}

        fn on_error(&self, _message: &str) {}

        fn on_buffer_ready(&self, _buffer: RawBuffer) {
            self.producers
                .lock()
                .unwrap()
                .insert(thread::current().id());
        }
    }

    #[test]
    fn quick_reopen_leaves_a_single_producer() {
        let config = GeneratorConfig {
            packet_size: 32,
            interval_ms: 1,
            ..GeneratorConfig::default()
        };
        let channel = SyntheticChannel::new("test", config, 0.0, 1);
        let tracker = Arc::new(ProducerTracker::default());

        assert!(channel.open(tracker.clone()));
        channel.close();
        assert!(channel.open(tracker.clone()));

        thread::sleep(Duration::from_millis(50));
        tracker.producers.lock().unwrap().clear();
        thread::sleep(Duration::from_millis(50));
        channel.close();

        assert_eq!(tracker.producers.lock().unwrap().len(), 1);
    }
}
