use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::processing::queue::{Backpressure, ChannelQueue, Offer, QueueError};
use crate::source_interface::{AdapterError, ChannelAdapter, PacketSource, SamplePacket};
use crate::telemetry::{LogManager, MetricsRecorder};

/// Timing of the tap's poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TapConfig {
    /// How long one poll waits for a packet before checking the source again.
    pub poll_timeout: Duration,
    /// How long a converted packet may wait for room downstream before it is dropped.
    pub offer_wait: Duration,
    /// Floor on the per-packet sample capacity.
    pub min_sample_capacity: usize,
}

impl Default for TapConfig {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_millis(1000),
            offer_wait: Duration::from_millis(200),
            min_sample_capacity: 256,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum TapError {
    #[error("downstream queue blocks when full; the tap requires a drop-on-full queue")]
    BlockingDownstream,
    #[error("failed to spawn tap thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Totals reported when the tap loop ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TapStats {
    pub forwarded: u64,
    pub dropped: u64,
    pub errors: u64,
}

/// Background poller that drains one source into a lossy downstream queue.
///
/// Packets that find the downstream queue full for longer than
/// [`TapConfig::offer_wait`] are dropped; the source is never throttled.
pub struct AuxiliaryTap {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<TapStats>>,
}

impl AuxiliaryTap {
    /// Builds a downstream queue with the drop-on-full policy the tap expects.
    pub fn downstream_queue(capacity: usize, config: &TapConfig) -> ChannelQueue<SamplePacket> {
        ChannelQueue::dropping(capacity, config.offer_wait)
    }

    pub fn spawn(
        source: Arc<dyn PacketSource>,
        output: Arc<ChannelQueue<SamplePacket>>,
        config: TapConfig,
        metrics: Arc<MetricsRecorder>,
    ) -> Result<Self, TapError> {
        if output.policy() == Backpressure::Blocking {
            return Err(TapError::BlockingDownstream);
        }

        let stop = Arc::new(AtomicBool::new(false));
        let tap_loop = TapLoop::new(source, output, stop.clone(), config, metrics);
        let handle = thread::Builder::new()
            .name("auxiliary-tap".to_string())
            .spawn(move || tap_loop.run())?;

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        !self.stop.load(Ordering::SeqCst)
            && self
                .handle
                .as_ref()
                .map_or(false, |handle| !handle.is_finished())
    }

    /// Asks the loop to exit. It notices within one poll timeout.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Waits for the loop to exit and returns its totals.
    pub fn join(mut self) -> TapStats {
        self.handle
            .take()
            .map(|handle| handle.join().unwrap_or_default())
            .unwrap_or_default()
    }
}

impl Drop for AuxiliaryTap {
    fn drop(&mut self) {
        self.request_stop();
    }
}

struct TapLoop {
    source: Arc<dyn PacketSource>,
    output: Arc<ChannelQueue<SamplePacket>>,
    stop: Arc<AtomicBool>,
    config: TapConfig,
    metrics: Arc<MetricsRecorder>,
    logger: LogManager,
    stats: TapStats,
}

impl TapLoop {
    fn new(
        source: Arc<dyn PacketSource>,
        output: Arc<ChannelQueue<SamplePacket>>,
        stop: Arc<AtomicBool>,
        config: TapConfig,
        metrics: Arc<MetricsRecorder>,
    ) -> Self {
        let logger = LogManager::new(format!("tap {}", source.name()));
        Self {
            source,
            output,
            stop,
            config,
            metrics,
            logger,
            stats: TapStats::default(),
        }
    }

    fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    fn run(mut self) -> TapStats {
        self.logger.record("started");
        let capacity = (self.source.packet_size() / 2).max(self.config.min_sample_capacity);

        while !self.stop_requested() {
            match self.source.get_packet(self.config.poll_timeout) {
                Ok(Some(packet)) => {
                    let converted = self.convert(&packet, capacity);
                    self.source.return_packet(packet);
                    match converted {
                        Ok(Some(samples)) => {
                            if !self.forward(samples) {
                                break;
                            }
                        }
                        Ok(None) => {}
                        Err(err) => {
                            if self.fail(&err) {
                                break;
                            }
                        }
                    }
                }
                Ok(None) => {
                    if !self.source.is_open() {
                        self.logger.record("source closed; stopping");
                        break;
                    }
                }
                Err(AdapterError::Interrupted) => {
                    if self.stop_requested() {
                        break;
                    }
                    self.logger.debug("poll interrupted without a stop request");
                }
                Err(err) => {
                    if self.fail(&err) {
                        break;
                    }
                }
            }
        }

        self.logger.record(&format!(
            "stopped: forwarded {}, dropped {}, errors {}",
            self.stats.forwarded, self.stats.dropped, self.stats.errors
        ));
        self.stats
    }

    fn convert(
        &self,
        packet: &[u8],
        capacity: usize,
    ) -> Result<Option<SamplePacket>, AdapterError> {
        let mut samples = SamplePacket::with_capacity(capacity);
        if self.source.fill_sample_packet(packet, &mut samples)? == 0 {
            return Ok(None);
        }
        // Snapshot only; a concurrent retune may land between these reads.
        samples.sample_rate = self.source.sample_rate();
        samples.frequency = self.source.frequency();
        Ok(Some(samples))
    }

    /// Returns `false` when the downstream queue is gone.
    fn forward(&mut self, samples: SamplePacket) -> bool {
        match self.output.push(samples) {
            Ok(Offer::Accepted) => {
                self.stats.forwarded += 1;
                self.metrics.record_forwarded();
                true
            }
            Ok(Offer::Dropped(_)) => {
                self.stats.dropped += 1;
                self.metrics.record_dropped();
                self.logger.warn("output queue full; dropping packet");
                true
            }
            Err(QueueError::Closed) => {
                self.logger.record("output queue closed; stopping");
                false
            }
        }
    }

    /// Records a failure; returns `true` when the loop should end.
    fn fail(&mut self, err: &AdapterError) -> bool {
        self.stats.errors += 1;
        self.metrics.record_error();
        self.logger.error(&err.to_string());
        !self.source.is_open()
    }
}
