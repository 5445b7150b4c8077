use std::fmt::Display;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use crate::prelude::{AlignedPair, AlignerError, AlignerResult, Channel, RawBuffer};
use crate::processing::queue::{ChannelQueue, CHANNEL_QUEUE_CAPACITY};
use crate::source_interface::{AdapterError, ChannelAdapter, ChannelCallback};
use crate::telemetry::{LogManager, MetricsRecorder};

/// Receives lifecycle events of the aligned stream.
pub trait AlignerObserver: Send + Sync {
    /// Both channels reported ready. Called once per open session.
    fn on_ready(&self);
    /// First asynchronous error reported by either channel in this session.
    fn on_error(&self, channel: Channel, message: &str);
}

struct AlignerShared {
    channel_a: Arc<dyn ChannelAdapter>,
    channel_b: Arc<dyn ChannelAdapter>,
    queues: [ChannelQueue<RawBuffer>; 2],
    observer: RwLock<Option<Arc<dyn AlignerObserver>>>,
    ready: [AtomicBool; 2],
    ready_announced: AtomicBool,
    error_forwarded: AtomicBool,
    metrics: Arc<MetricsRecorder>,
    logger: LogManager,
}

impl AlignerShared {
    fn adapter(&self, channel: Channel) -> &dyn ChannelAdapter {
        match channel {
            Channel::A => self.channel_a.as_ref(),
            Channel::B => self.channel_b.as_ref(),
        }
    }

    fn queue(&self, channel: Channel) -> &ChannelQueue<RawBuffer> {
        &self.queues[channel.index()]
    }

    fn observer(&self) -> Option<Arc<dyn AlignerObserver>> {
        self.observer
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn on_ready(&self, channel: Channel) {
        self.ready[channel.index()].store(true, Ordering::SeqCst);
        self.logger
            .debug(&format!("channel {} reported ready", channel));

        let both_ready = self.ready.iter().all(|flag| flag.load(Ordering::SeqCst));
        let both_open = self.channel_a.is_open() && self.channel_b.is_open();
        if both_ready && both_open && !self.ready_announced.swap(true, Ordering::SeqCst) {
            self.logger.record("both channels ready");
            if let Some(observer) = self.observer() {
                observer.on_ready();
            }
        }
    }

    fn on_error(&self, channel: Channel, message: &str) {
        self.metrics.record_error();
        if self.error_forwarded.swap(true, Ordering::SeqCst) {
            self.logger
                .warn(&format!("further error on channel {}: {}", channel, message));
            return;
        }

        self.logger
            .error(&format!("channel {} error: {}", channel, message));
        if let Some(observer) = self.observer() {
            observer.on_error(channel, message);
        }
    }

    fn on_buffer_ready(&self, channel: Channel, buffer: RawBuffer) {
        // Blocks the adapter's thread while the channel queue is full.
        if self.queue(channel).put(buffer).is_err() {
            self.logger.debug(&format!(
                "channel {} buffer discarded, aligner closed",
                channel
            ));
        }
    }
}

/// Callback handed to one adapter; tags everything it receives with the channel identity.
struct ChannelSink {
    channel: Channel,
    shared: Weak<AlignerShared>,
}

impl ChannelCallback for ChannelSink {
    fn on_ready(&self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.on_ready(self.channel);
        }
    }

    fn on_error(&self, message: &str) {
        if let Some(shared) = self.shared.upgrade() {
            shared.on_error(self.channel, message);
        }
    }

    fn on_buffer_ready(&self, buffer: RawBuffer) {
        if let Some(shared) = self.shared.upgrade() {
            shared.on_buffer_ready(self.channel, buffer);
        }
    }
}

/// Presents two independently clocked channels as one stream of aligned pairs.
///
/// Each channel feeds its own blocking FIFO of [`CHANNEL_QUEUE_CAPACITY`]
/// buffers, so a fast channel is throttled instead of losing data. Cloning
/// yields another handle to the same aligner, which lets one thread block in
/// [`Aligner::next`] while another calls [`Aligner::close`].
#[derive(Clone)]
pub struct Aligner {
    shared: Arc<AlignerShared>,
}

impl Aligner {
    pub fn new(channel_a: Arc<dyn ChannelAdapter>, channel_b: Arc<dyn ChannelAdapter>) -> Self {
        Self::with_metrics(channel_a, channel_b, Arc::new(MetricsRecorder::new()))
    }

    pub fn with_metrics(
        channel_a: Arc<dyn ChannelAdapter>,
        channel_b: Arc<dyn ChannelAdapter>,
        metrics: Arc<MetricsRecorder>,
    ) -> Self {
        let queues = [
            ChannelQueue::blocking(CHANNEL_QUEUE_CAPACITY),
            ChannelQueue::blocking(CHANNEL_QUEUE_CAPACITY),
        ];
        // No data flows until open().
        for queue in &queues {
            queue.close();
        }

        let logger = LogManager::new(format!(
            "aligner {} + {}",
            channel_a.name(),
            channel_b.name()
        ));

        Self {
            shared: Arc::new(AlignerShared {
                channel_a,
                channel_b,
                queues,
                observer: RwLock::new(None),
                ready: [AtomicBool::new(false), AtomicBool::new(false)],
                ready_announced: AtomicBool::new(false),
                error_forwarded: AtomicBool::new(false),
                metrics,
                logger,
            }),
        }
    }

    /// Opens both channels. Both adapters are always asked to open; a channel
    /// that did open stays open on failure and must be torn down with [`Aligner::close`].
    pub fn open(&self, observer: Arc<dyn AlignerObserver>) -> AlignerResult<()> {
        let shared = &self.shared;
        *shared
            .observer
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(observer);
        for flag in &shared.ready {
            flag.store(false, Ordering::SeqCst);
        }
        shared.ready_announced.store(false, Ordering::SeqCst);
        shared.error_forwarded.store(false, Ordering::SeqCst);
        for queue in &shared.queues {
            queue.reopen();
        }

        let mut failed = Vec::new();
        for channel in [Channel::A, Channel::B] {
            let sink = Arc::new(ChannelSink {
                channel,
                shared: Arc::downgrade(shared),
            });
            if !shared.adapter(channel).open(sink) {
                failed.push(channel);
            }
        }

        if failed.is_empty() {
            shared.logger.record("opened both channels");
            Ok(())
        } else {
            shared
                .logger
                .error(&format!("open failed on channel(s) {:?}", failed));
            Err(AlignerError::OpenFailure { failed })
        }
    }

    /// Stops both channels, then discards queued buffers and cancels blocked callers.
    pub fn close(&self) {
        let shared = &self.shared;
        shared.channel_a.close();
        shared.channel_b.close();
        let discarded: usize = shared.queues.iter().map(ChannelQueue::close).sum();
        shared
            .logger
            .record(&format!("closed, discarded {} queued buffers", discarded));
    }

    pub fn is_open(&self) -> bool {
        self.shared.channel_a.is_open() && self.shared.channel_b.is_open()
    }

    pub fn name(&self) -> String {
        format!(
            "{} + {}",
            self.shared.channel_a.name(),
            self.shared.channel_b.name()
        )
    }

    pub fn sample_rate(&self) -> u32 {
        self.shared.channel_a.sample_rate()
    }

    pub fn packet_size(&self) -> usize {
        self.shared.channel_a.packet_size()
    }

    pub fn frequency(&self) -> u64 {
        self.shared.channel_a.frequency()
    }

    pub fn metrics(&self) -> Arc<MetricsRecorder> {
        self.shared.metrics.clone()
    }

    /// Retunes both channels, rolling channel A back if channel B rejects the change.
    pub fn set_frequency(&self, frequency: u64) -> AlignerResult<()> {
        self.apply_to_both(
            "frequency",
            frequency,
            |adapter| adapter.frequency(),
            |adapter, value| adapter.set_frequency(value),
        )
    }

    /// Changes the sample rate of both channels, rolling channel A back on failure.
    pub fn set_sample_rate(&self, sample_rate: u32) -> AlignerResult<()> {
        self.apply_to_both(
            "sample rate",
            sample_rate,
            |adapter| adapter.sample_rate(),
            |adapter, value| adapter.set_sample_rate(value),
        )
    }

    fn apply_to_both<V: Copy + Display>(
        &self,
        setting: &str,
        value: V,
        current: impl Fn(&dyn ChannelAdapter) -> V,
        apply: impl Fn(&dyn ChannelAdapter, V) -> Result<(), AdapterError>,
    ) -> AlignerResult<()> {
        let shared = &self.shared;
        let previous = current(shared.adapter(Channel::A));

        apply(shared.adapter(Channel::A), value).map_err(|source| {
            AlignerError::Configuration {
                channel: Channel::A,
                source,
            }
        })?;

        if let Err(source) = apply(shared.adapter(Channel::B), value) {
            match apply(shared.adapter(Channel::A), previous) {
                Ok(()) => shared.logger.warn(&format!(
                    "channel B rejected {} {}; channel A restored to {}",
                    setting, value, previous
                )),
                Err(rollback) => shared.logger.error(&format!(
                    "{} diverged: channel A at {}, channel B rejected it, rollback failed: {}",
                    setting, value, rollback
                )),
            }
            return Err(AlignerError::Configuration {
                channel: Channel::B,
                source,
            });
        }

        Ok(())
    }

    /// Routes a buffer to its channel queue, blocking while that queue is full.
    pub fn on_buffer_ready(&self, channel: Channel, buffer: RawBuffer) {
        self.shared.on_buffer_ready(channel, buffer);
    }

    pub fn on_ready(&self, channel: Channel) {
        self.shared.on_ready(channel);
    }

    pub fn on_error(&self, channel: Channel, message: &str) {
        self.shared.on_error(channel, message);
    }

    /// Blocks for the next buffer of channel A, then the next of channel B, and pairs them.
    ///
    /// Fails with [`AlignerError::ProtocolMismatch`] when the sample counts
    /// differ; both buffers are consumed and the next call may succeed. Fails
    /// with [`AlignerError::Closed`] once the aligner is closed.
    pub fn next(&self) -> AlignerResult<AlignedPair> {
        let shared = &self.shared;
        let a = shared
            .queue(Channel::A)
            .take()
            .map_err(|_| AlignerError::Closed)?;
        let b = shared
            .queue(Channel::B)
            .take()
            .map_err(|_| AlignerError::Closed)?;

        match AlignedPair::try_new(a, b) {
            Ok(pair) => {
                shared.metrics.record_aligned();
                Ok(pair)
            }
            Err(err) => {
                shared.metrics.record_mismatch();
                shared.logger.warn(&err.to_string());
                Err(err)
            }
        }
    }
}
