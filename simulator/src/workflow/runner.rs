use crate::generator::{interferometer_phase, SyntheticChannel, SyntheticPacketSource};
use crate::workflow::config::WorkflowConfig;
use anyhow::{bail, Context};
use dfcore::processing::{
    Aligner, AlignerObserver, AuxiliaryTap, ChannelQueue, DoaEstimate, DoaEstimator, TapStats,
};
use dfcore::source_interface::{ChannelAdapter, ChannelCallback, SamplePacket};
use dfcore::telemetry::{MetricsRecorder, MetricsSnapshot};
use dfcore::{AlignerError, Channel, RawBuffer};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

const DRAIN_POLL: Duration = Duration::from_millis(20);

pub struct WorkflowResult {
    pub estimates: Vec<DoaEstimate>,
    pub mismatches: usize,
    pub metrics: MetricsSnapshot,
    pub tap: Option<TapStats>,
    pub monitor: Option<MonitorSummary>,
}

/// What the monitor consumer saw on the far side of the tap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MonitorSummary {
    pub packets: u64,
    pub samples: u64,
    pub mean_power: f64,
    pub sample_rate: u32,
    pub frequency: u64,
}

impl MonitorSummary {
    fn absorb(&mut self, packet: &SamplePacket) {
        let energy: f64 = packet
            .re()
            .iter()
            .zip(packet.im())
            .map(|(&re, &im)| f64::from(re * re + im * im))
            .sum();
        let total = self.mean_power * self.samples as f64 + energy;
        self.packets += 1;
        self.samples += packet.len() as u64;
        if self.samples > 0 {
            self.mean_power = total / self.samples as f64;
        }
        self.sample_rate = packet.sample_rate;
        self.frequency = packet.frequency;
    }
}

/// Consumer thread reading the tap's downstream queue.
struct MonitorDrain {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<MonitorSummary>,
}

impl MonitorDrain {
    fn spawn(queue: Arc<ChannelQueue<SamplePacket>>) -> std::io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        let handle = thread::Builder::new()
            .name("monitor-drain".to_string())
            .spawn(move || {
                let mut summary = MonitorSummary::default();
                loop {
                    match queue.take_timeout(DRAIN_POLL) {
                        Ok(Some(packet)) => summary.absorb(&packet),
                        Ok(None) if flag.load(Ordering::SeqCst) => break,
                        Ok(None) => {}
                        Err(_) => break,
                    }
                }
                summary
            })?;
        Ok(Self { stop, handle })
    }

    /// Returns once the queue stays empty after the tap has been joined.
    fn finish(self) -> MonitorSummary {
        self.stop.store(true, Ordering::SeqCst);
        self.handle.join().unwrap_or_else(|_| {
            warn!("monitor drain panicked");
            MonitorSummary::default()
        })
    }
}

struct Monitor {
    source: Arc<SyntheticPacketSource>,
    tap: AuxiliaryTap,
    drain: MonitorDrain,
}

impl Monitor {
    fn shutdown(self) -> (TapStats, MonitorSummary) {
        self.tap.request_stop();
        self.source.close();
        let stats = self.tap.join();
        let summary = self.drain.finish();
        debug!(
            "monitor drained {} packets at {:.4} mean power",
            summary.packets, summary.mean_power
        );
        (stats, summary)
    }
}

impl WorkflowResult {
    pub fn undefined_count(&self) -> usize {
        self.estimates.iter().filter(|e| !e.is_defined()).count()
    }

    /// Mean of the defined estimates, in degrees.
    pub fn mean_degrees(&self) -> Option<f64> {
        let defined: Vec<f64> = self.estimates.iter().filter_map(DoaEstimate::degrees).collect();
        if defined.is_empty() {
            None
        } else {
            Some(defined.iter().sum::<f64>() / defined.len() as f64)
        }
    }
}

struct LoggingObserver;

impl AlignerObserver for LoggingObserver {
    fn on_ready(&self) {
        info!("aligned stream ready");
    }

    fn on_error(&self, channel: Channel, message: &str) {
        error!("channel {} reported: {}", channel, message);
    }
}

/// Lifecycle sink for the pull-mode monitor source.
struct MonitorCallback;

impl ChannelCallback for MonitorCallback {
    fn on_ready(&self) {
        info!("monitor source ready");
    }

    fn on_error(&self, message: &str) {
        error!("monitor source reported: {}", message);
    }

    fn on_buffer_ready(&self, buffer: RawBuffer) {
        debug!("monitor pushed {} samples outside the tap", buffer.len());
    }
}

#[derive(Clone)]
pub struct Runner {
    config: WorkflowConfig,
}

impl Runner {
    pub fn new(config: WorkflowConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> anyhow::Result<WorkflowResult> {
        let generator = &self.config.generator;
        let estimator = DoaEstimator::new(self.config.doa).context("building DOA estimator")?;
        let phase_lead = interferometer_phase(&self.config.doa, generator.arrival_angle_deg);
        let metrics = Arc::new(MetricsRecorder::new());

        let channel_a = Arc::new(SyntheticChannel::new(
            "synthetic-a",
            generator.clone(),
            0.0,
            generator.seed,
        ));
        let channel_b = Arc::new(SyntheticChannel::new(
            "synthetic-b",
            generator.clone(),
            phase_lead,
            generator.seed.wrapping_add(1),
        ));
        let aligner = Aligner::with_metrics(channel_a, channel_b, metrics.clone());
        aligner
            .set_frequency(generator.frequency_hz)
            .context("tuning aligned channels")?;
        aligner
            .set_sample_rate(generator.sample_rate)
            .context("setting aligned sample rate")?;

        if let Err(err) = aligner.open(Arc::new(LoggingObserver)) {
            aligner.close();
            return Err(err).context("opening aligned channels");
        }

        let monitor = if self.config.monitor {
            match self.start_monitor(metrics.clone()) {
                Ok(monitor) => Some(monitor),
                Err(err) => {
                    aligner.close();
                    return Err(err);
                }
            }
        } else {
            None
        };

        let collected = self.collect(&aligner, &estimator);
        aligner.close();

        let (tap, monitor) = match monitor.map(Monitor::shutdown) {
            Some((stats, summary)) => (Some(stats), Some(summary)),
            None => (None, None),
        };

        let (estimates, mismatches) = collected?;
        info!(
            "collected {} estimates ({} mismatched pairs) from {}",
            estimates.len(),
            mismatches,
            aligner.name()
        );

        Ok(WorkflowResult {
            estimates,
            mismatches,
            metrics: metrics.snapshot(),
            tap,
            monitor,
        })
    }

    fn collect(
        &self,
        aligner: &Aligner,
        estimator: &DoaEstimator,
    ) -> anyhow::Result<(Vec<DoaEstimate>, usize)> {
        let pairs = self.config.pairs;
        let mut estimates = Vec::with_capacity(pairs);
        let mut mismatches = 0;

        while estimates.len() < pairs {
            match aligner.next() {
                Ok(pair) => estimates.push(estimator.estimate(&pair)),
                Err(AlignerError::ProtocolMismatch { .. }) => {
                    mismatches += 1;
                    if mismatches > pairs {
                        bail!("channels keep disagreeing on packet size");
                    }
                }
                Err(err) => return Err(err).context("reading aligned pair"),
            }
        }

        Ok((estimates, mismatches))
    }

    fn start_monitor(
        &self,
        metrics: Arc<MetricsRecorder>,
    ) -> anyhow::Result<Monitor> {
        let generator = &self.config.generator;
        let source = Arc::new(SyntheticPacketSource::new(
            "synthetic-monitor",
            generator.clone(),
            generator.seed.wrapping_add(2),
        ));
        if !source.open(Arc::new(MonitorCallback)) {
            bail!("monitor source failed to open");
        }

        let tap_config = self.config.to_tap_config();
        let output = Arc::new(AuxiliaryTap::downstream_queue(
            self.config.monitor_queue_capacity,
            &tap_config,
        ));
        let drain = match MonitorDrain::spawn(output.clone()) {
            Ok(drain) => drain,
            Err(err) => {
                source.close();
                return Err(err).context("starting monitor drain");
            }
        };
        let tap = match AuxiliaryTap::spawn(source.clone(), output.clone(), tap_config, metrics) {
            Ok(tap) => tap,
            Err(err) => {
                source.close();
                output.close();
                drain.finish();
                return Err(err).context("starting monitor tap");
            }
        };
        Ok(Monitor { source, tap, drain })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runner_recovers_emitter_bearing() {
        let mut cfg = WorkflowConfig::from_args(0.15, 1e9, 8, 30.0, false).unwrap();
        cfg.generator.packet_size = 256;
        cfg.generator.interval_ms = 0;
        let result = Runner::new(cfg).execute().unwrap();

        assert_eq!(result.estimates.len(), 8);
        assert_eq!(result.mismatches, 0);
        assert_eq!(result.undefined_count(), 0);
        assert!((result.mean_degrees().unwrap() - 30.0).abs() < 2.0);
        assert_eq!(result.metrics.aligned_pairs, 8);
        assert!(result.tap.is_none());
        assert!(result.monitor.is_none());
    }

    #[test]
    fn runner_drains_monitor_tap() {
        let mut cfg = WorkflowConfig::from_args(0.15, 1e9, 48, -10.0, true).unwrap();
        cfg.generator.packet_size = 256;
        cfg.generator.interval_ms = 1;
        cfg.monitor_offer_wait_ms = 1;
        let capacity = cfg.monitor_queue_capacity as u64;
        let sample_rate = cfg.generator.sample_rate;
        let frequency = cfg.generator.frequency_hz;
        let result = Runner::new(cfg).execute().unwrap();

        let tap = result.tap.unwrap();
        let monitor = result.monitor.unwrap();
        assert_eq!(tap.errors, 0);
        assert_eq!(result.metrics.tap_forwarded, tap.forwarded);
        assert_eq!(result.metrics.tap_dropped, tap.dropped);
        assert!(tap.forwarded > capacity);
        assert_eq!(monitor.packets, tap.forwarded);
        assert_eq!(monitor.samples, monitor.packets * 128);
        assert!(monitor.mean_power > 0.0);
        assert_eq!(monitor.sample_rate, sample_rate);
        assert_eq!(monitor.frequency, frequency);
    }

    #[test]
    fn monitor_summary_averages_power_across_packets() {
        let mut summary = MonitorSummary::default();
        let mut loud = SamplePacket::with_capacity(2);
        loud.push(1.0, 0.0);
        loud.push(0.0, 1.0);
        loud.sample_rate = 2_048_000;
        loud.frequency = 915_000_000;
        let mut quiet = SamplePacket::with_capacity(2);
        quiet.push(0.0, 0.0);
        quiet.push(0.0, 0.0);

        summary.absorb(&loud);
        summary.absorb(&quiet);
        assert_eq!(summary.packets, 2);
        assert_eq!(summary.samples, 4);
        assert!((summary.mean_power - 0.5).abs() < 1e-12);
        assert_eq!(summary.sample_rate, 0);
    }
}
