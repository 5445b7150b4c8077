use dfcore::processing::DoaParameters;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::sync::OnceLock;
use std::time::Instant;

/// Configuration for generating synthetic receive channels.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub sample_rate: u32,
    pub frequency_hz: u64,
    /// Interleaved I/Q values per buffer.
    pub packet_size: usize,
    /// Baseband offset of the emitter from the tuned frequency.
    pub tone_hz: f64,
    pub amplitude: f64,
    pub noise: f64,
    pub seed: u64,
    pub interval_ms: u64,
    /// True bearing of the synthetic emitter, off boresight.
    pub arrival_angle_deg: f64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            sample_rate: 2_048_000,
            frequency_hz: 1_000_000_000,
            packet_size: 2048,
            tone_hz: 0.0,
            amplitude: 1000.0,
            noise: 20.0,
            seed: 0,
            interval_ms: 2,
            arrival_angle_deg: 20.0,
        }
    }
}

impl GeneratorConfig {
    pub fn normalized_packet_size(&self) -> usize {
        (self.packet_size.max(2) / 2) * 2
    }
}

/// Phase lead of the second antenna for a plane wave arriving at `angle_deg`.
pub fn interferometer_phase(params: &DoaParameters, angle_deg: f64) -> f64 {
    2.0 * PI * params.antenna_spacing_m * angle_deg.to_radians().sin() / params.wavelength_m()
}

/// Nanoseconds on a process-wide monotonic clock.
pub fn monotonic_ns() -> u64 {
    static ORIGIN: OnceLock<Instant> = OnceLock::new();
    let nanos = ORIGIN.get_or_init(Instant::now).elapsed().as_nanos();
    u64::try_from(nanos).unwrap_or(u64::MAX)
}

/// Noisy complex tone with a fixed phase offset.
pub struct ToneGenerator {
    tone_hz: f64,
    amplitude: f64,
    noise: f64,
    phase_offset: f64,
    sample_index: u64,
    rng: StdRng,
}

impl ToneGenerator {
    pub fn new(config: &GeneratorConfig, phase_offset: f64, seed: u64) -> Self {
        Self {
            tone_hz: config.tone_hz,
            amplitude: config.amplitude,
            noise: config.noise.abs(),
            phase_offset,
            sample_index: 0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn jitter(&mut self) -> f64 {
        if self.noise > 0.0 {
            self.rng.gen_range(-self.noise..self.noise)
        } else {
            0.0
        }
    }

    fn next_sample(&mut self, sample_rate: u32) -> (f64, f64) {
        let t = self.sample_index as f64 / f64::from(sample_rate.max(1));
        self.sample_index += 1;
        let phase = 2.0 * PI * self.tone_hz * t + self.phase_offset;
        let i = self.amplitude * phase.cos() + self.jitter();
        let q = self.amplitude * phase.sin() + self.jitter();
        (i, q)
    }

    /// `count` complex samples as interleaved signed 16-bit values.
    pub fn fill_i16(&mut self, sample_rate: u32, count: usize) -> Vec<i16> {
        let to_i16 = |v: f64| v.round().clamp(f64::from(i16::MIN), f64::from(i16::MAX)) as i16;
        let mut samples = Vec::with_capacity(count * 2);
        for _ in 0..count {
            let (i, q) = self.next_sample(sample_rate);
            samples.push(to_i16(i));
            samples.push(to_i16(q));
        }
        samples
    }

    /// `count` complex samples as interleaved 8-bit offset-binary values.
    pub fn fill_u8(&mut self, sample_rate: u32, count: usize, out: &mut Vec<u8>) {
        let scale = 100.0 / self.amplitude.max(f64::EPSILON);
        let to_u8 = |v: f64| (127.5 + v * scale).round().clamp(0.0, 255.0) as u8;
        for _ in 0..count {
            let (i, q) = self.next_sample(sample_rate);
            out.push(to_u8(i));
            out.push(to_u8(q));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dfcore::math::PhaseHelper;

    #[test]
    fn generator_builds_expected_sample_count() {
        let config = GeneratorConfig::default();
        let mut tone = ToneGenerator::new(&config, 0.0, 7);
        let samples = tone.fill_i16(config.sample_rate, 1024);
        assert_eq!(samples.len(), 2048);
    }

    #[test]
    fn noiseless_tone_carries_requested_phase() {
        let config = GeneratorConfig {
            tone_hz: 0.0,
            noise: 0.0,
            ..GeneratorConfig::default()
        };
        let mut tone = ToneGenerator::new(&config, 1.0, 0);
        let samples = tone.fill_i16(config.sample_rate, 64);
        assert!((PhaseHelper::mean_phase(&samples) - 1.0).abs() < 1e-3);
    }

    #[test]
    fn byte_samples_are_centred_on_midscale() {
        let config = GeneratorConfig {
            tone_hz: 0.0,
            noise: 0.0,
            ..GeneratorConfig::default()
        };
        let mut tone = ToneGenerator::new(&config, 0.0, 0);
        let mut packet = Vec::new();
        tone.fill_u8(config.sample_rate, 4, &mut packet);
        assert_eq!(packet.len(), 8);
        assert_eq!(packet[0], 228);
        assert_eq!(packet[1], 128);
    }

    #[test]
    fn broadside_emitter_has_no_phase_lead() {
        let params = DoaParameters::new(0.15, 1e9).unwrap();
        assert!(interferometer_phase(&params, 0.0).abs() < 1e-12);
        assert!((interferometer_phase(&params, 90.0) - PI).abs() < 1e-9);
    }
}
