use crate::generator::GeneratorConfig;
use anyhow::Context;
use dfcore::processing::{DoaParameters, TapConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkflowConfig {
    pub doa: DoaParameters,
    #[serde(default)]
    pub generator: GeneratorConfig,
    #[serde(default = "default_pairs")]
    pub pairs: usize,
    /// Drain a third synthetic source through an auxiliary tap while aligning.
    #[serde(default)]
    pub monitor: bool,
    #[serde(default = "default_monitor_queue")]
    pub monitor_queue_capacity: usize,
    #[serde(default = "default_offer_wait_ms")]
    pub monitor_offer_wait_ms: u64,
}

fn default_pairs() -> usize {
    64
}

fn default_monitor_queue() -> usize {
    4
}

fn default_offer_wait_ms() -> u64 {
    200
}

impl WorkflowConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading workflow config {}", path_ref.display()))?;
        let config: WorkflowConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing workflow config {}", path_ref.display()))?;
        config
            .doa
            .validate()
            .with_context(|| format!("validating workflow config {}", path_ref.display()))?;
        Ok(config)
    }

    pub fn from_args(
        antenna_spacing_m: f64,
        carrier_frequency_hz: f64,
        pairs: usize,
        arrival_angle_deg: f64,
        monitor: bool,
    ) -> anyhow::Result<Self> {
        let doa = DoaParameters::new(antenna_spacing_m, carrier_frequency_hz)
            .context("validating DOA parameters")?;
        let generator = GeneratorConfig {
            frequency_hz: carrier_frequency_hz.round() as u64,
            arrival_angle_deg,
            ..GeneratorConfig::default()
        };
        Ok(Self {
            doa,
            generator,
            pairs,
            monitor,
            monitor_queue_capacity: default_monitor_queue(),
            monitor_offer_wait_ms: default_offer_wait_ms(),
        })
    }

    pub fn to_tap_config(&self) -> TapConfig {
        TapConfig {
            offer_wait: Duration::from_millis(self.monitor_offer_wait_ms),
            ..TapConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn config_from_args_builds_generator_and_geometry() {
        let cfg = WorkflowConfig::from_args(0.15, 1e9, 32, 30.0, true).unwrap();
        assert_eq!(cfg.generator.frequency_hz, 1_000_000_000);
        assert_eq!(cfg.generator.arrival_angle_deg, 30.0);
        assert!((cfg.doa.wavelength_m() - 0.3).abs() < 1e-12);
        assert_eq!(cfg.to_tap_config().offer_wait, Duration::from_millis(200));
    }

    #[test]
    fn config_from_args_rejects_bad_geometry() {
        assert!(WorkflowConfig::from_args(0.0, 1e9, 32, 0.0, false).is_err());
    }

    #[test]
    fn config_load_reads_yaml() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(
            b"doa:\n  antenna_spacing_m: 0.5\n  carrier_frequency_hz: 1.0e9\npairs: 8\ngenerator:\n  seed: 9\n",
        )
        .unwrap();
        let path = temp.into_temp_path();
        let cfg = WorkflowConfig::load(&path).unwrap();
        assert_eq!(cfg.pairs, 8);
        assert_eq!(cfg.generator.seed, 9);
        assert_eq!(cfg.generator.packet_size, GeneratorConfig::default().packet_size);
        assert!(!cfg.monitor);
    }

    #[test]
    fn config_load_rejects_invalid_geometry() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(b"doa:\n  antenna_spacing_m: -1.0\n  carrier_frequency_hz: 1.0e9\n")
            .unwrap();
        let path = temp.into_temp_path();
        assert!(WorkflowConfig::load(&path).is_err());
    }
}
