use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::math::phase::PhaseHelper;
use crate::prelude::AlignedPair;

/// Propagation speed used to derive the carrier wavelength.
pub const SPEED_OF_LIGHT_M_S: f64 = 3.0e8;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum DoaError {
    #[error("invalid DOA parameters: {0}")]
    InvalidParameters(String),
}

/// Fixed geometry of a two-element interferometer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DoaParameters {
    pub antenna_spacing_m: f64,
    pub carrier_frequency_hz: f64,
}

impl DoaParameters {
    pub fn new(antenna_spacing_m: f64, carrier_frequency_hz: f64) -> Result<Self, DoaError> {
        let params = Self {
            antenna_spacing_m,
            carrier_frequency_hz,
        };
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<(), DoaError> {
        if !(self.antenna_spacing_m.is_finite() && self.antenna_spacing_m > 0.0) {
            return Err(DoaError::InvalidParameters(format!(
                "antenna spacing must be positive, got {} m",
                self.antenna_spacing_m
            )));
        }
        if !(self.carrier_frequency_hz.is_finite() && self.carrier_frequency_hz > 0.0) {
            return Err(DoaError::InvalidParameters(format!(
                "carrier frequency must be positive, got {} Hz",
                self.carrier_frequency_hz
            )));
        }
        Ok(())
    }

    pub fn wavelength_m(&self) -> f64 {
        SPEED_OF_LIGHT_M_S / self.carrier_frequency_hz
    }
}

/// Outcome of one direction-of-arrival computation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DoaEstimate {
    /// Angle off boresight in radians.
    Angle { radians: f64 },
    /// The inverse-sine argument fell outside `[-1, 1]`; no real angle exists.
    Undefined { argument: f64 },
}

impl DoaEstimate {
    pub fn radians(&self) -> Option<f64> {
        match self {
            DoaEstimate::Angle { radians } => Some(*radians),
            DoaEstimate::Undefined { .. } => None,
        }
    }

    pub fn degrees(&self) -> Option<f64> {
        self.radians().map(f64::to_degrees)
    }

    pub fn is_defined(&self) -> bool {
        matches!(self, DoaEstimate::Angle { .. })
    }
}

/// Phase-interferometry direction finder for aligned channel pairs.
#[derive(Debug, Clone)]
pub struct DoaEstimator {
    params: DoaParameters,
    wavelength_m: f64,
}

impl DoaEstimator {
    pub fn new(params: DoaParameters) -> Result<Self, DoaError> {
        params.validate()?;
        Ok(Self {
            params,
            wavelength_m: params.wavelength_m(),
        })
    }

    pub fn params(&self) -> &DoaParameters {
        &self.params
    }

    pub fn wavelength_m(&self) -> f64 {
        self.wavelength_m
    }

    /// Phase of channel B minus phase of channel A, not wrapped.
    pub fn phase_difference(&self, pair: &AlignedPair) -> f64 {
        PhaseHelper::mean_phase(pair.channel_b()) - PhaseHelper::mean_phase(pair.channel_a())
    }

    pub fn estimate(&self, pair: &AlignedPair) -> DoaEstimate {
        self.angle_from_phase_difference(self.phase_difference(pair))
    }

    /// `asin(Δφ·λ / (2π·d))`, or `Undefined` when the argument leaves `[-1, 1]`.
    pub fn angle_from_phase_difference(&self, delta_phase: f64) -> DoaEstimate {
        let argument =
            delta_phase * self.wavelength_m / (2.0 * PI * self.params.antenna_spacing_m);
        if argument.is_finite() && argument.abs() <= 1.0 {
            DoaEstimate::Angle {
                radians: argument.asin(),
            }
        } else {
            DoaEstimate::Undefined { argument }
        }
    }
}
