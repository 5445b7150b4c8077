//! Dual-channel synchronization and direction-finding core.
//!
//! Two independently clocked receive channels are paired into time-aligned
//! buffers by the [`processing::Aligner`], and each aligned pair is turned
//! into a direction-of-arrival angle by the [`processing::DoaEstimator`].
//! A lossy [`processing::AuxiliaryTap`] drains single sources for best-effort
//! consumers that do not need alignment.

pub mod math;
pub mod prelude;
pub mod processing;
pub mod source_interface;
pub mod telemetry;

pub use prelude::{AlignedPair, AlignerError, AlignerResult, Channel, RawBuffer};
