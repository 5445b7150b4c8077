use dfcore::processing::DoaEstimate;
use dfcore::telemetry::MetricsSnapshot;
use serde::{Deserialize, Serialize};

use crate::workflow::runner::{MonitorSummary, WorkflowResult};

/// Latest direction-finding results exposed over the bridge.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EstimateModel {
    pub latest: Option<DoaEstimate>,
    pub estimate_count: usize,
    pub undefined_count: usize,
    pub mean_degrees: Option<f64>,
    pub mismatches: usize,
    pub metrics: MetricsSnapshot,
    pub monitor: Option<MonitorSummary>,
}

impl From<&WorkflowResult> for EstimateModel {
    fn from(result: &WorkflowResult) -> Self {
        Self {
            latest: result.estimates.last().copied(),
            estimate_count: result.estimates.len(),
            undefined_count: result.undefined_count(),
            mean_degrees: result.mean_degrees(),
            mismatches: result.mismatches,
            metrics: result.metrics,
            monitor: result.monitor,
        }
    }
}
