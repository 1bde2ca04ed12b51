//! Fitness evaluator: turns the raw metrics one evaluation window
//! produces for an individual into the single scalar the driver ranks on.

use serde::{Deserialize, Serialize};

/// Sentinel fitness assigned to a disqualified individual. Deliberately far
/// below any value an upright, well-formed creature could earn, so it
/// always sorts last.
pub const DISQUALIFIED_FITNESS: f64 = -10000.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SelectionWeights {
    /// Wire name is `distance` on the configuration surface; the internal
    /// name matches the `w_d*displacement` term.
    #[serde(rename = "distance")]
    pub displacement: f64,
    pub speed: f64,
    pub upright: f64,
}

impl Default for SelectionWeights {
    fn default() -> Self {
        SelectionWeights { displacement: 0.5, speed: 1.0, upright: 1.0 }
    }
}

/// Per-individual telemetry accumulated by the scheduler over one
/// evaluation window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub displacement: f64,
    pub mean_speed: f64,
    pub mean_upright: f64,
    pub peak_height: f64,
    pub runtime_alive: f64,
    pub foot_contact_ratio: f64,
    pub disqualified: bool,
}

impl Metrics {
    fn sanitize(value: f64) -> f64 {
        if value.is_nan() {
            0.0
        } else {
            value
        }
    }
}

/// Weighted sum of displacement, speed and upright-ness. A
/// disqualified individual always receives [`DISQUALIFIED_FITNESS`]
/// regardless of whatever metrics it accumulated before disqualification.
/// NaN components are treated as zero rather than poisoning the sum.
pub fn fitness(metrics: &Metrics, weights: &SelectionWeights) -> f64 {
    if metrics.disqualified {
        return DISQUALIFIED_FITNESS;
    }
    weights.displacement * Metrics::sanitize(metrics.displacement)
        + weights.speed * Metrics::sanitize(metrics.mean_speed)
        + weights.upright * Metrics::sanitize(metrics.mean_upright)
}
