use ndarray::{s, ArrayView1};
use num_complex::Complex64;

/// Vector-sum phase estimation over interleaved I/Q buffers.
pub struct PhaseHelper;

impl PhaseHelper {
    /// Sums the I and Q components of `iq` independently.
    ///
    /// A trailing unpaired element is ignored. No DC offset is removed, so a
    /// receiver with unbalanced I/Q bias skews the result.
    pub fn vector_sum(iq: &[i16]) -> Complex64 {
        let paired = iq.len() - iq.len() % 2;
        if paired == 0 {
            return Complex64::new(0.0, 0.0);
        }
        let view = ArrayView1::from(&iq[..paired]);
        let sum = |lane: ArrayView1<i16>| lane.fold(0.0_f64, |acc, &v| acc + f64::from(v));

        Complex64::new(sum(view.slice(s![0..;2])), sum(view.slice(s![1..;2])))
    }

    /// Coherent mean phase `atan2(sum Q, sum I)` in radians.
    pub fn mean_phase(iq: &[i16]) -> f64 {
        Self::vector_sum(iq).arg()
    }
}
