//! Frame-rate estimation.
//!
//! Cumulative running average of instantaneous frame rates over the whole
//! session. This is a lifetime average, not a sliding window: a long stall
//! early in a session drags the average for its remainder. Kept deliberately
//! (the operator display reports session throughput); a windowed variant
//! would be the place to start if this ever feeds alerting.

/// Running average of `1/Δ` over successive frame arrival timestamps.
#[derive(Clone, Copy, Debug, Default)]
pub struct FpsEstimator {
    last: Option<f64>,
    sum: f64,
    count: u64,
}

/// One accepted frame interval.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FpsSample {
    pub instantaneous: f64,
    pub average: f64,
}

impl FpsEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a frame arrival at `t` seconds (any monotonic origin).
    ///
    /// The first frame only seeds the previous timestamp and yields no
    /// sample. Non-positive intervals (duplicate or out-of-order stamps)
    /// are ignored entirely.
    pub fn record(&mut self, t: f64) -> Option<FpsSample> {
        let Some(previous) = self.last.replace(t) else {
            return None;
        };
        let delta = t - previous;
        if delta <= 0.0 {
            return None;
        }
        let instantaneous = 1.0 / delta;
        self.sum += instantaneous;
        self.count += 1;
        Some(FpsSample {
            instantaneous,
            average: self.sum / self.count as f64,
        })
    }

    pub fn average(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }

    pub fn frame_count(&self) -> u64 {
        self.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_frame_yields_no_sample() {
        let mut fps = FpsEstimator::new();
        assert!(fps.record(0.0).is_none());
        assert!(fps.average().is_none());
    }

    #[test]
    fn known_interval_sequence() {
        let mut fps = FpsEstimator::new();
        let mut samples = Vec::new();
        for t in [0.0, 0.1, 0.3, 0.4] {
            if let Some(sample) = fps.record(t) {
                samples.push(sample.instantaneous);
            }
        }
        assert_eq!(samples.len(), 3);
        assert!((samples[0] - 10.0).abs() < 1e-9);
        assert!((samples[1] - 5.0).abs() < 1e-9);
        assert!((samples[2] - 10.0).abs() < 1e-9);

        let average = fps.average().unwrap();
        assert!((average - 25.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn non_positive_delta_is_ignored() {
        let mut fps = FpsEstimator::new();
        fps.record(1.0);
        assert!(fps.record(1.0).is_none());
        assert!(fps.record(0.5).is_none());
        assert_eq!(fps.frame_count(), 0);

        // Recovery: the most recent timestamp is still the reference point.
        let sample = fps.record(0.7).unwrap();
        assert!((sample.instantaneous - 5.0).abs() < 1e-9);
    }

    #[test]
    fn average_is_cumulative_not_windowed() {
        let mut fps = FpsEstimator::new();
        fps.record(0.0);
        for i in 1..=100 {
            fps.record(i as f64 * 0.1);
        }
        // One early stall.
        let mut stalled = FpsEstimator::new();
        stalled.record(0.0);
        stalled.record(10.0); // 0.1 fps
        for i in 1..=100 {
            stalled.record(10.0 + i as f64 * 0.1);
        }
        assert!(stalled.average().unwrap() < fps.average().unwrap());
    }
}
