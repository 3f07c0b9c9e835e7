//! Recall, percentiles and the per-run metric record.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

// ────────────────────────────────────────────────────────────────────────────────
// Recall
// ────────────────────────────────────────────────────────────────────────────────

/// Recall over `k` prediction slots.
///
/// Slot `i` scores 1 when `returned[i]` appears anywhere in `ground_truth`;
/// missing slots score 0 and predictions past `k` are ignored. The mean is
/// taken over `k`, not over `|ground_truth|`, so historical results stay
/// comparable. `k == 0` yields 0.
pub fn recall(k: usize, ground_truth: &[i64], returned: &[i64]) -> f64 {
    if k == 0 {
        return 0.0;
    }
    let hits = returned
        .iter()
        .take(k)
        .filter(|&id| ground_truth.contains(id))
        .count();
    hits as f64 / k as f64
}

// ────────────────────────────────────────────────────────────────────────────────
// Percentiles
// ────────────────────────────────────────────────────────────────────────────────

/// Percentile `p` (0..=100) with linear interpolation between closest ranks.
/// Returns 0 for an empty sample set.
pub fn percentile(samples: &[f64], p: f64) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let rank = (p.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
}

pub fn mean(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        0.0
    } else {
        samples.iter().sum::<f64>() / samples.len() as f64
    }
}

/// Round to four decimals, the precision results are reported at.
pub fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}

// ────────────────────────────────────────────────────────────────────────────────
// Latency recorder
// ────────────────────────────────────────────────────────────────────────────────

/// Per-operation latency samples, kept in submission order.
#[derive(Debug, Default)]
pub struct LatencyRecorder {
    samples: Vec<f64>,
    total: Duration,
}

impl LatencyRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(n: usize) -> Self {
        Self {
            samples: Vec::with_capacity(n),
            total: Duration::ZERO,
        }
    }

    #[inline(always)]
    pub fn start(&self) -> Instant {
        Instant::now()
    }

    /// Record the elapsed time since `start`; returns it in seconds.
    #[inline(always)]
    pub fn record(&mut self, start: Instant) -> f64 {
        let elapsed = start.elapsed();
        self.total += elapsed;
        let secs = elapsed.as_secs_f64();
        self.samples.push(secs);
        secs
    }

    pub fn ops(&self) -> usize {
        self.samples.len()
    }

    /// Sum of recorded latencies, i.e. time spent inside the operation.
    pub fn total(&self) -> Duration {
        self.total
    }

    pub fn percentile(&self, p: f64) -> Duration {
        Duration::from_secs_f64(percentile(&self.samples, p))
    }

    pub fn mean(&self) -> Duration {
        Duration::from_secs_f64(mean(&self.samples))
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }
}

// ────────────────────────────────────────────────────────────────────────────────
// Metric record
// ────────────────────────────────────────────────────────────────────────────────

/// Aggregate result of one benchmark run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    /// Rows loaded by the insertion phase.
    pub max_load_count: usize,
    /// Wall-clock time to load the whole dataset.
    #[serde(with = "duration_secs")]
    pub load_duration: Duration,
    pub qps: f64,
    #[serde(with = "duration_secs")]
    pub serial_latency_p99: Duration,
    pub recall: f64,
}

impl Metric {
    /// Numeric value for `name` in the unit reported by [`MetricName::unit`].
    pub fn value(&self, name: MetricName) -> f64 {
        match name {
            MetricName::Qps => self.qps,
            MetricName::Recall => self.recall,
            MetricName::LoadDuration => self.load_duration.as_secs_f64(),
            MetricName::SerialLatencyP99 => self.serial_latency_p99.as_secs_f64() * 1_000.0,
            MetricName::MaxLoadCount => self.max_load_count as f64,
        }
    }
}

/// Metric names in report display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    Qps,
    Recall,
    LoadDuration,
    SerialLatencyP99,
    MaxLoadCount,
}

impl MetricName {
    pub const DISPLAY_ORDER: [MetricName; 5] = [
        MetricName::Qps,
        MetricName::Recall,
        MetricName::LoadDuration,
        MetricName::SerialLatencyP99,
        MetricName::MaxLoadCount,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::Qps => "qps",
            MetricName::Recall => "recall",
            MetricName::LoadDuration => "load_duration",
            MetricName::SerialLatencyP99 => "serial_latency_p99",
            MetricName::MaxLoadCount => "max_load_count",
        }
    }

    pub fn is_lower_better(&self) -> bool {
        matches!(self, MetricName::LoadDuration | MetricName::SerialLatencyP99)
    }

    pub fn unit(&self) -> &'static str {
        match self {
            MetricName::LoadDuration => "s",
            MetricName::SerialLatencyP99 => "ms",
            MetricName::MaxLoadCount => "K",
            MetricName::Qps | MetricName::Recall => "",
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MetricName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MetricName::DISPLAY_ORDER
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| format!("unknown metric: {s}"))
    }
}

/// Whether a lower value of the named metric is better. Unknown names are
/// treated as higher-is-better.
pub fn is_lower_is_better(name: &str) -> bool {
    name.parse::<MetricName>()
        .map(|m| m.is_lower_better())
        .unwrap_or(false)
}

/// Render a count for humans: `1_000 -> "1K"`, `1_000_000 -> "1M"`.
/// Anything from a billion up keeps the `B` suffix.
pub fn numerize(n: u64) -> String {
    const STEPS: [(&str, f64); 4] = [("", 1e3), ("K", 1e6), ("M", 1e9), ("B", 1e12)];
    let value = n as f64;
    for (suffix, upper) in STEPS {
        if value < upper {
            return format!("{}{}", (value / (upper / 1e3)) as u64, suffix);
        }
    }
    format!("{}B", (value / 1e9) as u64)
}

pub(crate) mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        if !secs.is_finite() || secs < 0.0 {
            return Err(serde::de::Error::custom("duration must be a non-negative number"));
        }
        Ok(Duration::from_secs_f64(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recall_of_exact_prefix_is_one() {
        let gt: Vec<i64> = (0..100).collect();
        assert_eq!(recall(10, &gt, &gt[..10]), 1.0);
    }

    #[test]
    fn recall_of_empty_prediction_is_zero() {
        let gt = vec![1, 2, 3];
        assert_eq!(recall(3, &gt, &[]), 0.0);
        assert_eq!(recall(0, &gt, &[]), 0.0);
    }

    #[test]
    fn recall_divides_by_k_not_ground_truth() {
        // Two of four slots hit; only three are returned.
        let gt = vec![1, 2];
        assert_eq!(recall(4, &gt, &[1, 9, 2]), 0.5);
        // Predictions past k are ignored.
        assert_eq!(recall(1, &gt, &[9, 1, 2]), 0.0);
        // Duplicated hits each count.
        assert_eq!(recall(2, &[5], &[5, 5]), 1.0);
    }

    #[test]
    fn recall_stays_in_unit_interval() {
        let gt = vec![3, 1, 4, 1, 5];
        for k in 1..8 {
            let r = recall(k, &gt, &[1, 2, 3, 4, 5, 6, 7, 8]);
            assert!((0.0..=1.0).contains(&r), "k={k} r={r}");
        }
    }

    #[test]
    fn percentile_interpolates_linearly() {
        let samples: Vec<f64> = (1..=100).map(|v| v as f64).collect();
        assert!((percentile(&samples, 99.0) - 99.01).abs() < 1e-9);
        assert_eq!(percentile(&samples, 0.0), 1.0);
        assert_eq!(percentile(&samples, 100.0), 100.0);
        assert_eq!(percentile(&[4.0, 1.0, 3.0, 2.0], 50.0), 2.5);
        assert_eq!(percentile(&[], 99.0), 0.0);
        assert_eq!(percentile(&[7.0], 99.0), 7.0);
    }

    #[test]
    fn display_order_and_direction() {
        let names: Vec<&str> = MetricName::DISPLAY_ORDER.iter().map(|m| m.as_str()).collect();
        assert_eq!(
            names,
            ["qps", "recall", "load_duration", "serial_latency_p99", "max_load_count"]
        );
        assert!(is_lower_is_better("load_duration"));
        assert!(is_lower_is_better("serial_latency_p99"));
        assert!(!is_lower_is_better("qps"));
        assert!(!is_lower_is_better("recall"));
        assert!(!is_lower_is_better("unknown"));
    }

    #[test]
    fn numerize_picks_suffix() {
        assert_eq!(numerize(999), "999");
        assert_eq!(numerize(1_000), "1K");
        assert_eq!(numerize(100_000), "100K");
        assert_eq!(numerize(1_000_000), "1M");
        assert_eq!(numerize(10_000_000), "10M");
        assert_eq!(numerize(1_000_000_000), "1B");
        assert_eq!(numerize(2_000_000_000_000), "2000B");
    }

    #[test]
    fn metric_serializes_durations_as_seconds() {
        let m = Metric {
            max_load_count: 10,
            load_duration: Duration::from_millis(1500),
            qps: 2.0,
            serial_latency_p99: Duration::from_millis(3),
            recall: 0.9,
        };
        let v = serde_json::to_value(&m).unwrap();
        assert_eq!(v["load_duration"], 1.5);
        assert!((m.value(MetricName::SerialLatencyP99) - 3.0).abs() < 1e-9);
        let back: Metric = serde_json::from_value(v).unwrap();
        assert_eq!(back.max_load_count, 10);
    }

    #[test]
    fn recorder_tracks_order_and_total() {
        let mut rec = LatencyRecorder::with_capacity(2);
        let t = rec.start();
        rec.record(t);
        let t = rec.start();
        rec.record(t);
        assert_eq!(rec.ops(), 2);
        assert!(rec.total() >= Duration::ZERO);
        assert!(rec.percentile(99.0) >= rec.percentile(0.0));
    }
}
