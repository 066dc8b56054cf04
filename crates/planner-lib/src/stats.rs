//! Numeric helpers over utilization sample sets

use serde::{Deserialize, Serialize};

/// Summary statistics of one resource's readings
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleStats {
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    pub p95: f64,
    pub p99: f64,
    pub count: usize,
}

impl SampleStats {
    pub fn from_values(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }
        let sorted = sorted(values);
        Self {
            avg: mean(values),
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            p95: percentile(&sorted, 0.95),
            p99: percentile(&sorted, 0.99),
            count: values.len(),
        }
    }
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub fn max(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::NAN, f64::max).max(0.0)
}

pub fn sorted(values: &[f64]) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    sorted
}

/// Nearest-rank percentile over an already sorted slice.
///
/// Picks `sorted[floor(n * fraction)]`, falling back to the last element.
pub fn percentile(sorted: &[f64], fraction: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = (sorted.len() as f64 * fraction).floor() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_values() {
        let stats = SampleStats::from_values(&[]);
        assert_eq!(stats, SampleStats::default());
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(percentile(&[], 0.95), 0.0);
    }

    #[test]
    fn test_stats_over_twenty_values() {
        let values: Vec<f64> = (1..=20).rev().map(|v| v as f64).collect();
        let stats = SampleStats::from_values(&values);
        assert_eq!(stats.count, 20);
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 20.0);
        assert!((stats.avg - 10.5).abs() < 1e-9);
        // floor(20 * 0.95) = 19 -> the largest value
        assert_eq!(stats.p95, 20.0);
        assert_eq!(stats.p99, 20.0);
    }

    #[test]
    fn test_nearest_rank_index() {
        let values: Vec<f64> = (0..100).map(|v| v as f64).collect();
        assert_eq!(percentile(&values, 0.95), 95.0);
        assert_eq!(percentile(&values, 0.99), 99.0);
    }

    #[test]
    fn test_single_value() {
        let stats = SampleStats::from_values(&[42.0]);
        assert_eq!(stats.p95, 42.0);
        assert_eq!(stats.p99, 42.0);
        assert_eq!(stats.avg, 42.0);
    }

    #[test]
    fn test_max_of_values() {
        assert_eq!(max(&[3.0, 9.5, 1.0]), 9.5);
        assert_eq!(max(&[]), 0.0);
    }
}
