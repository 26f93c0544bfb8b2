use serde::{Deserialize, Serialize};

/// Wall-clock statistics over the measured `operate` calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingStat {
    pub iterations: u32,
    pub mean_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub median_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stddev_ms: Option<f64>,
    pub min_ms: f64,
    pub max_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p95_ms: Option<f64>,
}

impl TimingStat {
    pub fn from_samples(samples: &[f64]) -> Self {
        let n = samples.len();
        if n == 0 {
            return TimingStat {
                iterations: 0,
                mean_ms: 0.0,
                median_ms: None,
                stddev_ms: None,
                min_ms: 0.0,
                max_ms: 0.0,
                p95_ms: None,
            };
        }

        let mut sorted = samples.to_vec();
        sorted.sort_by(f64::total_cmp);

        let mean_ms = sorted.iter().sum::<f64>() / n as f64;
        let variance = sorted.iter().map(|x| (x - mean_ms).powi(2)).sum::<f64>() / n as f64;
        let median_ms = if n % 2 == 0 {
            (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
        } else {
            sorted[n / 2]
        };
        // nearest-rank percentile
        let p95_idx = ((0.95 * n as f64).ceil() as usize).clamp(1, n) - 1;

        TimingStat {
            iterations: n as u32,
            mean_ms,
            median_ms: Some(median_ms),
            stddev_ms: Some(variance.sqrt()),
            min_ms: sorted[0],
            max_ms: sorted[n - 1],
            p95_ms: Some(sorted[p95_idx]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timing_stat_from_samples() {
        let stat = TimingStat::from_samples(&[100.0, 110.0, 105.0, 115.0, 120.0]);
        assert_eq!(stat.iterations, 5);
        assert!((stat.mean_ms - 110.0).abs() < 1e-9);
        assert_eq!(stat.min_ms, 100.0);
        assert_eq!(stat.max_ms, 120.0);
        assert_eq!(stat.median_ms, Some(110.0));
        assert_eq!(stat.p95_ms, Some(120.0));
        assert!((stat.stddev_ms.unwrap() - 50.0f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_even_count_median() {
        let stat = TimingStat::from_samples(&[4.0, 1.0, 3.0, 2.0]);
        assert_eq!(stat.median_ms, Some(2.5));
    }

    #[test]
    fn test_empty_samples() {
        let stat = TimingStat::from_samples(&[]);
        assert_eq!(stat.iterations, 0);
        assert!(stat.median_ms.is_none());
    }
}
