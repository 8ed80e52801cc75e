//! Significance decisions for A/B test evaluation.
//!
//! Two implementations behind [`SignificanceTest`]:
//!
//! - [`HeuristicSignificance`] (default): `p = max(0.01, 1 - (|Δsat| + |Δquality|) / 10)`.
//!   Not a hypothesis test: it ignores variance and sample size. Kept as the
//!   default because winner selection and recommendations have always been
//!   tuned against its thresholds.
//! - [`WelchSignificance`]: Welch's two-sample t statistic per metric, with a
//!   normal approximation of the two-sided p-value and a Bonferroni
//!   correction across the two metrics. The approximation is adequate for the
//!   sample sizes evaluation requires (`min_sample_size` defaults to 100).

use crate::utils::{mean, sample_variance};
use serde::{Deserialize, Serialize};

/// Which significance test the A/B manager uses
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignificanceMethod {
    #[default]
    Heuristic,
    Welch,
}

impl SignificanceMethod {
    pub fn build(self) -> Box<dyn SignificanceTest> {
        match self {
            SignificanceMethod::Heuristic => Box::new(HeuristicSignificance),
            SignificanceMethod::Welch => Box::new(WelchSignificance),
        }
    }
}

/// Per-group observations fed to a significance test
#[derive(Debug, Clone, Default)]
pub struct GroupSample {
    pub satisfaction: Vec<f64>,
    pub quality: Vec<f64>,
}

impl GroupSample {
    pub fn len(&self) -> usize {
        self.satisfaction.len()
    }

    pub fn is_empty(&self) -> bool {
        self.satisfaction.is_empty()
    }

    pub fn push(&mut self, satisfaction: f64, quality: f64) {
        self.satisfaction.push(satisfaction);
        self.quality.push(quality);
    }

    pub fn mean_satisfaction(&self) -> f64 {
        mean(self.satisfaction.iter().copied()).unwrap_or(0.0)
    }

    pub fn mean_quality(&self) -> f64 {
        mean(self.quality.iter().copied()).unwrap_or(0.0)
    }
}

/// Produces a p-value for the difference between two groups
pub trait SignificanceTest: Send + Sync {
    fn p_value(&self, control: &GroupSample, treatment: &GroupSample) -> f64;
}

/// Mean-difference heuristic
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicSignificance;

impl SignificanceTest for HeuristicSignificance {
    fn p_value(&self, control: &GroupSample, treatment: &GroupSample) -> f64 {
        let satisfaction_diff =
            (treatment.mean_satisfaction() - control.mean_satisfaction()).abs();
        let quality_diff = (treatment.mean_quality() - control.mean_quality()).abs();

        (1.0 - (satisfaction_diff + quality_diff) / 10.0).max(0.01)
    }
}

/// Welch's t-test on both metrics, Bonferroni-combined
#[derive(Debug, Clone, Copy, Default)]
pub struct WelchSignificance;

impl WelchSignificance {
    /// Two-sided p-value for one metric
    fn metric_p_value(a: &[f64], b: &[f64]) -> f64 {
        if a.len() < 2 || b.len() < 2 {
            return 1.0;
        }

        let mean_a = a.iter().sum::<f64>() / a.len() as f64;
        let mean_b = b.iter().sum::<f64>() / b.len() as f64;
        let standard_error =
            (sample_variance(a) / a.len() as f64 + sample_variance(b) / b.len() as f64).sqrt();

        if standard_error == 0.0 {
            return if (mean_a - mean_b).abs() < f64::EPSILON {
                1.0
            } else {
                0.0
            };
        }

        let t = (mean_a - mean_b) / standard_error;
        erfc(t.abs() / std::f64::consts::SQRT_2)
    }
}

impl SignificanceTest for WelchSignificance {
    fn p_value(&self, control: &GroupSample, treatment: &GroupSample) -> f64 {
        let p_satisfaction = Self::metric_p_value(&control.satisfaction, &treatment.satisfaction);
        let p_quality = Self::metric_p_value(&control.quality, &treatment.quality);

        (2.0 * p_satisfaction.min(p_quality)).min(1.0)
    }
}

/// Complementary error function (Abramowitz & Stegun 7.1.26, |ε| < 1.5e-7)
fn erfc(x: f64) -> f64 {
    if x < 0.0 {
        return 2.0 - erfc(-x);
    }
    let t = 1.0 / (1.0 + 0.327_591_1 * x);
    let poly = t
        * (0.254_829_592
            + t * (-0.284_496_736 + t * (1.421_413_741 + t * (-1.453_152_027 + t * 1.061_405_429))));
    poly * (-x * x).exp()
}
