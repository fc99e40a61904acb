//! Confidence intervals for binomial proportions.

use serde::{Deserialize, Serialize};

/// Two-sided 95% standard normal quantile.
#[allow(clippy::excessive_precision)]
pub const Z_95: f64 = 1.9599639715843482;

/// Lower and upper bound of a proportion's confidence interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub lower: f64,
    pub upper: f64,
}

impl ConfidenceInterval {
    /// Returns true if `value` lies within the closed interval.
    pub fn contains(&self, value: f64) -> bool {
        self.lower <= value && value <= self.upper
    }
}

/// Which interval, if any, to attach to derived proportions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceIntervalMethod {
    #[default]
    None,
    Wilson,
}

impl ConfidenceIntervalMethod {
    /// Computes the interval for `observed` successes out of `sample` trials.
    pub fn interval(&self, observed: f64, sample: f64) -> Option<ConfidenceInterval> {
        match self {
            ConfidenceIntervalMethod::None => None,
            ConfidenceIntervalMethod::Wilson => wilson_interval(observed, sample),
        }
    }
}

/// Wilson score interval at 95% confidence.
///
/// Returns `None` when `sample` is not positive or `observed` lies outside
/// `0..=sample`; a proportion is undefined there. For valid input the result
/// satisfies `0 <= lower <= observed / sample <= upper <= 1`.
///
/// ```rust
/// use surveil_query::statistics::wilson_interval;
///
/// let ci = wilson_interval(5.0, 10.0).unwrap();
/// assert!(ci.lower < 0.5 && 0.5 < ci.upper);
/// assert!(wilson_interval(1.0, 0.0).is_none());
/// ```
pub fn wilson_interval(observed: f64, sample: f64) -> Option<ConfidenceInterval> {
    if sample.is_nan() || sample <= 0.0 || !(0.0..=sample).contains(&observed) {
        return None;
    }

    let z = Z_95;
    let z2 = z * z;
    let p = observed / sample;

    let center = p + z2 / (2.0 * sample);
    let half_width = z * (p * (1.0 - p) / sample + z2 / (4.0 * sample * sample)).sqrt();
    let denominator = 1.0 + z2 / sample;

    // Rounding can push the bounds a few ulps past p or the unit interval.
    let lower = ((center - half_width) / denominator).clamp(0.0, 1.0).min(p);
    let upper = ((center + half_width) / denominator).clamp(0.0, 1.0).max(p);

    Some(ConfidenceInterval { lower, upper })
}
