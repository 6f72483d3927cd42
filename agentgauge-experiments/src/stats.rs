// Copyright 2025 Agentgauge Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Statistical primitives
//!
//! Welch's two-sample t-test plus the special-function approximations it
//! needs: Abramowitz–Stegun erf, Lanczos log-gamma, and a Lentz
//! continued-fraction regularized incomplete beta. Accuracy target for the
//! two-tailed p-value is 1e-3 over the df range used in practice.

// Statistical code has inherently tight precision requirements
#![allow(clippy::excessive_precision)]

/// Arithmetic mean; 0 for an empty slice
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample variance with Bessel's correction; 0 for fewer than 2 values
pub fn sample_variance(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (n - 1) as f64
}

/// Sample standard deviation; 0 for fewer than 2 values
pub fn sample_stddev(values: &[f64]) -> f64 {
    sample_variance(values).sqrt()
}

/// Outcome of Welch's t-test on two samples
#[derive(Debug, Clone, Copy)]
pub struct WelchResult {
    /// |t| statistic
    pub t_statistic: f64,

    /// Welch–Satterthwaite degrees of freedom
    pub degrees_of_freedom: f64,

    /// Two-tailed p-value
    pub p_value: f64,

    /// 1 − p
    pub confidence: f64,
}

impl WelchResult {
    fn inconclusive() -> Self {
        Self {
            t_statistic: 0.0,
            degrees_of_freedom: 0.0,
            p_value: 1.0,
            confidence: 0.0,
        }
    }
}

/// Welch's two-sample t-test on raw value arrays
///
/// Both samples need at least 2 values and a non-zero pooled standard
/// error; otherwise the result is inconclusive (confidence 0).
pub fn welch_t_test(control: &[f64], treatment: &[f64]) -> WelchResult {
    let n1 = control.len();
    let n2 = treatment.len();
    if n1 < 2 || n2 < 2 {
        return WelchResult::inconclusive();
    }

    let m1 = mean(control);
    let m2 = mean(treatment);
    let v1 = sample_variance(control) / n1 as f64;
    let v2 = sample_variance(treatment) / n2 as f64;

    let se_squared = v1 + v2;
    if se_squared <= 0.0 || !se_squared.is_finite() {
        return WelchResult::inconclusive();
    }

    let t = (m2 - m1).abs() / se_squared.sqrt();
    let df = se_squared.powi(2)
        / (v1.powi(2) / (n1 as f64 - 1.0) + v2.powi(2) / (n2 as f64 - 1.0));

    let p = two_tailed_p_value(t, df).clamp(0.0, 1.0);
    WelchResult {
        t_statistic: t,
        degrees_of_freedom: df,
        p_value: p,
        confidence: 1.0 - p,
    }
}

/// Two-tailed p-value of the t-distribution
///
/// Normal approximation above 100 degrees of freedom, regularized
/// incomplete beta below.
pub fn two_tailed_p_value(t: f64, df: f64) -> f64 {
    if df <= 0.0 || !t.is_finite() {
        return 1.0;
    }
    if df > 100.0 {
        return 2.0 * normal_cdf(-t.abs());
    }
    // P(|T| > t) = I_{df/(df+t²)}(df/2, 1/2)
    incomplete_beta(df / 2.0, 0.5, df / (df + t * t))
}

/// Two-sided 95% confidence interval on a mean
///
/// Collapses to the point estimate below 2 samples.
pub fn confidence_interval_95(mean: f64, stddev: f64, n: usize) -> (f64, f64) {
    if n < 2 {
        return (mean, mean);
    }
    let margin = 1.96 * stddev / (n as f64).sqrt();
    (mean - margin, mean + margin)
}

/// Standard normal CDF
pub fn normal_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

/// Error function, Abramowitz–Stegun 7.1.26 (max error 1.5e-7)
pub fn erf(x: f64) -> f64 {
    let a1 = 0.254829592;
    let a2 = -0.284496736;
    let a3 = 1.421413741;
    let a4 = -1.453152027;
    let a5 = 1.061405429;
    let p = 0.3275911;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + p * x);
    let y = 1.0 - (((((a5 * t + a4) * t) + a3) * t + a2) * t + a1) * t * (-x * x).exp();
    sign * y
}

/// Regularized incomplete beta function I_x(a, b)
///
/// Continued fraction (Lentz), with the symmetry transform applied when x
/// is past the convergence knee.
pub fn incomplete_beta(a: f64, b: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }

    let ln_front =
        ln_gamma(a + b) - ln_gamma(a) - ln_gamma(b) + a * x.ln() + b * (1.0 - x).ln();
    let front = ln_front.exp();

    if x < (a + 1.0) / (a + b + 2.0) {
        front * beta_continued_fraction(a, b, x) / a
    } else {
        1.0 - front * beta_continued_fraction(b, a, 1.0 - x) / b
    }
}

/// Lentz's algorithm for the incomplete-beta continued fraction
fn beta_continued_fraction(a: f64, b: f64, x: f64) -> f64 {
    const MAX_ITER: usize = 200;
    const EPS: f64 = 1e-12;
    const FPMIN: f64 = 1e-30;

    let qab = a + b;
    let qap = a + 1.0;
    let qam = a - 1.0;

    let mut c = 1.0;
    let mut d = 1.0 - qab * x / qap;
    if d.abs() < FPMIN {
        d = FPMIN;
    }
    d = 1.0 / d;
    let mut h = d;

    for m in 1..=MAX_ITER {
        let m = m as f64;
        let m2 = 2.0 * m;

        // Even step
        let numerator = m * (b - m) * x / ((qam + m2) * (a + m2));
        d = 1.0 + numerator * d;
        if d.abs() < FPMIN {
            d = FPMIN;
        }
        c = 1.0 + numerator / c;
        if c.abs() < FPMIN {
            c = FPMIN;
        }
        d = 1.0 / d;
        h *= d * c;

        // Odd step
        let numerator = -(a + m) * (qab + m) * x / ((a + m2) * (qap + m2));
        d = 1.0 + numerator * d;
        if d.abs() < FPMIN {
            d = FPMIN;
        }
        c = 1.0 + numerator / c;
        if c.abs() < FPMIN {
            c = FPMIN;
        }
        d = 1.0 / d;
        let delta = d * c;
        h *= delta;

        if (delta - 1.0).abs() < EPS {
            break;
        }
    }

    h
}

/// Log-gamma, Lanczos approximation
fn ln_gamma(x: f64) -> f64 {
    let cof = [
        76.18009172947146,
        -86.50532032941677,
        24.01409824083091,
        -1.231739572450155,
        0.1208650973866179e-2,
        -0.5395239384953e-5,
    ];

    let mut y = x;
    let tmp = x + 5.5;
    let tmp = tmp - (x + 0.5) * tmp.ln();
    let mut ser = 1.000000000190015;
    for c in cof {
        y += 1.0;
        ser += c / y;
    }
    -tmp + (2.5066282746310005 * ser / x).ln()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_and_variance() {
        let values = [1.0, 2.0, 3.0, 4.0];
        assert!((mean(&values) - 2.5).abs() < 1e-12);
        assert!((sample_variance(&values) - 5.0 / 3.0).abs() < 1e-12);
        assert!((sample_stddev(&values) - (5.0f64 / 3.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_variance_of_single_sample_is_zero() {
        assert_eq!(sample_variance(&[0.7]), 0.0);
        assert_eq!(sample_stddev(&[0.7]), 0.0);
        assert_eq!(sample_variance(&[]), 0.0);
    }

    #[test]
    fn test_erf_reference_values() {
        assert!((erf(0.0)).abs() < 1e-7);
        assert!((erf(1.0) - 0.8427007929).abs() < 1e-6);
        assert!((erf(-1.0) + 0.8427007929).abs() < 1e-6);
        assert!((erf(2.0) - 0.9953222650).abs() < 1e-6);
    }

    #[test]
    fn test_normal_cdf_reference_values() {
        assert!((normal_cdf(0.0) - 0.5).abs() < 1e-7);
        assert!((normal_cdf(1.96) - 0.9750).abs() < 1e-3);
        assert!((normal_cdf(-1.96) - 0.0250).abs() < 1e-3);
    }

    #[test]
    fn test_incomplete_beta_boundaries() {
        assert_eq!(incomplete_beta(2.0, 3.0, 0.0), 0.0);
        assert_eq!(incomplete_beta(2.0, 3.0, 1.0), 1.0);
        // I_x(1, 1) is the identity
        assert!((incomplete_beta(1.0, 1.0, 0.37) - 0.37).abs() < 1e-9);
    }

    #[test]
    fn test_two_tailed_p_reference_values() {
        // Student-t table: t = 2.0, df = 10 → p ≈ 0.07339
        assert!((two_tailed_p_value(2.0, 10.0) - 0.07339).abs() < 1e-3);
        // t = 2.228 is the 97.5th percentile at df = 10 → p ≈ 0.05
        assert!((two_tailed_p_value(2.228, 10.0) - 0.05).abs() < 1e-3);
        // Large df falls back to the normal approximation
        assert!((two_tailed_p_value(1.96, 1000.0) - 0.05).abs() < 1e-3);
        // t = 0 is always p = 1
        assert!((two_tailed_p_value(0.0, 10.0) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_welch_identical_samples_inconclusive() {
        let a = [0.8, 0.8, 0.8, 0.8, 0.8];
        let result = welch_t_test(&a, &a);
        // Zero standard error short-circuits to confidence 0.
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.p_value, 1.0);
    }

    #[test]
    fn test_welch_single_sample_inconclusive() {
        let result = welch_t_test(&[0.5], &[0.9, 0.8, 0.7]);
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn test_welch_clearly_separated() {
        let control = [0.80, 0.82, 0.78, 0.81, 0.79, 0.83, 0.80, 0.77, 0.82, 0.81];
        let treatment = [0.85, 0.87, 0.84, 0.86, 0.88, 0.85, 0.89, 0.86, 0.84, 0.87];
        let result = welch_t_test(&control, &treatment);
        assert!(result.p_value < 0.05);
        assert!(result.confidence > 0.95);
        assert!(result.t_statistic > 0.0);
        assert!(result.degrees_of_freedom > 1.0);
    }

    #[test]
    fn test_confidence_interval() {
        let (lo, hi) = confidence_interval_95(0.5, 0.1, 100);
        assert!((lo - (0.5 - 1.96 * 0.01)).abs() < 1e-12);
        assert!((hi - (0.5 + 1.96 * 0.01)).abs() < 1e-12);
        // Single sample collapses to the mean.
        assert_eq!(confidence_interval_95(0.5, 0.1, 1), (0.5, 0.5));
    }

    #[test]
    fn test_welch_overlapping_is_not_significant() {
        let control = [0.80, 0.82, 0.78, 0.81, 0.79];
        let treatment = [0.81, 0.80, 0.79, 0.82, 0.80];
        let result = welch_t_test(&control, &treatment);
        assert!(result.confidence < 0.95);
    }
}
