//! Summary statistics and A/B comparison of benchmark samples
//!
//! Summaries report the median with a distribution-free confidence interval
//! built from order statistics (the sign-test interval: the coverage of
//! `[x(k+1), x(n-k)]` follows Binomial(n, 1/2)).
//!
//! Comparisons use the two-sided Mann-Whitney U test (Wilcoxon rank-sum).
//! Up to [`EXACT_LIMIT`] pooled samples the p-value comes from the exact
//! permutation distribution of mid-rank sums, so ties are handled exactly;
//! above that a normal approximation with tie and continuity correction is
//! used.

use crate::units::{Assumption, Better};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Default confidence level for summaries
pub const DEFAULT_CONFIDENCE: f64 = 0.95;

/// Default significance level for comparisons
pub const DEFAULT_COMPARE_ALPHA: f64 = 0.05;

/// Largest pooled sample size for the exact rank-sum distribution
pub const EXACT_LIMIT: usize = 50;

/// Significance thresholds for comparisons
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// A difference is significant when p < compare_alpha
    pub compare_alpha: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            compare_alpha: DEFAULT_COMPARE_ALPHA,
        }
    }
}

/// Summary of one cell's samples
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    /// Median
    pub center: f64,
    pub mean: f64,
    /// Lower confidence bound for the center
    pub lo: Option<f64>,
    /// Upper confidence bound for the center
    pub hi: Option<f64>,
    /// Requested confidence level
    pub confidence: f64,
    pub n: usize,
    /// False when there are too few samples for an interval
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Outcome of comparing a candidate column against the baseline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Verdict {
    Improved,
    Regressed,
    /// Significant, but the unit has no better direction
    Changed,
    NoSignificantChange,
    InsufficientData,
}

impl Verdict {
    pub fn is_significant(self) -> bool {
        matches!(self, Verdict::Improved | Verdict::Regressed | Verdict::Changed)
    }

    /// Machine-readable name, identical to the serialized form
    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Improved => "improved",
            Verdict::Regressed => "regressed",
            Verdict::Changed => "changed",
            Verdict::NoSignificantChange => "no-significant-change",
            Verdict::InsufficientData => "insufficient-data",
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Improved => write!(f, "improved"),
            Verdict::Regressed => write!(f, "regressed"),
            Verdict::Changed => write!(f, "changed"),
            Verdict::NoSignificantChange => write!(f, "~"),
            Verdict::InsufficientData => write!(f, "insufficient data"),
        }
    }
}

/// Result of comparing two sample sets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    /// candidate center / baseline center - 1, absent when the baseline
    /// center is zero
    pub delta: Option<f64>,
    /// Two-sided p-value, absent when no test could be run
    pub p_value: Option<f64>,
    pub alpha: f64,
    pub n_baseline: usize,
    pub n_candidate: usize,
    pub verdict: Verdict,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Summarize samples without distributional assumptions.
pub fn summarize(samples: &[f64], confidence: f64) -> Summary {
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let n = sorted.len();

    let mut summary = Summary {
        center: median(&sorted),
        mean: mean(&sorted),
        lo: None,
        hi: None,
        confidence,
        n,
        valid: false,
        warnings: Vec::new(),
    };

    if n < 2 {
        summary
            .warnings
            .push("need at least 2 samples for a confidence interval".to_string());
        return summary;
    }

    // Largest k whose interval still reaches the requested coverage
    let mut k = 0;
    while k + 1 < n - k - 1 && median_coverage(n, k + 1) >= confidence {
        k += 1;
    }
    let achieved = median_coverage(n, k);
    if achieved < confidence {
        summary.warnings.push(format!(
            "need >= {} samples for confidence interval at level {}",
            min_samples_for(confidence),
            confidence
        ));
    }

    summary.lo = Some(sorted[k]);
    summary.hi = Some(sorted[n - 1 - k]);
    summary.valid = true;
    summary
}

/// Summarize samples under the given assumption.
pub fn summarize_as(samples: &[f64], confidence: f64, assume: Assumption) -> Summary {
    match assume {
        Assumption::Nothing => summarize(samples, confidence),
        Assumption::Exact => summarize_exact(samples, confidence),
    }
}

fn summarize_exact(samples: &[f64], confidence: f64) -> Summary {
    let mut summary = Summary {
        center: samples.first().copied().unwrap_or(0.0),
        mean: mean(samples),
        lo: None,
        hi: None,
        confidence,
        n: samples.len(),
        valid: samples.len() >= 2,
        warnings: Vec::new(),
    };
    if !summary.valid {
        summary
            .warnings
            .push("need at least 2 samples to confirm an exact value".to_string());
    }
    if let Some((lo, hi)) = range(samples) {
        if lo != hi {
            summary.warnings.push(format!(
                "exact distribution expected, but values range from {} to {}",
                lo, hi
            ));
        }
    }
    summary
}

/// Compare a candidate against a baseline, treating lower values as better.
pub fn compare(baseline: &[f64], candidate: &[f64], thresholds: &Thresholds) -> Comparison {
    compare_as(
        baseline,
        candidate,
        thresholds,
        Better::Lower,
        Assumption::Nothing,
    )
}

/// Compare a candidate against a baseline for a unit with the given
/// direction and assumption.
pub fn compare_as(
    baseline: &[f64],
    candidate: &[f64],
    thresholds: &Thresholds,
    better: Better,
    assume: Assumption,
) -> Comparison {
    let alpha = thresholds.compare_alpha;
    let mut comparison = Comparison {
        delta: delta(baseline, candidate),
        p_value: None,
        alpha,
        n_baseline: baseline.len(),
        n_candidate: candidate.len(),
        verdict: Verdict::InsufficientData,
        warnings: Vec::new(),
    };

    let (m, n) = (baseline.len(), candidate.len());
    if m < 2 || n < 2 {
        comparison
            .warnings
            .push("need at least 2 samples on each side".to_string());
        return comparison;
    }

    if assume == Assumption::Exact {
        if let (Some((b_lo, b_hi)), Some((c_lo, c_hi))) = (range(baseline), range(candidate)) {
            if b_lo == b_hi && c_lo == c_hi {
                let (p, shift) = match c_lo.partial_cmp(&b_lo) {
                    Some(Ordering::Less) => (0.0, Ordering::Less),
                    Some(Ordering::Greater) => (0.0, Ordering::Greater),
                    _ => (1.0, Ordering::Equal),
                };
                comparison.p_value = Some(p);
                comparison.verdict = classify(p, alpha, shift, better);
                return comparison;
            }
            comparison
                .warnings
                .push("exact distribution expected, falling back to rank test".to_string());
        }
    }

    let min_p = 2.0 / binomial(m + n, m);
    if min_p > alpha {
        comparison.warnings.push(format!(
            "need more samples to detect a difference at alpha level {}",
            alpha
        ));
        return comparison;
    }

    let test = mann_whitney(baseline, candidate);
    comparison.p_value = Some(test.p_value);
    comparison.verdict = classify(test.p_value, alpha, test.shift, better);
    comparison
}

/// Verdict for a p-value and the direction the candidate moved in.
fn classify(p: f64, alpha: f64, shift: Ordering, better: Better) -> Verdict {
    if p >= alpha || shift == Ordering::Equal {
        return Verdict::NoSignificantChange;
    }
    match (better, shift) {
        (Better::Unordered, _) => Verdict::Changed,
        (Better::Lower, Ordering::Less) | (Better::Higher, Ordering::Greater) => Verdict::Improved,
        _ => Verdict::Regressed,
    }
}

struct RankTest {
    p_value: f64,
    /// Whether the candidate tends to be less or greater than the baseline
    shift: Ordering,
}

/// Two-sided Mann-Whitney U test of `a` against `b`.
fn mann_whitney(a: &[f64], b: &[f64]) -> RankTest {
    let (m, n) = (a.len(), b.len());
    let total = m + n;

    let mut pooled: Vec<(f64, bool)> = a
        .iter()
        .map(|&x| (x, true))
        .chain(b.iter().map(|&x| (x, false)))
        .collect();
    pooled.sort_by(|x, y| x.0.partial_cmp(&y.0).unwrap_or(Ordering::Equal));

    // Doubled mid-ranks keep everything in integers
    let mut ranks = vec![0u64; total];
    let mut tie_sizes = Vec::new();
    let mut i = 0;
    while i < total {
        let mut j = i;
        while j + 1 < total && pooled[j + 1].0 == pooled[i].0 {
            j += 1;
        }
        for rank in &mut ranks[i..=j] {
            *rank = (i + j + 2) as u64;
        }
        tie_sizes.push(j - i + 1);
        i = j + 1;
    }

    let observed: u64 = pooled
        .iter()
        .zip(&ranks)
        .filter(|((_, in_a), _)| *in_a)
        .map(|(_, r)| *r)
        .sum();
    let expected = (m * (total + 1)) as u64;

    // Large rank sum for the baseline means the candidate is smaller
    let shift = expected.cmp(&observed);
    if observed == expected {
        return RankTest {
            p_value: 1.0,
            shift,
        };
    }

    let p_value = if total <= EXACT_LIMIT {
        exact_rank_sum_p(&ranks, m, observed, expected)
    } else {
        normal_rank_sum_p(m, n, observed, &tie_sizes)
    };

    RankTest {
        p_value: p_value.min(1.0),
        shift,
    }
}

/// Exact two-sided p-value from the permutation distribution of the sum of
/// `m` doubled ranks drawn from `ranks`.
fn exact_rank_sum_p(ranks: &[u64], m: usize, observed: u64, expected: u64) -> f64 {
    let max_sum: u64 = ranks.iter().sum();
    let width = max_sum as usize + 1;

    // ways[k][s]: number of k-subsets with rank sum s
    let mut ways = vec![vec![0f64; width]; m + 1];
    ways[0][0] = 1.0;
    for (seen, &rank) in ranks.iter().enumerate() {
        let r = rank as usize;
        for k in (1..=m.min(seen + 1)).rev() {
            let (lower, upper) = ways.split_at_mut(k);
            let prev = &lower[k - 1];
            let cur = &mut upper[0];
            for s in (r..width).rev() {
                if prev[s - r] != 0.0 {
                    cur[s] += prev[s - r];
                }
            }
        }
    }

    let deviation = observed.abs_diff(expected);
    let (mut extreme, mut all) = (0.0, 0.0);
    for (s, count) in ways[m].iter().enumerate() {
        all += count;
        if (s as u64).abs_diff(expected) >= deviation {
            extreme += count;
        }
    }
    if all == 0.0 {
        return 1.0;
    }
    extreme / all
}

/// Normal approximation with tie and continuity correction.
fn normal_rank_sum_p(m: usize, n: usize, observed: u64, tie_sizes: &[usize]) -> f64 {
    let (mf, nf) = (m as f64, n as f64);
    let total = mf + nf;

    let u = observed as f64 / 2.0 - mf * (mf + 1.0) / 2.0;
    let mu = mf * nf / 2.0;

    let tie_term: f64 = tie_sizes
        .iter()
        .map(|&t| {
            let t = t as f64;
            t * t * t - t
        })
        .sum();
    let variance = mf * nf / 12.0 * ((total + 1.0) - tie_term / (total * (total - 1.0)));
    if variance <= 0.0 {
        return 1.0;
    }

    let z = ((u - mu).abs() - 0.5).max(0.0) / variance.sqrt();
    erfc(z / std::f64::consts::SQRT_2)
}

/// Coverage of the order-statistic interval `[x(k), x(n-1-k)]` for the
/// median: `1 - 2 * P(X <= k)` with X ~ Binomial(n, 1/2).
fn median_coverage(n: usize, k: usize) -> f64 {
    let ln_half_n = -(n as f64) * std::f64::consts::LN_2;
    let mut ln_choose = 0.0;
    let mut tail = 0.0;
    for i in 0..=k {
        if i > 0 {
            ln_choose += ((n - i + 1) as f64).ln() - (i as f64).ln();
        }
        tail += (ln_choose + ln_half_n).exp();
    }
    1.0 - 2.0 * tail
}

/// Smallest sample count whose widest interval reaches `confidence`.
fn min_samples_for(confidence: f64) -> usize {
    (2..1100)
        .find(|&n| median_coverage(n, 0) >= confidence)
        .unwrap_or(1100)
}

/// Binomial coefficient as a float
fn binomial(n: usize, k: usize) -> f64 {
    let k = k.min(n - k);
    (0..k).fold(1.0, |acc, i| acc * (n - i) as f64 / (i + 1) as f64)
}

/// Complementary error function (Numerical Recipes `erfcc`, |error| < 1.2e-7)
fn erfc(x: f64) -> f64 {
    let z = x.abs();
    let t = 1.0 / (1.0 + 0.5 * z);
    let poly = -z * z - 1.265_512_23
        + t * (1.000_023_68
            + t * (0.374_091_96
                + t * (0.096_784_18
                    + t * (-0.186_288_06
                        + t * (0.278_868_07
                            + t * (-1.135_203_98
                                + t * (1.488_515_87 + t * (-0.822_152_23 + t * 0.170_872_77))))))));
    let r = t * poly.exp();
    if x >= 0.0 {
        r
    } else {
        2.0 - r
    }
}

/// Median of sorted samples, 0 for none
fn median(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    match n {
        0 => 0.0,
        _ if n % 2 == 1 => sorted[n / 2],
        _ => (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0,
    }
}

fn mean(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().sum::<f64>() / samples.len() as f64
}

fn range(samples: &[f64]) -> Option<(f64, f64)> {
    let first = *samples.first()?;
    Some(
        samples
            .iter()
            .fold((first, first), |(lo, hi), &x| (lo.min(x), hi.max(x))),
    )
}

fn delta(baseline: &[f64], candidate: &[f64]) -> Option<f64> {
    let base = center_of(baseline)?;
    let cand = center_of(candidate)?;
    if base == 0.0 {
        return None;
    }
    Some(cand / base - 1.0)
}

fn center_of(samples: &[f64]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    Some(median(&sorted))
}

/// Geometric mean of positive values, `None` if empty or any value is not
/// positive.
pub fn geomean(values: &[f64]) -> Option<f64> {
    if values.is_empty() || values.iter().any(|&v| v <= 0.0 || !v.is_finite()) {
        return None;
    }
    let ln_sum: f64 = values.iter().map(|v| v.ln()).sum();
    Some((ln_sum / values.len() as f64).exp())
}

#[cfg(test)]
mod tests {
    use super::*;

    const OLD: [f64; 5] = [10.0, 11.0, 10.0, 12.0, 11.0];
    const NEW: [f64; 5] = [5.0, 6.0, 5.0, 6.0, 5.0];

    #[test]
    fn test_summary_center_and_mean() {
        let s = summarize(&OLD, 0.95);
        assert_eq!(s.n, 5);
        assert_eq!(s.center, 11.0);
        assert!((s.mean - 10.8).abs() < 1e-9);
        assert!(s.valid);
        // Five samples cannot reach 95%: widest interval plus a warning
        assert_eq!(s.lo, Some(10.0));
        assert_eq!(s.hi, Some(12.0));
        assert_eq!(s.warnings.len(), 1);
        assert!(s.warnings[0].contains("need >= 6 samples"));
    }

    #[test]
    fn test_summary_interval_narrows_with_samples() {
        let samples: Vec<f64> = (1..=20).map(f64::from).collect();
        let s = summarize(&samples, 0.95);
        assert!(s.warnings.is_empty());
        assert_eq!(s.center, 10.5);
        // For n = 20 the 95% sign-test interval is [x(6), x(15)]
        assert_eq!(s.lo, Some(6.0));
        assert_eq!(s.hi, Some(15.0));
    }

    #[test]
    fn test_summary_insufficient() {
        let s = summarize(&[3.0], 0.95);
        assert!(!s.valid);
        assert_eq!(s.lo, None);
        assert_eq!(s.hi, None);
        assert_eq!(s.center, 3.0);
    }

    #[test]
    fn test_summary_order_independent() {
        let a = summarize(&[3.0, 1.0, 2.0, 5.0, 4.0, 9.0, 7.0], 0.9);
        let b = summarize(&[9.0, 7.0, 5.0, 4.0, 3.0, 2.0, 1.0], 0.9);
        assert_eq!(a.center, b.center);
        assert_eq!(a.lo, b.lo);
        assert_eq!(a.hi, b.hi);
    }

    #[test]
    fn test_compare_improved() {
        let c = compare(&OLD, &NEW, &Thresholds::default());
        assert_eq!(c.verdict, Verdict::Improved);
        let p = c.p_value.unwrap();
        assert!((p - 2.0 / 252.0).abs() < 1e-12);
        assert!((c.delta.unwrap() - (5.0 / 11.0 - 1.0)).abs() < 1e-12);
    }

    #[test]
    fn test_compare_symmetry() {
        let t = Thresholds::default();
        let forward = compare(&OLD, &NEW, &t);
        let backward = compare(&NEW, &OLD, &t);
        assert_eq!(forward.verdict, Verdict::Improved);
        assert_eq!(backward.verdict, Verdict::Regressed);
        assert_eq!(forward.p_value, backward.p_value);
    }

    #[test]
    fn test_compare_identical() {
        let t = Thresholds::default();
        let c = compare(&OLD, &OLD, &t);
        assert_eq!(c.verdict, Verdict::NoSignificantChange);
        assert_eq!(c.p_value, Some(1.0));

        let flat = [4.0; 8];
        let c = compare(&flat, &flat, &t);
        assert_eq!(c.verdict, Verdict::NoSignificantChange);
    }

    #[test]
    fn test_compare_insufficient() {
        let t = Thresholds::default();
        assert_eq!(compare(&[1.0], &NEW, &t).verdict, Verdict::InsufficientData);
        // 2 vs 2 can never reach p < 0.05
        assert_eq!(
            compare(&[1.0, 2.0], &[8.0, 9.0], &t).verdict,
            Verdict::InsufficientData
        );
    }

    #[test]
    fn test_compare_alpha_controls_significance() {
        let base = [10.0, 11.0, 12.0, 13.0, 14.0];
        let cand = [11.5, 12.5, 13.5, 14.5, 15.5];
        let loose = compare(&base, &cand, &Thresholds { compare_alpha: 0.5 });
        let strict = compare(&base, &cand, &Thresholds { compare_alpha: 0.01 });
        assert_eq!(loose.verdict, Verdict::Regressed);
        assert_eq!(strict.verdict, Verdict::NoSignificantChange);
    }

    #[test]
    fn test_compare_direction_follows_unit() {
        let t = Thresholds::default();
        let higher = compare_as(&OLD, &NEW, &t, Better::Higher, Assumption::Nothing);
        assert_eq!(higher.verdict, Verdict::Regressed);
        let unordered = compare_as(&OLD, &NEW, &t, Better::Unordered, Assumption::Nothing);
        assert_eq!(unordered.verdict, Verdict::Changed);
    }

    #[test]
    fn test_compare_large_samples_use_normal_approximation() {
        let base: Vec<f64> = (0..40).map(|i| 100.0 + (i % 7) as f64).collect();
        let cand: Vec<f64> = (0..40).map(|i| 90.0 + (i % 7) as f64).collect();
        let t = Thresholds::default();
        let c = compare(&base, &cand, &t);
        assert_eq!(c.verdict, Verdict::Improved);
        assert!(c.p_value.unwrap() < 1e-6);

        let same = compare(&base, &base, &t);
        assert_eq!(same.verdict, Verdict::NoSignificantChange);
    }

    #[test]
    fn test_exact_assumption() {
        let t = Thresholds::default();
        let s = summarize_as(&[64.0, 64.0, 64.0], 0.95, Assumption::Exact);
        assert!(s.valid);
        assert_eq!(s.center, 64.0);
        assert_eq!(s.lo, None);
        assert!(s.warnings.is_empty());

        let c = compare_as(&[64.0, 64.0], &[32.0, 32.0], &t, Better::Lower, Assumption::Exact);
        assert_eq!(c.verdict, Verdict::Improved);
        let c = compare_as(&[64.0, 64.0], &[64.0, 64.0], &t, Better::Lower, Assumption::Exact);
        assert_eq!(c.verdict, Verdict::NoSignificantChange);

        let noisy = summarize_as(&[1.0, 2.0], 0.95, Assumption::Exact);
        assert_eq!(noisy.warnings.len(), 1);
    }

    #[test]
    fn test_verdict_names_match_serde() {
        for verdict in [
            Verdict::Improved,
            Verdict::Regressed,
            Verdict::Changed,
            Verdict::NoSignificantChange,
            Verdict::InsufficientData,
        ] {
            let json = serde_json::to_value(verdict).unwrap();
            assert_eq!(json, verdict.as_str());
        }
    }

    #[test]
    fn test_exact_single_sample_is_insufficient() {
        let t = Thresholds::default();
        let s = summarize_as(&[64.0], 0.95, Assumption::Exact);
        assert!(!s.valid);
        assert_eq!(s.center, 64.0);
        assert_eq!(s.warnings.len(), 1);

        let c = compare_as(&[64.0, 64.0], &[32.0], &t, Better::Lower, Assumption::Exact);
        assert_eq!(c.verdict, Verdict::InsufficientData);
        assert_eq!(c.p_value, None);
        let c = compare_as(&[64.0], &[64.0], &t, Better::Lower, Assumption::Exact);
        assert_eq!(c.verdict, Verdict::InsufficientData);
    }

    #[test]
    fn test_median_coverage() {
        assert!((median_coverage(5, 0) - 0.9375).abs() < 1e-12);
        assert!((median_coverage(6, 0) - 0.96875).abs() < 1e-12);
        assert_eq!(min_samples_for(0.95), 6);
    }

    #[test]
    fn test_geomean() {
        assert!((geomean(&[1.0, 100.0]).unwrap() - 10.0).abs() < 1e-9);
        assert_eq!(geomean(&[]), None);
        assert_eq!(geomean(&[1.0, 0.0]), None);
    }

    #[test]
    fn test_erfc() {
        assert!((erfc(0.0) - 1.0).abs() < 1e-6);
        assert!((erfc(1.0) - 0.157_299_2).abs() < 1e-6);
        assert!((erfc(-1.0) - 1.842_700_8).abs() < 1e-6);
    }
}
