use crate::corpus::Reference;
use crate::histogram::normalized_median;

/// Distances below this are treated as a perfect match when computing
/// correctness.
const MIN_DISTANCE: f64 = 1e-12;

/// How a candidate distribution is compared with a reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    /// Bucket-wise squared difference plus the fourth power of the slope
    /// difference.
    Squared,
    /// Squared differences of medians at the eighths of the cumulative mass.
    Medians,
}

impl Metric {
    pub fn distance(&self, test: &[f64], reference: &[f64]) -> f64 {
        match self {
            Self::Squared => squared_distance(test, reference),
            Self::Medians => median_distance(test, reference),
        }
    }
}

/// `Σ d1² + d2⁴` where `d1` is the bucket difference and `d2` the difference
/// of consecutive-bucket slopes.
pub fn squared_distance(test: &[f64], reference: &[f64]) -> f64 {
    debug_assert_eq!(test.len(), reference.len());
    let mut sum = 0.0;
    for i in 0..test.len().min(reference.len()) {
        let d1 = test[i] - reference[i];
        let d2 = if i > 0 {
            (test[i] - test[i - 1]) - (reference[i] - reference[i - 1])
        } else {
            0.0
        };
        sum += d1 * d1 + d2 * d2 * d2 * d2;
    }
    sum
}

/// Mean over thresholds 1/8..7/8 of the squared difference of unit-domain
/// medians, divided by 8.
pub fn median_distance(test: &[f64], reference: &[f64]) -> f64 {
    (1..8)
        .map(|k| {
            let threshold = k as f64 / 8.0;
            let d = normalized_median(test, threshold) - normalized_median(reference, threshold);
            d * d
        })
        .sum::<f64>()
        / 8.0
}

/// Inverse distance normalized by the reference's own typical mismatch.
/// A NaN distance scores zero.
pub fn correctness(average_error: f64, distance: f64) -> f64 {
    if distance.is_nan() {
        return 0.0;
    }
    average_error / distance.max(MIN_DISTANCE)
}

/// Best reference for one candidate distribution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Match {
    /// Position in the slice that was searched.
    pub index: usize,
    pub distance: f64,
    pub correctness: f64,
}

/// Reference with the highest correctness for `test`. Ties go to the lower
/// index.
///
/// # Panics
/// If `refs` is empty.
pub fn best_match(test: &[f64], refs: &[Reference], metric: Metric) -> Match {
    assert!(!refs.is_empty(), "no references to match against");
    let score = |index: usize| {
        let reference = &refs[index];
        let distance = metric.distance(test, &reference.data);
        Match {
            index,
            distance,
            correctness: correctness(reference.average_error, distance),
        }
    };
    (1..refs.len()).map(score).fold(score(0), |best, m| {
        if m.correctness > best.correctness { m } else { best }
    })
}
