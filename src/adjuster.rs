use rayon::prelude::*;

use crate::corpus::Reference;
use crate::histogram::normalized_median;
use crate::score::{Match, Metric, best_match};
use crate::spline::CubicSpline;

/// Shape of the knot grid search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdjusterConfig {
    /// Interior knots moved by the search.
    pub adjust_points: usize,
    /// Offsets tried per knot and level.
    pub steps: usize,
    /// Refinement rounds, each with a narrower spread.
    pub levels: usize,
}

impl Default for AdjusterConfig {
    fn default() -> Self {
        Self {
            adjust_points: 4,
            steps: 4,
            levels: 3,
        }
    }
}

/// Outcome of one curve search.
#[derive(Debug, Clone)]
pub struct AdjusterResult {
    pub spline: CubicSpline,
    /// Position of the matched reference in the searched slice.
    pub reference_index: usize,
    pub reference_id: u32,
    pub popularity: f64,
    /// Unit-domain median of the winning distribution.
    pub median: f64,
    pub correctness: f64,
    /// Correctness of the untouched (identity) curve.
    pub initial_correctness: f64,
    /// Best correctness after each evaluated level.
    pub history: Vec<f64>,
}

impl AdjusterResult {
    pub fn improvement(&self) -> f64 {
        self.correctness / self.initial_correctness.max(f64::MIN_POSITIVE)
    }
}

#[derive(Debug, Clone)]
struct Candidate {
    variant: usize,
    points: Vec<f64>,
    matched: Match,
    histogram: Vec<f64>,
}

impl Candidate {
    /// Higher correctness wins, then the lower variant number.
    fn better(self, other: Self) -> Self {
        if other.matched.correctness > self.matched.correctness
            || (other.matched.correctness == self.matched.correctness
                && other.variant < self.variant)
        {
            other
        } else {
            self
        }
    }
}

/// Multi-level grid search over the interior knot values of a spline.
///
/// Knot x positions are fixed: the two domain bounds plus `adjust_points`
/// knots at the centers of equal subdivisions. Each level tries every
/// combination of `steps` offsets per knot within `±0.45 * range / level` of
/// the current best values and keeps the combination whose test distribution
/// scores the highest correctness against the references.
#[derive(Debug)]
pub struct SplineAdjuster<'a> {
    refs: &'a [Reference],
    min_value: f64,
    max_value: f64,
    config: AdjusterConfig,
}

impl<'a> SplineAdjuster<'a> {
    /// # Panics
    /// If `refs` is empty, the domain is empty, or the config asks for no
    /// knots or no steps.
    pub fn new(
        refs: &'a [Reference],
        min_value: f64,
        max_value: f64,
        config: AdjusterConfig,
    ) -> Self {
        assert!(!refs.is_empty(), "spline adjuster needs at least one reference");
        assert!(max_value > min_value, "empty search domain {min_value}..{max_value}");
        assert!(
            config.adjust_points >= 1 && config.steps >= 1,
            "degenerate search grid {config:?}"
        );
        Self {
            refs,
            min_value,
            max_value,
            config,
        }
    }

    /// Half the distance between neighbouring interior knots.
    fn range(&self) -> f64 {
        (self.max_value - self.min_value) / (2.0 * self.config.adjust_points as f64)
    }

    pub fn knots_x(&self) -> Vec<f64> {
        let range = self.range();
        let mut xs = Vec::with_capacity(self.config.adjust_points + 2);
        xs.push(self.min_value);
        xs.extend(
            (0..self.config.adjust_points).map(|k| self.min_value + range * (1 + 2 * k) as f64),
        );
        xs.push(self.max_value);
        xs
    }

    fn spline(&self, knots_x: &[f64], interior: &[f64]) -> CubicSpline {
        let mut ys = Vec::with_capacity(knots_x.len());
        ys.push(self.min_value);
        ys.extend_from_slice(interior);
        ys.push(self.max_value);
        CubicSpline::new(knots_x, &ys)
    }

    /// Decode `variant` as base-`steps` digits, one offset per knot.
    fn candidate_points(&self, center: &[f64], spread: f64, variant: usize) -> Vec<f64> {
        let steps = self.config.steps;
        let mut t = variant;
        center
            .iter()
            .map(|&c| {
                let pos = t % steps;
                t /= steps;
                if steps == 1 {
                    c
                } else {
                    c - spread + pos as f64 * 2.0 * spread / (steps - 1) as f64
                }
            })
            .collect()
    }

    fn evaluate<F>(
        &self,
        test: &F,
        metric: Metric,
        knots_x: &[f64],
        variant: usize,
        points: Vec<f64>,
    ) -> Candidate
    where
        F: Fn(&CubicSpline) -> Vec<f64> + Sync,
    {
        let histogram = test(&self.spline(knots_x, &points));
        let matched = best_match(&histogram, self.refs, metric);
        Candidate {
            variant,
            points,
            matched,
            histogram,
        }
    }

    /// Search for the curve whose test distribution best matches a reference.
    ///
    /// `test` maps a candidate curve to a distribution with the same bucket
    /// count as the references. It must be deterministic; it is called from
    /// several threads at once.
    pub fn find_spline<F>(&self, metric: Metric, test: F) -> AdjusterResult
    where
        F: Fn(&CubicSpline) -> Vec<f64> + Sync,
    {
        let knots_x = self.knots_x();
        let mut center: Vec<f64> = knots_x[1..knots_x.len() - 1].to_vec();
        let range = self.range();

        let mut best = self.evaluate(&test, metric, &knots_x, 0, center.clone());
        let initial_correctness = best.matched.correctness;
        log::debug!("initial correctness {initial_correctness:.4}");

        let candidates = self
            .config
            .steps
            .checked_pow(self.config.adjust_points as u32)
            .unwrap_or(usize::MAX);
        let mut history = Vec::with_capacity(self.config.levels);

        for level in 1..=self.config.levels {
            let spread = 0.45 * range / level as f64;
            let round = (0..candidates)
                .into_par_iter()
                .map(|variant| {
                    let points = self.candidate_points(&center, spread, variant);
                    self.evaluate(&test, metric, &knots_x, variant, points)
                })
                .reduce_with(Candidate::better);

            let improved = match round {
                Some(round) if round.matched.correctness > best.matched.correctness => {
                    center.clone_from(&round.points);
                    best = round;
                    true
                }
                _ => false,
            };
            history.push(best.matched.correctness);
            log::debug!(
                "level {level}: best correctness {:.4}{}",
                best.matched.correctness,
                if improved { "" } else { ", no improvement" }
            );
            if !improved {
                break;
            }
        }

        let reference = &self.refs[best.matched.index];
        let median = normalized_median(&best.histogram, 0.5);
        let result = AdjusterResult {
            spline: self.spline(&knots_x, &best.points),
            reference_index: best.matched.index,
            reference_id: reference.id,
            popularity: reference.popularity,
            median,
            correctness: best.matched.correctness,
            initial_correctness,
            history,
        };
        log::info!(
            "best reference {}, improvement {:.3}, median {:.3}",
            result.reference_id,
            result.improvement(),
            result.median
        );
        log::debug!("{}", result.spline);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::histogram::Histogram;

    const BUCKETS: usize = 32;

    fn samples() -> Vec<f64> {
        (0..2000).map(|i| i as f64 / 1999.0).collect()
    }

    fn distribution(values: &[f64]) -> Vec<f64> {
        Histogram::build(0.0, 1.0, BUCKETS, values.len(), |i| values[i]).buckets
    }

    fn reference(id: u32, data: Vec<f64>) -> Reference {
        Reference {
            id,
            popularity: 0.5,
            average_error: 0.05,
            data,
        }
    }

    fn mapped(spline: &CubicSpline, values: &[f64]) -> Vec<f64> {
        let out: Vec<f64> = values.iter().map(|&v| spline.interpolate(v)).collect();
        distribution(&out)
    }

    #[test]
    fn knot_layout() {
        let refs = [reference(0, vec![0.0; BUCKETS])];
        let adjuster = SplineAdjuster::new(&refs, 0.0, 256.0, AdjusterConfig::default());
        assert_eq!(adjuster.knots_x(), vec![0.0, 32.0, 96.0, 160.0, 224.0, 256.0]);
    }

    #[test]
    fn candidates_cover_the_spread() {
        let refs = [reference(0, vec![0.0; BUCKETS])];
        let config = AdjusterConfig {
            adjust_points: 2,
            steps: 3,
            levels: 1,
        };
        let adjuster = SplineAdjuster::new(&refs, 0.0, 1.0, config);
        let center = [0.25, 0.75];
        let first = adjuster.candidate_points(&center, 0.1, 0);
        assert!((first[0] - 0.15).abs() < 1e-12 && (first[1] - 0.65).abs() < 1e-12);
        let last = adjuster.candidate_points(&center, 0.1, 8);
        assert!((last[0] - 0.35).abs() < 1e-12 && (last[1] - 0.85).abs() < 1e-12);
        let mid = adjuster.candidate_points(&center, 0.1, 4);
        assert!((mid[0] - 0.25).abs() < 1e-12 && (mid[1] - 0.75).abs() < 1e-12);
    }

    #[test]
    fn search_moves_toward_reference() {
        let values = samples();
        // Reachable at the first level: every interior knot raised by the
        // full first-level spread.
        let lift = 0.45 * 0.125;
        let target = CubicSpline::new(
            &[0.0, 0.125, 0.375, 0.625, 0.875, 1.0],
            &[0.0, 0.125 + lift, 0.375 + lift, 0.625 + lift, 0.875 + lift, 1.0],
        );
        let refs = [reference(9, mapped(&target, &values))];
        let adjuster = SplineAdjuster::new(&refs, 0.0, 1.0, AdjusterConfig::default());
        let result = adjuster.find_spline(Metric::Squared, |s| mapped(s, &values));

        assert!(result.correctness > result.initial_correctness);
        assert!(!result.history.is_empty());
        for w in result.history.windows(2) {
            assert!(w[1] >= w[0], "history went down: {:?}", result.history);
        }
        assert_eq!(result.history.last().copied(), Some(result.correctness));
        assert_eq!(result.reference_id, 9);
        assert!(result.spline.interpolate(0.375) > 0.375 + 0.02, "{}", result.spline);
    }

    #[test]
    fn single_step_keeps_identity() {
        let values = samples();
        let refs = [reference(1, distribution(&values.iter().map(|v| v * v).collect::<Vec<_>>()))];
        let config = AdjusterConfig {
            adjust_points: 3,
            steps: 1,
            levels: 3,
        };
        let adjuster = SplineAdjuster::new(&refs, 0.0, 1.0, config);
        let result = adjuster.find_spline(Metric::Squared, |s| mapped(s, &values));
        assert_eq!(result.history.len(), 1);
        assert_eq!(result.correctness, result.initial_correctness);
        for x in [0.1, 0.5, 0.9] {
            assert!((result.spline.interpolate(x) - x).abs() < 1e-12);
        }
    }

    #[test]
    fn exact_match_keeps_identity_curve() {
        let values = samples();
        let refs = [
            reference(3, distribution(&values.iter().map(|v| v * v).collect::<Vec<_>>())),
            reference(4, distribution(&values)),
            reference(5, distribution(&values.iter().map(|v| v.sqrt()).collect::<Vec<_>>())),
        ];
        let adjuster = SplineAdjuster::new(&refs, 0.0, 1.0, AdjusterConfig::default());
        let result = adjuster.find_spline(Metric::Squared, |s| mapped(s, &values));
        assert_eq!(result.reference_id, 4);
        assert_eq!(result.reference_index, 1);
        for x in [0.05, 0.3, 0.6, 0.95] {
            let y = result.spline.interpolate(x);
            assert!((y - x).abs() < 1e-9, "s({x}) = {y}");
        }
    }
}
