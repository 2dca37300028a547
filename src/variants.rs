//! Variant search: branch every surviving variant into one child per
//! diapason at each stage, merge children whose fitted distributions are
//! indistinguishable, and order the final set for diversity.

use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Mutex;

use imgref::ImgRef;
use rayon::prelude::*;

use crate::corpus::{Corpus, Diapason};
use crate::filters::{CurveFit, FilterKind, StageContext, StageFit, cutoff};
use crate::raster::{Pixel, Raster, reduce_size};

#[derive(Debug, Clone)]
pub struct VariantConfig {
    /// Survivors kept after each stage.
    pub max_variants: usize,
    /// Variants returned after diversity ordering.
    pub max_output: usize,
}

impl Default for VariantConfig {
    fn default() -> Self {
        Self {
            max_variants: 16,
            max_output: 12,
        }
    }
}

/// One candidate output and the per-stage choices that produced it.
#[derive(Debug, Clone)]
pub struct VariantData {
    pub raster: Raster,
    /// Stages applied so far, in order.
    pub choices: Vec<(FilterKind, Diapason)>,
    /// Indexed by [`FilterKind::index`].
    pub fits: [StageFit; 4],
}

impl VariantData {
    /// The unprocessed starting point.
    pub fn root(raster: Raster) -> Self {
        Self {
            raster,
            choices: Vec::new(),
            fits: Default::default(),
        }
    }

    pub fn fit(&self, kind: FilterKind) -> Option<&CurveFit> {
        self.fits[kind.index()].as_fit()
    }

    pub fn diapason(&self, kind: FilterKind) -> Option<Diapason> {
        self.choices.iter().find(|(k, _)| *k == kind).map(|&(_, d)| d)
    }

    /// Sum of `popularity × correctness` over the fitted stages.
    pub fn rank(&self) -> f64 {
        self.fits.iter().filter_map(StageFit::as_fit).map(CurveFit::rank).sum()
    }

    /// Same stages fitted, and every fitted median within that stage's
    /// corpus quantum of the other's.
    pub fn is_close_to(&self, other: &VariantData, corpus: &Corpus) -> bool {
        FilterKind::ALL.iter().all(|&kind| match (self.fit(kind), other.fit(kind)) {
            (Some(a), Some(b)) => {
                (a.median - b.median).abs() <= corpus.references(kind).median_quantum()
            }
            (None, None) => true,
            _ => false,
        })
    }

    /// Number of stages on which the two variants chose differently.
    pub fn disagreements(&self, other: &VariantData) -> usize {
        FilterKind::ALL
            .iter()
            .filter(|&&kind| self.diapason(kind) != other.diapason(kind))
            .count()
    }

    /// Chosen diapasons joined by `_`, e.g. `low_mid_high_low`.
    pub fn label(&self) -> String {
        let names: Vec<&str> = self.choices.iter().map(|(_, d)| d.name()).collect();
        names.join("_")
    }

    fn child(&self, kind: FilterKind, diapason: Diapason, raster: Raster, fit: CurveFit) -> Self {
        let mut choices = self.choices.clone();
        choices.push((kind, diapason));
        let mut fits = self.fits.clone();
        fits[kind.index()] = StageFit::Fit(fit);
        Self {
            raster,
            choices,
            fits,
        }
    }

    /// Replace the raster by its cut-off version.
    pub fn cut_off(self, threshold: f64) -> Self {
        Self {
            raster: cutoff::apply(self.raster.as_ref(), threshold),
            ..self
        }
    }
}

/// Identity of a raster's contents, used to reuse curve fits between parents
/// that hold the same image.
pub fn fingerprint(src: ImgRef<'_, Pixel>) -> u64 {
    let mut hasher = DefaultHasher::new();
    src.width().hash(&mut hasher);
    src.height().hash(&mut hasher);
    for p in src.pixels() {
        p.r.to_bits().hash(&mut hasher);
        p.g.to_bits().hash(&mut hasher);
        p.b.to_bits().hash(&mut hasher);
    }
    hasher.finish()
}

type FitKey = (FilterKind, Diapason, u64);

/// Curve fits keyed by stage, diapason and input fingerprint.
#[derive(Debug, Default)]
pub struct FitCache {
    entries: Mutex<HashMap<FitKey, CurveFit>>,
}

impl FitCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cached fit for `key`, or the result of `fit`, which is then stored.
    /// The lock is not held while fitting.
    pub fn get_or_fit(&self, key: FitKey, fit: impl FnOnce() -> CurveFit) -> CurveFit {
        if let Some(hit) = self.entries.lock().unwrap_or_else(|e| e.into_inner()).get(&key) {
            log::debug!("reusing {} {} fit", key.0, key.1);
            return hit.clone();
        }
        let value = fit();
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, value.clone());
        value
    }
}

/// Run `kind` on every parent once per search diapason.
pub fn expand(
    ctx: &StageContext<'_>,
    parents: &[VariantData],
    kind: FilterKind,
    cache: &FitCache,
) -> Vec<VariantData> {
    let prints: Vec<u64> = parents.par_iter().map(|p| fingerprint(p.raster.as_ref())).collect();
    let pairs: Vec<(usize, Diapason)> = (0..parents.len())
        .flat_map(|i| Diapason::SEARCH.map(|d| (i, d)))
        .collect();

    pairs
        .into_par_iter()
        .map(|(i, diapason)| {
            let parent = &parents[i];
            let src = parent.raster.as_ref();
            let fit = cache.get_or_fit((kind, diapason, prints[i]), || {
                kind.fit(ctx, src, diapason)
            });
            let raster = kind.correct(ctx, src, &fit.spline);
            parent.child(kind, diapason, raster, fit)
        })
        .collect()
}

/// Keep the best-ranked variant of every group of close variants, at most
/// `max_variants` in total, best first. Applying it to its own output
/// changes nothing.
pub fn filter_close(
    variants: Vec<VariantData>,
    corpus: &Corpus,
    max_variants: usize,
) -> Vec<VariantData> {
    let before = variants.len();
    let mut sorted = variants;
    sorted.sort_by(|a, b| b.rank().total_cmp(&a.rank()));

    let mut kept: Vec<VariantData> = Vec::with_capacity(sorted.len().min(max_variants));
    for v in sorted {
        if kept.len() >= max_variants {
            break;
        }
        match kept.iter().find(|k| k.is_close_to(&v, corpus)) {
            Some(k) => log::debug!("filtered {} -> {}", v.label(), k.label()),
            None => kept.push(v),
        }
    }
    log::info!("{before} -> {}", kept.len());
    kept
}

/// Greedy diversity ordering: start from the best-ranked variant, then
/// repeatedly take the one that disagrees most, in total, with everything
/// already taken. Ties go to the higher rank, then to the earlier position.
pub fn order_by_diversity(variants: Vec<VariantData>, max_output: usize) -> Vec<VariantData> {
    let mut pending: Vec<Option<VariantData>> = variants.into_iter().map(Some).collect();
    let mut ordered: Vec<VariantData> = Vec::with_capacity(pending.len().min(max_output));

    while ordered.len() < max_output {
        let mut pick: Option<(usize, usize, f64)> = None;
        for (i, v) in pending.iter().enumerate() {
            let Some(v) = v else { continue };
            let spread: usize = ordered.iter().map(|o| o.disagreements(v)).sum();
            let rank = v.rank();
            let better = match pick {
                None => true,
                Some((_, s, r)) => spread > s || (spread == s && rank > r),
            };
            if better {
                pick = Some((i, spread, rank));
            }
        }
        let Some(v) = pick.and_then(|(i, _, _)| pending[i].take()) else {
            break;
        };
        ordered.push(v);
    }
    ordered
}

/// Full variant search on `src`, which is first reduced to the configured
/// search size.
pub fn generate_variants(
    ctx: &StageContext<'_>,
    src: ImgRef<'_, Pixel>,
    cache: &FitCache,
) -> Vec<VariantData> {
    let config = ctx.config;
    let mut variants = vec![VariantData::root(reduce_size(src, config.variant_size))];
    for kind in config.stages() {
        let expanded = expand(ctx, &variants, kind, cache);
        log::info!("{kind}: {} parents -> {} children", variants.len(), expanded.len());
        variants = filter_close(expanded, ctx.corpus, config.variants.max_variants);
    }
    let cut: Vec<VariantData> = variants
        .into_par_iter()
        .map(|v| v.cut_off(config.cutoff_threshold))
        .collect();
    order_by_diversity(cut, config.variants.max_output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::Reference;
    use crate::spline::CubicSpline;
    use imgref::ImgVec;

    fn corpus() -> Corpus {
        let refs = |buckets: usize| -> Vec<Reference> {
            (0..3)
                .map(|i| {
                    let mut data = vec![0.0; buckets];
                    data[i * buckets / 3] = 1.0;
                    Reference {
                        id: i as u32,
                        popularity: 1.0,
                        average_error: 1.0,
                        data,
                    }
                })
                .collect()
        };
        Corpus::new(refs(1024), refs(128), refs(128), refs(256)).unwrap()
    }

    fn variant(choices: &[Diapason], median: f64, correctness: f64) -> VariantData {
        let mut v = VariantData::root(ImgVec::new(vec![Pixel::default()], 1, 1));
        for (kind, &d) in FilterKind::ALL.iter().zip(choices) {
            let fit = CurveFit {
                spline: CubicSpline::identity(0.0, 1.0),
                diapason: d,
                reference_id: 0,
                reference_index: 0,
                popularity: 1.0,
                median,
                correctness,
                initial_correctness: correctness,
            };
            let raster = v.raster.clone();
            v = v.child(*kind, d, raster, fit);
        }
        v
    }

    use Diapason::{High, Low, Mid};

    #[test]
    fn rank_sums_fitted_stages() {
        let v = variant(&[Low, Mid], 0.5, 2.0);
        assert_eq!(v.rank(), 4.0);
        assert_eq!(v.label(), "low_mid");
        assert_eq!(v.diapason(FilterKind::Zonal), Some(Mid));
        assert_eq!(v.diapason(FilterKind::Luminance), None);
    }

    #[test]
    fn dedup_keeps_best_of_close_group() {
        let corpus = corpus();
        // quantum per kind is (2/3 - 0) / 18 ≈ 0.037
        let a = variant(&[Low], 0.30, 1.0);
        let b = variant(&[Mid], 0.31, 3.0);
        let c = variant(&[High], 0.60, 2.0);
        let kept = filter_close(vec![a, b, c], &corpus, 16);
        let labels: Vec<String> = kept.iter().map(VariantData::label).collect();
        assert_eq!(labels, ["mid", "high"]);
    }

    #[test]
    fn dedup_is_idempotent() {
        let corpus = corpus();
        let variants: Vec<VariantData> = (0..20)
            .map(|i| {
                let d = [Low, Mid, High][i % 3];
                variant(&[d, d], (i as f64 * 0.023) % 0.7, 1.0 + (i % 7) as f64)
            })
            .collect();
        let once = filter_close(variants, &corpus, 16);
        let labels_once: Vec<(String, f64)> = once.iter().map(|v| (v.label(), v.rank())).collect();
        let twice = filter_close(once, &corpus, 16);
        let labels_twice: Vec<(String, f64)> =
            twice.iter().map(|v| (v.label(), v.rank())).collect();
        assert_eq!(labels_once, labels_twice);
    }

    #[test]
    fn dedup_caps_survivors() {
        let corpus = corpus();
        let variants: Vec<VariantData> =
            (0..10).map(|i| variant(&[Low], i as f64 * 0.1, 1.0)).collect();
        assert_eq!(filter_close(variants, &corpus, 4).len(), 4);
    }

    #[test]
    fn diversity_order_prefers_disagreement() {
        let best = variant(&[Low, Low, Low, Low], 0.1, 5.0);
        let similar = variant(&[Low, Low, Low, Mid], 0.2, 4.0);
        let different = variant(&[High, High, Mid, Mid], 0.3, 1.0);
        let ordered = order_by_diversity(vec![similar, different, best], 12);
        let labels: Vec<String> = ordered.iter().map(VariantData::label).collect();
        assert_eq!(labels, ["low_low_low_low", "high_high_mid_mid", "low_low_low_mid"]);
    }

    #[test]
    fn diversity_order_truncates() {
        let variants: Vec<VariantData> =
            (0..5).map(|i| variant(&[Low], 0.1 * i as f64, 1.0)).collect();
        assert_eq!(order_by_diversity(variants, 3).len(), 3);
        assert!(order_by_diversity(Vec::new(), 3).is_empty());
    }

    #[test]
    fn cache_reuses_fits() {
        let cache = FitCache::new();
        let fit = variant(&[Low], 0.4, 1.0).fit(FilterKind::Details).cloned().unwrap();
        let key = (FilterKind::Details, Low, 7);
        let first = cache.get_or_fit(key, || fit.clone());
        let second = cache.get_or_fit(key, || panic!("fit computed twice"));
        assert_eq!(first, second);
        assert_eq!(cache.len(), 1);
    }
}
