//! The four curve-fitted correction stages and the final cutoff.
//!
//! Every stage follows the same shape: search for a curve on a reduced proxy
//! of the input (unless a curve is supplied), then apply the curve to the
//! input at its own resolution.

pub mod cutoff;
mod details;
mod luminance;
mod saturation;
mod zonal;

use std::fmt;

use imgref::ImgRef;

use crate::adjuster::{AdjusterResult, SplineAdjuster};
use crate::corpus::{Corpus, Diapason};
use crate::raster::{Pixel, Raster, reduce_size};
use crate::score::Metric;
use crate::spline::CubicSpline;
use crate::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FilterKind {
    Details,
    Zonal,
    Saturation,
    Luminance,
}

impl FilterKind {
    pub const ALL: [FilterKind; 4] = [
        FilterKind::Details,
        FilterKind::Zonal,
        FilterKind::Saturation,
        FilterKind::Luminance,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Details => "details",
            Self::Zonal => "zonal",
            Self::Saturation => "saturation",
            Self::Luminance => "luminance",
        }
    }

    pub fn index(&self) -> usize {
        match self {
            Self::Details => 0,
            Self::Zonal => 1,
            Self::Saturation => 2,
            Self::Luminance => 3,
        }
    }

    /// Corpus file name without extension.
    pub fn file_stem(&self) -> &'static str {
        self.name()
    }

    /// Value domain of the curve and of the stage's histogram.
    pub fn domain(&self) -> (f64, f64) {
        match self {
            Self::Details => (0.0, 64.0),
            Self::Zonal => (0.0, 128.0),
            Self::Saturation => (0.0, 1.0),
            Self::Luminance => (0.0, 255.0),
        }
    }

    pub fn bucket_count(&self) -> usize {
        match self {
            Self::Details => 1024,
            Self::Zonal | Self::Saturation => 128,
            Self::Luminance => 256,
        }
    }

    /// Spatially structured stages compare medians; the global ones compare
    /// full distributions.
    pub fn metric(&self) -> Metric {
        match self {
            Self::Details | Self::Zonal => Metric::Medians,
            Self::Saturation | Self::Luminance => Metric::Squared,
        }
    }

    /// Fit a curve for `src` against the references inside `diapason`.
    pub fn fit(
        &self,
        ctx: &StageContext<'_>,
        src: ImgRef<'_, Pixel>,
        diapason: Diapason,
    ) -> CurveFit {
        let stage = ctx.config.stage(*self);
        let refs = ctx.corpus.references(*self).slice(diapason);
        let proxy = reduce_size(src, stage.proxy_size);
        let (min_value, max_value) = self.domain();
        let adjuster = SplineAdjuster::new(refs, min_value, max_value, stage.adjuster.clone());
        let result = match self {
            Self::Details => details::search(ctx, &proxy, &adjuster),
            Self::Zonal => zonal::search(ctx, &proxy, &adjuster),
            Self::Saturation => saturation::search(&proxy, &adjuster),
            Self::Luminance => luminance::search(&proxy, &adjuster),
        };
        CurveFit::new(diapason, result)
    }

    /// Apply `spline` to `src` at full resolution.
    pub fn correct(
        &self,
        ctx: &StageContext<'_>,
        src: ImgRef<'_, Pixel>,
        spline: &CubicSpline,
    ) -> Raster {
        match self {
            Self::Details => details::correct(ctx, src, spline),
            Self::Zonal => zonal::correct(ctx, src, spline),
            Self::Saturation => saturation::correct(src, spline),
            Self::Luminance => luminance::correct(src, spline),
        }
    }

    /// Run the stage: search unless `predefined` is given, then correct.
    pub fn apply(
        &self,
        ctx: &StageContext<'_>,
        src: ImgRef<'_, Pixel>,
        diapason: Diapason,
        predefined: Option<&CubicSpline>,
    ) -> StageOutput {
        log::info!("{self} stage, diapason {diapason}");
        let (spline, fit) = match predefined {
            Some(spline) => (spline.clone(), StageFit::NotYetFit),
            None => {
                let fit = self.fit(ctx, src, diapason);
                (fit.spline.clone(), StageFit::Fit(fit))
            }
        };
        let raster = self.correct(ctx, src, &spline);
        StageOutput { raster, spline, fit }
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Everything a stage reads besides its input raster.
#[derive(Debug, Clone, Copy)]
pub struct StageContext<'a> {
    pub corpus: &'a Corpus,
    pub config: &'a Config,
}

/// A searched curve and how well it matched.
#[derive(Debug, Clone, PartialEq)]
pub struct CurveFit {
    pub spline: CubicSpline,
    pub diapason: Diapason,
    pub reference_id: u32,
    pub reference_index: usize,
    pub popularity: f64,
    pub median: f64,
    pub correctness: f64,
    pub initial_correctness: f64,
}

impl CurveFit {
    fn new(diapason: Diapason, result: AdjusterResult) -> Self {
        Self {
            spline: result.spline,
            diapason,
            reference_id: result.reference_id,
            reference_index: result.reference_index,
            popularity: result.popularity,
            median: result.median,
            correctness: result.correctness,
            initial_correctness: result.initial_correctness,
        }
    }

    /// Contribution of this stage to a variant's rank.
    pub fn rank(&self) -> f64 {
        self.popularity * self.correctness
    }
}

/// Search state of one stage of a variant.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum StageFit {
    /// No curve was searched: the stage has not run yet, or ran with a
    /// predefined curve.
    #[default]
    NotYetFit,
    Fit(CurveFit),
}

impl StageFit {
    pub fn as_fit(&self) -> Option<&CurveFit> {
        match self {
            Self::Fit(fit) => Some(fit),
            Self::NotYetFit => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StageOutput {
    pub raster: Raster,
    pub spline: CubicSpline,
    pub fit: StageFit,
}

/// `(target + ε) / (value + ε)`, the channel scale that moves `value` to
/// `target`.
pub(crate) fn factor(target: f64, value: f64, epsilon: f64) -> f64 {
    (target + epsilon) / (value + epsilon)
}

/// Apply the curve to the magnitude of a signed deviation.
pub(crate) fn signed_curve(spline: &CubicSpline, deviation: f64) -> f64 {
    let corrected = spline.interpolate(deviation.abs());
    if deviation < 0.0 { -corrected } else { corrected }
}
