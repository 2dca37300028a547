#![forbid(unsafe_code)]

//! Automatic tone correction of photographs.
//!
//! Four stages (local details, zonal exposure, saturation, luminance) each
//! reshape one per-pixel scalar with a natural cubic spline. The spline is
//! found by a grid search that pulls the image's histogram of that scalar
//! toward one of a small set of reference distributions learned from
//! well-exposed photos.
//!
//! Two modes are available:
//!
//! - [`ToneMatcher::variants`] explores mild, moderate and strong corrections
//!   per stage (the [`Diapason`]s), merges results that come out
//!   statistically the same and returns a short, diverse list of candidates.
//! - [`ToneMatcher::process`] runs a single pass with one explicit diapason
//!   per stage.
//!
//! ```no_run
//! use tonematch::{Config, Corpus, ToneMatcher, codec};
//!
//! let corpus = Corpus::load_dir("references")?;
//! let matcher = ToneMatcher::new(corpus, Config::default());
//! let photo = codec::read_raster("photo.jpg")?;
//! for variant in matcher.variants(photo.as_ref())? {
//!     println!("{} rank {:.3}", variant.label(), variant.rank());
//! }
//! # Ok::<(), tonematch::Error>(())
//! ```
//!
//! ## Original work
//!
//! - **Project**: Assur (Kotlin, package `me.shutkin.assur`)
//! - **Author**: shutkin
//!
//! This crate is a derivative work. The spline search, the details, zonal,
//! saturation, luminance and cutoff filters, the reference file layout and
//! the variant ranking are ported from the Kotlin source. The corpus
//! building tools and the hue and FFT filters are not.

pub mod adjuster;
pub mod codec;
pub mod corpus;
pub mod filters;
pub mod histogram;
pub mod raster;
pub mod score;
pub mod spline;
pub mod variants;
pub mod window;
pub mod zones;

use std::path::PathBuf;
use std::time::Instant;

use imgref::ImgRef;

pub use adjuster::{AdjusterConfig, AdjusterResult, SplineAdjuster};
pub use corpus::{Corpus, Diapason, Reference, References};
pub use filters::{CurveFit, FilterKind, StageContext, StageFit, StageOutput};
pub use histogram::Histogram;
pub use raster::{Pixel, Raster};
pub use score::Metric;
pub use spline::CubicSpline;
pub use variants::{FitCache, VariantConfig, VariantData};
pub use window::WindowConfig;
pub use zones::ZoneConfig;

/// Search settings of one stage.
#[derive(Debug, Clone)]
pub struct StageConfig {
    /// The curve is searched on a copy reduced to this size.
    pub proxy_size: usize,
    pub adjuster: AdjusterConfig,
}

impl StageConfig {
    fn with_proxy(proxy_size: usize) -> Self {
        Self {
            proxy_size,
            adjuster: AdjusterConfig::default(),
        }
    }
}

/// Configuration for tone matching.
#[derive(Debug, Clone)]
pub struct Config {
    /// Longer side of the image for direct processing and rendering.
    pub working_size: usize,
    /// Longer side of the image during variant search.
    pub variant_size: usize,
    /// Whether the details stage runs at all.
    pub details_enabled: bool,
    pub details: StageConfig,
    pub zonal: StageConfig,
    pub saturation: StageConfig,
    pub luminance: StageConfig,
    pub zones: ZoneConfig,
    pub window: WindowConfig,
    /// Mass fraction below which the extreme channel buckets are clipped.
    pub cutoff_threshold: f64,
    pub variants: VariantConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            working_size: 1920,
            variant_size: 720,
            details_enabled: true,
            details: StageConfig::with_proxy(256),
            zonal: StageConfig {
                proxy_size: 384,
                adjuster: AdjusterConfig {
                    adjust_points: 3,
                    steps: 3,
                    levels: 3,
                },
            },
            saturation: StageConfig::with_proxy(384),
            luminance: StageConfig::with_proxy(384),
            zones: ZoneConfig::default(),
            window: WindowConfig::default(),
            cutoff_threshold: 1.0 / 8192.0,
            variants: VariantConfig::default(),
        }
    }
}

impl Config {
    pub fn stage(&self, kind: FilterKind) -> &StageConfig {
        match kind {
            FilterKind::Details => &self.details,
            FilterKind::Zonal => &self.zonal,
            FilterKind::Saturation => &self.saturation,
            FilterKind::Luminance => &self.luminance,
        }
    }

    /// Stages in the order they run.
    pub fn stages(&self) -> Vec<FilterKind> {
        let mut stages = Vec::with_capacity(4);
        if self.details_enabled {
            stages.push(FilterKind::Details);
        }
        stages.extend([FilterKind::Zonal, FilterKind::Saturation, FilterKind::Luminance]);
        stages
    }
}

/// Error type for tone matching.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("image codec error: {0}")]
    Image(#[from] image::ImageError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot open corpus file {}: {source}", .path.display())]
    CorpusFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("corpus truncated at reference {index} of {count}")]
    TruncatedCorpus { index: usize, count: usize },
    #[error("{kind} references have {actual} buckets, expected {expected}")]
    CorpusShape {
        kind: FilterKind,
        expected: usize,
        actual: usize,
    },
    #[error("reference {id} has {actual} buckets, expected {expected}")]
    InvalidReference {
        id: u32,
        expected: usize,
        actual: usize,
    },
    #[error("{kind} reference {id} holds a non-finite value")]
    NonFiniteReference { kind: FilterKind, id: u32 },
    #[error("no {0} references")]
    EmptyCorpus(FilterKind),
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("expected {expected} parameters, got {actual}")]
    ParameterCount { expected: usize, actual: usize },
    #[error("image has no pixels")]
    EmptyRaster,
}

/// Parse one diapason name per stage, in stage order
/// (details, zonal, saturation, luminance).
pub fn parse_diapasons<S: AsRef<str>>(params: &[S]) -> Result<[Diapason; 4], Error> {
    if params.len() != FilterKind::ALL.len() {
        return Err(Error::ParameterCount {
            expected: FilterKind::ALL.len(),
            actual: params.len(),
        });
    }
    let mut diapasons = [Diapason::All; 4];
    for (slot, param) in diapasons.iter_mut().zip(params) {
        *slot = param.as_ref().parse()?;
    }
    Ok(diapasons)
}

fn check_not_empty(src: &ImgRef<'_, Pixel>) -> Result<(), Error> {
    if src.width() == 0 || src.height() == 0 {
        return Err(Error::EmptyRaster);
    }
    Ok(())
}

/// A loaded corpus plus configuration: the entry point for both modes.
#[derive(Debug)]
pub struct ToneMatcher {
    corpus: Corpus,
    config: Config,
}

impl ToneMatcher {
    pub fn new(corpus: Corpus, config: Config) -> Self {
        Self {
            corpus,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    fn context(&self) -> StageContext<'_> {
        StageContext {
            corpus: &self.corpus,
            config: &self.config,
        }
    }

    /// Search for a ranked, diverse set of corrected variants of `src`.
    /// Curve fits are shared between parents of this search only.
    pub fn variants(&self, src: ImgRef<'_, Pixel>) -> Result<Vec<VariantData>, Error> {
        check_not_empty(&src)?;
        let start = Instant::now();
        let cache = FitCache::new();
        let variants = variants::generate_variants(&self.context(), src, &cache);
        log::info!(
            "{} variants in {:.2}s, {} distinct fits",
            variants.len(),
            start.elapsed().as_secs_f64(),
            cache.len()
        );
        Ok(variants)
    }

    /// One pass with an explicit diapason per stage, in stage order.
    pub fn process(
        &self,
        src: ImgRef<'_, Pixel>,
        diapasons: [Diapason; 4],
    ) -> Result<Raster, Error> {
        check_not_empty(&src)?;
        let start = Instant::now();
        let ctx = self.context();
        let mut raster = raster::reduce_size(src, self.config.working_size);
        for kind in self.config.stages() {
            let output = kind.apply(&ctx, raster.as_ref(), diapasons[kind.index()], None);
            raster = output.raster;
        }
        let result = filters::cutoff::apply(raster.as_ref(), self.config.cutoff_threshold);
        log::info!("processed in {:.2}s", start.elapsed().as_secs_f64());
        Ok(result)
    }

    /// [`process`](Self::process) with diapason names as given on a command
    /// line.
    pub fn process_params<S: AsRef<str>>(
        &self,
        src: ImgRef<'_, Pixel>,
        params: &[S],
    ) -> Result<Raster, Error> {
        self.process(src, parse_diapasons(params)?)
    }

    /// Re-apply a variant's fitted curves to `src` at working resolution.
    pub fn render(&self, src: ImgRef<'_, Pixel>, variant: &VariantData) -> Result<Raster, Error> {
        check_not_empty(&src)?;
        let ctx = self.context();
        let mut raster = raster::reduce_size(src, self.config.working_size);
        for &(kind, diapason) in &variant.choices {
            let Some(fit) = variant.fit(kind) else {
                continue;
            };
            let output = kind.apply(&ctx, raster.as_ref(), diapason, Some(&fit.spline));
            raster = output.raster;
        }
        Ok(filters::cutoff::apply(raster.as_ref(), self.config.cutoff_threshold))
    }
}
