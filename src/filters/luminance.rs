use imgref::ImgRef;

use super::{FilterKind, factor};
use crate::adjuster::{AdjusterResult, SplineAdjuster};
use crate::histogram::Histogram;
use crate::raster::{Pixel, PixelExt, Raster, map_pixels};
use crate::spline::CubicSpline;

fn tone(p: Pixel, spline: &CubicSpline) -> Pixel {
    let l = p.luminance();
    p.scale(factor(spline.interpolate(l), l, 1.0))
}

pub(super) fn search(proxy: &Raster, adjuster: &SplineAdjuster<'_>) -> AdjusterResult {
    let (min_value, max_value) = FilterKind::Luminance.domain();
    let pixels = proxy.buf();
    adjuster.find_spline(FilterKind::Luminance.metric(), |spline| {
        Histogram::build(
            min_value,
            max_value,
            FilterKind::Luminance.bucket_count(),
            pixels.len(),
            |i| tone(pixels[i], spline).luminance(),
        )
        .buckets
    })
}

pub(super) fn correct(src: ImgRef<'_, Pixel>, spline: &CubicSpline) -> Raster {
    map_pixels(src, |_, _, p| tone(p, spline))
}
