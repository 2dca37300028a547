use imgref::ImgRef;

use super::{FilterKind, StageContext, factor, signed_curve};
use crate::adjuster::{AdjusterResult, SplineAdjuster};
use crate::histogram::Histogram;
use crate::raster::{Pixel, PixelExt, Raster, map_pixels};
use crate::spline::CubicSpline;
use crate::window::{Window, window_for};

/// Remap the deviation of each pixel's luminance from its local average,
/// keeping the deviation's sign.
fn enhance(src: ImgRef<'_, Pixel>, blur: &[f64], spline: &CubicSpline) -> Raster {
    let width = src.width();
    map_pixels(src, |x, y, p| {
        let local = blur[y * width + x];
        let l = p.luminance();
        let target = local + signed_curve(spline, l - local);
        p.scale(factor(target, l, 1.0))
    })
}

/// Distribution of `|l - blur(l)|` after enhancing the proxy with a candidate
/// curve, re-blurred with the same window.
pub(super) fn search(
    ctx: &StageContext<'_>,
    proxy: &Raster,
    adjuster: &SplineAdjuster<'_>,
) -> AdjusterResult {
    let window = window_for(proxy.width(), proxy.height(), &ctx.config.window);
    let blur = window.apply(proxy.as_ref());
    let (min_value, max_value) = FilterKind::Details.domain();
    let count = proxy.width() * proxy.height();

    adjuster.find_spline(FilterKind::Details.metric(), |spline| {
        let enhanced = enhance(proxy.as_ref(), &blur, spline);
        let enhanced_blur = window.apply(enhanced.as_ref());
        let pixels = enhanced.buf();
        Histogram::build(
            min_value,
            max_value,
            FilterKind::Details.bucket_count(),
            count,
            |i| (pixels[i].luminance() - enhanced_blur[i]).abs(),
        )
        .buckets
    })
}

pub(super) fn correct(
    ctx: &StageContext<'_>,
    src: ImgRef<'_, Pixel>,
    spline: &CubicSpline,
) -> Raster {
    let window = window_for(src.width(), src.height(), &ctx.config.window);
    log::debug!("details window radius {}", window.radius());
    let blur = window.apply(src);
    enhance(src, &blur, spline)
}
