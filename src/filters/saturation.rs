use imgref::ImgRef;

use super::{FilterKind, factor};
use crate::adjuster::{AdjusterResult, SplineAdjuster};
use crate::histogram::Histogram;
use crate::raster::{Pixel, PixelExt, Raster, map_pixels};
use crate::spline::CubicSpline;

const EPSILON: f64 = 0.01;

fn saturate(p: Pixel, spline: &CubicSpline) -> Pixel {
    let s = p.saturation();
    p.scale_chroma(factor(spline.interpolate(s), s, EPSILON))
}

pub(super) fn search(proxy: &Raster, adjuster: &SplineAdjuster<'_>) -> AdjusterResult {
    let (min_value, max_value) = FilterKind::Saturation.domain();
    let pixels = proxy.buf();
    adjuster.find_spline(FilterKind::Saturation.metric(), |spline| {
        Histogram::build(
            min_value,
            max_value,
            FilterKind::Saturation.bucket_count(),
            pixels.len(),
            |i| saturate(pixels[i], spline).saturation(),
        )
        .buckets
    })
}

pub(super) fn correct(src: ImgRef<'_, Pixel>, spline: &CubicSpline) -> Raster {
    map_pixels(src, |_, _, p| saturate(p, spline))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gray_stays_gray() {
        let boost = CubicSpline::new(&[0.0, 0.5, 1.0], &[0.0, 0.8, 1.0]);
        let p = saturate(Pixel::new(90.0, 90.0, 90.0), &boost);
        assert_eq!(p, Pixel::new(90.0, 90.0, 90.0));
    }

    #[test]
    fn boost_raises_saturation() {
        let boost = CubicSpline::new(&[0.0, 0.5, 1.0], &[0.0, 0.8, 1.0]);
        let p = Pixel::new(150.0, 100.0, 80.0);
        let q = saturate(p, &boost);
        assert!(q.saturation() > p.saturation());
    }
}
