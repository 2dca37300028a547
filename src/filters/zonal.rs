use imgref::ImgRef;

use super::{FilterKind, StageContext, factor, signed_curve};
use crate::adjuster::{AdjusterResult, SplineAdjuster};
use crate::histogram::Histogram;
use crate::raster::{Pixel, PixelExt, Raster, map_pixels};
use crate::spline::CubicSpline;
use crate::zones::{ZoneInterpolator, build_zones, smooth_surface};

/// Pull each region's smoothed exposure toward the image average along the
/// curve, keeping the side of the average it is on.
fn balance(src: ImgRef<'_, Pixel>, surface: &[f64], average: f64, spline: &CubicSpline) -> Raster {
    let width = src.width();
    map_pixels(src, |x, y, p| {
        let zonal = surface[y * width + x];
        let target = average + signed_curve(spline, zonal - average);
        p.scale(factor(target, zonal, 1.0))
    })
}

/// Distribution over zones of `|average - zone|` after balancing the proxy.
pub(super) fn search(
    ctx: &StageContext<'_>,
    proxy: &Raster,
    adjuster: &SplineAdjuster<'_>,
) -> AdjusterResult {
    let zones_config = &ctx.config.zones;
    let zones = build_zones(proxy.as_ref(), zones_config.zones_per_side);
    let average = zones.average();
    let interpolator = ZoneInterpolator::new(zones_config.neighbor_radius);
    let surface = smooth_surface(proxy.width(), proxy.height(), &zones, &interpolator);
    log::debug!(
        "proxy zones {}x{} of {} px, average {average:.2}",
        zones.horiz_zones,
        zones.vert_zones,
        zones.zone_size
    );
    let (min_value, max_value) = FilterKind::Zonal.domain();

    adjuster.find_spline(FilterKind::Zonal.metric(), |spline| {
        let balanced = balance(proxy.as_ref(), &surface, average, spline);
        let result = build_zones(balanced.as_ref(), zones_config.zones_per_side);
        let result_average = result.average();
        Histogram::build(
            min_value,
            max_value,
            FilterKind::Zonal.bucket_count(),
            result.zone_lums.len(),
            |i| (result_average - result.zone_lums[i]).abs(),
        )
        .buckets
    })
}

pub(super) fn correct(
    ctx: &StageContext<'_>,
    src: ImgRef<'_, Pixel>,
    spline: &CubicSpline,
) -> Raster {
    let zones = build_zones(src, ctx.config.zones.zones_per_side);
    let average = zones.average();
    log::debug!(
        "zone size {}, {}x{} zones, average {average:.2}",
        zones.zone_size,
        zones.horiz_zones,
        zones.vert_zones
    );
    let interpolator = ZoneInterpolator::new(ctx.config.zones.neighbor_radius);
    let surface = smooth_surface(src.width(), src.height(), &zones, &interpolator);
    balance(src, &surface, average, spline)
}

#[cfg(test)]
mod tests {
    use super::*;
    use imgref::ImgVec;

    fn vignette(size: usize) -> ImgVec<Pixel> {
        let c = size as f32 / 2.0;
        let buf = (0..size * size)
            .map(|i| {
                let (x, y) = ((i % size) as f32 - c, (i / size) as f32 - c);
                let v = 200.0 - 150.0 * (x * x + y * y).sqrt() / c;
                let v = v.max(20.0);
                Pixel::new(v, v, v)
            })
            .collect();
        ImgVec::new(buf, size, size)
    }

    fn corner_to_center(img: &ImgVec<Pixel>) -> f32 {
        let n = img.width();
        img.buf()[n * n / 2 + n / 2].r - img.buf()[0].r
    }

    #[test]
    fn flattening_curve_reduces_vignette() {
        let img = vignette(64);
        let zones = build_zones(img.as_ref(), 16);
        let surface = smooth_surface(64, 64, &zones, &ZoneInterpolator::new(6));
        let halving = CubicSpline::new(&[0.0, 128.0], &[0.0, 64.0]);
        let out = balance(img.as_ref(), &surface, zones.average(), &halving);
        assert!(corner_to_center(&out) < corner_to_center(&img));
    }

    #[test]
    fn identity_curve_leaves_pixels() {
        let img = vignette(32);
        let zones = build_zones(img.as_ref(), 16);
        let surface = smooth_surface(32, 32, &zones, &ZoneInterpolator::new(6));
        let identity = CubicSpline::identity(0.0, 128.0);
        let out = balance(img.as_ref(), &surface, zones.average(), &identity);
        for (a, b) in img.buf().iter().zip(out.buf()) {
            assert!((a.g - b.g).abs() < 1e-3);
        }
    }
}
