use imgref::ImgRef;

use crate::histogram::Histogram;
use crate::raster::{Pixel, PixelExt, Raster, map_pixels, pixel_at, to_owned};

/// Channel histogram resolution.
const BUCKETS: usize = 256;

/// Clamp every channel to the black and white points of the pooled channel
/// histogram: the first and last buckets holding more than `threshold` of
/// the samples.
pub fn apply(src: ImgRef<'_, Pixel>, threshold: f64) -> Raster {
    let width = src.width();
    let count = width * src.height() * 3;
    if count == 0 {
        return to_owned(src);
    }

    let channel = |i: usize| {
        let p = pixel_at(&src, (i / 3) % width, (i / 3) / width);
        match i % 3 {
            0 => p.r,
            1 => p.g,
            _ => p.b,
        }
    };
    let (min_value, max_value) = src.pixels().fold((f32::MAX, f32::MIN), |(lo, hi), p| {
        (lo.min(p.min_channel()), hi.max(p.max_channel()))
    });

    let histogram = Histogram::build(min_value as f64, max_value as f64, BUCKETS, count, |i| {
        channel(i) as f64
    });
    let low = histogram.low_value(threshold) as f32;
    let high = histogram.high_value(threshold) as f32;
    log::debug!("cutoff range {low:.2} ... {high:.2}");

    map_pixels(src, |_, _, p| {
        Pixel::new(p.r.clamp(low, high), p.g.clamp(low, high), p.b.clamp(low, high))
    })
}
