use std::collections::BTreeMap;

use imgref::ImgRef;
use rayon::prelude::*;

use crate::raster::{Pixel, luminances};

/// Blur radius selection and weight quantization.
#[derive(Debug, Clone)]
pub struct WindowConfig {
    /// Radius is the longer image side divided by this.
    pub radius_divisor: usize,
    pub max_radius: usize,
    /// Radii up to this use the exact kernel; larger ones use quantized weights.
    pub straight_max_radius: usize,
    /// Quantization steps per unit weight for the bucketed kernel.
    pub precision: f64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            radius_divisor: 32,
            max_radius: 32,
            straight_max_radius: 12,
            precision: 65536.0,
        }
    }
}

/// Local weighted average of pixel luminance.
pub trait Window: Sync {
    fn radius(&self) -> usize;

    /// One blurred luminance per pixel, row-major.
    fn apply(&self, src: ImgRef<'_, Pixel>) -> Vec<f64>;
}

/// Pick the window for an image of the given size.
pub fn window_for(width: usize, height: usize, config: &WindowConfig) -> Box<dyn Window> {
    let radius = (width.max(height) / config.radius_divisor.max(1))
        .max(1)
        .min(config.max_radius.max(1));
    if radius <= config.straight_max_radius {
        Box::new(StraightWindow::new(radius))
    } else {
        Box::new(BucketedWindow::new(radius, config.precision))
    }
}

/// `1/d²` kernel over the square window, center excluded, normalized to 1.
fn kernel(radius: usize) -> Vec<(isize, isize, f64)> {
    let r = radius as isize;
    let mut entries = Vec::with_capacity((2 * radius + 1).pow(2));
    let mut total = 0.0;
    for dy in -r..=r {
        for dx in -r..=r {
            if dx == 0 && dy == 0 {
                continue;
            }
            let w = 1.0 / (dx * dx + dy * dy) as f64;
            entries.push((dx, dy, w));
            total += w;
        }
    }
    for e in &mut entries {
        e.2 /= total;
    }
    entries
}

fn offset(x: usize, y: usize, dx: isize, dy: isize, width: usize, height: usize) -> Option<usize> {
    let sx = x.checked_add_signed(dx).filter(|&v| v < width)?;
    let sy = y.checked_add_signed(dy).filter(|&v| v < height)?;
    Some(sy * width + sx)
}

/// Exact inverse-square kernel. Border pixels renormalize over the
/// neighbours that fall inside the image.
#[derive(Debug, Clone)]
pub struct StraightWindow {
    radius: usize,
    weights: Vec<(isize, isize, f64)>,
}

impl StraightWindow {
    pub fn new(radius: usize) -> Self {
        Self {
            radius,
            weights: kernel(radius),
        }
    }
}

impl Window for StraightWindow {
    fn radius(&self) -> usize {
        self.radius
    }

    fn apply(&self, src: ImgRef<'_, Pixel>) -> Vec<f64> {
        let (width, height) = (src.width(), src.height());
        let lums = luminances(src);
        (0..width * height)
            .into_par_iter()
            .map(|i| {
                let (x, y) = (i % width, i / width);
                let mut sum = 0.0;
                let mut total = 0.0;
                for &(dx, dy, w) in &self.weights {
                    if let Some(j) = offset(x, y, dx, dy, width, height) {
                        sum += w * lums[j];
                        total += w;
                    }
                }
                if total > 0.0 { sum / total } else { lums[i] }
            })
            .collect()
    }
}

/// Kernel offsets that share one quantized weight.
#[derive(Debug, Clone)]
pub struct WeightGroup {
    pub weight: f64,
    pub offsets: Vec<(isize, isize)>,
}

/// Inverse-square kernel with weights quantized to `1/precision` and grouped,
/// so each group costs one multiply per pixel. Weights that quantize to zero
/// are dropped.
#[derive(Debug, Clone)]
pub struct BucketedWindow {
    radius: usize,
    groups: Vec<WeightGroup>,
}

impl BucketedWindow {
    pub fn new(radius: usize, precision: f64) -> Self {
        let mut grouped: BTreeMap<u64, Vec<(isize, isize)>> = BTreeMap::new();
        for (dx, dy, w) in kernel(radius) {
            let q = (precision * w).floor() as u64;
            if q > 0 {
                grouped.entry(q).or_default().push((dx, dy));
            }
        }
        let groups: Vec<WeightGroup> = grouped
            .into_iter()
            .rev()
            .map(|(q, offsets)| WeightGroup {
                weight: q as f64 / precision,
                offsets,
            })
            .collect();
        log::debug!("bucketed window r={radius}: {} weight groups", groups.len());
        Self { radius, groups }
    }
}

impl Window for BucketedWindow {
    fn radius(&self) -> usize {
        self.radius
    }

    fn apply(&self, src: ImgRef<'_, Pixel>) -> Vec<f64> {
        let (width, height) = (src.width(), src.height());
        let lums = luminances(src);
        (0..width * height)
            .into_par_iter()
            .map(|i| {
                let (x, y) = (i % width, i / width);
                let mut sum = 0.0;
                let mut total = 0.0;
                for group in &self.groups {
                    let mut group_sum = 0.0;
                    let mut hits = 0usize;
                    for &(dx, dy) in &group.offsets {
                        if let Some(j) = offset(x, y, dx, dy, width, height) {
                            group_sum += lums[j];
                            hits += 1;
                        }
                    }
                    sum += group.weight * group_sum;
                    total += group.weight * hits as f64;
                }
                if total > 0.0 { sum / total } else { lums[i] }
            })
            .collect()
    }
}
