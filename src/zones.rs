use imgref::ImgRef;
use rayon::prelude::*;

use crate::raster::{Pixel, PixelExt, pixel_at};

/// Squared distances are memoized in steps of `1/DISTANCE_QUANTUM` zone².
const DISTANCE_QUANTUM: f64 = 64.0;

#[derive(Debug, Clone)]
pub struct ZoneConfig {
    /// Zone size is the longer image side divided by this.
    pub zones_per_side: usize,
    /// Zones on each side of the current one that contribute to its value.
    pub neighbor_radius: usize,
}

impl Default for ZoneConfig {
    fn default() -> Self {
        Self {
            zones_per_side: 16,
            neighbor_radius: 6,
        }
    }
}

/// Coarse grid of mean luminances.
#[derive(Debug, Clone)]
pub struct ZonesData {
    pub zone_size: usize,
    pub horiz_zones: usize,
    pub vert_zones: usize,
    /// Row-major, `horiz_zones * vert_zones` entries.
    pub zone_lums: Vec<f64>,
}

impl ZonesData {
    /// Mean of all zone luminances.
    pub fn average(&self) -> f64 {
        if self.zone_lums.is_empty() {
            return 0.0;
        }
        self.zone_lums.iter().sum::<f64>() / self.zone_lums.len() as f64
    }
}

/// Split `src` into square zones and average the luminance in each.
/// Partial zones at the right and bottom edges average only their pixels.
pub fn build_zones(src: ImgRef<'_, Pixel>, zones_per_side: usize) -> ZonesData {
    let (width, height) = (src.width(), src.height());
    let zone_size = (width.max(height) / zones_per_side.max(1)).max(1);
    let horiz_zones = width.div_ceil(zone_size);
    let vert_zones = height.div_ceil(zone_size);

    let zone_lums = (0..horiz_zones * vert_zones)
        .into_par_iter()
        .map(|i| {
            let x0 = (i % horiz_zones) * zone_size;
            let y0 = (i / horiz_zones) * zone_size;
            let x1 = (x0 + zone_size).min(width);
            let y1 = (y0 + zone_size).min(height);
            let mut sum = 0.0;
            for y in y0..y1 {
                for x in x0..x1 {
                    sum += pixel_at(&src, x, y).luminance();
                }
            }
            sum / ((x1 - x0) * (y1 - y0)) as f64
        })
        .collect();

    ZonesData {
        zone_size,
        horiz_zones,
        vert_zones,
        zone_lums,
    }
}

/// Gaussian blend of zone values around a pixel.
///
/// Distances run from the pixel center to neighbouring zone centers in zone
/// units; sigma is `0.84089642 * radius / 3`.
#[derive(Debug, Clone)]
pub struct ZoneInterpolator {
    radius: usize,
    weights: Vec<f64>,
}

impl ZoneInterpolator {
    pub fn new(neighbor_radius: usize) -> Self {
        let radius = neighbor_radius.max(1);
        let sigma = 0.84089642 * radius as f64 / 3.0;
        let reach = (radius + 1) as f64;
        let max_key = (2.0 * reach * reach * DISTANCE_QUANTUM).ceil() as usize;
        let weights = (0..=max_key)
            .map(|k| {
                let d = k as f64 / DISTANCE_QUANTUM;
                (-d / (2.0 * sigma * sigma)).exp()
            })
            .collect();
        Self { radius, weights }
    }

    fn weight(&self, d: f64) -> f64 {
        let key = (d * DISTANCE_QUANTUM).round() as usize;
        self.weights[key.min(self.weights.len() - 1)]
    }

    /// Smoothed zone value at pixel `(x, y)`.
    pub fn value(&self, zones: &ZonesData, x: usize, y: usize) -> f64 {
        let size = zones.zone_size as f64;
        let fx = (x as f64 + 0.5) / size;
        let fy = (y as f64 + 0.5) / size;
        let zone_x = x / zones.zone_size;
        let zone_y = y / zones.zone_size;

        let mut sum = 0.0;
        let mut total = 0.0;
        let last_x = (zone_x + self.radius).min(zones.horiz_zones - 1);
        let last_y = (zone_y + self.radius).min(zones.vert_zones - 1);
        for ny in zone_y.saturating_sub(self.radius)..=last_y {
            let dy = fy - (ny as f64 + 0.5);
            for nx in zone_x.saturating_sub(self.radius)..=last_x {
                let dx = fx - (nx as f64 + 0.5);
                let w = self.weight(dx * dx + dy * dy);
                sum += w * zones.zone_lums[ny * zones.horiz_zones + nx];
                total += w;
            }
        }
        if total > 0.0 {
            sum / total
        } else {
            zones.zone_lums[zone_y * zones.horiz_zones + zone_x]
        }
    }
}

/// Smoothed zone value for every pixel, row-major.
pub fn smooth_surface(
    width: usize,
    height: usize,
    zones: &ZonesData,
    interpolator: &ZoneInterpolator,
) -> Vec<f64> {
    (0..width * height)
        .into_par_iter()
        .map(|i| interpolator.value(zones, i % width, i / width))
        .collect()
}
