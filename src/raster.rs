use imgref::{ImgRef, ImgVec};
use rayon::prelude::*;
use rgb::RGB;

/// Working pixel: three channel intensities on a nominal 0..255 scale.
/// Values are not clamped while the image moves through the filter stages.
pub type Pixel = RGB<f32>;

/// Working image. Always built with `stride == width`.
pub type Raster = ImgVec<Pixel>;

/// Perceptual luminance used by every stage.
pub fn luminance(r: f64, g: f64, b: f64) -> f64 {
    (0.299 * r * r + 0.587 * g * g + 0.114 * b * b).sqrt()
}

/// Per-pixel helpers shared by the filter stages.
pub trait PixelExt {
    fn luminance(&self) -> f64;
    /// Mean absolute distance of the channels from their gray mean, scaled
    /// so that a fully saturated 8-bit color lands near 1.0.
    fn saturation(&self) -> f64;
    /// Uniform scaling of all channels (keeps hue and channel ratios).
    fn scale(&self, factor: f64) -> Pixel;
    /// Scale the chroma component around the gray mean.
    fn scale_chroma(&self, factor: f64) -> Pixel;
    fn min_channel(&self) -> f32;
    fn max_channel(&self) -> f32;
}

impl PixelExt for Pixel {
    fn luminance(&self) -> f64 {
        luminance(self.r as f64, self.g as f64, self.b as f64)
    }

    fn saturation(&self) -> f64 {
        let (r, g, b) = (self.r as f64, self.g as f64, self.b as f64);
        let average = (r + g + b) / 3.0;
        let s = ((average - r).abs() + (average - g).abs() + (average - b).abs()) / (3.0 * 128.0);
        s.min(1.0)
    }

    fn scale(&self, factor: f64) -> Pixel {
        Pixel::new(
            (self.r as f64 * factor) as f32,
            (self.g as f64 * factor) as f32,
            (self.b as f64 * factor) as f32,
        )
    }

    fn scale_chroma(&self, factor: f64) -> Pixel {
        let (r, g, b) = (self.r as f64, self.g as f64, self.b as f64);
        let average = (r + g + b) / 3.0;
        Pixel::new(
            (average + (r - average) * factor) as f32,
            (average + (g - average) * factor) as f32,
            (average + (b - average) * factor) as f32,
        )
    }

    fn min_channel(&self) -> f32 {
        self.r.min(self.g).min(self.b)
    }

    fn max_channel(&self) -> f32 {
        self.r.max(self.g).max(self.b)
    }
}

/// Read a pixel by coordinates.
pub fn pixel_at(src: &ImgRef<'_, Pixel>, x: usize, y: usize) -> Pixel {
    src.buf()[y * src.stride() + x]
}

/// Build a new raster by mapping every pixel of `src`. The closure receives
/// the pixel coordinates and the source pixel.
pub fn map_pixels<F>(src: ImgRef<'_, Pixel>, f: F) -> Raster
where
    F: Fn(usize, usize, Pixel) -> Pixel + Sync,
{
    let width = src.width();
    let height = src.height();
    let buf: Vec<Pixel> = (0..width * height)
        .into_par_iter()
        .map(|i| {
            let (x, y) = (i % width, i / width);
            f(x, y, pixel_at(&src, x, y))
        })
        .collect();
    ImgVec::new(buf, width, height)
}

/// Luminance of every pixel, row-major.
pub fn luminances(src: ImgRef<'_, Pixel>) -> Vec<f64> {
    let width = src.width();
    (0..width * src.height())
        .into_par_iter()
        .map(|i| pixel_at(&src, i % width, i / width).luminance())
        .collect()
}

/// Copy a borrowed raster into a contiguous owned one.
pub fn to_owned(src: ImgRef<'_, Pixel>) -> Raster {
    ImgVec::new(src.pixels().collect(), src.width(), src.height())
}

/// Area-weighted downscale so that the longer side is at most `max_size`.
/// Rasters already within bounds are copied unchanged.
pub fn reduce_size(src: ImgRef<'_, Pixel>, max_size: usize) -> Raster {
    let (width, height) = (src.width(), src.height());
    if (width <= max_size && height <= max_size) || max_size == 0 {
        return to_owned(src);
    }

    let scale = max_size as f64 / width.max(height) as f64;
    let pixel_size = 1.0 / scale;
    let dst_w = ((scale * width as f64) as usize).max(1);
    let dst_h = ((scale * height as f64) as usize).max(1);
    log::debug!("reduce {width}x{height} -> {dst_w}x{dst_h}");

    let buf: Vec<Pixel> = (0..dst_w * dst_h)
        .into_par_iter()
        .map(|i| {
            let x = (i % dst_w) as f64 / scale;
            let y = (i / dst_w) as f64 / scale;
            area_average(&src, pixel_size, x, y)
        })
        .collect();
    ImgVec::new(buf, dst_w, dst_h)
}

/// Average of the source area `[x, x + size) × [y, y + size)`, with partial
/// coverage of the border pixels.
fn area_average(src: &ImgRef<'_, Pixel>, size: f64, x: f64, y: f64) -> Pixel {
    let start_x = x.floor() as isize;
    let start_y = y.floor() as isize;
    let end_x = (x + size).ceil() as isize;
    let end_y = (y + size).ceil() as isize;
    let start_xf = 1.0 - (x - start_x as f64);
    let start_yf = 1.0 - (y - start_y as f64);
    let end_xf = 1.0 - (end_x as f64 - x - size);
    let end_yf = 1.0 - (end_y as f64 - y - size);

    let (w, h) = (src.width() as isize, src.height() as isize);
    let (mut sum_r, mut sum_g, mut sum_b, mut sum) = (0.0, 0.0, 0.0, 0.0);
    for sy in start_y.max(0)..=end_y.min(h - 1) {
        for sx in start_x.max(0)..=end_x.min(w - 1) {
            let mut f = 1.0;
            if sx == start_x {
                f *= start_xf;
            } else if sx == end_x {
                f *= end_xf;
            }
            if sy == start_y {
                f *= start_yf;
            } else if sy == end_y {
                f *= end_yf;
            }
            let p = pixel_at(src, sx as usize, sy as usize);
            sum_r += f * p.r as f64;
            sum_g += f * p.g as f64;
            sum_b += f * p.b as f64;
            sum += f;
        }
    }

    if sum <= 0.0 {
        return Pixel::default();
    }
    Pixel::new((sum_r / sum) as f32, (sum_g / sum) as f32, (sum_b / sum) as f32)
}
