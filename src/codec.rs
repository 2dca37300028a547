use std::io::Cursor;
use std::path::Path;

use image::{DynamicImage, ImageFormat, RgbImage};
use imgref::{ImgRef, ImgVec};

use crate::Error;
use crate::raster::{Pixel, PixelExt, Raster, pixel_at};

/// Decode an encoded image into a working raster.
pub fn load_raster(bytes: &[u8]) -> Result<Raster, Error> {
    from_dynamic(image::load_from_memory(bytes)?)
}

/// Read and decode an image file.
pub fn read_raster(path: impl AsRef<Path>) -> Result<Raster, Error> {
    from_dynamic(image::open(path)?)
}

fn from_dynamic(img: DynamicImage) -> Result<Raster, Error> {
    let rgb = img.to_rgb8();
    let (width, height) = (rgb.width() as usize, rgb.height() as usize);
    if width == 0 || height == 0 {
        return Err(Error::EmptyRaster);
    }
    let buf = rgb
        .pixels()
        .map(|p| Pixel::new(p[0] as f32, p[1] as f32, p[2] as f32))
        .collect();
    Ok(ImgVec::new(buf, width, height))
}

/// Quantize to 8 bit. When the channel range spans more than one level it
/// is stretched linearly onto 0..=255; otherwise values are clamped.
pub fn to_rgb8(raster: ImgRef<'_, Pixel>) -> RgbImage {
    let (lo, hi) = raster.pixels().fold((f32::MAX, f32::MIN), |(lo, hi), p| {
        (lo.min(p.min_channel()), hi.max(p.max_channel()))
    });
    let (offset, scale) = if hi > lo + 1.0 {
        (lo, 255.0 / (hi - lo))
    } else {
        (0.0, 1.0)
    };
    let quantize = |v: f32| ((v - offset) * scale).round().clamp(0.0, 255.0) as u8;
    RgbImage::from_fn(raster.width() as u32, raster.height() as u32, |x, y| {
        let p = pixel_at(&raster, x as usize, y as usize);
        image::Rgb([quantize(p.r), quantize(p.g), quantize(p.b)])
    })
}

/// Encode a raster in `format`.
pub fn save_raster(raster: ImgRef<'_, Pixel>, format: ImageFormat) -> Result<Vec<u8>, Error> {
    let mut bytes = Vec::new();
    to_rgb8(raster).write_to(&mut Cursor::new(&mut bytes), format)?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stretch_fills_the_byte_range() {
        let img = ImgVec::new(
            vec![Pixel::new(-20.0, 40.0, 100.0), Pixel::new(300.0, 140.0, 100.0)],
            2,
            1,
        );
        let out = to_rgb8(img.as_ref());
        assert_eq!(out.get_pixel(0, 0)[0], 0);
        assert_eq!(out.get_pixel(1, 0)[0], 255);
    }

    #[test]
    fn flat_image_is_clamped_not_stretched() {
        let img = ImgVec::new(vec![Pixel::new(128.0, 128.0, 128.0); 4], 2, 2);
        let out = to_rgb8(img.as_ref());
        assert!(out.pixels().all(|p| p.0 == [128, 128, 128]));
    }

    #[test]
    fn png_round_trip() {
        let buf = (0..6 * 4)
            .map(|i| Pixel::new((i * 10) as f32, 255.0 - (i * 10) as f32, 0.0))
            .collect();
        let img = ImgVec::new(buf, 6, 4);
        let bytes = save_raster(img.as_ref(), ImageFormat::Png).unwrap();
        let back = load_raster(&bytes).unwrap();
        assert_eq!((back.width(), back.height()), (6, 4));
        // range is already 0..=255, so the stretch is the identity
        for (a, b) in img.buf().iter().zip(back.buf()) {
            assert_eq!(a, b);
        }
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(matches!(load_raster(b"not an image"), Err(Error::Image(_))));
    }
}
