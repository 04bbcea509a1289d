use std::io::Cursor;
use std::path::Path;

use image::{DynamicImage, ImageFormat, Rgb, RgbImage, RgbaImage};

use crate::{RetraceError, RetraceResult};

/// Channel layout of a [`RasterImage`] buffer, 8 bits per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb,
    Rgba,
}

impl PixelFormat {
    /// Number of bytes per pixel.
    pub const fn channels(self) -> usize {
        match self {
            PixelFormat::Rgb => 3,
            PixelFormat::Rgba => 4,
        }
    }

    pub const fn has_alpha(self) -> bool {
        matches!(self, PixelFormat::Rgba)
    }
}

/// An in-memory raster image with an explicit pixel format.
///
/// The buffer always holds exactly `width * height * channels` bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterImage {
    width: u32,
    height: u32,
    format: PixelFormat,
    pixels: Vec<u8>,
}

impl RasterImage {
    /// Wrap a raw pixel buffer, checking its length against the geometry.
    pub fn new(
        width: u32,
        height: u32,
        format: PixelFormat,
        pixels: Vec<u8>,
    ) -> RetraceResult<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|count| count.checked_mul(format.channels()));
        match expected {
            Some(expected) if expected == pixels.len() => Ok(Self {
                width,
                height,
                format,
                pixels,
            }),
            _ => Err(RetraceError::InvalidBuffer {
                width,
                height,
                format,
                expected: expected.unwrap_or(usize::MAX),
                found: pixels.len(),
            }),
        }
    }

    /// Load an image file, keeping alpha only if the file has it.
    pub fn open(path: impl AsRef<Path>) -> RetraceResult<Self> {
        Ok(image::open(path)?.into())
    }

    /// Save the image; the format follows the file extension.
    pub fn save(&self, path: impl AsRef<Path>) -> RetraceResult<()> {
        self.to_dynamic()?.save(path)?;
        Ok(())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn into_pixels(self) -> Vec<u8> {
        self.pixels
    }

    /// Copy the buffer into the matching `image` crate type.
    pub fn to_dynamic(&self) -> RetraceResult<DynamicImage> {
        let buffer = self.pixels.clone();
        let image = match self.format {
            PixelFormat::Rgb => {
                RgbImage::from_raw(self.width, self.height, buffer).map(DynamicImage::ImageRgb8)
            }
            PixelFormat::Rgba => {
                RgbaImage::from_raw(self.width, self.height, buffer).map(DynamicImage::ImageRgba8)
            }
        };
        image.ok_or_else(|| self.invalid_buffer())
    }

    fn invalid_buffer(&self) -> RetraceError {
        RetraceError::InvalidBuffer {
            width: self.width,
            height: self.height,
            format: self.format,
            expected: self.width as usize * self.height as usize * self.format.channels(),
            found: self.pixels.len(),
        }
    }
}

impl From<RgbImage> for RasterImage {
    fn from(image: RgbImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            format: PixelFormat::Rgb,
            pixels: image.into_raw(),
        }
    }
}

impl From<RgbaImage> for RasterImage {
    fn from(image: RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            format: PixelFormat::Rgba,
            pixels: image.into_raw(),
        }
    }
}

impl From<DynamicImage> for RasterImage {
    /// Grey, 16-bit and float images are narrowed to 8-bit RGB or RGBA.
    fn from(image: DynamicImage) -> Self {
        match image {
            DynamicImage::ImageRgb8(rgb) => rgb.into(),
            DynamicImage::ImageRgba8(rgba) => rgba.into(),
            other if other.color().has_alpha() => other.to_rgba8().into(),
            other => other.to_rgb8().into(),
        }
    }
}

/// Blend one channel value over opaque white.
fn over_white(channel: u8, alpha: u8) -> u8 {
    let (c, a) = (u32::from(channel), u32::from(alpha));
    ((c * a + 255 * (255 - a) + 127) / 255) as u8
}

/// Drop alpha by compositing the image over an opaque white background.
///
/// Opaque images are copied through unchanged.
pub fn flatten_onto_white(image: &RasterImage) -> RetraceResult<RgbImage> {
    match image.format {
        PixelFormat::Rgb => RgbImage::from_raw(image.width, image.height, image.pixels.clone())
            .ok_or_else(|| image.invalid_buffer()),
        PixelFormat::Rgba => {
            let mut rgb = RgbImage::new(image.width, image.height);
            for (src, out) in image.pixels.chunks_exact(4).zip(rgb.pixels_mut()) {
                let alpha = src[3];
                *out = Rgb([
                    over_white(src[0], alpha),
                    over_white(src[1], alpha),
                    over_white(src[2], alpha),
                ]);
            }
            Ok(rgb)
        }
    }
}

/// Flatten the image and serialize it as an in-memory BMP for the tracer.
pub fn encode_bmp(image: &RasterImage) -> RetraceResult<Vec<u8>> {
    let rgb = flatten_onto_white(image)?;
    let mut cursor = Cursor::new(Vec::new());
    rgb.write_to(&mut cursor, ImageFormat::Bmp)
        .map_err(RetraceError::Encode)?;
    Ok(cursor.into_inner())
}

/// Decode rendered bytes into an RGBA image, whatever the source carried.
pub fn decode_rgba(bytes: &[u8]) -> RetraceResult<RasterImage> {
    let decoded = image::load_from_memory(bytes).map_err(RetraceError::Decode)?;
    Ok(decoded.to_rgba8().into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn rgba_image(w: u32, h: u32, color: [u8; 4]) -> RasterImage {
        RgbaImage::from_pixel(w, h, Rgba(color)).into()
    }

    mod raster_image {
        use super::*;

        #[test]
        fn new_accepts_matching_buffer() {
            let image = RasterImage::new(2, 3, PixelFormat::Rgb, vec![0; 18]).unwrap();
            assert_eq!(image.dimensions(), (2, 3));
            assert_eq!(image.format(), PixelFormat::Rgb);
        }

        #[test]
        fn new_rejects_short_buffer() {
            let err = RasterImage::new(2, 2, PixelFormat::Rgba, vec![0; 15]).unwrap_err();
            match err {
                RetraceError::InvalidBuffer {
                    expected, found, ..
                } => {
                    assert_eq!(expected, 16);
                    assert_eq!(found, 15);
                }
                other => panic!("unexpected error: {other:?}"),
            }
        }

        #[test]
        fn gray_dynamic_image_becomes_rgb() {
            let gray = DynamicImage::ImageLuma8(image::GrayImage::new(4, 4));
            let image = RasterImage::from(gray);
            assert_eq!(image.format(), PixelFormat::Rgb);
            assert_eq!(image.pixels().len(), 4 * 4 * 3);
        }

        #[test]
        fn gray_alpha_dynamic_image_becomes_rgba() {
            let gray = DynamicImage::ImageLumaA8(image::GrayAlphaImage::new(4, 4));
            let image = RasterImage::from(gray);
            assert_eq!(image.format(), PixelFormat::Rgba);
        }

        #[test]
        fn save_and_open_keep_pixels() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("image.png");
            let image = rgba_image(3, 2, [10, 20, 30, 40]);

            image.save(&path).unwrap();
            let reopened = RasterImage::open(&path).unwrap();

            assert_eq!(reopened, image);
        }
    }

    mod flatten_onto_white {
        use super::*;

        mod unit {
            use super::*;

            #[test]
            fn transparent_pixels_become_white() {
                let image = rgba_image(2, 2, [12, 34, 56, 0]);
                let rgb = flatten_onto_white(&image).unwrap();
                for px in rgb.pixels() {
                    assert_eq!(px.0, [255, 255, 255]);
                }
            }

            #[test]
            fn opaque_pixels_keep_color() {
                let image = rgba_image(2, 2, [12, 34, 56, 255]);
                let rgb = flatten_onto_white(&image).unwrap();
                for px in rgb.pixels() {
                    assert_eq!(px.0, [12, 34, 56]);
                }
            }

            #[test]
            fn half_transparent_black_becomes_mid_gray() {
                let image = rgba_image(1, 1, [0, 0, 0, 128]);
                let rgb = flatten_onto_white(&image).unwrap();
                assert_eq!(rgb.get_pixel(0, 0).0, [127, 127, 127]);
            }

            #[test]
            fn rgb_input_is_copied() {
                let rgb = RgbImage::from_pixel(2, 1, Rgb([1, 2, 3]));
                let flattened = flatten_onto_white(&rgb.clone().into()).unwrap();
                assert_eq!(flattened, rgb);
            }
        }

        mod prop {
            use super::*;
            use proptest::prelude::*;

            proptest! {
                /// over_white: result never gets darker than the source channel
                #[test]
                fn never_darker_than_source(c in any::<u8>(), a in any::<u8>()) {
                    prop_assert!(over_white(c, a) >= c);
                }

                /// over_white: fully opaque keeps the channel, fully transparent is white
                #[test]
                fn alpha_extremes(c in any::<u8>()) {
                    prop_assert_eq!(over_white(c, 255), c);
                    prop_assert_eq!(over_white(c, 0), 255);
                }

                /// flatten_onto_white: dimensions are preserved
                #[test]
                fn dimensions_preserved(w in 1u32..16, h in 1u32..16, a in any::<u8>()) {
                    let rgb = flatten_onto_white(&rgba_image(w, h, [90, 90, 90, a])).unwrap();
                    prop_assert_eq!(rgb.dimensions(), (w, h));
                }
            }
        }
    }

    mod encode_bmp {
        use super::*;

        #[test]
        fn semi_transparent_input_encodes_without_alpha() {
            let image = rgba_image(3, 3, [0, 0, 0, 128]);
            let bytes = encode_bmp(&image).unwrap();

            assert_eq!(&bytes[..2], b"BM");
            let decoded = image::load_from_memory_with_format(&bytes, ImageFormat::Bmp).unwrap();
            assert!(!decoded.color().has_alpha());
            let rgb = decoded.to_rgb8();
            assert_eq!(rgb.dimensions(), (3, 3));
            for px in rgb.pixels() {
                assert_eq!(px.0, [127, 127, 127]);
            }
        }

        #[test]
        fn opaque_rgb_round_trips_through_bmp() {
            let mut rgb = RgbImage::new(2, 2);
            rgb.put_pixel(0, 0, Rgb([255, 0, 0]));
            rgb.put_pixel(1, 1, Rgb([0, 0, 255]));
            let bytes = encode_bmp(&rgb.clone().into()).unwrap();

            let decoded = image::load_from_memory_with_format(&bytes, ImageFormat::Bmp)
                .unwrap()
                .to_rgb8();
            assert_eq!(decoded, rgb);
        }
    }

    mod decode_rgba {
        use super::*;

        #[test]
        fn opaque_png_is_widened_to_rgba() {
            let rgb = RgbImage::from_pixel(4, 2, Rgb([5, 6, 7]));
            let mut cursor = Cursor::new(Vec::new());
            rgb.write_to(&mut cursor, ImageFormat::Png).unwrap();

            let decoded = decode_rgba(cursor.get_ref()).unwrap();
            assert_eq!(decoded.format(), PixelFormat::Rgba);
            assert_eq!(decoded.dimensions(), (4, 2));
            assert_eq!(&decoded.pixels()[..4], &[5, 6, 7, 255]);
        }

        #[test]
        fn garbage_bytes_fail_to_decode() {
            let err = decode_rgba(b"definitely not a png").unwrap_err();
            assert!(matches!(err, RetraceError::Decode(_)));
        }
    }
}
