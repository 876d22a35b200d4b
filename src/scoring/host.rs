//! Image host capability and its `image` crate implementation
//!
//! The session never touches pixels directly. It opens source images, asks
//! for crops, sets display bounds and saves JPEG snapshots through
//! [`ImageHost`], so the traversal logic can be exercised without decoding
//! anything.

use image::{ColorType, DynamicImage, ImageBuffer, ImageFormat, Rgb, RgbImage};
use std::path::Path;

use super::error::{Result, ScoringError};
use super::types::Contrast;

/// Fraction of samples saturated on each side by auto-contrast.
const AUTO_SATURATION: f64 = 0.0035;

pub trait ImageHost {
    type Image;

    /// Open an image file; fails if it is missing or cannot be decoded.
    fn open(&mut self, path: &Path) -> Result<Self::Image>;

    /// Copy the `width` x `height` block at (`x`, `y`) into a new image.
    fn crop(
        &mut self,
        source: &Self::Image,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    ) -> Result<Self::Image>;

    /// Choose display bounds from the image's own histogram and apply them.
    fn auto_contrast(&mut self, image: &mut Self::Image) -> Contrast;

    fn apply_contrast(&mut self, image: &mut Self::Image, contrast: Contrast);

    /// Save the image as currently displayed.
    fn save_jpeg(&mut self, image: &Self::Image, path: &Path) -> Result<()>;

    /// Release a handle. Taking it by value means it can only happen once.
    fn release(&mut self, image: Self::Image);
}

impl<H: ImageHost + ?Sized> ImageHost for &mut H {
    type Image = H::Image;

    fn open(&mut self, path: &Path) -> Result<Self::Image> {
        (**self).open(path)
    }

    fn crop(
        &mut self,
        source: &Self::Image,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    ) -> Result<Self::Image> {
        (**self).crop(source, x, y, width, height)
    }

    fn auto_contrast(&mut self, image: &mut Self::Image) -> Contrast {
        (**self).auto_contrast(image)
    }

    fn apply_contrast(&mut self, image: &mut Self::Image, contrast: Contrast) {
        (**self).apply_contrast(image, contrast)
    }

    fn save_jpeg(&mut self, image: &Self::Image, path: &Path) -> Result<()> {
        (**self).save_jpeg(image, path)
    }

    fn release(&mut self, image: Self::Image) {
        (**self).release(image)
    }
}

/// A decoded image plus the 8-bit rendering of its current display bounds.
pub struct RasterImage {
    pixels: DynamicImage,
    display: Option<RgbImage>,
}

impl RasterImage {
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Rendered pixels, once bounds have been applied.
    pub fn display(&self) -> Option<&RgbImage> {
        self.display.as_ref()
    }

    /// Raw samples widened to 16 bits without rescaling, so 8-bit sources
    /// keep their 0..=255 range and bounds mean the same thing for both.
    fn raw(&self) -> ImageBuffer<Rgb<u16>, Vec<u16>> {
        let wide = matches!(
            self.pixels.color(),
            ColorType::L16 | ColorType::La16 | ColorType::Rgb16 | ColorType::Rgba16
        );
        if wide {
            return self.pixels.to_rgb16();
        }
        let narrow = self.pixels.to_rgb8();
        ImageBuffer::from_fn(narrow.width(), narrow.height(), |x, y| {
            let p = narrow.get_pixel(x, y);
            Rgb([p[0] as u16, p[1] as u16, p[2] as u16])
        })
    }

    fn render(&mut self, contrast: Contrast) {
        let raw = self.raw();
        let span = contrast.max - contrast.min;
        let stretch = |v: u16| -> u8 {
            let scaled = (v as f64 - contrast.min) / span * 255.0;
            scaled.round().clamp(0.0, 255.0) as u8
        };
        let display = ImageBuffer::from_fn(raw.width(), raw.height(), |x, y| {
            let p = raw.get_pixel(x, y);
            Rgb([stretch(p[0]), stretch(p[1]), stretch(p[2])])
        });
        self.display = Some(display);
    }
}

/// [`ImageHost`] backed by the `image` crate.
#[derive(Debug, Default)]
pub struct RasterHost;

impl ImageHost for RasterHost {
    type Image = RasterImage;

    fn open(&mut self, path: &Path) -> Result<RasterImage> {
        let pixels = image::open(path)?;
        Ok(RasterImage {
            pixels,
            display: None,
        })
    }

    fn crop(
        &mut self,
        source: &RasterImage,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    ) -> Result<RasterImage> {
        if x >= source.width() || y >= source.height() {
            return Err(ScoringError::RegionOutOfBounds {
                x,
                y,
                width: source.width(),
                height: source.height(),
            });
        }
        // crop_imm clamps blocks that run past the right or bottom edge
        Ok(RasterImage {
            pixels: source.pixels.crop_imm(x, y, width, height),
            display: None,
        })
    }

    fn auto_contrast(&mut self, image: &mut RasterImage) -> Contrast {
        let mut samples: Vec<u16> = image.raw().into_raw();
        samples.sort_unstable();
        let contrast = match samples.len() {
            0 => Contrast::default(),
            n => {
                let cut = ((n as f64) * AUTO_SATURATION) as usize;
                let lo = samples[cut.min(n - 1)] as f64;
                let hi = samples[(n - 1).saturating_sub(cut)] as f64;
                if hi > lo {
                    Contrast { min: lo, max: hi }
                } else {
                    Contrast {
                        min: lo,
                        max: lo + 1.0,
                    }
                }
            }
        };
        image.render(contrast);
        contrast
    }

    fn apply_contrast(&mut self, image: &mut RasterImage, contrast: Contrast) {
        image.render(contrast);
    }

    fn save_jpeg(&mut self, image: &RasterImage, path: &Path) -> Result<()> {
        match &image.display {
            Some(display) => display.save_with_format(path, ImageFormat::Jpeg)?,
            None => image.pixels.to_rgb8().save_with_format(path, ImageFormat::Jpeg)?,
        }
        Ok(())
    }

    fn release(&mut self, image: RasterImage) {
        drop(image);
    }
}
