use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbaImage};

use crate::layout::PixelRect;

/// Crops a sub-region in absolute pixels, clamped to the image bounds.
pub fn crop_pixels(img: &RgbaImage, rect: &PixelRect) -> RgbaImage {
    let (w, h) = img.dimensions();

    let x0 = rect.x.min(w);
    let y0 = rect.y.min(h);
    let rw = rect.width.min(w - x0);
    let rh = rect.height.min(h - y0);

    imageops::crop_imm(img, x0, y0, rw, rh).to_image()
}

/// Splits a box into a left part of `ratio` of its width and the rest.
pub fn split_horizontal(rect: &PixelRect, ratio: f32) -> (PixelRect, PixelRect) {
    let left_width = ((rect.width as f32 * ratio).round() as u32).min(rect.width);
    let left = PixelRect::new(rect.x, rect.y, left_width, rect.height);
    let right = PixelRect::new(
        rect.x + left_width,
        rect.y,
        rect.width - left_width,
        rect.height,
    );
    (left, right)
}

/// Prepares a small numeric crop for digit-only recognition:
/// grayscale, then upscaled by `factor`.
pub fn prepare_digits(img: &RgbaImage, factor: u32) -> RgbaImage {
    let gray = DynamicImage::ImageRgba8(img.clone()).grayscale();
    let factor = factor.max(1);
    let (w, h) = img.dimensions();
    if factor == 1 || w == 0 || h == 0 {
        return gray.to_rgba8();
    }
    gray.resize_exact(w * factor, h * factor, FilterType::Lanczos3)
        .to_rgba8()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_crop_pixels() {
        // 100x200 image
        let img: RgbaImage = RgbaImage::from_fn(100, 200, |x, y| Rgba([x as u8, y as u8, 0, 255]));

        let cropped = crop_pixels(&img, &PixelRect::new(10, 50, 50, 20));

        assert_eq!(cropped.dimensions(), (50, 20));
        // Top-left pixel should be (10, 50) from original
        assert_eq!(cropped.get_pixel(0, 0)[0], 10);
        assert_eq!(cropped.get_pixel(0, 0)[1], 50);
    }

    #[test]
    fn test_crop_pixels_clamps() {
        let img = RgbaImage::new(100, 100);
        let cropped = crop_pixels(&img, &PixelRect::new(90, 90, 50, 50));

        // Should clamp to 10x10 (remaining pixels)
        assert_eq!(cropped.dimensions(), (10, 10));
        assert_eq!(crop_pixels(&img, &PixelRect::new(200, 0, 5, 5)).dimensions(), (0, 5));
    }

    #[test]
    fn test_split_horizontal() {
        let (name, qty) = split_horizontal(&PixelRect::new(30, 100, 340, 40), 0.7);
        assert_eq!(name, PixelRect::new(30, 100, 238, 40));
        assert_eq!(qty, PixelRect::new(268, 100, 102, 40));
    }

    #[test]
    fn test_prepare_digits_upscales_grayscale() {
        let img = RgbaImage::from_pixel(5, 3, Rgba([200, 10, 10, 255]));
        let out = prepare_digits(&img, 4);
        assert_eq!(out.dimensions(), (20, 12));
        let p = out.get_pixel(10, 6);
        assert_eq!(p[0], p[1]);
        assert_eq!(p[1], p[2]);
    }
}
