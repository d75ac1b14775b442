//! Debug overlay for segmentation results.
//!
//! Draws the detected metadata header, its field regions, the panels and
//! their card slots onto a copy of the screenshot. Used when authoring
//! metadata field regions for a new screenshot layout.

use image::{Rgba, RgbaImage};

use super::{CardSlot, PixelRect, Segmentation};
use crate::config::MetadataFieldConfig;

/// Color constants for overlay rendering.
pub const COLOR_METADATA: Rgba<u8> = Rgba([255, 255, 0, 255]); // Yellow
pub const COLOR_FIELD: Rgba<u8> = Rgba([255, 128, 0, 255]); // Orange
pub const COLOR_SECTION: Rgba<u8> = Rgba([0, 255, 0, 255]); // Green
pub const COLOR_SLOT: Rgba<u8> = Rgba([255, 0, 0, 255]); // Red
pub const COLOR_SPLIT: Rgba<u8> = Rgba([0, 128, 255, 255]); // Blue

/// Renders every detected region onto a copy of `screenshot`.
pub fn render_segmentation(
    screenshot: &RgbaImage,
    segmentation: &Segmentation,
    slots: &[CardSlot],
    metadata_fields: &[MetadataFieldConfig],
    name_split_ratio: f32,
) -> RgbaImage {
    let mut img = screenshot.clone();

    let metadata = &segmentation.metadata.bbox;
    draw_rect(&mut img, metadata, COLOR_METADATA, 2);
    for field in metadata_fields {
        draw_rect(&mut img, &field.region.to_pixels(metadata), COLOR_FIELD, 1);
    }

    for section in &segmentation.sections {
        draw_rect(&mut img, &section.bbox, COLOR_SECTION, 3);
    }

    for slot in slots {
        draw_rect(&mut img, &slot.bbox, COLOR_SLOT, 1);
        let split_x = slot.bbox.x + (slot.bbox.width as f32 * name_split_ratio).round() as u32;
        draw_vline(&mut img, split_x, slot.bbox.y, slot.bbox.height, COLOR_SPLIT);
    }

    img
}

/// Draws a rectangle outline.
pub fn draw_rect(img: &mut RgbaImage, rect: &PixelRect, color: Rgba<u8>, thickness: u32) {
    let (img_w, img_h) = img.dimensions();
    let mut put = |px: u32, py: u32| {
        if px < img_w && py < img_h {
            img.put_pixel(px, py, color);
        }
    };

    let PixelRect { x, y, width: w, height: h } = *rect;
    for t in 0..thickness.min(w).min(h) {
        for dx in 0..w {
            // Top and bottom edges
            put(x + dx, y + t);
            put(x + dx, y + h - 1 - t);
        }
        for dy in 0..h {
            // Left and right edges
            put(x + t, y + dy);
            put(x + w - 1 - t, y + dy);
        }
    }
}

fn draw_vline(img: &mut RgbaImage, x: u32, y: u32, height: u32, color: Rgba<u8>) {
    if x >= img.width() {
        return;
    }
    for py in y..(y + height).min(img.height()) {
        img.put_pixel(x, py, color);
    }
}
