use image::RgbaImage;
use tracing::debug;

use super::{CardSlot, PixelRect, Rgb, Section};
use crate::config::SegmentationConfig;

/// Splits a run of flags into `[start, end)` runs of `false` entries.
fn content_runs(flags: &[bool]) -> Vec<(u32, u32)> {
    let mut runs = Vec::new();
    let mut start: Option<u32> = None;

    for (i, &is_gap) in flags.iter().enumerate() {
        let i = i as u32;
        match (is_gap, start) {
            (false, None) => start = Some(i),
            (true, Some(s)) => {
                runs.push((s, i));
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        runs.push((s, flags.len() as u32));
    }

    runs
}

fn median(values: &mut [u32]) -> Option<u32> {
    if values.is_empty() {
        return None;
    }
    values.sort_unstable();
    Some(values[values.len() / 2])
}

/// Splits boxes taller than `max_height` into evenly sized parts. The part
/// count comes from the typical (median) height of the regular boxes.
fn split_merged(boxes: Vec<PixelRect>, max_height: u32) -> Vec<PixelRect> {
    let mut normal: Vec<u32> = boxes
        .iter()
        .map(|b| b.height)
        .filter(|h| *h <= max_height)
        .collect();
    let reference = median(&mut normal).unwrap_or(max_height).max(1);

    let mut out = Vec::with_capacity(boxes.len());
    for b in boxes {
        if b.height <= max_height {
            out.push(b);
            continue;
        }

        let parts = ((b.height as f32 / reference as f32).round() as u32).max(2);
        let part_height = b.height / parts;
        debug!(
            "Splitting {}px tall slot at y={} into {} parts",
            b.height, b.y, parts
        );
        for i in 0..parts {
            let y = b.y + i * part_height;
            let height = if i == parts - 1 {
                b.bottom() - y
            } else {
                part_height
            };
            out.push(PixelRect::new(b.x, y, b.width, height));
        }
    }
    out
}

/// Drops boxes contained in, or overlapping by at least `iou`, a larger box.
fn merge_overlapping(mut boxes: Vec<PixelRect>, iou: f32) -> Vec<PixelRect> {
    boxes.sort_by(|a, b| b.area().cmp(&a.area()).then((a.y, a.x).cmp(&(b.y, b.x))));

    let mut kept: Vec<PixelRect> = Vec::with_capacity(boxes.len());
    for b in boxes {
        if kept.iter().any(|k| k.contains(&b) || k.iou(&b) >= iou) {
            continue;
        }
        kept.push(b);
    }
    kept
}

/// Finds card tiles inside a section.
///
/// Rows almost entirely of gap color are gutters; the bands between them
/// are split on gap columns so side-by-side tiles become separate slots.
/// Slots come back ordered top to bottom, then left to right.
pub fn find_card_slots(
    img: &RgbaImage,
    section: &Section,
    cfg: &SegmentationConfig,
) -> Vec<CardSlot> {
    let x0 = section.bbox.x.min(img.width());
    let y0 = section.bbox.y.min(img.height());
    let x1 = section.bbox.right().min(img.width());
    let y1 = section.bbox.bottom().min(img.height());
    if x1 <= x0 || y1 <= y0 {
        return Vec::new();
    }
    let width = x1 - x0;

    let is_gap = |x: u32, y: u32| {
        Rgb::of(img.get_pixel(x, y)).matches(cfg.gap_color, cfg.color_tolerance)
    };

    let row_gaps: Vec<bool> = (y0..y1)
        .map(|y| {
            let count = (x0..x1).filter(|&x| is_gap(x, y)).count();
            count as f32 >= cfg.gap_row_coverage * width as f32
        })
        .collect();

    let mut boxes = Vec::new();
    for (band_start, band_end) in content_runs(&row_gaps) {
        let by0 = y0 + band_start;
        let by1 = y0 + band_end;
        let band_height = by1 - by0;

        let col_gaps: Vec<bool> = (x0..x1)
            .map(|x| {
                let count = (by0..by1).filter(|&y| is_gap(x, y)).count();
                count as f32 >= cfg.gap_row_coverage * band_height as f32
            })
            .collect();

        for (cx0, cx1) in content_runs(&col_gaps) {
            boxes.push(PixelRect::new(x0 + cx0, by0, cx1 - cx0, band_height));
        }
    }

    let min_width = cfg.min_slot_width_ratio * width as f32;
    let boxes: Vec<PixelRect> = boxes
        .into_iter()
        .filter(|b| b.width as f32 >= min_width && b.height >= cfg.min_slot_height_px)
        .collect();

    let boxes = split_merged(boxes, cfg.max_slot_height_px);
    let mut boxes = merge_overlapping(boxes, cfg.merge_iou);
    boxes.sort_by_key(|b| (b.y, b.x));

    debug!("Section {}: {} card slot(s)", section.kind, boxes.len());

    boxes
        .into_iter()
        .map(|bbox| CardSlot {
            bbox,
            section: section.kind,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::fixtures::{self, Panel};
    use crate::layout::{SectionKind, segment};

    fn cfg() -> SegmentationConfig {
        SegmentationConfig::default()
    }

    fn white_tile() -> fixtures::Tile {
        fixtures::tile([200, 200, 200], [240, 240, 240])
    }

    #[test]
    fn test_content_runs() {
        let flags = [true, false, false, true, true, false, true, false];
        assert_eq!(content_runs(&flags), vec![(1, 3), (5, 6), (7, 8)]);
        assert!(content_runs(&[true, true]).is_empty());
    }

    #[test]
    fn test_single_column_slots() {
        let img = fixtures::render(&[Panel {
            rows: vec![vec![white_tile()]; 3],
        }]);
        let seg = segment(&img, &cfg()).unwrap();
        let slots = find_card_slots(&img, &seg.sections[0], &cfg());

        assert_eq!(slots.len(), 3);
        let top = seg.sections[0].bbox.y + fixtures::PANEL_PAD;
        for (i, slot) in slots.iter().enumerate() {
            assert_eq!(slot.section, SectionKind::Legend);
            assert_eq!(slot.bbox.x, 30);
            assert_eq!(slot.bbox.width, 340);
            assert_eq!(slot.bbox.height, fixtures::TILE_HEIGHT);
            assert_eq!(
                slot.bbox.y,
                top + i as u32 * (fixtures::TILE_HEIGHT + fixtures::TILE_GAP)
            );
        }
    }

    #[test]
    fn test_two_column_slots_ordered_by_row_then_column() {
        let img = fixtures::render(&[Panel {
            rows: vec![vec![white_tile(), white_tile()], vec![white_tile()]],
        }]);
        let seg = segment(&img, &cfg()).unwrap();
        let slots = find_card_slots(&img, &seg.sections[0], &cfg());

        let origins: Vec<(u32, u32)> = slots.iter().map(|s| (s.bbox.x, s.bbox.y)).collect();
        let top = seg.sections[0].bbox.y + fixtures::PANEL_PAD;
        let second = top + fixtures::TILE_HEIGHT + fixtures::TILE_GAP;
        assert_eq!(origins, vec![(30, top), (205, top), (30, second)]);
        assert_eq!(slots[0].bbox.width, 165);
    }

    #[test]
    fn test_empty_panel_has_no_slots() {
        let img = fixtures::render(&[Panel { rows: vec![] }]);
        let seg = segment(&img, &cfg()).unwrap();
        assert!(find_card_slots(&img, &seg.sections[0], &cfg()).is_empty());
    }

    #[test]
    fn test_noise_and_header_text_filtered() {
        let mut img = fixtures::render(&[Panel {
            rows: vec![vec![white_tile()]],
        }]);
        let seg = segment(&img, &cfg()).unwrap();
        let section = &seg.sections[0];

        // Thin full-width line (below min height) inside the top padding
        fixtures::fill(&mut img, 30, section.bbox.y + 2, 340, 3, fixtures::METADATA);
        // Narrow caption-sized blob in the bottom padding
        let bottom = section.bbox.bottom();
        fixtures::fill(&mut img, 30, bottom - 9, 30, 8, fixtures::METADATA);

        let slots = find_card_slots(&img, section, &cfg());
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].bbox.height, fixtures::TILE_HEIGHT);
    }

    #[test]
    fn test_merged_slots_split() {
        let mut img = fixtures::render(&[Panel {
            rows: vec![vec![white_tile()]; 3],
        }]);
        let seg = segment(&img, &cfg()).unwrap();
        let section = &seg.sections[0];

        // Bridge the gutter between the 2nd and 3rd tile: one 88px block
        let second = section.bbox.y + fixtures::PANEL_PAD + fixtures::TILE_HEIGHT + fixtures::TILE_GAP;
        fixtures::fill(
            &mut img,
            30,
            second + fixtures::TILE_HEIGHT,
            340,
            fixtures::TILE_GAP,
            image::Rgba([200, 200, 200, 255]),
        );

        let mut config = cfg();
        config.max_slot_height_px = 60;
        let slots = find_card_slots(&img, section, &config);

        assert_eq!(slots.len(), 3);
        assert_eq!(slots[1].bbox.y, second);
        assert_eq!(slots[1].bbox.height, 44);
        assert_eq!(slots[2].bbox.bottom(), second + 88);
    }

    #[test]
    fn test_merge_overlapping_keeps_larger() {
        let big = PixelRect::new(0, 0, 100, 40);
        let inside = PixelRect::new(10, 5, 20, 20);
        let shifted = PixelRect::new(5, 0, 100, 40);
        let apart = PixelRect::new(0, 100, 100, 40);

        let kept = merge_overlapping(vec![inside, shifted, big, apart], 0.5);
        assert_eq!(kept.len(), 2);
        assert!(kept.contains(&apart));
        assert!(kept.iter().all(|k| *k != inside));
    }
}
