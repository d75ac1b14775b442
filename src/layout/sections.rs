use image::RgbaImage;
use tracing::{debug, warn};

use super::{MetadataRegion, PixelRect, Rgb, Section, SectionKind, Segmentation};
use crate::config::SegmentationConfig;
use crate::error::SegmentationError;

/// Background classes seen along the sampled column.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Tone {
    Metadata,
    Panel,
    Backdrop,
}

/// Nearest palette tone within tolerance, if any.
fn classify(color: Rgb, cfg: &SegmentationConfig) -> Option<Tone> {
    [
        (Tone::Metadata, cfg.metadata_color),
        (Tone::Panel, cfg.panel_color),
        (Tone::Backdrop, cfg.backdrop_color),
    ]
    .into_iter()
    .map(|(tone, reference)| (tone, color.distance(reference)))
    .filter(|(_, d)| *d < cfg.color_tolerance)
    .min_by(|a, b| a.1.total_cmp(&b.1))
    .map(|(tone, _)| tone)
}

fn sample_x(img: &RgbaImage, cfg: &SegmentationConfig) -> u32 {
    let x = (img.width() as f32 * cfg.sample_x_percent / 100.0) as u32;
    x.min(img.width().saturating_sub(1))
}

fn percent_of(total: u32, percent: f32) -> u32 {
    ((total as f32 * percent / 100.0) as u32).min(total)
}

/// Finds where the metadata header ends and the deck area begins.
///
/// Walks down the sampled column past the top margin until `confirm_run`
/// consecutive pixels read as deck background (panel or backdrop). Returns
/// the boundary row and whether the fixed fallback fraction was used.
pub fn detect_metadata_boundary(img: &RgbaImage, cfg: &SegmentationConfig) -> (u32, bool) {
    let height = img.height();
    if img.width() == 0 || height == 0 {
        return (0, true);
    }

    let x = sample_x(img, cfg);
    let start = percent_of(height, cfg.skip_top_percent);
    let mut run = 0u32;

    for y in start..height {
        let tone = classify(Rgb::of(img.get_pixel(x, y)), cfg);
        if matches!(tone, Some(Tone::Panel) | Some(Tone::Backdrop)) {
            run += 1;
            if run >= cfg.confirm_run {
                let boundary = y + 1 - run;
                debug!("Metadata boundary at y={} (sampled x={})", boundary, x);
                return (boundary, false);
            }
        } else {
            run = 0;
        }
    }

    let fallback = percent_of(height, cfg.fallback_boundary_percent);
    warn!(
        "No metadata boundary found, falling back to {}% (y={})",
        cfg.fallback_boundary_percent, fallback
    );
    (fallback, true)
}

/// Vertical extent of one panel along the sampled column.
struct PanelRun {
    start: u32,
    end: u32,
    open_ended: bool,
}

/// Walks the sampled column below `from` and returns confirmed panel runs.
fn scan_panel_runs(img: &RgbaImage, from: u32, cfg: &SegmentationConfig) -> Vec<PanelRun> {
    let x = sample_x(img, cfg);
    let mut runs = Vec::new();
    let mut in_panel = false;
    let mut start = 0u32;
    let mut streak = 0u32;

    for y in from..img.height() {
        let is_panel = classify(Rgb::of(img.get_pixel(x, y)), cfg) == Some(Tone::Panel);

        // `streak` counts pixels disagreeing with the current state
        if is_panel != in_panel {
            streak += 1;
        } else {
            streak = 0;
        }

        if streak >= cfg.confirm_run {
            let edge = y + 1 - streak;
            if in_panel {
                runs.push(PanelRun {
                    start,
                    end: edge,
                    open_ended: false,
                });
            } else {
                start = edge;
            }
            in_panel = !in_panel;
            streak = 0;
        }
    }

    if in_panel {
        runs.push(PanelRun {
            start,
            end: img.height(),
            open_ended: true,
        });
    }

    runs
}

/// Horizontal extent of the panel on its middle row.
fn panel_columns(img: &RgbaImage, run: &PanelRun, cfg: &SegmentationConfig) -> (u32, u32) {
    let y = run.start + (run.end - run.start) / 2;
    let is_panel =
        |x: u32| classify(Rgb::of(img.get_pixel(x, y)), cfg) == Some(Tone::Panel);

    let left = (0..img.width()).find(|&x| is_panel(x));
    let right = (0..img.width()).rev().find(|&x| is_panel(x));

    match (left, right) {
        (Some(l), Some(r)) if r >= l => (l, r + 1),
        _ => (0, img.width()),
    }
}

/// Locates the metadata header and every deck panel, naming panels by
/// position alone. See [`segment_with`].
pub fn segment(img: &RgbaImage, cfg: &SegmentationConfig) -> Result<Segmentation, SegmentationError> {
    segment_with(img, cfg, |_| None)
}

/// Locates the metadata header and every deck panel.
///
/// `caption` is asked for the kind printed in each panel's header. Panels it
/// cannot name take the next kind of the configured section order after the
/// last named panel. Repeated kinds keep their first panel, and the result is
/// sorted into canonical order.
pub fn segment_with<F>(
    img: &RgbaImage,
    cfg: &SegmentationConfig,
    mut caption: F,
) -> Result<Segmentation, SegmentationError>
where
    F: FnMut(&PixelRect) -> Option<SectionKind>,
{
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return Err(SegmentationError::EmptyImage);
    }

    let (boundary, low_confidence) = detect_metadata_boundary(img, cfg);
    let metadata = MetadataRegion {
        bbox: PixelRect::new(0, 0, width, boundary.max(1).min(height)),
        low_confidence,
    };

    let panels: Vec<(PixelRect, bool)> = scan_panel_runs(img, boundary, cfg)
        .into_iter()
        .filter(|r| r.end - r.start >= cfg.min_section_height_px)
        .map(|run| {
            let (x0, x1) = panel_columns(img, &run, cfg);
            let bbox = PixelRect::new(x0, run.start, x1 - x0, run.end - run.start);
            (bbox, run.open_ended)
        })
        .collect();

    let captions: Vec<Option<SectionKind>> = panels.iter().map(|(bbox, _)| caption(bbox)).collect();
    let kinds = name_panels(&captions, &cfg.section_order);

    let mut sections: Vec<Section> = Vec::with_capacity(panels.len());
    for ((bbox, open_ended), kind) in panels.into_iter().zip(kinds) {
        let Some(kind) = kind else {
            warn!("Dropping panel at y={}: past the configured section order", bbox.y);
            continue;
        };
        if sections.iter().any(|s| s.kind == kind) {
            warn!("Dropping repeated {} panel at y={}", kind, bbox.y);
            continue;
        }
        sections.push(Section {
            kind,
            bbox,
            low_confidence: open_ended,
        });
    }
    sections.sort_by_key(|s| s.kind);

    if sections.is_empty() {
        return Err(SegmentationError::NoSections);
    }

    debug!(
        "Segmented {} section(s): {}",
        sections.len(),
        sections
            .iter()
            .map(|s| format!("{}@{}..{}", s.kind, s.bbox.y, s.bbox.bottom()))
            .collect::<Vec<_>>()
            .join(", ")
    );

    Ok(Segmentation { metadata, sections })
}

/// Assigns a kind to each panel, top to bottom. A caption wins; an
/// uncaptioned panel takes the order entry after the previous panel's kind.
fn name_panels(captions: &[Option<SectionKind>], order: &[SectionKind]) -> Vec<Option<SectionKind>> {
    let mut cursor = 0usize;
    captions
        .iter()
        .map(|caption| match caption {
            Some(kind) => {
                if let Some(pos) = order.iter().position(|k| k == kind) {
                    cursor = pos + 1;
                }
                Some(*kind)
            }
            None => {
                let kind = order.get(cursor).copied();
                cursor += 1;
                kind
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::fixtures::{self, Panel};

    fn cfg() -> SegmentationConfig {
        SegmentationConfig::default()
    }

    fn panel(rows: usize) -> Panel {
        Panel {
            rows: (0..rows)
                .map(|_| vec![fixtures::tile([200, 200, 200], [240, 240, 240])])
                .collect(),
        }
    }

    #[test]
    fn test_metadata_boundary_detected() {
        let img = fixtures::render(&[panel(1)]);
        let (boundary, low) = detect_metadata_boundary(&img, &cfg());
        assert_eq!(boundary, fixtures::METADATA_HEIGHT);
        assert!(!low);
    }

    #[test]
    fn test_metadata_boundary_fallback() {
        let img = RgbaImage::from_pixel(100, 500, fixtures::METADATA);
        let (boundary, low) = detect_metadata_boundary(&img, &cfg());
        assert_eq!(boundary, 100);
        assert!(low);
    }

    #[test]
    fn test_short_noise_does_not_confirm_boundary() {
        let mut img = RgbaImage::from_pixel(100, 300, fixtures::METADATA);
        // 3 rows of backdrop-colored noise, then real backdrop from y=200
        fixtures::fill(&mut img, 0, 60, 100, 3, fixtures::BACKDROP);
        fixtures::fill(&mut img, 0, 200, 100, 100, fixtures::BACKDROP);
        let (boundary, low) = detect_metadata_boundary(&img, &cfg());
        assert_eq!(boundary, 200);
        assert!(!low);
    }

    #[test]
    fn test_sections_in_canonical_order() {
        let img = fixtures::render(&[panel(1), panel(3), panel(2)]);
        let seg = segment(&img, &cfg()).unwrap();

        let kinds: Vec<SectionKind> = seg.sections.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![SectionKind::Legend, SectionKind::MainDeck, SectionKind::Battlefield]
        );

        for pair in seg.sections.windows(2) {
            assert!(pair[0].bbox.bottom() <= pair[1].bbox.y);
        }

        let legend = &seg.sections[0];
        assert_eq!(legend.bbox.y, fixtures::METADATA_HEIGHT + fixtures::PANEL_GAP);
        assert_eq!(legend.bbox.height, fixtures::panel_height(&panel(1)));
        assert_eq!(legend.bbox.x, fixtures::PANEL_X);
        assert_eq!(legend.bbox.right(), fixtures::PANEL_RIGHT);
        assert!(!legend.low_confidence);
    }

    #[test]
    fn test_extra_panels_dropped() {
        let panels: Vec<Panel> = (0..7).map(|_| panel(1)).collect();
        let img = fixtures::render(&panels);
        let seg = segment(&img, &cfg()).unwrap();
        assert_eq!(seg.sections.len(), 5);
        assert_eq!(seg.sections[4].kind, SectionKind::SideDeck);
    }

    /// Caption lookup that answers in panel order, one entry per panel.
    fn captions(kinds: Vec<Option<SectionKind>>) -> impl FnMut(&PixelRect) -> Option<SectionKind> {
        let mut kinds = kinds.into_iter();
        move |_| kinds.next().flatten()
    }

    #[test]
    fn test_missing_panel_named_by_caption() {
        // Legend, main deck and runes; no battlefield panel
        let img = fixtures::render(&[panel(1), panel(4), panel(2)]);
        let seg = segment_with(
            &img,
            &cfg(),
            captions(vec![
                Some(SectionKind::Legend),
                Some(SectionKind::MainDeck),
                Some(SectionKind::Rune),
            ]),
        )
        .unwrap();

        let kinds: Vec<SectionKind> = seg.sections.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![SectionKind::Legend, SectionKind::MainDeck, SectionKind::Rune]
        );
        assert_eq!(seg.sections[2].bbox.height, fixtures::panel_height(&panel(2)));
    }

    #[test]
    fn test_uncaptioned_panel_follows_previous_caption() {
        let img = fixtures::render(&[panel(1), panel(2), panel(1)]);
        let seg = segment_with(
            &img,
            &cfg(),
            captions(vec![None, Some(SectionKind::Rune), None]),
        )
        .unwrap();

        let kinds: Vec<SectionKind> = seg.sections.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![SectionKind::Legend, SectionKind::Rune, SectionKind::SideDeck]
        );
    }

    #[test]
    fn test_repeated_kind_keeps_first_panel_in_canonical_order() {
        // A scrolled screenshot: main deck, runes, then the main deck again
        let img = fixtures::render(&[panel(3), panel(1), panel(2)]);
        let seg = segment_with(
            &img,
            &cfg(),
            captions(vec![
                Some(SectionKind::MainDeck),
                Some(SectionKind::Rune),
                Some(SectionKind::MainDeck),
            ]),
        )
        .unwrap();

        assert_eq!(seg.sections.len(), 2);
        assert_eq!(seg.sections[0].kind, SectionKind::MainDeck);
        assert_eq!(seg.sections[0].bbox.height, fixtures::panel_height(&panel(3)));
        assert_eq!(seg.sections[1].kind, SectionKind::Rune);
    }

    #[test]
    fn test_name_panels_cursor() {
        let order = SectionKind::CANONICAL_ORDER;
        let named = name_panels(
            &[None, Some(SectionKind::Battlefield), None, None, None],
            &order,
        );
        assert_eq!(
            named,
            vec![
                Some(SectionKind::Legend),
                Some(SectionKind::Battlefield),
                Some(SectionKind::Rune),
                Some(SectionKind::SideDeck),
                None,
            ]
        );
    }

    #[test]
    fn test_no_sections_is_error() {
        let img = RgbaImage::from_pixel(200, 400, fixtures::BACKDROP);
        assert_eq!(segment(&img, &cfg()), Err(SegmentationError::NoSections));
    }

    #[test]
    fn test_empty_image_is_error() {
        let img = RgbaImage::new(0, 0);
        assert_eq!(segment(&img, &cfg()), Err(SegmentationError::EmptyImage));
    }

    #[test]
    fn test_panel_reaching_bottom_is_low_confidence() {
        let mut img = fixtures::render(&[panel(1)]);
        let h = img.height();
        // Extend the panel down to the last row
        fixtures::fill(&mut img, fixtures::PANEL_X, h - fixtures::PANEL_GAP, 380, fixtures::PANEL_GAP, fixtures::PANEL);
        let seg = segment(&img, &cfg()).unwrap();
        assert_eq!(seg.sections.len(), 1);
        assert!(seg.sections[0].low_confidence);
        assert_eq!(seg.sections[0].bbox.bottom(), h);
    }
}
