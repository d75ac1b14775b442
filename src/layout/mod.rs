//! Region segmentation for decklist screenshots.
//!
//! Finds the metadata header, the deck panels below it, and the card
//! tiles inside each panel using nothing but background-color heuristics.

pub mod color;
pub mod preview;
mod sections;
mod slots;

use serde::{Deserialize, Serialize};

pub use color::Rgb;
pub use sections::{segment, segment_with};
pub use slots::find_card_slots;

/// Named deck panel, in the order the client renders them top to bottom.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    Legend,
    MainDeck,
    Battlefield,
    Rune,
    SideDeck,
}

impl SectionKind {
    pub const CANONICAL_ORDER: [SectionKind; 5] = [
        SectionKind::Legend,
        SectionKind::MainDeck,
        SectionKind::Battlefield,
        SectionKind::Rune,
        SectionKind::SideDeck,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SectionKind::Legend => "legend",
            SectionKind::MainDeck => "main_deck",
            SectionKind::Battlefield => "battlefield",
            SectionKind::Rune => "rune",
            SectionKind::SideDeck => "side_deck",
        }
    }
}

impl std::str::FromStr for SectionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::CANONICAL_ORDER
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown section `{}`", s))
    }
}

impl std::fmt::Display for SectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Axis-aligned box in absolute pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn intersection(&self, other: &PixelRect) -> Option<PixelRect> {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.right().min(other.right());
        let y1 = self.bottom().min(other.bottom());
        if x1 > x0 && y1 > y0 {
            Some(PixelRect::new(x0, y0, x1 - x0, y1 - y0))
        } else {
            None
        }
    }

    /// Intersection over union, 0.0 for disjoint boxes.
    pub fn iou(&self, other: &PixelRect) -> f32 {
        let Some(inter) = self.intersection(other) else {
            return 0.0;
        };
        let inter = inter.area() as f32;
        let union = self.area() as f32 + other.area() as f32 - inter;
        if union <= 0.0 { 0.0 } else { inter / union }
    }

    pub fn contains(&self, other: &PixelRect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }
}

/// A rectangle in relative coordinates (0.0 to 1.0) of some parent box.
/// Used for metadata regions so they scale with screenshot size.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RelativeRect {
    /// X position of top-left corner (0.0 = left edge, 1.0 = right edge)
    pub x: f32,
    /// Y position of top-left corner (0.0 = top edge, 1.0 = bottom edge)
    pub y: f32,
    /// Width as fraction of parent width
    pub width: f32,
    /// Height as fraction of parent height
    pub height: f32,
}

impl RelativeRect {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// Converts to absolute pixels inside `parent`, clamped to its bounds.
    /// The result is at least 1x1 whenever the parent is non-empty.
    pub fn to_pixels(&self, parent: &PixelRect) -> PixelRect {
        let pw = parent.width as f32;
        let ph = parent.height as f32;

        let x0 = ((self.x.max(0.0) * pw).round() as u32).min(parent.width.saturating_sub(1));
        let y0 = ((self.y.max(0.0) * ph).round() as u32).min(parent.height.saturating_sub(1));
        let w = ((self.width.max(0.0) * pw).round() as u32)
            .min(parent.width - x0.min(parent.width))
            .max(1);
        let h = ((self.height.max(0.0) * ph).round() as u32)
            .min(parent.height - y0.min(parent.height))
            .max(1);

        PixelRect::new(parent.x + x0, parent.y + y0, w, h)
    }
}

impl Default for RelativeRect {
    fn default() -> Self {
        Self::new(0.0, 0.0, 0.1, 0.1)
    }
}

/// A detected deck panel.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Section {
    pub kind: SectionKind,
    pub bbox: PixelRect,
    /// Panel ran off the bottom edge without a confirmed end.
    pub low_confidence: bool,
}

/// One physical card tile inside a section.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CardSlot {
    pub bbox: PixelRect,
    pub section: SectionKind,
}

/// The header area above the first panel.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MetadataRegion {
    pub bbox: PixelRect,
    /// Boundary came from the fixed fallback fraction, not from pixels.
    pub low_confidence: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Segmentation {
    pub metadata: MetadataRegion,
    pub sections: Vec<Section>,
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Synthetic screenshots that follow the default palette.

    use image::{Rgba, RgbaImage};

    pub const WIDTH: u32 = 400;
    pub const METADATA: Rgba<u8> = Rgba([0x1e, 0x30, 0x44, 255]);
    pub const PANEL: Rgba<u8> = Rgba([0x1b, 0x4e, 0x63, 255]);
    pub const BACKDROP: Rgba<u8> = Rgba([0x01, 0x39, 0x50, 255]);

    /// A card tile: `name` fills the left 70%, `qty` the right 30%.
    #[derive(Clone, Copy)]
    pub struct Tile {
        pub name: Rgba<u8>,
        pub qty: Rgba<u8>,
    }

    /// One panel with rows of tiles, one or two tiles per row.
    pub struct Panel {
        pub rows: Vec<Vec<Tile>>,
    }

    pub const METADATA_HEIGHT: u32 = 80;
    pub const PANEL_GAP: u32 = 20;
    pub const PANEL_PAD: u32 = 10;
    pub const TILE_HEIGHT: u32 = 40;
    pub const TILE_GAP: u32 = 8;
    pub const PANEL_X: u32 = 10;
    pub const PANEL_RIGHT: u32 = 390;

    pub fn panel_height(panel: &Panel) -> u32 {
        let rows = panel.rows.len() as u32;
        if rows == 0 {
            return 60;
        }
        2 * PANEL_PAD + rows * TILE_HEIGHT + (rows - 1) * TILE_GAP
    }

    /// Top edge of `panels[index]` once rendered.
    pub fn panel_top(panels: &[Panel], index: usize) -> u32 {
        METADATA_HEIGHT
            + PANEL_GAP
            + panels[..index]
                .iter()
                .map(|p| panel_height(p) + PANEL_GAP)
                .sum::<u32>()
    }

    /// Paints metadata, then each panel separated by backdrop.
    pub fn render(panels: &[Panel]) -> RgbaImage {
        let height = METADATA_HEIGHT
            + panels
                .iter()
                .map(|p| PANEL_GAP + panel_height(p))
                .sum::<u32>()
            + PANEL_GAP;
        let mut img = RgbaImage::from_pixel(WIDTH, height, BACKDROP);

        fill(&mut img, 0, 0, WIDTH, METADATA_HEIGHT, METADATA);

        let mut y = METADATA_HEIGHT + PANEL_GAP;
        for panel in panels {
            let ph = panel_height(panel);
            fill(&mut img, PANEL_X, y, PANEL_RIGHT - PANEL_X, ph, PANEL);

            let mut ty = y + PANEL_PAD;
            for row in &panel.rows {
                let columns: Vec<(u32, u32)> = if row.len() >= 2 {
                    vec![(30, 195), (205, 370)]
                } else {
                    vec![(30, 370)]
                };
                for (tile, (x0, x1)) in row.iter().zip(columns) {
                    let split = x0 + (x1 - x0) * 7 / 10;
                    fill(&mut img, x0, ty, split - x0, TILE_HEIGHT, tile.name);
                    fill(&mut img, split, ty, x1 - split, TILE_HEIGHT, tile.qty);
                }
                ty += TILE_HEIGHT + TILE_GAP;
            }
            y += ph + PANEL_GAP;
        }

        img
    }

    pub fn fill(img: &mut RgbaImage, x: u32, y: u32, w: u32, h: u32, color: Rgba<u8>) {
        for yy in y..(y + h).min(img.height()) {
            for xx in x..(x + w).min(img.width()) {
                img.put_pixel(xx, yy, color);
            }
        }
    }

    pub fn tile(name: [u8; 3], qty: [u8; 3]) -> Tile {
        Tile {
            name: Rgba([name[0], name[1], name[2], 255]),
            qty: Rgba([qty[0], qty[1], qty[2], 255]),
        }
    }
}
