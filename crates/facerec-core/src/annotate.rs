//! Drawing face boxes and label tags onto frames.

use crate::types::PixelBox;
use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const MATCH_COLOR: Rgb<u8> = Rgb([92, 184, 92]);
pub const NEAR_MATCH_COLOR: Rgb<u8> = Rgb([200, 150, 0]);
pub const UNKNOWN_COLOR: Rgb<u8> = Rgb([250, 17, 61]);
pub const REGISTER_COLOR: Rgb<u8> = Rgb([72, 114, 211]);
pub const IGNORED_COLOR: Rgb<u8> = Rgb([250, 17, 61]);

const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const LABEL_SCALE: f32 = 32.0;
const TAG_PADDING: i32 = 5;
const TEXT_BASELINE_GAP: i32 = 4;

const SYSTEM_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/liberation/LiberationSans-Regular.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

#[derive(Error, Debug)]
pub enum AnnotateError {
    #[error("failed to read font {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid font file {0}")]
    InvalidFont(PathBuf),
}

/// Draws boxes and filled label tags. Without a font, tags are drawn
/// at an estimated size but stay blank.
#[derive(Clone, Default)]
pub struct Annotator {
    font: Option<FontArc>,
}

impl Annotator {
    pub fn new(font: Option<FontArc>) -> Self {
        Self { font }
    }

    pub fn from_font_file(path: &Path) -> Result<Self, AnnotateError> {
        let bytes = std::fs::read(path).map_err(|source| AnnotateError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let font = FontArc::try_from_vec(bytes).map_err(|_| AnnotateError::InvalidFont(path.to_path_buf()))?;
        Ok(Self { font: Some(font) })
    }

    /// Load `explicit` if given, otherwise the first usable system font.
    pub fn discover(explicit: Option<&Path>) -> Self {
        let candidates: Vec<PathBuf> = match explicit {
            Some(path) => vec![path.to_path_buf()],
            None => SYSTEM_FONTS.iter().map(PathBuf::from).collect(),
        };

        for path in candidates.iter().filter(|p| p.exists() || explicit.is_some()) {
            match Self::from_font_file(path) {
                Ok(annotator) => {
                    tracing::info!(path = %path.display(), "label font loaded");
                    return annotator;
                }
                Err(err) => tracing::warn!(error = %err, "label font unusable"),
            }
        }

        tracing::warn!("no label font available; face tags will be drawn without text");
        Self::default()
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Outline `bbox` with a `thickness`-pixel rectangle.
    pub fn draw_box(&self, image: &mut RgbImage, bbox: PixelBox, color: Rgb<u8>, thickness: u32) {
        for inset in 0..thickness as i32 {
            let w = bbox.width() as i32 - 2 * inset;
            let h = bbox.height() as i32 - 2 * inset;
            if w <= 0 || h <= 0 {
                break;
            }
            let rect = Rect::at(bbox.x1 + inset, bbox.y1 + inset).of_size(w as u32, h as u32);
            draw_hollow_rect_mut(image, rect, color);
        }
    }

    /// Filled tag sitting on top of `bbox` with `label` in white.
    pub fn draw_label(&self, image: &mut RgbImage, bbox: PixelBox, label: &str, color: Rgb<u8>) {
        let (text_w, text_h) = self.text_size(label);
        if text_w == 0 || text_h == 0 {
            return;
        }

        let tag_h = text_h + TAG_PADDING as u32;
        let tag = Rect::at(bbox.x1, bbox.y1 - tag_h as i32).of_size(text_w, tag_h);
        draw_filled_rect_mut(image, tag, color);

        if let Some(font) = &self.font {
            let y = bbox.y1 - TEXT_BASELINE_GAP - text_h as i32;
            draw_text_mut(image, TEXT_COLOR, bbox.x1, y, PxScale::from(LABEL_SCALE), font, label);
        }
    }

    /// Box plus label in one call.
    pub fn draw_face(&self, image: &mut RgbImage, bbox: PixelBox, label: &str, color: Rgb<u8>, thickness: u32) {
        self.draw_box(image, bbox, color, thickness);
        self.draw_label(image, bbox, label, color);
    }

    fn text_size(&self, label: &str) -> (u32, u32) {
        match &self.font {
            Some(font) => text_size(PxScale::from(LABEL_SCALE), font, label),
            None => {
                let chars = label.chars().count() as f32;
                ((chars * LABEL_SCALE * 0.55).ceil() as u32, (LABEL_SCALE * 0.7).ceil() as u32)
            }
        }
    }
}
