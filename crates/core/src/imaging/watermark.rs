use std::f32::consts::FRAC_PI_4;
use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use image::imageops::FilterType;
use image::{imageops, GrayImage, Luma, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_text_mut, text_size};
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};
use imageproc::rect::Rect;

use crate::error::{Error, Result};

/// Share of the canvas diagonal the text may span.
const TEXT_SPAN: f32 = 0.8;

/// Upper bound on the side of the square canvas the text is drawn on.
const MAX_MASK_SIDE: u32 = 2048;

fn canvas_side(w: u32, h: u32) -> u32 {
    (w as f32).hypot(h as f32).ceil() as u32
}

/// Dimensions to draw the mask at: `w` x `h`, shrunk with the same aspect
/// ratio until the canvas fits in `MAX_MASK_SIDE`.
fn mask_size(w: u32, h: u32) -> (u32, u32) {
    if canvas_side(w, h) <= MAX_MASK_SIDE {
        return (w, h);
    }
    let scale = (MAX_MASK_SIDE - 1) as f32 / (w as f32).hypot(h as f32);
    let shrink = |v: u32| ((v as f32 * scale).floor() as u32).max(1);
    (shrink(w), shrink(h))
}

/// Built-in 5x7 glyphs, one byte per row, low 5 bits used.
fn glyph(c: char) -> [u8; 7] {
    match c.to_ascii_uppercase() {
        'A' => [0b01110, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'B' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10001, 0b10001, 0b11110],
        'C' => [0b01110, 0b10001, 0b10000, 0b10000, 0b10000, 0b10001, 0b01110],
        'D' => [0b11110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b11110],
        'E' => [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b11111],
        'F' => [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000],
        'G' => [0b01110, 0b10001, 0b10000, 0b10111, 0b10001, 0b10001, 0b01111],
        'H' => [0b10001, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'I' => [0b01110, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        'J' => [0b00111, 0b00010, 0b00010, 0b00010, 0b00010, 0b10010, 0b01100],
        'K' => [0b10001, 0b10010, 0b10100, 0b11000, 0b10100, 0b10010, 0b10001],
        'L' => [0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b11111],
        'M' => [0b10001, 0b11011, 0b10101, 0b10101, 0b10001, 0b10001, 0b10001],
        'N' => [0b10001, 0b10001, 0b11001, 0b10101, 0b10011, 0b10001, 0b10001],
        'O' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'P' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10000, 0b10000, 0b10000],
        'Q' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10101, 0b10010, 0b01101],
        'R' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10100, 0b10010, 0b10001],
        'S' => [0b01111, 0b10000, 0b10000, 0b01110, 0b00001, 0b00001, 0b11110],
        'T' => [0b11111, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100],
        'U' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'V' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01010, 0b00100],
        'W' => [0b10001, 0b10001, 0b10001, 0b10101, 0b10101, 0b10101, 0b01010],
        'X' => [0b10001, 0b10001, 0b01010, 0b00100, 0b01010, 0b10001, 0b10001],
        'Y' => [0b10001, 0b10001, 0b01010, 0b00100, 0b00100, 0b00100, 0b00100],
        'Z' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b10000, 0b11111],
        '0' => [0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110],
        '1' => [0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        '2' => [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111],
        '3' => [0b11111, 0b00010, 0b00100, 0b00010, 0b00001, 0b10001, 0b01110],
        '4' => [0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010],
        '5' => [0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110],
        '6' => [0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110],
        '7' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000],
        '8' => [0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110],
        '9' => [0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100],
        ' ' => [0; 7],
        '-' => [0, 0, 0, 0b11111, 0, 0, 0],
        '.' => [0, 0, 0, 0, 0, 0b01100, 0b01100],
        '!' => [0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0, 0b00100],
        _ => [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0, 0b00100],
    }
}

/// Read and parse a font file. A missing, unreadable or unparsable file is an
/// invalid `watermark_font` setting.
pub fn load_font(path: &Path) -> Result<FontArc> {
    let invalid = |message: String| Error::InvalidSetting {
        key: "watermark_font".to_string(),
        message: format!("{}: {message}", path.display()),
    };
    let bytes = std::fs::read(path).map_err(|e| invalid(e.to_string()))?;
    FontArc::try_from_vec(bytes).map_err(|e| invalid(e.to_string()))
}

/// Diagonal text overlay applied to published images.
#[derive(Clone)]
pub struct Watermark {
    text: String,
    opacity: f32,
    font: Option<FontArc>,
}

impl Watermark {
    pub fn new(text: &str, opacity: f32) -> Self {
        Self {
            text: text.to_string(),
            opacity: opacity.clamp(0.0, 1.0),
            font: None,
        }
    }

    /// Render with a TrueType/OpenType font instead of the built-in block glyphs.
    pub fn with_font_file(mut self, path: &Path) -> Result<Self> {
        self.font = Some(load_font(path)?);
        Ok(self)
    }

    /// Blend the overlay into `img` in place.
    pub fn apply(&self, img: &mut RgbImage) {
        let (w, h) = img.dimensions();
        if w == 0 || h == 0 || self.opacity == 0.0 || self.text.trim().is_empty() {
            return;
        }
        let mask = self.mask(w, h);
        for (pixel, coverage) in img.pixels_mut().zip(mask.pixels()) {
            let alpha = coverage.0[0] as f32 / 255.0 * self.opacity;
            if alpha <= 0.0 {
                continue;
            }
            for channel in pixel.0.iter_mut() {
                let blended = *channel as f32 * (1.0 - alpha) + 255.0 * alpha;
                *channel = blended.round().clamp(0.0, 255.0) as u8;
            }
        }
    }

    /// Coverage mask of the text running bottom-left to top-right, `w` x `h`.
    /// Large images get a mask drawn at reduced size and scaled up.
    fn mask(&self, w: u32, h: u32) -> GrayImage {
        let (mw, mh) = mask_size(w, h);
        // Draw on a square as wide as the diagonal so rotation never clips the text
        let side = canvas_side(mw, mh);
        let mut canvas = GrayImage::new(side, side);
        match &self.font {
            Some(font) => self.draw_font(&mut canvas, font),
            None => self.draw_blocks(&mut canvas),
        }
        let rotated = rotate_about_center(&canvas, -FRAC_PI_4, Interpolation::Bilinear, Luma([0]));
        let mask = imageops::crop_imm(&rotated, (side - mw) / 2, (side - mh) / 2, mw, mh).to_image();
        if (mw, mh) == (w, h) {
            mask
        } else {
            imageops::resize(&mask, w, h, FilterType::Triangle)
        }
    }

    fn draw_blocks(&self, canvas: &mut GrayImage) {
        let side = canvas.width();
        let chars: Vec<char> = self.text.trim().chars().collect();
        // 5 columns of glyph plus 1 of spacing
        let cell = (((side as f32 * TEXT_SPAN) / (chars.len() * 6) as f32) as u32).max(1);
        let text_w = (chars.len() as u32 * 6 - 1) * cell;
        let text_h = 7 * cell;
        let x0 = side.saturating_sub(text_w) / 2;
        let y0 = side.saturating_sub(text_h) / 2;

        for (i, c) in chars.iter().enumerate() {
            let gx = x0 + i as u32 * 6 * cell;
            for (row, bits) in glyph(*c).iter().enumerate() {
                for col in 0..5u32 {
                    if *bits & (0b10000u8 >> col) != 0 {
                        let rect = Rect::at((gx + col * cell) as i32, (y0 + row as u32 * cell) as i32)
                            .of_size(cell, cell);
                        draw_filled_rect_mut(canvas, rect, Luma([255]));
                    }
                }
            }
        }
    }

    fn draw_font(&self, canvas: &mut GrayImage, font: &FontArc) {
        let side = canvas.width() as f32;
        let text = self.text.trim();
        let mut scale = PxScale::from(side * 0.25);
        let (tw, _) = text_size(scale, font, text);
        if tw as f32 > side * TEXT_SPAN {
            let shrink = side * TEXT_SPAN / tw as f32;
            scale = PxScale::from(scale.x * shrink);
        }
        let (tw, th) = text_size(scale, font, text);
        let x = ((side - tw as f32) / 2.0) as i32;
        let y = ((side - th as f32) / 2.0) as i32;
        draw_text_mut(canvas, Luma([255]), x, y, scale, font, text);
    }
}

/// Resize, watermark and encode a published derivative.
pub fn render_watermarked(
    source: &Path,
    watermark: &Watermark,
    width: u32,
    quality: u8,
) -> Result<Vec<u8>> {
    let mut img = super::resize_to_width(super::load_oriented(source)?, width)?;
    watermark.apply(&mut img);
    super::encode_jpeg(&img, quality)
}
