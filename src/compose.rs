//! Caption compositing for generated memes.
//!
//! Captions are drawn with the 8x8 bitmap font from `font8x8`, scaled by an
//! integer factor so they stay legible on larger templates, in white with a
//! black outline. The top caption hugs the top edge, the bottom caption the
//! bottom edge; both are centered horizontally.

use crate::errors::ComposeError;
use font8x8::{UnicodeFonts, BASIC_FONTS};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;

const GLYPH_SIZE: u32 = 8;
const MAX_SCALE: u32 = 4;
const STROKE_WIDTH: i64 = 2;
const FILL: Rgb<u8> = Rgb([255, 255, 255]);
const STROKE: Rgb<u8> = Rgb([0, 0, 0]);

/// Decodes a downloaded template into an image.
pub fn decode_template(bytes: &[u8]) -> Result<DynamicImage, ComposeError> {
    image::load_from_memory(bytes).map_err(ComposeError::Decode)
}

/// Draws both captions and returns the JPEG-encoded result.
pub fn compose_meme(template: &DynamicImage, top_text: &str, bottom_text: &str) -> Result<Vec<u8>, ComposeError> {
    let mut canvas = template.to_rgb8();
    draw_captions(&mut canvas, top_text, bottom_text);

    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(canvas)
        .write_to(&mut out, ImageFormat::Jpeg)
        .map_err(ComposeError::Encode)?;
    Ok(out.into_inner())
}

pub fn draw_captions(canvas: &mut RgbImage, top_text: &str, bottom_text: &str) {
    let top = to_glyphs(top_text);
    let bottom = to_glyphs(bottom_text);

    let top_scale = scale_for(canvas.width(), top.len());
    let bottom_scale = scale_for(canvas.width(), bottom.len());

    let top_y = STROKE_WIDTH;
    let bottom_y = i64::from(canvas.height()) - i64::from(GLYPH_SIZE * bottom_scale) - STROKE_WIDTH;

    draw_line(canvas, &top, top_scale, top_y);
    draw_line(canvas, &bottom, bottom_scale, bottom_y);
}

/// Largest integer scale (up to `MAX_SCALE`) at which the line fits.
fn scale_for(width: u32, glyph_count: usize) -> u32 {
    if glyph_count == 0 {
        return 1;
    }
    let natural = u64::from(GLYPH_SIZE) * glyph_count as u64 + 2 * STROKE_WIDTH as u64;
    let fit = u64::from(width) / natural;
    fit.clamp(1, u64::from(MAX_SCALE)) as u32
}

/// Bitmaps for every character. Typographic punctuation is folded to ASCII;
/// anything else without a glyph renders as `?`.
fn to_glyphs(text: &str) -> Vec<[u8; 8]> {
    let mut glyphs = Vec::with_capacity(text.len());
    for c in text.chars() {
        let folded: &[char] = match c {
            '\u{2026}' => &['.', '.', '.'],
            '\u{2018}' | '\u{2019}' => &['\''],
            '\u{201C}' | '\u{201D}' => &['"'],
            '\u{2013}' | '\u{2014}' => &['-'],
            _ => &[],
        };
        if folded.is_empty() {
            glyphs.push(glyph(c));
        } else {
            glyphs.extend(folded.iter().map(|&f| glyph(f)));
        }
    }
    glyphs
}

fn glyph(c: char) -> [u8; 8] {
    BASIC_FONTS
        .get(c)
        .or_else(|| BASIC_FONTS.get('?'))
        .unwrap_or([0; 8])
}

fn draw_line(canvas: &mut RgbImage, glyphs: &[[u8; 8]], scale: u32, y: i64) {
    if glyphs.is_empty() {
        return;
    }
    let line_width = i64::from(GLYPH_SIZE * scale) * glyphs.len() as i64;
    let x = (i64::from(canvas.width()) - line_width) / 2;

    // Outline first so neighbouring glyph fills are never covered by it.
    for_each_lit_pixel(glyphs, scale, x, y, |px, py| {
        for dy in -STROKE_WIDTH..=STROKE_WIDTH {
            for dx in -STROKE_WIDTH..=STROKE_WIDTH {
                put(canvas, px + dx, py + dy, STROKE);
            }
        }
    });
    for_each_lit_pixel(glyphs, scale, x, y, |px, py| put(canvas, px, py, FILL));
}

fn for_each_lit_pixel(glyphs: &[[u8; 8]], scale: u32, x: i64, y: i64, mut f: impl FnMut(i64, i64)) {
    let scale = i64::from(scale);
    let advance = i64::from(GLYPH_SIZE) * scale;
    for (index, rows) in glyphs.iter().enumerate() {
        let origin_x = x + index as i64 * advance;
        for (row, bits) in rows.iter().enumerate() {
            for col in 0..GLYPH_SIZE {
                // Bit 0 is the leftmost pixel.
                if bits & (1u8 << col) == 0 {
                    continue;
                }
                for sy in 0..scale {
                    for sx in 0..scale {
                        f(origin_x + i64::from(col) * scale + sx, y + row as i64 * scale + sy);
                    }
                }
            }
        }
    }
}

fn put(canvas: &mut RgbImage, x: i64, y: i64, color: Rgb<u8>) {
    if x < 0 || y < 0 || x >= i64::from(canvas.width()) || y >= i64::from(canvas.height()) {
        return;
    }
    canvas.put_pixel(x as u32, y as u32, color);
}
