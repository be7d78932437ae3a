//! Draws captions onto stored pictures.

use std::path::Path;

use font8x8::{BASIC_FONTS, UnicodeFonts};
use image::{ImageFormat, Rgb, RgbImage};
use tracing::{debug, instrument};

use crate::constants::{
    CAPTION_BASELINE_RATIO, CAPTION_COLOR, CAPTION_GLYPH_SCALE, CAPTION_X_OFFSET,
};
use crate::error::BotError;
use crate::fetcher::replace_file;
use crate::images::encode_jpeg;

const GLYPH_SIZE: i64 = 8;

/// Stamps `caption` onto the JPEG at `path`, overwriting it.
///
/// The caption starts [`CAPTION_X_OFFSET`] pixels from the left with its
/// baseline at [`CAPTION_BASELINE_RATIO`] of the height. Text running off
/// the picture is clipped.
#[instrument(level = "debug", skip(path), fields(path = %path.display()))]
pub async fn compose_caption(path: &Path, caption: &str) -> Result<(), BotError> {
    let bytes = tokio::fs::read(path).await?;
    let caption = caption.to_string();
    let output = tokio::task::spawn_blocking(move || render_caption(&bytes, &caption)).await??;
    replace_file(path, &output).await?;
    debug!("Caption written");
    Ok(())
}

/// Decodes a JPEG, draws the caption and re-encodes it.
pub fn render_caption(jpeg: &[u8], caption: &str) -> Result<Vec<u8>, BotError> {
    let mut image = image::load_from_memory_with_format(jpeg, ImageFormat::Jpeg)?.to_rgb8();
    let baseline = (f64::from(image.height()) * CAPTION_BASELINE_RATIO) as i64;
    draw_text(&mut image, CAPTION_X_OFFSET, baseline, caption);
    encode_jpeg(&image)
}

fn draw_text(image: &mut RgbImage, x: i64, baseline: i64, text: &str) {
    let advance = GLYPH_SIZE * CAPTION_GLYPH_SCALE;
    let mut top = baseline - advance;
    let mut cursor_x = x;
    for ch in text.chars() {
        if ch == '\n' {
            cursor_x = x;
            top += advance;
            continue;
        }
        if let Some(glyph) = BASIC_FONTS.get(ch).or_else(|| BASIC_FONTS.get('?')) {
            draw_glyph(image, cursor_x, top, &glyph);
        }
        cursor_x += advance;
    }
}

fn draw_glyph(image: &mut RgbImage, x: i64, y: i64, glyph: &[u8; 8]) {
    let width = i64::from(image.width());
    let height = i64::from(image.height());
    for (row_idx, bits) in (0i64..).zip(glyph.iter().copied()) {
        for col_idx in 0..GLYPH_SIZE {
            // bit 0 is the leftmost pixel
            if (bits >> col_idx) & 1 == 0 {
                continue;
            }
            let px = x + col_idx * CAPTION_GLYPH_SCALE;
            let py = y + row_idx * CAPTION_GLYPH_SCALE;
            for ty in py..py + CAPTION_GLYPH_SCALE {
                for tx in px..px + CAPTION_GLYPH_SCALE {
                    if tx < 0 || ty < 0 || tx >= width || ty >= height {
                        continue;
                    }
                    image.put_pixel(tx as u32, ty as u32, Rgb(CAPTION_COLOR));
                }
            }
        }
    }
}
