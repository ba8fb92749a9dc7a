//! Synthetic capture scenes
//!
//! The card scene is a light, slightly warm card with dark "text" lines on a
//! dark desk. Text lines are two pixels tall and start on even rows, so they
//! survive a 2x box downscale as solid one-pixel lines.

use crate::detect::ID_CARD_ASPECT_RATIO;
use crate::types::{PixelBuffer, PixelFormat};

pub const CARD_RGB: [u8; 3] = [225, 215, 200];
pub const BACKGROUND_RGB: [u8; 3] = [40, 45, 50];
const TEXT_RGB: [u8; 3] = [50, 50, 60];

/// Uniformly lit, edge-free field
pub fn gray_field(width: u32, height: u32, level: u8) -> PixelBuffer {
    let mut frame = PixelBuffer::blank(width, height, PixelFormat::Rgb);
    fill(&mut frame, (0, 0, width, height), [level; 3]);
    frame
}

/// Dark/light checkerboard with square cells of `cell` pixels
pub fn checkerboard(width: u32, height: u32, cell: u32) -> PixelBuffer {
    let cell = cell.max(1);
    let mut frame = PixelBuffer::blank(width, height, PixelFormat::Rgb);
    for y in 0..height {
        for x in 0..width {
            let light = (x / cell + y / cell) % 2 == 0;
            frame.set_rgb(x, y, if light { [210; 3] } else { [30; 3] });
        }
    }
    frame
}

/// Box blur with a `(2 * radius + 1)` square kernel, clamped at the borders
pub fn box_blur(frame: &PixelBuffer, radius: u32) -> PixelBuffer {
    let mut out = PixelBuffer::blank(frame.width(), frame.height(), PixelFormat::Rgb);
    let r = radius as i64;
    let (w, h) = (frame.width() as i64, frame.height() as i64);
    for y in 0..h {
        for x in 0..w {
            let mut sum = [0u32; 3];
            let mut n = 0u32;
            for sy in (y - r).max(0)..=(y + r).min(h - 1) {
                for sx in (x - r).max(0)..=(x + r).min(w - 1) {
                    let rgb = frame.rgb(sx as u32, sy as u32);
                    for (acc, v) in sum.iter_mut().zip(rgb) {
                        *acc += v as u32;
                    }
                    n += 1;
                }
            }
            out.set_rgb(
                x as u32,
                y as u32,
                [(sum[0] / n) as u8, (sum[1] / n) as u8, (sum[2] / n) as u8],
            );
        }
    }
    out
}

/// Centred ID-1 card rectangle `(x, y, width, height)` covering 5/8 of the
/// frame width
pub fn card_rect(width: u32, height: u32) -> (u32, u32, u32, u32) {
    let card_w = width * 5 / 8;
    let card_h = ((card_w as f32 / ID_CARD_ASPECT_RATIO).round() as u32).min(height);
    ((width - card_w) / 2, (height - card_h) / 2, card_w, card_h)
}

/// A sharp, glare-free card centred in the frame
pub fn id_card_scene(width: u32, height: u32) -> PixelBuffer {
    id_card_scene_at(width, height, 0, 0)
}

/// The card scene with the card shifted by `(dx, dy)` pixels
pub fn id_card_scene_at(width: u32, height: u32, dx: i32, dy: i32) -> PixelBuffer {
    let (cx, cy, cw, ch) = card_rect(width, height);
    let cx = (cx as i64 + dx as i64).clamp(0, (width - cw) as i64) as u32;
    let cy = (cy as i64 + dy as i64).clamp(0, (height - ch) as i64) as u32;
    card_scene(width, height, (cx, cy, cw, ch))
}

/// A text-lined card of any shape at `(x, y, width, height)`
pub fn card_scene(width: u32, height: u32, card: (u32, u32, u32, u32)) -> PixelBuffer {
    let (cx, cy, cw, ch) = card;
    let mut frame = PixelBuffer::blank(width, height, PixelFormat::Rgb);
    fill(&mut frame, (0, 0, width, height), BACKGROUND_RGB);
    fill(&mut frame, (cx, cy, cw, ch), CARD_RGB);

    let margin = cw / 10;
    let first_row = (cy + ch / 5) & !1;
    let last_row = cy + ch - ch / 8;
    for (line, row) in (first_row..last_row).step_by(8).enumerate() {
        let length = if line % 3 == 2 { cw * 2 / 5 } else { cw * 3 / 5 };
        fill(&mut frame, (cx + margin, row, length, 2), TEXT_RGB);
    }
    frame
}

/// Paint a pure white disc, the shape of a specular reflection
pub fn add_glare_spot(frame: &mut PixelBuffer, center_x: u32, center_y: u32, radius: u32) {
    let r2 = (radius as i64) * (radius as i64);
    let y0 = center_y.saturating_sub(radius);
    let x0 = center_x.saturating_sub(radius);
    for y in y0..(center_y + radius + 1).min(frame.height()) {
        for x in x0..(center_x + radius + 1).min(frame.width()) {
            let dx = x as i64 - center_x as i64;
            let dy = y as i64 - center_y as i64;
            if dx * dx + dy * dy <= r2 {
                frame.set_rgb(x, y, [255, 255, 255]);
            }
        }
    }
}

fn fill(frame: &mut PixelBuffer, (x, y, w, h): (u32, u32, u32, u32), rgb: [u8; 3]) {
    for py in y..(y + h).min(frame.height()) {
        for px in x..(x + w).min(frame.width()) {
            frame.set_rgb(px, py, rgb);
        }
    }
}
