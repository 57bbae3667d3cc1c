//! 5x7 bitmap glyphs for stamping timestamps onto grid cells.

use image::{Rgb, RgbImage};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;

const GLYPH_WIDTH: u32 = 5;
const GLYPH_HEIGHT: u32 = 7;
const PADDING: u32 = 2;

// Row bitmaps, bit 4 is the leftmost column.
fn glyph(c: char) -> Option<[u8; 7]> {
    let rows = match c {
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        '.' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x0C, 0x0C],
        's' => [0x00, 0x00, 0x0E, 0x10, 0x0E, 0x01, 0x1E],
        '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
        _ => return None,
    };
    Some(rows)
}

/// Draw `text` in white on a black box with its top-left corner at `(x, y)`.
pub(crate) fn stamp_label(canvas: &mut RgbImage, x: u32, y: u32, text: &str, scale: u32) {
    let scale = scale.max(1);
    let advance = (GLYPH_WIDTH + 1) * scale;
    let chars = text.chars().count() as u32;
    if chars == 0 {
        return;
    }

    let box_width = chars * advance - scale + 2 * PADDING;
    let box_height = GLYPH_HEIGHT * scale + 2 * PADDING;
    draw_filled_rect_mut(
        canvas,
        Rect::at(x as i32, y as i32).of_size(box_width, box_height),
        Rgb([0, 0, 0]),
    );

    let white = Rgb([255, 255, 255]);
    for (i, c) in text.chars().enumerate() {
        let Some(rows) = glyph(c) else {
            continue;
        };
        let origin_x = x + PADDING + i as u32 * advance;
        let origin_y = y + PADDING;
        for (r, bits) in rows.iter().enumerate() {
            for col in 0..GLYPH_WIDTH {
                if (*bits >> (GLYPH_WIDTH - 1 - col)) & 1 == 1 {
                    draw_filled_rect_mut(
                        canvas,
                        Rect::at(
                            (origin_x + col * scale) as i32,
                            (origin_y + r as u32 * scale) as i32,
                        )
                        .of_size(scale, scale),
                        white,
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn white_pixels(image: &RgbImage) -> usize {
        image.pixels().filter(|p| p.0 == [255, 255, 255]).count()
    }

    #[test]
    fn test_label_draws_white_pixels_inside_box() {
        let mut canvas = RgbImage::from_pixel(80, 30, Rgb([90, 90, 90]));
        stamp_label(&mut canvas, 0, 0, "1.0s", 1);

        assert!(white_pixels(&canvas) > 0);
        // Outside the label box the canvas is untouched.
        assert_eq!(canvas.get_pixel(79, 29).0, [90, 90, 90]);
    }

    #[test]
    fn test_different_labels_render_differently() {
        let mut a = RgbImage::new(60, 20);
        let mut b = RgbImage::new(60, 20);
        stamp_label(&mut a, 0, 0, "1.0s", 1);
        stamp_label(&mut b, 0, 0, "7.0s", 1);
        assert_ne!(a, b);
    }

    #[test]
    fn test_label_clipped_at_canvas_edge() {
        let mut canvas = RgbImage::new(10, 10);
        stamp_label(&mut canvas, 5, 5, "123.4s", 2);
        assert!(white_pixels(&canvas) > 0);
    }
}
