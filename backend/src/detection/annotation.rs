use image::{DynamicImage, Rgba, RgbaImage};

const BOX_COLOR: Rgba<u8> = Rgba([0, 255, 0, 255]);
const LABEL_BACKGROUND: Rgba<u8> = Rgba([0, 0, 0, 255]);
const GLYPH_WIDTH: i32 = 6;
const GLYPH_HEIGHT: i32 = 7;

/// Returns a copy of `image` with `bbox` outlined and `NN%` written above it.
pub fn annotate(image: &DynamicImage, bbox: [f32; 4], confidence: u8) -> DynamicImage {
    let mut canvas = image.to_rgba8();
    if canvas.width() == 0 || canvas.height() == 0 {
        return DynamicImage::ImageRgba8(canvas);
    }

    // The model's coordinates are untrusted: clamp to the frame before casting.
    let max_x = (canvas.width() - 1) as f32;
    let max_y = (canvas.height() - 1) as f32;
    let [x1, x2] = [bbox[0], bbox[2]].map(|v| clamp_coord(v, max_x));
    let [y1, y2] = [bbox[1], bbox[3]].map(|v| clamp_coord(v, max_y));
    let (left, right) = (x1.min(x2), x1.max(x2));
    let (top, bottom) = (y1.min(y2), y1.max(y2));

    // Two pixel wide outline.
    draw_rectangle(&mut canvas, left, top, right, bottom, BOX_COLOR);
    draw_rectangle(
        &mut canvas,
        left.saturating_add(1),
        top.saturating_add(1),
        right.saturating_sub(1),
        bottom.saturating_sub(1),
        BOX_COLOR,
    );

    let text = format!("{}%", confidence);
    let text_width = text.chars().count() as i32 * GLYPH_WIDTH;
    let above = top.saturating_sub(GLYPH_HEIGHT + 3);
    let label_y = if above >= 0 { above } else { top.saturating_add(2) };
    fill_rect(
        &mut canvas,
        left,
        label_y,
        left.saturating_add(text_width + 2),
        label_y.saturating_add(GLYPH_HEIGHT + 1),
        LABEL_BACKGROUND,
    );
    draw_text(
        &mut canvas,
        left.saturating_add(2),
        label_y.saturating_add(1),
        &text,
        BOX_COLOR,
    );

    DynamicImage::ImageRgba8(canvas)
}

fn clamp_coord(value: f32, max: f32) -> i32 {
    if value.is_nan() {
        return 0;
    }
    value.clamp(0.0, max).round() as i32
}

fn put(image: &mut RgbaImage, x: i32, y: i32, color: Rgba<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < image.width() && (y as u32) < image.height() {
        image.put_pixel(x as u32, y as u32, color);
    }
}

fn draw_rectangle(
    image: &mut RgbaImage,
    left: i32,
    top: i32,
    right: i32,
    bottom: i32,
    color: Rgba<u8>,
) {
    if right < left || bottom < top {
        return;
    }
    for x in left..=right {
        put(image, x, top, color);
        put(image, x, bottom, color);
    }
    for y in top..=bottom {
        put(image, left, y, color);
        put(image, right, y, color);
    }
}

fn fill_rect(
    image: &mut RgbaImage,
    left: i32,
    top: i32,
    right: i32,
    bottom: i32,
    color: Rgba<u8>,
) {
    let width = image.width() as i32;
    let height = image.height() as i32;
    for y in top.max(0)..=bottom.min(height - 1) {
        for x in left.max(0)..=right.min(width - 1) {
            image.put_pixel(x as u32, y as u32, color);
        }
    }
}

fn draw_text(image: &mut RgbaImage, mut x: i32, y: i32, text: &str, color: Rgba<u8>) {
    for ch in text.chars() {
        if let Some(glyph) = glyph_bits(ch) {
            for (row, pattern) in glyph.iter().enumerate() {
                for col in 0..5 {
                    if (pattern >> (4 - col)) & 1 == 1 {
                        put(image, x.saturating_add(col), y + row as i32, color);
                    }
                }
            }
        }
        x = x.saturating_add(GLYPH_WIDTH);
    }
}

fn glyph_bits(ch: char) -> Option<[u8; 7]> {
    match ch {
        '0' => Some([0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110]),
        '1' => Some([0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110]),
        '2' => Some([0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111]),
        '3' => Some([0b11110, 0b00001, 0b00001, 0b01110, 0b00001, 0b00001, 0b11110]),
        '4' => Some([0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010]),
        '5' => Some([0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110]),
        '6' => Some([0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110]),
        '7' => Some([0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000]),
        '8' => Some([0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110]),
        '9' => Some([0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100]),
        '%' => Some([0b11001, 0b11010, 0b00010, 0b00100, 0b01000, 0b01011, 0b10011]),
        _ => None,
    }
}
