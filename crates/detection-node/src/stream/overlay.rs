//! Label overlay drawn onto streamed frames.
//!
//! Decodes the JPEG, paints a banner with the current classification using a
//! small built-in 5x7 bitmap font, and re-encodes. Kept deliberately simple;
//! viewers that want clean frames disable the overlay.

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, Rgb, RgbImage};

use common::frames::ClassificationResult;

const BANNER_COLOR: Rgb<u8> = Rgb([16, 16, 20]);
const TEXT_COLOR: Rgb<u8> = Rgb([240, 240, 240]);
const SCALE: u32 = 2;
const PAD: u32 = 6;

/// Re-encodes the frame with a classification banner. `None` renders the
/// placeholder shown before the first classifier response.
pub fn annotate(
    jpeg: &[u8],
    result: Option<&ClassificationResult>,
) -> Result<Bytes, image::ImageError> {
    let mut image = image::load_from_memory(jpeg)?.to_rgb8();

    let text = match result {
        Some(r) => format!("{} {:.0}%", r.label, f64::from(r.confidence) * 100.0),
        None => "PREDICTING".to_string(),
    };

    let banner_height = 7 * SCALE + 2 * PAD;
    let banner_width = image.width();
    fill_rect(&mut image, 0, 0, banner_width, banner_height, BANNER_COLOR);
    draw_text(&mut image, PAD + 2, PAD, &text, SCALE, TEXT_COLOR);

    let (width, height) = image.dimensions();
    let mut out = Vec::with_capacity(jpeg.len() + 4096);
    JpegEncoder::new_with_quality(&mut out, 80).encode(
        image.as_raw(),
        width,
        height,
        ExtendedColorType::Rgb8,
    )?;
    Ok(Bytes::from(out))
}

fn fill_rect(image: &mut RgbImage, x: u32, y: u32, w: u32, h: u32, color: Rgb<u8>) {
    let x_end = (x + w).min(image.width());
    let y_end = (y + h).min(image.height());
    for py in y..y_end {
        for px in x..x_end {
            image.put_pixel(px, py, color);
        }
    }
}

fn draw_text(image: &mut RgbImage, x: u32, y: u32, text: &str, scale: u32, color: Rgb<u8>) {
    let mut cursor = x;
    for ch in text.chars().flat_map(|c| c.to_uppercase()) {
        if let Some(glyph) = glyph_bits(ch) {
            for (row, pattern) in glyph.iter().enumerate() {
                for col in 0..5u32 {
                    if (pattern >> (4 - col)) & 1 == 1 {
                        fill_rect(
                            image,
                            cursor + col * scale,
                            y + row as u32 * scale,
                            scale,
                            scale,
                            color,
                        );
                    }
                }
            }
        }
        cursor += 6 * scale;
        if cursor >= image.width() {
            break;
        }
    }
}

/// 5x7 glyphs, one byte per row, bit 4 is the leftmost column.
fn glyph_bits(ch: char) -> Option<[u8; 7]> {
    let glyph = match ch {
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
        'N' => [0b10001, 0b11001, 0b10101, 0b10011, 0b10001, 0b10001, 0b10001],
        'O' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'P' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10000, 0b10000, 0b10000],
        'Q' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10101, 0b10010, 0b01101],
        'R' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10100, 0b10010, 0b10001],
        'S' => [0b01111, 0b10000, 0b10000, 0b01110, 0b00001, 0b00001, 0b11110],
        'T' => [0b11111, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100],
        'U' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'V' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01010, 0b00100],
        'W' => [0b10001, 0b10001, 0b10001, 0b10101, 0b10101, 0b11011, 0b10001],
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
        '%' => [0b11001, 0b11010, 0b00010, 0b00100, 0b01000, 0b01011, 0b10011],
        '.' => [0b00000, 0b00000, 0b00000, 0b00000, 0b00000, 0b01100, 0b01100],
        '-' => [0b00000, 0b00000, 0b00000, 0b01110, 0b00000, 0b00000, 0b00000],
        _ => return None,
    };
    Some(glyph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn tiny_jpeg() -> Vec<u8> {
        let image = RgbImage::from_pixel(120, 90, Rgb([90, 90, 90]));
        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, 80)
            .encode(image.as_raw(), 120, 90, ExtendedColorType::Rgb8)
            .unwrap();
        jpeg
    }

    #[test]
    fn test_annotate_produces_decodable_jpeg() {
        let result = ClassificationResult {
            camera_id: "cam-1".to_string(),
            label: "Assault".to_string(),
            confidence: 0.91,
            captured_at: Utc::now(),
            observed_at: Utc::now(),
        };

        let annotated = annotate(&tiny_jpeg(), Some(&result)).unwrap();
        assert_eq!(&annotated[..2], &[0xFF, 0xD8]);

        let decoded = image::load_from_memory(&annotated).unwrap().to_rgb8();
        assert_eq!(decoded.dimensions(), (120, 90));
        // the banner is painted over the top rows
        assert_eq!(*decoded.get_pixel(1, 1), BANNER_COLOR);
    }

    #[test]
    fn test_annotate_without_result_renders_placeholder() {
        assert!(annotate(&tiny_jpeg(), None).is_ok());
    }

    #[test]
    fn test_annotate_rejects_garbage() {
        assert!(annotate(&[0x00, 0x01, 0x02], None).is_err());
    }

    #[test]
    fn test_glyphs_cover_label_characters() {
        for ch in "ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789%.-".chars() {
            assert!(glyph_bits(ch).is_some(), "missing glyph for {}", ch);
        }
        assert!(glyph_bits(' ').is_none());
    }
}
