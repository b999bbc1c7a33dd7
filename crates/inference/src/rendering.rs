use std::fs;
use std::io::Cursor;
use std::path::Path;

use ab_glyph::{FontVec, PxScale};
use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use model::Detections;

use crate::error::InferenceError;

const BOX_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const BOX_THICKNESS: i32 = 2;
const LABEL_SCALE: f32 = 14.0;
const LABEL_OFFSET: i32 = 10;

/// Loads a TrueType or OpenType face from disk.
pub fn load_font(path: &Path) -> Result<FontVec, InferenceError> {
    let bytes = fs::read(path).map_err(|source| InferenceError::FontRead {
        path: path.to_path_buf(),
        source,
    })?;
    FontVec::try_from_vec(bytes).map_err(|_| InferenceError::FontParse {
        path: path.to_path_buf(),
    })
}

const SYSTEM_FONTS: [&str; 4] = [
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu-sans-fonts/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
];

/// Tries well-known system font locations, first readable face wins.
pub fn probe_system_font() -> Option<FontVec> {
    for candidate in SYSTEM_FONTS {
        let path = Path::new(candidate);
        if let Ok(font) = load_font(path) {
            tracing::debug!(path = candidate, "using system font for labels");
            return Some(font);
        }
    }
    None
}

/// Draws detection boxes and score labels onto a copy of `image`.
///
/// The source image is untouched. Without a font the boxes still
/// render and only the text is skipped.
pub fn annotate(
    image: &DynamicImage,
    detections: &Detections,
    names: &[String],
    font: Option<&FontVec>,
) -> RgbImage {
    let mut canvas = image.to_rgb8();

    for i in 0..detections.len() {
        let bbox = detections.boxes[i];
        draw_box(&mut canvas, bbox);

        if let Some(font) = font {
            let text = format!("{} {:.2}", names[i], detections.scores[i]);
            let x = bbox[0].round() as i32;
            let y = (bbox[1].round() as i32 - LABEL_OFFSET).max(0);
            draw_text_mut(
                &mut canvas,
                BOX_COLOR,
                x,
                y,
                PxScale::from(LABEL_SCALE),
                font,
                &text,
            );
        }
    }

    canvas
}

fn draw_box(canvas: &mut RgbImage, bbox: [f32; 4]) {
    for inset in 0..BOX_THICKNESS {
        let x1 = bbox[0].round() as i32 + inset;
        let y1 = bbox[1].round() as i32 + inset;
        let x2 = bbox[2].round() as i32 - inset;
        let y2 = bbox[3].round() as i32 - inset;
        if x2 <= x1 || y2 <= y1 {
            break;
        }
        let rect = Rect::at(x1, y1).of_size((x2 - x1) as u32, (y2 - y1) as u32);
        draw_hollow_rect_mut(canvas, rect, BOX_COLOR);
    }
}

/// Encodes to an in-memory PNG, then to standard base64.
pub fn to_png_base64(image: &RgbImage) -> Result<String, InferenceError> {
    let mut cursor = Cursor::new(Vec::new());
    image.write_to(&mut cursor, ImageFormat::Png)?;
    Ok(B64.encode(cursor.into_inner()))
}
