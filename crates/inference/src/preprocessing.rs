use fast_image_resize::{FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer, images::Image};
use image::DynamicImage;
use ndarray::Array3;

use crate::error::InferenceError;

/// Decodes an uploaded image from its raw bytes, any format the codec
/// set understands.
pub fn load_image(bytes: &[u8]) -> Result<DynamicImage, InferenceError> {
    Ok(image::load_from_memory(bytes)?)
}

/// Mapping from model input coordinates back to source pixels.
///
/// Both axes are stretched independently to the square input, so the
/// scales differ for non-square sources. Offsets stay zero here; they
/// exist so a padded resize can reuse the same inverse mapping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordTransform {
    pub orig_width: u32,
    pub orig_height: u32,
    pub scale_x: f32,
    pub scale_y: f32,
    pub offset_x: f32,
    pub offset_y: f32,
}

impl CoordTransform {
    /// Maps an `[x1, y1, x2, y2]` box from input space to source
    /// space, clamped to the source bounds.
    pub fn to_source(&self, bbox: [f32; 4]) -> [f32; 4] {
        let x1 = ((bbox[0] - self.offset_x) / self.scale_x)
            .max(0.0)
            .min(self.orig_width as f32);
        let y1 = ((bbox[1] - self.offset_y) / self.scale_y)
            .max(0.0)
            .min(self.orig_height as f32);
        let x2 = ((bbox[2] - self.offset_x) / self.scale_x)
            .max(0.0)
            .min(self.orig_width as f32);
        let y2 = ((bbox[3] - self.offset_y) / self.scale_y)
            .max(0.0)
            .min(self.orig_height as f32);
        [x1, y1, x2, y2]
    }
}

pub struct PreProcessor {
    input_size: u32,
}

impl PreProcessor {
    pub fn new(input_size: usize) -> Self {
        Self {
            input_size: input_size as u32,
        }
    }

    /// Resizes to the square model input and lays the pixels out as a
    /// `[3, size, size]` tensor in unit range. Pixel scale only; the
    /// detector applies its own channel normalization.
    pub fn process(
        &self,
        image: &DynamicImage,
    ) -> Result<(Array3<f32>, CoordTransform), InferenceError> {
        let rgb = image.to_rgb8();
        let (width, height) = rgb.dimensions();
        let mut raw = rgb.into_raw();

        let resized = self.resize(&mut raw, width, height)?;
        let input = self.normalize(&resized)?;

        let transform = CoordTransform {
            orig_width: width,
            orig_height: height,
            scale_x: self.input_size as f32 / width as f32,
            scale_y: self.input_size as f32 / height as f32,
            offset_x: 0.0,
            offset_y: 0.0,
        };

        Ok((input, transform))
    }

    fn resize(
        &self,
        raw: &mut [u8],
        width: u32,
        height: u32,
    ) -> Result<Image<'static>, InferenceError> {
        let src = Image::from_slice_u8(width, height, raw, PixelType::U8x3)?;
        let mut resized = Image::new(self.input_size, self.input_size, PixelType::U8x3);

        Resizer::new().resize(
            &src,
            &mut resized,
            &ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Bilinear)),
        )?;

        Ok(resized)
    }

    fn normalize(&self, image: &Image) -> Result<Array3<f32>, InferenceError> {
        let size = self.input_size as usize;
        let spatial = size * size;

        let mut output = vec![0.0f32; 3 * spatial];
        let buf = image.buffer();

        for (i, px) in buf.chunks_exact(3).enumerate() {
            output[i] = px[0] as f32 / 255.0;
            output[i + spatial] = px[1] as f32 / 255.0;
            output[i + 2 * spatial] = px[2] as f32 / 255.0;
        }

        Ok(Array3::from_shape_vec((3, size, size), output)?)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use image::{ImageFormat, Rgb, RgbImage};

    use super::*;

    fn solid_image(width: u32, height: u32, color: [u8; 3]) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(color)))
    }

    /// Test tensor layout and unit-range scaling on a solid color.
    ///
    /// A constant image survives bilinear resampling unchanged, so
    /// every output position must carry the exact channel values.
    #[test]
    fn test_tensor_shape_and_unit_scaling() {
        let preprocessor = PreProcessor::new(8);
        let image = solid_image(4, 6, [51, 102, 255]);

        let (input, _) = preprocessor.process(&image).unwrap();

        assert_eq!(input.shape(), &[3, 8, 8]);
        for y in 0..8 {
            for x in 0..8 {
                assert!(
                    (input[[0, y, x]] - 0.2).abs() < 1e-2,
                    "R should be 51/255 at ({y}, {x}), got {}",
                    input[[0, y, x]]
                );
                assert!((input[[1, y, x]] - 0.4).abs() < 1e-2);
                assert!((input[[2, y, x]] - 1.0).abs() < 1e-2);
            }
        }
    }

    /// Test that both axes stretch independently to the square input.
    #[test]
    fn test_non_square_input_stretches_both_axes() {
        let preprocessor = PreProcessor::new(300);
        let image = solid_image(800, 600, [128, 128, 128]);

        let (input, transform) = preprocessor.process(&image).unwrap();

        assert_eq!(input.shape(), &[3, 300, 300]);
        assert_eq!(transform.scale_x, 0.375, "X scale should be 300/800");
        assert_eq!(transform.scale_y, 0.5, "Y scale should be 300/600");
        assert_eq!(transform.offset_x, 0.0, "Stretch resize has no padding");
        assert_eq!(transform.offset_y, 0.0, "Stretch resize has no padding");
    }

    /// Test the inverse mapping from input space to source space.
    ///
    /// 600x300 source with 300 input: x halves on the way in, so it
    /// doubles on the way back; y is untouched.
    #[test]
    fn test_transform_maps_input_back_to_source() {
        let transform = CoordTransform {
            orig_width: 600,
            orig_height: 300,
            scale_x: 0.5,
            scale_y: 1.0,
            offset_x: 0.0,
            offset_y: 0.0,
        };

        let mapped = transform.to_source([150.0, 150.0, 300.0, 200.0]);

        assert_eq!(mapped, [300.0, 150.0, 600.0, 200.0]);
    }

    /// Test that mapped boxes clamp to the source bounds.
    #[test]
    fn test_transform_clamps_to_source_bounds() {
        let transform = CoordTransform {
            orig_width: 400,
            orig_height: 200,
            scale_x: 0.75,
            scale_y: 1.5,
            offset_x: 0.0,
            offset_y: 0.0,
        };

        let mapped = transform.to_source([-10.0, -5.0, 400.0, 400.0]);

        assert_eq!(mapped[0], 0.0, "x1 should clamp to the left edge");
        assert_eq!(mapped[1], 0.0, "y1 should clamp to the top edge");
        assert_eq!(mapped[2], 400.0, "x2 should clamp to the source width");
        assert_eq!(mapped[3], 200.0, "y2 should clamp to the source height");
    }

    #[test]
    fn test_load_image_decodes_png_bytes() {
        let mut bytes = Cursor::new(Vec::new());
        solid_image(5, 7, [10, 20, 30])
            .write_to(&mut bytes, ImageFormat::Png)
            .unwrap();

        let decoded = load_image(&bytes.into_inner()).unwrap();

        assert_eq!(decoded.width(), 5);
        assert_eq!(decoded.height(), 7);
    }

    #[test]
    fn test_load_image_rejects_garbage() {
        let err = load_image(b"definitely not an image").unwrap_err();
        assert!(matches!(err, InferenceError::Image(_)));
    }
}
