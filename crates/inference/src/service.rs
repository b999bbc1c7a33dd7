use std::sync::Arc;
use std::time::Instant;

use image::DynamicImage;
use model::{Detections, Detector};

use crate::error::InferenceError;
use crate::preprocessing::PreProcessor;

/// Runs the detector over decoded images.
///
/// Shared read-only across request handlers. Every call owns its
/// intermediate buffers, so concurrent callers never contend.
pub struct InferenceService {
    detector: Arc<Detector>,
    preprocessor: PreProcessor,
}

impl InferenceService {
    pub fn new(detector: Arc<Detector>) -> Self {
        let preprocessor = PreProcessor::new(detector.input_size());
        Self {
            detector,
            preprocessor,
        }
    }

    pub fn detector(&self) -> &Detector {
        &self.detector
    }

    /// Detects objects in one image. Boxes come back in source pixel
    /// space, already clamped to the image bounds.
    #[tracing::instrument(skip(self, image))]
    pub fn process_image(&self, image: &DynamicImage) -> Result<Detections, InferenceError> {
        let start = Instant::now();

        let (input, transform) = self.preprocessor.process(image)?;
        let mut detections = self.detector.detect(input.view())?;

        for bbox in &mut detections.boxes {
            *bbox = transform.to_source(*bbox);
        }

        tracing::debug!(
            width = image.width(),
            height = image.height(),
            detections = detections.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "image processed"
        );

        Ok(detections)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use image::{Rgb, RgbImage};
    use model::backbone::Backbone;
    use model::head::HeadSpec;
    use model::layers::LayerSpec;
    use model::{AnchorConfig, Architecture, ComputeDevice, DecodeConfig, Detector};
    use safetensors::tensor::{Dtype, TensorView};
    use tempfile::tempdir;

    use super::*;

    /// Two-tap architecture small enough for a real forward pass.
    fn tiny_architecture() -> Architecture {
        let mut backbone = Backbone {
            features: vec![LayerSpec::conv(3, 4, 3, 1, 1), LayerSpec::Relu],
            extras: vec![vec![LayerSpec::conv(4, 8, 3, 2, 1), LayerSpec::Relu]],
            rescale_channels: 4,
        };
        backbone.attach_attention(2);
        Architecture {
            backbone,
            head: HeadSpec {
                num_classes: 3,
                tap_channels: vec![4, 8],
                anchors_per_cell: vec![2, 2],
            },
        }
    }

    fn tiny_anchors() -> AnchorConfig {
        AnchorConfig {
            image_size: 8,
            feature_sizes: vec![8, 4],
            steps: vec![1, 2],
            scales: vec![0.2, 0.4, 0.6],
            aspect_ratios: vec![vec![], vec![]],
        }
    }

    fn write_zero_checkpoint(path: &Path, arch: &Architecture) {
        let manifest = model::checkpoint::manifest(arch);
        let buffers: Vec<(String, Vec<usize>, Vec<u8>)> = manifest
            .iter()
            .map(|(name, shape)| {
                let len: usize = shape.iter().product();
                (name.clone(), shape.clone(), vec![0u8; len * 4])
            })
            .collect();
        let views: Vec<(&str, TensorView)> = buffers
            .iter()
            .map(|(name, shape, bytes)| {
                (
                    name.as_str(),
                    TensorView::new(Dtype::F32, shape.clone(), bytes).unwrap(),
                )
            })
            .collect();
        fs::write(path, safetensors::serialize(views, &None).unwrap()).unwrap();
    }

    fn tiny_service(dir: &Path) -> InferenceService {
        let path = dir.join("tiny.safetensors");
        let arch = tiny_architecture();
        write_zero_checkpoint(&path, &arch);
        let detector = Detector::load(
            &arch,
            &tiny_anchors(),
            &path,
            ComputeDevice::SingleThread,
            DecodeConfig::default(),
        )
        .unwrap();
        InferenceService::new(Arc::new(detector))
    }

    /// Test end-to-end detection on a non-square source image.
    ///
    /// With an all-zero checkpoint the logits tie, so detections
    /// survive everywhere on the anchor grid. The interesting part is
    /// the coordinate mapping: the 8x8 input space must stretch back
    /// to the 16x24 source.
    #[test]
    fn test_process_image_maps_boxes_to_source_space() {
        let dir = tempdir().unwrap();
        let service = tiny_service(dir.path());
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(16, 24, Rgb([90, 120, 60])));

        let detections = service.process_image(&image).unwrap();

        assert!(!detections.is_empty(), "tied logits should leave detections");
        assert_eq!(detections.boxes.len(), detections.scores.len());
        assert_eq!(detections.boxes.len(), detections.labels.len());
        for bbox in &detections.boxes {
            assert!(bbox[0] >= 0.0 && bbox[2] <= 16.0, "x outside source: {bbox:?}");
            assert!(bbox[1] >= 0.0 && bbox[3] <= 24.0, "y outside source: {bbox:?}");
        }
        assert!(
            detections.boxes.iter().any(|b| b[2] > 8.0 || b[3] > 8.0),
            "boxes should stretch beyond the raw input extent"
        );
    }

    /// Test that one service instance serves concurrent callers.
    #[test]
    fn test_concurrent_callers_get_identical_results() {
        let dir = tempdir().unwrap();
        let service = Arc::new(tiny_service(dir.path()));
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(10, 10, Rgb([200, 30, 30])));

        let mut results = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..2)
                .map(|_| {
                    let service = Arc::clone(&service);
                    let image = image.clone();
                    scope.spawn(move || service.process_image(&image).unwrap())
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .collect::<Vec<_>>()
        });

        let second = results.pop().unwrap();
        let first = results.pop().unwrap();
        assert_eq!(first, second, "detection must be deterministic across callers");
    }
}
