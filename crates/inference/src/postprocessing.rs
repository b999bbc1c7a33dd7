use ab_glyph::FontVec;
use image::DynamicImage;
use model::Detections;
use serde::{Deserialize, Serialize};

use crate::error::InferenceError;
use crate::labels::LabelMap;
use crate::rendering;

/// Keeps only detections scoring at or above `threshold`.
///
/// The three arrays move together, so the kept entries stay aligned.
pub fn filter_by_score(detections: &Detections, threshold: f32) -> Detections {
    let mut kept = Detections::default();
    for i in 0..detections.len() {
        if detections.scores[i] >= threshold {
            kept.boxes.push(detections.boxes[i]);
            kept.labels.push(detections.labels[i]);
            kept.scores.push(detections.scores[i]);
        }
    }
    kept
}

/// Final per-image result: named detections plus the annotated image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedDetections {
    pub boxes: Vec<[f32; 4]>,
    pub labels: Vec<String>,
    pub scores: Vec<f32>,
    pub image_base64: String,
}

/// Turns raw detector output into a response payload: threshold
/// filter, label names, box rendering, PNG encoding.
pub struct PostProcessor {
    labels: LabelMap,
    font: Option<FontVec>,
}

impl PostProcessor {
    pub fn new(labels: LabelMap, font: Option<FontVec>) -> Self {
        if font.is_none() {
            tracing::warn!("no label font available, boxes will render without text");
        }
        Self { labels, font }
    }

    pub fn labels(&self) -> &LabelMap {
        &self.labels
    }

    #[tracing::instrument(skip(self, image, detections))]
    pub fn process(
        &self,
        image: &DynamicImage,
        detections: &Detections,
        threshold: f32,
    ) -> Result<AnnotatedDetections, InferenceError> {
        let kept = filter_by_score(detections, threshold);
        let names: Vec<String> = kept.labels.iter().map(|&id| self.labels.name(id)).collect();

        let annotated = rendering::annotate(image, &kept, &names, self.font.as_ref());
        let image_base64 = rendering::to_png_base64(&annotated)?;

        tracing::debug!(
            total = detections.len(),
            kept = kept.len(),
            threshold,
            "detections post-processed"
        );

        Ok(AnnotatedDetections {
            boxes: kept.boxes,
            labels: names,
            scores: kept.scores,
            image_base64,
        })
    }
}
