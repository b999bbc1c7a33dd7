//! Turning raw head output into detections: softmax over the class
//! columns, anchor-relative box decoding, then class-wise non-maximum
//! suppression with a global cap.

use ndarray::Array2;

/// Detections for one image as parallel arrays, ordered by descending
/// confidence. Labels are 1-based; the background column never appears.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Detections {
    /// Corner boxes `[x1, y1, x2, y2]`.
    pub boxes: Vec<[f32; 4]>,
    pub labels: Vec<u32>,
    pub scores: Vec<f32>,
}

impl Detections {
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    fn truncate(&mut self, n: usize) {
        self.boxes.truncate(n);
        self.labels.truncate(n);
        self.scores.truncate(n);
    }
}

/// Thresholds and limits applied while selecting detections.
#[derive(Debug, Clone)]
pub struct DecodeConfig {
    /// Candidates at or below this confidence never enter suppression.
    pub score_floor: f32,
    pub topk_per_class: usize,
    pub nms_iou: f32,
    pub max_detections: usize,
    /// Variance weights for the (cx, cy, w, h) regression offsets.
    pub box_weights: [f32; 4],
}

impl Default for DecodeConfig {
    fn default() -> Self {
        DecodeConfig {
            score_floor: 0.01,
            topk_per_class: 400,
            nms_iou: 0.45,
            max_detections: 200,
            box_weights: [10.0, 10.0, 5.0, 5.0],
        }
    }
}

/// Row-wise softmax, stabilized against large logits.
pub(crate) fn softmax_rows(mut logits: Array2<f32>) -> Array2<f32> {
    for mut row in logits.rows_mut() {
        let max = row.fold(f32::NEG_INFINITY, |a, &b| a.max(b));
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        row.mapv_inplace(|v| v / sum);
    }
    logits
}

/// Apply regression offsets to anchors, returning corner boxes clamped
/// to the input square.
pub(crate) fn decode_boxes(
    regression: &Array2<f32>,
    anchors: &Array2<f32>,
    weights: [f32; 4],
    bound: f32,
) -> Array2<f32> {
    // keeps exp() within sane range for wild regressions
    let dwh_limit = (1000.0f32 / 16.0).ln();
    let mut out = Array2::<f32>::zeros(regression.raw_dim());
    for (i, (reg, anchor)) in regression
        .rows()
        .into_iter()
        .zip(anchors.rows())
        .enumerate()
    {
        let aw = anchor[2] - anchor[0];
        let ah = anchor[3] - anchor[1];
        let acx = anchor[0] + 0.5 * aw;
        let acy = anchor[1] + 0.5 * ah;

        let dx = reg[0] / weights[0];
        let dy = reg[1] / weights[1];
        let dw = (reg[2] / weights[2]).min(dwh_limit);
        let dh = (reg[3] / weights[3]).min(dwh_limit);

        let cx = dx * aw + acx;
        let cy = dy * ah + acy;
        let w = dw.exp() * aw;
        let h = dh.exp() * ah;

        out[[i, 0]] = (cx - 0.5 * w).clamp(0.0, bound);
        out[[i, 1]] = (cy - 0.5 * h).clamp(0.0, bound);
        out[[i, 2]] = (cx + 0.5 * w).clamp(0.0, bound);
        out[[i, 3]] = (cy + 0.5 * h).clamp(0.0, bound);
    }
    out
}

pub(crate) fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let ix = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
    let iy = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
    let inter = ix * iy;
    let area_a = (a[2] - a[0]) * (a[3] - a[1]);
    let area_b = (b[2] - b[0]) * (b[3] - b[1]);
    let union = area_a + area_b - inter;
    if union <= 0.0 { 0.0 } else { inter / union }
}

/// Select final detections from per-anchor class probabilities and
/// decoded boxes.
///
/// Per foreground class: drop scores at or below the floor, keep the
/// top candidates, then suppress within the class. The merged survivors
/// come back sorted by descending score and capped.
pub(crate) fn select(scores: &Array2<f32>, boxes: &Array2<f32>, cfg: &DecodeConfig) -> Detections {
    let num_classes = scores.ncols();
    let mut candidates: Vec<(f32, u32, [f32; 4])> = Vec::new();
    for class in 1..num_classes {
        let mut class_hits: Vec<(f32, usize)> = scores
            .column(class)
            .iter()
            .enumerate()
            .filter(|&(_, &s)| s > cfg.score_floor)
            .map(|(i, &s)| (s, i))
            .collect();
        class_hits.sort_by(|a, b| b.0.total_cmp(&a.0));
        class_hits.truncate(cfg.topk_per_class);
        for (score, idx) in class_hits {
            let row = boxes.row(idx);
            candidates.push((score, class as u32, [row[0], row[1], row[2], row[3]]));
        }
    }

    candidates.sort_by(|a, b| b.0.total_cmp(&a.0));

    let mut out = Detections::default();
    'candidates: for (score, label, bbox) in candidates {
        for (kept_label, kept_box) in out.labels.iter().zip(out.boxes.iter()) {
            if *kept_label == label && iou(kept_box, &bbox) > cfg.nms_iou {
                continue 'candidates;
            }
        }
        out.boxes.push(bbox);
        out.labels.push(label);
        out.scores.push(score);
    }
    out.truncate(cfg.max_detections);
    out
}
