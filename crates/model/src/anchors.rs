//! Default box layout over a pyramid of feature maps.

use ndarray::Array2;

/// Anchor geometry for one input size. `scales` carries one more entry
/// than there are levels; level `k` pairs `scales[k]` with
/// `scales[k + 1]` for its intermediate square box.
#[derive(Debug, Clone, PartialEq)]
pub struct AnchorConfig {
    pub image_size: usize,
    pub feature_sizes: Vec<usize>,
    pub steps: Vec<usize>,
    pub scales: Vec<f32>,
    pub aspect_ratios: Vec<Vec<f32>>,
}

impl AnchorConfig {
    pub fn ssd300() -> Self {
        AnchorConfig {
            image_size: 300,
            feature_sizes: vec![38, 19, 10, 5, 3, 1],
            steps: vec![8, 16, 32, 64, 100, 300],
            scales: vec![0.07, 0.15, 0.33, 0.51, 0.69, 0.87, 1.05],
            aspect_ratios: vec![
                vec![2.0],
                vec![2.0, 3.0],
                vec![2.0, 3.0],
                vec![2.0, 3.0],
                vec![2.0],
                vec![2.0],
            ],
        }
    }

    /// Boxes per cell at each level: the two squares plus a landscape
    /// and portrait box per aspect ratio.
    pub fn anchors_per_cell(&self) -> Vec<usize> {
        self.aspect_ratios.iter().map(|r| 2 + 2 * r.len()).collect()
    }

    pub fn total_anchors(&self) -> usize {
        self.feature_sizes
            .iter()
            .zip(self.anchors_per_cell())
            .map(|(f, a)| f * f * a)
            .sum()
    }

    /// Corner-form boxes in input pixels, one row per anchor, ordered
    /// level by level, cells row-major, the shapes of a cell adjacent.
    pub fn generate(&self) -> Array2<f32> {
        let size = self.image_size as f32;
        let mut out = Array2::<f32>::zeros((self.total_anchors(), 4));
        let mut row = 0;
        for (level, &extent) in self.feature_sizes.iter().enumerate() {
            let pairs = self.wh_pairs(level);
            let cells = size / self.steps[level] as f32;
            for y in 0..extent {
                let cy = (y as f32 + 0.5) / cells;
                for x in 0..extent {
                    let cx = (x as f32 + 0.5) / cells;
                    for &(w, h) in &pairs {
                        out[[row, 0]] = (cx - 0.5 * w) * size;
                        out[[row, 1]] = (cy - 0.5 * h) * size;
                        out[[row, 2]] = (cx + 0.5 * w) * size;
                        out[[row, 3]] = (cy + 0.5 * h) * size;
                        row += 1;
                    }
                }
            }
        }
        out
    }

    /// Normalized (width, height) pairs for one level, clamped to the
    /// input square.
    fn wh_pairs(&self, level: usize) -> Vec<(f32, f32)> {
        let s_k = self.scales[level];
        let s_prime = (self.scales[level] * self.scales[level + 1]).sqrt();
        let mut pairs = vec![(s_k, s_k), (s_prime, s_prime)];
        for &ratio in &self.aspect_ratios[level] {
            let sq = ratio.sqrt();
            pairs.push((s_k * sq, s_k / sq));
            pairs.push((s_k / sq, s_k * sq));
        }
        for pair in &mut pairs {
            pair.0 = pair.0.min(1.0);
            pair.1 = pair.1.min(1.0);
        }
        pairs
    }
}
