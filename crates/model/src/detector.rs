//! The assembled detector: bound weights plus everything needed to turn
//! a normalized image tensor into scored boxes.

use std::path::Path;

use ndarray::{Array3, ArrayView3, Axis};
use tracing::info;

use crate::anchors::AnchorConfig;
use crate::assembly::{Architecture, INPUT_CHANNELS};
use crate::backbone::BoundBackbone;
use crate::checkpoint;
use crate::decode::{self, DecodeConfig, Detections};
use crate::device::ComputeDevice;
use crate::error::ModelError;
use crate::head::BoundHead;

/// The trunk was trained on mean-subtracted byte-scale values; inputs
/// arrive scaled to [0, 1] and are shifted here.
const INPUT_MEAN: [f32; 3] = [0.48235, 0.45882, 0.40784];
const INPUT_SCALE: f32 = 255.0;

#[derive(Debug)]
pub struct Detector {
    backbone: BoundBackbone,
    head: BoundHead,
    anchors: ndarray::Array2<f32>,
    input_size: usize,
    decode: DecodeConfig,
    pool: rayon::ThreadPool,
}

impl Detector {
    /// Bind `checkpoint` to `arch` and prepare for inference.
    ///
    /// Fails when the checkpoint and the architecture disagree in any
    /// way: missing or surplus tensors, wrong shapes, wrong dtypes. Also
    /// fails when the anchor layout does not line up with the feature
    /// maps the backbone actually produces.
    pub fn load(
        arch: &Architecture,
        anchor_cfg: &AnchorConfig,
        checkpoint_path: &Path,
        device: ComputeDevice,
        decode: DecodeConfig,
    ) -> Result<Self, ModelError> {
        arch.validate()?;
        let spatial = arch.backbone.tap_spatial(anchor_cfg.image_size);
        if spatial != anchor_cfg.feature_sizes {
            return Err(ModelError::Architecture(format!(
                "backbone produces {spatial:?} maps but the anchor layout expects {:?}",
                anchor_cfg.feature_sizes
            )));
        }
        if arch.head.anchors_per_cell != anchor_cfg.anchors_per_cell() {
            return Err(ModelError::Architecture(format!(
                "head predicts {:?} boxes per cell but the anchor layout has {:?}",
                arch.head.anchors_per_cell,
                anchor_cfg.anchors_per_cell()
            )));
        }

        let (backbone, head) = checkpoint::load(arch, checkpoint_path)?;
        let anchors = anchor_cfg.generate();
        let pool = device.build_pool()?;
        info!(
            checkpoint = %checkpoint_path.display(),
            anchors = anchors.nrows(),
            classes = head.num_classes,
            device = %device,
            "detector ready"
        );

        Ok(Detector {
            backbone,
            head,
            anchors,
            input_size: anchor_cfg.image_size,
            decode,
            pool,
        })
    }

    /// Side length of the square input tensor.
    pub fn input_size(&self) -> usize {
        self.input_size
    }

    /// Real classes plus the background column.
    pub fn num_classes(&self) -> usize {
        self.head.num_classes
    }

    /// Run the network over one `[3, S, S]` tensor scaled to [0, 1].
    ///
    /// Returns detections in input-pixel coordinates, sorted by
    /// descending confidence, already deduplicated and capped.
    pub fn detect(&self, input: ArrayView3<f32>) -> Result<Detections, ModelError> {
        let dim = input.dim();
        let expected = [INPUT_CHANNELS, self.input_size, self.input_size];
        if [dim.0, dim.1, dim.2] != expected {
            return Err(ModelError::InputShape {
                found: vec![dim.0, dim.1, dim.2],
                expected,
            });
        }

        let normalized = normalize(input);
        let (logits, regression) = self.pool.install(|| {
            let taps = self.backbone.forward(normalized);
            self.head.forward(&taps)
        })?;
        if logits.nrows() != self.anchors.nrows() {
            return Err(ModelError::AnchorMismatch {
                found: logits.nrows(),
                expected: self.anchors.nrows(),
            });
        }

        let scores = decode::softmax_rows(logits);
        let boxes = decode::decode_boxes(
            &regression,
            &self.anchors,
            self.decode.box_weights,
            self.input_size as f32,
        );
        Ok(decode::select(&scores, &boxes, &self.decode))
    }
}

fn normalize(input: ArrayView3<f32>) -> Array3<f32> {
    let mut out = input.to_owned();
    for (c, mut plane) in out.axis_iter_mut(Axis(0)).enumerate() {
        let mean = INPUT_MEAN[c];
        plane.mapv_inplace(|v| (v - mean) * INPUT_SCALE);
    }
    out
}
