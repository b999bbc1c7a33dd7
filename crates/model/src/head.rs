//! Per-tap prediction convolutions.
//!
//! Each pyramid level gets one classification conv and one box
//! regression conv, both 3x3 with unit padding. Their maps flatten to
//! one row per anchor box, cells in row-major order with the anchors of
//! a cell adjacent.

use ndarray::{Array1, Array2, Array3, Array4};

use crate::error::ModelError;
use crate::ops;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadSpec {
    /// Real classes plus the background column.
    pub num_classes: usize,
    pub tap_channels: Vec<usize>,
    pub anchors_per_cell: Vec<usize>,
}

impl HeadSpec {
    pub fn ssd300(num_classes: usize) -> Self {
        HeadSpec {
            num_classes,
            tap_channels: vec![512, 1024, 512, 256, 256, 256],
            anchors_per_cell: vec![4, 6, 6, 6, 4, 4],
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct HeadConv {
    pub(crate) weight: Array4<f32>,
    pub(crate) bias: Array1<f32>,
}

#[derive(Debug)]
pub(crate) struct BoundHead {
    pub(crate) num_classes: usize,
    pub(crate) classification: Vec<HeadConv>,
    pub(crate) regression: Vec<HeadConv>,
}

impl BoundHead {
    /// Predict over every tap, returning class logits `[N, K]` and box
    /// offsets `[N, 4]` with rows in anchor order.
    pub(crate) fn forward(
        &self,
        taps: &[Array3<f32>],
    ) -> Result<(Array2<f32>, Array2<f32>), ModelError> {
        let mut logits = Vec::new();
        let mut offsets = Vec::new();
        for (tap, (cls, reg)) in taps
            .iter()
            .zip(self.classification.iter().zip(self.regression.iter()))
        {
            let cls_map = ops::conv2d(tap.view(), &cls.weight, &cls.bias, 1, 1, 1);
            let reg_map = ops::conv2d(tap.view(), &reg.weight, &reg.bias, 1, 1, 1);
            flatten_level(&cls_map, self.num_classes, &mut logits);
            flatten_level(&reg_map, 4, &mut offsets);
        }
        let logits = into_rows(logits, self.num_classes)?;
        let offsets = into_rows(offsets, 4)?;
        Ok((logits, offsets))
    }
}

/// Unroll an `[A * columns, H, W]` map into rows of `columns` values,
/// cell by cell, anchors within a cell in channel-group order.
fn flatten_level(map: &Array3<f32>, columns: usize, out: &mut Vec<f32>) {
    let (ch, h, w) = map.dim();
    let groups = ch / columns;
    out.reserve(h * w * ch);
    for y in 0..h {
        for x in 0..w {
            for a in 0..groups {
                for k in 0..columns {
                    out.push(map[[a * columns + k, y, x]]);
                }
            }
        }
    }
}

fn into_rows(data: Vec<f32>, columns: usize) -> Result<Array2<f32>, ModelError> {
    let rows = data.len() / columns;
    Array2::from_shape_vec((rows, columns), data)
        .map_err(|e| ModelError::Architecture(e.to_string()))
}
