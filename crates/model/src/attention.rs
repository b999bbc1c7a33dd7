//! Channel attention (squeeze and excitation) gate.
//!
//! The gate averages each channel down to a scalar, pushes the vector
//! through a bias-free bottleneck pair of fully connected layers, and
//! multiplies every channel by its sigmoid excitation.

use ndarray::{Array2, Array3, Axis};

use crate::ops;

/// Bottleneck ratio used when no other value is configured.
pub const DEFAULT_REDUCTION: usize = 16;

#[derive(Debug, Clone)]
pub(crate) struct AttentionParams {
    /// `[channels / reduction, channels]`
    pub(crate) reduce: Array2<f32>,
    /// `[channels, channels / reduction]`
    pub(crate) expand: Array2<f32>,
}

impl AttentionParams {
    pub(crate) fn apply(&self, mut x: Array3<f32>) -> Array3<f32> {
        let squeezed = ops::global_avg_pool(x.view());
        let mut hidden = ops::linear(&squeezed, &self.reduce, None);
        hidden.mapv_inplace(|v| v.max(0.0));
        let mut gates = ops::linear(&hidden, &self.expand, None);
        gates.mapv_inplace(ops::sigmoid);
        for (mut plane, &gate) in x.axis_iter_mut(Axis(0)).zip(gates.iter()) {
            plane.mapv_inplace(|v| v * gate);
        }
        x
    }
}
