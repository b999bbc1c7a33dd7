//! Feature extraction trunk and coarse pyramid blocks.
//!
//! The trunk is described as descriptor lists: `features` runs at the
//! finest resolution and ends at the first tap, each chain in `extras`
//! continues from there and contributes one more tap. The first tap
//! passes through a channel-wise L2 rescale with a learned gain before
//! it reaches the prediction head.

use ndarray::{Array1, Array3};

use crate::error::ModelError;
use crate::layers::{BoundLayer, LayerSpec, run_chain};
use crate::ops;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backbone {
    pub features: Vec<LayerSpec>,
    pub extras: Vec<Vec<LayerSpec>>,
    /// Channel count of the learned gain on the first tap.
    pub rescale_channels: usize,
}

impl Backbone {
    /// VGG16 trunk truncated before its fourth pool, extended with the
    /// classic pyramid chains down to a 1x1 map.
    pub fn ssd300_vgg16() -> Self {
        use LayerSpec as L;
        let features = vec![
            L::conv(3, 64, 3, 1, 1),
            L::Relu,
            L::conv(64, 64, 3, 1, 1),
            L::Relu,
            L::pool(2, 2),
            L::conv(64, 128, 3, 1, 1),
            L::Relu,
            L::conv(128, 128, 3, 1, 1),
            L::Relu,
            L::pool(2, 2),
            L::conv(128, 256, 3, 1, 1),
            L::Relu,
            L::conv(256, 256, 3, 1, 1),
            L::Relu,
            L::conv(256, 256, 3, 1, 1),
            L::Relu,
            // ceil mode turns the odd 75 extent into 38
            L::pool_ceil(2, 2),
            L::conv(256, 512, 3, 1, 1),
            L::Relu,
            L::conv(512, 512, 3, 1, 1),
            L::Relu,
            L::conv(512, 512, 3, 1, 1),
            L::Relu,
        ];
        let extras = vec![
            // rest of the trunk plus the dilated stand-ins for the old
            // fully connected pair
            vec![
                L::pool(2, 2),
                L::conv(512, 512, 3, 1, 1),
                L::Relu,
                L::conv(512, 512, 3, 1, 1),
                L::Relu,
                L::conv(512, 512, 3, 1, 1),
                L::Relu,
                L::MaxPool2d {
                    kernel: 3,
                    stride: 1,
                    padding: 1,
                    ceil_mode: false,
                },
                L::Conv2d {
                    in_channels: 512,
                    out_channels: 1024,
                    kernel: 3,
                    stride: 1,
                    padding: 6,
                    dilation: 6,
                },
                L::Relu,
                L::conv(1024, 1024, 1, 1, 0),
                L::Relu,
            ],
            vec![
                L::conv(1024, 256, 1, 1, 0),
                L::Relu,
                L::conv(256, 512, 3, 2, 1),
                L::Relu,
            ],
            vec![
                L::conv(512, 128, 1, 1, 0),
                L::Relu,
                L::conv(128, 256, 3, 2, 1),
                L::Relu,
            ],
            vec![
                L::conv(256, 128, 1, 1, 0),
                L::Relu,
                L::conv(128, 256, 3, 1, 0),
                L::Relu,
            ],
            vec![
                L::conv(256, 128, 1, 1, 0),
                L::Relu,
                L::conv(128, 256, 3, 1, 0),
                L::Relu,
            ],
        ];
        Backbone {
            features,
            extras,
            rescale_channels: 512,
        }
    }

    /// Insert a channel attention gate directly after every convolution
    /// in `features`. The pyramid chains are left untouched.
    pub fn attach_attention(&mut self, reduction: usize) {
        let mut rebuilt = Vec::with_capacity(self.features.len() * 2);
        for layer in self.features.drain(..) {
            let gate = match layer {
                LayerSpec::Conv2d { out_channels, .. } => Some(LayerSpec::Attention {
                    channels: out_channels,
                    reduction,
                }),
                _ => None,
            };
            rebuilt.push(layer);
            if let Some(gate) = gate {
                rebuilt.push(gate);
            }
        }
        self.features = rebuilt;
    }

    /// Check channel continuity and return the channel count at every tap.
    pub fn validate(&self, input_channels: usize) -> Result<Vec<usize>, ModelError> {
        let mut channels = input_channels;
        for (i, layer) in self.features.iter().enumerate() {
            channels = layer
                .check(channels)
                .map_err(|e| ModelError::Architecture(format!("features.{i}: {e}")))?;
        }
        if self.rescale_channels != channels {
            return Err(ModelError::Architecture(format!(
                "rescale gain has {} channels but the trunk emits {}",
                self.rescale_channels, channels
            )));
        }
        let mut taps = vec![channels];
        for (s, chain) in self.extras.iter().enumerate() {
            for (j, layer) in chain.iter().enumerate() {
                channels = layer
                    .check(channels)
                    .map_err(|e| ModelError::Architecture(format!("extras.{s}.{j}: {e}")))?;
            }
            taps.push(channels);
        }
        Ok(taps)
    }

    /// Spatial extent of every tap for a square input.
    pub fn tap_spatial(&self, input_size: usize) -> Vec<usize> {
        let mut size = input_size;
        for layer in &self.features {
            size = layer.out_size(size);
        }
        let mut sizes = vec![size];
        for chain in &self.extras {
            for layer in chain {
                size = layer.out_size(size);
            }
            sizes.push(size);
        }
        sizes
    }
}

#[derive(Debug)]
pub(crate) struct BoundBackbone {
    pub(crate) features: Vec<BoundLayer>,
    pub(crate) extras: Vec<Vec<BoundLayer>>,
    pub(crate) scale: Array1<f32>,
}

impl BoundBackbone {
    /// Run the trunk and pyramid, returning one map per tap.
    pub(crate) fn forward(&self, input: Array3<f32>) -> Vec<Array3<f32>> {
        let mut x = run_chain(&self.features, input);
        let mut taps = vec![ops::l2_rescale(x.view(), &self.scale)];
        for chain in &self.extras {
            x = run_chain(chain, x);
            taps.push(x.clone());
        }
        taps
    }
}
