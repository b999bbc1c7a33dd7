//! Layer descriptors and their weight-bound counterparts.
//!
//! Architectures are plain descriptor lists, so assembly transforms such
//! as attention insertion are list manipulation rather than module
//! surgery. Binding a checkpoint turns each descriptor into a
//! [`BoundLayer`] that owns its parameters.

use ndarray::{Array1, Array3, Array4};

use crate::attention::AttentionParams;
use crate::ops;

/// One step of a sequential feature pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayerSpec {
    Conv2d {
        in_channels: usize,
        out_channels: usize,
        kernel: usize,
        stride: usize,
        padding: usize,
        dilation: usize,
    },
    Relu,
    MaxPool2d {
        kernel: usize,
        stride: usize,
        padding: usize,
        ceil_mode: bool,
    },
    /// Channel attention gate: squeeze to `channels / reduction`,
    /// re-expand, and scale every channel by its sigmoid gate.
    Attention { channels: usize, reduction: usize },
}

impl LayerSpec {
    pub fn conv(
        in_channels: usize,
        out_channels: usize,
        kernel: usize,
        stride: usize,
        padding: usize,
    ) -> Self {
        LayerSpec::Conv2d {
            in_channels,
            out_channels,
            kernel,
            stride,
            padding,
            dilation: 1,
        }
    }

    pub fn pool(kernel: usize, stride: usize) -> Self {
        LayerSpec::MaxPool2d {
            kernel,
            stride,
            padding: 0,
            ceil_mode: false,
        }
    }

    pub fn pool_ceil(kernel: usize, stride: usize) -> Self {
        LayerSpec::MaxPool2d {
            kernel,
            stride,
            padding: 0,
            ceil_mode: true,
        }
    }

    /// Channel count flowing out, after checking the count flowing in.
    pub(crate) fn check(&self, incoming: usize) -> Result<usize, String> {
        match self {
            LayerSpec::Conv2d {
                in_channels,
                out_channels,
                ..
            } => {
                if *in_channels != incoming {
                    Err(format!("conv expects {in_channels} channels, gets {incoming}"))
                } else {
                    Ok(*out_channels)
                }
            }
            LayerSpec::Attention {
                channels,
                reduction,
            } => {
                if *channels != incoming {
                    Err(format!(
                        "attention gate expects {channels} channels, gets {incoming}"
                    ))
                } else if *reduction == 0 || channels / reduction == 0 {
                    Err(format!(
                        "reduction {reduction} collapses {channels} channels to nothing"
                    ))
                } else {
                    Ok(incoming)
                }
            }
            _ => Ok(incoming),
        }
    }

    /// Spatial extent flowing out for a square input.
    pub(crate) fn out_size(&self, incoming: usize) -> usize {
        match self {
            LayerSpec::Conv2d {
                kernel,
                stride,
                padding,
                dilation,
                ..
            } => ops::conv_out_dim(incoming, *kernel, *stride, *padding, *dilation),
            LayerSpec::MaxPool2d {
                kernel,
                stride,
                padding,
                ceil_mode,
            } => ops::pool_out_dim(incoming, *kernel, *stride, *padding, *ceil_mode),
            _ => incoming,
        }
    }
}

/// A descriptor with its checkpoint parameters attached.
#[derive(Debug, Clone)]
pub(crate) enum BoundLayer {
    Conv2d {
        weight: Array4<f32>,
        bias: Array1<f32>,
        stride: usize,
        padding: usize,
        dilation: usize,
    },
    Relu,
    MaxPool2d {
        kernel: usize,
        stride: usize,
        padding: usize,
        ceil_mode: bool,
    },
    Attention(AttentionParams),
}

impl BoundLayer {
    pub(crate) fn apply(&self, x: Array3<f32>) -> Array3<f32> {
        match self {
            BoundLayer::Conv2d {
                weight,
                bias,
                stride,
                padding,
                dilation,
            } => ops::conv2d(x.view(), weight, bias, *stride, *padding, *dilation),
            BoundLayer::Relu => {
                let mut x = x;
                ops::relu(&mut x);
                x
            }
            BoundLayer::MaxPool2d {
                kernel,
                stride,
                padding,
                ceil_mode,
            } => ops::maxpool2d(x.view(), *kernel, *stride, *padding, *ceil_mode),
            BoundLayer::Attention(params) => params.apply(x),
        }
    }
}

pub(crate) fn run_chain(layers: &[BoundLayer], mut x: Array3<f32>) -> Array3<f32> {
    for layer in layers {
        x = layer.apply(x);
    }
    x
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_rejects_channel_discontinuity() {
        let conv = LayerSpec::conv(64, 128, 3, 1, 1);
        assert_eq!(conv.check(64), Ok(128));
        assert!(conv.check(32).is_err(), "mismatched input channels must fail");

        let gate = LayerSpec::Attention {
            channels: 128,
            reduction: 16,
        };
        assert_eq!(gate.check(128), Ok(128));
        assert!(gate.check(64).is_err());
    }

    #[test]
    fn check_rejects_degenerate_reduction() {
        let gate = LayerSpec::Attention {
            channels: 8,
            reduction: 16,
        };
        assert!(gate.check(8).is_err(), "hidden width of zero must fail");
    }

    #[test]
    fn out_size_tracks_strides_and_pools() {
        assert_eq!(LayerSpec::conv(3, 64, 3, 1, 1).out_size(300), 300);
        assert_eq!(LayerSpec::conv(64, 64, 3, 2, 1).out_size(10), 5);
        assert_eq!(LayerSpec::pool(2, 2).out_size(150), 75);
        assert_eq!(LayerSpec::pool_ceil(2, 2).out_size(75), 38);
        assert_eq!(LayerSpec::Relu.out_size(19), 19);
    }
}
