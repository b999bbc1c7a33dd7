//! Dense tensor kernels for the detection network.
//!
//! Everything operates on f32 arrays in CHW layout. Convolutions
//! parallelize over output channels through whichever rayon pool the
//! caller has installed.

use ndarray::parallel::prelude::*;
use ndarray::{Array1, Array2, Array3, Array4, ArrayView3, Axis};

/// Output extent of a convolution along one axis.
pub(crate) fn conv_out_dim(
    size: usize,
    kernel: usize,
    stride: usize,
    padding: usize,
    dilation: usize,
) -> usize {
    let effective = dilation * (kernel - 1) + 1;
    let span = size as isize + 2 * padding as isize - effective as isize;
    if span < 0 { 0 } else { span as usize / stride + 1 }
}

/// Output extent of a pooling window along one axis.
pub(crate) fn pool_out_dim(
    size: usize,
    kernel: usize,
    stride: usize,
    padding: usize,
    ceil_mode: bool,
) -> usize {
    let span = size as isize + 2 * padding as isize - kernel as isize;
    if span < 0 {
        return 0;
    }
    let span = span as usize;
    let mut out = if ceil_mode { span.div_ceil(stride) } else { span / stride } + 1;
    // windows that would start past the input and its left padding see
    // nothing but padding and are dropped
    if ceil_mode && (out - 1) * stride >= size + padding {
        out -= 1;
    }
    out
}

/// Direct 2d convolution with zero padding.
pub(crate) fn conv2d(
    input: ArrayView3<f32>,
    weight: &Array4<f32>,
    bias: &Array1<f32>,
    stride: usize,
    padding: usize,
    dilation: usize,
) -> Array3<f32> {
    let (in_c, in_h, in_w) = input.dim();
    let (out_c, _, k_h, k_w) = weight.dim();
    let out_h = conv_out_dim(in_h, k_h, stride, padding, dilation);
    let out_w = conv_out_dim(in_w, k_w, stride, padding, dilation);

    let mut out = Array3::<f32>::zeros((out_c, out_h, out_w));
    out.axis_iter_mut(Axis(0))
        .into_par_iter()
        .enumerate()
        .for_each(|(oc, mut plane)| {
            for oy in 0..out_h {
                for ox in 0..out_w {
                    let mut acc = bias[oc];
                    for ic in 0..in_c {
                        for ky in 0..k_h {
                            let iy = (oy * stride + ky * dilation) as isize - padding as isize;
                            if iy < 0 || iy >= in_h as isize {
                                continue;
                            }
                            for kx in 0..k_w {
                                let ix = (ox * stride + kx * dilation) as isize - padding as isize;
                                if ix < 0 || ix >= in_w as isize {
                                    continue;
                                }
                                acc += input[[ic, iy as usize, ix as usize]]
                                    * weight[[oc, ic, ky, kx]];
                            }
                        }
                    }
                    plane[[oy, ox]] = acc;
                }
            }
        });
    out
}

pub(crate) fn relu(x: &mut Array3<f32>) {
    x.mapv_inplace(|v| v.max(0.0));
}

/// Max pooling. Padded positions never win a window.
pub(crate) fn maxpool2d(
    input: ArrayView3<f32>,
    kernel: usize,
    stride: usize,
    padding: usize,
    ceil_mode: bool,
) -> Array3<f32> {
    let (c, in_h, in_w) = input.dim();
    let out_h = pool_out_dim(in_h, kernel, stride, padding, ceil_mode);
    let out_w = pool_out_dim(in_w, kernel, stride, padding, ceil_mode);

    let mut out = Array3::<f32>::zeros((c, out_h, out_w));
    for ch in 0..c {
        for oy in 0..out_h {
            for ox in 0..out_w {
                let mut best = f32::NEG_INFINITY;
                for ky in 0..kernel {
                    let iy = (oy * stride + ky) as isize - padding as isize;
                    if iy < 0 || iy >= in_h as isize {
                        continue;
                    }
                    for kx in 0..kernel {
                        let ix = (ox * stride + kx) as isize - padding as isize;
                        if ix < 0 || ix >= in_w as isize {
                            continue;
                        }
                        best = best.max(input[[ch, iy as usize, ix as usize]]);
                    }
                }
                out[[ch, oy, ox]] = best;
            }
        }
    }
    out
}

/// Fully connected layer over a flat vector.
pub(crate) fn linear(
    input: &Array1<f32>,
    weight: &Array2<f32>,
    bias: Option<&Array1<f32>>,
) -> Array1<f32> {
    let mut out = weight.dot(input);
    if let Some(b) = bias {
        out += b;
    }
    out
}

/// Mean over the spatial extent, one value per channel.
pub(crate) fn global_avg_pool(input: ArrayView3<f32>) -> Array1<f32> {
    let (_, h, w) = input.dim();
    let denom = (h * w) as f32;
    Array1::from_iter(input.axis_iter(Axis(0)).map(|plane| plane.sum() / denom))
}

pub(crate) fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Channel-wise L2 normalization with a learned per-channel gain.
pub(crate) fn l2_rescale(input: ArrayView3<f32>, scale: &Array1<f32>) -> Array3<f32> {
    let (c, h, w) = input.dim();
    let mut out = Array3::<f32>::zeros((c, h, w));
    for y in 0..h {
        for x in 0..w {
            let mut norm = 0.0f32;
            for ch in 0..c {
                norm += input[[ch, y, x]] * input[[ch, y, x]];
            }
            let norm = norm.sqrt().max(1e-12);
            for ch in 0..c {
                out[[ch, y, x]] = scale[ch] * input[[ch, y, x]] / norm;
            }
        }
    }
    out
}
