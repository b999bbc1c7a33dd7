//! Checkpoint loading with exact architecture congruence.
//!
//! A checkpoint is a single safetensors file whose tensor names derive
//! from descriptor positions. The file must carry exactly the tensors
//! the architecture calls for: anything missing, anything surplus, any
//! shape or dtype drift fails the load.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use ndarray::{Array1, Array2, Array4};
use safetensors::SafeTensors;
use safetensors::tensor::Dtype;

use crate::assembly::Architecture;
use crate::attention::AttentionParams;
use crate::backbone::BoundBackbone;
use crate::error::ModelError;
use crate::head::{BoundHead, HeadConv};
use crate::layers::{BoundLayer, LayerSpec};

/// Every tensor an architecture expects, with its shape, keyed by name.
pub fn manifest(arch: &Architecture) -> BTreeMap<String, Vec<usize>> {
    let mut out = BTreeMap::new();
    chain_manifest(&mut out, "features", &arch.backbone.features);
    out.insert(
        "scale.weight".to_string(),
        vec![arch.backbone.rescale_channels],
    );
    for (s, chain) in arch.backbone.extras.iter().enumerate() {
        chain_manifest(&mut out, &format!("extras.{s}"), chain);
    }
    let classes = arch.head.num_classes;
    for (k, (&c, &a)) in arch
        .head
        .tap_channels
        .iter()
        .zip(arch.head.anchors_per_cell.iter())
        .enumerate()
    {
        out.insert(
            format!("head.classification.{k}.weight"),
            vec![a * classes, c, 3, 3],
        );
        out.insert(format!("head.classification.{k}.bias"), vec![a * classes]);
        out.insert(format!("head.regression.{k}.weight"), vec![a * 4, c, 3, 3]);
        out.insert(format!("head.regression.{k}.bias"), vec![a * 4]);
    }
    out
}

fn chain_manifest(out: &mut BTreeMap<String, Vec<usize>>, prefix: &str, layers: &[LayerSpec]) {
    for (i, layer) in layers.iter().enumerate() {
        match layer {
            LayerSpec::Conv2d {
                in_channels,
                out_channels,
                kernel,
                ..
            } => {
                out.insert(
                    format!("{prefix}.{i}.weight"),
                    vec![*out_channels, *in_channels, *kernel, *kernel],
                );
                out.insert(format!("{prefix}.{i}.bias"), vec![*out_channels]);
            }
            LayerSpec::Attention {
                channels,
                reduction,
            } => {
                let hidden = channels / reduction;
                out.insert(
                    format!("{prefix}.{i}.reduce.weight"),
                    vec![hidden, *channels],
                );
                out.insert(
                    format!("{prefix}.{i}.expand.weight"),
                    vec![*channels, hidden],
                );
            }
            _ => {}
        }
    }
}

/// Read and bind a checkpoint, failing on any disagreement with `arch`.
pub(crate) fn load(
    arch: &Architecture,
    path: &Path,
) -> Result<(BoundBackbone, BoundHead), ModelError> {
    let bytes = std::fs::read(path).map_err(|source| ModelError::CheckpointRead {
        path: path.to_path_buf(),
        source,
    })?;
    let st = SafeTensors::deserialize(&bytes)?;
    verify_congruence(arch, &st)?;

    let features = bind_chain(&st, "features", &arch.backbone.features)?;
    let scale = tensor1(&st, "scale.weight", arch.backbone.rescale_channels)?;
    let mut extras = Vec::with_capacity(arch.backbone.extras.len());
    for (s, chain) in arch.backbone.extras.iter().enumerate() {
        extras.push(bind_chain(&st, &format!("extras.{s}"), chain)?);
    }

    let classes = arch.head.num_classes;
    let mut classification = Vec::new();
    let mut regression = Vec::new();
    for (k, (&c, &a)) in arch
        .head
        .tap_channels
        .iter()
        .zip(arch.head.anchors_per_cell.iter())
        .enumerate()
    {
        classification.push(HeadConv {
            weight: tensor4(
                &st,
                &format!("head.classification.{k}.weight"),
                [a * classes, c, 3, 3],
            )?,
            bias: tensor1(&st, &format!("head.classification.{k}.bias"), a * classes)?,
        });
        regression.push(HeadConv {
            weight: tensor4(&st, &format!("head.regression.{k}.weight"), [a * 4, c, 3, 3])?,
            bias: tensor1(&st, &format!("head.regression.{k}.bias"), a * 4)?,
        });
    }

    Ok((
        BoundBackbone {
            features,
            extras,
            scale,
        },
        BoundHead {
            num_classes: classes,
            classification,
            regression,
        },
    ))
}

fn verify_congruence(arch: &Architecture, st: &SafeTensors) -> Result<(), ModelError> {
    let expected = manifest(arch);
    let present: BTreeSet<&str> = st.names().into_iter().map(|s| s.as_str()).collect();

    let missing: Vec<&str> = expected
        .keys()
        .map(|k| k.as_str())
        .filter(|k| !present.contains(k))
        .collect();
    if !missing.is_empty() {
        return Err(ModelError::MissingTensors(missing.join(", ")));
    }

    let unexpected: Vec<&str> = present
        .iter()
        .copied()
        .filter(|k| !expected.contains_key(*k))
        .collect();
    if !unexpected.is_empty() {
        return Err(ModelError::UnexpectedTensors(unexpected.join(", ")));
    }
    Ok(())
}

fn bind_chain(
    st: &SafeTensors,
    prefix: &str,
    layers: &[LayerSpec],
) -> Result<Vec<BoundLayer>, ModelError> {
    let mut bound = Vec::with_capacity(layers.len());
    for (i, layer) in layers.iter().enumerate() {
        bound.push(match layer {
            LayerSpec::Conv2d {
                in_channels,
                out_channels,
                kernel,
                stride,
                padding,
                dilation,
            } => BoundLayer::Conv2d {
                weight: tensor4(
                    st,
                    &format!("{prefix}.{i}.weight"),
                    [*out_channels, *in_channels, *kernel, *kernel],
                )?,
                bias: tensor1(st, &format!("{prefix}.{i}.bias"), *out_channels)?,
                stride: *stride,
                padding: *padding,
                dilation: *dilation,
            },
            LayerSpec::Relu => BoundLayer::Relu,
            LayerSpec::MaxPool2d {
                kernel,
                stride,
                padding,
                ceil_mode,
            } => BoundLayer::MaxPool2d {
                kernel: *kernel,
                stride: *stride,
                padding: *padding,
                ceil_mode: *ceil_mode,
            },
            LayerSpec::Attention {
                channels,
                reduction,
            } => {
                let hidden = channels / reduction;
                BoundLayer::Attention(AttentionParams {
                    reduce: tensor2(
                        st,
                        &format!("{prefix}.{i}.reduce.weight"),
                        [hidden, *channels],
                    )?,
                    expand: tensor2(
                        st,
                        &format!("{prefix}.{i}.expand.weight"),
                        [*channels, hidden],
                    )?,
                })
            }
        });
    }
    Ok(bound)
}

fn raw_f32(st: &SafeTensors, name: &str, expected: &[usize]) -> Result<Vec<f32>, ModelError> {
    let view = st
        .tensor(name)
        .map_err(|_| ModelError::MissingTensors(name.to_string()))?;
    if view.dtype() != Dtype::F32 {
        return Err(ModelError::DtypeMismatch {
            name: name.to_string(),
            found: format!("{:?}", view.dtype()),
        });
    }
    if view.shape() != expected {
        return Err(ModelError::ShapeMismatch {
            name: name.to_string(),
            found: view.shape().to_vec(),
            expected: expected.to_vec(),
        });
    }
    Ok(view
        .data()
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

fn tensor1(st: &SafeTensors, name: &str, len: usize) -> Result<Array1<f32>, ModelError> {
    Ok(Array1::from_vec(raw_f32(st, name, &[len])?))
}

fn tensor2(st: &SafeTensors, name: &str, shape: [usize; 2]) -> Result<Array2<f32>, ModelError> {
    Array2::from_shape_vec((shape[0], shape[1]), raw_f32(st, name, &shape)?)
        .map_err(|e| ModelError::Architecture(e.to_string()))
}

fn tensor4(st: &SafeTensors, name: &str, shape: [usize; 4]) -> Result<Array4<f32>, ModelError> {
    Array4::from_shape_vec(
        (shape[0], shape[1], shape[2], shape[3]),
        raw_f32(st, name, &shape)?,
    )
    .map_err(|e| ModelError::Architecture(e.to_string()))
}
