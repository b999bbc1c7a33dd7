use criterion::{Criterion, black_box, criterion_group, criterion_main};
use ndarray::Array3;
use safetensors::tensor::{Dtype, TensorView};
use tempfile::tempdir;

use model::backbone::Backbone;
use model::head::HeadSpec;
use model::layers::LayerSpec;
use model::{AnchorConfig, Architecture, ComputeDevice, DecodeConfig, Detector};

/// Write a zero-filled checkpoint for `arch` and load a detector on it.
fn build_detector(arch: Architecture, anchors: AnchorConfig, device: ComputeDevice) -> Detector {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bench.safetensors");

    let entries = model::checkpoint::manifest(&arch);
    let buffers: Vec<(String, Vec<usize>, Vec<u8>)> = entries
        .into_iter()
        .map(|(name, shape)| {
            let len: usize = shape.iter().product();
            (name, shape, vec![0u8; len * 4])
        })
        .collect();
    let views: Vec<(&str, TensorView)> = buffers
        .iter()
        .map(|(name, shape, bytes)| {
            (
                name.as_str(),
                TensorView::new(Dtype::F32, shape.clone(), bytes).unwrap(),
            )
        })
        .collect();
    std::fs::write(&path, safetensors::serialize(views, &None).unwrap()).unwrap();

    Detector::load(&arch, &anchors, &path, device, DecodeConfig::default()).unwrap()
}

fn small_architecture() -> (Architecture, AnchorConfig) {
    let mut backbone = Backbone {
        features: vec![
            LayerSpec::conv(3, 16, 3, 1, 1),
            LayerSpec::Relu,
            LayerSpec::pool(2, 2),
            LayerSpec::conv(16, 32, 3, 1, 1),
            LayerSpec::Relu,
        ],
        extras: vec![vec![LayerSpec::conv(32, 64, 3, 2, 1), LayerSpec::Relu]],
        rescale_channels: 32,
    };
    backbone.attach_attention(4);
    let arch = Architecture {
        backbone,
        head: HeadSpec {
            num_classes: 3,
            tap_channels: vec![32, 64],
            anchors_per_cell: vec![2, 2],
        },
    };
    let anchors = AnchorConfig {
        image_size: 64,
        feature_sizes: vec![32, 16],
        steps: vec![2, 4],
        scales: vec![0.1, 0.3, 0.5],
        aspect_ratios: vec![vec![], vec![]],
    };
    (arch, anchors)
}

/// Benchmark the full forward pass, decode included.
fn benchmark_detect(c: &mut Criterion) {
    let mut group = c.benchmark_group("detect");

    let (arch, anchors) = small_architecture();
    let input = Array3::from_shape_fn((3, 64, 64), |(ch, y, x)| {
        ((ch + y + x) % 11) as f32 / 11.0
    });

    for device in [ComputeDevice::SingleThread, ComputeDevice::Parallel { threads: 4 }] {
        let detector = build_detector(arch.clone(), anchors.clone(), device);
        group.bench_function(device.to_string(), |b| {
            b.iter(|| detector.detect(black_box(input.view())).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_detect);
criterion_main!(benches);
