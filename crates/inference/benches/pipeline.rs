use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use image::{DynamicImage, Rgb, RgbImage};
use inference::labels::LabelMap;
use inference::postprocessing::PostProcessor;
use inference::preprocessing::PreProcessor;
use model::Detections;

const INPUT_SIZE: usize = 300;

fn gradient_image(width: u32, height: u32) -> DynamicImage {
    let image = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    });
    DynamicImage::ImageRgb8(image)
}

/// Spread `count` detections over the frame so rendering cannot
/// collapse overlapping boxes into cheap repeated writes.
fn mock_detections(count: usize, width: f32, height: f32) -> Detections {
    let mut detections = Detections::default();
    for i in 0..count {
        let fx = (i % 10) as f32 / 10.0;
        let fy = (i / 10) as f32 / 10.0;
        detections.boxes.push([
            fx * width * 0.8,
            fy * height * 0.8,
            fx * width * 0.8 + width * 0.15,
            fy * height * 0.8 + height * 0.15,
        ]);
        detections.labels.push((i % 2 + 1) as u32);
        detections.scores.push(0.9 - i as f32 * 0.001);
    }
    detections
}

fn benchmark_preprocessing(c: &mut Criterion) {
    let mut group = c.benchmark_group("preprocessing");
    let preprocessor = PreProcessor::new(INPUT_SIZE);

    let resolutions = [(640, 480), (1280, 720), (1920, 1080)];

    for (width, height) in resolutions.iter() {
        let image = gradient_image(*width, *height);

        group.bench_with_input(
            BenchmarkId::new("resize_to_tensor", format!("{}x{}", width, height)),
            &image,
            |b, image| {
                b.iter(|| preprocessor.process(black_box(image)).unwrap());
            },
        );
    }

    group.finish();
}

fn benchmark_postprocessing(c: &mut Criterion) {
    let mut group = c.benchmark_group("postprocessing");
    let processor = PostProcessor::new(LabelMap::default(), None);
    let image = gradient_image(640, 480);

    let detection_counts = [0, 5, 20, 50];

    for count in detection_counts.iter() {
        let detections = mock_detections(*count, 640.0, 480.0);

        group.bench_with_input(
            BenchmarkId::new("annotate_and_encode", count),
            &detections,
            |b, detections| {
                b.iter(|| {
                    processor
                        .process(black_box(&image), black_box(detections), black_box(0.5))
                        .unwrap()
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, benchmark_preprocessing, benchmark_postprocessing);
criterion_main!(benches);
