use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use bgremove_pipeline::{
    compositor::Compositor,
    services::{ImageCodec, StandardCodec},
    BackgroundColor, Bitmap, EnhancementOptions, ImageEnhancer, ImageResizer, OutputFormat,
};
use image::{Rgb, RgbImage, Rgba, RgbaImage};

fn photo(width: u32, height: u32) -> Bitmap {
    Bitmap::Rgb(RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 251) as u8, (y % 241) as u8, ((x + y) % 239) as u8])
    }))
}

fn cutout(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x % 256) as u8, (y % 256) as u8, 128, ((x * y) % 256) as u8])
    })
}

fn benchmark_resize(c: &mut Criterion) {
    let mut group = c.benchmark_group("resize");
    group.sample_size(10);

    for (width, height) in [(3000, 2000), (4000, 4000)] {
        let input = photo(width, height);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}x{}_to_2500", width, height)),
            &input,
            |b, input| {
                b.iter(|| ImageResizer::resize(black_box(input.clone()), 2500).unwrap());
            },
        );
    }

    group.finish();
}

fn benchmark_enhance(c: &mut Criterion) {
    let mut group = c.benchmark_group("enhance");
    let input = photo(1024, 768);

    let variants = [
        ("sharpen", EnhancementOptions { sharpen: true, contrast: false }),
        ("contrast", EnhancementOptions { sharpen: false, contrast: true }),
        ("both", EnhancementOptions { sharpen: true, contrast: true }),
    ];

    for (name, options) in variants {
        group.bench_function(name, |b| {
            b.iter(|| ImageEnhancer::enhance(black_box(input.clone()), options));
        });
    }

    group.finish();
}

fn benchmark_composite(c: &mut Criterion) {
    let mut group = c.benchmark_group("composite");
    let foreground = cutout(1024, 768);

    for (name, background) in [
        ("transparent", BackgroundColor::Transparent),
        ("solid", BackgroundColor::rgb(30, 30, 30)),
    ] {
        group.bench_function(name, |b| {
            b.iter(|| Compositor::composite(black_box(foreground.clone()), background));
        });
    }

    group.finish();
}

fn benchmark_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");
    group.sample_size(20);
    let codec = StandardCodec::default();
    let rgba = Bitmap::Rgba(cutout(1024, 768));
    let rgb = photo(1024, 768);

    group.bench_function("png_rgba", |b| {
        b.iter(|| codec.encode(black_box(&rgba), OutputFormat::Png).unwrap());
    });
    group.bench_function("jpeg_rgb", |b| {
        b.iter(|| codec.encode(black_box(&rgb), OutputFormat::Jpeg).unwrap());
    });

    group.finish();
}

criterion_group!(
    stage_benches,
    benchmark_resize,
    benchmark_enhance,
    benchmark_composite,
    benchmark_encode
);
criterion_main!(stage_benches);
