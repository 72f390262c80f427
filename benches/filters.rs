use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use videosnap::filters::{FilterChain, FilterRegistry, FrameContext, ParamMap};
use videosnap::media::Frame;

fn test_frame(width: u32, height: u32) -> Frame {
    let mut frame = Frame::new_black(width, height);
    for y in 0..height {
        for x in 0..width {
            frame.set_pixel(x, y, [(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8]);
        }
    }
    frame
}

fn bench_stages(c: &mut Criterion) {
    let registry = FilterRegistry::new();
    let frame = test_frame(640, 360);
    let ctx = FrameContext { time: 0.5, index: 12 };

    let mut group = c.benchmark_group("stage");
    for name in ["grayscale", "sepia", "invert", "oldfilm"] {
        let stage = registry.create_default(name).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(name), &stage, |b, stage| {
            b.iter(|| {
                let mut f = frame.clone();
                stage.apply(&mut f, &ctx, None).unwrap();
                black_box(f)
            })
        });
    }

    let text = registry
        .create("text-overlay", ParamMap::new().with("text", "VIDEOSNAP 00:00:12").with("font_size", 32.0))
        .unwrap();
    group.bench_function("text-overlay", |b| {
        b.iter(|| {
            let mut f = frame.clone();
            text.apply(&mut f, &ctx, None).unwrap();
            black_box(f)
        })
    });
    group.finish();
}

fn bench_keyframed_chain(c: &mut Criterion) {
    let registry = FilterRegistry::new();
    let engine = videosnap::Engine::native();
    let chain = FilterChain::new()
        .with(registry.create("sepia", ParamMap::new().with("amount", "0:0,2:1")).unwrap())
        .unwrap()
        .with(registry.create_default("oldfilm").unwrap())
        .unwrap();
    let mut runner = chain.prepare(&engine).unwrap();
    let frame = test_frame(1280, 720);

    c.bench_function("chain/sepia+oldfilm 720p", |b| {
        let mut index = 0u64;
        b.iter(|| {
            let mut f = frame.clone();
            let ctx = FrameContext {
                time: index as f64 / 30.0,
                index,
            };
            runner.apply(&mut f, ctx, ctx).unwrap();
            index += 1;
            black_box(f)
        })
    });
}

criterion_group!(benches, bench_stages, bench_keyframed_chain);
criterion_main!(benches);
