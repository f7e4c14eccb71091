use camera_session::format::{closest_framerate_range, closest_size, negotiate, FramerateRange, Size};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn supported_sizes() -> Vec<Size> {
    [
        (176, 144),
        (320, 240),
        (352, 288),
        (640, 360),
        (640, 480),
        (720, 480),
        (800, 600),
        (960, 540),
        (1024, 768),
        (1280, 720),
        (1280, 960),
        (1440, 1080),
        (1600, 1200),
        (1920, 1080),
        (2560, 1440),
        (3840, 2160),
    ]
    .into_iter()
    .map(|(w, h)| Size::new(w, h))
    .collect()
}

fn supported_ranges() -> Vec<FramerateRange> {
    vec![
        FramerateRange::new(7000, 7000),
        FramerateRange::new(15000, 15000),
        FramerateRange::new(7000, 30000),
        FramerateRange::new(15000, 30000),
        FramerateRange::new(24000, 24000),
        FramerateRange::new(30000, 30000),
        FramerateRange::new(30000, 60000),
    ]
}

fn bench_negotiate(c: &mut Criterion) {
    let sizes = supported_sizes();
    let ranges = supported_ranges();

    c.bench_function("closest_size", |b| {
        b.iter(|| closest_size(black_box(&sizes), black_box(1000), black_box(700)))
    });

    c.bench_function("closest_framerate_range", |b| {
        b.iter(|| closest_framerate_range(black_box(&ranges), black_box(25)))
    });

    c.bench_function("negotiate", |b| {
        b.iter(|| {
            negotiate(
                black_box(&ranges),
                black_box(&sizes),
                black_box(&sizes),
                black_box(1280),
                black_box(720),
                black_box(30),
            )
        })
    });
}

criterion_group!(benches, bench_negotiate);
criterion_main!(benches);
