use criterion::{black_box, criterion_group, criterion_main, Criterion};

use ringscan::synth;
use ringscan::{FrameAssembler, RunSegmenter, RunSegmenterConfig, ScanlineParser};

/// VGA frame with a staggered grid of order-3 markers, the realtime
/// capture shape the detector is sized for.
fn make_frame(width: u32, height: u32) -> image::GrayImage {
    let mut centers = Vec::new();
    let pitch = 128.0f32;
    let mut row = 0;
    let mut cy = 70.0f32;
    while cy + 40.0 < height as f32 {
        let offset = if row % 2 == 0 { 70.0 } else { 134.0 };
        let mut cx = offset;
        while cx + 40.0 < width as f32 {
            centers.push((cx, cy));
            cx += pitch;
        }
        cy += pitch * 0.75;
        row += 1;
    }
    synth::frame_with_markers(width, height, &centers, 3, 8.0)
}

fn bench_frame_assembly(c: &mut Criterion) {
    let frame = make_frame(640, 480);

    c.bench_function("assemble_frame_640x480", |b| {
        let mut assembler: FrameAssembler =
            FrameAssembler::new(ScanlineParser::default(), Default::default());
        b.iter(|| {
            let result = assembler.process_frame(black_box(&frame));
            black_box(result.markers.len())
        })
    });
}

fn bench_scanline_parse(c: &mut Criterion) {
    let frame = make_frame(640, 480);
    let row: Vec<u8> = (0..640).map(|x| frame.get_pixel(x, 70)[0]).collect();

    c.bench_function("parse_scanline_640", |b| {
        let mut parser: ScanlineParser<u8> = ScanlineParser::default();
        b.iter(|| {
            let mut hits = 0u32;
            for &mag in &row {
                if parser.next(black_box(mag)).marker_found {
                    hits += 1;
                }
            }
            parser.new_line();
            black_box(hits)
        })
    });
}

fn bench_segmenter(c: &mut Criterion) {
    let frame = make_frame(640, 480);
    let row: Vec<u8> = (0..640).map(|x| frame.get_pixel(x, 70)[0]).collect();

    c.bench_function("segment_scanline_640", |b| {
        let mut segmenter: RunSegmenter<u8> = RunSegmenter::new(RunSegmenterConfig::default());
        b.iter(|| {
            let mut open_samples = 0u32;
            for &mag in &row {
                if segmenter.next(black_box(mag)) {
                    open_samples += 1;
                }
            }
            segmenter.reset();
            black_box(open_samples)
        })
    });
}

criterion_group!(
    hotpaths,
    bench_frame_assembly,
    bench_scanline_parse,
    bench_segmenter
);
criterion_main!(hotpaths);
