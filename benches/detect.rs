//! Benchmarks for the heuristic scan and entity extraction.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use gavial::detect::HeuristicDetector;
use gavial::extract::EntityExtractor;

const SCAM: &str = "Congratulations! You have won $1,000,000 in our lottery! Send the $500 \
    processing fee to claim.now@paytm or call 9876543210 immediately. Don't wait, act fast!";

const CLEAN: &str = "Hi, just checking whether we're still on for the project review tomorrow \
    afternoon. I pushed the latest draft earlier today, let me know what you think.";

fn bench_detect(c: &mut Criterion) {
    let detector = HeuristicDetector::new();

    c.bench_function("detect_scam_message", |bench| {
        bench.iter(|| black_box(detector.detect(black_box(SCAM), None)))
    });

    c.bench_function("detect_clean_message", |bench| {
        bench.iter(|| black_box(detector.detect(black_box(CLEAN), None)))
    });
}

fn bench_extract(c: &mut Criterion) {
    let extractor = EntityExtractor::new();

    c.bench_function("extract_scam_message", |bench| {
        bench.iter(|| black_box(extractor.extract(black_box(SCAM))))
    });
}

criterion_group!(benches, bench_detect, bench_extract);
criterion_main!(benches);
