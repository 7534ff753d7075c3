use criterion::{black_box, criterion_group, criterion_main, Criterion};
use threat_detection_service::core::PatternCatalog;

fn bench_pattern_matching(c: &mut Criterion) {
    let catalog = PatternCatalog::shared();

    let attack = "/search?q=' UNION SELECT * FROM users--&p=<script>alert(1)</script>";
    let benign = "/api/products?category=books&page=3&sort=price_asc&q=rust in action";

    c.bench_function("catalog_match_attack_url", |b| {
        b.iter(|| catalog.match_text(black_box(attack)))
    });

    c.bench_function("catalog_match_benign_url", |b| {
        b.iter(|| catalog.match_text(black_box(benign)))
    });
}

criterion_group!(benches, bench_pattern_matching);
criterion_main!(benches);
