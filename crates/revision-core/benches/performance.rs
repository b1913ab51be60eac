use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use revision_core::{diff, patch, EngineConfig, JsonCodec, Repository};

fn large_text(line_count: usize, marker: &str) -> String {
    let mut out = String::with_capacity(line_count * 64);
    for i in 0..line_count {
        out.push_str(&format!(
            "{i:06} the quick brown fox jumps over the lazy dog ({marker} benchmark line)\n"
        ));
    }
    out
}

fn bench_diff_large_texts(c: &mut Criterion) {
    let config = EngineConfig::default();
    let text1 = large_text(2_000, "base");
    let mut text2 = text1.clone();
    text2.insert_str(text2.len() / 2, "an inserted paragraph right in the middle\n");
    text2.push_str("and a tail line\n");

    c.bench_function("diff/2k_lines_small_edit", |b| {
        b.iter(|| {
            let script = diff::diff(black_box(&text1), black_box(&text2), &config);
            black_box(diff::levenshtein(&script));
        })
    });
}

fn bench_patch_make_and_apply(c: &mut Criterion) {
    let config = EngineConfig::default();
    let text1 = large_text(500, "source");
    let mut text2 = text1.clone();
    text2 = text2.replacen("quick", "sluggish", 40);

    c.bench_function("patch/make_500_lines", |b| {
        b.iter(|| black_box(patch::make(black_box(&text1), black_box(&text2), &config)))
    });

    let patches = patch::make(&text1, &text2, &config);
    c.bench_function("patch/apply_500_lines", |b| {
        b.iter(|| black_box(patch::apply(black_box(&patches), black_box(&text1), &config)))
    });
}

fn bench_snapshot_history(c: &mut Criterion) {
    let base = large_text(300, "history");

    c.bench_function("repository/20_snapshots_with_compaction", |b| {
        b.iter_batched(
            || Repository::<String, JsonCodec>::new(JsonCodec),
            |mut repo| {
                let mut document = base.clone();
                repo.make_snapshot(&document).unwrap();
                for i in 0..20 {
                    document.push_str(&format!("revision tail {i}\n"));
                    repo.make_snapshot(&document).unwrap();
                }
                black_box(repo.size());
            },
            BatchSize::LargeInput,
        )
    });
}

criterion_group!(
    benches,
    bench_diff_large_texts,
    bench_patch_make_and_apply,
    bench_snapshot_history
);
criterion_main!(benches);
