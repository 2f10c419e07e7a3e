use criterion::{BatchSize, BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use dtc_genotypes::{GenotypeSet, MergeOptions, ParserKind, merge_sets, parse};

fn synthetic_23andme(records: usize) -> Vec<u8> {
    let mut content = String::from(
        "# This data file generated by 23andMe\n# reference human assembly build 37\n# rsid\tchromosome\tposition\tgenotype\n",
    );
    for i in 1..=records {
        let chromosome = (i % 22) + 1;
        // Reverse order within each chromosome so sorting has work to do.
        let position = records - i + 1;
        content.push_str(&format!("rs{i}\t{chromosome}\t{position}\tAG\n"));
    }
    content.into_bytes()
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_23andme");
    for &records in &[1_000usize, 50_000] {
        let bytes = synthetic_23andme(records);
        group.bench_with_input(BenchmarkId::from_parameter(records), &bytes, |b, bytes| {
            b.iter_batched(
                || bytes.clone(),
                |bytes| black_box(parse(bytes, Some(ParserKind::TwentyThreeAndMe)).unwrap()),
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

fn bench_sort(c: &mut Criterion) {
    let set = parse(synthetic_23andme(50_000), None).unwrap();
    let reversed: GenotypeSet = set.iter().rev().cloned().collect();

    c.bench_function("sort_50000", |b| {
        b.iter_batched(
            || reversed.clone(),
            |mut set| {
                set.sort();
                black_box(set)
            },
            BatchSize::LargeInput,
        );
    });
}

fn bench_merge(c: &mut Criterion) {
    let base = parse(synthetic_23andme(50_000), None).unwrap();
    let other = parse(synthetic_23andme(60_000), None).unwrap();

    c.bench_function("merge_50000_into_60000", |b| {
        b.iter_batched(
            || (base.clone(), other.clone()),
            |(mut target, source)| {
                let report = merge_sets(&mut target, vec![source], &MergeOptions::default());
                black_box((target, report))
            },
            BatchSize::LargeInput,
        );
    });
}

criterion_group!(benches, bench_parse, bench_sort, bench_merge);
criterion_main!(benches);
