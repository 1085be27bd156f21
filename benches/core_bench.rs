//! Benchmarks for capas core operations.
//!
//! Run with: cargo bench
//!
//! Results include 95% confidence intervals via Criterion.

use capas::core::{graph, parser};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn config_yaml(layer_count: usize) -> String {
    let mut yaml = String::from("version: \"1.0\"\nname: bench\nlayers:\n");
    for i in 0..layer_count {
        yaml.push_str(&format!(
            "  - name: layer{i}\n    steps:\n      - kind: read_file\n        file: l{i}.geojson\n      - kind: add_zoom\n        min_zoom: 2\n      - kind: output\n"
        ));
    }
    yaml
}

fn bench_yaml_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("yaml_parse");
    for layers in [1, 8, 64] {
        let yaml = config_yaml(layers);
        group.bench_with_input(BenchmarkId::from_parameter(layers), &yaml, |b, yaml| {
            b.iter(|| {
                let config = parser::parse_config(black_box(yaml)).unwrap();
                black_box(config);
            });
        });
    }
    group.finish();
}

fn bench_graph_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("graph_build");
    for layers in [1, 8, 64] {
        let config = parser::parse_config(&config_yaml(layers)).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(layers), &config, |b, config| {
            b.iter(|| {
                let graph = graph::build_graph(black_box(config)).unwrap();
                black_box(graph.len());
            });
        });
    }
    group.finish();
}

fn bench_blake3_bytes(c: &mut Criterion) {
    let mut group = c.benchmark_group("blake3_bytes");
    for size in [256, 4096, 65536] {
        let input = vec![0xABu8; size];
        group.bench_with_input(BenchmarkId::from_parameter(size), &input, |b, input| {
            b.iter(|| {
                let hash = capas::trace::hasher::hash_bytes(black_box(input));
                black_box(hash);
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_yaml_parse, bench_graph_build, bench_blake3_bytes);
criterion_main!(benches);
