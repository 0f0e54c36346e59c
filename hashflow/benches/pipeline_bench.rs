//! Benchmarks for pipeline execution.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use hashflow::config::{GateConfig, PipelineConfig};
use hashflow::events::NoOpEventSink;
use hashflow::gate::{HashGate, HashPrimitives, Md5Crc32, StubPrimitives};
use hashflow::pipeline::{Pipeline, PipelineBuilder};
use hashflow::stages::{Fan2HashStage, Fan6HashStage, SortJoinStage};
use std::sync::Arc;
use tokio::runtime::Runtime;

fn signer(primitives: Arc<dyn HashPrimitives>, gate: GateConfig) -> Pipeline {
    PipelineBuilder::new("bench")
        .stage(Fan2HashStage::new())
        .stage(Fan6HashStage::new())
        .stage(SortJoinStage::new())
        .with_gate(Arc::new(HashGate::new(primitives, gate)))
        .with_config(PipelineConfig::default())
        .with_event_sink(Arc::new(NoOpEventSink))
        .build()
        .expect("signer pipeline is valid")
}

fn pipeline_benchmark(c: &mut Criterion) {
    let rt = Runtime::new().expect("tokio runtime");
    let mut group = c.benchmark_group("signer");

    for items in [8_i64, 64, 256] {
        let stub = signer(Arc::new(StubPrimitives), GateConfig::default());
        group.bench_with_input(BenchmarkId::new("stub", items), &items, |b, &n| {
            b.iter(|| rt.block_on(async { black_box(stub.run_to_string(0..n).await.unwrap()) }));
        });

        let real = signer(Arc::new(Md5Crc32), GateConfig::default());
        group.bench_with_input(BenchmarkId::new("md5_crc32", items), &items, |b, &n| {
            b.iter(|| rt.block_on(async { black_box(real.run_to_string(0..n).await.unwrap()) }));
        });
    }
    group.finish();
}

fn gate_ceiling_benchmark(c: &mut Criterion) {
    let rt = Runtime::new().expect("tokio runtime");
    let mut group = c.benchmark_group("gate_ceiling");

    for ceiling in [1_usize, 8, 64] {
        let pipeline = signer(Arc::new(Md5Crc32), GateConfig::new().with_max_concurrent(ceiling));
        group.bench_with_input(BenchmarkId::from_parameter(ceiling), &ceiling, |b, _| {
            b.iter(|| {
                rt.block_on(async { black_box(pipeline.run_to_string(0..64).await.unwrap()) })
            });
        });
    }
    group.finish();
}

criterion_group!(benches, pipeline_benchmark, gate_ceiling_benchmark);
criterion_main!(benches);
