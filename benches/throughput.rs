use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ring_pipeline::{PipelineBuilder, RingBuffer, WaitStrategyKind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

const EVENTS: u64 = 10_000;

fn run_pipeline(filter_pool_size: usize, output_pool_size: usize, wait_strategy: WaitStrategyKind) {
    let delivered = Arc::new(AtomicU64::new(0));
    let pipeline = {
        let delivered = Arc::clone(&delivered);
        PipelineBuilder::new()
            .ingress_capacity(1024)
            .intermediate_capacity(1024)
            .filter_pool_size(filter_pool_size)
            .output_pool_size(output_pool_size)
            .wait_strategy(wait_strategy)
            .filter(|data: &Vec<u8>, _| Ok((data[0] % 4 != 0).then(|| data.len())))
            .output(move |len: &usize, _| {
                delivered.fetch_add(*len as u64, Ordering::Relaxed);
                Ok(())
            })
            .build()
            .expect("Build failed")
    };
    pipeline.start().expect("Start failed");

    for i in 0..EVENTS {
        let data = vec![i as u8; 64]; // 64 bytes per record
        let _ = pipeline.submit(black_box(data));
    }
    pipeline.stop(None).expect("Stop failed");
    black_box(delivered.load(Ordering::Relaxed));
}

fn benchmark_pipeline_pool_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline_10000_records");
    group.throughput(Throughput::Elements(EVENTS));
    for (filter, output) in [(1, 1), (2, 1), (4, 2)] {
        group.bench_with_input(
            BenchmarkId::new("blocking", format!("{filter}x{output}")),
            &(filter, output),
            |b, &(filter, output)| b.iter(|| run_pipeline(filter, output, WaitStrategyKind::Blocking)),
        );
    }
    group.bench_function(BenchmarkId::new("busy_spin", "1x1"), |b| {
        b.iter(|| run_pipeline(1, 1, WaitStrategyKind::BusySpin))
    });
    group.finish();
}

fn benchmark_raw_ring_buffer(c: &mut Criterion) {
    let mut group = c.benchmark_group("ring_buffer");
    group.throughput(Throughput::Elements(EVENTS));
    group.bench_function("publish_claim_single_worker", |b| {
        b.iter(|| {
            let buffer = Arc::new(RingBuffer::new("bench", 1024).expect("Buffer creation failed"));
            let mut cursors = buffer.add_group(1).expect("Group registration failed");
            let consumer = {
                let buffer = Arc::clone(&buffer);
                std::thread::spawn(move || {
                    let mut sum = 0u64;
                    while let Some(claimed) = buffer.claim_next(&mut cursors[0]) {
                        sum = sum.wrapping_add(*claimed);
                    }
                    sum
                })
            };
            for i in 0..EVENTS {
                let _ = buffer.publish(black_box(i));
            }
            buffer.shutdown();
            black_box(consumer.join().expect("Consumer panicked"));
        });
    });
    group.finish();
}

criterion_group!(
    name = benches;
    config = Criterion::default().measurement_time(Duration::from_secs(10));
    targets = benchmark_pipeline_pool_sizes, benchmark_raw_ring_buffer
);
criterion_main!(benches);
