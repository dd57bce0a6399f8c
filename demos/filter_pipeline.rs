//! Log ingestion demo: raw lines are parsed and filtered by severity,
//! and the surviving records are tallied by the output stage.
//!
//! Pipeline:
//! 1. Producers: four threads submit raw log lines
//! 2. Filter (pool of 2): parse `LEVEL service message`, drop DEBUG and INFO
//! 3. Output (pool of 1): count records per service
//!
//! Usage: RUST_LOG=ring_pipeline=debug cargo run --example filter_pipeline --release

use parking_lot::Mutex;
use ring_pipeline::{
    InMemoryMetrics, Pipeline, PipelineBuilder, PipelineSettings, ProcessingError, Sequence,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const SETTINGS: &str = r#"
ingress_capacity = 256
intermediate_capacity = 64
filter_pool_size = 2
output_pool_size = 1
ingress_wait_strategy = "blocking"
intermediate_wait_strategy = "sleeping"
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug)]
struct Record {
    level: Level,
    service: String,
    message: String,
}

fn parse(line: &str) -> Result<Record, ProcessingError> {
    let mut parts = line.splitn(3, ' ');
    let level = match parts.next() {
        Some("DEBUG") => Level::Debug,
        Some("INFO") => Level::Info,
        Some("WARN") => Level::Warn,
        Some("ERROR") => Level::Error,
        other => return Err(ProcessingError::msg(format!("unknown level {other:?}"))),
    };
    let service = parts
        .next()
        .ok_or_else(|| ProcessingError::msg("missing service"))?
        .to_string();
    let message = parts.next().unwrap_or_default().to_string();
    Ok(Record { level, service, message })
}

fn raw_line(producer: usize, i: usize) -> String {
    let level = ["DEBUG", "INFO", "WARN", "ERROR", "TRACE"][i % 5];
    let service = ["api", "db", "auth"][(i + producer) % 3];
    format!("{level} {service} request {i} from producer {producer}")
}

fn main() -> ring_pipeline::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = PipelineSettings::from_toml_str(SETTINGS)?;
    let metrics = Arc::new(InMemoryMetrics::new());
    let per_service: Arc<Mutex<BTreeMap<String, (u64, u64)>>> = Arc::default();

    let pipeline: Pipeline<String, Record> = {
        let per_service = Arc::clone(&per_service);
        PipelineBuilder::new()
            .settings(settings)
            .filter(|line: &String, _| {
                let record = parse(line)?;
                Ok((record.level >= Level::Warn).then_some(record))
            })
            .output(move |record: &Record, _| {
                let mut per_service = per_service.lock();
                let counts = per_service.entry(record.service.clone()).or_default();
                match record.level {
                    Level::Error => counts.1 += 1,
                    _ => counts.0 += 1,
                }
                if record.message.is_empty() {
                    return Err(ProcessingError::msg("empty message"));
                }
                Ok(())
            })
            .error_sink(Arc::new(|stage: &str, sequence: Sequence, error: &ProcessingError| {
                warn!(stage, sequence, %error, "dropped record");
            }))
            .metrics(metrics.clone())
            .build()?
    };

    let start = Instant::now();
    pipeline.start()?;

    thread::scope(|scope| {
        for producer in 0..4 {
            let pipeline = &pipeline;
            scope.spawn(move || {
                for i in 0..2_500 {
                    if pipeline.is_throttled() {
                        thread::yield_now();
                    }
                    if let Err(err) = pipeline.submit(raw_line(producer, i)) {
                        warn!(producer, %err, "submit rejected");
                        break;
                    }
                }
            });
        }
    });

    pipeline.stop(None)?;
    let elapsed = start.elapsed();

    info!(elapsed_ms = elapsed.as_millis() as u64, "pipeline finished");
    println!("\n=== Records per service (warn, error) ===");
    for (service, (warn, error)) in per_service.lock().iter() {
        println!("  {service:>5}: {warn:>5} warn, {error:>5} error");
    }
    println!("\n{}", metrics.summary());
    for stats in pipeline.buffer_stats() {
        println!("  buffer {}: cursor {} / capacity {}", stats.name, stats.cursor, stats.capacity);
    }

    Ok(())
}
