//! Word count over a stream of text lines
//!
//! Pipeline:
//! 1. Filter (pool of 4): tokenize each line into lowercase words, skipping blank lines
//! 2. Output (pool of 2): merge word counts; each worker keeps its own partial map
//!
//! Usage: cargo run --example word_count --release [path/to/settings.toml]

use parking_lot::Mutex;
use ring_pipeline::{InMemoryMetrics, PipelineBuilder, PipelineSettings};
use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tracing::info;
use tracing_subscriber::EnvFilter;

const TEXT: &str = "the quick brown fox jumps over the lazy dog
a stitch in time saves nine

all that glitters is not gold
the early bird catches the worm
where there is smoke there is fire";

fn main() -> ring_pipeline::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = match std::env::args().nth(1) {
        Some(path) => PipelineSettings::from_file(path)?,
        None => PipelineSettings {
            filter_pool_size: 4,
            output_pool_size: 2,
            ..PipelineSettings::default()
        },
    };
    let output_pool_size = settings.output_pool_size;

    // One partial map per output worker, merged once the pipeline is stopped
    let partials: Arc<Vec<Mutex<HashMap<String, u64>>>> =
        Arc::new((0..output_pool_size).map(|_| Mutex::default()).collect());
    let metrics = Arc::new(InMemoryMetrics::new());

    let pipeline = {
        let partials = Arc::clone(&partials);
        PipelineBuilder::new()
            .settings(settings)
            .filter(|line: &String, _| {
                let words: Vec<String> = line
                    .split_whitespace()
                    .map(|word| word.to_lowercase())
                    .collect();
                Ok((!words.is_empty()).then_some(words))
            })
            .output(move |words: &Vec<String>, sequence| {
                let mut partial = partials[sequence as usize % partials.len()].lock();
                for word in words {
                    *partial.entry(word.clone()).or_default() += 1;
                }
                Ok(())
            })
            .metrics(metrics.clone())
            .build()?
    };

    let start = Instant::now();
    pipeline.start()?;
    thread::scope(|scope| {
        for _ in 0..2 {
            scope.spawn(|| {
                for _ in 0..1_000 {
                    for line in TEXT.lines() {
                        if pipeline.submit(line.to_string()).is_err() {
                            return;
                        }
                    }
                }
            });
        }
    });
    pipeline.stop(None)?;
    info!(elapsed_ms = start.elapsed().as_millis() as u64, "word count finished");

    let mut totals: HashMap<String, u64> = HashMap::new();
    for partial in partials.iter() {
        for (word, count) in partial.lock().drain() {
            *totals.entry(word).or_default() += count;
        }
    }
    let mut totals: Vec<_> = totals.into_iter().collect();
    totals.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    println!("\n=== Top 10 words ===");
    for (word, count) in totals.iter().take(10) {
        println!("  {word:>10}: {count}");
    }
    println!("\n{}", metrics.summary());

    Ok(())
}
