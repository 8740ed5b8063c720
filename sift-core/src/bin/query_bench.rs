//! Query Benchmarking Tool
//!
//! Indexes a text file into an in-memory partition, one document per line,
//! then times evaluation and ranking of a few queries against it.
//!
//! ## Usage
//!
//! ```bash
//! # Default query mix
//! ./target/release/query_bench /path/to/abstracts.txt
//!
//! # Custom queries: space separated terms are ANDed, quoted ones form a phrase
//! ./target/release/query_bench /path/to/abstracts.txt "rust compiler" '"search engine"'
//! ```
//!
//! Set `RUST_LOG=debug` to see per-partition evaluation logs.
//!
//! ## Example Output
//!
//! ```text
//! --------------------------------
//! Query       : And([Term(DictTerm { name: "rust", .. }), ..])
//! Elapsed     : 0.412 ms
//! Matches     : 1_204
//! Top score   : 0.981
//! --------------------------------
//! ```

use std::env;
use std::fs;
use std::time::{Duration, Instant};

use log::LevelFilter;
use log4rs::append::console::{ConsoleAppender, Target};
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;

use sift_core::{
    MemoryPartitionBuilder, Partition, QueryConfig, QueryElement, QueryEvaluator, ResultSet,
    SortSpec, WeightingKind,
};

const WARMUP_RUNS: usize = 1;
const MEASURE_RUNS: usize = 5;
const PAGE: usize = 10;

const DEFAULT_QUERIES: &[&str] = &["the", "search engine", "\"united states\"", "hist*"];

fn main() -> std::io::Result<()> {
    init_logging();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: query_bench <path> [query...]");
        std::process::exit(1);
    }
    let path = &args[1];

    println!("Loading file...");
    let text = fs::read_to_string(path)?;

    let start = Instant::now();
    let mut builder = MemoryPartitionBuilder::new(path.as_str());
    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        builder.add(line);
    }
    let partition = builder.build();
    println!("Documents : {}", fmt_count(u64::from(partition.n_docs())));
    println!("Tokens    : {}", fmt_count(partition.n_tokens()));
    println!("Indexed in {:.3} s\n", start.elapsed().as_secs_f64());

    let queries: Vec<String> = if args.len() > 2 {
        args[2..].to_vec()
    } else {
        DEFAULT_QUERIES.iter().map(|q| q.to_string()).collect()
    };

    let partitions: [&dyn Partition; 1] = [&partition];
    let evaluator = QueryEvaluator::new(QueryConfig::ranked(WeightingKind::Okapi));
    for raw in &queries {
        bench_query(&evaluator, &partitions, &parse_query(raw));
    }
    Ok(())
}

fn init_logging() {
    let level = match env::var("RUST_LOG").as_deref() {
        Ok("trace") => LevelFilter::Trace,
        Ok("debug") => LevelFilter::Debug,
        Ok("info") => LevelFilter::Info,
        _ => LevelFilter::Warn,
    };
    let stderr = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new("[{l}] {t}: {m}{n}")))
        .build();
    let config = Config::builder()
        .appender(Appender::builder().build("stderr", Box::new(stderr)))
        .build(Root::builder().appender("stderr").build(level));
    match config {
        Ok(config) => {
            if let Err(err) = log4rs::init_config(config) {
                eprintln!("logging disabled: {err}");
            }
        }
        Err(err) => eprintln!("logging disabled: {err}"),
    }
}

/// `"a b"` is a phrase, anything else ANDs its whitespace separated terms.
fn parse_query(raw: &str) -> QueryElement {
    let trimmed = raw.trim();
    let phrase = trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"');
    let inner = if phrase { &trimmed[1..trimmed.len() - 1] } else { trimmed };
    let mut terms: Vec<QueryElement> = inner.split_whitespace().map(QueryElement::term).collect();
    match (phrase, terms.len()) {
        (_, 1) => terms.remove(0),
        (true, _) => QueryElement::phrase(terms),
        (false, _) => QueryElement::and(terms),
    }
}

fn bench_query(evaluator: &QueryEvaluator, partitions: &[&dyn Partition], query: &QueryElement) {
    warmup(|| {
        std::hint::black_box(run(evaluator, partitions, query));
    });

    let mut outcome = (0usize, None);
    let elapsed = measure(|| {
        outcome = run(evaluator, partitions, query);
        std::hint::black_box(&outcome);
    });

    let (matches, top) = outcome;
    println!("--------------------------------");
    println!("Query       : {query:?}");
    println!("Elapsed     : {:.3} ms", elapsed.as_secs_f64() * 1000.0);
    println!("Matches     : {}", fmt_count(matches as u64));
    if let Some(top) = top {
        println!("Top score   : {top:.3}");
    }
    println!("--------------------------------\n");
}

fn run(
    evaluator: &QueryEvaluator,
    partitions: &[&dyn Partition],
    query: &QueryElement,
) -> (usize, Option<f32>) {
    let stats = evaluator.stats(partitions, query);
    let results = ResultSet::new(evaluator, query, &stats, partitions, SortSpec::by_score());
    let page = results.get_results(0, PAGE);
    (results.size(), page.first().map(|h| h.score))
}

fn warmup<F: FnMut()>(mut f: F) {
    for _ in 0..WARMUP_RUNS {
        f();
    }
}

fn measure<F: FnMut()>(mut f: F) -> Duration {
    let mut total = Duration::ZERO;

    for _ in 0..MEASURE_RUNS {
        let start = Instant::now();
        f();
        total += start.elapsed();
    }

    total / MEASURE_RUNS as u32
}

fn fmt_count(n: u64) -> String {
    let s = n.to_string();
    let mut out = String::with_capacity(s.len() + s.len() / 3);

    for (i, ch) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            out.push('_');
        }
        out.push(ch);
    }

    out.chars().rev().collect()
}
