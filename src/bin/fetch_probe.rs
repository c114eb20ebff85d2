//! Small CLI tool that drives a single `Fetcher` against a real host, for
//! manual interop testing against a serving daemon.
//!
//! Requires the `test-support` feature (for the in-memory `TaskOutput`
//! and `Merger` fakes): `cargo run --bin fetch-probe --features test-support -- ...`

use std::sync::Arc;

use clap::Parser;
use shuffle_fetch::attempt::AttemptId;
use shuffle_fetch::collaborators::fakes::{RecordingMerger, TempDirTaskOutput};
use shuffle_fetch::http::MapOutputClient;
use shuffle_fetch::{FetcherBuilder, ShuffleClientConfig};

/// Fetches one batch of attempts from a shuffle serving daemon and prints
/// the resulting `FetchResult` and callback log.
#[derive(Parser, Debug)]
#[command(name = "fetch-probe", version, about)]
struct Args {
    /// Serving daemon host.
    #[arg(long)]
    host: String,

    /// Serving daemon port.
    #[arg(long)]
    port: u16,

    /// Reduce partition to fetch.
    #[arg(long)]
    partition: i32,

    /// Job identifier sent in the `mapOutput` query string.
    #[arg(long, default_value = "probe-job")]
    job_id: String,

    /// Path components to request, comma-separated.
    #[arg(long, value_delimiter = ',')]
    paths: Vec<String>,

    /// Shared HMAC secret for request signing.
    #[arg(long, default_value = "")]
    hmac_key: String,

    /// Use https instead of http.
    #[arg(long)]
    encrypted: bool,

    /// Directory to write disk-placed outputs into.
    #[arg(long, default_value = "./fetch-probe-out")]
    out_dir: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let args = Args::parse();

    let batch: Vec<AttemptId> = args
        .paths
        .iter()
        .enumerate()
        .map(|(i, p)| AttemptId::new(i as u32, 0, p.clone()))
        .collect();

    let config = ShuffleClientConfig::builder(1 << 30)
        .encrypted_transfer(args.encrypted)
        .build();

    let allocator = Arc::new(shuffle_fetch::OutputAllocator::new(
        config.shuffle_buffer_bytes(),
        config.max_single_memory_segment_fraction,
    ));
    let task_output = Arc::new(TempDirTaskOutput::new(args.out_dir));
    let merger = Arc::new(RecordingMerger::new());
    let event_sink = Arc::new(shuffle_fetch::callback::fakes::RecordingEventSink::new());
    let http = MapOutputClient::new(args.hmac_key.into_bytes());

    let fetcher = shuffle_fetch::Fetcher::build(
        FetcherBuilder::new(args.host, args.port, args.partition).assign_batch(batch),
        args.job_id,
        http,
        allocator,
        task_output,
        merger,
        event_sink.clone(),
        config,
    );

    let result = fetcher.run().await;

    println!("remaining unfetched: {}", result.remaining_unfetched.len());
    for attempt in &result.remaining_unfetched {
        println!("  unfetched: {attempt}");
    }
    for succeeded in event_sink.succeeded.lock().unwrap().iter() {
        println!("succeeded: {}", succeeded.attempt);
    }
    for failed in event_sink.failed.lock().unwrap().iter() {
        println!(
            "failed: {} (connect_failed={})",
            failed.attempt, failed.connect_failed
        );
    }

    Ok(())
}
