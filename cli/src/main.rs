use std::{path::PathBuf, time::Duration};
use anyhow::Context;
use clap::Parser;
use segswarm::{read_manifest, start_swarm, Config, TrackerEvent};

#[derive(Parser)]
struct Args {
    #[arg(short, long, help = "Number of peers, the tracker is not counted")]
    peers: usize,

    #[arg(short, long, default_value = ".", help = "Directory holding in<rank>.txt manifests")]
    input_dir: PathBuf,

    #[arg(short, long, help = "Directory for downloaded files, defaults to the input directory")]
    output_dir: Option<PathBuf>,

    #[arg(long, default_value_t = 50, help = "Empty cycles before a download is abandoned")]
    max_stall_retries: u32,

    #[arg(long, default_value_t = 1000, help = "Longest pause between stalled cycles in ms")]
    max_backoff_ms: u64,

    #[arg(short, long, help = "Verbose output")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {

    let args = Args::parse();

    // Set up logging.
    let level = if args.verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    let format = tracing_subscriber::fmt::format();
    let sub = tracing_subscriber::fmt()
        .with_max_level(level)
        .event_format(format)
        .finish();
    tracing::subscriber::set_global_default(sub).context("failed to install log subscriber")?;

    let mut manifests = Vec::with_capacity(args.peers);
    for rank in 1..=args.peers {
        let manifest = read_manifest(&args.input_dir, rank)
            .await
            .with_context(|| format!("failed to load manifest for peer {}", rank))?;
        manifests.push(manifest);
    }

    let config = Config {
        output_dir: args.output_dir.unwrap_or_else(|| args.input_dir.clone()),
        stall_backoff_max: Duration::from_millis(args.max_backoff_ms),
        max_stall_retries: args.max_stall_retries,
        ..Config::default()
    };

    let (events_tx, mut events_rx) = tokio::sync::mpsc::unbounded_channel();
    let handle = start_swarm(config, manifests, Some(events_tx));

    while let Some(event) = events_rx.recv().await {
        match event {
            TrackerEvent::PeerFinished { peer } => println!("peer {} finished downloading", peer),
            TrackerEvent::Shutdown => break,
            _ => {}
        }
    }

    let outcome = handle.join().await.context("swarm failed")?;
    for report in outcome.reports.iter() {
        println!(
            "peer {}: {} complete, {} stalled, {} unknown, {} segments fetched, {} served",
            report.rank,
            report.downloads.completed.len(),
            report.downloads.stalled.len(),
            report.downloads.unknown.len(),
            report.downloads.segments_fetched,
            report.uploads.segments_served,
        );
    }
    for (file, swarm) in outcome.directory.files() {
        println!("{}: {} segments, {} providers", file, swarm.segments_no, swarm.providers.len());
    }

    Ok(())
}
