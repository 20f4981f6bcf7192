use std::{path::Path, time::Duration};
use tokio::sync::mpsc;
use crate::{
    segments::{test_hash, Segments},
    *,
};

type TestResult = std::result::Result<(), Box<dyn std::error::Error>>;

fn owned(name: &str, range: std::ops::Range<usize>) -> FileManifest {
    FileManifest { name: name.into(), segments: range.map(test_hash).collect() }
}

fn wanted(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

fn config(dir: &Path) -> Config {
    Config {
        output_dir: dir.to_path_buf(),
        stall_backoff_initial: Duration::from_millis(1),
        stall_backoff_max: Duration::from_millis(8),
        max_stall_retries: 5,
    }
}

fn read_output(dir: &Path, rank: Rank, file: &str) -> std::io::Result<Vec<String>> {
    let contents = std::fs::read_to_string(output_path(dir, rank, file))?;
    Ok(contents.lines().map(str::to_owned).collect())
}

fn hash_strings(segments: &Segments) -> Vec<String> {
    segments.iter().map(|hash| hash.to_string()).collect()
}

async fn collect_events(mut rx: EventRx) -> Vec<TrackerEvent> {
    let mut events = vec![];
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_single_seed_single_leecher() -> TestResult {
    let dir = tempfile::tempdir()?;
    let seed = PeerManifest { owned: vec![owned("a.txt", 0..15)], wanted: vec![] };
    let leech = PeerManifest { owned: vec![], wanted: wanted(&["a.txt"]) };
    let original = seed.owned[0].segments.clone();

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let outcome = start_swarm(config(dir.path()), vec![seed, leech], Some(events_tx)).join().await?;

    // Two batches: [0, 10) then [10, 15).
    let progress: Vec<usize> = collect_events(events_rx)
        .await
        .into_iter()
        .filter_map(|event| match event {
            TrackerEvent::Progress { peer: 2, last, .. } => Some(last),
            _ => None,
        })
        .collect();
    assert_eq!(progress, vec![10, 15]);

    let swarm = outcome.directory.snapshot("a.txt").unwrap();
    let provider = swarm.provider(2).unwrap();
    assert_eq!(provider.role, Role::Seed);
    assert_eq!(provider.interval.last, 15);
    assert_eq!(outcome.directory.leechers("a.txt"), Some(-1));

    assert_eq!(read_output(dir.path(), 2, "a.txt")?, hash_strings(&original));

    assert_eq!(outcome.reports[0].rank, 1);
    assert!(outcome.reports[0].is_seed_only());
    assert_eq!(outcome.reports[0].uploads.segments_served, 15);
    assert_eq!(outcome.reports[1].downloads.completed, wanted(&["a.txt"]));
    assert_eq!(outcome.reports[1].downloads.segments_fetched, 15);
    Ok(())
}

#[tokio::test]
async fn test_no_downloads_shuts_down() -> TestResult {
    let dir = tempfile::tempdir()?;
    let manifests = vec![
        PeerManifest { owned: vec![owned("a", 0..12)], wanted: vec![] },
        PeerManifest { owned: vec![owned("b", 0..3)], wanted: vec![] },
        PeerManifest::default(),
    ];

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let outcome = start_swarm(config(dir.path()), manifests, Some(events_tx)).join().await?;

    assert_eq!(collect_events(events_rx).await, vec![TrackerEvent::Shutdown]);
    assert_eq!(outcome.directory.len(), 2);
    assert_eq!(outcome.reports.len(), 3);
    assert!(outcome.reports.iter().all(|report| report.uploads.segments_served == 0));
    Ok(())
}

// Each request/progress pair completes before the tracker serves anyone else.
#[tokio::test]
async fn test_concurrent_requests_serialized() -> TestResult {
    let dir = tempfile::tempdir()?;
    let manifests = vec![
        PeerManifest { owned: vec![owned("shared", 0..45)], wanted: vec![] },
        PeerManifest { owned: vec![], wanted: wanted(&["shared"]) },
        PeerManifest { owned: vec![], wanted: wanted(&["shared"]) },
    ];

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let outcome = start_swarm(config(dir.path()), manifests, Some(events_tx)).join().await?;
    let events = collect_events(events_rx).await;

    let mut open: Option<Rank> = None;
    for event in events.iter() {
        match event {
            TrackerEvent::Served { peer, .. } => {
                assert_eq!(open, None, "served {} while {} was mid-turn", peer, open.unwrap_or_default());
                open = Some(*peer);
            }
            TrackerEvent::Progress { peer, .. } => {
                assert_eq!(open, Some(*peer));
                open = None;
            }
            _ => {}
        }
    }
    assert_eq!(events.last(), Some(&TrackerEvent::Shutdown));

    let original = owned("shared", 0..45).segments;
    for rank in [2, 3] {
        assert_eq!(read_output(dir.path(), rank, "shared")?, hash_strings(&original));
        let provider = outcome.directory.snapshot("shared").unwrap().provider(rank).copied().unwrap();
        assert_eq!(provider.role, Role::Seed);
        assert_eq!(provider.interval.last, 45);
    }
    assert_eq!(outcome.directory.leechers("shared"), Some(-2));
    Ok(())
}

#[tokio::test]
async fn test_mixed_swarm() -> TestResult {
    let dir = tempfile::tempdir()?;
    let manifests = vec![
        PeerManifest { owned: vec![owned("a", 0..25)], wanted: wanted(&["b"]) },
        PeerManifest { owned: vec![owned("b", 100..112)], wanted: wanted(&["a", "missing"]) },
        PeerManifest { owned: vec![], wanted: wanted(&["a", "b"]) },
    ];

    let outcome = start_swarm(config(dir.path()), manifests, None).join().await?;

    let a = owned("a", 0..25).segments;
    let b = owned("b", 100..112).segments;
    assert_eq!(read_output(dir.path(), 1, "b")?, hash_strings(&b));
    assert_eq!(read_output(dir.path(), 2, "a")?, hash_strings(&a));
    assert_eq!(read_output(dir.path(), 3, "a")?, hash_strings(&a));
    assert_eq!(read_output(dir.path(), 3, "b")?, hash_strings(&b));
    assert!(!output_path(dir.path(), 2, "missing").exists());

    let report = &outcome.reports[1];
    assert_eq!(report.downloads.completed, wanted(&["a"]));
    assert_eq!(report.downloads.unknown, wanted(&["missing"]));

    for (_, swarm) in outcome.directory.files() {
        assert_eq!(swarm.segments_no, swarm.segments.len());
        for provider in swarm.providers.iter() {
            assert_eq!(swarm.providers.iter().filter(|p| p.id == provider.id).count(), 1);
        }
    }

    let served: u64 = outcome.reports.iter().map(|r| r.uploads.segments_served).sum();
    let fetched: u64 = outcome.reports.iter().map(|r| r.downloads.segments_fetched).sum();
    assert_eq!(served, fetched);
    assert_eq!(fetched, 25 * 2 + 12 * 2);
    Ok(())
}

// Fetching a file already held, or wanting the same file twice, never adds a second record.
#[tokio::test]
async fn test_repeat_downloads_keep_one_record() -> TestResult {
    let dir = tempfile::tempdir()?;
    let manifests = vec![
        PeerManifest { owned: vec![owned("a", 0..25)], wanted: wanted(&["a"]) },
        PeerManifest { owned: vec![], wanted: wanted(&["a", "a"]) },
    ];

    let outcome = start_swarm(config(dir.path()), manifests, None).join().await?;

    let swarm = outcome.directory.snapshot("a").unwrap();
    assert_eq!(swarm.providers.len(), 2);
    for rank in [1, 2] {
        assert_eq!(swarm.providers.iter().filter(|p| p.id == rank).count(), 1);
        let provider = swarm.provider(rank).unwrap();
        assert_eq!(provider.role, Role::Seed);
        assert_eq!(provider.interval.last, 25);
    }
    assert_eq!(outcome.directory.leechers("a"), Some(-3));

    let original = owned("a", 0..25).segments;
    assert_eq!(outcome.reports[0].downloads.completed, wanted(&["a"]));
    assert_eq!(outcome.reports[1].downloads.completed, wanted(&["a", "a"]));
    assert_eq!(read_output(dir.path(), 1, "a")?, hash_strings(&original));
    assert_eq!(read_output(dir.path(), 2, "a")?, hash_strings(&original));
    Ok(())
}
