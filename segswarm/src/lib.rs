use futures::future::join_all;
use tokio::task::JoinHandle;
use tracing::Instrument;

mod config;
mod segments;
mod manifest;
mod swarm;
mod transport;
mod tracker;
mod peer;
mod fs;
pub mod stats;
#[cfg(test)]
mod tests;

// Participant index, the tracker is always rank 0.
pub type Rank = usize;

pub const TRACKER_RANK: Rank = 0;

// Width in bytes of a segment hash.
pub const HASH_SIZE: usize = 32;

// Longest file name the protocol carries.
pub const MAX_FILENAME: usize = 15;

// Segments pulled from a single provider per cycle.
pub const BATCH_SIZE: usize = 10;

// Progress value on which the tracker adds the reporter as a new provider.
// Equal to BATCH_SIZE so a first full batch registers the peer.
pub const NEW_PROVIDER_SENTINEL: usize = 10;

// Re-exports
pub use config::Config;
pub use segments::{HashError, SegmentHash, Segments};
pub use manifest::{FileManifest, ManifestError, PeerManifest};
pub use swarm::{HashRange, ProviderRecord, Role, SwarmDirectory, SwarmState};
pub use transport::{network, Channel, Endpoint, Envelope, Mailbox, Message, Outbox, TransportError};
pub use tracker::{EventRx, EventTx, Tracker, TrackerError, TrackerEvent, TrackerPhase};
pub use peer::{DownloadError, DownloadSession, Downloader, Peer, PeerError, Uploader};
pub use fs::{output_path, read_manifest, write_download, FsError};
pub use stats::{DownloadStats, PeerReport, UploadStats};

#[derive(thiserror::Error, Debug)]
pub enum SwarmError {

    #[error("tracker error: {0}")]
    Tracker(#[from] TrackerError),

    #[error("peer {rank} error: {source}")]
    Peer {
        rank: Rank,
        source: PeerError,
    },

    #[error("{0} task panicked")]
    TaskPanic(String),

}

pub type Result<T> = std::result::Result<T, SwarmError>;

// Runs the tracker and one peer per manifest on a shared in-process network.
// Manifests are assigned ranks 1.. in order.
pub fn start_swarm(config: Config, manifests: Vec<PeerManifest>, events: Option<EventTx>) -> SwarmHandle {
    let mut endpoints = network(manifests.len() + 1);
    let tracker = Tracker::new(endpoints.remove(TRACKER_RANK), events);
    let tracker_handle = tokio::spawn(tracker.run().instrument(tracing::info_span!("tracker")));

    let peer_handles = endpoints
        .into_iter()
        .zip(manifests)
        .map(|(endpoint, manifest)| {
            let rank = endpoint.rank();
            let peer = Peer::new(endpoint, manifest, config.clone());
            let handle = tokio::spawn(peer.run().instrument(tracing::info_span!("peer", rank)));
            (rank, handle)
        })
        .collect();

    SwarmHandle { tracker_handle, peer_handles }
}

// Handle returned to the caller of `start_swarm`.
pub struct SwarmHandle {

    tracker_handle: JoinHandle<tracker::Result<SwarmDirectory>>,

    peer_handles: Vec<(Rank, JoinHandle<peer::Result<PeerReport>>)>,

}

// Final state of a swarm once every participant has stopped.
#[derive(Debug)]
pub struct SwarmOutcome {

    pub directory: SwarmDirectory,

    pub reports: Vec<PeerReport>,

}

impl SwarmHandle {

    pub async fn join(self) -> Result<SwarmOutcome> {
        let (ranks, handles): (Vec<_>, Vec<_>) = self.peer_handles.into_iter().unzip();

        let directory = self.tracker_handle
            .await
            .map_err(|e| SwarmError::TaskPanic(format!("tracker: {}", e)))??;

        let mut reports = Vec::with_capacity(ranks.len());
        for (rank, joined) in ranks.into_iter().zip(join_all(handles).await) {
            let report = joined
                .map_err(|e| SwarmError::TaskPanic(format!("peer {}: {}", rank, e)))?
                .map_err(|source| SwarmError::Peer { rank, source })?;
            reports.push(report);
        }

        Ok(SwarmOutcome { directory, reports })
    }
}
