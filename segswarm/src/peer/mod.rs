use tracing::Instrument;
use crate::{
    config::Config,
    fs::FsError,
    manifest::{FileManifest, PeerManifest},
    stats::PeerReport,
    transport::{Channel, Endpoint, Message, Outbox, TransportError},
    TRACKER_RANK,
};

mod download;
mod upload;

pub use download::{DownloadError, DownloadSession, Downloader};
pub use upload::Uploader;

pub type Result<T, E = PeerError> = std::result::Result<T, E>;

#[derive(thiserror::Error, Debug)]
pub enum PeerError {

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("fs error: {0}")]
    Fs(#[from] FsError),

    #[error("{0} task panicked")]
    TaskPanic(&'static str),

}

// A participant that seeds its held files and fetches its wanted ones.
pub struct Peer {

    endpoint: Endpoint,

    manifest: PeerManifest,

    config: Config,

}

impl Peer {

    pub fn new(endpoint: Endpoint, manifest: PeerManifest, config: Config) -> Self {
        Self { endpoint, manifest, config }
    }

    // Registers with the tracker, then runs the uploader and downloader side by side.
    pub async fn run(self) -> Result<PeerReport> {
        let Endpoint { outbox, mut main, upload } = self.endpoint;
        let rank = outbox.rank();

        register(&outbox, &self.manifest.owned)?;
        match main.recv_from(TRACKER_RANK, Channel::Control).await? {
            Message::Ack => tracing::debug!("registration acknowledged"),
            other => tracing::warn!("tracker did not acknowledge registration: {:?}", other),
        }

        let uploader = Uploader::new(outbox.clone(), upload);
        let downloader = Downloader::new(outbox, main, self.manifest.wanted, self.config);

        let upload_handle = tokio::spawn(uploader.run().instrument(tracing::info_span!("upload")));
        let download_handle = tokio::spawn(downloader.run().instrument(tracing::info_span!("download")));
        let (downloaded, uploaded) = tokio::join!(download_handle, upload_handle);

        let downloads = downloaded.map_err(|_| PeerError::TaskPanic("download"))??;
        let uploads = uploaded.map_err(|_| PeerError::TaskPanic("upload"))??;

        Ok(PeerReport { rank, downloads, uploads })
    }
}

fn register(outbox: &Outbox, owned: &[FileManifest]) -> Result<()> {
    outbox.send(TRACKER_RANK, Channel::Registration, Message::Count(owned.len() as u32))?;
    for file in owned {
        outbox.send(TRACKER_RANK, Channel::Registration, Message::FileName(file.name.clone()))?;
        outbox.send(TRACKER_RANK, Channel::Registration, Message::Manifest(file.segments.clone()))?;
    }
    tracing::debug!("registered {} files", owned.len());
    Ok(())
}
