use std::ops::Range;
use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
use crate::{
    config::Config,
    fs,
    stats::DownloadStats,
    swarm::SwarmState,
    transport::{Channel, Mailbox, Message, Outbox, TransportError},
    Rank,
    BATCH_SIZE,
    TRACKER_RANK,
};
use super::Result;

#[derive(thiserror::Error, Debug)]
pub enum DownloadError {

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("tracker has no swarm for {0}")]
    UnknownFile(String),

    #[error("{file} stalled at segment {cursor}, no provider is ahead")]
    Stalled { file: String, cursor: usize },

}

// Peer local state of one file being fetched.
#[derive(Debug, Clone)]
pub struct DownloadSession {

    pub file: String,

    // Swarm as of the latest snapshot.
    pub swarm: SwarmState,

    // Segments confirmed so far, everything below this index is held.
    pub last: usize,

}

impl DownloadSession {

    pub fn new(file: &str) -> Self {
        Self {
            file: file.to_owned(),
            swarm: SwarmState::default(),
            last: 0,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.last == self.swarm.segments_no
    }

    // Registered swarms always carry their first holder.
    pub fn is_known(&self) -> bool {
        !self.swarm.providers.is_empty()
    }

    // Next run of segments to pull, clipped to the file length.
    pub fn next_batch(&self) -> Range<usize> {
        self.last..(self.last + BATCH_SIZE).min(self.swarm.segments_no)
    }

    // Shuffles the providers and returns the first one ahead of the cursor.
    pub fn pick_provider<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<Rank> {
        self.swarm.providers.shuffle(rng);
        self.swarm.providers
            .iter()
            .find(|provider| provider.interval.last > self.last)
            .map(|provider| provider.id)
    }
}

pub struct Downloader {

    outbox: Outbox,

    // Snapshots from the tracker and acks from providers.
    mailbox: Mailbox,

    wanted: Vec<String>,

    config: Config,

    rng: StdRng,

}

impl Downloader {

    pub fn new(outbox: Outbox, mailbox: Mailbox, wanted: Vec<String>, config: Config) -> Self {
        Self {
            outbox,
            mailbox,
            wanted,
            config,
            rng: StdRng::from_entropy(),
        }
    }

    // Fetches every wanted file in order, then tells the tracker it is done.
    pub async fn run(mut self) -> Result<DownloadStats> {
        let wanted = std::mem::take(&mut self.wanted);
        self.outbox.send(TRACKER_RANK, Channel::Want, Message::Count(wanted.len() as u32))?;

        let mut stats = DownloadStats::default();
        for file in wanted {
            match self.download(&file, &mut stats).await {
                Ok(session) => {
                    let path = fs::write_download(
                        &self.config.output_dir,
                        self.outbox.rank(),
                        &session.file,
                        &session.swarm.segments,
                    ).await;
                    match path {
                        Ok(path) => tracing::info!("{} complete, saved to {}", file, path.display()),
                        Err(e) => tracing::error!("{} complete but not saved: {}", file, e),
                    }
                    stats.completed.push(file);
                }
                Err(DownloadError::UnknownFile(file)) => {
                    tracing::warn!("tracker has no swarm for {}", file);
                    stats.unknown.push(file);
                }
                Err(DownloadError::Stalled { file, cursor }) => {
                    tracing::warn!("giving up on {} at segment {}", file, cursor);
                    stats.stalled.push(file);
                }
                Err(DownloadError::Transport(e)) => return Err(e.into()),
            }
        }

        self.outbox.send(TRACKER_RANK, Channel::Signal, Message::Fin)?;
        tracing::info!(
            "downloaded {} of {} files ({} segments)",
            stats.completed.len(), stats.processed(), stats.segments_fetched,
        );
        Ok(stats)
    }

    // Request, pull a batch, report. Repeats until the cursor reaches the end of the file.
    #[tracing::instrument(skip(self, stats))]
    async fn download(&mut self, file: &str, stats: &mut DownloadStats) -> Result<DownloadSession, DownloadError> {
        let mut session = DownloadSession::new(file);
        let mut stalls = 0;
        let mut backoff = self.config.stall_backoff_initial;

        loop {
            self.outbox.send(TRACKER_RANK, Channel::Want, Message::FileName(file.to_owned()))?;
            session.swarm = self.recv_snapshot().await?;

            let fetched = match session.pick_provider(&mut self.rng) {
                Some(provider) => self.fetch_batch(&mut session, provider).await?,
                _ => 0,
            };
            stats.segments_fetched += fetched as u64;

            // The tracker waits for a report after every snapshot it sends.
            self.outbox.send(TRACKER_RANK, Channel::Progress, Message::Progress {
                file: file.to_owned(),
                last: session.last,
            })?;

            if !session.is_known() {
                return Err(DownloadError::UnknownFile(file.to_owned()));
            }
            if session.is_complete() {
                return Ok(session);
            }

            if fetched > 0 {
                stalls = 0;
                backoff = self.config.stall_backoff_initial;
                continue;
            }

            stalls += 1;
            if stalls >= self.config.max_stall_retries {
                return Err(DownloadError::Stalled { file: file.to_owned(), cursor: session.last });
            }
            tracing::debug!("no provider ahead of segment {}, retry in {:?}", session.last, backoff);
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(self.config.stall_backoff_max);
        }
    }

    async fn recv_snapshot(&mut self) -> Result<SwarmState, DownloadError> {
        match self.mailbox.recv_from(TRACKER_RANK, Channel::Reply).await? {
            Message::Snapshot(swarm) => Ok(swarm),
            other => {
                tracing::warn!("expected snapshot, got {:?}", other);
                Ok(SwarmState::default())
            }
        }
    }

    // Each segment is one request and one ack with the provider.
    async fn fetch_batch(&mut self, session: &mut DownloadSession, provider: Rank) -> Result<usize, DownloadError> {
        let batch = session.next_batch();
        tracing::debug!("fetching segments {:?} from {}", batch, provider);

        let start = session.last;
        for idx in batch {
            let Some(segment) = session.swarm.segments.get(idx) else {
                break;
            };
            self.outbox.send(provider, Channel::Request, Message::SegmentRequest {
                file: session.file.clone(),
                segment,
            })?;
            match self.mailbox.recv_from(provider, Channel::Reply).await? {
                Message::Ack => {}
                other => tracing::warn!("expected ack from {}, got {:?}", provider, other),
            }
            session.last = idx + 1;
        }

        Ok(session.last - start)
    }
}
