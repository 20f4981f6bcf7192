use tokio::sync::mpsc;
use crate::{
    segments::Segments,
    swarm::{SwarmDirectory, SwarmState},
    transport::{Channel, Endpoint, Mailbox, Message, Outbox, TransportError},
    Rank,
    TRACKER_RANK,
};


pub type Result<T> = std::result::Result<T, TrackerError>;
pub type EventTx = mpsc::UnboundedSender<TrackerEvent>;
pub type EventRx = mpsc::UnboundedReceiver<TrackerEvent>;

#[derive(thiserror::Error, Debug)]
pub enum TrackerError {

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerPhase {

    // Collecting every peer's held files.
    Admitting,

    // Telling peers registration is over.
    Confirming,

    // Answering want requests until every downloading peer is done.
    Serving,

    // Telling peers to stop uploading.
    Draining,

    Terminated,

}

// Observable steps of the serving loop, in the order the tracker takes them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerEvent {

    // Snapshot of `file` sent to `peer`.
    Served { peer: Rank, file: String },

    // Progress report from `peer` applied.
    Progress { peer: Rank, file: String, last: usize },

    // `peer` has processed its whole want list.
    PeerFinished { peer: Rank },

    Shutdown,

}

pub struct Tracker {

    outbox: Outbox,

    mailbox: Mailbox,

    directory: SwarmDirectory,

    phase: TrackerPhase,

    // Serving loop observers.
    events: Option<EventTx>,

    // Peers with at least one wanted file.
    leechers: usize,

    // Peers that sent their completion marker.
    finished: usize,

}

impl Tracker {

    pub fn new(endpoint: Endpoint, events: Option<EventTx>) -> Self {
        debug_assert_eq!(endpoint.rank(), TRACKER_RANK);
        Self {
            outbox: endpoint.outbox,
            mailbox: endpoint.main,
            directory: SwarmDirectory::new(),
            phase: TrackerPhase::Admitting,
            events,
            leechers: 0,
            finished: 0,
        }
    }

    // Drives the tracker through every phase and hands back the final directory.
    pub async fn run(mut self) -> Result<SwarmDirectory> {
        self.admit().await?;

        self.set_phase(TrackerPhase::Confirming);
        self.outbox.broadcast(Channel::Control, Message::Ack)?;

        self.set_phase(TrackerPhase::Serving);
        self.count_leechers().await?;
        self.serve().await?;

        self.set_phase(TrackerPhase::Draining);
        self.outbox.broadcast(Channel::Request, Message::Fin)?;
        self.emit(TrackerEvent::Shutdown);

        self.set_phase(TrackerPhase::Terminated);
        Ok(self.directory)
    }

    fn set_phase(&mut self, phase: TrackerPhase) {
        tracing::info!("{:?} -> {:?}", self.phase, phase);
        self.phase = phase;
    }

    fn emit(&self, event: TrackerEvent) {
        if let Some(tx) = &self.events {
            tx.send(event).ok();
        }
    }

    fn peers(&self) -> std::ops::Range<Rank> {
        (TRACKER_RANK + 1)..self.outbox.size()
    }

    // Registers each peer's held files, lowest rank first.
    async fn admit(&mut self) -> Result<()> {
        for peer in self.peers() {
            let count = self.recv_count(peer, Channel::Registration).await?;
            tracing::debug!("peer {} holds {} files", peer, count);

            for _ in 0..count {
                let name = match self.mailbox.recv_from(peer, Channel::Registration).await? {
                    Message::FileName(name) => Some(name),
                    other => {
                        tracing::warn!("expected file name from {}, got {:?}", peer, other);
                        None
                    }
                };
                let manifest = match self.mailbox.recv_from(peer, Channel::Registration).await? {
                    Message::Manifest(segments) => Some(segments),
                    other => {
                        tracing::warn!("expected manifest from {}, got {:?}", peer, other);
                        None
                    }
                };

                if let (Some(name), Some(manifest)) = (name, manifest) {
                    self.register(&name, manifest, peer);
                }
            }
        }

        tracing::info!("admitted {} files", self.directory.len());
        Ok(())
    }

    fn register(&mut self, name: &str, manifest: Segments, peer: Rank) {
        tracing::debug!("{} registers {} with {} segments", peer, name, manifest.len());
        self.directory.register_holder(name, manifest, peer);
    }

    // Peers wanting nothing never send a completion marker the loop waits on.
    async fn count_leechers(&mut self) -> Result<()> {
        let mut leechers = 0;
        for peer in self.peers() {
            if self.recv_count(peer, Channel::Want).await? > 0 {
                leechers += 1;
            }
        }
        self.leechers = leechers;
        tracing::info!("{} peers downloading", leechers);
        Ok(())
    }

    // One request at a time: snapshot out, progress in, then the completion check.
    async fn serve(&mut self) -> Result<()> {
        while self.finished < self.leechers {
            let request = self.mailbox.recv_any(Channel::Want).await?;
            let peer = request.from;
            let file = match request.message {
                Message::FileName(file) => file,
                other => {
                    tracing::warn!("expected file request from {}, got {:?}", peer, other);
                    String::new()
                }
            };

            let snapshot = self.directory.snapshot(&file).unwrap_or_else(|| {
                tracing::warn!("{} requested unknown file {:?}", peer, file);
                SwarmState::default()
            });
            tracing::debug!("send {} swarm to {}", file, peer);
            self.outbox.send(peer, Channel::Reply, Message::Snapshot(snapshot))?;
            self.emit(TrackerEvent::Served { peer, file });

            match self.mailbox.recv_from(peer, Channel::Progress).await? {
                Message::Progress { file, last } => {
                    self.directory.apply_progress(&file, peer, last);
                    self.emit(TrackerEvent::Progress { peer, file, last });
                }
                other => tracing::warn!("expected progress from {}, got {:?}", peer, other),
            }

            // The peer's next message is either another request or its completion marker.
            let next = self.mailbox
                .probe_where(|e| e.from == peer && matches!(e.channel, Channel::Want | Channel::Signal))
                .await?
                .channel;
            if next == Channel::Signal {
                match self.mailbox.recv_from(peer, Channel::Signal).await? {
                    Message::Fin => {
                        self.finished += 1;
                        tracing::info!("peer {} finished, {}/{}", peer, self.finished, self.leechers);
                        self.emit(TrackerEvent::PeerFinished { peer });
                    }
                    other => tracing::warn!("expected completion from {}, got {:?}", peer, other),
                }
            }
        }
        Ok(())
    }

    async fn recv_count(&mut self, peer: Rank, channel: Channel) -> Result<u32> {
        match self.mailbox.recv_from(peer, channel).await? {
            Message::Count(count) => Ok(count),
            other => {
                tracing::warn!("expected count from {} on {:?}, got {:?}", peer, channel, other);
                Ok(0)
            }
        }
    }
}
