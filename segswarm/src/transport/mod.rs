use std::{collections::VecDeque, sync::Arc};
use tokio::sync::mpsc;
use crate::{segments::{SegmentHash, Segments}, swarm::SwarmState, Rank};


#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum TransportError {

    #[error("no participant with rank {0}")]
    UnknownRank(Rank),

    #[error("participant {0} is no longer receiving")]
    Disconnected(Rank),

    #[error("mailbox of participant {0} closed")]
    Closed(Rank),

}

pub type Result<T> = std::result::Result<T, TransportError>;
type MailTx = mpsc::UnboundedSender<Envelope>;
type MailRx = mpsc::UnboundedReceiver<Envelope>;

// Application chosen message tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {

    // Peer to tracker: held-file counts, names and manifests.
    Registration,

    // Peer to tracker: wanted-file count, then one file name per request.
    Want,

    // Peer to tracker: file name and cursor after a batch.
    Progress,

    // Peer to tracker: completion marker once every wanted file is processed.
    Signal,

    // Tracker to peer: readiness acknowledgement.
    Control,

    // To a downloader: swarm snapshots and segment acknowledgements.
    Reply,

    // To an uploader: segment requests from peers, shutdown from the tracker.
    Request,

}

impl Channel {
    fn lane(self) -> Lane {
        match self {
            Channel::Request => Lane::Upload,
            _ => Lane::Main,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lane {
    Main,
    Upload,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {

    Count(u32),

    FileName(String),

    // Segment list of a held file, sent right after its name.
    Manifest(Segments),

    Ack,

    Fin,

    Snapshot(SwarmState),

    // Carries the wanted hash as a placeholder, the reply is a bare ack.
    SegmentRequest { file: String, segment: SegmentHash },

    Progress { file: String, last: usize },

}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {

    pub from: Rank,

    pub channel: Channel,

    pub message: Message,

}

#[derive(Debug)]
struct Route {
    main: MailTx,
    upload: MailTx,
}

// Sending half of an endpoint, cheap to clone between the tasks of one participant.
#[derive(Debug, Clone)]
pub struct Outbox {

    rank: Rank,

    routes: Arc<Vec<Route>>,

}

impl Outbox {

    pub fn rank(&self) -> Rank {
        self.rank
    }

    // Number of participants, tracker included.
    pub fn size(&self) -> usize {
        self.routes.len()
    }

    pub fn send(&self, to: Rank, channel: Channel, message: Message) -> Result<()> {
        let route = self.routes.get(to).ok_or(TransportError::UnknownRank(to))?;
        let tx = match channel.lane() {
            Lane::Main => &route.main,
            Lane::Upload => &route.upload,
        };
        tracing::trace!("send {:?} to {} on {:?}", message, to, channel);
        tx.send(Envelope { from: self.rank, channel, message })
            .map_err(|_| TransportError::Disconnected(to))
    }

    // Delivers a copy to every participant other than the sender.
    pub fn broadcast(&self, channel: Channel, message: Message) -> Result<()> {
        for to in (0..self.size()).filter(|to| *to != self.rank) {
            self.send(to, channel, message.clone())?;
        }
        Ok(())
    }
}

// Receiving half of an endpoint. Messages that don't match the current
// receive are stashed and stay available in arrival order.
#[derive(Debug)]
pub struct Mailbox {

    rank: Rank,

    rx: MailRx,

    stash: VecDeque<Envelope>,

}

impl Mailbox {

    fn new(rank: Rank, rx: MailRx) -> Self {
        Self { rank, rx, stash: VecDeque::new() }
    }

    // Waits for the first message accepted by `pred` and removes it.
    pub async fn recv_where<F>(&mut self, pred: F) -> Result<Envelope>
    where
        F: Fn(&Envelope) -> bool,
    {
        if let Some(idx) = self.stash.iter().position(|e| pred(e)) {
            if let Some(envelope) = self.stash.remove(idx) {
                return Ok(envelope);
            }
        }
        loop {
            let envelope = self.rx.recv().await.ok_or(TransportError::Closed(self.rank))?;
            if pred(&envelope) {
                return Ok(envelope);
            }
            self.stash.push_back(envelope);
        }
    }

    // Waits for the first message accepted by `pred` without consuming it.
    pub async fn probe_where<F>(&mut self, pred: F) -> Result<&Envelope>
    where
        F: Fn(&Envelope) -> bool,
    {
        let idx = match self.stash.iter().position(|e| pred(e)) {
            Some(idx) => idx,
            None => loop {
                let envelope = self.rx.recv().await.ok_or(TransportError::Closed(self.rank))?;
                let matched = pred(&envelope);
                self.stash.push_back(envelope);
                if matched {
                    break self.stash.len() - 1;
                }
            },
        };
        Ok(&self.stash[idx])
    }

    pub async fn recv_from(&mut self, from: Rank, channel: Channel) -> Result<Message> {
        self.recv_where(|e| e.from == from && e.channel == channel)
            .await
            .map(|e| e.message)
    }

    pub async fn recv_any(&mut self, channel: Channel) -> Result<Envelope> {
        self.recv_where(|e| e.channel == channel).await
    }

    // Next message on any channel from anyone.
    pub async fn recv(&mut self) -> Result<Envelope> {
        self.recv_where(|_| true).await
    }
}

#[derive(Debug)]
pub struct Endpoint {

    pub outbox: Outbox,

    // Every channel except `Request`.
    pub main: Mailbox,

    // The `Request` channel, drained by the uploader.
    pub upload: Mailbox,

}

impl Endpoint {
    pub fn rank(&self) -> Rank {
        self.outbox.rank
    }
}

// Connects `size` participants, returned endpoints are indexed by rank.
pub fn network(size: usize) -> Vec<Endpoint> {
    let mut routes = Vec::with_capacity(size);
    let mut mailboxes = Vec::with_capacity(size);
    for rank in 0..size {
        let (main_tx, main_rx) = mpsc::unbounded_channel();
        let (upload_tx, upload_rx) = mpsc::unbounded_channel();
        routes.push(Route { main: main_tx, upload: upload_tx });
        mailboxes.push((Mailbox::new(rank, main_rx), Mailbox::new(rank, upload_rx)));
    }

    let routes = Arc::new(routes);
    mailboxes
        .into_iter()
        .enumerate()
        .map(|(rank, (main, upload))| Endpoint {
            outbox: Outbox { rank, routes: routes.clone() },
            main,
            upload,
        })
        .collect()
}
