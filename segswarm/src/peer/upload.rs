use crate::{
    stats::UploadStats,
    transport::{Channel, Mailbox, Message, Outbox, TransportError},
    TRACKER_RANK,
};

pub struct Uploader {

    outbox: Outbox,

    // The request channel: segment requests from peers, shutdown from the tracker.
    mailbox: Mailbox,

    stats: UploadStats,

}

impl Uploader {

    pub fn new(outbox: Outbox, mailbox: Mailbox) -> Self {
        Self { outbox, mailbox, stats: UploadStats::default() }
    }

    // Answers requests in arrival order until the tracker says stop.
    // Both kinds share a tag, only the sender tells them apart.
    pub async fn run(mut self) -> Result<UploadStats, TransportError> {
        loop {
            let envelope = self.mailbox.recv().await?;

            if envelope.from == TRACKER_RANK {
                if envelope.message != Message::Fin {
                    tracing::warn!("unexpected message from tracker: {:?}", envelope.message);
                }
                tracing::info!("shutdown, served {} segments", self.stats.segments_served);
                return Ok(self.stats);
            }

            match &envelope.message {
                Message::SegmentRequest { file, segment } => {
                    tracing::trace!("{} requested {} of {}", envelope.from, segment, file);
                    self.stats.record(file);
                }
                other => tracing::warn!("unexpected request from {}: {:?}", envelope.from, other),
            }
            // Requester blocks on the ack whatever it sent.
            self.outbox.send(envelope.from, Channel::Reply, Message::Ack)?;
        }
    }
}
