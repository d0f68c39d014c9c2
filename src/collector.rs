//! Inbound queue and collector.

use std::sync::Arc;

use log;
use tokio::sync::mpsc;

use crate::barrier::CompletionBarrier;
use crate::frame::Frame;
use crate::record::Record;
use crate::transport::ShuffleError;

/// Item delivered by a stream reader: a frame or the error that ended its stream.
pub type Inbound = Result<Frame, ShuffleError>;

/// Inbound queue capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueCapacity {
    /// Readers never block on delivery.
    Unbounded,
    /// Readers wait for the collector once `n` frames are queued.
    Bounded(usize),
}

impl Default for QueueCapacity {
    fn default() -> Self {
        QueueCapacity::Unbounded
    }
}

/// Producer side of the inbound queue, cloned into every stream reader.
#[derive(Debug, Clone)]
pub enum InboundSender {
    Bounded(mpsc::Sender<Inbound>),
    Unbounded(mpsc::UnboundedSender<Inbound>),
}

impl InboundSender {
    /// Delivers an item to the collector.
    pub async fn deliver(&self, item: Inbound) -> Result<(), ShuffleError> {
        let delivered = match self {
            InboundSender::Bounded(sender) => sender.send(item).await.is_ok(),
            InboundSender::Unbounded(sender) => sender.send(item).is_ok(),
        };

        if delivered {
            Ok(())
        } else {
            Err(ShuffleError::QueueClosed)
        }
    }
}

/// Consumer side of the inbound queue.
#[derive(Debug)]
pub enum InboundReceiver {
    Bounded(mpsc::Receiver<Inbound>),
    Unbounded(mpsc::UnboundedReceiver<Inbound>),
}

impl InboundReceiver {
    pub async fn recv(&mut self) -> Option<Inbound> {
        match self {
            InboundReceiver::Bounded(receiver) => receiver.recv().await,
            InboundReceiver::Unbounded(receiver) => receiver.recv().await,
        }
    }
}

/// Creates the inbound queue shared by all stream readers.
pub fn inbound_queue(capacity: QueueCapacity) -> (InboundSender, InboundReceiver) {
    match capacity {
        QueueCapacity::Unbounded => {
            let (sender, receiver) = mpsc::unbounded_channel();
            (InboundSender::Unbounded(sender), InboundReceiver::Unbounded(receiver))
        }
        QueueCapacity::Bounded(capacity) => {
            let (sender, receiver) = mpsc::channel(capacity.max(1));
            (InboundSender::Bounded(sender), InboundReceiver::Bounded(receiver))
        }
    }
}

/// Gathers the records received from every peer.
pub struct Collector {
    expected_streams: usize,
    barrier: Arc<CompletionBarrier>,
}

impl Collector {
    /// Creates a collector waiting for `expected_streams` stream terminators.
    pub fn new(expected_streams: usize, barrier: Arc<CompletionBarrier>) -> Self {
        Collector {
            expected_streams,
            barrier,
        }
    }

    /// Consumes the queue until every expected stream has completed.
    /// Each observed terminator signals one unit on the completion barrier.
    pub async fn collect(self, receiver: &mut InboundReceiver) -> Result<Vec<Record>, ShuffleError> {
        let mut records = Vec::new();
        let mut completed = 0;

        log::debug!("collecting {} inbound streams", self.expected_streams);
        while completed < self.expected_streams {
            match receiver.recv().await {
                Some(Ok(Frame::Record(record))) => records.push(record),
                Some(Ok(Frame::Completed { tag })) => {
                    completed += 1;
                    log::info!(
                        "inbound stream completed (tag: {:#04x}, {} of {})",
                        tag,
                        completed,
                        self.expected_streams
                    );
                    self.barrier.arrive();
                }
                Some(Err(err)) => return Err(err),
                None => return Err(ShuffleError::QueueClosed),
            }
        }

        log::info!("collected {} inbound records", records.len());

        return Ok(records);
    }
}
