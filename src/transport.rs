//! Shuffle transport.
//!
//! A sender writes one in-progress frame per record followed by exactly one terminator frame.
//! A receiver reads fixed-size frames and hands them over to the collector until it sees the terminator.

use std::error::Error;
use std::fmt;
use std::fmt::Display;
use std::io;

use log;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};

use crate::collector::InboundSender;
use crate::frame::{Frame, FrameError, FRAME_SIZE};
use crate::record::Record;

/// Shuffle error. Every variant is fatal to the sort.
#[derive(Debug)]
pub enum ShuffleError {
    /// Listener socket binding error.
    Bind { addr: String, source: io::Error },
    /// Non-transient error accepting an inbound connection.
    Accept(io::Error),
    /// Outbound connection not established within the retry policy.
    Connect { addr: String, attempts: u32, source: io::Error },
    /// Stream read/write error.
    IO(io::Error),
    /// Peer closed its stream before the terminator frame, `partial` bytes of a frame were read.
    UnexpectedEof { partial: usize },
    /// Malformed frame.
    Frame(FrameError),
    /// Inbound queue closed before every stream completed.
    QueueClosed,
    /// Shuffle task panicked or was cancelled.
    Task(tokio::task::JoinError),
}

impl Error for ShuffleError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self {
            ShuffleError::Bind { source, .. } => Some(source),
            ShuffleError::Accept(err) => Some(err),
            ShuffleError::Connect { source, .. } => Some(source),
            ShuffleError::IO(err) => Some(err),
            ShuffleError::UnexpectedEof { .. } => None,
            ShuffleError::Frame(err) => Some(err),
            ShuffleError::QueueClosed => None,
            ShuffleError::Task(err) => Some(err),
        }
    }
}

impl Display for ShuffleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            ShuffleError::Bind { addr, source } => write!(f, "listening on {} failed: {}", addr, source),
            ShuffleError::Accept(err) => write!(f, "accepting connection failed: {}", err),
            ShuffleError::Connect { addr, attempts, source } => {
                write!(f, "connecting {} failed after {} attempts: {}", addr, attempts, source)
            }
            ShuffleError::IO(err) => write!(f, "stream I/O operation failed: {}", err),
            ShuffleError::UnexpectedEof { partial } => write!(
                f,
                "stream closed before completion ({} of {} frame bytes read)",
                partial, FRAME_SIZE
            ),
            ShuffleError::Frame(err) => write!(f, "malformed frame: {}", err),
            ShuffleError::QueueClosed => write!(f, "inbound queue closed"),
            ShuffleError::Task(err) => write!(f, "shuffle task failed: {}", err),
        }
    }
}

/// Writes `records` followed by a terminator tagged with `tag`, then shuts the writer down.
/// Returns the number of records sent.
pub async fn send_stream<W>(writer: W, records: &[Record], tag: u8) -> Result<usize, ShuffleError>
where
    W: AsyncWrite + Unpin,
{
    let mut writer = BufWriter::new(writer);

    for record in records {
        writer
            .write_all(&Frame::encode_record(record))
            .await
            .map_err(ShuffleError::IO)?;
    }

    writer
        .write_all(&Frame::Completed { tag }.encode())
        .await
        .map_err(ShuffleError::IO)?;
    writer.flush().await.map_err(ShuffleError::IO)?;
    writer.shutdown().await.map_err(ShuffleError::IO)?;

    return Ok(records.len());
}

async fn read_frame<R>(reader: &mut R, buf: &mut [u8; FRAME_SIZE]) -> Result<(), ShuffleError>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < FRAME_SIZE {
        let n = reader.read(&mut buf[filled..]).await.map_err(ShuffleError::IO)?;
        if n == 0 {
            return Err(ShuffleError::UnexpectedEof { partial: filled });
        }
        filled += n;
    }

    return Ok(());
}

/// Reads frames from a single peer stream and delivers them to the inbound queue.
/// Returns the number of records received once the terminator has been delivered;
/// nothing is read past the terminator.
pub async fn receive_stream<R>(mut reader: R, queue: &InboundSender) -> Result<usize, ShuffleError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; FRAME_SIZE];
    let mut received = 0;

    loop {
        read_frame(&mut reader, &mut buf).await?;
        let frame = Frame::decode(&buf).map_err(ShuffleError::Frame)?;
        let completed = frame.is_completed();

        queue.deliver(Ok(frame)).await?;

        if completed {
            return Ok(received);
        }
        received += 1;
    }
}

/// Runs [`receive_stream`] reporting its failure to the collector through the queue.
pub async fn forward_stream<R>(reader: R, queue: InboundSender, peer: String)
where
    R: AsyncRead + Unpin,
{
    match receive_stream(reader, &queue).await {
        Ok(received) => log::debug!("stream from {} completed ({} records)", peer, received),
        Err(err) => {
            log::error!("stream from {} failed: {}", peer, err);
            if queue.deliver(Err(err)).await.is_err() {
                log::debug!("collector gone, dropping error of {}", peer);
            }
        }
    }
}
