//! Connection manager.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use log;
use tokio::net::{TcpListener, TcpStream};

use crate::collector::InboundSender;
use crate::transport::{forward_stream, ShuffleError};

/// Outbound connection retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay between two connection attempts.
    pub backoff: Duration,
    /// Maximum number of attempts. [`None`] retries forever.
    pub max_attempts: Option<u32>,
}

impl RetryPolicy {
    /// Retries forever with a fixed `backoff`.
    pub fn unbounded(backoff: Duration) -> Self {
        RetryPolicy {
            backoff,
            max_attempts: None,
        }
    }

    /// Gives up after `max_attempts` attempts.
    pub fn capped(backoff: Duration, max_attempts: u32) -> Self {
        RetryPolicy {
            backoff,
            max_attempts: Some(max_attempts),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::unbounded(Duration::from_secs(1))
    }
}

/// Connects to `addr` retrying failed attempts according to `policy`.
///
/// A failed attempt usually means the peer listener is not started yet, so the unbounded
/// policy only returns once the connection is established.
pub async fn connect_with_retry(addr: &str, policy: &RetryPolicy) -> Result<TcpStream, ShuffleError> {
    let mut attempts = 0;
    loop {
        attempts += 1;
        log::debug!("connecting {} (attempt {})", addr, attempts);

        match TcpStream::connect(addr).await {
            Ok(stream) => {
                log::debug!("connected {} after {} attempts", addr, attempts);
                return Ok(stream);
            }
            Err(err) => {
                if let Some(max_attempts) = policy.max_attempts {
                    if attempts >= max_attempts {
                        return Err(ShuffleError::Connect {
                            addr: addr.to_string(),
                            attempts,
                            source: err,
                        });
                    }
                }
                log::warn!("connecting {} failed: {}, retrying in {:?}", addr, err, policy.backoff);
                tokio::time::sleep(policy.backoff).await;
            }
        }
    }
}

fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionAborted | io::ErrorKind::ConnectionReset | io::ErrorKind::Interrupted
    )
}

/// Inbound shuffle listener, bound once per process.
pub struct ShuffleListener {
    listener: TcpListener,
}

impl ShuffleListener {
    pub async fn bind(addr: &str) -> Result<Self, ShuffleError> {
        let listener = TcpListener::bind(addr).await.map_err(|err| ShuffleError::Bind {
            addr: addr.to_string(),
            source: err,
        })?;
        log::info!("listening on {}", addr);

        return Ok(ShuffleListener { listener });
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections forever, reading each one in its own task.
    /// Returns only on a non-transient accept error, which is also reported through the queue.
    pub async fn serve(self, queue: InboundSender) -> Result<(), ShuffleError> {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    log::debug!("accepted connection from {}", peer);
                    tokio::spawn(forward_stream(stream, queue.clone(), peer.to_string()));
                }
                Err(err) if is_transient(&err) => {
                    log::warn!("transient accept error: {}", err);
                }
                Err(err) => {
                    log::error!("accept failed: {}", err);
                    let _ = queue
                        .deliver(Err(ShuffleError::Accept(io::Error::new(err.kind(), err.to_string()))))
                        .await;
                    return Err(ShuffleError::Accept(err));
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::{connect_with_retry, RetryPolicy, ShuffleListener};
    use crate::collector::{inbound_queue, QueueCapacity};
    use crate::frame::Frame;
    use crate::record::test::record;
    use crate::transport::{send_stream, ShuffleError};

    #[tokio::test]
    async fn test_capped_retry_gives_up() {
        let addr = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().to_string()
        };

        let result = connect_with_retry(&addr, &RetryPolicy::capped(Duration::from_millis(1), 3)).await;

        assert!(matches!(result, Err(ShuffleError::Connect { attempts: 3, .. })));
    }

    #[tokio::test]
    async fn test_retry_until_listener_is_up() {
        let addr = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().to_string()
        };

        let policy = RetryPolicy::unbounded(Duration::from_millis(10));
        let connect = tokio::spawn({
            let addr = addr.clone();
            async move { connect_with_retry(&addr, &policy).await }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        let listener = ShuffleListener::bind(&addr).await.unwrap();
        let (sender, mut receiver) = inbound_queue(QueueCapacity::Unbounded);
        let serve = tokio::spawn(listener.serve(sender));

        let stream = connect.await.unwrap().unwrap();
        send_stream(stream, &[record(3, 3)], 0).await.unwrap();

        assert!(matches!(receiver.recv().await, Some(Ok(Frame::Record(_)))));
        assert!(matches!(receiver.recv().await, Some(Ok(Frame::Completed { .. }))));
        serve.abort();
    }

    #[tokio::test]
    async fn test_serves_concurrent_connections() {
        let listener = ShuffleListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let (sender, mut receiver) = inbound_queue(QueueCapacity::Unbounded);
        let serve = tokio::spawn(listener.serve(sender));

        let senders: Vec<_> = (0..3u8)
            .map(|peer| {
                let addr = addr.clone();
                tokio::spawn(async move {
                    let stream = connect_with_retry(&addr, &RetryPolicy::default()).await.unwrap();
                    send_stream(stream, &[record(peer, 0), record(peer, 1)], peer).await.unwrap();
                })
            })
            .collect();
        for sender in senders {
            sender.await.unwrap();
        }

        let mut records = 0;
        let mut completed = 0;
        while completed < 3 {
            match receiver.recv().await {
                Some(Ok(Frame::Record(_))) => records += 1,
                Some(Ok(Frame::Completed { .. })) => completed += 1,
                other => panic!("unexpected inbound item: {:?}", other),
            }
        }
        assert_eq!(records, 6);
        serve.abort();
    }

    #[tokio::test]
    async fn test_bind_failure() {
        let taken = ShuffleListener::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap().to_string();

        let result = ShuffleListener::bind(&addr).await;

        assert!(matches!(result, Err(ShuffleError::Bind { .. })));
    }
}
