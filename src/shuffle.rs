//! All-to-all shuffle of partition buckets between the servers of a topology.

use std::sync::Arc;

use log;
use tokio::task::JoinHandle;

use crate::barrier::CompletionBarrier;
use crate::collector::{inbound_queue, Collector, QueueCapacity};
use crate::connection::{connect_with_retry, RetryPolicy, ShuffleListener};
use crate::record::Record;
use crate::topology::{Topology, TopologyError};
use crate::transport::{send_stream, ShuffleError};

/// Shuffle configuration of a single server.
#[derive(Debug, Clone)]
pub struct ShuffleConfig {
    /// Id of this server in the topology.
    pub server_id: usize,
    pub topology: Topology,
    /// Outbound connection retry policy.
    pub retry: RetryPolicy,
    /// Inbound queue capacity.
    pub queue_capacity: QueueCapacity,
}

impl ShuffleConfig {
    pub fn new(server_id: usize, topology: Topology) -> Self {
        ShuffleConfig {
            server_id,
            topology,
            retry: RetryPolicy::default(),
            queue_capacity: QueueCapacity::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        return self;
    }

    pub fn with_queue_capacity(mut self, queue_capacity: QueueCapacity) -> Self {
        self.queue_capacity = queue_capacity;
        return self;
    }
}

/// Exchanges partition buckets with every peer of the topology.
pub struct Shuffle {
    config: ShuffleConfig,
    address: String,
}

impl Shuffle {
    /// Creates a shuffle checking that the server belongs to the topology.
    pub fn new(config: ShuffleConfig) -> Result<Self, TopologyError> {
        let address = config.topology.server(config.server_id)?.address();
        Ok(Shuffle { config, address })
    }

    pub fn server_id(&self) -> usize {
        self.config.server_id
    }

    pub fn topology(&self) -> &Topology {
        &self.config.topology
    }

    /// Binds the listener on this server's own address.
    pub async fn bind(&self) -> Result<ShuffleListener, ShuffleError> {
        ShuffleListener::bind(&self.address).await
    }

    /// Sends every peer its bucket and receives the buckets every peer holds for this server.
    ///
    /// `buckets` holds one bucket per server of the topology, indexed by server id.
    /// The returned records are the inbound records followed by this server's own bucket,
    /// which never leaves the process.
    pub async fn run(&self, listener: ShuffleListener, buckets: Vec<Vec<Record>>) -> Result<Vec<Record>, ShuffleError> {
        let server_id = self.config.server_id;
        let topology = &self.config.topology;
        let partitioner = topology.partitioner();
        let peers = topology.len() - 1;

        let mut buckets = buckets;
        let own_bucket = std::mem::take(&mut buckets[server_id]);
        let buckets = Arc::new(buckets);

        let barrier = Arc::new(CompletionBarrier::for_servers(topology.len()));
        let (queue, mut receiver) = inbound_queue(self.config.queue_capacity);
        let listener_task = tokio::spawn(listener.serve(queue));

        let tag = partitioner.completion_tag(server_id);
        let senders: Vec<JoinHandle<Result<usize, ShuffleError>>> = topology
            .peers(server_id)
            .map(|peer| {
                let addr = peer.address();
                let destination = peer.server_id;
                let buckets = buckets.clone();
                let barrier = barrier.clone();
                let retry = self.config.retry;

                tokio::spawn(async move {
                    let stream = connect_with_retry(&addr, &retry).await?;
                    let sent = send_stream(stream, &buckets[destination], tag).await?;
                    log::info!("sent {} records to server {} at {}", sent, destination, addr);
                    barrier.arrive();
                    Ok(sent)
                })
            })
            .collect();

        let collector = Collector::new(peers, barrier.clone());
        let result = tokio::try_join!(collector.collect(&mut receiver), join_senders(senders));
        listener_task.abort();
        let (mut records, sent) = result?;

        barrier.wait().await;
        log::info!(
            "shuffle done: {} records sent, {} received, {} kept",
            sent,
            records.len(),
            own_bucket.len()
        );

        records.extend(own_bucket);

        return Ok(records);
    }
}

async fn join_senders(senders: Vec<JoinHandle<Result<usize, ShuffleError>>>) -> Result<usize, ShuffleError> {
    let mut sent = 0;
    for sender in senders {
        sent += sender.await.map_err(ShuffleError::Task)??;
    }
    return Ok(sent);
}

#[cfg(test)]
mod test {
    use super::{Shuffle, ShuffleConfig};
    use crate::record::test::record;
    use crate::topology::{ServerDescriptor, Topology, TopologyError};

    #[tokio::test]
    async fn test_single_server_keeps_own_bucket() {
        let topology = Topology::new(vec![ServerDescriptor::new(0, "127.0.0.1", "0")]).unwrap();
        let shuffle = Shuffle::new(ShuffleConfig::new(0, topology)).unwrap();
        let listener = shuffle.bind().await.unwrap();

        let records = shuffle
            .run(listener, vec![vec![record(2, 0), record(1, 0)]])
            .await
            .unwrap();

        assert_eq!(records, vec![record(2, 0), record(1, 0)]);
    }

    #[test]
    fn test_unknown_server() {
        let topology = Topology::new(vec![ServerDescriptor::new(0, "127.0.0.1", "0")]).unwrap();
        assert!(matches!(
            Shuffle::new(ShuffleConfig::new(1, topology)),
            Err(TopologyError::UnknownServer(1))
        ));
    }
}
