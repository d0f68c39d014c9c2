//! A single sort server: partition, shuffle, sort and emit.

use std::error::Error;
use std::fmt;
use std::fmt::Display;
use std::io;
use std::io::prelude::*;

use log;

use crate::connection::ShuffleListener;
use crate::record::{Record, RecordReader};
use crate::shuffle::{Shuffle, ShuffleConfig};
use crate::sort::{emit, RecordSorter, RecordSorterBuilder, SortError};
use crate::topology::TopologyError;
use crate::transport::ShuffleError;

/// Server error. Every variant aborts the sort on this server.
#[derive(Debug)]
pub enum NodeError {
    /// Invalid topology or server id.
    Topology(TopologyError),
    /// Input data stream error.
    Input(io::Error),
    /// Network shuffle error.
    Shuffle(ShuffleError),
    /// Final sort or output error.
    Sort(SortError),
}

impl Error for NodeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(match &self {
            NodeError::Topology(err) => err,
            NodeError::Input(err) => err,
            NodeError::Shuffle(err) => err,
            NodeError::Sort(err) => err,
        })
    }
}

impl Display for NodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            NodeError::Topology(err) => write!(f, "{}", err),
            NodeError::Input(err) => write!(f, "input data stream error: {}", err),
            NodeError::Shuffle(err) => write!(f, "shuffle error: {}", err),
            NodeError::Sort(err) => write!(f, "sorting error: {}", err),
        }
    }
}

impl From<TopologyError> for NodeError {
    fn from(err: TopologyError) -> Self {
        NodeError::Topology(err)
    }
}

impl From<ShuffleError> for NodeError {
    fn from(err: ShuffleError) -> Self {
        NodeError::Shuffle(err)
    }
}

impl From<SortError> for NodeError {
    fn from(err: SortError) -> Self {
        NodeError::Sort(err)
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub shuffle: ShuffleConfig,
    pub sorter: RecordSorterBuilder,
}

impl NodeConfig {
    pub fn new(shuffle: ShuffleConfig) -> Self {
        NodeConfig {
            shuffle,
            sorter: RecordSorterBuilder::new(),
        }
    }

    pub fn with_sorter(mut self, sorter: RecordSorterBuilder) -> Self {
        self.sorter = sorter;
        return self;
    }
}

/// One server of the distributed sort.
///
/// Partitioning and the final sort are blocking and run outside of the async runtime,
/// the shuffle runs on it.
pub struct Node {
    shuffle: Shuffle,
    sorter: RecordSorter,
}

impl Node {
    pub fn new(config: NodeConfig) -> Result<Self, NodeError> {
        Ok(Node {
            shuffle: Shuffle::new(config.shuffle)?,
            sorter: config.sorter.build()?,
        })
    }

    pub fn server_id(&self) -> usize {
        self.shuffle.server_id()
    }

    /// Binds the shuffle listener on this server's address.
    pub async fn bind(&self) -> Result<ShuffleListener, NodeError> {
        Ok(self.shuffle.bind().await?)
    }

    /// Reads the local input and splits it into one bucket per server.
    pub fn partition<R: Read>(&self, input: R) -> Result<Vec<Vec<Record>>, NodeError> {
        let partitioner = self.shuffle.topology().partitioner();
        let buckets = partitioner
            .partition(RecordReader::new(input))
            .map_err(NodeError::Input)?;

        for (server_id, bucket) in buckets.iter().enumerate() {
            log::info!("server {} gets {} records", server_id, bucket.len());
        }

        return Ok(buckets);
    }

    /// Exchanges the buckets with every peer and returns the records this server owns.
    pub async fn shuffle(&self, listener: ShuffleListener, buckets: Vec<Vec<Record>>) -> Result<Vec<Record>, NodeError> {
        Ok(self.shuffle.run(listener, buckets).await?)
    }

    /// Sorts the owned records by key and writes them to the output.
    pub fn sort_and_emit<W: Write>(&self, records: Vec<Record>, output: &mut W) -> Result<u64, NodeError> {
        log::info!("sorting {} records", records.len());
        let sorted = self.sorter.sort(records)?;
        let written = emit(sorted, output)?;
        log::info!("written {} records", written);

        return Ok(written);
    }
}
