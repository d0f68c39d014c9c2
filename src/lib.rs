//! `netsort` is a distributed external sort implementation.
//!
//! A fixed set of servers jointly sorts a dataset split across them. Every server range-partitions its local
//! records by the high-order bits of the first key byte, streams every partition to the server owning it over
//! an all-to-all TCP shuffle, and sorts the records it owns once every peer stream has completed. The
//! concatenation of the servers' outputs in server id order is the sorted dataset.
//!
//! # Overview
//!
//! * **Fixed-size records:**
//!   records are [`RECORD_SIZE`] bytes long, the first [`KEY_SIZE`] bytes being the sort key.
//! * **Range partitioning:**
//!   the server count must be a power of two, `log2(n)` leading key bits select the destination server.
//! * **Simple wire format:**
//!   each record travels as a fixed 101 bytes frame, a stream ends with a single terminator frame.
//! * **Memory limit support:**
//!   the final sort spills sorted chunks to temporary files once its buffer limit is reached.
//!
//! # Example
//!
//! ```no_run
//! use std::fs;
//! use std::io;
//! use std::path::Path;
//!
//! use netsort::{Node, NodeConfig, ShuffleConfig, Topology};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let topology = Topology::load(Path::new("servers.yaml"))?;
//!     let node = Node::new(NodeConfig::new(ShuffleConfig::new(0, topology)))?;
//!     let runtime = tokio::runtime::Runtime::new()?;
//!
//!     let listener = runtime.block_on(node.bind())?;
//!     let buckets = node.partition(io::BufReader::new(fs::File::open("input.dat")?))?;
//!     let records = runtime.block_on(node.shuffle(listener, buckets))?;
//!
//!     let mut output = io::BufWriter::new(fs::File::create("output.dat")?);
//!     node.sort_and_emit(records, &mut output)?;
//!
//!     Ok(())
//! }
//! ```

pub mod barrier;
pub mod buffer;
pub mod chunk;
pub mod collector;
pub mod connection;
pub mod frame;
pub mod merger;
pub mod node;
pub mod partition;
pub mod record;
pub mod shuffle;
pub mod sort;
pub mod topology;
pub mod transport;

pub use barrier::CompletionBarrier;
pub use buffer::{RecordBuffer, RecordBufferBuilder};
pub use collector::{inbound_queue, Collector, InboundReceiver, InboundSender, QueueCapacity};
pub use connection::{connect_with_retry, RetryPolicy, ShuffleListener};
pub use frame::{Frame, FrameError, FRAME_SIZE};
pub use node::{Node, NodeConfig, NodeError};
pub use partition::Partitioner;
pub use record::{Record, RecordReader, KEY_SIZE, RECORD_SIZE};
pub use shuffle::{Shuffle, ShuffleConfig};
pub use sort::{emit, RecordSorter, RecordSorterBuilder, SortError, SortedRecords};
pub use topology::{ServerDescriptor, Topology, TopologyError};
pub use transport::{receive_stream, send_stream, ShuffleError};
