//! Static cluster topology.
//!
//! The topology is loaded once from a YAML resource of the following shape and is read-only afterwards:
//!
//! ```yaml
//! servers:
//!   - serverId: 0
//!     host: "127.0.0.1"
//!     port: "8080"
//!   - serverId: 1
//!     host: "127.0.0.1"
//!     port: "8081"
//! ```

use std::error::Error;
use std::fmt;
use std::fmt::Display;
use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::partition::{PartitionCountError, Partitioner};

/// Topology loading or validation error.
#[derive(Debug)]
pub enum TopologyError {
    /// Topology resource reading error.
    IO(io::Error),
    /// Topology resource parsing error.
    Parse(serde_yaml::Error),
    /// Server count is not a supported power of two.
    ServerCount(PartitionCountError),
    /// Server id does not match its position in the list.
    SparseServerId { position: usize, server_id: usize },
    /// Server id not present in the topology.
    UnknownServer(usize),
}

impl Error for TopologyError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self {
            TopologyError::IO(err) => Some(err),
            TopologyError::Parse(err) => Some(err),
            TopologyError::ServerCount(err) => Some(err),
            TopologyError::SparseServerId { .. } => None,
            TopologyError::UnknownServer(_) => None,
        }
    }
}

impl Display for TopologyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            TopologyError::IO(err) => write!(f, "topology not read: {}", err),
            TopologyError::Parse(err) => write!(f, "topology malformed: {}", err),
            TopologyError::ServerCount(err) => write!(f, "topology invalid: {}", err),
            TopologyError::SparseServerId { position, server_id } => write!(
                f,
                "topology invalid: server at position {} has id {}",
                position, server_id
            ),
            TopologyError::UnknownServer(server_id) => write!(f, "server {} not found in topology", server_id),
        }
    }
}

/// Single server address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerDescriptor {
    pub server_id: usize,
    pub host: String,
    pub port: String,
}

impl ServerDescriptor {
    pub fn new(server_id: usize, host: impl Into<String>, port: impl Into<String>) -> Self {
        ServerDescriptor {
            server_id,
            host: host.into(),
            port: port.into(),
        }
    }

    /// Returns `host:port` address.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Deserialize)]
struct RawTopology {
    servers: Vec<ServerDescriptor>,
}

/// Validated ordered server list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    servers: Vec<ServerDescriptor>,
    partitioner: Partitioner,
}

impl Topology {
    /// Creates a topology validating that server ids are dense and their count is a power of two.
    pub fn new(servers: Vec<ServerDescriptor>) -> Result<Self, TopologyError> {
        let partitioner = Partitioner::new(servers.len()).map_err(TopologyError::ServerCount)?;

        for (position, server) in servers.iter().enumerate() {
            if server.server_id != position {
                return Err(TopologyError::SparseServerId {
                    position,
                    server_id: server.server_id,
                });
            }
        }

        return Ok(Topology { servers, partitioner });
    }

    /// Parses a YAML topology document.
    pub fn from_yaml(document: &str) -> Result<Self, TopologyError> {
        let raw: RawTopology = serde_yaml::from_str(document).map_err(TopologyError::Parse)?;
        Self::new(raw.servers)
    }

    /// Loads a YAML topology file.
    pub fn load(path: &Path) -> Result<Self, TopologyError> {
        let document = fs::read_to_string(path).map_err(TopologyError::IO)?;
        let topology = Self::from_yaml(&document)?;
        log::info!("loaded topology of {} servers from {}", topology.len(), path.display());

        return Ok(topology);
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn servers(&self) -> &[ServerDescriptor] {
        &self.servers
    }

    pub fn server(&self, server_id: usize) -> Result<&ServerDescriptor, TopologyError> {
        self.servers
            .get(server_id)
            .ok_or(TopologyError::UnknownServer(server_id))
    }

    /// Every server except `server_id`.
    pub fn peers(&self, server_id: usize) -> impl Iterator<Item = &ServerDescriptor> {
        self.servers.iter().filter(move |s| s.server_id != server_id)
    }

    /// Partitioner routing records across this topology.
    pub fn partitioner(&self) -> Partitioner {
        self.partitioner
    }
}
