use std::fmt;
use std::net::SocketAddr;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Identity of a cluster member. Uniqueness is by `name`, not endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub name: String,
    pub endpoint: SocketAddr,
}

impl NodeInfo {
    pub fn new(name: impl Into<String>, endpoint: SocketAddr) -> Self {
        Self {
            name: name.into(),
            endpoint,
        }
    }
}

impl fmt::Display for NodeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.endpoint)
    }
}

/// Result of [`Cluster::append`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendResult {
    /// The node was unknown and has been added
    Appended,
    /// The same (name, endpoint) pair is already registered; nothing changed
    AlreadyKnown,
    /// The name is registered with a different endpoint; nothing changed
    Inconsistent,
}

impl AppendResult {
    pub fn is_appended(self) -> bool {
        self == AppendResult::Appended
    }

    pub fn is_inconsistent(self) -> bool {
        self == AppendResult::Inconsistent
    }
}

/// Membership table for the cluster.
///
/// Holds the identities of the *other* members; a node never stores its own
/// identity here. All operations take the internal lock, so concurrent
/// election and replication activity observe a consistent table.
#[derive(Debug, Default)]
pub struct Cluster {
    members: Mutex<Vec<NodeInfo>>,
}

impl Cluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot copy of the current members.
    pub fn members(&self) -> Vec<NodeInfo> {
        self.members.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.members.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.lock().is_empty()
    }

    /// Register a member unless its name is already taken.
    ///
    /// Re-appending a known (name, endpoint) pair is a no-op reported as
    /// `AlreadyKnown`. A known name with a different endpoint is rejected as
    /// `Inconsistent` and never overwrites the registered entry.
    pub fn append(&self, node: NodeInfo) -> AppendResult {
        let mut members = self.members.lock();
        match members.iter().find(|m| m.name == node.name) {
            None => {
                members.push(node);
                AppendResult::Appended
            }
            Some(existing) if existing.endpoint == node.endpoint => AppendResult::AlreadyKnown,
            Some(_) => AppendResult::Inconsistent,
        }
    }

    /// Remove the member with the given name, returning its endpoint.
    ///
    /// Returns `None` without any change when the name is not registered.
    pub fn remove(&self, name: &str) -> Option<SocketAddr> {
        let mut members = self.members.lock();
        let idx = members.iter().position(|m| m.name == name)?;
        Some(members.swap_remove(idx).endpoint)
    }
}

impl fmt::Display for Cluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cluster{{members: {}}}", self.len())
    }
}
