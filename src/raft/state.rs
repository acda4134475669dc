use serde::{Deserialize, Serialize};

/// Role of a node in the consensus protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Follower,
    Candidate,
    Leader,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Follower => write!(f, "follower"),
            Role::Candidate => write!(f, "candidate"),
            Role::Leader => write!(f, "leader"),
        }
    }
}

/// An opaque replicated log entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry(pub String);

impl From<&str> for LogEntry {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for LogEntry {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for LogEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Working state of the consensus machine.
///
/// `term` only ever moves forward. Mutated exclusively by the RPC handlers
/// and the per-role step function, both behind the machine's lock.
#[derive(Debug)]
pub struct ConsensusState {
    pub term: u64,
    pub role: Role,
    /// Name of the node currently believed to lead; may be stale or unset
    /// while an election is in flight.
    pub leader: Option<String>,
    pub log: Vec<LogEntry>,
}

impl ConsensusState {
    pub fn new() -> Self {
        Self {
            term: 0,
            role: Role::Follower,
            leader: None,
            log: Vec::new(),
        }
    }

    /// Adopt a term and fall back to follower.
    pub fn become_follower(&mut self, term: u64) {
        self.term = term;
        self.role = Role::Follower;
    }

    /// Bump the term and start campaigning.
    pub fn become_candidate(&mut self) {
        self.term += 1;
        self.role = Role::Candidate;
    }

    /// Take leadership of the current term.
    pub fn become_leader(&mut self, own_name: &str) {
        self.role = Role::Leader;
        self.leader = Some(own_name.to_string());
    }
}

impl Default for ConsensusState {
    fn default() -> Self {
        Self::new()
    }
}
