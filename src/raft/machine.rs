//! The consensus state machine: leader election, heartbeats, and log
//! replication.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

use crate::config::NodeConfig;
use crate::node::{rng_from_seed, Node};
use crate::raft::state::{ConsensusState, Role};
use crate::raft::timer::random_election_timeout;
use crate::rpc::{
    AppendEntries, AppendEntriesArgs, AppendEntriesReply, AppendLogsArgs, AppendLogsReply,
    RequestVote, RequestVoteArgs, RequestVoteReply,
};

/// Quorum rule: strictly more than half of the peers contacted this round.
///
/// An empty round wins vacuously, so a cluster of one elects itself.
pub fn majority_reached(granted: usize, contacted: usize) -> bool {
    if contacted == 0 {
        return true;
    }
    granted > contacted / 2
}

/// Drives the election/heartbeat/replication protocol for one node.
///
/// The role loop runs as its own task; the RPC handlers execute concurrently
/// with it on connection-handling tasks. All shared state sits behind
/// `state`, and both sides go through that lock.
pub struct ConsensusMachine {
    node: Arc<Node>,
    pub state: RwLock<ConsensusState>,
    heartbeat_tx: mpsc::Sender<()>,
    heartbeat_rx: tokio::sync::Mutex<mpsc::Receiver<()>>,
    election_timeout_min_ms: u64,
    election_timeout_max_ms: u64,
    heartbeat_interval: Duration,
    rng: Mutex<StdRng>,
}

impl ConsensusMachine {
    pub fn new(node: Arc<Node>, config: &NodeConfig) -> Self {
        let (heartbeat_tx, heartbeat_rx) = mpsc::channel(100);
        // Election timing gets its own stream so fault injection and
        // elections are independently reproducible from one configured seed.
        let seed = if config.seed == 0 {
            0
        } else {
            config.seed.wrapping_add(1)
        };
        Self {
            node,
            state: RwLock::new(ConsensusState::new()),
            heartbeat_tx,
            heartbeat_rx: tokio::sync::Mutex::new(heartbeat_rx),
            election_timeout_min_ms: config.election_timeout_min_ms,
            election_timeout_max_ms: config.election_timeout_max_ms,
            heartbeat_interval: Duration::from_millis(config.heartbeat_interval_ms),
            rng: Mutex::new(rng_from_seed(seed)),
        }
    }

    pub fn node(&self) -> &Arc<Node> {
        &self.node
    }

    /// Step the current role until shutdown is requested.
    pub async fn run(&self, shutdown: CancellationToken) {
        loop {
            if shutdown.is_cancelled() {
                return;
            }
            let role = self.state.read().await.role;
            match role {
                Role::Follower => self.step_follower(&shutdown).await,
                Role::Candidate => self.step_candidate().await,
                Role::Leader => self.step_leader(&shutdown).await,
            }
        }
    }

    /// Wait for a heartbeat signal or an election timeout.
    async fn step_follower(&self, shutdown: &CancellationToken) {
        let timeout = {
            let mut rng = self.rng.lock();
            random_election_timeout(
                &mut *rng,
                self.election_timeout_min_ms,
                self.election_timeout_max_ms,
            )
        };
        let mut heartbeat_rx = self.heartbeat_rx.lock().await;
        tokio::select! {
            _ = shutdown.cancelled() => {}
            Some(()) = heartbeat_rx.recv() => {
                tracing::debug!(node = %self.node.self_info(), "Heartbeat received");
            }
            _ = tokio::time::sleep(timeout) => {
                drop(heartbeat_rx);
                let mut state = self.state.write().await;
                // A stale timer can fire after self-promotion; ignore it.
                if state.role == Role::Leader {
                    return;
                }
                state.become_candidate();
                tracing::info!(
                    node = %self.node.self_info(),
                    term = state.term,
                    "Election timeout; became candidate"
                );
            }
        }
    }

    /// Fan a vote request out to every current member and tally the grants.
    async fn step_candidate(&self) {
        let term = self.state.read().await.term;
        let candidate = self.node.self_info().name.clone();
        let channels = self.node.channels();
        let contacted = channels.len();
        let mut granted = 0usize;

        for (name, channel) in &channels {
            let result = channel
                .call::<RequestVote>(RequestVoteArgs {
                    term,
                    candidate: candidate.clone(),
                })
                .await;
            match result {
                Ok(reply) => {
                    if reply.vote_granted {
                        granted += 1;
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        node = %self.node.self_info(),
                        peer = %name,
                        error = %e,
                        "Vote request failed; removing peer"
                    );
                    self.node.cluster().remove(name);
                }
            }
        }

        if majority_reached(granted, contacted) {
            let mut state = self.state.write().await;
            // A concurrent handler may have adopted a newer term mid-round.
            if state.role == Role::Candidate && state.term == term {
                state.become_leader(&candidate);
                tracing::info!(
                    node = %self.node.self_info(),
                    term = state.term,
                    votes = granted,
                    contacted,
                    "Became leader"
                );
            }
        } else {
            tracing::debug!(
                node = %self.node.self_info(),
                term,
                votes = granted,
                contacted,
                "Election round failed"
            );
        }
    }

    /// Send one heartbeat round, then wait out the interval.
    ///
    /// Nothing in this step changes the role; only the RPC handlers can
    /// depose a leader.
    async fn step_leader(&self, shutdown: &CancellationToken) {
        let term = self.state.read().await.term;
        for (name, channel) in &self.node.channels() {
            let result = channel
                .call::<AppendEntries>(AppendEntriesArgs {
                    term,
                    entries: Vec::new(),
                })
                .await;
            if let Err(e) = result {
                tracing::warn!(
                    node = %self.node.self_info(),
                    peer = %name,
                    error = %e,
                    "Heartbeat failed; removing peer"
                );
                self.node.cluster().remove(name);
            }
        }
        tokio::select! {
            _ = shutdown.cancelled() => {}
            _ = tokio::time::sleep(self.heartbeat_interval) => {}
        }
    }

    /// Grant iff the incoming term is strictly greater than ours.
    ///
    /// The strict comparison is what guarantees at most one granted vote per
    /// term per node; granting on equal terms would allow voting for two
    /// candidates in the same term.
    pub async fn handle_request_vote(&self, args: RequestVoteArgs) -> RequestVoteReply {
        let mut state = self.state.write().await;
        if args.term <= state.term {
            tracing::debug!(
                node = %self.node.self_info(),
                candidate = %args.candidate,
                term = args.term,
                current = state.term,
                "Vote refused"
            );
            return RequestVoteReply {
                vote_granted: false,
            };
        }
        state.become_follower(args.term);
        state.leader = Some(args.candidate.clone());
        tracing::info!(
            node = %self.node.self_info(),
            candidate = %args.candidate,
            term = args.term,
            "Vote granted; became follower"
        );
        RequestVoteReply { vote_granted: true }
    }

    /// Adopt the leader's term, reset the follower timer, and append the
    /// carried entries. A stale term is a silent no-op: the stale leader
    /// cannot tell "ignored" from "lost".
    pub async fn handle_append_entries(&self, args: AppendEntriesArgs) -> AppendEntriesReply {
        let mut state = self.state.write().await;
        if args.term < state.term {
            tracing::debug!(
                node = %self.node.self_info(),
                term = args.term,
                current = state.term,
                "Ignoring stale AppendEntries"
            );
            return AppendEntriesReply {};
        }
        state.become_follower(args.term);
        // Full channel just means a timer reset is already pending.
        let _ = self.heartbeat_tx.try_send(());
        if !args.entries.is_empty() {
            state.log.extend(args.entries);
            tracing::debug!(
                node = %self.node.self_info(),
                log_len = state.log.len(),
                "Appended replicated entries"
            );
        }
        AppendEntriesReply {}
    }

    /// Client-facing append: apply locally, then broadcast best-effort.
    ///
    /// Deliberately accepts writes regardless of role and tracks no commit
    /// index or acknowledgments; broadcast failures are logged only.
    pub async fn handle_append_logs(&self, args: AppendLogsArgs) -> AppendLogsReply {
        let appended = args.entries.len() as u64;
        let term = {
            let mut state = self.state.write().await;
            state.log.extend(args.entries.iter().cloned());
            tracing::info!(
                node = %self.node.self_info(),
                count = appended,
                log_len = state.log.len(),
                "Appended client entries"
            );
            state.term
        };
        for (name, channel) in self.node.channels() {
            let result = channel
                .call::<AppendEntries>(AppendEntriesArgs {
                    term,
                    entries: args.entries.clone(),
                })
                .await;
            if let Err(e) = result {
                tracing::warn!(
                    node = %self.node.self_info(),
                    peer = %name,
                    error = %e,
                    "Entry broadcast failed"
                );
            }
        }
        AppendLogsReply { appended }
    }
}
