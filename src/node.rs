//! Node identity, per-peer transport derivation, and the gossip join
//! protocol.

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::Exp1;
use tokio::task::JoinSet;

use crate::channel::Channel;
use crate::cluster::{Cluster, NodeInfo};
use crate::config::NodeConfig;
use crate::error::Result;
use crate::rpc::{
    FetchStateReply, RequestConnection, RequestConnectionArgs, RequestConnectionReply,
};

/// Build a random source from a configured seed. Zero means "use entropy".
pub fn rng_from_seed(seed: u64) -> StdRng {
    if seed == 0 {
        StdRng::from_entropy()
    } else {
        StdRng::seed_from_u64(seed)
    }
}

/// A member of the peer-to-peer network.
///
/// Owns the membership table and derives an outbound [`Channel`] per member,
/// applying the configured fault parameters. The inbound side of the join
/// protocol lives here too; serving connections is the `server` module's job.
pub struct Node {
    info: NodeInfo,
    cluster: Cluster,
    mean_delay_ms: f64,
    loss_rate: f64,
    rng: Mutex<StdRng>,
}

impl Node {
    /// Create a node from its bound endpoint and the configured fault
    /// parameters. `endpoint` should come from the listener so that a
    /// port-0 bind advertises its real port.
    pub fn new(info: NodeInfo, config: &NodeConfig) -> Self {
        tracing::info!(
            node = %info,
            delay = config.mean_delay_ms,
            loss = config.loss_rate,
            "Initialized node"
        );
        Self {
            info,
            cluster: Cluster::new(),
            mean_delay_ms: config.mean_delay_ms,
            loss_rate: config.loss_rate,
            rng: Mutex::new(rng_from_seed(config.seed)),
        }
    }

    pub fn self_info(&self) -> &NodeInfo {
        &self.info
    }

    pub fn cluster(&self) -> &Cluster {
        &self.cluster
    }

    /// Derive a communication channel per current member.
    ///
    /// Fault decisions are drawn independently per member, once per call:
    /// with probability `loss_rate` the channel drops its message; otherwise
    /// a positive mean delay yields an exponentially distributed delay; else
    /// the channel is reliable. Recomputed on every call so membership
    /// changes and fault randomness are both observed live.
    pub fn channels(&self) -> HashMap<String, Channel> {
        let members = self.cluster.members();
        let mut rng = self.rng.lock();
        members
            .into_iter()
            .map(|member| {
                let channel = if self.loss_rate > 0.0 && rng.gen::<f64>() < self.loss_rate {
                    Channel::lost(member.endpoint)
                } else if self.mean_delay_ms > 0.0 {
                    let sample: f64 = rng.sample(Exp1);
                    let delay = Duration::from_secs_f64(sample * self.mean_delay_ms / 1000.0);
                    Channel::delayed(member.endpoint, delay)
                } else {
                    Channel::reliable(member.endpoint)
                };
                (member.name, channel)
            })
            .collect()
    }

    /// Join the network by contacting one known member.
    ///
    /// Only a transport failure against `addr` itself fails the call;
    /// refusals, duplicate registrations, and failures of transitive
    /// discovery attempts are logged and swallowed.
    pub async fn establish_connection(self: &Arc<Self>, addr: SocketAddr) -> Result<()> {
        tracing::info!(node = %self.info, via = %addr, "Trying to join network");
        Arc::clone(self).discover(addr).await?;
        tracing::info!(
            node = %self.info,
            members = ?self.cluster.members(),
            "Joined the network"
        );
        Ok(())
    }

    fn discover(
        self: Arc<Self>,
        addr: SocketAddr,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> {
        Box::pin(async move {
            if addr == self.info.endpoint {
                tracing::warn!(node = %self.info, "Cannot request self connection");
                return Ok(());
            }
            tracing::debug!(node = %self.info, peer = %addr, "Requesting connection");
            let reply = Channel::reliable(addr)
                .call::<RequestConnection>(RequestConnectionArgs {
                    from: self.info.clone(),
                })
                .await?;
            if !reply.accepted {
                tracing::warn!(node = %self.info, peer = %addr, "Connection refused");
                return Ok(());
            }
            let discovered = NodeInfo::new(reply.name, addr);
            if !self.cluster.append(discovered.clone()).is_appended() {
                tracing::debug!(node = %self.info, peer = %discovered, "Peer already known");
                return Ok(());
            }
            tracing::info!(node = %self.info, peer = %discovered, "Connection accepted");

            // Transitive discovery: one concurrent attempt per member this
            // invocation learned about, all joined before returning. A name
            // that is already known is not re-traversed, which bounds the
            // recursion.
            let mut attempts = JoinSet::new();
            for member in reply.members {
                if member != self.info && self.cluster.append(member.clone()).is_appended() {
                    let node = Arc::clone(&self);
                    attempts.spawn(async move {
                        if let Err(e) = node.discover(member.endpoint).await {
                            tracing::warn!(
                                peer = %member,
                                error = %e,
                                "Transitive connection attempt failed"
                            );
                        }
                    });
                }
            }
            while attempts.join_next().await.is_some() {}
            Ok(())
        })
    }

    /// Inbound mirror of [`Node::establish_connection`].
    ///
    /// Accepts iff the caller's identity can be appended; acceptance returns
    /// this node's name and its current member snapshot so the caller can
    /// continue discovering transitively. Rejection leaves the table
    /// unchanged.
    pub fn handle_request_connection(&self, args: RequestConnectionArgs) -> RequestConnectionReply {
        tracing::debug!(node = %self.info, from = %args.from, "Received connection request");
        if !self.cluster.append(args.from.clone()).is_appended() {
            tracing::warn!(node = %self.info, from = %args.from, "Connection request rejected");
            return RequestConnectionReply::default();
        }
        tracing::info!(node = %self.info, from = %args.from, "Connection request accepted");
        RequestConnectionReply {
            accepted: true,
            name: self.info.name.clone(),
            members: self.cluster.members(),
        }
    }

    pub fn handle_fetch_state(&self) -> FetchStateReply {
        FetchStateReply {
            node: Some(self.info.clone()),
            members: self.cluster.members(),
        }
    }
}
