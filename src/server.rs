//! Inbound RPC serving: the accept loop and per-connection dispatch.

use std::io::ErrorKind;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::error::{RaftLiteError, Result};
use crate::node::Node;
use crate::raft::ConsensusMachine;
use crate::rpc::{self, Request, Response};

/// Serves this node's RPC surface.
///
/// One task accepts connections; each accepted connection gets its own
/// handling task that answers sequential request frames until the peer hangs
/// up. Cancelling the token stops accepting and lets in-flight connections
/// drain before `run` returns.
pub struct RpcServer {
    node: Arc<Node>,
    machine: Arc<ConsensusMachine>,
}

impl RpcServer {
    pub fn new(node: Arc<Node>, machine: Arc<ConsensusMachine>) -> Self {
        Self { node, machine }
    }

    pub async fn run(self, listener: TcpListener, shutdown: CancellationToken) {
        let tracker = TaskTracker::new();
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(node = %self.node.self_info(), addr = %addr, "Start server");
        }

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, remote)) => {
                            tracing::debug!(remote = %remote, "Connection accepted");
                            let node = Arc::clone(&self.node);
                            let machine = Arc::clone(&self.machine);
                            let token = shutdown.clone();
                            tracker.spawn(async move {
                                if let Err(e) =
                                    serve_connection(stream, node, machine, token).await
                                {
                                    tracing::debug!(
                                        remote = %remote,
                                        error = %e,
                                        "Connection closed with error"
                                    );
                                }
                            });
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "Accept failed");
                        }
                    }
                }
            }
        }

        drop(listener);
        tracker.close();
        tracker.wait().await;
        tracing::info!(node = %self.node.self_info(), "Server shut down");
    }
}

/// Answer request frames on one connection until EOF or shutdown.
///
/// A request that is already being handled always gets its response written;
/// cancellation only interrupts the wait for the next request.
async fn serve_connection(
    mut stream: TcpStream,
    node: Arc<Node>,
    machine: Arc<ConsensusMachine>,
    shutdown: CancellationToken,
) -> Result<()> {
    loop {
        let request = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            read = rpc::read_frame::<_, Request>(&mut stream) => read,
        };
        let request = match request {
            Ok(request) => request,
            Err(RaftLiteError::Io(e)) if e.kind() == ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(e),
        };
        let response = dispatch(&node, &machine, request).await;
        rpc::write_frame(&mut stream, &response).await?;
    }
}

async fn dispatch(node: &Node, machine: &ConsensusMachine, request: Request) -> Response {
    match request {
        Request::RequestConnection(args) => {
            Response::RequestConnection(node.handle_request_connection(args))
        }
        Request::RequestVote(args) => {
            Response::RequestVote(machine.handle_request_vote(args).await)
        }
        Request::AppendEntries(args) => {
            Response::AppendEntries(machine.handle_append_entries(args).await)
        }
        Request::AppendLogs(args) => {
            Response::AppendLogs(machine.handle_append_logs(args).await)
        }
        Request::FetchState(_) => Response::FetchState(node.handle_fetch_state()),
    }
}
