//! Point-to-point RPC transport with per-channel fault injection.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpStream;

use crate::error::Result;
use crate::rpc::{self, Response, Rpc};

/// How a channel treats the message it carries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Fault {
    /// Dial and invoke immediately
    Reliable,
    /// Sleep the given duration before dialing
    Delayed(Duration),
    /// Drop the message; the caller sees a zero-valued success
    Lost,
}

/// A one-destination communication channel.
///
/// Channels are stateless between calls; every call redials the destination.
/// The fault profile is fixed at construction, so one enumeration of the peer
/// set keeps its fault decisions for the whole round.
#[derive(Debug, Clone)]
pub struct Channel {
    dest: SocketAddr,
    fault: Fault,
}

impl Channel {
    pub fn reliable(dest: SocketAddr) -> Self {
        Self {
            dest,
            fault: Fault::Reliable,
        }
    }

    pub fn delayed(dest: SocketAddr, delay: Duration) -> Self {
        Self {
            dest,
            fault: Fault::Delayed(delay),
        }
    }

    pub fn lost(dest: SocketAddr) -> Self {
        Self {
            dest,
            fault: Fault::Lost,
        }
    }

    pub fn dest(&self) -> SocketAddr {
        self.dest
    }

    pub fn fault(&self) -> Fault {
        self.fault
    }

    /// Send one RPC to the destination and wait for its reply.
    ///
    /// Dial, I/O, and decode errors propagate verbatim. A lost channel does
    /// no network activity and reports a default-valued reply with no error,
    /// so loss is indistinguishable from an unacknowledged success at the
    /// call site.
    pub async fn call<R: Rpc>(&self, args: R::Args) -> Result<R::Reply> {
        match self.fault {
            Fault::Lost => Ok(R::Reply::default()),
            Fault::Delayed(delay) => {
                tokio::time::sleep(delay).await;
                self.invoke::<R>(args).await
            }
            Fault::Reliable => self.invoke::<R>(args).await,
        }
    }

    async fn invoke<R: Rpc>(&self, args: R::Args) -> Result<R::Reply> {
        let mut stream = TcpStream::connect(self.dest).await?;
        rpc::write_frame(&mut stream, &R::into_request(args)).await?;
        let response: Response = rpc::read_frame(&mut stream).await?;
        R::from_response(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::{AppendLogs, AppendLogsArgs, RequestVote, RequestVoteArgs};
    use crate::raft::state::LogEntry;

    fn unroutable() -> SocketAddr {
        // Nothing listens here; a reliable channel would fail to dial.
        "127.0.0.1:1".parse().unwrap()
    }

    #[tokio::test]
    async fn lost_channel_returns_default_reply() {
        let ch = Channel::lost(unroutable());
        let reply = ch
            .call::<RequestVote>(RequestVoteArgs {
                term: 99,
                candidate: "alpha".to_string(),
            })
            .await
            .unwrap();
        assert!(!reply.vote_granted);
    }

    #[tokio::test]
    async fn lost_channel_ignores_method_and_arguments() {
        let ch = Channel::lost(unroutable());
        let reply = ch
            .call::<AppendLogs>(AppendLogsArgs {
                entries: vec![LogEntry::from("x"), LogEntry::from("y")],
            })
            .await
            .unwrap();
        assert_eq!(reply.appended, 0);
    }

    #[tokio::test]
    async fn reliable_channel_propagates_dial_errors() {
        let ch = Channel::reliable(unroutable());
        let err = ch
            .call::<RequestVote>(RequestVoteArgs {
                term: 1,
                candidate: "alpha".to_string(),
            })
            .await;
        assert!(err.is_err());
    }

    #[test]
    fn channel_reports_destination() {
        let dest = unroutable();
        assert_eq!(Channel::reliable(dest).dest(), dest);
        assert_eq!(Channel::lost(dest).dest(), dest);
    }
}
