//! Wire protocol: a closed set of request/response variants and the frame
//! codec used on every inter-node connection.
//!
//! Each frame is a 4-byte big-endian length prefix followed by a bincode
//! body. One request frame is answered by exactly one response frame.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::cluster::NodeInfo;
use crate::error::{RaftLiteError, Result};
use crate::raft::state::LogEntry;

/// Upper bound on a single frame body. Oversized frames are rejected on both
/// the encoding and decoding side.
pub const MAX_FRAME_LEN: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestConnectionArgs {
    pub from: NodeInfo,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestConnectionReply {
    pub accepted: bool,
    pub name: String,
    pub members: Vec<NodeInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestVoteArgs {
    pub term: u64,
    pub candidate: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestVoteReply {
    pub vote_granted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendEntriesArgs {
    pub term: u64,
    pub entries: Vec<LogEntry>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppendEntriesReply {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendLogsArgs {
    pub entries: Vec<LogEntry>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppendLogsReply {
    pub appended: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchStateArgs {}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FetchStateReply {
    pub node: Option<NodeInfo>,
    pub members: Vec<NodeInfo>,
}

/// Every RPC a node understands, one variant per method.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Request {
    RequestConnection(RequestConnectionArgs),
    RequestVote(RequestVoteArgs),
    AppendEntries(AppendEntriesArgs),
    AppendLogs(AppendLogsArgs),
    FetchState(FetchStateArgs),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Response {
    RequestConnection(RequestConnectionReply),
    RequestVote(RequestVoteReply),
    AppendEntries(AppendEntriesReply),
    AppendLogs(AppendLogsReply),
    FetchState(FetchStateReply),
}

/// Static binding between a method, its argument type, and its reply type.
///
/// The `Default` bound on `Reply` is what a lost channel hands back in place
/// of a real response.
pub trait Rpc {
    const METHOD: &'static str;
    type Args: Serialize + Send;
    type Reply: DeserializeOwned + Default + Send;

    fn into_request(args: Self::Args) -> Request;
    fn from_response(resp: Response) -> Result<Self::Reply>;
}

macro_rules! rpc_method {
    ($marker:ident, $args:ty, $reply:ty) => {
        pub struct $marker;

        impl Rpc for $marker {
            const METHOD: &'static str = stringify!($marker);
            type Args = $args;
            type Reply = $reply;

            fn into_request(args: Self::Args) -> Request {
                Request::$marker(args)
            }

            fn from_response(resp: Response) -> Result<Self::Reply> {
                match resp {
                    Response::$marker(reply) => Ok(reply),
                    _ => Err(RaftLiteError::UnexpectedResponse {
                        method: Self::METHOD,
                    }),
                }
            }
        }
    };
}

rpc_method!(RequestConnection, RequestConnectionArgs, RequestConnectionReply);
rpc_method!(RequestVote, RequestVoteArgs, RequestVoteReply);
rpc_method!(AppendEntries, AppendEntriesArgs, AppendEntriesReply);
rpc_method!(AppendLogs, AppendLogsArgs, AppendLogsReply);
rpc_method!(FetchState, FetchStateArgs, FetchStateReply);

/// Write one length-prefixed frame.
pub async fn write_frame<W, T>(io: &mut W, value: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let body = bincode::serialize(value).map_err(RaftLiteError::Encode)?;
    if body.len() > MAX_FRAME_LEN {
        return Err(RaftLiteError::FrameTooLarge(body.len()));
    }
    io.write_all(&(body.len() as u32).to_be_bytes()).await?;
    io.write_all(&body).await?;
    io.flush().await?;
    Ok(())
}

/// Read one length-prefixed frame.
pub async fn read_frame<R, T>(io: &mut R) -> Result<T>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_bytes = [0u8; 4];
    io.read_exact(&mut len_bytes).await?;
    let len = u32::from_be_bytes(len_bytes) as usize;
    if len > MAX_FRAME_LEN {
        return Err(RaftLiteError::FrameTooLarge(len));
    }
    if len == 0 {
        return Err(RaftLiteError::EmptyFrame);
    }
    let mut body = vec![0u8; len];
    io.read_exact(&mut body).await?;
    bincode::deserialize(&body).map_err(RaftLiteError::Decode)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frame_round_trip() {
        let req = Request::RequestVote(RequestVoteArgs {
            term: 7,
            candidate: "alpha".to_string(),
        });

        let mut cursor = std::io::Cursor::new(Vec::new());
        write_frame(&mut cursor, &req).await.unwrap();
        let buf = cursor.into_inner();
        // 4-byte prefix plus a non-empty body
        assert!(buf.len() > 4);
        assert_eq!(
            u32::from_be_bytes(buf[..4].try_into().unwrap()) as usize,
            buf.len() - 4
        );

        let decoded: Request = read_frame(&mut buf.as_slice()).await.unwrap();
        match decoded {
            Request::RequestVote(args) => {
                assert_eq!(args.term, 7);
                assert_eq!(args.candidate, "alpha");
            }
            other => panic!("wrong variant: {:?}", other),
        }
    }

    #[tokio::test]
    async fn oversized_frame_is_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&((MAX_FRAME_LEN + 1) as u32).to_be_bytes());
        let err = read_frame::<_, Request>(&mut buf.as_slice())
            .await
            .unwrap_err();
        assert!(matches!(err, RaftLiteError::FrameTooLarge(_)));
    }

    #[tokio::test]
    async fn zero_length_frame_is_rejected() {
        let buf = 0u32.to_be_bytes().to_vec();
        let err = read_frame::<_, Request>(&mut buf.as_slice())
            .await
            .unwrap_err();
        assert!(matches!(err, RaftLiteError::EmptyFrame));
    }

    #[test]
    fn response_variant_mismatch_is_an_error() {
        let resp = Response::AppendEntries(AppendEntriesReply {});
        let err = RequestVote::from_response(resp).unwrap_err();
        assert!(matches!(
            err,
            RaftLiteError::UnexpectedResponse {
                method: "RequestVote"
            }
        ));
    }
}
