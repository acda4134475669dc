pub mod channel;
pub mod cluster;
pub mod config;
pub mod error;
pub mod node;
pub mod raft;
pub mod rpc;
pub mod server;
pub mod shutdown;
