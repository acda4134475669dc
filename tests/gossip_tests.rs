//! Gossip join protocol tests over real listeners.


use std::time::Duration;

use test_harness::{assert_eventually, spawn_node};

use raft_lite::channel::Channel;
use raft_lite::cluster::NodeInfo;
use raft_lite::rpc::{RequestConnection, RequestConnectionArgs};

/// A joins via B while B and C are already mutually connected: A must
/// discover C transitively, and B and C must both learn A.
#[tokio::test]
async fn join_converges_transitively() {
    let b = spawn_node("b", 11, None).await;
    let c = spawn_node("c", 12, None).await;

    // Pre-connect B and C
    b.node.establish_connection(c.addr).await.unwrap();
    assert_eq!(b.member_names(), vec!["c"]);
    assert_eq!(c.member_names(), vec!["b"]);

    let a = spawn_node("a", 13, None).await;
    a.node.establish_connection(b.addr).await.unwrap();

    assert_eq!(a.member_names(), vec!["b", "c"]);
    // B learned A while handling the join; C learned A through A's
    // recursive connection attempt, which completed before the call
    // returned.
    assert_eq!(b.member_names(), vec!["a", "c"]);
    assert_eq!(c.member_names(), vec!["a", "b"]);
}

#[tokio::test]
async fn join_is_idempotent() {
    let a = spawn_node("a", 21, None).await;
    let b = spawn_node("b", 22, None).await;

    a.node.establish_connection(b.addr).await.unwrap();
    a.node.establish_connection(b.addr).await.unwrap();

    assert_eq!(a.member_names(), vec!["b"]);
    assert_eq!(b.member_names(), vec!["a"]);
}

/// A second node claiming an already-registered name from a different
/// endpoint is refused, and the refusal does not disturb the table.
#[tokio::test]
async fn duplicate_name_from_other_endpoint_is_refused() {
    let a = spawn_node("a", 31, None).await;
    let b = spawn_node("b", 32, None).await;
    b.node.establish_connection(a.addr).await.unwrap();

    let impostor = spawn_node("b", 33, None).await;
    impostor.node.establish_connection(a.addr).await.unwrap();

    // The impostor was refused and learned nothing
    assert!(impostor.member_names().is_empty());
    // A still maps "b" to the original endpoint
    let members = a.node.cluster().members();
    assert_eq!(members, vec![NodeInfo::new("b", b.addr)]);
}

#[tokio::test]
async fn join_against_dead_address_fails() {
    let a = spawn_node("a", 41, None).await;
    // Bind-then-drop to get an address nothing listens on
    let dead = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    assert!(a.node.establish_connection(dead).await.is_err());
    assert!(a.member_names().is_empty());
}

/// Shutdown drains the accept loop: the server task finishes after cancel,
/// and new connection attempts are no longer answered.
#[tokio::test]
async fn cancelled_server_stops_accepting() {
    let a = spawn_node("a", 51, None).await;
    let addr = a.addr;

    // Reachable before shutdown
    let reply = Channel::reliable(addr)
        .call::<RequestConnection>(RequestConnectionArgs {
            from: NodeInfo::new("probe", "127.0.0.1:9999".parse().unwrap()),
        })
        .await
        .unwrap();
    assert!(reply.accepted);

    a.token.cancel();
    assert_eventually(Duration::from_secs(2), "server drained", || async {
        Channel::reliable(addr)
            .call::<RequestConnection>(RequestConnectionArgs {
                from: NodeInfo::new("probe2", "127.0.0.1:9998".parse().unwrap()),
            })
            .await
            .is_err()
    })
    .await;
}
