//! Leader election tests: single-node liveness and a fault-free three-node
//! cluster.


use std::time::Duration;

use test_harness::{assert_eventually, spawn_node};

use raft_lite::raft::state::Role;

/// A cluster of one times out as follower, campaigns against zero peers, and
/// wins vacuously.
#[tokio::test]
async fn single_node_elects_itself() {
    let a = spawn_node("a", 61, Some((50, 100))).await;

    assert_eventually(Duration::from_secs(5), "node promoted itself", || async {
        a.role().await == Role::Leader
    })
    .await;

    let state = a.machine.state.read().await;
    assert!(state.term >= 1);
    assert_eq!(state.leader.as_deref(), Some("a"));
}

/// With disjoint timeout windows the impatient node campaigns first, wins a
/// quorum, and its heartbeats keep the others followers.
#[tokio::test]
async fn three_nodes_elect_exactly_one_leader() {
    // a times out well before b and c can
    let a = spawn_node("a", 71, Some((150, 200))).await;
    let b = spawn_node("b", 72, Some((900, 1200))).await;
    let c = spawn_node("c", 73, Some((900, 1200))).await;

    b.node.establish_connection(a.addr).await.unwrap();
    c.node.establish_connection(a.addr).await.unwrap();

    assert_eventually(Duration::from_secs(5), "a won the election", || async {
        a.role().await == Role::Leader
    })
    .await;

    // Heartbeats propagate a's term and keep the others followers
    assert_eventually(
        Duration::from_secs(5),
        "followers adopted the leader's term",
        || async {
            b.role().await == Role::Follower
                && c.role().await == Role::Follower
                && b.term().await == a.term().await
                && c.term().await == a.term().await
        },
    )
    .await;
}

/// An unreachable peer is removed from the electorate, after which the
/// remaining (empty) round succeeds.
#[tokio::test]
async fn unreachable_peer_is_removed_during_election() {
    let a = spawn_node("a", 85, Some((50, 100))).await;
    let dead = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    a.node
        .cluster()
        .append(raft_lite::cluster::NodeInfo::new("ghost", dead));

    assert_eventually(
        Duration::from_secs(5),
        "ghost removed and leadership taken",
        || async { a.member_names().is_empty() && a.role().await == Role::Leader },
    )
    .await;
}

/// A granted vote adopts the candidate's term and records it as leader-elect
/// on the voter.
#[tokio::test]
async fn voters_record_the_candidate() {
    let a = spawn_node("a", 81, Some((100, 150))).await;
    let b = spawn_node("b", 82, None).await;

    b.node.establish_connection(a.addr).await.unwrap();

    assert_eventually(Duration::from_secs(5), "b voted for a", || async {
        b.machine.state.read().await.leader.as_deref() == Some("a")
    })
    .await;
    assert_eq!(b.role().await, Role::Follower);
}
