//! End-to-end scenarios: real relay servers on loopback, a real client,
//! onion frames travelling the full path.

use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use dor_core::client::Client;
use dor_core::identity::load_private_identity;
use dor_core::server::Server;
use dor_packet::endpoint::Endpoint;
use dor_packet::relay::{Relay, RelayGroup};

struct TestRelay {
    ep: Endpoint,
    server: Server,
    shutdown: CancellationToken,
    task: tokio::task::JoinHandle<()>,
    delivered: mpsc::Receiver<Vec<u8>>,
    _dir: tempfile::TempDir,
}

impl TestRelay {
    async fn spawn(bind: &str) -> TestRelay {
        let dir = tempfile::tempdir().unwrap();
        let identity = load_private_identity(dir.path()).unwrap();

        let listener = TcpListener::bind(bind).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let ep = Endpoint::new(addr.ip(), addr.port()).unwrap();

        let (tx, rx) = mpsc::channel(8);
        let mut server = Server::new(identity);
        server.set_delivery_sink(tx);

        let shutdown = CancellationToken::new();
        let task = {
            let server = server.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { server.run(listener, shutdown).await })
        };

        TestRelay {
            ep,
            server,
            shutdown,
            task,
            delivered: rx,
            _dir: dir,
        }
    }

    async fn stop(self) {
        self.shutdown.cancel();
        self.task.await.unwrap();
    }

    async fn expect_delivery(&mut self) -> Vec<u8> {
        timeout(Duration::from_secs(5), self.delivered.recv())
            .await
            .expect("payload should be delivered in time")
            .expect("delivery sink should stay open")
    }

    fn expect_no_delivery(&mut self) {
        assert!(
            self.delivered.try_recv().is_err(),
            "no payload should have been delivered"
        );
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn single_hop_over_ipv6_delivers_the_payload() {
    let mut relay = TestRelay::spawn("[::1]:0").await;

    let client = Client::new();
    let groups = client.resolve_path(&[vec![relay.ep]]).await.unwrap();
    let dest: Endpoint = "[::1]:8080".parse().unwrap();
    client.send_message(dest, groups, b"ping").await.unwrap();

    assert_eq!(relay.expect_delivery().await, b"ping");
    relay.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn two_hop_chain_delivers_the_payload() {
    let mut first = TestRelay::spawn("127.0.0.1:0").await;
    let mut second = TestRelay::spawn("127.0.0.1:0").await;

    let client = Client::new();
    let groups = client
        .resolve_path(&[vec![first.ep], vec![second.ep]])
        .await
        .unwrap();
    let dest: Endpoint = "8.8.8.8:63".parse().unwrap();

    let payload = b"Who are you? Google?";
    client.send_message(dest, groups, payload).await.unwrap();

    assert_eq!(second.expect_delivery().await, payload);
    first.expect_no_delivery();

    // Let the first relay's task get past its post-send bookkeeping.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(first.server.stats().counters.onions_relayed(), 1);
    assert_eq!(second.server.stats().counters.onions_delivered(), 1);

    first.stop().await;
    second.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn five_hop_path_delivers_the_payload() {
    let mut relays = Vec::new();
    for _ in 0..5 {
        relays.push(TestRelay::spawn("127.0.0.1:0").await);
    }

    let client = Client::new();
    let path: Vec<Vec<Endpoint>> = relays.iter().map(|r| vec![r.ep]).collect();
    let groups = client.resolve_path(&path).await.unwrap();
    let dest: Endpoint = "[::1]:8080".parse().unwrap();
    client.send_message(dest, groups, b"hello").await.unwrap();

    let mut last = relays.pop().unwrap();
    assert_eq!(last.expect_delivery().await, b"hello");
    last.stop().await;
    for relay in relays {
        relay.stop().await;
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn frame_for_an_unknown_identity_is_dropped_silently() {
    let mut relay = TestRelay::spawn("127.0.0.1:0").await;

    // A group pointing at the live relay's endpoint but carrying a
    // stranger's identity material: the relay can never unwrap a slot.
    let stranger_sk = dor_crypto::clamp_scalar(dor_crypto::random_array());
    let stranger = Relay {
        ep: relay.ep,
        uuid: uuid::Uuid::new_v4(),
        pub_key: dor_crypto::derive_public_key(stranger_sk),
    };
    let groups = vec![RelayGroup::new(vec![stranger]).unwrap()];

    let client = Client::new();
    let dest: Endpoint = "[::1]:8080".parse().unwrap();
    client.send_message(dest, groups, b"x").await.unwrap();

    // Give the relay a moment to process and drop the frame.
    tokio::time::sleep(Duration::from_millis(300)).await;
    relay.expect_no_delivery();
    assert_eq!(relay.server.stats().counters.onions_dropped(), 1);

    // The relay is still healthy and answering.
    client.fetch_relay_identity(relay.ep).await.unwrap();
    relay.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn first_group_candidates_are_tried_in_order() {
    let mut live = TestRelay::spawn("127.0.0.1:0").await;

    // Reserve a port, then free it so the dial is refused.
    let dead_ep = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        Endpoint::new(addr.ip(), addr.port()).unwrap()
    };

    let client = Client::new();
    let live_relay = client.fetch_relay_identity(live.ep).await.unwrap();
    let dead_sk = dor_crypto::clamp_scalar(dor_crypto::random_array());
    let dead_relay = Relay {
        ep: dead_ep,
        uuid: uuid::Uuid::new_v4(),
        pub_key: dor_crypto::derive_public_key(dead_sk),
    };

    let groups = vec![RelayGroup::new(vec![dead_relay, live_relay]).unwrap()];
    let dest: Endpoint = "[::1]:8080".parse().unwrap();
    client.send_message(dest, groups, b"fallback").await.unwrap();

    assert_eq!(live.expect_delivery().await, b"fallback");
    live.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_stops_accepting_and_is_idempotent() {
    let relay = TestRelay::spawn("127.0.0.1:0").await;
    let ep = relay.ep;
    let shutdown = relay.shutdown.clone();

    shutdown.cancel();
    relay.task.await.unwrap();

    // A second cancellation is a no-op.
    shutdown.cancel();

    // The listener is gone; new connections are refused.
    let client = Client::new();
    assert!(client.fetch_relay_identity(ep).await.is_err());
}
