//! Integration tests for listen/dial/send round trips.

use std::time::Duration;

use netbridge::{Bridge, BridgeConfig, BridgeError, DialerConfig, ListenerConfig};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

mod common;
use common::{wait_until, Recorder};

fn tcp_listener(address: &str) -> ListenerConfig {
    ListenerConfig {
        address: address.into(),
        ..Default::default()
    }
}

fn tcp_dialer(address: &str) -> DialerConfig {
    DialerConfig {
        address: address.into(),
        ..Default::default()
    }
}

#[tokio::test]
async fn ping_round_trip() {
    common::init_tracing();
    let recorder = Recorder::new();
    let bridge = Bridge::new(BridgeConfig::default(), recorder.handlers());

    let addr = bridge.add_listener(&tcp_listener("127.0.0.1:0")).await.unwrap();

    let dialed = bridge.dial(&tcp_dialer(&addr)).await.unwrap();

    // Both the accepted and the dialed side are registered and observed.
    wait_until("both connections registered", || bridge.connection_count() == 2).await;
    wait_until("on_connection fired twice", || recorder.connection_count() == 2).await;

    dialed.send(b"ping").await.unwrap();

    wait_until("ping delivered", || recorder.message_count() == 1).await;
    let messages = recorder.messages();
    assert_eq!(messages[0].1, b"ping");
    // Delivered to the accepted side, not echoed back to the dialer.
    assert_ne!(messages[0].0, dialed.id());

    // Exactly once: nothing further arrives.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(recorder.message_count(), 1);

    bridge.close().await;
}

#[tokio::test]
async fn duplicate_listener_is_rejected_and_first_keeps_accepting() {
    let recorder = Recorder::new();
    let bridge = Bridge::new(BridgeConfig::default(), recorder.handlers());

    let config = tcp_listener("127.0.0.1:29481");
    bridge.add_listener(&config).await.unwrap();

    let err = bridge.add_listener(&config).await.unwrap_err();
    assert!(matches!(err, BridgeError::ListenerExists { .. }));
    assert_eq!(bridge.listener_count(), 1);

    // The original listener still accepts.
    let conn = bridge.dial(&tcp_dialer("127.0.0.1:29481")).await.unwrap();
    wait_until("accepted through original listener", || {
        bridge.connection_count() == 2
    })
    .await;
    drop(conn);

    bridge.close().await;
}

#[tokio::test]
async fn send_to_unknown_id_is_not_found() {
    let recorder = Recorder::new();
    let bridge = Bridge::new(BridgeConfig::default(), recorder.handlers());

    let addr = bridge.add_listener(&tcp_listener("127.0.0.1:0")).await.unwrap();
    let conn = bridge.dial(&tcp_dialer(&addr)).await.unwrap();
    let id = conn.id();

    conn.close().await;
    wait_until("connection deregistered", || bridge.get(id).is_none()).await;

    let err = bridge.send(id, b"payload").await.unwrap_err();
    assert!(matches!(err, BridgeError::ConnectionNotFound { id: missing } if missing == id));
    // No handler observed any delivery.
    assert_eq!(recorder.message_count(), 0);

    bridge.close().await;
}

#[tokio::test]
async fn registry_tracks_accepts_and_read_loop_exits() {
    let recorder = Recorder::new();
    let bridge = Bridge::new(BridgeConfig::default(), recorder.handlers());

    let addr = bridge.add_listener(&tcp_listener("127.0.0.1:0")).await.unwrap();

    let mut clients = Vec::new();
    for _ in 0..3 {
        clients.push(TcpStream::connect(&addr).await.unwrap());
    }
    wait_until("three accepts registered", || bridge.connection_count() == 3).await;

    // Peer disconnect ends each read loop, which deregisters its ID.
    drop(clients);
    wait_until("registry drained after EOF", || bridge.connection_count() == 0).await;

    bridge.close().await;
}

#[tokio::test]
async fn last_used_is_monotonic() {
    let recorder = Recorder::new();
    let bridge = Bridge::new(BridgeConfig::default(), recorder.handlers());

    let addr = bridge.add_listener(&tcp_listener("127.0.0.1:0")).await.unwrap();
    let conn = bridge.dial(&tcp_dialer(&addr)).await.unwrap();

    let t0 = conn.last_used();
    tokio::time::sleep(Duration::from_millis(20)).await;

    conn.send(b"one").await.unwrap();
    let t1 = conn.last_used();
    assert!(t1 >= t0);

    tokio::time::sleep(Duration::from_millis(20)).await;
    conn.send(b"two").await.unwrap();
    let t2 = conn.last_used();
    assert!(t2 >= t1);

    bridge.close().await;
}

#[tokio::test]
async fn start_binds_configured_listeners() {
    let recorder = Recorder::new();
    let config = BridgeConfig {
        listeners: vec![tcp_listener("127.0.0.1:29483"), tcp_listener("127.0.0.1:29484")],
        ..Default::default()
    };
    let bridge = Bridge::new(config, recorder.handlers());

    bridge.start().await.unwrap();
    assert_eq!(bridge.listener_count(), 2);

    bridge.close().await;
}

#[tokio::test]
async fn tags_round_trip_through_bridge_handle() {
    let recorder = Recorder::new();
    let bridge = Bridge::new(BridgeConfig::default(), recorder.handlers());

    let addr = bridge.add_listener(&tcp_listener("127.0.0.1:0")).await.unwrap();
    let conn = bridge.dial(&tcp_dialer(&addr)).await.unwrap();

    conn.set_tag("room", "lobby");
    let via_registry = bridge.get(conn.id()).unwrap();
    assert_eq!(via_registry.tag("room").as_deref(), Some("lobby"));

    bridge.close().await;
}

#[cfg(unix)]
#[tokio::test]
async fn unix_socket_round_trip() {
    use netbridge::Network;

    let path = std::env::temp_dir().join(format!("netbridge-it-{}.sock", std::process::id()));
    let _ = std::fs::remove_file(&path);

    let recorder = Recorder::new();
    let bridge = Bridge::new(BridgeConfig::default(), recorder.handlers());

    let listener = ListenerConfig {
        network: Network::Unix,
        address: path.display().to_string(),
        tls: None,
    };
    bridge.add_listener(&listener).await.unwrap();

    let dialer = DialerConfig {
        network: Network::Unix,
        address: path.display().to_string(),
        ..Default::default()
    };
    let conn = bridge.dial(&dialer).await.unwrap();
    conn.send(b"ping").await.unwrap();

    wait_until("unix ping delivered", || recorder.message_count() == 1).await;
    assert_eq!(recorder.messages()[0].1, b"ping");

    bridge.close().await;
    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn raw_peer_bytes_reach_handler_in_order() {
    let recorder = Recorder::new();
    let bridge = Bridge::new(BridgeConfig::default(), recorder.handlers());

    let addr = bridge.add_listener(&tcp_listener("127.0.0.1:0")).await.unwrap();
    let mut client = TcpStream::connect(&addr).await.unwrap();
    wait_until("accept registered", || bridge.connection_count() == 1).await;

    client.write_all(b"first").await.unwrap();
    wait_until("first chunk", || recorder.message_count() >= 1).await;
    client.write_all(b"second").await.unwrap();
    wait_until("second chunk", || recorder.message_count() >= 2).await;

    let received: Vec<u8> = recorder
        .messages()
        .into_iter()
        .flat_map(|(_, data)| data)
        .collect();
    assert_eq!(received, b"firstsecond");

    bridge.close().await;
}
