//! Producer loop against a real TCP listener that comes and goes.

use std::time::Duration;

use tokio::net::TcpListener;
use tokio::time::timeout;
use vive_core::{decode_payload, read_frame, Shutdown, DEFAULT_MAX_FRAME_LEN};
use vive_sender::producer::{Producer, ProducerConfig, ProducerExit};
use vive_sender::synthetic::SyntheticSource;

fn roles() -> Vec<String> {
    vec!["right_elbow".to_string(), "chest".to_string()]
}

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn fast_config(port: u16) -> ProducerConfig {
    let mut config = ProducerConfig::new(format!("127.0.0.1:{port}"));
    config.connect_timeout = Duration::from_secs(1);
    config.reconnect_delay = Duration::from_millis(100);
    config
}

#[tokio::test]
async fn keeps_retrying_until_receiver_listens() {
    let port = free_port();
    let shutdown = Shutdown::new();
    let mut producer = Producer::new(fast_config(port), SyntheticSource::new(roles(), 100.0, None));
    let signal = shutdown.signal();
    let task = tokio::spawn(async move {
        let exit = producer.run(signal).await;
        (exit, producer.stats())
    });

    tokio::time::sleep(Duration::from_millis(350)).await;
    assert!(!task.is_finished(), "producer gave up while receiver was down");

    let listener = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
    let (mut conn, _) = timeout(Duration::from_secs(5), listener.accept())
        .await
        .unwrap()
        .unwrap();
    let mut last_ts = 0;
    for _ in 0..3 {
        let payload = timeout(Duration::from_secs(5), read_frame(&mut conn, DEFAULT_MAX_FRAME_LEN))
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let frame = decode_payload(&payload).unwrap();
        assert_eq!(frame.trackers.len(), 2);
        assert_eq!(frame.trackers[0].role, "right_elbow");
        assert!(frame.timestamp_ns >= last_ts);
        last_ts = frame.timestamp_ns;
    }

    shutdown.trigger();
    let (exit, stats) = timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
    assert_eq!(exit, ProducerExit::Shutdown);
    assert!(stats.connect_attempts >= 2);
    assert!(stats.connections >= 1);
    assert!(stats.frames_sent >= 3);
    // Stopping again after the loop is gone is a no-op.
    shutdown.trigger();
}

#[tokio::test]
async fn reconnects_after_receiver_drops_connection() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let shutdown = Shutdown::new();
    let mut producer = Producer::new(fast_config(port), SyntheticSource::new(roles(), 200.0, None));
    let signal = shutdown.signal();
    let task = tokio::spawn(async move { producer.run(signal).await });

    let (mut first, _) = timeout(Duration::from_secs(5), listener.accept())
        .await
        .unwrap()
        .unwrap();
    read_frame(&mut first, DEFAULT_MAX_FRAME_LEN).await.unwrap().unwrap();
    drop(first);

    let (mut second, _) = timeout(Duration::from_secs(5), listener.accept())
        .await
        .unwrap()
        .unwrap();
    let payload = timeout(Duration::from_secs(5), read_frame(&mut second, DEFAULT_MAX_FRAME_LEN))
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(decode_payload(&payload).unwrap().trackers.len(), 2);

    shutdown.trigger();
    let exit = timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
    assert_eq!(exit, ProducerExit::Shutdown);
}
