// ABOUTME: End-to-end coverage of the relay loop's outbound/inbound paths and shutdown behavior
// ABOUTME: Uses the in-memory FakeBroker in place of a real Redis server

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::broker::fake::FakeBroker;
use crate::child::ChildHarness;
use crate::crypto::{Identity, RsaAesCryptor, SessionCryptor};
use crate::relay::config::RelayConfig;
use crate::relay::run::Relay;

fn base_config(name: &str, target: Option<&str>, pipe: bool, nonsecure: bool, block_size: usize) -> RelayConfig {
    RelayConfig {
        redis_url: "redis://unused".to_owned(),
        name: name.to_owned(),
        target: target.map(str::to_owned),
        nonsecure,
        pipe,
        block_size,
        command: Vec::new(),
    }
}

async fn make_relay(
    config: RelayConfig,
    broker: FakeBroker,
) -> (
    Relay<FakeBroker, RsaAesCryptor<FakeBroker>>,
    mpsc::Sender<Bytes>,
    mpsc::Receiver<Bytes>,
) {
    let identity = Identity::generate().unwrap();
    let cryptor = RsaAesCryptor::new(identity, broker.clone());
    cryptor.publish_identity(&config.name).await.unwrap();

    let subscription = broker.subscribe(&config.name).await.unwrap();

    // Stand in for the child harness with directly-held channel endpoints
    // so the test can push "child stdout" frames and observe "child
    // stdin" deliveries without spawning a real process.
    let (stdout_tx, stdout_rx) = mpsc::channel(32);
    let (stdin_tx, stdin_rx) = mpsc::channel(32);
    let (stderr_tx, stderr_rx) = mpsc::channel(32);
    // Mirrors ChildHarness::local_stdio's never-closing stderr source: a
    // dropped sender here would make `Relay::run`'s stderr branch forever
    // `Ready(None)` and starve the other select! arms.
    std::mem::forget(stderr_tx);

    let child = ChildHarness {
        stdout: stdout_rx,
        stderr: stderr_rx,
        stdin: stdin_tx,
        cancellation: CancellationToken::new(),
    };

    let relay = Relay {
        config,
        broker,
        cryptor,
        child,
        subscription,
        cancellation: CancellationToken::new(),
    };

    (relay, stdout_tx, stdin_rx)
}

#[tokio::test]
async fn app_mode_multiplex_publishes_one_envelope_per_target() {
    let broker = FakeBroker::new();
    let config = base_config("alpha", None, false, true, 512 * 1024);
    let (relay, _stdout_tx, _stdin_rx) = make_relay(config, broker.clone()).await;

    let mut beta_sub = broker.subscribe("beta").await.unwrap();
    let mut gamma_sub = broker.subscribe("gamma").await.unwrap();

    relay.handle_outbound(Bytes::from("beta:line1\n")).await;
    relay.handle_outbound(Bytes::from("gamma:line2\n")).await;

    let beta_msg = crate::codec::decode(&beta_sub.recv().await.unwrap()).unwrap();
    assert_eq!(beta_msg.data, b"line1\n");
    let gamma_msg = crate::codec::decode(&gamma_sub.recv().await.unwrap()).unwrap();
    assert_eq!(gamma_msg.data, b"line2\n");
}

#[tokio::test]
async fn blocksize_chunking_splits_into_expected_envelopes() {
    let broker = FakeBroker::new();
    let config = base_config("alpha", None, false, true, 4);
    let (relay, _stdout_tx, _stdin_rx) = make_relay(config, broker.clone()).await;

    let mut beta_sub = broker.subscribe("beta").await.unwrap();
    relay.handle_outbound(Bytes::from("beta:ABCDEFGHIJ\n")).await;

    let mut chunks = Vec::new();
    for _ in 0..3 {
        let env = crate::codec::decode(&beta_sub.recv().await.unwrap()).unwrap();
        chunks.push(env.data);
    }
    assert_eq!(chunks, vec![b"ABCD".to_vec(), b"EFGH".to_vec(), b"IJ\n".to_vec()]);
}

#[tokio::test]
async fn malformed_inbound_is_dropped_and_loop_continues() {
    let broker = FakeBroker::new();
    let config = base_config("alpha", None, false, true, 512 * 1024);
    let (relay, _stdout_tx, mut stdin_rx) = make_relay(config, broker.clone()).await;
    let mut line_acc = std::collections::HashMap::new();

    let shutdown = relay.handle_inbound(Bytes::from("not json {{{"), &mut line_acc).await;
    assert!(!shutdown);

    let good = crate::model::Envelope::data_envelope("beta", "alpha", b"ok\n".to_vec(), false);
    let wire = crate::codec::encode(&good);
    let shutdown = relay.handle_inbound(Bytes::from(wire), &mut line_acc).await;
    assert!(!shutdown);

    let delivered = stdin_rx.recv().await.unwrap();
    assert_eq!(&delivered[..], b"beta:ok\n");
}

#[tokio::test]
async fn app_mode_reassembles_per_peer_lines() {
    let broker = FakeBroker::new();
    let config = base_config("alpha", None, false, true, 512 * 1024);
    let (relay, _stdout_tx, mut stdin_rx) = make_relay(config, broker.clone()).await;
    let mut line_acc = std::collections::HashMap::new();

    let partial = crate::model::Envelope::data_envelope("beta", "alpha", b"hel".to_vec(), false);
    relay
        .handle_inbound(Bytes::from(crate::codec::encode(&partial)), &mut line_acc)
        .await;
    assert!(stdin_rx.try_recv().is_err(), "partial line must not reach the child yet");

    let rest = crate::model::Envelope::data_envelope("beta", "alpha", b"lo\n".to_vec(), false);
    relay
        .handle_inbound(Bytes::from(crate::codec::encode(&rest)), &mut line_acc)
        .await;

    let delivered = stdin_rx.recv().await.unwrap();
    assert_eq!(&delivered[..], b"beta:hello\n");
}

#[tokio::test]
async fn pipe_mode_drops_messages_from_unpinned_peer() {
    let broker = FakeBroker::new();
    let config = base_config("alpha", Some("beta"), true, true, 512 * 1024);
    let (relay, _stdout_tx, mut stdin_rx) = make_relay(config, broker.clone()).await;
    let mut line_acc = std::collections::HashMap::new();

    let from_gamma = crate::model::Envelope::data_envelope("gamma", "alpha", b"intruder".to_vec(), true);
    relay
        .handle_inbound(Bytes::from(crate::codec::encode(&from_gamma)), &mut line_acc)
        .await;
    assert!(stdin_rx.try_recv().is_err());

    let from_beta = crate::model::Envelope::data_envelope("beta", "alpha", b"HELLO\n".to_vec(), true);
    relay
        .handle_inbound(Bytes::from(crate::codec::encode(&from_beta)), &mut line_acc)
        .await;
    let delivered = stdin_rx.recv().await.unwrap();
    assert_eq!(&delivered[..], b"HELLO\n");
}

#[tokio::test]
async fn pipe_mode_eof_control_shuts_down_the_loop() {
    let broker = FakeBroker::new();
    let config = base_config("beta", Some("alpha"), true, true, 512 * 1024);
    let (relay, _stdout_tx, _stdin_rx) = make_relay(config, broker.clone()).await;
    let mut line_acc = std::collections::HashMap::new();

    let eof = crate::model::Envelope::eof_envelope("alpha", "beta");
    let shutdown = relay
        .handle_inbound(Bytes::from(crate::codec::encode(&eof)), &mut line_acc)
        .await;
    assert!(shutdown);
}

#[tokio::test]
async fn control_reset_envelope_rekeys_without_shutting_down() {
    let broker = FakeBroker::new();
    let alpha_config = base_config("alpha", None, false, false, 512 * 1024);
    let (alpha, _alpha_stdout, _alpha_stdin) = make_relay(alpha_config, broker.clone()).await;
    let mut beta_sub = broker.subscribe("beta").await.unwrap();

    // beta isn't actually running in this test, but alpha's outbound path
    // still needs beta's public key on the broker to register a symkey.
    let beta_identity = Identity::generate().unwrap();
    let beta_cryptor = RsaAesCryptor::new(beta_identity, broker.clone());
    beta_cryptor.publish_identity("beta").await.unwrap();

    // alpha registers an outbound key for alpha->beta by sending once.
    alpha.handle_outbound(Bytes::from("beta:first\n")).await;
    let _ = beta_sub.recv().await.unwrap();

    // beta (not actually running) signals that it lost readability of
    // that key; alpha must rekey rather than shut down.
    let reset = crate::model::Envelope::reset_envelope("beta", "alpha");
    let mut line_acc = std::collections::HashMap::new();
    let shutdown = alpha
        .handle_inbound(Bytes::from(crate::codec::encode(&reset)), &mut line_acc)
        .await;
    assert!(!shutdown);

    alpha.handle_outbound(Bytes::from("beta:second\n")).await;
    let envelope = crate::codec::decode(&beta_sub.recv().await.unwrap()).unwrap();
    assert!(envelope.secured);
}

#[tokio::test]
async fn pipe_mode_run_publishes_eof_on_stdout_close() {
    let broker = FakeBroker::new();
    let config = base_config("alpha", Some("beta"), true, true, 512 * 1024);
    let (relay, stdout_tx, _stdin_rx) = make_relay(config, broker.clone()).await;

    let mut beta_sub = broker.subscribe("beta").await.unwrap();

    // Dropping the sender closes the child's stdout stream, the same signal
    // `run()` sees when the child (or, here, alpha's own stdin) hits EOF.
    drop(stdout_tx);

    relay.run().await;

    let wire = beta_sub.recv().await.unwrap();
    let envelope = crate::codec::decode(&wire).unwrap();
    assert_eq!(envelope.from, "alpha");
    assert_eq!(envelope.to, "beta");
    assert_eq!(envelope.control, crate::model::ControlCode::Eof);
}

#[tokio::test]
async fn secure_round_trip_between_two_relays() {
    let broker = FakeBroker::new();
    let alpha_config = base_config("alpha", None, false, false, 512 * 1024);
    let beta_config = base_config("beta", None, false, false, 512 * 1024);

    let (alpha, _alpha_stdout, _alpha_stdin) = make_relay(alpha_config, broker.clone()).await;
    let (beta, _beta_stdout, mut beta_stdin) = make_relay(beta_config, broker.clone()).await;

    let mut beta_sub = broker.subscribe("beta").await.unwrap();
    alpha.handle_outbound(Bytes::from("beta:secret payload\n")).await;

    let wire = beta_sub.recv().await.unwrap();
    let envelope = crate::codec::decode(&wire).unwrap();
    assert!(envelope.secured);

    let mut line_acc = std::collections::HashMap::new();
    beta.handle_inbound(wire, &mut line_acc).await;
    let delivered = beta_stdin.recv().await.unwrap();
    assert_eq!(&delivered[..], b"alpha:secret payload\n");
}
