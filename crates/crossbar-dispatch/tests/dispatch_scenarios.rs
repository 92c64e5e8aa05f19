//! End-to-end dispatch scenarios.
//!
//! Each test assembles a real dispatcher (catalog + registry + built-in
//! middleware pipeline) and drives it with a loopback connection, checking
//! the externally visible contract: what lands on the connection.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
    time::Duration,
};

use crossbar_crypto::{Algorithm, CipherSuite, EncryptionKey};
use crossbar_dispatch::{
    CatalogBuilder, ChannelConfig, Controller, Dispatcher, DispatcherConfig, DropPolicy, Inbound,
    PermissionLevel, Routes, Transformer, TransformerRegistryBuilder, decrypt, encrypt,
    testing::LoopbackConnection,
};
use crossbar_proto::{
    ControlReason, Packet, PacketFlags, Priority, builtin, magic,
};

const APP_MAGIC: u32 = 0x0100_0001;
const ECHO_OPCODE: u16 = 0x1000;

struct EchoController {
    invocations: Arc<AtomicU32>,
    seen_payloads: Arc<parking_lot::Mutex<Vec<Vec<u8>>>>,
    encrypted: bool,
    delay: Option<Duration>,
    rate_limited: bool,
}

impl EchoController {
    fn new() -> Self {
        Self {
            invocations: Arc::new(AtomicU32::new(0)),
            seen_payloads: Arc::new(parking_lot::Mutex::new(Vec::new())),
            encrypted: false,
            delay: None,
            rate_limited: false,
        }
    }
}

impl Controller for EchoController {
    fn name(&self) -> &'static str {
        "echo"
    }

    fn register(&self, routes: &mut Routes) {
        let invocations = Arc::clone(&self.invocations);
        let seen = Arc::clone(&self.seen_payloads);
        let delay = self.delay;

        let route = routes.handle(ECHO_OPCODE, move |packet: Packet, _conn| {
            let invocations = Arc::clone(&invocations);
            let seen = Arc::clone(&seen);
            async move {
                invocations.fetch_add(1, Ordering::SeqCst);
                seen.lock().push(packet.payload().to_vec());
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                packet.payload().to_vec()
            }
        });

        let route = if self.encrypted { route.require_encryption() } else { route };
        let route =
            if self.delay.is_some() { route.timeout(Duration::from_millis(50)) } else { route };
        if self.rate_limited {
            route.rate_limit(2, Duration::from_secs(1));
        }
    }
}

fn dispatcher_for(controller: &EchoController) -> Arc<Dispatcher> {
    let catalog = CatalogBuilder::new().controller(controller).build().expect("catalog builds");
    let registry = TransformerRegistryBuilder::new()
        .with_builtin_types()
        .register(APP_MAGIC, Transformer::pipeline_managed())
        .expect("registry builds")
        .freeze();

    Dispatcher::builder().catalog(catalog).registry(registry).build()
}

fn request(payload: &[u8]) -> Packet {
    Packet::new(APP_MAGIC, ECHO_OPCODE, payload).expect("request fits a frame")
}

#[tokio::test]
async fn happy_echo_round_trip() {
    let controller = EchoController::new();
    let dispatcher = dispatcher_for(&controller);
    dispatcher.start();

    let connection = LoopbackConnection::new(1);
    dispatcher
        .ingest(request(b"ping"), Arc::clone(&connection) as _)
        .await
        .expect("enqueue succeeds");

    let sent = connection.wait_for_sent(1, Duration::from_secs(1)).await;
    assert_eq!(sent.len(), 1);

    let reply = &sent[0];
    assert_eq!(reply.payload(), b"ping");
    assert_eq!(reply.opcode(), ECHO_OPCODE);
    assert_eq!(reply.magic(), magic::builtin::BINARY_128);
    assert!(reply.flags().contains(PacketFlags::IS_RESPONSE));
    assert!(reply.is_valid());
    assert_eq!(controller.invocations.load(Ordering::SeqCst), 1);

    dispatcher.shutdown().await;
}

#[tokio::test]
async fn encrypted_round_trip() {
    let controller = EchoController { encrypted: true, ..EchoController::new() };
    let dispatcher = dispatcher_for(&controller);
    dispatcher.start();

    let suite = CipherSuite::standard();
    let key = EncryptionKey::from([0x5Au8; 32]);
    let connection = LoopbackConnection::configured(
        1,
        PermissionLevel::Guest,
        Algorithm::ChaCha20Poly1305,
        Some(key.clone()),
    );

    let sealed = encrypt(&request(b"ping"), &suite, &key, Algorithm::ChaCha20Poly1305)
        .expect("seal the request");
    assert!(sealed.flags().contains(PacketFlags::ENCRYPTED));

    dispatcher.ingest(sealed, Arc::clone(&connection) as _).await.expect("enqueue succeeds");

    let sent = connection.wait_for_sent(1, Duration::from_secs(1)).await;
    assert_eq!(sent.len(), 1);

    // Handler saw plaintext
    assert_eq!(controller.seen_payloads.lock().clone(), vec![b"ping".to_vec()]);

    // Reply left re-encrypted, checksum covering the ciphertext
    let reply = &sent[0];
    assert!(reply.flags().contains(PacketFlags::ENCRYPTED));
    assert!(reply.is_valid());
    assert_ne!(reply.payload(), b"ping");

    let opened =
        decrypt(reply, &suite, &key, Algorithm::ChaCha20Poly1305).expect("reply decrypts");
    assert_eq!(opened.payload(), b"ping");

    dispatcher.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn slow_handler_times_out_with_literal_text() {
    let controller =
        EchoController { delay: Some(Duration::from_millis(200)), ..EchoController::new() };
    let dispatcher = dispatcher_for(&controller);

    let connection = LoopbackConnection::new(1);
    dispatcher
        .dispatch(Inbound { packet: request(b"slow"), connection: Arc::clone(&connection) as _ })
        .await;

    let sent = connection.sent();
    assert_eq!(sent.len(), 1, "exactly the timeout text, no discarded echo");
    assert_eq!(builtin::text_of(&sent[0]).unwrap(), "Request timeout (50ms)");
    // The handler started but its return was discarded
    assert_eq!(controller.invocations.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn third_request_in_window_is_rate_limited() {
    let controller = EchoController { rate_limited: true, ..EchoController::new() };
    let dispatcher = dispatcher_for(&controller);

    let connection = LoopbackConnection::new(1);
    for _ in 0..3 {
        dispatcher
            .dispatch(Inbound {
                packet: request(b"hey"),
                connection: Arc::clone(&connection) as _,
            })
            .await;
    }

    let sent = connection.sent();
    assert_eq!(sent.len(), 3);
    assert_eq!(sent[0].payload(), b"hey");
    assert_eq!(sent[1].payload(), b"hey");
    assert_eq!(builtin::text_of(&sent[2]).unwrap(), "Rate limited");
    assert_eq!(controller.invocations.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn realtime_preempts_a_full_normal_lane() {
    let controller = EchoController::new();
    let catalog = CatalogBuilder::new().controller(&controller).build().unwrap();
    let registry = TransformerRegistryBuilder::new()
        .with_builtin_types()
        .register(APP_MAGIC, Transformer::pipeline_managed())
        .unwrap()
        .freeze();

    let config = DispatcherConfig {
        channel: ChannelConfig {
            capacity_per_lane: [4; Priority::LANES],
            drop_policy: DropPolicy::DropNewest,
            ..ChannelConfig::default()
        },
        ..DispatcherConfig::default()
    };
    let dispatcher =
        Dispatcher::builder().catalog(catalog).registry(registry).config(config).build();

    let connection = LoopbackConnection::new(1);

    // Fill the Normal lane
    for _ in 0..4 {
        dispatcher
            .ingest(request(b"bulk"), Arc::clone(&connection) as _)
            .await
            .expect("lane has room");
    }

    // One Realtime, then one more Normal (rejected: lane is full)
    dispatcher
        .ingest(
            request(b"urgent").with_priority(Priority::Realtime),
            Arc::clone(&connection) as _,
        )
        .await
        .expect("realtime lane has room");
    let overflow = dispatcher.ingest(request(b"bulk"), Arc::clone(&connection) as _).await;
    assert!(overflow.is_err(), "normal lane is at capacity");

    let first = dispatcher.channel().try_dequeue().expect("items queued");
    assert_eq!(first.packet.priority(), Priority::Realtime);
    assert_eq!(first.packet.payload(), b"urgent");
}

#[tokio::test]
async fn unsupported_opcode_fails_without_invoking_handlers() {
    let controller = EchoController::new();
    let dispatcher = dispatcher_for(&controller);

    let connection = LoopbackConnection::new(1);
    let stray = Packet::new(APP_MAGIC, 0x4242, b"?".as_slice()).unwrap();
    dispatcher
        .dispatch(Inbound { packet: stray, connection: Arc::clone(&connection) as _ })
        .await;

    let controls = connection.sent_controls();
    assert_eq!(controls.len(), 1);
    assert_eq!(controls[0].reason, ControlReason::NoHandler);
    assert_eq!(controller.invocations.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn shutdown_stops_workers_and_closes_the_channel() {
    let controller = EchoController::new();
    let dispatcher = dispatcher_for(&controller);
    dispatcher.start();

    let connection = LoopbackConnection::new(1);
    dispatcher.ingest(request(b"one"), Arc::clone(&connection) as _).await.unwrap();
    connection.wait_for_sent(1, Duration::from_secs(1)).await;

    dispatcher.shutdown().await;

    let result = dispatcher.ingest(request(b"two"), Arc::clone(&connection) as _).await;
    assert!(result.is_err(), "closed channel rejects ingest");
}
