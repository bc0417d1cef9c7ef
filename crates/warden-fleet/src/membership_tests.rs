use super::*;
use crate::pubsub::ChannelSubscriber;
use mockall::mock;
use std::time::Duration;
use warden_store::MemoryStore;

mock! {
    pub Bootstrap {}

    #[async_trait]
    impl Bootstrapper for Bootstrap {
        async fn bootstrap(&self, node: &NodeEndpoint) -> bool;
    }
}

const TOPIC: &str = "bw-instances";

fn startup(hostname: &str, port: &str, server_name: &str) -> String {
    serde_json::json!({
        "type": "startup",
        "data": {"hostname": hostname, "listening_port": port, "server_name": server_name}
    })
    .to_string()
}

fn listener(
    bus: &ChannelSubscriber,
    store: Arc<MemoryStore>,
    bootstrap: MockBootstrap,
    max_retries: u32,
) -> (Arc<MembershipListener>, Arc<Readiness>) {
    let readiness = Arc::new(Readiness::new());
    let listener = MembershipListener::new(
        Arc::new(bus.clone()),
        store,
        Arc::new(bootstrap),
        readiness.clone(),
        MembershipConfig {
            topic: TOPIC.to_string(),
            retry_interval: Duration::from_millis(5),
            max_retries,
        },
    );
    (Arc::new(listener), readiness)
}

#[test]
fn test_parse_valid_startup() {
    let announcement = parse_announcement(&startup("node-1", "5000", "bwapi")).unwrap();
    assert_eq!(
        announcement,
        Announcement {
            hostname: "node-1".to_string(),
            port: 5000,
            server_name: "bwapi".to_string(),
        }
    );
}

#[test]
fn test_parse_numeric_port() {
    let payload = r#"{"type":"startup","data":{"hostname":"n","listening_port":8080,"server_name":"s"}}"#;
    assert_eq!(parse_announcement(payload).unwrap().port, 8080);
}

#[test]
fn test_parse_rejections() {
    assert!(matches!(
        parse_announcement("not json"),
        Err(RejectReason::Malformed(_))
    ));
    assert!(matches!(
        parse_announcement(r#"{"type":"shutdown","data":{}}"#),
        Err(RejectReason::UnsupportedType(_))
    ));
    assert_eq!(
        parse_announcement(r#"{"type":"startup"}"#),
        Err(RejectReason::MissingField("data"))
    );
    assert_eq!(
        parse_announcement(r#"{"type":"startup","data":{"listening_port":"1","server_name":"s"}}"#),
        Err(RejectReason::MissingField("hostname"))
    );
    assert_eq!(
        parse_announcement(r#"{"type":"startup","data":{"hostname":"h","server_name":"s"}}"#),
        Err(RejectReason::MissingField("listening_port"))
    );
    assert_eq!(
        parse_announcement(r#"{"type":"startup","data":{"hostname":"h","listening_port":"1"}}"#),
        Err(RejectReason::MissingField("server_name"))
    );
}

#[test]
fn test_parse_port_bounds() {
    for port in ["0", "65536", "-1", "http", ""] {
        let err = parse_announcement(&startup("h", port, "s")).unwrap_err();
        assert!(
            matches!(err, RejectReason::InvalidField { field: "listening_port", .. }),
            "{}",
            port
        );
    }
    assert_eq!(parse_announcement(&startup("h", "65535", "s")).unwrap().port, 65535);
    assert_eq!(parse_announcement(&startup("h", "1", "s")).unwrap().port, 1);
}

#[test]
fn test_parse_length_bounds() {
    let long = "a".repeat(257);
    let max = "a".repeat(256);
    assert!(parse_announcement(&startup(&long, "5000", "s")).is_err());
    assert!(parse_announcement(&startup("h", "5000", &long)).is_err());
    assert!(parse_announcement(&startup(&max, "5000", &max)).is_ok());
}

#[test]
fn test_parse_length_counts_characters() {
    let accented = "é".repeat(200);
    let parsed = parse_announcement(&startup(&accented, "5000", &accented)).unwrap();
    assert_eq!(parsed.hostname, accented);
    assert_eq!(parsed.server_name, accented);

    let too_long = "é".repeat(257);
    assert!(parse_announcement(&startup(&too_long, "5000", "s")).is_err());
}

#[tokio::test]
async fn test_rejected_message_leaves_registry_untouched() {
    let bus = ChannelSubscriber::new();
    let store = Arc::new(MemoryStore::new());
    let mut bootstrap = MockBootstrap::new();
    bootstrap.expect_bootstrap().times(0);
    let (listener, _) = listener(&bus, store.clone(), bootstrap, 10);

    assert!(listener.handle_message(&startup("h", "70000", "s")).await.is_none());
    assert!(store.get_instances().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_new_instance_bootstraps_once() {
    let bus = ChannelSubscriber::new();
    let store = Arc::new(MemoryStore::new());
    let mut bootstrap = MockBootstrap::new();
    bootstrap
        .expect_bootstrap()
        .withf(|node| node.hostname == "node-1" && node.port == 5000)
        .times(1)
        .returning(|_| true);
    let (listener, _) = listener(&bus, store.clone(), bootstrap, 10);

    assert_eq!(
        listener.handle_message(&startup("node-1", "5000", "bwapi")).await,
        Some(UpsertOutcome::Created)
    );
    assert_eq!(
        listener.handle_message(&startup("node-1", "5001", "bwapi")).await,
        Some(UpsertOutcome::Updated)
    );

    let instances = store.get_instances().await.unwrap();
    assert_eq!(instances.len(), 1);
    assert_eq!(instances[0].method, InstanceMethod::Dynamic);
    assert_eq!(instances[0].port, 5001);
}

#[tokio::test]
async fn test_run_processes_published_messages() {
    let bus = ChannelSubscriber::new();
    let store = Arc::new(MemoryStore::new());
    let mut bootstrap = MockBootstrap::new();
    bootstrap.expect_bootstrap().times(2).returning(|_| true);
    let (listener, readiness) = listener(&bus, store.clone(), bootstrap, 10);

    let running = listener.clone();
    let handle = tokio::spawn(async move { running.run().await });

    tokio::time::timeout(
        Duration::from_secs(1),
        readiness.listening_for_dynamic_instances.wait(),
    )
    .await
    .unwrap();

    bus.publish(TOPIC, startup("node-1", "5000", "bwapi")).await;
    bus.publish(TOPIC, "garbage").await;
    bus.publish(TOPIC, startup("node-2", "5000", "bwapi")).await;

    for _ in 0..100 {
        if store.get_instances().await.unwrap().len() == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(store.get_instances().await.unwrap().len(), 2);

    readiness.request_stop();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_run_resubscribes_after_disconnect() {
    let bus = ChannelSubscriber::new();
    let mut bootstrap = MockBootstrap::new();
    bootstrap.expect_bootstrap().returning(|_| true);
    let (listener, readiness) = listener(&bus, Arc::new(MemoryStore::new()), bootstrap, 10);

    let running = listener.clone();
    let handle = tokio::spawn(async move { running.run().await });

    for _ in 0..100 {
        if bus.subscriber_count() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    bus.disconnect();

    for _ in 0..100 {
        if bus.attempts() >= 2 && bus.subscriber_count() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(bus.attempts() >= 2);
    assert_eq!(bus.subscriber_count(), 1);

    readiness.request_stop();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_run_gives_up_after_max_retries() {
    let bus = ChannelSubscriber::new();
    bus.fail_next(100);
    let mut bootstrap = MockBootstrap::new();
    bootstrap.expect_bootstrap().times(0);
    let (listener, readiness) = listener(&bus, Arc::new(MemoryStore::new()), bootstrap, 10);
    readiness.listening_for_dynamic_instances.set();

    tokio::time::timeout(Duration::from_secs(2), listener.run())
        .await
        .unwrap();

    // Initial attempt plus ten retries.
    assert_eq!(bus.attempts(), 11);
    assert!(!readiness.listening_for_dynamic_instances.is_set());
}

#[tokio::test]
async fn test_run_recovers_within_retry_budget() {
    let bus = ChannelSubscriber::new();
    bus.fail_next(3);
    let bootstrap = MockBootstrap::new();
    let (listener, readiness) = listener(&bus, Arc::new(MemoryStore::new()), bootstrap, 10);

    let running = listener.clone();
    let handle = tokio::spawn(async move { running.run().await });

    tokio::time::timeout(
        Duration::from_secs(1),
        readiness.listening_for_dynamic_instances.wait(),
    )
    .await
    .unwrap();
    assert_eq!(bus.attempts(), 4);

    readiness.request_stop();
    handle.await.unwrap();
}
