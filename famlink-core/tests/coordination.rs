//! End-to-end scenarios across the assembled core.

use async_trait::async_trait;
use famlink_core::{
    ConfigError, Coordinator, CoreConfig, NoopPush, PairingError, PushError, PushRequest,
    PushTransport,
};
use famlink_types::{
    now_millis, DomainEvent, FeedEvent, MessageKind, NotificationKind, UserId,
};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

fn start_core() -> Coordinator {
    init_tracing();
    Coordinator::start(CoreConfig::default(), Arc::new(NoopPush))
}

/// Records push dispatches for assertions.
#[derive(Default)]
struct RecordingPush {
    sent: Mutex<Vec<PushRequest>>,
}

#[async_trait]
impl PushTransport for RecordingPush {
    async fn dispatch(&self, request: PushRequest) -> Result<(), PushError> {
        self.sent.lock().unwrap().push(request);
        Ok(())
    }
}

#[tokio::test]
async fn pairing_scenario_single_use_code() {
    let core = start_core();
    let child = UserId::new("child-1");
    let parent = UserId::new("parent-1");

    // Issue for the child device, redeem well within the TTL
    let code = core.registry.issue_code(&child).await.unwrap();
    let relationship = core
        .registry
        .redeem_code(&code.code, &parent, "Mia's phone")
        .await
        .unwrap();

    assert_eq!(relationship.parent_id, parent);
    assert_eq!(relationship.child_id, child);
    assert!(relationship.is_active);

    // Redeeming again fails: the code was consumed by the first call
    let again = core
        .registry
        .redeem_code(&code.code, &parent, "Mia's phone")
        .await;
    assert!(matches!(again, Err(PairingError::AlreadyConsumed)));
}

#[tokio::test]
async fn one_outstanding_code_per_issuer() {
    let core = start_core();
    let child = UserId::new("child-1");

    let first = core.registry.issue_code(&child).await.unwrap();
    let second = core.registry.issue_code(&child).await.unwrap();
    assert_ne!(first.code, second.code);

    // The first issuance is no longer redeemable
    let result = core
        .registry
        .redeem_code(&first.code, &UserId::new("parent-1"), "phone")
        .await;
    assert!(matches!(result, Err(PairingError::UnknownCode)));
}

#[tokio::test]
async fn reminder_message_scenario() {
    let core = start_core();
    let child = UserId::new("child-1");
    let parent = UserId::new("parent-1");

    let code = core.registry.issue_code(&child).await.unwrap();
    let relationship = core
        .registry
        .redeem_code(&code.code, &parent, "phone")
        .await
        .unwrap();
    let conversation = relationship.conversation_id();

    // child-1 is already subscribed when the reminder arrives
    let mut child_feed = core.engine.connect(&conversation).await.unwrap();

    let sent = core
        .engine
        .send(&conversation, &parent, "Take a break", MessageKind::Reminder)
        .await
        .unwrap();

    // Exactly one new message, from the parent, not yet delivered
    match child_feed.next_event().await.unwrap() {
        FeedEvent::Message(m) => {
            assert_eq!(m.sender_id, parent);
            assert_eq!(m.text, "Take a break");
            assert!(m.delivered_at.is_none());
        }
        other => panic!("expected the reminder, got {:?}", other),
    }

    // The client acknowledges receipt; deliveredAt becomes non-null
    core.engine.mark_delivered(&sent.id).await.unwrap();
    match child_feed.next_event().await.unwrap() {
        FeedEvent::MessageUpdated(m) => {
            assert_eq!(m.id, sent.id);
            assert!(m.delivered_at.is_some());
        }
        other => panic!("expected the delivery update, got {:?}", other),
    }
}

#[tokio::test]
async fn subscribers_share_one_total_order() {
    let core = start_core();
    let child = UserId::new("child-1");
    let parent = UserId::new("parent-1");

    let code = core.registry.issue_code(&child).await.unwrap();
    let conversation = core
        .registry
        .redeem_code(&code.code, &parent, "phone")
        .await
        .unwrap()
        .conversation_id();

    let mut early = core.engine.connect(&conversation).await.unwrap();

    // Interleave senders
    for (sender, text) in [
        (&parent, "be home by six"),
        (&child, "ok"),
        (&parent, "love you"),
        (&child, "bye"),
    ] {
        core.engine
            .send(&conversation, sender, text, MessageKind::Text)
            .await
            .unwrap();
    }

    let mut early_seen = Vec::new();
    for _ in 0..4 {
        if let Some(FeedEvent::Message(m)) = early.next_event().await {
            early_seen.push((m.seq, m.text));
        }
    }

    // A late subscriber's backlog matches the live order exactly
    let late = core.engine.connect(&conversation).await.unwrap();
    let late_seen: Vec<_> = late
        .snapshot()
        .iter()
        .map(|m| (m.seq, m.text.clone()))
        .collect();

    assert_eq!(early_seen, late_seen);

    // And timestamps never step backwards
    let stamps: Vec<_> = late.snapshot().iter().map(|m| m.sent_at).collect();
    assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
}

#[tokio::test]
async fn mark_read_always_implies_delivered() {
    let core = start_core();
    let child = UserId::new("child-1");
    let parent = UserId::new("parent-1");

    let code = core.registry.issue_code(&child).await.unwrap();
    let conversation = core
        .registry
        .redeem_code(&code.code, &parent, "phone")
        .await
        .unwrap()
        .conversation_id();

    let sent = core
        .engine
        .send(&conversation, &parent, "read me", MessageKind::Text)
        .await
        .unwrap();
    assert!(sent.delivered_at.is_none());

    // markDelivered was never called explicitly
    let read = core.engine.mark_read(&sent.id).await.unwrap();
    assert!(read.delivered_at.is_some());
    assert!(read.read_at.is_some());
    assert!(read.delivered_at.unwrap() <= read.read_at.unwrap());
}

#[tokio::test]
async fn stale_typing_lease_expires_for_all_subscribers() {
    init_tracing();
    let mut config = CoreConfig::default();
    config.typing.debounce_ms = 40;
    config.typing.sweep_interval_ms = 10;
    let core = Coordinator::start(config, Arc::new(NoopPush));

    let child = UserId::new("child-1");
    let parent = UserId::new("parent-1");
    let code = core.registry.issue_code(&child).await.unwrap();
    let conversation = core
        .registry
        .redeem_code(&code.code, &parent, "phone")
        .await
        .unwrap()
        .conversation_id();

    let mut parent_feed = core.engine.connect(&conversation).await.unwrap();

    core.engine
        .set_typing(&conversation, &child, true)
        .await
        .unwrap();

    match parent_feed.next_event().await.unwrap() {
        FeedEvent::Typing(t) => assert!(t.is_typing),
        other => panic!("expected typing start, got {:?}", other),
    }

    // No renewal and no explicit stop: the sweeper publishes the
    // implicit isTyping=false after the debounce window
    match parent_feed.next_event().await.unwrap() {
        FeedEvent::Typing(t) => {
            assert!(!t.is_typing);
            assert_eq!(t.user_id, child);
        }
        other => panic!("expected implicit typing stop, got {:?}", other),
    }
}

#[tokio::test]
async fn presence_flips_offline_and_counts_missed_polls() {
    let core = start_core();
    let child = UserId::new("child-1");
    let parent = UserId::new("parent-1");

    let code = core.registry.issue_code(&child).await.unwrap();
    let relationship = core
        .registry
        .redeem_code(&code.code, &parent, "phone")
        .await
        .unwrap();

    core.presence.record_heartbeat(&relationship.id);

    let now = now_millis();
    let fresh = core.presence.poll_once(now).await.unwrap();
    assert!(fresh[0].is_online);
    assert_eq!(fresh[0].missed_heartbeats, 0);

    // Poll after the threshold has elapsed: offline on the next
    // scheduled evaluation, missed counting up monotonically
    let threshold_ms = CoreConfig::default().presence.offline_threshold_secs * 1_000;
    let later = now + threshold_ms + 1;
    let stale = core.presence.poll_once(later).await.unwrap();
    assert!(!stale[0].is_online);
    assert_eq!(stale[0].missed_heartbeats, 1);

    let stale = core.presence.poll_once(later + 30_000).await.unwrap();
    assert_eq!(stale[0].missed_heartbeats, 2);
}

#[tokio::test]
async fn unpair_with_live_lease_spares_unrelated_subscriptions() {
    let core = start_core();
    let parent = UserId::new("parent-1");

    // Two paired children, one conversation each
    let mut conversations = Vec::new();
    let mut relationships = Vec::new();
    for child in ["child-1", "child-2"] {
        let code = core.registry.issue_code(&UserId::new(child)).await.unwrap();
        let rel = core
            .registry
            .redeem_code(&code.code, &parent, child)
            .await
            .unwrap();
        conversations.push(rel.conversation_id());
        relationships.push(rel);
    }

    let mut other_feed = core.engine.connect(&conversations[1]).await.unwrap();

    // Live typing lease on the first conversation, then unlink it
    core.engine
        .set_typing(&conversations[0], &UserId::new("child-1"), true)
        .await
        .unwrap();
    core.registry.unpair(&relationships[0].id).await.unwrap();

    // The lease's conversation is no longer resolvable
    let result = core
        .engine
        .set_typing(&conversations[0], &UserId::new("child-1"), true)
        .await;
    assert!(result.is_err());

    // The unrelated subscription keeps delivering without a hiccup
    core.engine
        .send(&conversations[1], &parent, "all good", MessageKind::Text)
        .await
        .unwrap();
    assert!(matches!(
        other_feed.next_event().await.unwrap(),
        FeedEvent::Message(m) if m.text == "all good"
    ));
}

#[tokio::test]
async fn message_arrival_reaches_notification_feed_and_push() {
    init_tracing();
    let push = Arc::new(RecordingPush::default());
    let core = Coordinator::start(CoreConfig::default(), push.clone());

    let child = UserId::new("child-1");
    let parent = UserId::new("parent-1");
    core.router.register_token(&child, "apns-token-1");

    let code = core.registry.issue_code(&child).await.unwrap();
    let conversation = core
        .registry
        .redeem_code(&code.code, &parent, "phone")
        .await
        .unwrap()
        .conversation_id();

    // The redemption itself produced a pairing notification for the child
    let mut notifications = core.router.subscribe(&child);

    core.engine
        .send(&conversation, &parent, "Dinner time", MessageKind::Text)
        .await
        .unwrap();

    // Router consumption is eventual, and the earlier redemption's
    // pairing notification may still be in flight; wait for the message
    let received = loop {
        let next = tokio::time::timeout(Duration::from_secs(2), notifications.recv())
            .await
            .expect("notification should arrive")
            .unwrap();
        if next.kind == NotificationKind::Message {
            break next;
        }
    };
    assert_eq!(received.body, "Dinner time");

    // Unread count derives from records: pairing + message
    assert_eq!(core.router.unread_count(&child).await.unwrap(), 2);

    let pushed = push.sent.lock().unwrap();
    assert!(pushed.iter().any(|p| p.body == "Dinner time"));
    assert!(pushed.iter().all(|p| p.device_token == "apns-token-1"));
}

#[tokio::test]
async fn unlink_event_notifies_the_child() {
    let core = start_core();
    let child = UserId::new("child-1");
    let parent = UserId::new("parent-1");

    let code = core.registry.issue_code(&child).await.unwrap();
    let relationship = core
        .registry
        .redeem_code(&code.code, &parent, "phone")
        .await
        .unwrap();

    let mut notifications = core.router.subscribe(&child);
    core.registry.unpair(&relationship.id).await.unwrap();

    // The redemption's pairing notification may arrive first
    let received = loop {
        let next = tokio::time::timeout(Duration::from_secs(2), notifications.recv())
            .await
            .expect("unlink notification should arrive")
            .unwrap();
        if next.kind == NotificationKind::Unlink {
            break next;
        }
    };
    assert_eq!(received.recipient_id, child);
}

#[tokio::test]
async fn warning_trigger_flows_through_the_bus() {
    let core = start_core();
    let child = UserId::new("child-1");

    let mut events = core.bus.subscribe();
    core.bus
        .raise_warning(child.clone(), "Limit reached", "Screen time is up for today");

    assert!(matches!(
        events.recv().await.unwrap(),
        DomainEvent::LimitWarning { recipient, .. } if recipient == child
    ));

    // And lands in the notification feed
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        if core.router.unread_count(&child).await.unwrap() >= 1 {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "warning notification never materialized"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let list = core.router.notifications(&child).await.unwrap();
    assert!(list.iter().any(|n| n.kind == NotificationKind::Warning));
}

#[test]
fn config_file_missing_is_a_readable_error() {
    let err = CoreConfig::from_file(std::path::Path::new("/nonexistent/famlink.toml"))
        .expect_err("missing file must error");
    assert!(matches!(err, ConfigError::ReadError { .. }));
}
