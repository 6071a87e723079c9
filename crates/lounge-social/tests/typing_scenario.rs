//! Two peers in one conversation over the in-process transport.

use std::sync::Arc;
use std::time::Duration;

use lounge_common::ConversationId;
use lounge_social::{ConversationPresence, Identity, MemoryHub, PresenceTiming};

async fn advance_ms(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

async fn join(
    hub: &MemoryHub,
    identity: &Identity,
    timing: PresenceTiming,
) -> ConversationPresence {
    ConversationPresence::join(
        Arc::new(hub.connect()),
        identity,
        ConversationId::new("conv-1"),
        timing,
    )
    .await
    .unwrap()
}

#[tokio::test(start_paused = true)]
async fn typing_indicator_expires_without_refresh() {
    let hub = MemoryHub::new();
    let alice_id = Identity::from_supabase_auth("a".into(), "Alice".into(), "jwt-a".into());
    let bob_id = Identity::from_supabase_auth("b".into(), "Bob".into(), "jwt-b".into());

    // Alice's own idle stop is pushed out so only Bob's TTL can clear her.
    let alice = join(
        &hub,
        &alice_id,
        PresenceTiming {
            local_idle: Duration::from_secs(60),
            ..PresenceTiming::default()
        },
    )
    .await;
    let bob = join(&hub, &bob_id, PresenceTiming::default()).await;
    let mut bob_view = bob.watch();

    alice.send_typing(true).await;
    advance_ms(50).await;
    let snapshot = bob_view.borrow_and_update().clone();
    assert!(snapshot.is_anyone_typing);
    assert_eq!(snapshot.typing_user_names, vec!["Alice"]);

    advance_ms(2900).await;
    assert!(bob.typing_snapshot().is_anyone_typing);

    advance_ms(100).await;
    assert!(!bob.typing_snapshot().is_anyone_typing);
    assert!(bob_view.has_changed().unwrap());

    alice.teardown().await;
    bob.teardown().await;
}

#[tokio::test(start_paused = true)]
async fn leaving_while_typing_clears_peer_immediately() {
    let hub = MemoryHub::new();
    let alice_id = Identity::from_supabase_auth("a".into(), "Alice".into(), "jwt-a".into());
    let bob_id = Identity::from_supabase_auth("b".into(), "Bob".into(), "jwt-b".into());
    let alice = join(&hub, &alice_id, PresenceTiming::default()).await;
    let bob = join(&hub, &bob_id, PresenceTiming::default()).await;

    alice.send_typing(true).await;
    advance_ms(10).await;
    assert!(bob.typing_snapshot().is_anyone_typing);

    alice.teardown().await;
    advance_ms(10).await;
    assert!(!bob.typing_snapshot().is_anyone_typing);
    assert_eq!(hub.subscriber_count("typing:conv-1").await, 1);
}

#[tokio::test(start_paused = true)]
async fn continuous_typing_stays_visible() {
    let hub = MemoryHub::new();
    let alice_id = Identity::from_supabase_auth("a".into(), "Alice".into(), "jwt-a".into());
    let bob_id = Identity::from_supabase_auth("b".into(), "Bob".into(), "jwt-b".into());
    let alice = join(&hub, &alice_id, PresenceTiming::default()).await;
    let bob = join(&hub, &bob_id, PresenceTiming::default()).await;

    // A keystroke every 400ms for 8 seconds.
    for _ in 0..20 {
        alice.send_typing(true).await;
        advance_ms(400).await;
        assert!(bob.typing_snapshot().is_anyone_typing);
    }

    alice.send_typing(false).await;
    advance_ms(10).await;
    assert!(!bob.typing_snapshot().is_anyone_typing);
}
