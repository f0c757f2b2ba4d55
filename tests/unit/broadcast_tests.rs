// =============================
// tests/unit/broadcast_tests.rs
// =============================
//! Unit tests for the topic broadcaster
use foundation_backend_lib::broadcast::Broadcaster;
use std::sync::Arc;
use std::time::Duration;

#[test]
fn test_send_signals_every_listener() {
    let broadcaster = Broadcaster::new();
    let mut listeners: Vec<_> = (0..3).map(|_| broadcaster.listen("links")).collect();

    assert_eq!(broadcaster.send("links"), Ok(3));
    for listener in &mut listeners {
        assert!(listener.try_recv());
    }

    // Close one; the other two are still signalled
    listeners.remove(0).close();
    assert_eq!(broadcaster.send("links"), Ok(2));
    for listener in &mut listeners {
        assert!(listener.try_recv());
    }
}

#[test]
fn test_send_to_empty_topic_succeeds() {
    let broadcaster = Broadcaster::new();
    assert_eq!(broadcaster.send("nobody-listens"), Ok(0));

    let listener = broadcaster.listen("links");
    listener.close();
    assert_eq!(broadcaster.send("links"), Ok(0));
}

#[test]
fn test_topics_are_isolated() {
    let broadcaster = Broadcaster::new();
    let mut links = broadcaster.listen("links");
    let mut users = broadcaster.listen("users");

    broadcaster.send("links").unwrap();
    assert!(links.try_recv());
    assert!(!users.try_recv());
}

#[test]
fn test_signals_coalesce() {
    let broadcaster = Broadcaster::new();
    let mut listener = broadcaster.listen("links");

    assert_eq!(broadcaster.send("links"), Ok(1));
    // Second send finds the slot full: reported, not queued, not blocking
    let err = broadcaster.send("links").unwrap_err();
    assert_eq!((err.delivered, err.missed), (0, 1));

    assert!(listener.try_recv());
    assert!(!listener.try_recv());
}

#[test]
fn test_listener_ids_unique_within_topic() {
    let broadcaster = Broadcaster::new();
    let mut seen = std::collections::HashSet::new();
    for _ in 0..10 {
        let listener = broadcaster.listen("links");
        assert!(seen.insert(listener.id()));
        // Ids are not reused after close
    }
    assert_eq!(seen.len(), 10);
}

#[tokio::test]
async fn test_waiting_listener_is_woken() {
    let broadcaster = Broadcaster::new();
    let mut listener = broadcaster.listen("links");

    let waiter = tokio::spawn(async move { listener.recv().await });
    tokio::task::yield_now().await;
    broadcaster.send("links").unwrap();

    let woke = tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(woke, Some(()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_send_and_close() {
    let broadcaster = Arc::new(Broadcaster::new());

    let senders: Vec<_> = (0..4)
        .map(|_| {
            let broadcaster = broadcaster.clone();
            tokio::spawn(async move {
                for _ in 0..500 {
                    let _ = broadcaster.send("links");
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();

    let churn = {
        let broadcaster = broadcaster.clone();
        tokio::spawn(async move {
            for _ in 0..500 {
                let listener = broadcaster.listen("links");
                tokio::task::yield_now().await;
                listener.close();
            }
        })
    };

    for task in senders {
        task.await.unwrap();
    }
    churn.await.unwrap();
    assert_eq!(broadcaster.listener_count("links"), 0);
}
