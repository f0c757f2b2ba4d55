// ===========================================
// tests/integration/session_rotation_tests.rs
// ===========================================
//! Session resolution and rotation against seeded, back-dated rows
use chrono::{DateTime, Duration, Utc};
use foundation_backend_lib::error::AppError;
use foundation_backend_lib::storage::{MemoryStorage, SessionStore, StorageError};
use foundation_common::{Session, UserId};
use foundation_tests::test_utils::{
    seed_session, setup_flat_file_env, setup_test_env, setup_test_env_with, test_settings,
};

/// Just past the default 30 minute rotation interval
fn stale_age() -> Duration {
    Duration::minutes(31)
}

/// A user session old enough to rotate
async fn seed_stale<S: SessionStore + ?Sized>(
    store: &S,
    user_id: UserId,
    now: DateTime<Utc>,
) -> Session {
    seed_session(store, Some(user_id), now - stale_age(), now + Duration::days(89)).await
}

#[tokio::test]
async fn test_old_user_session_rotates() {
    let env = setup_test_env().await;
    let now = Utc::now();
    let old = seed_stale(env.storage.as_ref(), env.user.id, now).await;

    let rotated = env.state.sessions.rotate_if_needed_at(&old.id, now).await.unwrap();

    assert_ne!(rotated.session.id, old.id);
    assert_ne!(rotated.session.csrf_token, old.csrf_token);
    assert_eq!(rotated.session.user_id, old.user_id);
    assert_eq!(rotated.session.created_at, now);
    assert!(rotated.session.expires_at > old.expires_at);
    assert!(rotated.changed);
    assert_eq!(rotated.previous_csrf_token(), Some(old.csrf_token.as_str()));

    // Exactly one live row for the user, and it is the new one
    assert_eq!(env.storage.sessions_for_user(env.user.id), vec![rotated.session]);
}

#[tokio::test]
async fn test_fresh_user_session_is_kept() {
    let env = setup_test_env().await;
    let now = Utc::now();
    let session = seed_session(
        env.storage.as_ref(),
        Some(env.user.id),
        now - Duration::minutes(30),
        now + Duration::days(90),
    )
    .await;

    // Age equal to the interval does not rotate yet
    let resolved = env.state.sessions.rotate_if_needed_at(&session.id, now).await.unwrap();
    assert_eq!(resolved.session, session);
    assert!(!resolved.changed);
    assert!(resolved.previous_csrf_token().is_none());
}

#[tokio::test]
async fn test_anonymous_session_never_rotates() {
    let env = setup_test_env().await;
    let now = Utc::now();
    let created = now - Duration::days(30);
    let session = seed_session(env.storage.as_ref(), None, created, now + Duration::days(60)).await;

    let resolved = env.state.sessions.rotate_if_needed_at(&session.id, now).await.unwrap();
    assert_eq!(resolved.session.id, session.id);

    let resolved = env.state.sessions.get_or_create_at(Some(&session.id), now).await.unwrap();
    assert_eq!(resolved.session.id, session.id);
    assert!(!resolved.changed);
}

#[tokio::test]
async fn test_expired_session_cannot_rotate() {
    let env = setup_test_env().await;
    let now = Utc::now();
    let session = seed_session(
        env.storage.as_ref(),
        Some(env.user.id),
        now - Duration::days(91),
        now - Duration::seconds(1),
    )
    .await;

    let err = env.state.sessions.rotate_if_needed_at(&session.id, now).await.unwrap_err();
    assert!(matches!(err, AppError::ExpiredSession));
}

#[tokio::test]
async fn test_expired_cookie_gets_new_anonymous_session() {
    let env = setup_test_env().await;
    let now = Utc::now();
    let expired = seed_session(
        env.storage.as_ref(),
        Some(env.user.id),
        now - Duration::days(91),
        now - Duration::seconds(1),
    )
    .await;

    let resolved = env.state.sessions.get_or_create_at(Some(&expired.id), now).await.unwrap();
    assert!(resolved.session.is_anonymous());
    assert!(resolved.changed);
    // The expired row is left for the sweep
    assert!(env.storage.get(&expired.id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_get_or_create_rotates_user_sessions() {
    let env = setup_test_env().await;
    let now = Utc::now();
    let old = seed_stale(env.storage.as_ref(), env.user.id, now).await;

    let resolved = env.state.sessions.get_or_create_at(Some(&old.id), now).await.unwrap();
    assert_ne!(resolved.session.id, old.id);
    assert_eq!(resolved.session.user_id, Some(env.user.id));
    assert_eq!(resolved.previous_csrf_token(), Some(old.csrf_token.as_str()));
}

#[tokio::test]
async fn test_failed_delete_rolls_back_new_row() {
    let env = setup_test_env_with(MemoryStorage::non_atomic(), test_settings()).await;
    let now = Utc::now();
    let old = seed_stale(env.storage.as_ref(), env.user.id, now).await;
    env.storage.fail_delete_of(&old.id);

    let err = env.state.sessions.rotate_if_needed_at(&old.id, now).await.unwrap_err();
    assert!(matches!(err, AppError::Storage(StorageError::Unavailable(_))));
    assert_eq!(env.storage.sessions_for_user(env.user.id), vec![old]);
}

#[tokio::test]
async fn test_failed_compensation_reports_both_errors() {
    let env = setup_test_env_with(MemoryStorage::non_atomic(), test_settings()).await;
    let now = Utc::now();
    let old = seed_stale(env.storage.as_ref(), env.user.id, now).await;
    env.storage.fail_all_deletes(true);

    let err = env.state.sessions.rotate_if_needed_at(&old.id, now).await.unwrap_err();
    assert!(matches!(err, AppError::Storage(StorageError::Combined { .. })));
}

#[tokio::test]
async fn test_atomic_store_rotation_failure_leaves_old_row() {
    let env = setup_test_env().await;
    let now = Utc::now();
    let old = seed_stale(env.storage.as_ref(), env.user.id, now).await;
    env.storage.fail_delete_of(&old.id);

    assert!(env.state.sessions.rotate_if_needed_at(&old.id, now).await.is_err());
    assert_eq!(env.storage.session_count(), 1);
}

#[tokio::test]
async fn test_flat_file_rotation() {
    let (state, storage, user, _temp_dir) = setup_flat_file_env().await;
    let now = Utc::now();
    let old = seed_stale(storage.as_ref(), user.id, now).await;

    let rotated = state.sessions.rotate_if_needed_at(&old.id, now).await.unwrap();
    assert_ne!(rotated.session.id, old.id);
    assert!(storage.get(&old.id).await.unwrap().is_none());
    assert_eq!(storage.get(&rotated.session.id).await.unwrap(), Some(rotated.session));
}
