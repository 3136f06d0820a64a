use chrono::{Duration, Utc};

use cg_domain::identity::{IdentityKind, SubjectKey};
use cg_domain::records::UsagePeriodRecord;
use cg_domain::Error;
use cg_storage::{ConversationStore, GuestStore, SqliteStore, TurnWrite, UsageStore, UserStore};

async fn store() -> SqliteStore {
    SqliteStore::connect("sqlite::memory:", 1)
        .await
        .expect("in-memory sqlite should open")
}

fn device(raw: &str) -> SubjectKey {
    SubjectKey::new(IdentityKind::Device, raw)
}

#[tokio::test]
async fn usage_record_is_unique_per_subject_and_day() {
    let store = store().await;
    let t0 = Utc::now();
    let date = t0.date_naive();

    let first = store
        .open_usage(UsagePeriodRecord::open(device("abc"), date, t0, true))
        .await
        .unwrap();
    let second = store
        .open_usage(UsagePeriodRecord::open(
            device("abc"),
            date,
            t0 + Duration::minutes(5),
            true,
        ))
        .await
        .unwrap();

    assert_eq!(first.first_used_at, second.first_used_at);
    assert_eq!(second.usage_minutes, 0);
    assert!(second.is_guest);

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM usage_period_records")
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn usage_commit_is_compare_and_swap() {
    let store = store().await;
    let t0 = Utc::now();
    let opened = store
        .open_usage(UsagePeriodRecord::open(device("abc"), t0.date_naive(), t0, true))
        .await
        .unwrap();

    let mut next = opened.clone();
    next.last_used_at = t0 + Duration::minutes(4);
    next.usage_minutes = 4;

    assert!(store.commit_usage(&next, opened.last_used_at).await.unwrap());
    assert!(!store.commit_usage(&next, opened.last_used_at).await.unwrap());

    let stored = store
        .get_usage(&device("abc"), t0.date_naive())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.usage_minutes, 4);
    assert_eq!(stored.last_used_at, next.last_used_at);
}

#[tokio::test]
async fn turns_round_trip_in_chronological_order() {
    let store = store().await;
    let owner = device("owner");
    let t0 = Utc::now();

    let (conv, _) = store
        .persist_turn(TurnWrite {
            subject: &owner,
            conversation_id: None,
            name: "first question",
            input_text: "first question",
            output_text: Some("first answer"),
            now: t0,
        })
        .await
        .unwrap();

    let unicode = "naïve café ☕ \"quoted\"\nnewline";
    for i in 1..=14 {
        store
            .persist_turn(TurnWrite {
                subject: &owner,
                conversation_id: Some(conv.id),
                name: "",
                input_text: &format!("q{i} {unicode}"),
                output_text: Some(format!("a{i}").as_str()),
                now: t0 + Duration::seconds(i),
            })
            .await
            .unwrap();
    }

    let all = store.turns(conv.id).await.unwrap();
    assert_eq!(all.len(), 15);
    assert_eq!(all[0].input_text, "first question");
    assert_eq!(all[14].input_text, format!("q14 {unicode}"));

    let recent = store.recent_turns(conv.id, 10).await.unwrap();
    assert_eq!(recent.len(), 10);
    assert_eq!(recent[0].input_text, format!("q5 {unicode}"));
    assert_eq!(recent[9].output_text.as_deref(), Some("a14"));

    let reloaded = store.get_conversation(&owner, conv.id).await.unwrap().unwrap();
    assert_eq!(reloaded.name.as_deref(), Some("first question"));
    assert!(reloaded.updated_at > reloaded.created_at);
}

#[tokio::test]
async fn turns_with_equal_timestamps_order_by_id() {
    let store = store().await;
    let owner = device("owner");
    let now = Utc::now();
    let (conv, first) = store
        .persist_turn(TurnWrite {
            subject: &owner,
            conversation_id: None,
            name: "a",
            input_text: "a",
            output_text: None,
            now,
        })
        .await
        .unwrap();
    let (_, second) = store
        .persist_turn(TurnWrite {
            subject: &owner,
            conversation_id: Some(conv.id),
            name: "",
            input_text: "b",
            output_text: None,
            now,
        })
        .await
        .unwrap();

    let turns = store.recent_turns(conv.id, 10).await.unwrap();
    assert_eq!(
        turns.iter().map(|t| t.id).collect::<Vec<_>>(),
        vec![first.id, second.id]
    );
    assert_eq!(turns[0].output_text, None);
}

#[tokio::test]
async fn foreign_conversation_is_not_found_and_untouched() {
    let store = store().await;
    let owner = device("owner");
    let intruder = SubjectKey::new(IdentityKind::User, "9");
    let now = Utc::now();

    let (conv, _) = store
        .persist_turn(TurnWrite {
            subject: &owner,
            conversation_id: None,
            name: "mine",
            input_text: "mine",
            output_text: Some("ok"),
            now,
        })
        .await
        .unwrap();

    assert!(store.get_conversation(&intruder, conv.id).await.unwrap().is_none());

    let err = store
        .persist_turn(TurnWrite {
            subject: &intruder,
            conversation_id: Some(conv.id),
            name: "theirs",
            input_text: "theirs",
            output_text: Some("no"),
            now,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound));
    assert_eq!(store.turns(conv.id).await.unwrap().len(), 1);
    assert!(store.list_conversations(&intruder).await.unwrap().is_empty());
}

#[tokio::test]
async fn list_is_newest_updated_first() {
    let store = store().await;
    let owner = device("owner");
    let t0 = Utc::now();

    let (older, _) = store
        .persist_turn(TurnWrite {
            subject: &owner,
            conversation_id: None,
            name: "older",
            input_text: "older",
            output_text: None,
            now: t0,
        })
        .await
        .unwrap();
    let (newer, _) = store
        .persist_turn(TurnWrite {
            subject: &owner,
            conversation_id: None,
            name: "newer",
            input_text: "newer",
            output_text: None,
            now: t0 + Duration::minutes(1),
        })
        .await
        .unwrap();

    let ids: Vec<i64> = store
        .list_conversations(&owner)
        .await
        .unwrap()
        .iter()
        .map(|c| c.id)
        .collect();
    assert_eq!(ids, vec![newer.id, older.id]);

    // Appending to the older conversation moves it to the front.
    store
        .persist_turn(TurnWrite {
            subject: &owner,
            conversation_id: Some(older.id),
            name: "",
            input_text: "again",
            output_text: None,
            now: t0 + Duration::minutes(2),
        })
        .await
        .unwrap();
    let first = store.list_conversations(&owner).await.unwrap()[0].id;
    assert_eq!(first, older.id);
}

#[tokio::test]
async fn guest_lookup_or_create_is_idempotent() {
    let store = store().await;
    let now = Utc::now();

    let (created, is_new) = store
        .find_or_create_guest(IdentityKind::Device, "abc", now)
        .await
        .unwrap();
    let (found, is_new_again) = store
        .find_or_create_guest(IdentityKind::Device, "abc", now + Duration::hours(1))
        .await
        .unwrap();
    let (token, _) = store
        .find_or_create_guest(IdentityKind::GuestToken, "abc", now)
        .await
        .unwrap();

    assert!(is_new);
    assert!(!is_new_again);
    assert_eq!(created, found);
    assert_eq!(token.kind, IdentityKind::GuestToken);
}

#[tokio::test]
async fn users_are_found_by_token_hash() {
    let store = store().await;
    let now = Utc::now();
    let user = store.create_user("ada", "deadbeef", now).await.unwrap();
    assert!(!user.subscription_active);

    let found = store.find_user_by_token_hash("deadbeef").await.unwrap().unwrap();
    assert_eq!(found.id, user.id);
    assert!(store.find_user_by_token_hash("other").await.unwrap().is_none());

    let updated = store.set_subscription(user.id, true).await.unwrap();
    assert!(updated.subscription_active);

    assert!(matches!(
        store.set_subscription(999, true).await.unwrap_err(),
        Error::NotFound
    ));
    assert!(store.create_user("dup", "deadbeef", now).await.is_err());
}
