use calorie_goal::adjustment::SkipReason;
use calorie_goal::config::{StoreConfig, DEFAULT_STORAGE_KEY};
use calorie_goal::models::GoalNotification;
use calorie_goal::storage::{FileStorage, MemoryStorage, StateStorage};
use calorie_goal::store::{ExcessOutcome, GoalAdjustmentStore, LoadOutcome};
use calorie_goal::Error;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};

fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, day, hour, 0, 0).unwrap()
}

async fn stored(storage: &MemoryStorage) -> Value {
    let raw = storage
        .read(DEFAULT_STORAGE_KEY)
        .await
        .unwrap()
        .expect("state should be persisted");
    serde_json::from_str(&raw).unwrap()
}

#[tokio::test]
async fn first_load_initializes_and_persists_default_state() {
    let storage = MemoryStorage::new();
    let (store, outcome) = GoalAdjustmentStore::load(storage.clone()).await.unwrap();

    assert_eq!(outcome, LoadOutcome::Initialized);
    assert_eq!(store.base_goal(), 2000);
    assert_eq!(store.current_goal(), 2000);
    assert_eq!(store.minimum_goal(), 1700);
    assert!(!store.has_active_adjustments());

    let doc = stored(&storage).await;
    assert_eq!(doc["baseGoal"], 2000);
    assert_eq!(doc["currentGoal"], 2000);
    assert_eq!(doc["activeAdjustments"], Value::Array(vec![]));
    assert_eq!(doc["lastExcessDate"], Value::Null);
}

#[tokio::test]
async fn corrupt_state_is_replaced_without_failing() {
    let storage = MemoryStorage::new();
    storage
        .write(DEFAULT_STORAGE_KEY, "{ not json")
        .await
        .unwrap();

    let (store, outcome) = GoalAdjustmentStore::load(storage.clone()).await.unwrap();
    assert!(matches!(outcome, LoadOutcome::Reinitialized { .. }));
    assert_eq!(store.current_goal(), 2000);
    assert_eq!(stored(&storage).await["baseGoal"], 2000);
}

#[tokio::test]
async fn non_positive_base_goal_counts_as_corruption() {
    let storage = MemoryStorage::new();
    storage
        .write(
            DEFAULT_STORAGE_KEY,
            r#"{"baseGoal":0,"currentGoal":0,"activeAdjustments":[],"lastExcessDate":null}"#,
        )
        .await
        .unwrap();

    let (_, outcome) = GoalAdjustmentStore::load(storage).await.unwrap();
    match outcome {
        LoadOutcome::Reinitialized { reason } => assert!(reason.contains("base goal")),
        other => panic!("unexpected outcome {:?}", other),
    }
}

fn document_with_reduction(daily_reduction: i64, days_remaining: u32) -> String {
    json!({
        "baseGoal": 2000,
        "currentGoal": 2000 - daily_reduction,
        "activeAdjustments": [{
            "id": "a1",
            "startDate": "2026-03-01T12:00:00Z",
            "excessAmount": 400,
            "dailyReduction": daily_reduction,
            "daysRemaining": days_remaining,
            "previousGoal": 2000,
            "adjustedGoal": 2000 - daily_reduction,
            "notificationShown": true
        }],
        "lastExcessDate": "2026-03-01T12:00:00Z"
    })
    .to_string()
}

#[tokio::test]
async fn adjustments_breaking_the_reduction_rules_count_as_corruption() {
    for (daily_reduction, days_remaining) in [(-500, 7), (0, 7), (55, 7), (60, 9)] {
        let storage = MemoryStorage::new();
        storage
            .write(
                DEFAULT_STORAGE_KEY,
                &document_with_reduction(daily_reduction, days_remaining),
            )
            .await
            .unwrap();

        let (store, outcome) = GoalAdjustmentStore::load(storage).await.unwrap();
        assert!(
            matches!(outcome, LoadOutcome::Reinitialized { .. }),
            "reduction {} with {} days loaded as {:?}",
            daily_reduction,
            days_remaining,
            outcome
        );
        assert_eq!(store.current_goal(), 2000);
        assert!(!store.has_active_adjustments());
    }

    let storage = MemoryStorage::new();
    storage
        .write(DEFAULT_STORAGE_KEY, &document_with_reduction(60, 7))
        .await
        .unwrap();
    let (_, outcome) = GoalAdjustmentStore::load(storage).await.unwrap();
    assert_eq!(outcome, LoadOutcome::Loaded);
}

#[tokio::test]
async fn oversized_base_goal_is_replaced_on_open() {
    let storage = MemoryStorage::new();
    let huge = i64::MAX / 10;
    let doc = json!({
        "baseGoal": huge,
        "currentGoal": huge,
        "activeAdjustments": [],
        "lastExcessDate": null
    });
    storage
        .write(DEFAULT_STORAGE_KEY, &doc.to_string())
        .await
        .unwrap();

    let (store, outcome) = GoalAdjustmentStore::open(storage.clone(), &at(3, 12))
        .await
        .unwrap();
    assert!(matches!(outcome, LoadOutcome::Reinitialized { .. }));
    assert_eq!(store.base_goal(), 2000);
    assert_eq!(stored(&storage).await["baseGoal"], 2000);
}

#[tokio::test]
async fn accepts_documents_with_millisecond_timestamps() {
    let storage = MemoryStorage::new();
    let doc = r#"{
        "baseGoal": 2000,
        "currentGoal": 1940,
        "activeAdjustments": [{
            "id": "1772366400000",
            "startDate": "2026-03-01T12:00:00.000Z",
            "excessAmount": 400,
            "dailyReduction": 60,
            "daysRemaining": 7,
            "previousGoal": 2000,
            "adjustedGoal": 1940,
            "notificationShown": false
        }],
        "lastExcessDate": "2026-03-01T12:00:00.000Z"
    }"#;
    storage.write(DEFAULT_STORAGE_KEY, doc).await.unwrap();

    let (store, outcome) = GoalAdjustmentStore::load(storage).await.unwrap();
    assert_eq!(outcome, LoadOutcome::Loaded);
    assert_eq!(store.current_goal(), 1940);
    assert_eq!(store.state().active_adjustments[0].start_date, at(1, 12));
}

#[tokio::test]
async fn excess_is_persisted_and_survives_a_reload() {
    let storage = MemoryStorage::new();
    let (mut store, _) = GoalAdjustmentStore::load(storage.clone()).await.unwrap();

    let outcome = store.register_excess(2400, &at(3, 21)).await.unwrap();
    let ExcessOutcome::Created(adjustment) = outcome else {
        panic!("expected an adjustment");
    };
    assert_eq!(adjustment.daily_reduction, 60);
    assert_eq!(store.pending_notification(), None);

    let doc = stored(&storage).await;
    assert_eq!(doc["currentGoal"], 1940);
    let adj = &doc["activeAdjustments"][0];
    assert_eq!(adj["dailyReduction"], 60);
    assert_eq!(adj["daysRemaining"], 7);
    assert_eq!(adj["notificationShown"], false);
    assert!(adj["startDate"].as_str().unwrap().starts_with("2026-03-03T21:00:00"));

    let (reloaded, outcome) = GoalAdjustmentStore::load(storage).await.unwrap();
    assert_eq!(outcome, LoadOutcome::Loaded);
    assert_eq!(reloaded.state(), store.state());
}

#[tokio::test]
async fn same_day_excess_is_a_silent_no_op() {
    let (mut store, _) = GoalAdjustmentStore::load(MemoryStorage::new()).await.unwrap();

    store.register_excess(2400, &at(3, 12)).await.unwrap();
    let second = store.register_excess(3000, &at(3, 22)).await.unwrap();

    assert_eq!(
        second,
        ExcessOutcome::Skipped(SkipReason::AlreadyProcessedToday)
    );
    assert_eq!(store.current_goal(), 1940);
}

#[tokio::test]
async fn reconcile_publishes_the_notification_once() {
    let (mut store, _) = GoalAdjustmentStore::load(MemoryStorage::new()).await.unwrap();
    let mut events = store.subscribe();

    store.register_excess(2400, &at(3, 23)).await.unwrap();
    assert_eq!(store.reconcile(&at(4, 5)).await.unwrap(), None);

    let shown = store.reconcile(&at(4, 7)).await.unwrap();
    let expected = GoalNotification::AdjustmentApplied { current_goal: 1940 };
    assert_eq!(shown, Some(expected));
    assert_eq!(store.pending_notification(), Some(expected));
    assert_eq!(events.recv().await.unwrap(), expected);

    assert_eq!(store.reconcile(&at(4, 7)).await.unwrap(), None);
    assert_eq!(store.dismiss_notification(), Some(expected));
    assert_eq!(store.pending_notification(), None);
}

#[tokio::test]
async fn open_expires_stale_adjustments() {
    let storage = MemoryStorage::new();
    {
        let (mut store, _) = GoalAdjustmentStore::load(storage.clone()).await.unwrap();
        store.register_excess(2400, &at(1, 12)).await.unwrap();
    }

    let (store, outcome) = GoalAdjustmentStore::open(storage.clone(), &at(10, 12))
        .await
        .unwrap();
    assert_eq!(outcome, LoadOutcome::Loaded);
    assert!(!store.has_active_adjustments());
    assert_eq!(store.current_goal(), 2000);
    assert_eq!(
        store.pending_notification(),
        Some(GoalNotification::AdjustmentCompleted { current_goal: 2000 })
    );
    assert_eq!(stored(&storage).await["activeAdjustments"], Value::Array(vec![]));
}

#[tokio::test]
async fn set_base_goal_discards_adjustments() {
    let storage = MemoryStorage::new();
    let (mut store, _) = GoalAdjustmentStore::load(storage.clone()).await.unwrap();
    store.register_excess(2400, &at(3, 12)).await.unwrap();
    assert!(store.has_active_adjustments());

    store.set_base_goal(2500).await.unwrap();
    assert_eq!(store.base_goal(), 2500);
    assert_eq!(store.current_goal(), 2500);
    assert!(!store.has_active_adjustments());
    assert_eq!(store.state().last_excess_date, None);

    let doc = stored(&storage).await;
    assert_eq!(doc["baseGoal"], 2500);
    assert_eq!(doc["lastExcessDate"], Value::Null);

    let err = store.set_base_goal(0).await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    let err = store.set_base_goal(i64::MAX / 10).await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert_eq!(store.base_goal(), 2500);
    assert_eq!(stored(&storage).await["baseGoal"], 2500);
}

#[tokio::test]
async fn custom_key_and_default_goal() {
    let storage = MemoryStorage::new();
    let config = StoreConfig {
        storage_key: "user_42_goal".to_string(),
        default_base_goal: 1800,
    };

    let (store, _) = GoalAdjustmentStore::load_with(storage.clone(), config)
        .await
        .unwrap();
    assert_eq!(store.current_goal(), 1800);
    assert!(storage.read("user_42_goal").await.unwrap().is_some());
    assert!(storage.read(DEFAULT_STORAGE_KEY).await.unwrap().is_none());
}

#[tokio::test]
async fn file_storage_round_trips_state() {
    let dir = tempfile::tempdir().unwrap();
    let storage = FileStorage::new(dir.path().join("state"));

    assert_eq!(storage.read("missing").await.unwrap(), None);

    {
        let (mut store, outcome) = GoalAdjustmentStore::load(storage.clone()).await.unwrap();
        assert_eq!(outcome, LoadOutcome::Initialized);
        store.register_excess(2600, &at(5, 20)).await.unwrap();
    }

    assert!(dir.path().join("state/calorie_goal_state.json").exists());

    let (store, outcome) = GoalAdjustmentStore::load(storage).await.unwrap();
    assert_eq!(outcome, LoadOutcome::Loaded);
    assert_eq!(store.current_goal(), 1910);
}

#[tokio::test]
async fn file_storage_rejects_path_like_keys() {
    let dir = tempfile::tempdir().unwrap();
    let storage = FileStorage::new(dir.path());

    let err = storage.write("../escape", "{}").await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[tokio::test]
async fn file_with_invalid_utf8_is_replaced() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("calorie_goal_state.json"),
        [0xff, 0xfe, 0x00, 0x7b],
    )
    .unwrap();
    let storage = FileStorage::new(dir.path());

    assert!(matches!(
        storage.read(DEFAULT_STORAGE_KEY).await,
        Err(Error::StorageCorruption(_))
    ));

    let (store, outcome) = GoalAdjustmentStore::load(storage.clone()).await.unwrap();
    assert!(matches!(outcome, LoadOutcome::Reinitialized { .. }));
    assert_eq!(store.current_goal(), 2000);

    let raw = storage.read(DEFAULT_STORAGE_KEY).await.unwrap().unwrap();
    let doc: Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(doc["baseGoal"], 2000);
}
