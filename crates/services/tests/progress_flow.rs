use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use learn_core::model::{
    ActivityId, ActivityResult, ModuleCatalog, ModuleId, Percentage, UserId,
};
use learn_core::time::{fixed_clock, fixed_now};
use serde_json::json;
use services::{Clock, ProgressError, ProgressStore, StorePhase, SyncGateway};
use storage::record::ProgressRecord;
use storage::repository::{InMemoryRepository, ProgressRepository, StorageError};
use tokio::sync::Notify;

/// In-memory repository whose reads and writes can be made to fail.
#[derive(Clone, Default)]
struct FlakyRepository {
    inner: InMemoryRepository,
    fail_reads: Arc<AtomicBool>,
    fail_writes: Arc<AtomicBool>,
}

impl FlakyRepository {
    fn fail_reads(&self, on: bool) {
        self.fail_reads.store(on, Ordering::SeqCst);
    }

    fn fail_writes(&self, on: bool) {
        self.fail_writes.store(on, Ordering::SeqCst);
    }
}

#[async_trait]
impl ProgressRepository for FlakyRepository {
    async fn load_progress(&self, user: &UserId) -> Result<Option<ProgressRecord>, StorageError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::Connection("offline".into()));
        }
        self.inner.load_progress(user).await
    }

    async fn save_progress(
        &self,
        user: &UserId,
        record: &ProgressRecord,
    ) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Connection("offline".into()));
        }
        self.inner.save_progress(user, record).await
    }
}

/// In-memory repository whose next read parks until released.
#[derive(Clone, Default)]
struct GatedRepository {
    inner: InMemoryRepository,
    gated: Arc<AtomicBool>,
    entered: Arc<Notify>,
    release: Arc<Notify>,
    saves: Arc<AtomicUsize>,
}

#[async_trait]
impl ProgressRepository for GatedRepository {
    async fn load_progress(&self, user: &UserId) -> Result<Option<ProgressRecord>, StorageError> {
        if self.gated.swap(false, Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        self.inner.load_progress(user).await
    }

    async fn save_progress(
        &self,
        user: &UserId,
        record: &ProgressRecord,
    ) -> Result<(), StorageError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.inner.save_progress(user, record).await
    }
}

fn store_with(repo: &FlakyRepository, clock: Clock) -> ProgressStore {
    ProgressStore::new(
        SyncGateway::new(Arc::new(repo.clone())),
        Arc::new(ModuleCatalog::standard()),
        clock,
    )
}

fn learner() -> UserId {
    UserId::new("learner-1")
}

fn geometria() -> ModuleId {
    ModuleId::new("geometria")
}

fn actividad(n: u32) -> ActivityId {
    ActivityId::new(format!("actividad-{n}"))
}

fn today() -> NaiveDate {
    fixed_now().date_naive()
}

#[tokio::test]
async fn recording_first_activity_updates_module_and_date() {
    let repo = FlakyRepository::default();
    let store = store_with(&repo, fixed_clock());
    store.attach(learner()).await.unwrap();

    let progress = store
        .record_activity_result(&geometria(), &actividad(1), ActivityResult::completed(100).unwrap())
        .await
        .unwrap();

    let result = progress.activity(&geometria(), &actividad(1)).unwrap();
    assert!(result.is_completed());
    assert_eq!(progress.module_percentage(&geometria()).value(), 33);
    assert_eq!(progress.points, 0);
    assert_eq!(progress.last_activity_date, Some(today()));
    assert_eq!(store.snapshot(), progress);

    let stored = repo.inner.document(&learner()).unwrap().unwrap();
    assert_eq!(stored["activityProgress"]["geometria"]["actividad-1"]["completed"], json!(true));
    assert_eq!(stored["moduleProgress"]["geometria"], json!(33));
}

#[tokio::test]
async fn points_accumulate_across_calls() {
    let repo = FlakyRepository::default();
    let store = store_with(&repo, fixed_clock());
    store.attach(learner()).await.unwrap();

    store.add_points(10).await.unwrap();
    store.add_points(10).await.unwrap();

    assert_eq!(store.snapshot().points, 20);
}

#[tokio::test]
async fn mutations_read_remote_before_writing() {
    let repo = FlakyRepository::default();
    let first = store_with(&repo, fixed_clock());
    let second = store_with(&repo, fixed_clock());
    first.attach(learner()).await.unwrap();
    second.attach(learner()).await.unwrap();

    first.add_points(15).await.unwrap();
    // `second` never saw the first write in memory, but reads it before writing.
    let progress = second.add_points(5).await.unwrap();
    assert_eq!(progress.points, 20);
}

#[tokio::test]
async fn attach_merges_partial_remote_record_with_defaults() {
    let repo = FlakyRepository::default();
    repo.inner
        .put_document(
            &learner(),
            json!({
                "points": 70,
                "activityProgress": {
                    "geometria": { "actividad-1": { "completed": true, "score": 90 } }
                },
                "moduleProgress": { "geometria": 100, "medida": 100 }
            }),
        )
        .unwrap();
    let store = store_with(&repo, fixed_clock());

    store.attach(learner()).await.unwrap();

    let snapshot = store.snapshot();
    assert_eq!(store.phase(), StorePhase::Ready);
    assert_eq!(snapshot.points, 70);
    assert_eq!(snapshot.module_percentage(&ModuleId::new("medida")), Percentage::ZERO);
    assert_eq!(snapshot.module_percentage(&geometria()).value(), 33);
    let catalog = ModuleCatalog::standard();
    for module in catalog.modules() {
        assert_eq!(
            snapshot.activity_progress[module.id()].len(),
            module.activities().len()
        );
    }
}

#[tokio::test]
async fn streak_grows_over_consecutive_days_and_breaks_after_gap() {
    let repo = FlakyRepository::default();
    let result = ActivityResult::completed(80).unwrap();

    let day = |offset: i64| Clock::fixed(fixed_now() + Duration::days(offset));

    let store = store_with(&repo, day(0));
    store.attach(learner()).await.unwrap();
    let p = store
        .record_activity_result(&geometria(), &actividad(1), result)
        .await
        .unwrap();
    assert_eq!((p.current_streak, p.best_streak), (0, 0));

    let store = store_with(&repo, day(1));
    store.attach(learner()).await.unwrap();
    let p = store
        .record_activity_result(&geometria(), &actividad(2), result)
        .await
        .unwrap();
    assert_eq!((p.current_streak, p.best_streak), (1, 1));

    // same result again on the same day: activity map unchanged, streak unchanged
    let again = store
        .record_activity_result(&geometria(), &actividad(2), result)
        .await
        .unwrap();
    assert_eq!(again.activity_progress, p.activity_progress);
    assert_eq!(again.current_streak, 1);

    let store = store_with(&repo, day(2));
    store.attach(learner()).await.unwrap();
    let p = store
        .record_activity_result(&geometria(), &actividad(3), result)
        .await
        .unwrap();
    assert_eq!((p.current_streak, p.best_streak), (2, 2));

    let store = store_with(&repo, day(6));
    store.attach(learner()).await.unwrap();
    assert_eq!(store.snapshot().current_streak, 0);
    let p = store
        .record_activity_result(&ModuleId::new("medida"), &actividad(1), result)
        .await
        .unwrap();
    assert_eq!((p.current_streak, p.best_streak), (0, 2));
    assert_eq!(p.last_activity_date, Some(today() + Duration::days(6)));
}

#[tokio::test]
async fn identical_result_still_moves_streak_date_to_today() {
    let repo = FlakyRepository::default();
    let result = ActivityResult::completed(100).unwrap();

    let store = store_with(&repo, fixed_clock());
    store.attach(learner()).await.unwrap();
    store
        .record_activity_result(&geometria(), &actividad(1), result)
        .await
        .unwrap();

    let tomorrow = store_with(&repo, Clock::fixed(fixed_now() + Duration::days(1)));
    tomorrow.attach(learner()).await.unwrap();
    let p = tomorrow
        .record_activity_result(&geometria(), &actividad(1), result)
        .await
        .unwrap();
    assert_eq!(p.last_activity_date, Some(today() + Duration::days(1)));
    assert_eq!(p.current_streak, 1);
}

#[tokio::test]
async fn write_failure_keeps_previous_snapshot_and_sets_error() {
    let repo = FlakyRepository::default();
    let store = store_with(&repo, fixed_clock());
    store.attach(learner()).await.unwrap();
    store.add_points(5).await.unwrap();
    let before = store.snapshot();

    repo.fail_writes(true);
    let err = store.add_points(10).await.unwrap_err();
    assert!(matches!(err, ProgressError::RemoteWrite(_)));
    assert!(err.is_remote());

    let view = store.view();
    assert_eq!(view.snapshot, before);
    assert_eq!(
        view.error.as_deref(),
        Some("Could not award your points. Please try again.")
    );

    repo.fail_writes(false);
    store.add_points(10).await.unwrap();
    assert_eq!(store.view().error, None);
    assert_eq!(store.snapshot().points, 15);
}

#[tokio::test]
async fn read_failure_during_mutation_applies_nothing() {
    let repo = FlakyRepository::default();
    let store = store_with(&repo, fixed_clock());
    store.attach(learner()).await.unwrap();

    repo.fail_reads(true);
    let err = store
        .record_activity_result(&geometria(), &actividad(1), ActivityResult::completed(90).unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, ProgressError::RemoteRead(_)));
    assert_eq!(
        store.view().error.as_deref(),
        Some("Could not save your progress. Please try again.")
    );
    assert!(store.snapshot().activity(&geometria(), &actividad(1)).is_some_and(|r| !r.is_completed()));
    assert!(repo.inner.document(&learner()).unwrap().is_none());

    store.clear_error();
    assert_eq!(store.view().error, None);
}

#[tokio::test]
async fn attach_with_failing_read_falls_back_to_defaults() {
    let repo = FlakyRepository::default();
    repo.fail_reads(true);
    let store = store_with(&repo, fixed_clock());

    let err = store.attach(learner()).await.unwrap_err();
    assert!(matches!(err, ProgressError::RemoteRead(_)));
    assert_eq!(store.phase(), StorePhase::Ready);
    let view = store.view();
    assert!(!view.loading);
    assert_eq!(view.snapshot, ModuleCatalog::standard().default_progress());
    assert_eq!(
        view.error.as_deref(),
        Some("Could not load your progress. Please try again.")
    );
}

#[tokio::test]
async fn detach_resets_snapshot_and_refuses_mutations() {
    let repo = FlakyRepository::default();
    let store = store_with(&repo, fixed_clock());
    store.attach(learner()).await.unwrap();
    store.add_points(30).await.unwrap();

    store.detach();
    assert!(store.user().is_none());
    assert_eq!(store.snapshot().points, 0);

    let err = store.add_points(1).await.unwrap_err();
    assert!(matches!(err, ProgressError::NoUser));

    // the remote record is untouched by detach
    store.attach(learner()).await.unwrap();
    assert_eq!(store.snapshot().points, 30);
}

#[tokio::test]
async fn subscribers_see_loading_then_ready() {
    let repo = FlakyRepository::default();
    let store = store_with(&repo, fixed_clock());
    let mut rx = store.subscribe();
    assert!(!rx.borrow_and_update().loading);

    store.attach(learner()).await.unwrap();
    assert!(rx.has_changed().unwrap());
    assert!(!rx.borrow_and_update().loading);

    store.add_points(3).await.unwrap();
    assert!(rx.has_changed().unwrap());
    assert_eq!(rx.borrow_and_update().snapshot.points, 3);
}

#[tokio::test]
async fn read_activity_result_bypasses_cache_and_never_fails() {
    let repo = FlakyRepository::default();
    let store = store_with(&repo, fixed_clock());

    assert_eq!(
        store.read_activity_result(&geometria(), &actividad(1)).await,
        None
    );

    store.attach(learner()).await.unwrap();
    assert_eq!(
        store.read_activity_result(&geometria(), &actividad(1)).await,
        None
    );

    // written by another session, not yet in this store's snapshot
    repo.inner
        .put_document(
            &learner(),
            json!({ "activityProgress": { "geometria": { "actividad-1": { "completed": true, "score": 64 } } } }),
        )
        .unwrap();
    let found = store
        .read_activity_result(&geometria(), &actividad(1))
        .await
        .unwrap();
    assert_eq!(found, ActivityResult::completed(64).unwrap());
    assert!(!store.snapshot().activity(&geometria(), &actividad(1)).unwrap().is_completed());

    repo.fail_reads(true);
    assert_eq!(
        store.read_activity_result(&geometria(), &actividad(1)).await,
        None
    );
    assert_eq!(store.view().error, None);
}

#[tokio::test]
#[allow(deprecated)]
async fn legacy_module_override_is_persisted_until_recomputed() {
    let repo = FlakyRepository::default();
    let store = store_with(&repo, fixed_clock());
    store.attach(learner()).await.unwrap();

    let pct = Percentage::new(80).unwrap();
    let overridden = store.set_module_percentage(&geometria(), pct).await.unwrap();
    assert_eq!(overridden.module_percentage(&geometria()), pct);
    let stored = repo.inner.document(&learner()).unwrap().unwrap();
    assert_eq!(stored["moduleProgress"]["geometria"], json!(80));

    // the next load recomputes from the activity map
    store.attach(learner()).await.unwrap();
    assert_eq!(store.snapshot().module_percentage(&geometria()), Percentage::ZERO);

    let err = store
        .set_module_percentage(&ModuleId::new("astronomia"), pct)
        .await
        .unwrap_err();
    assert!(matches!(err, ProgressError::Model(_)));
}

#[tokio::test]
async fn completing_every_activity_reaches_full_mastery() {
    let repo = FlakyRepository::default();
    let store = store_with(&repo, fixed_clock());
    store.attach(learner()).await.unwrap();

    for n in 1..=3 {
        store
            .record_activity_result(&geometria(), &actividad(n), ActivityResult::completed(70).unwrap())
            .await
            .unwrap();
    }
    assert_eq!(store.snapshot().module_percentage(&geometria()), Percentage::FULL);
}

#[tokio::test]
async fn mutations_are_refused_while_loading() {
    let repo = GatedRepository::default();
    repo.gated.store(true, Ordering::SeqCst);
    let store = Arc::new(ProgressStore::new(
        SyncGateway::new(Arc::new(repo.clone())),
        Arc::new(ModuleCatalog::standard()),
        fixed_clock(),
    ));

    let attaching = tokio::spawn({
        let store = Arc::clone(&store);
        async move { store.attach(learner()).await }
    });
    repo.entered.notified().await;
    assert_eq!(store.phase(), StorePhase::Loading);

    let err = store.add_points(5).await.unwrap_err();
    assert!(matches!(err, ProgressError::NoUser));
    let err = store
        .record_activity_result(&geometria(), &actividad(1), ActivityResult::completed(80).unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, ProgressError::NoUser));
    assert_eq!(repo.saves.load(Ordering::SeqCst), 0);
    assert!(repo.inner.document(&learner()).unwrap().is_none());
    assert_eq!(store.view().error, None);

    repo.release.notify_one();
    attaching.await.unwrap().unwrap();
    assert_eq!(store.phase(), StorePhase::Ready);
    assert_eq!(store.snapshot().points, 0);

    store.add_points(5).await.unwrap();
    assert_eq!(repo.saves.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn array_document_attaches_as_defaults() {
    let repo = FlakyRepository::default();
    repo.inner
        .put_document(&learner(), json!([500, null, null, 9, 9, "2023-11-13"]))
        .unwrap();
    let store = store_with(&repo, fixed_clock());
    store.attach(learner()).await.unwrap();

    let progress = store.snapshot();
    assert_eq!(progress, ModuleCatalog::standard().default_progress());
    assert_eq!(progress.points, 0);
    assert_eq!(progress.current_streak, 0);
    assert_eq!(progress.last_activity_date, None);
    assert_eq!(store.view().error, None);
}
