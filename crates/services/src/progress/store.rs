use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::NaiveDate;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use learn_core::merge::merge_activity;
use learn_core::model::{
    ActivityId, ActivityResult, ModuleCatalog, ModuleId, Percentage, Progress, ProgressModelError,
    UserId,
};
use learn_core::{Clock, compute_streak, merge, recompute_module_progress};

use super::gateway::SyncGateway;
use super::view::{ProgressAction, ProgressView, StorePhase};
use crate::error::ProgressError;

#[derive(Debug)]
struct Session {
    phase: StorePhase,
    user: Option<UserId>,
    // Bumped on every attach/detach so late results from an older session
    // are never published.
    generation: u64,
}

/// Owns one learner's in-memory snapshot and coordinates it with the remote
/// record.
///
/// Every mutation reads the remote record, merges it with the catalog
/// defaults, applies the change, writes the full record back and only then
/// publishes the new snapshot. The read-then-write is not atomic: two
/// sessions mutating the same learner concurrently can lose an update.
pub struct ProgressStore {
    gateway: SyncGateway,
    catalog: Arc<ModuleCatalog>,
    clock: Clock,
    session: Mutex<Session>,
    view: watch::Sender<ProgressView>,
}

impl ProgressStore {
    #[must_use]
    pub fn new(gateway: SyncGateway, catalog: Arc<ModuleCatalog>, clock: Clock) -> Self {
        let (view, _) = watch::channel(ProgressView::idle(catalog.default_progress()));
        Self {
            gateway,
            catalog,
            clock,
            session: Mutex::new(Session {
                phase: StorePhase::Uninitialized,
                user: None,
                generation: 0,
            }),
            view,
        }
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn catalog(&self) -> &ModuleCatalog {
        &self.catalog
    }

    #[must_use]
    pub fn phase(&self) -> StorePhase {
        self.session().phase
    }

    #[must_use]
    pub fn user(&self) -> Option<UserId> {
        self.session().user.clone()
    }

    /// Current cached snapshot (the defaults while nothing is loaded).
    #[must_use]
    pub fn snapshot(&self) -> Progress {
        self.view.borrow().snapshot.clone()
    }

    #[must_use]
    pub fn view(&self) -> ProgressView {
        self.view.borrow().clone()
    }

    /// Receive every published view, starting with the current one.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ProgressView> {
        self.view.subscribe()
    }

    /// Dismiss the currently displayed error, if any.
    pub fn clear_error(&self) {
        self.view.send_if_modified(|view| view.error.take().is_some());
    }

    //
    // ─── SESSION LIFECYCLE ─────────────────────────────────────────────────────
    //

    /// Start a session for `user` and hydrate the snapshot from the remote
    /// record.
    ///
    /// A failed read still leaves the store `Ready` with the default snapshot
    /// and the load error on the view.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::RemoteRead` if the remote record could not be read.
    pub async fn attach(&self, user: UserId) -> Result<(), ProgressError> {
        let generation = {
            let mut session = self.session();
            session.generation += 1;
            session.phase = StorePhase::Loading;
            session.user = Some(user.clone());
            session.generation
        };
        debug!(user = %user, "loading progress");
        self.view.send_modify(|view| {
            view.loading = true;
            view.error = None;
        });

        let (remote, failure) = match self.gateway.load(&user).await {
            Ok(remote) => (remote, None),
            Err(err) => (None, Some(err)),
        };
        let snapshot = merge(remote.as_ref(), &self.catalog, self.clock.today());

        {
            let mut session = self.session();
            if session.generation != generation {
                debug!(user = %user, "discarding load for a closed session");
                return Ok(());
            }
            session.phase = StorePhase::Ready;
            let error = failure
                .as_ref()
                .map(|_| ProgressAction::LoadProgress.failure_message().to_owned());
            self.view.send_replace(ProgressView {
                snapshot,
                loading: false,
                error,
            });
        }

        match failure {
            Some(err) => Err(err),
            None => {
                debug!(user = %user, "progress ready");
                Ok(())
            }
        }
    }

    /// End the session and fall back to the default snapshot. No I/O.
    pub fn detach(&self) {
        let mut session = self.session();
        session.generation += 1;
        session.phase = StorePhase::Ready;
        if let Some(user) = session.user.take() {
            debug!(user = %user, "detached progress session");
        }
        self.view
            .send_replace(ProgressView::idle(self.catalog.default_progress()));
    }

    //
    // ─── MUTATIONS ─────────────────────────────────────────────────────────────
    //

    /// Record the outcome of one activity.
    ///
    /// Module percentages are recomputed and the streak is advanced with
    /// today as the activity date. Recording an identical result again leaves
    /// the activity map untouched but still moves the streak date to today.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Model` for ids outside the catalog,
    /// `ProgressError::NoUser` without a ready session, and remote errors if
    /// the read or write fails.
    pub async fn record_activity_result(
        &self,
        module: &ModuleId,
        activity: &ActivityId,
        result: ActivityResult,
    ) -> Result<Progress, ProgressError> {
        self.ensure_catalogued(module, Some(activity))?;

        self.mutate(ProgressAction::SaveProgress, |progress, today| {
            if !progress.set_activity(module.clone(), activity.clone(), result) {
                debug!(module = %module, activity = %activity, "activity result unchanged");
            }
            progress.module_progress =
                recompute_module_progress(&progress.activity_progress, &self.catalog);

            let streak = compute_streak(
                progress.last_activity_date,
                today,
                progress.current_streak,
                progress.best_streak,
            );
            progress.current_streak = streak.current_streak;
            progress.best_streak = streak.best_streak;
            progress.last_activity_date = streak.last_activity_date;
        })
        .await
    }

    /// Add `delta` points to the learner's total.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::NoUser` without a ready session, and remote
    /// errors if the read or write fails.
    pub async fn add_points(&self, delta: u32) -> Result<Progress, ProgressError> {
        self.mutate(ProgressAction::AwardPoints, |progress, _| {
            progress.add_points(delta);
        })
        .await
    }

    /// Overwrite a module's percentage without consulting the activity map.
    ///
    /// The stored value is replaced by the recomputed one on the next load or
    /// mutation, so it can disagree with `activity_progress` until then.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Model` for modules outside the catalog,
    /// `ProgressError::NoUser` without a ready session, and remote errors if
    /// the read or write fails.
    #[deprecated(note = "module progress is derived from activity results; use record_activity_result")]
    pub async fn set_module_percentage(
        &self,
        module: &ModuleId,
        percentage: Percentage,
    ) -> Result<Progress, ProgressError> {
        self.ensure_catalogued(module, None)?;
        warn!(module = %module, pct = percentage.value(), "legacy module percentage override");

        self.mutate(ProgressAction::OverrideModule, |progress, _| {
            progress.module_progress.insert(module.clone(), percentage);
        })
        .await
    }

    /// Look up one activity directly in the remote record, bypassing the
    /// cached snapshot.
    ///
    /// Returns `None` when there is no user, the record or activity is absent,
    /// or the read fails.
    pub async fn read_activity_result(
        &self,
        module: &ModuleId,
        activity: &ActivityId,
    ) -> Option<ActivityResult> {
        let user = self.user()?;
        match self.gateway.load(&user).await {
            Ok(remote) => remote
                .and_then(|record| record.activity(module, activity))
                .map(|partial| merge_activity(ActivityResult::pending(), partial)),
            Err(err) => {
                warn!(user = %user, module = %module, activity = %activity, %err, "activity lookup failed");
                None
            }
        }
    }

    //
    // ─── INTERNALS ─────────────────────────────────────────────────────────────
    //

    fn ensure_catalogued(
        &self,
        module: &ModuleId,
        activity: Option<&ActivityId>,
    ) -> Result<(), ProgressModelError> {
        let entry = self
            .catalog
            .module(module)
            .ok_or_else(|| ProgressModelError::UnknownModule(module.clone()))?;
        match activity {
            Some(activity) if !entry.contains(activity) => {
                Err(ProgressModelError::UnknownActivity {
                    module: module.clone(),
                    activity: activity.clone(),
                })
            }
            _ => Ok(()),
        }
    }

    fn active_session(&self) -> Result<(UserId, u64), ProgressError> {
        let session = self.session();
        match (&session.user, session.phase) {
            (Some(user), StorePhase::Ready) => Ok((user.clone(), session.generation)),
            (user, phase) => {
                warn!(user = ?user, ?phase, "refusing progress mutation without a ready session");
                Err(ProgressError::NoUser)
            }
        }
    }

    async fn mutate<F>(&self, action: ProgressAction, apply: F) -> Result<Progress, ProgressError>
    where
        F: FnOnce(&mut Progress, NaiveDate),
    {
        let (user, generation) = self.active_session()?;

        let remote = match self.gateway.load(&user).await {
            Ok(remote) => remote,
            Err(err) => return Err(self.report(generation, action, err)),
        };

        let today = self.clock.today();
        let mut next = merge(remote.as_ref(), &self.catalog, today);
        apply(&mut next, today);

        if let Err(err) = self.gateway.save(&user, &next).await {
            return Err(self.report(generation, action, err));
        }
        info!(user = %user, ?action, points = next.points, "progress saved");

        let session = self.session();
        if session.generation == generation {
            self.view.send_replace(ProgressView::idle(next.clone()));
        } else {
            debug!(user = %user, "saved progress for a closed session; not publishing");
        }
        Ok(next)
    }

    fn report(&self, generation: u64, action: ProgressAction, err: ProgressError) -> ProgressError {
        let session = self.session();
        if session.generation == generation {
            self.view.send_modify(|view| {
                view.error = Some(action.failure_message().to_owned());
            });
        }
        err
    }
}
