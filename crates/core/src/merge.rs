//! Merging a (possibly partial) remote record onto the default template.

use chrono::NaiveDate;
use std::collections::BTreeMap;

use crate::aggregation::recompute_module_progress;
use crate::model::{ActivityId, ActivityResult, ModuleCatalog, ModuleId, Progress};
use crate::streak::revalidate_streak;

/// One activity as found in a remote record; either field may be missing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PartialActivityResult {
    pub completed: Option<bool>,
    pub score: Option<u8>,
}

impl From<ActivityResult> for PartialActivityResult {
    fn from(value: ActivityResult) -> Self {
        Self {
            completed: Some(value.is_completed()),
            score: Some(value.score()),
        }
    }
}

pub type PartialActivityProgress = BTreeMap<ModuleId, BTreeMap<ActivityId, PartialActivityResult>>;

/// A remote record after decoding, with every field optional.
///
/// Stored module percentages are not carried: they are always recomputed
/// from `activity_progress` during [`merge`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialProgress {
    pub points: Option<u32>,
    pub activity_progress: Option<PartialActivityProgress>,
    pub current_streak: Option<u32>,
    pub best_streak: Option<u32>,
    pub last_activity_date: Option<NaiveDate>,
}

impl PartialProgress {
    /// Look up a single activity, if the record carries it.
    #[must_use]
    pub fn activity(
        &self,
        module: &ModuleId,
        activity: &ActivityId,
    ) -> Option<PartialActivityResult> {
        self.activity_progress
            .as_ref()
            .and_then(|modules| modules.get(module))
            .and_then(|activities| activities.get(activity))
            .copied()
    }
}

/// Fill a partial activity from a base value.
///
/// Scores outside `0..=100` fall back to the base score.
#[must_use]
pub fn merge_activity(base: ActivityResult, remote: PartialActivityResult) -> ActivityResult {
    let completed = remote.completed.unwrap_or(base.is_completed());
    let score = remote
        .score
        .filter(|s| *s <= ActivityResult::MAX_SCORE)
        .unwrap_or(base.score());
    ActivityResult::new(completed, u32::from(score)).unwrap_or(base)
}

/// Build a full snapshot from the catalog's default template and an optional
/// remote record.
///
/// Remote values win field by field; the activity map is merged per module
/// and per activity so a record carrying one module never erases the others.
/// Module percentages and streak counters are re-derived afterwards.
#[must_use]
pub fn merge(
    remote: Option<&PartialProgress>,
    catalog: &ModuleCatalog,
    today: NaiveDate,
) -> Progress {
    let mut progress = catalog.default_progress();

    if let Some(remote) = remote {
        if let Some(points) = remote.points {
            progress.points = points;
        }
        if let Some(modules) = &remote.activity_progress {
            for (module, activities) in modules {
                let slot = progress
                    .activity_progress
                    .entry(module.clone())
                    .or_default();
                for (activity, partial) in activities {
                    let base = slot.get(activity).copied().unwrap_or_default();
                    slot.insert(activity.clone(), merge_activity(base, *partial));
                }
            }
        }
        progress.current_streak = remote.current_streak.unwrap_or(progress.current_streak);
        progress.best_streak = remote.best_streak.unwrap_or(progress.best_streak);
        progress.last_activity_date = remote.last_activity_date.or(progress.last_activity_date);
    }

    progress.module_progress = recompute_module_progress(&progress.activity_progress, catalog);

    let streak = revalidate_streak(
        progress.last_activity_date,
        today,
        progress.current_streak,
        progress.best_streak,
    );
    progress.current_streak = streak.current_streak;
    progress.best_streak = streak.best_streak;
    progress.last_activity_date = streak.last_activity_date;

    progress
}
