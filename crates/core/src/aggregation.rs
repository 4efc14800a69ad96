//! Derived statistics over the raw activity map.
//!
//! Everything here is pure: the catalog decides which modules and activities
//! count, the activity map only says which of them are done.

use crate::model::{ActivityProgress, ModuleCatalog, ModuleId, ModuleProgress, Percentage, Progress};

/// Recompute every catalog module's completion percentage.
///
/// Activities present in `activity_progress` but not in the catalog are
/// ignored; catalog activities missing from the map count as incomplete.
#[must_use]
pub fn recompute_module_progress(
    activity_progress: &ActivityProgress,
    catalog: &ModuleCatalog,
) -> ModuleProgress {
    catalog
        .modules()
        .iter()
        .map(|module| {
            let recorded = activity_progress.get(module.id());
            let completed = module
                .activities()
                .iter()
                .filter(|activity| {
                    recorded
                        .and_then(|r| r.get(*activity))
                        .is_some_and(|result| result.is_completed())
                })
                .count();
            let pct = Percentage::from_ratio(completed, module.activities().len());
            (module.id().clone(), pct)
        })
        .collect()
}

/// Learner-wide totals shown alongside the per-module breakdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressSummary {
    pub completed_activities: usize,
    pub total_activities: usize,
    pub overall: Percentage,
    /// Mean score of completed catalog activities, rounded; `0` when none.
    pub average_score: u8,
    pub mastered_modules: Vec<ModuleId>,
}

#[must_use]
pub fn summarize(progress: &Progress, catalog: &ModuleCatalog) -> ProgressSummary {
    let mut completed_activities = 0_usize;
    let mut score_total = 0_usize;
    let mut mastered_modules = Vec::new();

    for module in catalog.modules() {
        let recorded = progress.activity_progress.get(module.id());
        let mut module_completed = 0_usize;
        for activity in module.activities() {
            if let Some(result) = recorded.and_then(|r| r.get(activity)) {
                if result.is_completed() {
                    module_completed += 1;
                    score_total += usize::from(result.score());
                }
            }
        }
        if !module.activities().is_empty() && module_completed == module.activities().len() {
            mastered_modules.push(module.id().clone());
        }
        completed_activities += module_completed;
    }

    let total_activities = catalog.activity_count();
    let average_score = if completed_activities == 0 {
        0
    } else {
        let rounded = (2 * score_total + completed_activities) / (2 * completed_activities);
        u8::try_from(rounded).unwrap_or(u8::MAX)
    };

    ProgressSummary {
        completed_activities,
        total_activities,
        overall: Percentage::from_ratio(completed_activities, total_activities),
        average_score,
        mastered_modules,
    }
}
