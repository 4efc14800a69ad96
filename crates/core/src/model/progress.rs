use chrono::NaiveDate;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::model::ids::{ActivityId, ModuleId};

//
// ─── ERRORS ───────────────────────────────────────────────────────────────────
//

/// Errors raised when constructing or mutating progress values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProgressModelError {
    #[error("score must be between 0 and 100, got {0}")]
    ScoreOutOfRange(u32),

    #[error("percentage must be between 0 and 100, got {0}")]
    PercentageOutOfRange(u32),

    #[error("unknown module: {0}")]
    UnknownModule(ModuleId),

    #[error("unknown activity {activity} in module {module}")]
    UnknownActivity {
        module: ModuleId,
        activity: ActivityId,
    },
}

//
// ─── ACTIVITY RESULT ──────────────────────────────────────────────────────────
//

/// Outcome of a single graded activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ActivityResult {
    completed: bool,
    score: u8,
}

impl ActivityResult {
    pub const MAX_SCORE: u8 = 100;

    /// Build a result, validating the score range.
    ///
    /// # Errors
    ///
    /// Returns `ProgressModelError::ScoreOutOfRange` if `score` exceeds 100.
    pub fn new(completed: bool, score: u32) -> Result<Self, ProgressModelError> {
        let score = u8::try_from(score)
            .ok()
            .filter(|s| *s <= Self::MAX_SCORE)
            .ok_or(ProgressModelError::ScoreOutOfRange(score))?;
        Ok(Self { completed, score })
    }

    /// A finished activity with the given score.
    ///
    /// # Errors
    ///
    /// Returns `ProgressModelError::ScoreOutOfRange` if `score` exceeds 100.
    pub fn completed(score: u32) -> Result<Self, ProgressModelError> {
        Self::new(true, score)
    }

    /// The untouched state every catalog activity starts in.
    #[must_use]
    pub const fn pending() -> Self {
        Self {
            completed: false,
            score: 0,
        }
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.completed
    }

    #[must_use]
    pub fn score(&self) -> u8 {
        self.score
    }
}

//
// ─── PERCENTAGE ───────────────────────────────────────────────────────────────
//

/// Whole-number percentage in `0..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Percentage(u8);

impl Percentage {
    pub const ZERO: Self = Self(0);
    pub const FULL: Self = Self(100);

    /// # Errors
    ///
    /// Returns `ProgressModelError::PercentageOutOfRange` if `value` exceeds 100.
    pub fn new(value: u32) -> Result<Self, ProgressModelError> {
        u8::try_from(value)
            .ok()
            .filter(|v| *v <= 100)
            .map(Self)
            .ok_or(ProgressModelError::PercentageOutOfRange(value))
    }

    /// Round-half-up ratio of `part / whole`, `0` when `whole` is zero.
    ///
    /// Only a complete `part == whole` yields 100; anything short of that is
    /// capped at 99 even when it would round up.
    #[must_use]
    pub fn from_ratio(part: usize, whole: usize) -> Self {
        if whole == 0 {
            return Self::ZERO;
        }
        if part >= whole {
            return Self::FULL;
        }
        // (200 * part + whole) / (2 * whole) == round(100 * part / whole)
        let rounded = ((200 * part + whole) / (2 * whole)).min(99);
        Self(u8::try_from(rounded).unwrap_or(99))
    }

    #[must_use]
    pub fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<u32> for Percentage {
    type Error = ProgressModelError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Percentage> for u32 {
    fn from(value: Percentage) -> Self {
        u32::from(value.0)
    }
}

//
// ─── PROGRESS SNAPSHOT ────────────────────────────────────────────────────────
//

pub type ModuleActivities = BTreeMap<ActivityId, ActivityResult>;
pub type ActivityProgress = BTreeMap<ModuleId, ModuleActivities>;
pub type ModuleProgress = BTreeMap<ModuleId, Percentage>;

/// Full in-memory state of one learner.
///
/// `module_progress` and the streak fields are derived; they are refreshed by
/// the aggregation engine and streak calculator whenever the snapshot is
/// rebuilt from a remote record or mutated.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Progress {
    pub points: u32,
    pub activity_progress: ActivityProgress,
    pub module_progress: ModuleProgress,
    pub current_streak: u32,
    pub best_streak: u32,
    pub last_activity_date: Option<NaiveDate>,
}

impl Progress {
    #[must_use]
    pub fn activity(&self, module: &ModuleId, activity: &ActivityId) -> Option<ActivityResult> {
        self.activity_progress
            .get(module)
            .and_then(|activities| activities.get(activity))
            .copied()
    }

    /// Percentage for a module, `0` if the module is unknown.
    #[must_use]
    pub fn module_percentage(&self, module: &ModuleId) -> Percentage {
        self.module_progress.get(module).copied().unwrap_or_default()
    }

    /// Store an activity result, returning whether the stored value changed.
    pub fn set_activity(
        &mut self,
        module: ModuleId,
        activity: ActivityId,
        result: ActivityResult,
    ) -> bool {
        let slot = self.activity_progress.entry(module).or_default();
        slot.insert(activity, result) != Some(result)
    }

    /// Add points without overflowing.
    pub fn add_points(&mut self, delta: u32) {
        self.points = self.points.saturating_add(delta);
    }
}
