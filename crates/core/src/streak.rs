use chrono::NaiveDate;

/// Streak counters after a recomputation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreakState {
    pub current_streak: u32,
    pub best_streak: u32,
    pub last_activity_date: Option<NaiveDate>,
}

/// How `last` relates to `today` on the calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DayGap {
    None,
    SameDay,
    Yesterday,
    Broken,
}

fn classify(last: Option<NaiveDate>, today: NaiveDate) -> DayGap {
    match last {
        None => DayGap::None,
        Some(last) if last == today => DayGap::SameDay,
        Some(last) if today.pred_opt() == Some(last) => DayGap::Yesterday,
        // two or more days ago, or in the future
        Some(_) => DayGap::Broken,
    }
}

/// Streak update for an activity completed `today`.
///
/// - no previous activity: current is `0`, best is kept
/// - previous activity yesterday: current grows by one
/// - previous activity today: nothing changes
/// - anything else (a gap, or a date after `today`): current resets, best is kept
///
/// The returned `last_activity_date` is always `today`. The best streak never
/// drops below either prior counter.
#[must_use]
pub fn compute_streak(
    last_activity_date: Option<NaiveDate>,
    today: NaiveDate,
    prior_current: u32,
    prior_best: u32,
) -> StreakState {
    let current = match classify(last_activity_date, today) {
        DayGap::Yesterday => prior_current.saturating_add(1),
        DayGap::SameDay => prior_current,
        DayGap::None | DayGap::Broken => 0,
    };
    StreakState {
        current_streak: current,
        best_streak: prior_best.max(prior_current).max(current),
        last_activity_date: Some(today),
    }
}

/// Re-derive whether a stored streak is still alive without recording a new
/// completion. Used when a snapshot is loaded; never increments.
#[must_use]
pub fn revalidate_streak(
    last_activity_date: Option<NaiveDate>,
    today: NaiveDate,
    prior_current: u32,
    prior_best: u32,
) -> StreakState {
    let current = match classify(last_activity_date, today) {
        DayGap::Yesterday | DayGap::SameDay => prior_current,
        DayGap::None | DayGap::Broken => 0,
    };
    StreakState {
        current_streak: current,
        best_streak: prior_best.max(prior_current).max(current),
        last_activity_date,
    }
}
