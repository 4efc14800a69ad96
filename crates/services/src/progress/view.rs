use learn_core::model::Progress;

/// Lifecycle of the store's session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorePhase {
    /// No learner has been attached yet.
    Uninitialized,
    /// A learner was attached and their record is being fetched.
    Loading,
    /// The snapshot reflects the attached learner, or defaults after detach.
    Ready,
}

/// What subscribers render: the latest snapshot plus load/error state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressView {
    pub snapshot: Progress,
    pub loading: bool,
    pub error: Option<String>,
}

impl ProgressView {
    #[must_use]
    pub fn idle(snapshot: Progress) -> Self {
        Self {
            snapshot,
            loading: false,
            error: None,
        }
    }
}

/// The user-facing operation a failure is reported against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressAction {
    LoadProgress,
    SaveProgress,
    AwardPoints,
    OverrideModule,
}

impl ProgressAction {
    /// Message shown to the learner when this action did not complete.
    #[must_use]
    pub fn failure_message(self) -> &'static str {
        match self {
            Self::LoadProgress => "Could not load your progress. Please try again.",
            Self::SaveProgress => "Could not save your progress. Please try again.",
            Self::AwardPoints => "Could not award your points. Please try again.",
            Self::OverrideModule => "Could not update the module progress. Please try again.",
        }
    }
}
