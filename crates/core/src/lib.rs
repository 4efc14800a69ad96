#![forbid(unsafe_code)]

pub mod aggregation;
pub mod merge;
pub mod model;
pub mod streak;
pub mod time;

pub use aggregation::{ProgressSummary, recompute_module_progress, summarize};
pub use merge::{PartialActivityProgress, PartialActivityResult, PartialProgress, merge};
pub use streak::{StreakState, compute_streak, revalidate_streak};
pub use time::Clock;
