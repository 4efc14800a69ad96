mod catalog;
mod ids;
mod progress;

pub use ids::{ActivityId, ModuleId, ParseIdError, UserId};

pub use catalog::{CatalogModule, ModuleCatalog, ModuleCatalogBuilder};
pub use progress::{
    ActivityProgress, ActivityResult, ModuleActivities, ModuleProgress, Percentage, Progress,
    ProgressModelError,
};
