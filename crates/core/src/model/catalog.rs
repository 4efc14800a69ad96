use crate::model::ids::{ActivityId, ModuleId};
use crate::model::progress::{ActivityResult, ModuleActivities, Percentage, Progress};

/// A module together with its fixed list of activities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogModule {
    id: ModuleId,
    activities: Vec<ActivityId>,
}

impl CatalogModule {
    #[must_use]
    pub fn id(&self) -> &ModuleId {
        &self.id
    }

    #[must_use]
    pub fn activities(&self) -> &[ActivityId] {
        &self.activities
    }

    #[must_use]
    pub fn contains(&self, activity: &ActivityId) -> bool {
        self.activities.contains(activity)
    }
}

/// Every module and activity known to the application.
///
/// The catalog fixes the denominator used for module percentages, so a remote
/// record that is missing keys (or carries extra ones) cannot skew them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleCatalog {
    modules: Vec<CatalogModule>,
}

impl ModuleCatalog {
    #[must_use]
    pub fn builder() -> ModuleCatalogBuilder {
        ModuleCatalogBuilder::default()
    }

    /// The catalog shipped with the application.
    #[must_use]
    pub fn standard() -> Self {
        Self::builder()
            .numbered_module("numeracion", 4)
            .numbered_module("operaciones", 4)
            .numbered_module("geometria", 3)
            .numbered_module("medida", 3)
            .numbered_module("estadistica", 2)
            .build()
    }

    #[must_use]
    pub fn modules(&self) -> &[CatalogModule] {
        &self.modules
    }

    #[must_use]
    pub fn module(&self, id: &ModuleId) -> Option<&CatalogModule> {
        self.modules.iter().find(|m| &m.id == id)
    }

    /// Total number of activities across every module.
    #[must_use]
    pub fn activity_count(&self) -> usize {
        self.modules.iter().map(|m| m.activities.len()).sum()
    }

    /// Fully-populated snapshot for a learner with no recorded activity.
    #[must_use]
    pub fn default_progress(&self) -> Progress {
        let mut progress = Progress::default();
        for module in &self.modules {
            let activities: ModuleActivities = module
                .activities
                .iter()
                .map(|a| (a.clone(), ActivityResult::pending()))
                .collect();
            progress
                .activity_progress
                .insert(module.id.clone(), activities);
            progress
                .module_progress
                .insert(module.id.clone(), Percentage::ZERO);
        }
        progress
    }
}

impl Default for ModuleCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

#[derive(Debug, Default)]
pub struct ModuleCatalogBuilder {
    modules: Vec<CatalogModule>,
}

impl ModuleCatalogBuilder {
    /// Add a module with explicit activity ids. Re-adding a module replaces it.
    #[must_use]
    pub fn module<I, A>(mut self, id: impl Into<ModuleId>, activities: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<ActivityId>,
    {
        let id = id.into();
        let mut list: Vec<ActivityId> = Vec::new();
        for activity in activities {
            let activity = activity.into();
            if !list.contains(&activity) {
                list.push(activity);
            }
        }
        self.modules.retain(|m| m.id != id);
        self.modules.push(CatalogModule {
            id,
            activities: list,
        });
        self
    }

    /// Add a module whose activities are `actividad-1..=count`.
    #[must_use]
    pub fn numbered_module(self, id: impl Into<ModuleId>, count: usize) -> Self {
        let activities = (1..=count).map(|n| ActivityId::new(format!("actividad-{n}")));
        self.module(id, activities)
    }

    #[must_use]
    pub fn build(self) -> ModuleCatalog {
        ModuleCatalog {
            modules: self.modules,
        }
    }
}
