//! Named group registry shared by the HTTP layer and the application.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::info;

use crate::error::{GroupError, Result};
use crate::group::{CacheGroup, GroupOptions, Loader};

/// Process-wide lookup of groups by name.
///
/// Groups live as long as the registry; there is no unregister.
#[derive(Debug, Default)]
pub struct GroupRegistry {
    groups: RwLock<HashMap<String, Arc<CacheGroup>>>,
}

impl GroupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `group`, rejecting a name that is already taken.
    pub fn register(&self, group: CacheGroup) -> Result<Arc<CacheGroup>> {
        let mut groups = self.groups.write().unwrap_or_else(PoisonError::into_inner);
        if groups.contains_key(group.name()) {
            return Err(GroupError::DuplicateGroup(group.name().to_string()));
        }

        let group = Arc::new(group);
        groups.insert(group.name().to_string(), Arc::clone(&group));
        info!(group = %group.name(), "group registered");
        Ok(group)
    }

    /// Builds and registers a group in one step.
    pub fn new_group(
        &self,
        name: impl Into<String>,
        loader: Arc<dyn Loader>,
        options: GroupOptions,
    ) -> Result<Arc<CacheGroup>> {
        self.register(CacheGroup::new(name, loader, options))
    }

    pub fn get(&self, name: &str) -> Option<Arc<CacheGroup>> {
        self.groups
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .groups
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}
