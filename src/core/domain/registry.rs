use std::collections::BTreeMap;
use std::sync::Arc;

use crate::core::domain::branch::ResourceManagerKind;
use crate::core::domain::transaction::ResourceManager;

/// Named connection targets that branch descriptors refer to.
#[derive(Default, Clone)]
pub struct ResourceManagerRegistry {
    targets: BTreeMap<String, Arc<dyn ResourceManager>>,
}

impl ResourceManagerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, target: impl Into<String>, resource_manager: Arc<dyn ResourceManager>) {
        self.targets.insert(target.into(), resource_manager);
    }

    pub fn with(mut self, target: impl Into<String>, resource_manager: Arc<dyn ResourceManager>) -> Self {
        self.register(target, resource_manager);
        self
    }

    pub fn get(&self, target: &str) -> Option<&Arc<dyn ResourceManager>> {
        self.targets.get(target)
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Targets in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn ResourceManager>)> {
        self.targets.iter().map(|(name, rm)| (name.as_str(), rm))
    }

    pub fn kinds(&self) -> Vec<(String, ResourceManagerKind)> {
        self.targets
            .iter()
            .map(|(name, rm)| (name.clone(), rm.kind()))
            .collect()
    }
}

impl std::fmt::Debug for ResourceManagerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.targets.iter().map(|(name, rm)| (name, rm.kind())))
            .finish()
    }
}
