use alloc::sync::Arc;
use std::collections::BTreeMap;

use crate::zone::ZoneHandle;

/// Application state shared across request handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Running zones by name. Fixed for the lifetime of the process.
    pub zones: Arc<BTreeMap<String, ZoneHandle>>,
}

impl AppState {
    #[must_use]
    pub fn new(zones: BTreeMap<String, ZoneHandle>) -> Self {
        Self {
            zones: Arc::new(zones),
        }
    }

    #[must_use]
    pub fn zone(&self, name: &str) -> Option<&ZoneHandle> {
        self.zones.get(name)
    }
}
