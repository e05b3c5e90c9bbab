//! Process-wide services: one bus, one cache, one worker manager.
//!
//! Nothing here is a hidden global — `init` builds the set once at startup
//! and everything else receives the pieces by reference.

use std::sync::Arc;

use crate::cache::{setup_cache_invalidation, CorticalCache};
use crate::events::EventBus;
use crate::workers::WorkerManager;

pub struct Services {
    pub bus: Arc<EventBus>,
    pub cache: Arc<CorticalCache>,
    pub workers: Arc<WorkerManager>,
}

impl Services {
    /// Build the substrate and wire cache invalidation onto the bus.
    pub fn init() -> Arc<Self> {
        let bus = Arc::new(EventBus::default());
        let cache = Arc::new(CorticalCache::new());
        let workers = Arc::new(WorkerManager::new());
        setup_cache_invalidation(&cache, &bus);
        tracing::info!("cortical services initialized");
        Arc::new(Self { bus, cache, workers })
    }

    /// Drain the worker pools. The bus and cache need no teardown.
    pub fn shutdown(&self) {
        self.workers.shutdown();
        tracing::info!("cortical services shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventType;
    use crate::payload::Payload;
    use serde_json::json;

    #[test]
    fn init_wires_cache_invalidation() {
        let services = Services::init();
        services.cache.set(crate::cache::keys::DREAM_STATUS, json!("dreaming"), 300.0);
        services.bus.emit(
            EventType::DreamCompleted,
            Payload::from_value(json!({"id": "dream-1"})),
            Some("test"),
        );
        assert_eq!(services.cache.get(crate::cache::keys::DREAM_STATUS), None);
        services.shutdown();
    }
}
