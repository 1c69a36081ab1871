//! Avatar model store
//!
//! Owns the live model and its GPU resources. Loads are last-config-wins:
//! only the most recent request may replace the live model, and a failure
//! leaves the previous model in place.

use crate::config::AvatarConfig;
use crate::error::AssetError;
use crate::model::asset::{AvatarModel, SceneGraph};
use crate::model::loader::{AssetLoader, LoadEvent, LoadPipeline};
use crate::model::resources::{GpuResourceTracker, ResourceUsage};
use crate::utils::channels::LoaderChannels;
use crate::{AvatarError, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Outcome of a load, as seen by the store's owner
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    Loaded { config_id: String, request_id: Uuid },
    Failed { config_id: String, error: AssetError },
}

pub struct ModelStore {
    pipeline: LoadPipeline,
    resources: GpuResourceTracker,
    current: Option<AvatarModel>,
    live_config: Option<AvatarConfig>,
    pending: Option<(Uuid, AvatarConfig)>,
    disposed: bool,
}

impl ModelStore {
    pub fn new(loader: Arc<dyn AssetLoader>, channels: LoaderChannels) -> Result<Self> {
        Self::with_resources(loader, GpuResourceTracker::new(), channels)
    }

    pub fn with_resources(
        loader: Arc<dyn AssetLoader>,
        resources: GpuResourceTracker,
        channels: LoaderChannels,
    ) -> Result<Self> {
        let pipeline = LoadPipeline::start(loader, resources.clone(), channels)?;
        Ok(Self {
            pipeline,
            resources,
            current: None,
            live_config: None,
            pending: None,
            disposed: false,
        })
    }

    /// Start loading `config`, superseding any load in flight
    pub fn load(&mut self, config: AvatarConfig) -> Result<Uuid> {
        if self.disposed {
            return Err(AvatarError::DisposedStateViolation("load"));
        }
        let request_id = self.pipeline.request(config.clone())?;
        if let Some((superseded, previous)) = self.pending.replace((request_id, config)) {
            debug!("Load {} ({}) superseded by {}", superseded, previous.id, request_id);
        }
        Ok(request_id)
    }

    /// Drop the in-flight load, if any. The live model is untouched.
    pub fn cancel(&mut self) -> Result<()> {
        if self.disposed {
            return Err(AvatarError::DisposedStateViolation("cancel_load"));
        }
        if let Some((request_id, _)) = self.pending.take() {
            debug!("Cancelling load {}", request_id);
            self.pipeline.cancel()?;
        }
        Ok(())
    }

    /// Apply every finished load. Never blocks.
    pub fn poll(&mut self) -> Vec<StoreEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.pipeline.try_recv() {
            if let Some(event) = self.apply(event) {
                events.push(event);
            }
        }
        events
    }

    fn apply(&mut self, event: LoadEvent) -> Option<StoreEvent> {
        match event {
            LoadEvent::Loaded { request_id, model } => {
                let Some(config) = self.take_pending(request_id) else {
                    debug!("Dropping stale model {} ({})", model.config_id(), request_id);
                    return None;
                };
                if let Some(previous) = self.current.take() {
                    let released = previous.dispose();
                    debug!(
                        "Released previous model: {} buffers, {} textures",
                        released.buffers, released.textures
                    );
                }
                info!("Avatar {} loaded", config.id);
                self.current = Some(model);
                let config_id = config.id.clone();
                self.live_config = Some(config);
                Some(StoreEvent::Loaded {
                    config_id,
                    request_id,
                })
            }
            LoadEvent::Failed { request_id, error } => {
                let Some(config) = self.take_pending(request_id) else {
                    debug!("Ignoring stale failure {}: {}", request_id, error);
                    return None;
                };
                warn!("Avatar {} failed to load: {}", config.id, error);
                Some(StoreEvent::Failed {
                    config_id: config.id,
                    error,
                })
            }
            LoadEvent::Shutdown => None,
        }
    }

    fn take_pending(&mut self, request_id: Uuid) -> Option<AvatarConfig> {
        if self.pending.as_ref().is_some_and(|(id, _)| *id == request_id) {
            self.pending.take().map(|(_, config)| config)
        } else {
            None
        }
    }

    /// Scene graph of the live model
    pub fn root(&self) -> Option<&SceneGraph> {
        self.current.as_ref().map(|m| m.scene())
    }

    pub fn model(&self) -> Option<&AvatarModel> {
        self.current.as_ref()
    }

    pub fn model_mut(&mut self) -> Option<&mut AvatarModel> {
        self.current.as_mut()
    }

    pub fn live_config(&self) -> Option<&AvatarConfig> {
        self.live_config.as_ref()
    }

    pub fn is_loaded(&self) -> bool {
        self.current.is_some()
    }

    pub fn is_loading(&self) -> bool {
        self.pending.is_some()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn resources(&self) -> &GpuResourceTracker {
        &self.resources
    }

    pub fn resource_usage(&self) -> ResourceUsage {
        self.resources.usage()
    }

    /// Cancel loading and release the live model. Safe to call repeatedly.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.pending = None;
        self.pipeline.shutdown();
        if let Some(model) = self.current.take() {
            let released = model.dispose();
            info!(
                "Disposed avatar model ({} buffers, {} textures, {} bytes)",
                released.buffers, released.textures, released.bytes
            );
        }
        self.live_config = None;
    }
}

impl Drop for ModelStore {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::loader::InMemoryLoader;
    use crate::model::manifest::ModelManifest;
    use std::time::{Duration, Instant};

    fn store(loader: &InMemoryLoader) -> ModelStore {
        ModelStore::new(Arc::new(loader.clone()), LoaderChannels::new(8)).unwrap()
    }

    fn poll_until(store: &mut ModelStore) -> StoreEvent {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(event) = store.poll().into_iter().next() {
                return event;
            }
            assert!(Instant::now() < deadline, "timed out waiting for store event");
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    fn small_manifest() -> ModelManifest {
        let mut manifest = ModelManifest::demo();
        manifest.meshes.truncate(1);
        manifest
    }

    #[test]
    fn test_load_sets_root() {
        let loader = InMemoryLoader::new();
        loader.insert("mem://a", ModelManifest::demo());
        let mut store = store(&loader);
        assert!(store.root().is_none());

        store.load(AvatarConfig::new("a", "A", "mem://a")).unwrap();
        assert!(store.is_loading());
        let event = poll_until(&mut store);
        assert!(matches!(event, StoreEvent::Loaded { ref config_id, .. } if config_id == "a"));
        assert!(store.root().is_some());
        assert!(!store.is_loading());
    }

    #[test]
    fn test_last_config_wins() {
        let loader = InMemoryLoader::new();
        loader.insert_delayed("mem://a", ModelManifest::demo(), Duration::from_millis(150));
        loader.insert("mem://b", small_manifest());
        let mut store = store(&loader);

        store.load(AvatarConfig::new("a", "A", "mem://a")).unwrap();
        store.load(AvatarConfig::new("b", "B", "mem://b")).unwrap();
        poll_until(&mut store);
        std::thread::sleep(Duration::from_millis(250));
        assert!(store.poll().is_empty());

        assert_eq!(store.live_config().unwrap().id, "b");

        let clean = GpuResourceTracker::new();
        let _single = small_manifest().instantiate("b", &clean).unwrap();
        assert_eq!(store.resource_usage(), clean.usage());
    }

    #[test]
    fn test_failure_keeps_previous_model() {
        let loader = InMemoryLoader::new();
        loader.insert("mem://a", ModelManifest::demo());
        loader.insert_failure(
            "mem://bad",
            AssetError::Malformed("truncated".to_string()),
            Duration::ZERO,
        );
        let mut store = store(&loader);

        store.load(AvatarConfig::new("a", "A", "mem://a")).unwrap();
        poll_until(&mut store);
        let handle = store.root().unwrap().handle();

        store.load(AvatarConfig::new("bad", "Bad", "mem://bad")).unwrap();
        let event = poll_until(&mut store);
        assert!(matches!(event, StoreEvent::Failed { .. }));
        assert_eq!(store.root().unwrap().handle(), handle);
        assert_eq!(store.live_config().unwrap().id, "a");
    }

    #[test]
    fn test_reload_replaces_resources() {
        let loader = InMemoryLoader::new();
        loader.insert("mem://a", ModelManifest::demo());
        loader.insert("mem://b", small_manifest());
        let mut store = store(&loader);

        store.load(AvatarConfig::new("a", "A", "mem://a")).unwrap();
        poll_until(&mut store);
        store.load(AvatarConfig::new("b", "B", "mem://b")).unwrap();
        poll_until(&mut store);

        let clean = GpuResourceTracker::new();
        let _single = small_manifest().instantiate("b", &clean).unwrap();
        assert_eq!(store.resource_usage(), clean.usage());
    }

    #[test]
    fn test_dispose_releases_everything() {
        let loader = InMemoryLoader::new();
        loader.insert("mem://a", ModelManifest::demo());
        let mut store = store(&loader);
        store.load(AvatarConfig::new("a", "A", "mem://a")).unwrap();
        poll_until(&mut store);
        assert!(!store.resource_usage().is_empty());

        store.dispose();
        store.dispose();
        assert!(store.resource_usage().is_empty());
        assert!(store.root().is_none());
        assert_eq!(
            store.load(AvatarConfig::new("a", "A", "mem://a")),
            Err(AvatarError::DisposedStateViolation("load"))
        );
    }

    #[test]
    fn test_cancel_keeps_live_model() {
        let loader = InMemoryLoader::new();
        loader.insert("mem://a", small_manifest());
        loader.insert_delayed("mem://slow", ModelManifest::demo(), Duration::from_millis(100));
        let resources = GpuResourceTracker::new();
        let mut store = ModelStore::with_resources(
            Arc::new(loader.clone()),
            resources.clone(),
            LoaderChannels::new(8),
        )
        .unwrap();

        store.load(AvatarConfig::new("a", "A", "mem://a")).unwrap();
        poll_until(&mut store);
        let live = resources.usage();

        store.load(AvatarConfig::new("slow", "Slow", "mem://slow")).unwrap();
        store.cancel().unwrap();
        assert!(!store.is_loading());

        std::thread::sleep(Duration::from_millis(200));
        assert!(store.poll().is_empty());
        assert_eq!(store.live_config().unwrap().id, "a");
        assert_eq!(resources.usage(), live);
    }

    #[test]
    fn test_dispose_mid_load_leaks_nothing() {
        let loader = InMemoryLoader::new();
        loader.insert_delayed("mem://slow", ModelManifest::demo(), Duration::from_millis(100));
        let resources = GpuResourceTracker::new();
        let mut store = ModelStore::with_resources(
            Arc::new(loader.clone()),
            resources.clone(),
            LoaderChannels::new(8),
        )
        .unwrap();

        store.load(AvatarConfig::new("slow", "Slow", "mem://slow")).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        store.dispose();

        // past the point where the load would have allocated
        std::thread::sleep(Duration::from_millis(200));
        assert!(resources.usage().is_empty());
        assert!(store.poll().is_empty());
        assert!(!store.is_loading());
        assert_eq!(store.cancel(), Err(AvatarError::DisposedStateViolation("cancel_load")));
    }

    #[test]
    fn test_dispose_releases_unpolled_model() {
        let loader = InMemoryLoader::new();
        loader.insert("mem://a", ModelManifest::demo());
        let resources = GpuResourceTracker::new();
        let mut store = ModelStore::with_resources(
            Arc::new(loader.clone()),
            resources.clone(),
            LoaderChannels::new(8),
        )
        .unwrap();

        store.load(AvatarConfig::new("a", "A", "mem://a")).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while resources.usage().is_empty() {
            assert!(Instant::now() < deadline, "load never allocated");
            std::thread::sleep(Duration::from_millis(2));
        }

        std::thread::sleep(Duration::from_millis(20));

        // finished but never polled
        store.dispose();
        assert!(resources.usage().is_empty());
    }
}
