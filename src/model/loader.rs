//! Asset loading
//!
//! [`AssetLoader`] is the seam to whatever resolves a model reference.
//! [`LoadPipeline`] runs loads on a worker thread with its own tokio
//! runtime. Only one load is ever in flight: a new request aborts the
//! previous task, and every result is tagged with its request id so the
//! store can drop anything stale.

use crate::config::AvatarConfig;
use crate::error::AssetError;
use crate::model::asset::AvatarModel;
use crate::model::manifest::ModelManifest;
use crate::model::resources::GpuResourceTracker;
use crate::utils::channels::LoaderChannels;
use crate::{AvatarError, Result};
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use futures::future::{BoxFuture, FutureExt};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::runtime::Runtime;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Resolves an [`AvatarConfig`] into a loaded model
pub trait AssetLoader: Send + Sync + 'static {
    /// Fetch, parse and instantiate the model, allocating its GPU resources on `resources`
    fn load(
        &self,
        config: AvatarConfig,
        resources: GpuResourceTracker,
    ) -> BoxFuture<'static, std::result::Result<AvatarModel, AssetError>>;
}

/// Loads JSON manifests from the local file system
///
/// Accepts `file://` URLs and bare paths. Relative paths resolve against
/// the base directory when one is set.
#[derive(Debug, Clone, Default)]
pub struct ManifestFileLoader {
    base_dir: Option<PathBuf>,
}

impl ManifestFileLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    /// Map a model reference to a manifest path
    pub fn resolve(&self, model_url: &str) -> std::result::Result<PathBuf, AssetError> {
        let lower = model_url.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            return Err(AssetError::Network(format!(
                "remote assets are not fetched by the file loader: {}",
                model_url
            )));
        }

        let raw = match model_url.strip_prefix("file://") {
            Some(path) => path,
            None if model_url.contains("://") => {
                return Err(AssetError::UnsupportedFormat(format!(
                    "unsupported scheme in {}",
                    model_url
                )));
            }
            None => model_url,
        };

        let path = Path::new(raw);
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => {}
            Some(ext) => {
                return Err(AssetError::UnsupportedFormat(format!(".{} ({})", ext, model_url)));
            }
            None => {
                return Err(AssetError::UnsupportedFormat(format!(
                    "no file extension ({})",
                    model_url
                )));
            }
        }

        Ok(match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        })
    }
}

impl AssetLoader for ManifestFileLoader {
    fn load(
        &self,
        config: AvatarConfig,
        resources: GpuResourceTracker,
    ) -> BoxFuture<'static, std::result::Result<AvatarModel, AssetError>> {
        let path = self.resolve(&config.model_url);
        async move {
            let path = path?;
            debug!("Reading manifest {}", path.display());
            let content = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| AssetError::Io(format!("{}: {}", path.display(), e)))?;
            let manifest = ModelManifest::from_json(&content)?;
            manifest.instantiate(&config.id, &resources)
        }
        .boxed()
    }
}

#[derive(Debug, Clone)]
struct InMemoryAsset {
    manifest: std::result::Result<ModelManifest, AssetError>,
    delay: Duration,
}

/// Serves manifests registered in memory, with optional simulated latency
///
/// Cloning shares the registered assets.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLoader {
    assets: Arc<RwLock<HashMap<String, InMemoryAsset>>>,
}

impl InMemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a manifest that loads immediately
    pub fn insert(&self, model_url: impl Into<String>, manifest: ModelManifest) {
        self.insert_delayed(model_url, manifest, Duration::ZERO);
    }

    /// Register a manifest that takes `delay` to load
    pub fn insert_delayed(&self, model_url: impl Into<String>, manifest: ModelManifest, delay: Duration) {
        self.assets.write().insert(
            model_url.into(),
            InMemoryAsset {
                manifest: Ok(manifest),
                delay,
            },
        );
    }

    /// Register a reference that fails after `delay`
    pub fn insert_failure(&self, model_url: impl Into<String>, error: AssetError, delay: Duration) {
        self.assets.write().insert(
            model_url.into(),
            InMemoryAsset {
                manifest: Err(error),
                delay,
            },
        );
    }

    pub fn contains(&self, model_url: &str) -> bool {
        self.assets.read().contains_key(model_url)
    }
}

impl AssetLoader for InMemoryLoader {
    fn load(
        &self,
        config: AvatarConfig,
        resources: GpuResourceTracker,
    ) -> BoxFuture<'static, std::result::Result<AvatarModel, AssetError>> {
        let asset = self.assets.read().get(&config.model_url).cloned();
        async move {
            let asset = asset.ok_or_else(|| {
                AssetError::Io(format!("asset not found: {}", config.model_url))
            })?;
            if !asset.delay.is_zero() {
                tokio::time::sleep(asset.delay).await;
            }
            asset.manifest?.instantiate(&config.id, &resources)
        }
        .boxed()
    }
}

/// Commands accepted by the loader worker
#[derive(Debug, Clone)]
pub enum LoadCommand {
    /// Start loading, aborting whatever is in flight
    Load {
        config: AvatarConfig,
        request_id: Uuid,
    },

    /// Abort the in-flight load, if any
    Cancel,

    /// Shutdown the worker
    Shutdown,
}

/// Events emitted by the loader worker
#[derive(Debug)]
pub enum LoadEvent {
    Loaded {
        request_id: Uuid,
        model: AvatarModel,
    },

    Failed {
        request_id: Uuid,
        error: AssetError,
    },

    /// Worker has shut down
    Shutdown,
}

/// Loader worker thread and its channels
pub struct LoadPipeline {
    command_tx: Sender<LoadCommand>,
    event_rx: Receiver<LoadEvent>,
    worker: Option<JoinHandle<()>>,
}

impl LoadPipeline {
    /// Spawn the worker thread
    pub fn start(
        loader: Arc<dyn AssetLoader>,
        resources: GpuResourceTracker,
        channels: LoaderChannels,
    ) -> Result<Self> {
        let LoaderChannels {
            command_tx,
            command_rx,
            event_tx,
            event_rx,
        } = channels;

        let worker = std::thread::Builder::new()
            .name("avatar-loader".to_string())
            .spawn(move || run_worker(loader, resources, command_rx, event_tx))
            .map_err(|e| AvatarError::IOError(format!("failed to spawn loader thread: {}", e)))?;

        Ok(Self {
            command_tx,
            event_rx,
            worker: Some(worker),
        })
    }

    /// Queue a load and return its request id
    pub fn request(&self, config: AvatarConfig) -> Result<Uuid> {
        let request_id = Uuid::new_v4();
        self.command_tx
            .send(LoadCommand::Load { config, request_id })
            .map_err(|e| AvatarError::ChannelError(format!("loader worker gone: {}", e)))?;
        Ok(request_id)
    }

    pub fn cancel(&self) -> Result<()> {
        self.command_tx
            .send(LoadCommand::Cancel)
            .map_err(|e| AvatarError::ChannelError(format!("loader worker gone: {}", e)))
    }

    /// Next pending event, without blocking
    pub fn try_recv(&self) -> Option<LoadEvent> {
        match self.event_rx.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    /// Stop the worker, aborting any in-flight load, and wait for it to exit
    pub fn shutdown(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        let _ = self.command_tx.send(LoadCommand::Shutdown);
        if worker.join().is_err() {
            error!("Loader worker panicked");
        }
        // drain so that any model still queued releases its resources
        while self.event_rx.try_recv().is_ok() {}
    }
}

impl Drop for LoadPipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(
    loader: Arc<dyn AssetLoader>,
    resources: GpuResourceTracker,
    command_rx: Receiver<LoadCommand>,
    event_tx: Sender<LoadEvent>,
) {
    info!("Asset loader worker starting");

    let runtime = match Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            let _ = event_tx.try_send(LoadEvent::Shutdown);
            return;
        }
    };

    let mut in_flight: Option<tokio::task::JoinHandle<()>> = None;

    loop {
        match command_rx.recv() {
            Ok(LoadCommand::Load { config, request_id }) => {
                if let Some(task) = in_flight.take() {
                    if !task.is_finished() {
                        debug!("Aborting superseded load");
                    }
                    task.abort();
                }

                info!("Loading avatar {} from {} ({})", config.id, config.model_url, request_id);
                let load = loader.load(config, resources.clone());
                let event_tx = event_tx.clone();
                in_flight = Some(runtime.spawn(async move {
                    let event = match load.await {
                        Ok(model) => LoadEvent::Loaded { request_id, model },
                        Err(error) => {
                            warn!("Load {} failed: {}", request_id, error);
                            LoadEvent::Failed { request_id, error }
                        }
                    };
                    if event_tx.send(event).is_err() {
                        debug!("Load {} finished after store went away", request_id);
                    }
                }));
            }

            Ok(LoadCommand::Cancel) => {
                if let Some(task) = in_flight.take() {
                    debug!("Cancelling in-flight load");
                    task.abort();
                }
            }

            Ok(LoadCommand::Shutdown) => {
                info!("Asset loader worker shutting down");
                if let Some(task) = in_flight.take() {
                    task.abort();
                }
                let _ = event_tx.try_send(LoadEvent::Shutdown);
                break;
            }

            Err(e) => {
                debug!("Command channel closed: {}", e);
                break;
            }
        }
    }

    runtime.shutdown_background();
    info!("Asset loader worker stopped");
}
