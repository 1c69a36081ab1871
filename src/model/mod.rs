//! Avatar model store: assets, loading and GPU resource ownership

pub mod asset;
pub mod loader;
pub mod manifest;
pub mod resources;
pub mod store;

pub use asset::{AvatarModel, Bone, Mesh, Pose, Rotation, SceneGraph, SceneHandle};
pub use loader::{AssetLoader, InMemoryLoader, LoadCommand, LoadEvent, LoadPipeline, ManifestFileLoader};
pub use manifest::ModelManifest;
pub use resources::{GpuAllocation, GpuResourceTracker, ResourceKind, ResourceUsage};
pub use store::{ModelStore, StoreEvent};
