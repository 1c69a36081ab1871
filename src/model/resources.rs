//! GPU resource accounting
//!
//! Every buffer or texture a model uploads is represented by a
//! [`GpuAllocation`]. Dropping the allocation releases it, so a model that is
//! superseded, aborted mid-load or disposed cannot leak.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Kind of GPU-resident resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    VertexBuffer,
    IndexBuffer,
    MorphTargetBuffer,
    Texture,
}

impl ResourceKind {
    pub fn is_texture(&self) -> bool {
        matches!(self, ResourceKind::Texture)
    }
}

#[derive(Debug, Default)]
struct Counters {
    buffers: AtomicUsize,
    textures: AtomicUsize,
    bytes: AtomicU64,
}

/// Point-in-time view of live GPU resources
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceUsage {
    pub buffers: usize,
    pub textures: usize,
    pub bytes: u64,
}

impl ResourceUsage {
    pub fn is_empty(&self) -> bool {
        self.buffers == 0 && self.textures == 0
    }
}

/// Shared counter of live GPU resources
///
/// Cloning yields another handle to the same counters.
#[derive(Debug, Clone, Default)]
pub struct GpuResourceTracker {
    counters: Arc<Counters>,
}

impl GpuResourceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an upload and return its owning handle
    pub fn allocate(&self, kind: ResourceKind, bytes: u64) -> GpuAllocation {
        if kind.is_texture() {
            self.counters.textures.fetch_add(1, Ordering::SeqCst);
        } else {
            self.counters.buffers.fetch_add(1, Ordering::SeqCst);
        }
        self.counters.bytes.fetch_add(bytes, Ordering::SeqCst);

        GpuAllocation {
            kind,
            bytes,
            counters: Arc::clone(&self.counters),
        }
    }

    pub fn usage(&self) -> ResourceUsage {
        ResourceUsage {
            buffers: self.counters.buffers.load(Ordering::SeqCst),
            textures: self.counters.textures.load(Ordering::SeqCst),
            bytes: self.counters.bytes.load(Ordering::SeqCst),
        }
    }
}

/// Owning handle for one GPU resource. Released on drop.
#[derive(Debug)]
pub struct GpuAllocation {
    kind: ResourceKind,
    bytes: u64,
    counters: Arc<Counters>,
}

impl GpuAllocation {
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }
}

impl Drop for GpuAllocation {
    fn drop(&mut self) {
        if self.kind.is_texture() {
            self.counters.textures.fetch_sub(1, Ordering::SeqCst);
        } else {
            self.counters.buffers.fetch_sub(1, Ordering::SeqCst);
        }
        self.counters.bytes.fetch_sub(self.bytes, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocation_counts() {
        let tracker = GpuResourceTracker::new();
        let vb = tracker.allocate(ResourceKind::VertexBuffer, 1024);
        let tex = tracker.allocate(ResourceKind::Texture, 4096);

        let usage = tracker.usage();
        assert_eq!(usage.buffers, 1);
        assert_eq!(usage.textures, 1);
        assert_eq!(usage.bytes, 5120);

        drop(vb);
        assert_eq!(tracker.usage().buffers, 0);
        assert_eq!(tracker.usage().bytes, 4096);

        drop(tex);
        assert!(tracker.usage().is_empty());
        assert_eq!(tracker.usage().bytes, 0);
    }

    #[test]
    fn test_clones_share_counters() {
        let tracker = GpuResourceTracker::new();
        let other = tracker.clone();
        let _ib = other.allocate(ResourceKind::IndexBuffer, 64);
        assert_eq!(tracker.usage().buffers, 1);
    }
}
