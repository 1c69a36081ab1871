//! Loaded avatar model: skeleton, blend shapes, clips and GPU resources

use crate::animation::ClipLibrary;
use crate::expression::{BlendChannel, ChannelWeights};
use crate::model::resources::{GpuAllocation, ResourceUsage};
use crate::quality::ObjectHandle;
use uuid::Uuid;

/// Joint rotation (unit quaternion)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rotation {
    pub w: f32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Default for Rotation {
    fn default() -> Self {
        Self::identity()
    }
}

impl Rotation {
    pub fn identity() -> Self {
        Self {
            w: 1.0,
            x: 0.0,
            y: 0.0,
            z: 0.0,
        }
    }

    /// Build from a `[w, x, y, z]` array, normalizing
    pub fn from_array(q: [f32; 4]) -> Self {
        Self {
            w: q[0],
            x: q[1],
            y: q[2],
            z: q[3],
        }
        .normalize()
    }

    pub fn from_euler(yaw: f32, pitch: f32, roll: f32) -> Self {
        let cy = (yaw * 0.5).cos();
        let sy = (yaw * 0.5).sin();
        let cp = (pitch * 0.5).cos();
        let sp = (pitch * 0.5).sin();
        let cr = (roll * 0.5).cos();
        let sr = (roll * 0.5).sin();

        Self {
            w: cr * cp * cy + sr * sp * sy,
            x: sr * cp * cy - cr * sp * sy,
            y: cr * sp * cy + sr * cp * sy,
            z: cr * cp * sy - sr * sp * cy,
        }
    }

    pub fn dot(&self, other: &Rotation) -> f32 {
        self.w * other.w + self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// Spherical linear interpolation along the shortest arc
    pub fn slerp(&self, other: &Rotation, t: f32) -> Rotation {
        let t = t.clamp(0.0, 1.0);
        let mut dot = self.dot(other);

        let other = if dot < 0.0 {
            dot = -dot;
            Rotation {
                w: -other.w,
                x: -other.x,
                y: -other.y,
                z: -other.z,
            }
        } else {
            *other
        };

        if dot > 0.9995 {
            return Rotation {
                w: self.w + (other.w - self.w) * t,
                x: self.x + (other.x - self.x) * t,
                y: self.y + (other.y - self.y) * t,
                z: self.z + (other.z - self.z) * t,
            }
            .normalize();
        }

        let theta_0 = dot.acos();
        let theta = theta_0 * t;
        let sin_theta = theta.sin();
        let sin_theta_0 = theta_0.sin();

        let s0 = theta.cos() - dot * sin_theta / sin_theta_0;
        let s1 = sin_theta / sin_theta_0;

        Rotation {
            w: self.w * s0 + other.w * s1,
            x: self.x * s0 + other.x * s1,
            y: self.y * s0 + other.y * s1,
            z: self.z * s0 + other.z * s1,
        }
    }

    pub fn normalize(&self) -> Rotation {
        let len = self.dot(self).sqrt();
        if len < 0.0001 || !len.is_finite() {
            return Rotation::identity();
        }
        Rotation {
            w: self.w / len,
            x: self.x / len,
            y: self.y / len,
            z: self.z / len,
        }
    }

    /// Angle between two rotations in radians
    pub fn angle_to(&self, other: &Rotation) -> f32 {
        2.0 * self.dot(other).abs().min(1.0).acos()
    }
}

/// Skeleton joint
#[derive(Debug, Clone, PartialEq)]
pub struct Bone {
    pub name: String,
    pub parent: Option<usize>,
    pub rest: Rotation,
}

/// Local rotation per bone, indexed like the skeleton
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pose {
    pub rotations: Vec<Rotation>,
}

impl Pose {
    pub fn new(bone_count: usize) -> Self {
        Self {
            rotations: vec![Rotation::identity(); bone_count],
        }
    }

    pub fn len(&self) -> usize {
        self.rotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rotations.is_empty()
    }

    pub fn get(&self, bone: usize) -> Option<&Rotation> {
        self.rotations.get(bone)
    }

    pub fn set(&mut self, bone: usize, rotation: Rotation) {
        if let Some(slot) = self.rotations.get_mut(bone) {
            *slot = rotation;
        }
    }
}

/// Identity of one loaded scene graph. A new load produces a new handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SceneHandle(Uuid);

impl SceneHandle {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SceneHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Renderable part of a model
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    pub name: String,
    pub object: ObjectHandle,
    pub vertex_count: u32,
    pub triangle_count: u32,
}

/// Scene graph root of a loaded model
#[derive(Debug, Clone)]
pub struct SceneGraph {
    handle: SceneHandle,
    pub bones: Vec<Bone>,
    pub meshes: Vec<Mesh>,
    pub pose: Pose,
}

impl SceneGraph {
    pub fn new(bones: Vec<Bone>, meshes: Vec<Mesh>) -> Self {
        let pose = Pose {
            rotations: bones.iter().map(|b| b.rest).collect(),
        };
        Self {
            handle: SceneHandle::new(),
            bones,
            meshes,
            pose,
        }
    }

    pub fn handle(&self) -> SceneHandle {
        self.handle
    }

    pub fn bone_index(&self, name: &str) -> Option<usize> {
        self.bones.iter().position(|b| b.name == name)
    }

    pub fn rest_pose(&self) -> Pose {
        Pose {
            rotations: self.bones.iter().map(|b| b.rest).collect(),
        }
    }

    pub fn triangle_count(&self) -> u64 {
        self.meshes.iter().map(|m| m.triangle_count as u64).sum()
    }
}

/// A fully loaded avatar
///
/// Owns its GPU allocations; dropping the model releases them.
#[derive(Debug)]
pub struct AvatarModel {
    config_id: String,
    scene: SceneGraph,
    blend_shapes: Vec<String>,
    blend_weights: Vec<f32>,
    /// Blend-shape index for each [`BlendChannel`], if the model has it
    channel_map: Vec<Option<usize>>,
    clips: ClipLibrary,
    allocations: Vec<GpuAllocation>,
}

impl AvatarModel {
    pub fn new(
        config_id: impl Into<String>,
        scene: SceneGraph,
        blend_shapes: Vec<String>,
        clips: ClipLibrary,
        allocations: Vec<GpuAllocation>,
    ) -> Self {
        let channel_map = BlendChannel::all()
            .iter()
            .map(|c| {
                blend_shapes
                    .iter()
                    .position(|s| s.eq_ignore_ascii_case(c.shape_name()))
            })
            .collect();
        let blend_weights = vec![0.0; blend_shapes.len()];

        Self {
            config_id: config_id.into(),
            scene,
            blend_shapes,
            blend_weights,
            channel_map,
            clips,
            allocations,
        }
    }

    pub fn config_id(&self) -> &str {
        &self.config_id
    }

    pub fn scene(&self) -> &SceneGraph {
        &self.scene
    }

    pub fn blend_shapes(&self) -> &[String] {
        &self.blend_shapes
    }

    pub fn blend_weights(&self) -> &[f32] {
        &self.blend_weights
    }

    pub fn clips(&self) -> &ClipLibrary {
        &self.clips
    }

    pub fn object_handles(&self) -> Vec<ObjectHandle> {
        self.scene.meshes.iter().map(|m| m.object).collect()
    }

    /// Whether the model exposes a blend shape for `channel`
    pub fn supports_channel(&self, channel: BlendChannel) -> bool {
        self.channel_map[channel as usize].is_some()
    }

    /// Write expression weights into the model's blend shapes
    pub fn apply_expression(&mut self, weights: &ChannelWeights) {
        for (channel, weight) in weights.iter() {
            if let Some(index) = self.channel_map[channel as usize] {
                self.blend_weights[index] = weight;
            }
        }
    }

    /// Replace the current pose. Mismatched lengths are copied up to the shorter one.
    pub fn set_pose(&mut self, pose: &Pose) {
        for (slot, rotation) in self.scene.pose.rotations.iter_mut().zip(pose.rotations.iter()) {
            *slot = *rotation;
        }
    }

    pub fn resource_usage(&self) -> ResourceUsage {
        let mut usage = ResourceUsage::default();
        for allocation in &self.allocations {
            if allocation.kind().is_texture() {
                usage.textures += 1;
            } else {
                usage.buffers += 1;
            }
            usage.bytes += allocation.bytes();
        }
        usage
    }

    /// Release GPU resources and consume the model
    pub fn dispose(mut self) -> ResourceUsage {
        let released = self.resource_usage();
        self.allocations.clear();
        released
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::resources::{GpuResourceTracker, ResourceKind};

    fn test_model(tracker: &GpuResourceTracker) -> AvatarModel {
        let bones = vec![
            Bone {
                name: "root".to_string(),
                parent: None,
                rest: Rotation::identity(),
            },
            Bone {
                name: "head".to_string(),
                parent: Some(0),
                rest: Rotation::identity(),
            },
        ];
        let scene = SceneGraph::new(bones, Vec::new());
        let allocations = vec![
            tracker.allocate(ResourceKind::VertexBuffer, 100),
            tracker.allocate(ResourceKind::Texture, 200),
        ];
        AvatarModel::new(
            "test",
            scene,
            vec!["mouthSmile".to_string(), "viseme_aa".to_string()],
            ClipLibrary::new(),
            allocations,
        )
    }

    #[test]
    fn test_rotation_slerp_endpoints() {
        let a = Rotation::identity();
        let b = Rotation::from_euler(1.0, 0.0, 0.0);

        assert!(a.slerp(&b, 0.0).angle_to(&a) < 1e-3);
        assert!(a.slerp(&b, 1.0).angle_to(&b) < 1e-3);

        let mid = a.slerp(&b, 0.5);
        assert!((mid.angle_to(&a) - 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_rotation_normalize_degenerate() {
        let zero = Rotation::from_array([0.0, 0.0, 0.0, 0.0]);
        assert_eq!(zero, Rotation::identity());
    }

    #[test]
    fn test_apply_expression_maps_channels() {
        let tracker = GpuResourceTracker::new();
        let mut model = test_model(&tracker);
        assert!(model.supports_channel(BlendChannel::MouthSmile));
        assert!(!model.supports_channel(BlendChannel::EyeWide));

        let weights = ChannelWeights::from_pairs(&[
            (BlendChannel::MouthSmile, 0.6),
            (BlendChannel::VisemeAA, 0.3),
            (BlendChannel::EyeWide, 1.0),
        ]);
        model.apply_expression(&weights);
        assert_eq!(model.blend_weights(), &[0.6, 0.3]);
    }

    #[test]
    fn test_dispose_releases_resources() {
        let tracker = GpuResourceTracker::new();
        let model = test_model(&tracker);
        assert_eq!(tracker.usage().buffers, 1);

        let released = model.dispose();
        assert_eq!(released.buffers, 1);
        assert_eq!(released.textures, 1);
        assert!(tracker.usage().is_empty());
    }

    #[test]
    fn test_scene_handles_unique() {
        let a = SceneGraph::new(Vec::new(), Vec::new());
        let b = SceneGraph::new(Vec::new(), Vec::new());
        assert_ne!(a.handle(), b.handle());
    }
}
