//! Declarative avatar asset manifest
//!
//! A manifest describes a rig: skeleton, blend shapes, meshes with their
//! textures, and animation clips. It is validated as a whole before any GPU
//! resource is allocated for it.

use crate::animation::{AnimationClip, BoneTrack, ClipLibrary, Keyframe, PlaybackMode};
use crate::error::AssetError;
use crate::expression::BlendChannel;
use crate::model::asset::{AvatarModel, Bone, Mesh, Rotation, SceneGraph};
use crate::model::resources::{GpuResourceTracker, ResourceKind};
use crate::quality::ObjectHandle;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Manifest format this crate reads
pub const MANIFEST_FORMAT_VERSION: u32 = 1;

/// Bytes per vertex: position, normal, uv
const VERTEX_STRIDE: u64 = 32;
const INDEX_SIZE: u64 = 4;
/// Bytes per vertex per morph target: position delta
const MORPH_STRIDE: u64 = 12;
const TEXTURE_BYTES: u64 = 1024 * 1024 * 4;

fn default_format_version() -> u32 {
    MANIFEST_FORMAT_VERSION
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoneSpec {
    pub name: String,
    /// Must name a bone declared earlier
    #[serde(default)]
    pub parent: Option<String>,
    /// Rest rotation as `[w, x, y, z]`
    #[serde(default)]
    pub rest: Option<[f32; 4]>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshSpec {
    pub name: String,
    pub vertex_count: u32,
    pub index_count: u32,
    #[serde(default)]
    pub textures: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeySpec {
    pub time: f32,
    pub rotation: [f32; 4],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackSpec {
    pub bone: String,
    pub keys: Vec<KeySpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipSpec {
    pub name: String,
    pub duration: f32,
    /// Overrides the name-based default
    #[serde(default)]
    pub looping: Option<bool>,
    #[serde(default)]
    pub tracks: Vec<TrackSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelManifest {
    #[serde(default = "default_format_version")]
    pub format_version: u32,
    #[serde(default)]
    pub bones: Vec<BoneSpec>,
    #[serde(default)]
    pub blend_shapes: Vec<String>,
    #[serde(default)]
    pub meshes: Vec<MeshSpec>,
    #[serde(default)]
    pub clips: Vec<ClipSpec>,
}

impl ModelManifest {
    pub fn from_json(content: &str) -> Result<Self, AssetError> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn to_json(&self) -> Result<String, AssetError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check internal consistency without allocating anything
    pub fn validate(&self) -> Result<(), AssetError> {
        if self.format_version != MANIFEST_FORMAT_VERSION {
            return Err(AssetError::UnsupportedFormat(format!(
                "manifest version {} (expected {})",
                self.format_version, MANIFEST_FORMAT_VERSION
            )));
        }

        let mut seen = HashSet::new();
        for bone in &self.bones {
            if let Some(parent) = &bone.parent {
                if !seen.contains(parent.as_str()) {
                    return Err(AssetError::Malformed(format!(
                        "bone '{}' references parent '{}' before it is declared",
                        bone.name, parent
                    )));
                }
            }
            if !seen.insert(bone.name.as_str()) {
                return Err(AssetError::Malformed(format!("duplicate bone '{}'", bone.name)));
            }
        }

        let mut shapes = HashSet::new();
        for shape in &self.blend_shapes {
            if !shapes.insert(shape.as_str()) {
                return Err(AssetError::Malformed(format!("duplicate blend shape '{}'", shape)));
            }
        }

        for mesh in &self.meshes {
            if mesh.index_count % 3 != 0 {
                return Err(AssetError::Malformed(format!(
                    "mesh '{}' index count {} is not a multiple of 3",
                    mesh.name, mesh.index_count
                )));
            }
        }

        for clip in &self.clips {
            if !clip.duration.is_finite() || clip.duration < 0.0 {
                return Err(AssetError::Malformed(format!(
                    "clip '{}' has invalid duration {}",
                    clip.name, clip.duration
                )));
            }
            for track in &clip.tracks {
                if !seen.contains(track.bone.as_str()) {
                    return Err(AssetError::Malformed(format!(
                        "clip '{}' animates unknown bone '{}'",
                        clip.name, track.bone
                    )));
                }
                if let Some(key) = track
                    .keys
                    .iter()
                    .find(|k| !k.time.is_finite() || k.time < 0.0 || k.time > clip.duration)
                {
                    return Err(AssetError::Malformed(format!(
                        "clip '{}' has key at {} outside 0..={}",
                        clip.name, key.time, clip.duration
                    )));
                }
            }
        }

        Ok(())
    }

    /// Validate and build a model, allocating its GPU resources on `resources`
    pub fn instantiate(
        &self,
        config_id: &str,
        resources: &GpuResourceTracker,
    ) -> Result<AvatarModel, AssetError> {
        self.validate()?;

        let bone_index = |name: &str| self.bones.iter().position(|b| b.name == name);

        let bones = self
            .bones
            .iter()
            .map(|spec| Bone {
                name: spec.name.clone(),
                parent: spec.parent.as_deref().and_then(bone_index),
                rest: spec.rest.map(Rotation::from_array).unwrap_or_default(),
            })
            .collect();

        let mut allocations = Vec::new();
        let mut meshes = Vec::with_capacity(self.meshes.len());
        for spec in &self.meshes {
            let vertices = spec.vertex_count as u64;
            allocations.push(resources.allocate(ResourceKind::VertexBuffer, vertices * VERTEX_STRIDE));
            allocations.push(
                resources.allocate(ResourceKind::IndexBuffer, spec.index_count as u64 * INDEX_SIZE),
            );
            if !self.blend_shapes.is_empty() {
                let bytes = vertices * MORPH_STRIDE * self.blend_shapes.len() as u64;
                allocations.push(resources.allocate(ResourceKind::MorphTargetBuffer, bytes));
            }
            for _ in &spec.textures {
                allocations.push(resources.allocate(ResourceKind::Texture, TEXTURE_BYTES));
            }
            meshes.push(Mesh {
                name: spec.name.clone(),
                object: ObjectHandle::next(),
                vertex_count: spec.vertex_count,
                triangle_count: spec.index_count / 3,
            });
        }

        let clips = self
            .clips
            .iter()
            .map(|spec| {
                let tracks = spec
                    .tracks
                    .iter()
                    .filter_map(|track| {
                        let bone = bone_index(track.bone.as_str())?;
                        let keys = track
                            .keys
                            .iter()
                            .map(|k| Keyframe {
                                time: k.time,
                                rotation: Rotation::from_array(k.rotation),
                            })
                            .collect();
                        Some(BoneTrack::new(bone, keys))
                    })
                    .collect();
                let clip = AnimationClip::new(spec.name.clone(), spec.duration, tracks);
                match spec.looping {
                    Some(true) => clip.with_mode(PlaybackMode::Loop),
                    Some(false) => clip.with_mode(PlaybackMode::Once),
                    None => clip,
                }
            })
            .collect::<ClipLibrary>();

        Ok(AvatarModel::new(
            config_id,
            SceneGraph::new(bones, meshes),
            self.blend_shapes.clone(),
            clips,
            allocations,
        ))
    }

    /// A small head-and-shoulders rig with every expression channel and the
    /// standard clip set
    pub fn demo() -> Self {
        let bone = |name: &str, parent: Option<&str>| BoneSpec {
            name: name.to_string(),
            parent: parent.map(str::to_string),
            rest: None,
        };
        let key = |time: f32, yaw: f32, pitch: f32, roll: f32| {
            let r = Rotation::from_euler(yaw, pitch, roll);
            KeySpec {
                time,
                rotation: [r.w, r.x, r.y, r.z],
            }
        };
        let head_clip = |name: &str, duration: f32, keys: Vec<KeySpec>| ClipSpec {
            name: name.to_string(),
            duration,
            looping: None,
            tracks: vec![TrackSpec {
                bone: "head".to_string(),
                keys,
            }],
        };

        Self {
            format_version: MANIFEST_FORMAT_VERSION,
            bones: vec![
                bone("hips", None),
                bone("spine", Some("hips")),
                bone("neck", Some("spine")),
                bone("head", Some("neck")),
            ],
            blend_shapes: BlendChannel::all()
                .iter()
                .map(|c| c.shape_name().to_string())
                .collect(),
            meshes: vec![
                MeshSpec {
                    name: "body".to_string(),
                    vertex_count: 12_000,
                    index_count: 60_000,
                    textures: vec!["body_albedo".to_string(), "body_normal".to_string()],
                },
                MeshSpec {
                    name: "head".to_string(),
                    vertex_count: 8_000,
                    index_count: 42_000,
                    textures: vec!["face_albedo".to_string()],
                },
            ],
            clips: vec![
                head_clip(
                    "idle",
                    4.0,
                    vec![key(0.0, 0.0, 0.0, 0.0), key(2.0, 0.05, 0.02, 0.0), key(4.0, 0.0, 0.0, 0.0)],
                ),
                head_clip(
                    "talking",
                    1.2,
                    vec![key(0.0, 0.0, 0.0, 0.0), key(0.6, -0.08, 0.05, 0.03), key(1.2, 0.0, 0.0, 0.0)],
                ),
                head_clip(
                    "thinking",
                    3.0,
                    vec![key(0.0, 0.0, 0.0, 0.0), key(1.5, 0.2, -0.1, 0.1), key(3.0, 0.0, 0.0, 0.0)],
                ),
                head_clip(
                    "greeting",
                    1.5,
                    vec![key(0.0, 0.0, 0.0, 0.0), key(0.5, 0.0, 0.0, 0.2), key(1.5, 0.0, 0.0, 0.0)],
                ),
                head_clip(
                    "nodding",
                    1.0,
                    vec![
                        key(0.0, 0.0, 0.0, 0.0),
                        key(0.25, 0.0, 0.3, 0.0),
                        key(0.5, 0.0, 0.0, 0.0),
                        key(0.75, 0.0, 0.3, 0.0),
                        key(1.0, 0.0, 0.0, 0.0),
                    ],
                ),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_instantiates() {
        let tracker = GpuResourceTracker::new();
        let model = ModelManifest::demo().instantiate("demo", &tracker).unwrap();

        // 2 meshes * (vertex + index + morph) buffers, 3 textures
        let usage = tracker.usage();
        assert_eq!(usage.buffers, 6);
        assert_eq!(usage.textures, 3);
        assert_eq!(model.resource_usage(), usage);

        assert_eq!(model.scene().bones.len(), 4);
        assert_eq!(model.scene().bones[3].parent, Some(2));
        assert!(model.supports_channel(BlendChannel::VisemeOH));
        assert_eq!(
            model.clips().names(),
            vec!["greeting", "idle", "nodding", "talking", "thinking"]
        );
        assert!(model.clips().get("idle").unwrap().is_looping());
        assert!(!model.clips().get("greeting").unwrap().is_looping());
    }

    #[test]
    fn test_minimal_json_defaults() {
        let manifest = ModelManifest::from_json(r#"{"bones": [{"name": "root"}]}"#).unwrap();
        assert_eq!(manifest.format_version, MANIFEST_FORMAT_VERSION);
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_parent_must_be_declared_first() {
        let manifest = ModelManifest::from_json(
            r#"{"bones": [{"name": "head", "parent": "neck"}, {"name": "neck"}]}"#,
        )
        .unwrap();
        assert!(matches!(manifest.validate(), Err(AssetError::Malformed(_))));
    }

    #[test]
    fn test_track_on_unknown_bone() {
        let mut manifest = ModelManifest::demo();
        manifest.clips[0].tracks[0].bone = "tail".to_string();
        let err = manifest.validate().unwrap_err();
        assert!(err.cause().contains("tail"));
    }

    #[test]
    fn test_invalid_manifest_allocates_nothing() {
        let tracker = GpuResourceTracker::new();
        let mut manifest = ModelManifest::demo();
        manifest.meshes[0].index_count = 100;

        assert!(manifest.instantiate("bad", &tracker).is_err());
        assert!(tracker.usage().is_empty());
    }

    #[test]
    fn test_future_version_unsupported() {
        let manifest = ModelManifest {
            format_version: 7,
            ..ModelManifest::demo()
        };
        assert!(matches!(manifest.validate(), Err(AssetError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_looping_override() {
        let mut manifest = ModelManifest::demo();
        manifest.clips[3].looping = Some(true);
        let model = manifest.instantiate("demo", &GpuResourceTracker::new()).unwrap();
        assert!(model.clips().get("greeting").unwrap().is_looping());
    }
}
