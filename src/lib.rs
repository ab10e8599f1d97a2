//! glint
//!
//! A thin state-diffing 3D renderer core. The crate models the stateful
//! graphics context as an explicit cache, tracks scene and shader state on
//! the CPU side and emits the minimal sequence of device calls to draw a
//! frame. It is deliberately backend-agnostic: everything GPU-shaped goes
//! through the [`device::Device`] trait.
//!
//! High-level modules
//! - `device`: the abstract device boundary plus a headless recording backend
//! - `transform`: decomposed local transforms with matrix composition
//! - `scene`: arena-backed scene graph, meshes and world-matrix propagation
//! - `camera`: projection/view matrices, frustum extraction and culling
//! - `geometry`: named attribute buffers, vertex bindings and draw dispatch
//! - `program`: shader compilation, uniform diffing and texture units
//! - `texture` / `target`: texture references and offscreen render targets
//! - `renderer`: the state cache and per-frame submission
//!

pub mod camera;
pub mod device;
pub mod geometry;
pub mod program;
pub mod renderer;
pub mod scene;
pub mod target;
pub mod texture;
pub mod transform;

// Re-exports of the types most downstream code touches.
pub use camera::Camera;
pub use device::{Capabilities, Device, DeviceError, DrawMode};
pub use geometry::{Attribute, AttributeData, Geometry};
pub use program::{Program, UniformValue};
pub use renderer::{RenderOptions, Renderer};
pub use scene::{Mesh, Node, NodeId, Scene};
pub use target::RenderTarget;
pub use texture::Texture;
pub use transform::Transform;

// Math re-exports so callers do not need a direct cgmath dependency for the
// common cases.
pub use cgmath::{Deg, Euler, Matrix3, Matrix4, Quaternion, Rad, Vector2, Vector3, Vector4};
