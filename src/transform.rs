//! Local transform state for scene nodes.
//!
//! A [`Transform`] holds the decomposed local transform (position, rotation
//! as quaternion with an Euler mirror, scale), the composed local matrix and
//! the propagated world matrix. Component setters flag the world matrix
//! dirty; [`crate::scene::Scene::update_matrix_world`] performs the actual
//! propagation so that a node's world matrix is always
//! `parent.world * local` along the root chain.

use cgmath::{
    Euler, InnerSpace, Matrix3, Matrix4, One, Quaternion, Rad, SquareMatrix, Vector3, Zero,
};

#[derive(Clone, Debug)]
pub struct Transform {
    position: Vector3<f32>,
    quaternion: Quaternion<f32>,
    rotation: Euler<Rad<f32>>,
    scale: Vector3<f32>,
    up: Vector3<f32>,
    matrix: Matrix4<f32>,
    world_matrix: Matrix4<f32>,
    /// When false the caller manages the local matrix directly via
    /// [`Transform::set_matrix`] and component fields are ignored.
    pub matrix_auto_update: bool,
    pub(crate) world_dirty: bool,
}

impl Transform {
    pub fn new() -> Self {
        Self {
            position: Vector3::zero(),
            quaternion: Quaternion::one(),
            rotation: Euler::new(Rad(0.0), Rad(0.0), Rad(0.0)),
            scale: Vector3::new(1.0, 1.0, 1.0),
            up: Vector3::unit_y(),
            matrix: Matrix4::identity(),
            world_matrix: Matrix4::identity(),
            matrix_auto_update: true,
            world_dirty: true,
        }
    }

    pub fn position(&self) -> Vector3<f32> {
        self.position
    }

    pub fn quaternion(&self) -> Quaternion<f32> {
        self.quaternion
    }

    /// Euler mirror of the rotation, kept in sync with the quaternion.
    pub fn rotation(&self) -> Euler<Rad<f32>> {
        self.rotation
    }

    pub fn scale(&self) -> Vector3<f32> {
        self.scale
    }

    pub fn up(&self) -> Vector3<f32> {
        self.up
    }

    /// Composed local matrix. Stale until [`Transform::compose`] or a world
    /// update ran after the last component change.
    pub fn matrix(&self) -> Matrix4<f32> {
        self.matrix
    }

    /// World matrix as of the last propagation pass.
    pub fn world_matrix(&self) -> Matrix4<f32> {
        self.world_matrix
    }

    /// World-space translation as of the last propagation pass.
    pub fn world_position(&self) -> Vector3<f32> {
        self.world_matrix.w.truncate()
    }

    pub fn set_position(&mut self, position: Vector3<f32>) {
        self.position = position;
        self.world_dirty = true;
    }

    pub fn set_quaternion(&mut self, quaternion: Quaternion<f32>) {
        self.quaternion = quaternion;
        self.rotation = Euler::from(quaternion);
        self.world_dirty = true;
    }

    pub fn set_rotation(&mut self, rotation: Euler<Rad<f32>>) {
        self.rotation = rotation;
        self.quaternion = Quaternion::from(rotation);
        self.world_dirty = true;
    }

    pub fn set_scale(&mut self, scale: Vector3<f32>) {
        self.scale = scale;
        self.world_dirty = true;
    }

    pub fn set_up(&mut self, up: Vector3<f32>) {
        self.up = up;
    }

    /// Replace the local matrix directly. Meant for nodes with
    /// `matrix_auto_update` disabled; the decomposed components are not
    /// refreshed automatically, call [`Transform::decompose`] if needed.
    pub fn set_matrix(&mut self, matrix: Matrix4<f32>) {
        self.matrix = matrix;
        self.world_dirty = true;
    }

    pub(crate) fn set_world_matrix(&mut self, world: Matrix4<f32>) {
        self.world_matrix = world;
    }

    /// Rebuild the local matrix from position, quaternion and scale.
    pub fn compose(&mut self) {
        self.matrix = Matrix4::from_translation(self.position)
            * Matrix4::from(self.quaternion)
            * Matrix4::from_nonuniform_scale(self.scale.x, self.scale.y, self.scale.z);
        self.world_dirty = true;
    }

    /// Refresh position, quaternion and scale from the local matrix.
    pub fn decompose(&mut self) {
        self.position = self.matrix.w.truncate();
        let sx = self.matrix.x.truncate().magnitude();
        let sy = self.matrix.y.truncate().magnitude();
        let sz = self.matrix.z.truncate().magnitude();
        self.scale = Vector3::new(sx, sy, sz);
        let rot = Matrix3::from_cols(
            self.matrix.x.truncate() / sx.max(f32::EPSILON),
            self.matrix.y.truncate() / sy.max(f32::EPSILON),
            self.matrix.z.truncate() / sz.max(f32::EPSILON),
        );
        self.quaternion = Quaternion::from(rot);
        self.rotation = Euler::from(self.quaternion);
        self.world_dirty = true;
    }

    /// Orient the rotation so -Z (+Z when `invert`) faces `target`, using
    /// `up` as the reference axis.
    pub fn look_at(&mut self, target: Vector3<f32>, invert: bool) {
        let dir = if invert {
            target - self.position
        } else {
            self.position - target
        };
        let mut z = if dir.magnitude2() > 0.0 {
            dir.normalize()
        } else {
            Vector3::unit_z()
        };
        let mut x = self.up.cross(z);
        if x.magnitude2() == 0.0 {
            // Up is parallel to the view direction, nudge z off-axis.
            z.z += 1.0e-4;
            z = z.normalize();
            x = self.up.cross(z);
        }
        let x = x.normalize();
        let y = z.cross(x);
        self.set_quaternion(Quaternion::from(Matrix3::from_cols(x, y, z)));
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::new()
    }
}
