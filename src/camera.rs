//! Camera: projection/view matrices, frustum culling and (un)projection.
//!
//! A [`Camera`] owns its own [`Transform`] and may optionally be bound to a
//! scene node; when bound and the node is alive, the node's propagated world
//! matrix wins, otherwise the camera updates standalone as a graph root.
//! The view matrix is the inverse of the world matrix and the combined
//! projection-view matrix is rebuilt once per update, it is only guaranteed
//! current right after [`Camera::update_matrix_world`].

use cgmath::{Deg, InnerSpace, Matrix4, SquareMatrix, Vector3, Vector4, ortho, perspective};

use crate::scene::{NodeId, Scene};
use crate::transform::Transform;

/// Plane indices into the frustum array.
const LEFT: usize = 0;
const RIGHT: usize = 1;
const BOTTOM: usize = 2;
const TOP: usize = 3;
const NEAR: usize = 4;
const FAR: usize = 5;

/// One half-space boundary of the view volume, `normal . p + constant >= 0`
/// inside.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Plane {
    pub normal: Vector3<f32>,
    pub constant: f32,
}

impl Plane {
    /// Signed distance from a point to the plane.
    pub fn distance(&self, point: Vector3<f32>) -> f32 {
        self.normal.dot(point) + self.constant
    }
}

/// Which projection populated the matrix last; the two are mutually
/// exclusive.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Projection {
    Perspective {
        fov_y: Deg<f32>,
        aspect: f32,
        near: f32,
        far: f32,
    },
    Orthographic {
        left: f32,
        right: f32,
        bottom: f32,
        top: f32,
        near: f32,
        far: f32,
    },
}

pub struct Camera {
    pub transform: Transform,
    /// Scene node driving this camera's world matrix, if any.
    pub node: Option<NodeId>,
    projection: Projection,
    projection_matrix: Matrix4<f32>,
    view_matrix: Matrix4<f32>,
    projection_view_matrix: Matrix4<f32>,
    frustum: [Plane; 6],
}

impl Camera {
    /// A perspective camera; see [`Camera::perspective`] for the parameters.
    pub fn new(fov_y: Deg<f32>, aspect: f32, near: f32, far: f32) -> Self {
        let mut camera = Self {
            transform: Transform::new(),
            node: None,
            projection: Projection::Perspective {
                fov_y,
                aspect,
                near,
                far,
            },
            projection_matrix: Matrix4::identity(),
            view_matrix: Matrix4::identity(),
            projection_view_matrix: Matrix4::identity(),
            frustum: [Plane {
                normal: Vector3::unit_z(),
                constant: 0.0,
            }; 6],
        };
        camera.perspective(fov_y, aspect, near, far);
        camera
    }

    pub fn perspective(&mut self, fov_y: Deg<f32>, aspect: f32, near: f32, far: f32) {
        self.projection = Projection::Perspective {
            fov_y,
            aspect,
            near,
            far,
        };
        self.projection_matrix = perspective(fov_y, aspect, near, far);
    }

    pub fn orthographic(
        &mut self,
        left: f32,
        right: f32,
        bottom: f32,
        top: f32,
        near: f32,
        far: f32,
    ) {
        self.projection = Projection::Orthographic {
            left,
            right,
            bottom,
            top,
            near,
            far,
        };
        self.projection_matrix = ortho(left, right, bottom, top, near, far);
    }

    pub fn projection(&self) -> Projection {
        self.projection
    }

    pub fn projection_matrix(&self) -> Matrix4<f32> {
        self.projection_matrix
    }

    pub fn view_matrix(&self) -> Matrix4<f32> {
        self.view_matrix
    }

    pub fn projection_view_matrix(&self) -> Matrix4<f32> {
        self.projection_view_matrix
    }

    pub fn world_matrix(&self) -> Matrix4<f32> {
        self.transform.world_matrix()
    }

    /// World-space camera position as of the last update.
    pub fn world_position(&self) -> Vector3<f32> {
        self.transform.world_position()
    }

    /// Refresh world, view and projection-view matrices. When bound to a
    /// live node of `scene` the node's world matrix is adopted; otherwise
    /// the camera's own transform is treated as a root.
    pub fn update_matrix_world(&mut self, scene: Option<&Scene>) {
        let bound_world = self
            .node
            .zip(scene)
            .and_then(|(id, scene)| scene.world_matrix(id));
        let world = match bound_world {
            Some(world) => world,
            None => {
                if self.transform.matrix_auto_update {
                    self.transform.compose();
                }
                self.transform.world_dirty = false;
                self.transform.matrix()
            }
        };
        self.transform.set_world_matrix(world);
        self.view_matrix = world.invert().unwrap_or_else(Matrix4::identity);
        self.projection_view_matrix = self.projection_matrix * self.view_matrix;
    }

    /// World space to normalized device coordinates.
    pub fn project(&self, point: Vector3<f32>) -> Vector3<f32> {
        let eye = apply_matrix4(&self.view_matrix, point);
        apply_matrix4(&self.projection_matrix, eye)
    }

    /// Normalized device coordinates back to world space, for mouse rays.
    pub fn unproject(&self, point: Vector3<f32>) -> Vector3<f32> {
        let inv_projection = self
            .projection_matrix
            .invert()
            .unwrap_or_else(Matrix4::identity);
        let eye = apply_matrix4(&inv_projection, point);
        apply_matrix4(&self.transform.world_matrix(), eye)
    }

    /// Extract the six frustum planes from the projection-view matrix
    /// (Gribb-Hartmann row combinations), normalized.
    pub fn update_frustum(&mut self) {
        let m = &self.projection_view_matrix;
        let row = |i: usize| Vector4::new(m.x[i], m.y[i], m.z[i], m.w[i]);
        let (r0, r1, r2, r3) = (row(0), row(1), row(2), row(3));

        self.frustum[LEFT] = plane_from(r3 + r0);
        self.frustum[RIGHT] = plane_from(r3 - r0);
        self.frustum[BOTTOM] = plane_from(r3 + r1);
        self.frustum[TOP] = plane_from(r3 - r1);
        self.frustum[NEAR] = plane_from(r3 + r2);
        self.frustum[FAR] = plane_from(r3 - r2);
    }

    pub fn frustum(&self) -> &[Plane; 6] {
        &self.frustum
    }

    /// Conservative sphere-frustum test: rejected only when the sphere is
    /// fully behind some plane (`distance < -radius`); a sphere touching a
    /// plane exactly (`distance == -radius`) is retained. False positives
    /// near corners are acceptable for culling.
    pub fn frustum_intersects_sphere(&self, center: Vector3<f32>, radius: f32) -> bool {
        self.frustum
            .iter()
            .all(|plane| plane.distance(center) >= -radius)
    }

    /// Sphere test against a mesh node's cached geometry bounds: the bound
    /// center goes through the node's world matrix and the radius scales by
    /// the largest axis scale. Geometry without a position attribute is
    /// never culled.
    pub fn frustum_intersects_mesh(&self, scene: &Scene, id: NodeId) -> bool {
        let Some(node) = scene.node(id) else {
            return false;
        };
        let Some(mesh) = node.mesh.as_ref() else {
            return false;
        };
        let Some(bounds) = mesh.geometry.borrow_mut().bounding_sphere() else {
            return true;
        };

        let world = node.transform.world_matrix();
        let center = (world * bounds.center.extend(1.0)).truncate();
        let max_scale = world
            .x
            .truncate()
            .magnitude()
            .max(world.y.truncate().magnitude())
            .max(world.z.truncate().magnitude());
        self.frustum_intersects_sphere(center, bounds.radius * max_scale)
    }
}

fn plane_from(row: Vector4<f32>) -> Plane {
    let normal = row.truncate();
    let len = normal.magnitude();
    if len > 0.0 {
        Plane {
            normal: normal / len,
            constant: row.w / len,
        }
    } else {
        Plane {
            normal: Vector3::unit_z(),
            constant: 0.0,
        }
    }
}

/// Transform a point through a matrix with perspective divide.
fn apply_matrix4(m: &Matrix4<f32>, v: Vector3<f32>) -> Vector3<f32> {
    let out = m * v.extend(1.0);
    if out.w != 0.0 {
        out.truncate() / out.w
    } else {
        out.truncate()
    }
}
