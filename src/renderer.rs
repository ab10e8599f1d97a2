//! Renderer: cached device state and frame submission.
//!
//! The [`Renderer`] owns the [`Device`] and a [`StateCache`] shadowing every
//! piece of device state the core touches. All state mutation goes through
//! the cache-checked setters on this type; a setter only reaches the device
//! when the requested value differs from the shadowed one, so issuing the
//! same state twice costs one underlying call. A `None` cache slot means
//! unknown and always issues the call.
//!
//! [`Renderer::render`] drives a full frame: target/viewport setup, optional
//! clear, matrix propagation, frustum update, render-list construction
//! (visibility pruning, frustum culling, depth partition and sort) and
//! per-node draw submission with the automatic matrix uniforms filled in.

use cgmath::{Matrix, Matrix3, Matrix4, SquareMatrix};
use fxhash::FxHashMap;

use crate::camera::Camera;
use crate::device::{
    BlendEquation, BlendFactor, BufferHandle, BufferTarget, Capabilities, Capability, CullFace,
    DepthFunc, Device, DeviceError, FramebufferHandle, FrontFace, ProgramHandle, TextureHandle,
    TextureTarget, VertexArrayHandle,
};
use crate::program::{UniformValue, mat3_to_array, mat4_to_array};
use crate::scene::{Node, NodeId, Scene};
use crate::target::RenderTarget;

/// Per-frame options for [`Renderer::render`].
#[derive(Clone, Copy)]
pub struct RenderOptions<'a> {
    /// Clear the target before drawing (subject to the renderer's
    /// `auto_clear*` flags).
    pub clear: bool,
    /// Propagate scene world matrices before building the render list.
    pub update: bool,
    /// Depth-sort the opaque and transparent queues.
    pub sort: bool,
    /// Frustum-cull meshes that opted in via `Mesh::frustum_culled`.
    pub frustum_cull: bool,
    /// Draw into an offscreen target instead of the default framebuffer.
    pub target: Option<&'a RenderTarget>,
}

impl Default for RenderOptions<'_> {
    fn default() -> Self {
        Self {
            clear: true,
            update: true,
            sort: true,
            frustum_cull: true,
            target: None,
        }
    }
}

/// Shadow copy of the device state machine. Slots start at `None`
/// (unknown); the first write of any value always reaches the device.
#[derive(Default)]
struct StateCache {
    enabled: FxHashMap<Capability, bool>,
    blend_func: Option<(BlendFactor, BlendFactor, Option<(BlendFactor, BlendFactor)>)>,
    blend_equation: Option<BlendEquation>,
    cull_face: Option<CullFace>,
    front_face: Option<FrontFace>,
    depth_mask: Option<bool>,
    depth_func: Option<DepthFunc>,
    active_unit: Option<u32>,
    bound_textures: FxHashMap<u32, (TextureTarget, TextureHandle)>,
    buffers: FxHashMap<BufferTarget, BufferHandle>,
    vao: Option<Option<VertexArrayHandle>>,
    /// Which geometry/program pairing the live vertex binding belongs to.
    geometry_key: Option<String>,
    program: Option<ProgramHandle>,
    framebuffer: Option<Option<FramebufferHandle>>,
    viewport: Option<(i32, i32, i32, i32)>,
    clear_color: Option<(f32, f32, f32, f32)>,
}

pub struct Renderer {
    device: Box<dyn Device>,
    caps: Capabilities,
    cache: StateCache,
    width: i32,
    height: i32,
    /// Master switch for the per-frame clear; the three flags below select
    /// which planes are cleared.
    pub auto_clear: bool,
    pub auto_clear_color: bool,
    pub auto_clear_depth: bool,
    pub auto_clear_stencil: bool,
    pub clear_color: [f32; 4],
}

impl Renderer {
    pub fn new(device: Box<dyn Device>, width: i32, height: i32) -> Self {
        let caps = device.capabilities();
        Self {
            device,
            caps,
            cache: StateCache::default(),
            width,
            height,
            auto_clear: true,
            auto_clear_color: true,
            auto_clear_depth: true,
            auto_clear_stencil: false,
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }

    pub fn caps(&self) -> Capabilities {
        self.caps
    }

    pub fn size(&self) -> (i32, i32) {
        (self.width, self.height)
    }

    pub fn set_size(&mut self, width: i32, height: i32) {
        self.width = width;
        self.height = height;
    }

    /// Direct device access for resource creation and draw submission.
    /// State-changing calls must keep going through the cached setters.
    pub(crate) fn device_mut(&mut self) -> &mut dyn Device {
        self.device.as_mut()
    }

    /// Drop every shadowed value. The next write of each state reaches the
    /// device again; use after foreign code touched the context.
    pub fn invalidate_state(&mut self) {
        self.cache = StateCache::default();
    }

    // Cache-checked state setters.

    pub fn enable(&mut self, cap: Capability) {
        if self.cache.enabled.get(&cap) != Some(&true) {
            self.device.enable(cap);
            self.cache.enabled.insert(cap, true);
        }
    }

    pub fn disable(&mut self, cap: Capability) {
        if self.cache.enabled.get(&cap) != Some(&false) {
            self.device.disable(cap);
            self.cache.enabled.insert(cap, false);
        }
    }

    /// `alpha` selects the separate-alpha blend form.
    pub fn set_blend_func(
        &mut self,
        src: BlendFactor,
        dst: BlendFactor,
        alpha: Option<(BlendFactor, BlendFactor)>,
    ) {
        if self.cache.blend_func == Some((src, dst, alpha)) {
            return;
        }
        match alpha {
            Some((src_a, dst_a)) => self.device.blend_func_separate(src, dst, src_a, dst_a),
            None => self.device.blend_func(src, dst),
        }
        self.cache.blend_func = Some((src, dst, alpha));
    }

    pub fn set_blend_equation(&mut self, mode: BlendEquation) {
        if self.cache.blend_equation != Some(mode) {
            self.device.blend_equation(mode);
            self.cache.blend_equation = Some(mode);
        }
    }

    pub fn set_cull_face(&mut self, face: CullFace) {
        if self.cache.cull_face != Some(face) {
            self.device.cull_face(face);
            self.cache.cull_face = Some(face);
        }
    }

    pub fn set_front_face(&mut self, winding: FrontFace) {
        if self.cache.front_face != Some(winding) {
            self.device.front_face(winding);
            self.cache.front_face = Some(winding);
        }
    }

    pub fn set_depth_mask(&mut self, write: bool) {
        if self.cache.depth_mask != Some(write) {
            self.device.depth_mask(write);
            self.cache.depth_mask = Some(write);
        }
    }

    pub fn set_depth_func(&mut self, func: DepthFunc) {
        if self.cache.depth_func != Some(func) {
            self.device.depth_func(func);
            self.cache.depth_func = Some(func);
        }
    }

    /// Bind `texture` to `unit`, switching the active unit only when needed.
    pub fn bind_texture_unit(&mut self, unit: u32, target: TextureTarget, texture: TextureHandle) {
        if self.cache.bound_textures.get(&unit) == Some(&(target, texture)) {
            return;
        }
        if self.cache.active_unit != Some(unit) {
            self.device.active_texture(unit);
            self.cache.active_unit = Some(unit);
        }
        self.device.bind_texture(target, texture);
        self.cache.bound_textures.insert(unit, (target, texture));
    }

    pub fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferHandle>) {
        if self.cache.framebuffer != Some(framebuffer) {
            self.device.bind_framebuffer(framebuffer);
            self.cache.framebuffer = Some(framebuffer);
        }
    }

    pub fn set_viewport(&mut self, x: i32, y: i32, width: i32, height: i32) {
        if self.cache.viewport != Some((x, y, width, height)) {
            self.device.viewport(x, y, width, height);
            self.cache.viewport = Some((x, y, width, height));
        }
    }

    pub fn set_clear_color(&mut self, r: f32, g: f32, b: f32, a: f32) {
        if self.cache.clear_color != Some((r, g, b, a)) {
            self.device.clear_color(r, g, b, a);
            self.cache.clear_color = Some((r, g, b, a));
        }
    }

    pub fn use_program_handle(&mut self, program: ProgramHandle) {
        if self.cache.program != Some(program) {
            self.device.use_program(program);
            self.cache.program = Some(program);
        }
    }

    pub fn bind_buffer(&mut self, target: BufferTarget, buffer: BufferHandle) {
        if self.cache.buffers.get(&target) != Some(&buffer) {
            self.device.bind_buffer(target, buffer);
            self.cache.buffers.insert(target, buffer);
        }
    }

    /// Switch the live vertex array object. Buffer bindings and the
    /// geometry pairing are forgotten on a switch: the element-array bind
    /// lives inside the VAO and the array bind is cheap to re-issue.
    pub fn bind_vertex_array(&mut self, vao: Option<VertexArrayHandle>) {
        if self.cache.vao == Some(vao) {
            return;
        }
        self.device.bind_vertex_array(vao);
        self.cache.vao = Some(vao);
        self.cache.buffers.clear();
        self.cache.geometry_key = None;
    }

    pub fn delete_vertex_array(&mut self, vao: VertexArrayHandle) {
        self.device.delete_vertex_array(vao);
        if self.cache.vao == Some(Some(vao)) {
            // Deleting the bound object implicitly unbinds it.
            self.cache.vao = None;
            self.cache.buffers.clear();
            self.cache.geometry_key = None;
        }
    }

    /// Geometry/program pairing whose vertex binding is currently live.
    pub fn bound_geometry_key(&self) -> Option<&str> {
        self.cache.geometry_key.as_deref()
    }

    pub fn set_bound_geometry_key(&mut self, key: String) {
        self.cache.geometry_key = Some(key);
    }

    /// Draw one frame of `scene` through `camera`.
    pub fn render(
        &mut self,
        scene: &mut Scene,
        mut camera: Option<&mut Camera>,
        opts: RenderOptions,
    ) -> Result<(), DeviceError> {
        let (width, height) = match opts.target {
            Some(target) => {
                self.bind_framebuffer(Some(target.framebuffer()));
                target.size()
            }
            None => {
                self.bind_framebuffer(None);
                (self.width, self.height)
            }
        };
        self.set_viewport(0, 0, width, height);

        if self.auto_clear && opts.clear {
            if self.auto_clear_depth {
                // Depth writes must be on for the depth clear to land.
                self.enable(Capability::DepthTest);
                self.set_depth_mask(true);
            }
            if self.auto_clear_color {
                let [r, g, b, a] = self.clear_color;
                self.set_clear_color(r, g, b, a);
            }
            self.device.clear(
                self.auto_clear_color,
                self.auto_clear_depth,
                self.auto_clear_stencil,
            );
        }

        if opts.update {
            scene.update_matrix_world();
        }
        if let Some(camera) = camera.as_deref_mut() {
            camera.update_matrix_world(Some(scene));
            if opts.frustum_cull {
                camera.update_frustum();
            }
        }

        let list = self.build_render_list(scene, camera.as_deref(), &opts);
        for id in list {
            self.draw_node(scene, camera.as_deref(), id)?;
        }
        Ok(())
    }

    /// Collect drawable nodes into submission order: hidden subtrees are
    /// pruned, culled meshes skipped, then the opaque queue (front to back)
    /// runs before the transparent queue (back to front). Nodes carrying a
    /// manual `render_order` are spliced into the transparent queue at that
    /// index, clamped to its length. Without a camera or with `sort` off
    /// the queues keep traversal order and manual orders are ignored.
    fn build_render_list(
        &self,
        scene: &Scene,
        camera: Option<&Camera>,
        opts: &RenderOptions,
    ) -> Vec<NodeId> {
        let sorting = opts.sort && camera.is_some();
        let mut opaque: Vec<(NodeId, f32)> = Vec::new();
        let mut transparent: Vec<(NodeId, f32)> = Vec::new();
        let mut ordered: Vec<(NodeId, usize)> = Vec::new();

        for root in scene.roots() {
            scene.traverse(root, &mut |id, node| {
                if !node.visible {
                    return false;
                }
                let Some(mesh) = &node.mesh else {
                    return true;
                };
                if opts.frustum_cull
                    && mesh.frustum_culled
                    && let Some(camera) = camera
                    && !camera.frustum_intersects_mesh(scene, id)
                {
                    return true;
                }
                if sorting && let Some(order) = mesh.render_order {
                    ordered.push((id, order));
                    return true;
                }
                let depth = match camera {
                    Some(camera) if sorting => clip_depth(camera, node),
                    _ => 0.0,
                };
                if mesh.program.borrow().transparent {
                    if sorting {
                        insert_by_depth(&mut transparent, id, depth, false);
                    } else {
                        transparent.push((id, depth));
                    }
                } else if sorting {
                    insert_by_depth(&mut opaque, id, depth, true);
                } else {
                    opaque.push((id, depth));
                }
                true
            });
        }

        ordered.sort_by_key(|&(_, order)| order);
        for (id, order) in ordered {
            let at = order.min(transparent.len());
            transparent.insert(at, (id, 0.0));
        }

        opaque
            .into_iter()
            .chain(transparent)
            .map(|(id, _)| id)
            .collect()
    }

    /// Submit one mesh node: fill the automatic matrix uniforms, apply the
    /// program (uniform diff plus render state) and dispatch the geometry.
    fn draw_node(
        &mut self,
        scene: &Scene,
        camera: Option<&Camera>,
        id: NodeId,
    ) -> Result<(), DeviceError> {
        let Some(node) = scene.node(id) else {
            return Ok(());
        };
        let Some(mesh) = &node.mesh else {
            return Ok(());
        };
        let world = node.transform.world_matrix();
        let geometry = mesh.geometry.clone();
        let program = mesh.program.clone();
        let mode = mesh.mode;

        let mut program = program.borrow_mut();
        program.uniforms.insert(
            "modelMatrix".to_string(),
            UniformValue::Mat4(mat4_to_array(&world)),
        );
        if let Some(camera) = camera {
            let view = camera.view_matrix();
            let model_view = view * world;
            program.uniforms.insert(
                "viewMatrix".to_string(),
                UniformValue::Mat4(mat4_to_array(&view)),
            );
            program.uniforms.insert(
                "projectionMatrix".to_string(),
                UniformValue::Mat4(mat4_to_array(&camera.projection_matrix())),
            );
            program.uniforms.insert(
                "modelViewMatrix".to_string(),
                UniformValue::Mat4(mat4_to_array(&model_view)),
            );
            program.uniforms.insert(
                "normalMatrix".to_string(),
                UniformValue::Mat3(mat3_to_array(&normal_matrix(&model_view))),
            );
            program.uniforms.insert(
                "cameraPosition".to_string(),
                UniformValue::Vec3(camera.world_position().into()),
            );
        }

        // A negative-determinant world scale mirrors the winding.
        let flip_faces = world.determinant() < 0.0;
        program.use_program(self, flip_faces);
        geometry.borrow_mut().draw(self, &program, mode)
    }
}

/// Post-projection z of the node's world translation.
fn clip_depth(camera: &Camera, node: &Node) -> f32 {
    let clip = camera.projection_view_matrix() * node.transform.world_position().extend(1.0);
    if clip.w != 0.0 { clip.z / clip.w } else { clip.z }
}

/// Linear-scan ordered insert; ties keep insertion order.
fn insert_by_depth(list: &mut Vec<(NodeId, f32)>, id: NodeId, depth: f32, ascending: bool) {
    let at = list
        .iter()
        .position(|&(_, d)| if ascending { depth < d } else { depth > d })
        .unwrap_or(list.len());
    list.insert(at, (id, depth));
}

/// Inverse-transpose of the model-view rotation block; identity when the
/// matrix is singular (zero scale).
fn normal_matrix(model_view: &Matrix4<f32>) -> Matrix3<f32> {
    let m = Matrix3::from_cols(
        model_view.x.truncate(),
        model_view.y.truncate(),
        model_view.z.truncate(),
    );
    m.invert()
        .map(|inv| inv.transpose())
        .unwrap_or_else(Matrix3::identity)
}
