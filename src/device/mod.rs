//! Abstract graphics device boundary.
//!
//! The renderer core never talks to a concrete graphics API. Everything it
//! needs from the GPU side is expressed through the [`Device`] trait: object
//! creation, shader compilation with introspection, raw state calls and draw
//! submission. A backend implements this once; the core layers its own state
//! cache on top and guarantees that redundant calls never reach the device.
//!
//! The trait is deliberately shaped like a WebGL2-class context (bind points,
//! uniform locations, texture units) because that is the state machine the
//! renderer's caching logic models.
//!
//! [`trace::TraceDevice`] is a headless implementation that records every
//! call, used by the integration tests and for running scenes without a GPU.

pub mod trace;

use thiserror::Error;

/// Errors a backend may raise for genuinely unrecoverable conditions.
///
/// Recoverable misuse (missing uniforms, absent attributes) never surfaces
/// here; the core warns and continues instead.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("device object allocation failed: {0}")]
    Allocation(&'static str),

    #[error("graphics context lost")]
    ContextLost,
}

macro_rules! handle_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(pub u32);
    };
}

handle_type!(
    /// Opaque handle to a device vertex/index buffer.
    BufferHandle
);
handle_type!(
    /// Opaque handle to a compiled shader stage.
    ShaderHandle
);
handle_type!(
    /// Opaque handle to a linked shader program.
    ProgramHandle
);
handle_type!(
    /// Opaque handle to a device texture.
    TextureHandle
);
handle_type!(
    /// Opaque handle to a framebuffer object.
    FramebufferHandle
);
handle_type!(
    /// Opaque handle to a vertex array object.
    VertexArrayHandle
);
handle_type!(
    /// Location of an active uniform within a linked program.
    UniformLocation
);

/// Device features resolved once at renderer construction.
#[derive(Debug, Clone, Copy)]
pub struct Capabilities {
    pub instancing: bool,
    pub vertex_array_objects: bool,
    pub max_texture_units: u32,
    pub max_vertex_attribs: u32,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            instancing: true,
            vertex_array_objects: true,
            max_texture_units: 16,
            max_vertex_attribs: 16,
        }
    }
}

/// Togglable device capabilities (`enable`/`disable`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Blend,
    CullFace,
    DepthTest,
    ScissorTest,
    StencilTest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferTarget {
    Array,
    ElementArray,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferUsage {
    Static,
    Dynamic,
    Stream,
}

/// Component type of attribute or index data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    U8,
    U16,
    U32,
    F32,
}

impl DataType {
    /// Size of one component in bytes.
    pub fn byte_size(self) -> usize {
        match self {
            DataType::U8 => 1,
            DataType::U16 => 2,
            DataType::U32 | DataType::F32 => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawMode {
    Points,
    Lines,
    LineLoop,
    LineStrip,
    Triangles,
    TriangleStrip,
    TriangleFan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstColor,
    OneMinusDstColor,
    DstAlpha,
    OneMinusDstAlpha,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendEquation {
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CullFace {
    Front,
    Back,
    FrontAndBack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrontFace {
    Ccw,
    Cw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepthFunc {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureTarget {
    D2,
    Cube,
}

/// Declared type of an active uniform, reported by program introspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformKind {
    Float,
    FloatVec2,
    FloatVec3,
    FloatVec4,
    Int,
    Bool,
    Mat3,
    Mat4,
    Sampler2D,
    SamplerCube,
}

impl UniformKind {
    /// Whether this uniform samples a texture and therefore occupies
    /// texture units.
    pub fn is_sampler(self) -> bool {
        matches!(self, UniformKind::Sampler2D | UniformKind::SamplerCube)
    }
}

/// One active uniform as reported after linking. For array uniforms the
/// reported name carries a `[0]` suffix and `size` is the array length.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveUniform {
    pub name: String,
    pub kind: UniformKind,
    pub size: usize,
}

/// One active vertex attribute as reported after linking.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveAttribute {
    pub name: String,
    pub location: u32,
}

/// The opaque graphics device the renderer core drives.
///
/// State-changing calls (`enable`, `blend_func`, bind calls, ...) must only
/// be reached through the renderer's cache-checked setters; calling them
/// directly desynchronizes the cache for the rest of the context's life.
pub trait Device {
    fn capabilities(&self) -> Capabilities;

    // Shaders and programs. Compile/link failures carry the info log.
    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> Result<ShaderHandle, String>;
    fn link_program(&mut self, vs: ShaderHandle, fs: ShaderHandle)
    -> Result<ProgramHandle, String>;
    fn delete_shader(&mut self, shader: ShaderHandle);
    fn active_uniforms(&self, program: ProgramHandle) -> Vec<ActiveUniform>;
    fn active_attributes(&self, program: ProgramHandle) -> Vec<ActiveAttribute>;
    fn uniform_location(&self, program: ProgramHandle, name: &str) -> Option<UniformLocation>;
    fn use_program(&mut self, program: ProgramHandle);
    fn delete_program(&mut self, program: ProgramHandle);

    // Buffers.
    fn create_buffer(&mut self) -> Result<BufferHandle, DeviceError>;
    fn bind_buffer(&mut self, target: BufferTarget, buffer: BufferHandle);
    fn buffer_data(&mut self, target: BufferTarget, data: &[u8], usage: BufferUsage);
    fn delete_buffer(&mut self, buffer: BufferHandle);

    // Vertex array objects and attribute pointers.
    fn create_vertex_array(&mut self) -> Result<VertexArrayHandle, DeviceError>;
    fn bind_vertex_array(&mut self, vao: Option<VertexArrayHandle>);
    fn delete_vertex_array(&mut self, vao: VertexArrayHandle);
    fn enable_vertex_attrib(&mut self, location: u32);
    fn vertex_attrib_pointer(
        &mut self,
        location: u32,
        size: i32,
        ty: DataType,
        normalized: bool,
        stride: i32,
        offset: usize,
    );
    fn vertex_attrib_divisor(&mut self, location: u32, divisor: u32);

    // Raw state calls.
    fn enable(&mut self, cap: Capability);
    fn disable(&mut self, cap: Capability);
    fn blend_func(&mut self, src: BlendFactor, dst: BlendFactor);
    fn blend_func_separate(
        &mut self,
        src_rgb: BlendFactor,
        dst_rgb: BlendFactor,
        src_alpha: BlendFactor,
        dst_alpha: BlendFactor,
    );
    fn blend_equation(&mut self, mode: BlendEquation);
    fn cull_face(&mut self, face: CullFace);
    fn front_face(&mut self, winding: FrontFace);
    fn depth_mask(&mut self, write: bool);
    fn depth_func(&mut self, func: DepthFunc);
    fn active_texture(&mut self, unit: u32);
    fn bind_texture(&mut self, target: TextureTarget, texture: TextureHandle);
    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferHandle>);
    fn viewport(&mut self, x: i32, y: i32, width: i32, height: i32);
    fn clear_color(&mut self, r: f32, g: f32, b: f32, a: f32);
    fn clear(&mut self, color: bool, depth: bool, stencil: bool);

    // Uniform uploads. Vector variants take flattened component slices.
    fn uniform1i(&mut self, location: UniformLocation, v: i32);
    fn uniform1f(&mut self, location: UniformLocation, v: f32);
    fn uniform1iv(&mut self, location: UniformLocation, v: &[i32]);
    fn uniform1fv(&mut self, location: UniformLocation, v: &[f32]);
    fn uniform2fv(&mut self, location: UniformLocation, v: &[f32]);
    fn uniform3fv(&mut self, location: UniformLocation, v: &[f32]);
    fn uniform4fv(&mut self, location: UniformLocation, v: &[f32]);
    fn uniform_matrix3fv(&mut self, location: UniformLocation, v: &[f32]);
    fn uniform_matrix4fv(&mut self, location: UniformLocation, v: &[f32]);

    // Draw submission.
    fn draw_arrays(&mut self, mode: DrawMode, first: i32, count: i32);
    fn draw_elements(&mut self, mode: DrawMode, count: i32, ty: DataType, offset: usize);
    fn draw_arrays_instanced(&mut self, mode: DrawMode, first: i32, count: i32, instances: i32);
    fn draw_elements_instanced(
        &mut self,
        mode: DrawMode,
        count: i32,
        ty: DataType,
        offset: usize,
        instances: i32,
    );

    // Textures and framebuffers, the minimum needed for render targets.
    fn create_texture(&mut self) -> Result<TextureHandle, DeviceError>;
    fn tex_storage_2d(&mut self, target: TextureTarget, width: i32, height: i32);
    fn delete_texture(&mut self, texture: TextureHandle);
    fn create_framebuffer(&mut self) -> Result<FramebufferHandle, DeviceError>;
    fn framebuffer_texture_2d(&mut self, texture: TextureHandle);
    fn delete_framebuffer(&mut self, framebuffer: FramebufferHandle);
}
