//! Headless recording device.
//!
//! [`TraceDevice`] implements [`Device`](super::Device) without a GPU. Every
//! call is appended to a shared log as a [`TraceCall`], handles are handed
//! out sequentially, and program introspection results are scripted through
//! [`ProgramStub`]s queued before linking. Cloning a `TraceDevice` clones a
//! handle to the same underlying state, so a test can move one clone into
//! the renderer and keep the other to inspect the recorded calls.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use fxhash::FxHashMap;

use super::{
    ActiveAttribute, ActiveUniform, BlendEquation, BlendFactor, BufferHandle, BufferTarget,
    BufferUsage, Capabilities, Capability, CullFace, DataType, DepthFunc, Device, DeviceError,
    DrawMode, FramebufferHandle, FrontFace, ProgramHandle, ShaderHandle, ShaderStage,
    TextureHandle, TextureTarget, UniformLocation, VertexArrayHandle,
};

/// One recorded device call with its arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum TraceCall {
    Enable(Capability),
    Disable(Capability),
    BlendFunc(BlendFactor, BlendFactor),
    BlendFuncSeparate(BlendFactor, BlendFactor, BlendFactor, BlendFactor),
    BlendEquation(BlendEquation),
    CullFace(CullFace),
    FrontFace(FrontFace),
    DepthMask(bool),
    DepthFunc(DepthFunc),
    ActiveTexture(u32),
    BindTexture(TextureTarget, TextureHandle),
    BindFramebuffer(Option<FramebufferHandle>),
    Viewport(i32, i32, i32, i32),
    ClearColor(f32, f32, f32, f32),
    Clear {
        color: bool,
        depth: bool,
        stencil: bool,
    },
    CompileShader(ShaderStage),
    DeleteShader(ShaderHandle),
    LinkProgram(ProgramHandle),
    UseProgram(ProgramHandle),
    DeleteProgram(ProgramHandle),
    CreateBuffer(BufferHandle),
    BindBuffer(BufferTarget, BufferHandle),
    BufferData {
        target: BufferTarget,
        len: usize,
        usage: BufferUsage,
    },
    DeleteBuffer(BufferHandle),
    CreateVertexArray(VertexArrayHandle),
    BindVertexArray(Option<VertexArrayHandle>),
    DeleteVertexArray(VertexArrayHandle),
    EnableVertexAttrib(u32),
    VertexAttribPointer {
        location: u32,
        size: i32,
        ty: DataType,
        normalized: bool,
        stride: i32,
        offset: usize,
    },
    VertexAttribDivisor {
        location: u32,
        divisor: u32,
    },
    Uniform1i(UniformLocation, i32),
    Uniform1f(UniformLocation, f32),
    Uniform1iv(UniformLocation, Vec<i32>),
    Uniform1fv(UniformLocation, Vec<f32>),
    Uniform2fv(UniformLocation, Vec<f32>),
    Uniform3fv(UniformLocation, Vec<f32>),
    Uniform4fv(UniformLocation, Vec<f32>),
    UniformMatrix3fv(UniformLocation, Vec<f32>),
    UniformMatrix4fv(UniformLocation, Vec<f32>),
    DrawArrays {
        mode: DrawMode,
        first: i32,
        count: i32,
    },
    DrawElements {
        mode: DrawMode,
        count: i32,
        ty: DataType,
        offset: usize,
    },
    DrawArraysInstanced {
        mode: DrawMode,
        first: i32,
        count: i32,
        instances: i32,
    },
    DrawElementsInstanced {
        mode: DrawMode,
        count: i32,
        ty: DataType,
        offset: usize,
        instances: i32,
    },
    CreateTexture(TextureHandle),
    TexStorage2D {
        target: TextureTarget,
        width: i32,
        height: i32,
    },
    DeleteTexture(TextureHandle),
    CreateFramebuffer(FramebufferHandle),
    FramebufferTexture2D(TextureHandle),
    DeleteFramebuffer(FramebufferHandle),
}

/// Scripted introspection result for the next linked program.
#[derive(Debug, Clone, Default)]
pub struct ProgramStub {
    pub uniforms: Vec<ActiveUniform>,
    pub attributes: Vec<ActiveAttribute>,
}

impl ProgramStub {
    pub fn new(uniforms: Vec<ActiveUniform>, attributes: Vec<ActiveAttribute>) -> Self {
        Self {
            uniforms,
            attributes,
        }
    }
}

struct LinkedProgram {
    stub: ProgramStub,
    locations: FxHashMap<String, UniformLocation>,
}

#[derive(Default)]
struct Inner {
    calls: Vec<TraceCall>,
    next_handle: u32,
    stubs: VecDeque<ProgramStub>,
    programs: FxHashMap<ProgramHandle, LinkedProgram>,
    fail_next_compile: Option<String>,
    fail_next_link: Option<String>,
    capabilities: Capabilities,
}

/// Recording [`Device`] implementation. See the module docs.
#[derive(Clone)]
pub struct TraceDevice {
    inner: Rc<RefCell<Inner>>,
}

impl TraceDevice {
    pub fn new() -> Self {
        Self::with_capabilities(Capabilities::default())
    }

    pub fn with_capabilities(capabilities: Capabilities) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                capabilities,
                ..Inner::default()
            })),
        }
    }

    /// Queue introspection data for the next `link_program` call.
    pub fn stub_program(&self, stub: ProgramStub) {
        self.inner.borrow_mut().stubs.push_back(stub);
    }

    /// Make the next `compile_shader` fail with the given info log.
    pub fn fail_next_compile(&self, info_log: &str) {
        self.inner.borrow_mut().fail_next_compile = Some(info_log.to_string());
    }

    /// Make the next `link_program` fail with the given info log.
    pub fn fail_next_link(&self, info_log: &str) {
        self.inner.borrow_mut().fail_next_link = Some(info_log.to_string());
    }

    /// Snapshot of all recorded calls.
    pub fn calls(&self) -> Vec<TraceCall> {
        self.inner.borrow().calls.clone()
    }

    /// Drop everything recorded so far.
    pub fn clear(&self) {
        self.inner.borrow_mut().calls.clear();
    }

    /// Count recorded calls matching a predicate.
    pub fn count(&self, pred: impl Fn(&TraceCall) -> bool) -> usize {
        self.inner.borrow().calls.iter().filter(|c| pred(c)).count()
    }

    /// The recorded calls matching a predicate, in order.
    pub fn filtered(&self, pred: impl Fn(&TraceCall) -> bool) -> Vec<TraceCall> {
        self.inner
            .borrow()
            .calls
            .iter()
            .filter(|c| pred(c))
            .cloned()
            .collect()
    }

    fn record(&self, call: TraceCall) {
        self.inner.borrow_mut().calls.push(call);
    }

    fn next_handle(&self) -> u32 {
        let mut inner = self.inner.borrow_mut();
        inner.next_handle += 1;
        inner.next_handle
    }
}

impl Default for TraceDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl Device for TraceDevice {
    fn capabilities(&self) -> Capabilities {
        self.inner.borrow().capabilities
    }

    fn compile_shader(&mut self, stage: ShaderStage, _source: &str) -> Result<ShaderHandle, String> {
        if let Some(log) = self.inner.borrow_mut().fail_next_compile.take() {
            return Err(log);
        }
        self.record(TraceCall::CompileShader(stage));
        Ok(ShaderHandle(self.next_handle()))
    }

    fn link_program(
        &mut self,
        _vs: ShaderHandle,
        _fs: ShaderHandle,
    ) -> Result<ProgramHandle, String> {
        if let Some(log) = self.inner.borrow_mut().fail_next_link.take() {
            return Err(log);
        }
        let handle = ProgramHandle(self.next_handle());
        {
            let mut inner = self.inner.borrow_mut();
            let stub = inner.stubs.pop_front().unwrap_or_default();
            let locations = stub
                .uniforms
                .iter()
                .enumerate()
                .map(|(i, u)| (u.name.clone(), UniformLocation(i as u32)))
                .collect();
            inner
                .programs
                .insert(handle, LinkedProgram { stub, locations });
        }
        self.record(TraceCall::LinkProgram(handle));
        Ok(handle)
    }

    fn delete_shader(&mut self, shader: ShaderHandle) {
        self.record(TraceCall::DeleteShader(shader));
    }

    fn active_uniforms(&self, program: ProgramHandle) -> Vec<ActiveUniform> {
        self.inner
            .borrow()
            .programs
            .get(&program)
            .map(|p| p.stub.uniforms.clone())
            .unwrap_or_default()
    }

    fn active_attributes(&self, program: ProgramHandle) -> Vec<ActiveAttribute> {
        self.inner
            .borrow()
            .programs
            .get(&program)
            .map(|p| p.stub.attributes.clone())
            .unwrap_or_default()
    }

    fn uniform_location(&self, program: ProgramHandle, name: &str) -> Option<UniformLocation> {
        self.inner
            .borrow()
            .programs
            .get(&program)
            .and_then(|p| p.locations.get(name).copied())
    }

    fn use_program(&mut self, program: ProgramHandle) {
        self.record(TraceCall::UseProgram(program));
    }

    fn delete_program(&mut self, program: ProgramHandle) {
        self.record(TraceCall::DeleteProgram(program));
    }

    fn create_buffer(&mut self) -> Result<BufferHandle, DeviceError> {
        let handle = BufferHandle(self.next_handle());
        self.record(TraceCall::CreateBuffer(handle));
        Ok(handle)
    }

    fn bind_buffer(&mut self, target: BufferTarget, buffer: BufferHandle) {
        self.record(TraceCall::BindBuffer(target, buffer));
    }

    fn buffer_data(&mut self, target: BufferTarget, data: &[u8], usage: BufferUsage) {
        self.record(TraceCall::BufferData {
            target,
            len: data.len(),
            usage,
        });
    }

    fn delete_buffer(&mut self, buffer: BufferHandle) {
        self.record(TraceCall::DeleteBuffer(buffer));
    }

    fn create_vertex_array(&mut self) -> Result<VertexArrayHandle, DeviceError> {
        let handle = VertexArrayHandle(self.next_handle());
        self.record(TraceCall::CreateVertexArray(handle));
        Ok(handle)
    }

    fn bind_vertex_array(&mut self, vao: Option<VertexArrayHandle>) {
        self.record(TraceCall::BindVertexArray(vao));
    }

    fn delete_vertex_array(&mut self, vao: VertexArrayHandle) {
        self.record(TraceCall::DeleteVertexArray(vao));
    }

    fn enable_vertex_attrib(&mut self, location: u32) {
        self.record(TraceCall::EnableVertexAttrib(location));
    }

    fn vertex_attrib_pointer(
        &mut self,
        location: u32,
        size: i32,
        ty: DataType,
        normalized: bool,
        stride: i32,
        offset: usize,
    ) {
        self.record(TraceCall::VertexAttribPointer {
            location,
            size,
            ty,
            normalized,
            stride,
            offset,
        });
    }

    fn vertex_attrib_divisor(&mut self, location: u32, divisor: u32) {
        self.record(TraceCall::VertexAttribDivisor { location, divisor });
    }

    fn enable(&mut self, cap: Capability) {
        self.record(TraceCall::Enable(cap));
    }

    fn disable(&mut self, cap: Capability) {
        self.record(TraceCall::Disable(cap));
    }

    fn blend_func(&mut self, src: BlendFactor, dst: BlendFactor) {
        self.record(TraceCall::BlendFunc(src, dst));
    }

    fn blend_func_separate(
        &mut self,
        src_rgb: BlendFactor,
        dst_rgb: BlendFactor,
        src_alpha: BlendFactor,
        dst_alpha: BlendFactor,
    ) {
        self.record(TraceCall::BlendFuncSeparate(
            src_rgb, dst_rgb, src_alpha, dst_alpha,
        ));
    }

    fn blend_equation(&mut self, mode: BlendEquation) {
        self.record(TraceCall::BlendEquation(mode));
    }

    fn cull_face(&mut self, face: CullFace) {
        self.record(TraceCall::CullFace(face));
    }

    fn front_face(&mut self, winding: FrontFace) {
        self.record(TraceCall::FrontFace(winding));
    }

    fn depth_mask(&mut self, write: bool) {
        self.record(TraceCall::DepthMask(write));
    }

    fn depth_func(&mut self, func: DepthFunc) {
        self.record(TraceCall::DepthFunc(func));
    }

    fn active_texture(&mut self, unit: u32) {
        self.record(TraceCall::ActiveTexture(unit));
    }

    fn bind_texture(&mut self, target: TextureTarget, texture: TextureHandle) {
        self.record(TraceCall::BindTexture(target, texture));
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferHandle>) {
        self.record(TraceCall::BindFramebuffer(framebuffer));
    }

    fn viewport(&mut self, x: i32, y: i32, width: i32, height: i32) {
        self.record(TraceCall::Viewport(x, y, width, height));
    }

    fn clear_color(&mut self, r: f32, g: f32, b: f32, a: f32) {
        self.record(TraceCall::ClearColor(r, g, b, a));
    }

    fn clear(&mut self, color: bool, depth: bool, stencil: bool) {
        self.record(TraceCall::Clear {
            color,
            depth,
            stencil,
        });
    }

    fn uniform1i(&mut self, location: UniformLocation, v: i32) {
        self.record(TraceCall::Uniform1i(location, v));
    }

    fn uniform1f(&mut self, location: UniformLocation, v: f32) {
        self.record(TraceCall::Uniform1f(location, v));
    }

    fn uniform1iv(&mut self, location: UniformLocation, v: &[i32]) {
        self.record(TraceCall::Uniform1iv(location, v.to_vec()));
    }

    fn uniform1fv(&mut self, location: UniformLocation, v: &[f32]) {
        self.record(TraceCall::Uniform1fv(location, v.to_vec()));
    }

    fn uniform2fv(&mut self, location: UniformLocation, v: &[f32]) {
        self.record(TraceCall::Uniform2fv(location, v.to_vec()));
    }

    fn uniform3fv(&mut self, location: UniformLocation, v: &[f32]) {
        self.record(TraceCall::Uniform3fv(location, v.to_vec()));
    }

    fn uniform4fv(&mut self, location: UniformLocation, v: &[f32]) {
        self.record(TraceCall::Uniform4fv(location, v.to_vec()));
    }

    fn uniform_matrix3fv(&mut self, location: UniformLocation, v: &[f32]) {
        self.record(TraceCall::UniformMatrix3fv(location, v.to_vec()));
    }

    fn uniform_matrix4fv(&mut self, location: UniformLocation, v: &[f32]) {
        self.record(TraceCall::UniformMatrix4fv(location, v.to_vec()));
    }

    fn draw_arrays(&mut self, mode: DrawMode, first: i32, count: i32) {
        self.record(TraceCall::DrawArrays { mode, first, count });
    }

    fn draw_elements(&mut self, mode: DrawMode, count: i32, ty: DataType, offset: usize) {
        self.record(TraceCall::DrawElements {
            mode,
            count,
            ty,
            offset,
        });
    }

    fn draw_arrays_instanced(&mut self, mode: DrawMode, first: i32, count: i32, instances: i32) {
        self.record(TraceCall::DrawArraysInstanced {
            mode,
            first,
            count,
            instances,
        });
    }

    fn draw_elements_instanced(
        &mut self,
        mode: DrawMode,
        count: i32,
        ty: DataType,
        offset: usize,
        instances: i32,
    ) {
        self.record(TraceCall::DrawElementsInstanced {
            mode,
            count,
            ty,
            offset,
            instances,
        });
    }

    fn create_texture(&mut self) -> Result<TextureHandle, DeviceError> {
        let handle = TextureHandle(self.next_handle());
        self.record(TraceCall::CreateTexture(handle));
        Ok(handle)
    }

    fn tex_storage_2d(&mut self, target: TextureTarget, width: i32, height: i32) {
        self.record(TraceCall::TexStorage2D {
            target,
            width,
            height,
        });
    }

    fn delete_texture(&mut self, texture: TextureHandle) {
        self.record(TraceCall::DeleteTexture(texture));
    }

    fn create_framebuffer(&mut self) -> Result<FramebufferHandle, DeviceError> {
        let handle = FramebufferHandle(self.next_handle());
        self.record(TraceCall::CreateFramebuffer(handle));
        Ok(handle)
    }

    fn framebuffer_texture_2d(&mut self, texture: TextureHandle) {
        self.record(TraceCall::FramebufferTexture2D(texture));
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferHandle) {
        self.record(TraceCall::DeleteFramebuffer(framebuffer));
    }
}
