//! Geometry: named attribute buffers and draw dispatch.
//!
//! A [`Geometry`] owns a set of named [`Attribute`]s (typed CPU data plus a
//! device buffer), an optional index attribute under the reserved name
//! `"index"`, a draw range and an instance count. Because attribute
//! locations are program-specific, the compiled vertex binding (a VAO when
//! the device supports them) is cached per consuming program, keyed by that
//! program's attribute-location layout; the renderer's state cache remembers
//! which binding is live so consecutive draws with the same pairing skip the
//! re-bind entirely.

use cgmath::Vector3;
use log::warn;

use crate::device::{
    BufferHandle, BufferTarget, BufferUsage, DataType, DeviceError, DrawMode, VertexArrayHandle,
};
use crate::program::Program;
use crate::renderer::Renderer;

/// Reserved attribute name routing data to the element-array binding point.
pub const INDEX: &str = "index";

/// Typed backing storage of one attribute.
#[derive(Clone, Debug)]
pub enum AttributeData {
    F32(Vec<f32>),
    U32(Vec<u32>),
    U16(Vec<u16>),
    U8(Vec<u8>),
}

impl AttributeData {
    pub fn len(&self) -> usize {
        match self {
            AttributeData::F32(v) => v.len(),
            AttributeData::U32(v) => v.len(),
            AttributeData::U16(v) => v.len(),
            AttributeData::U8(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn data_type(&self) -> DataType {
        match self {
            AttributeData::F32(_) => DataType::F32,
            AttributeData::U32(_) => DataType::U32,
            AttributeData::U16(_) => DataType::U16,
            AttributeData::U8(_) => DataType::U8,
        }
    }

    /// Raw bytes for buffer upload.
    pub fn bytes(&self) -> &[u8] {
        match self {
            AttributeData::F32(v) => bytemuck::cast_slice(v),
            AttributeData::U32(v) => bytemuck::cast_slice(v),
            AttributeData::U16(v) => bytemuck::cast_slice(v),
            AttributeData::U8(v) => v,
        }
    }
}

/// One named vertex attribute. Construct with [`Attribute::new`] and the
/// builder helpers; device-derived fields fill in on upload.
#[derive(Clone, Debug)]
pub struct Attribute {
    /// Components per vertex.
    pub size: i32,
    pub data: AttributeData,
    pub normalized: bool,
    /// 0 draws per-vertex; N advances the attribute every N instances.
    pub divisor: u32,
    pub stride: i32,
    pub offset: usize,
    pub usage: BufferUsage,
    /// Set by the caller after mutating `data` to force a re-upload on the
    /// next draw.
    pub needs_update: bool,
    ty: DataType,
    count: usize,
    buffer: Option<BufferHandle>,
}

impl Attribute {
    pub fn new(size: i32, data: AttributeData) -> Self {
        let ty = data.data_type();
        Self {
            size,
            data,
            normalized: false,
            divisor: 0,
            stride: 0,
            offset: 0,
            usage: BufferUsage::Static,
            needs_update: false,
            ty,
            count: 0,
            buffer: None,
        }
    }

    /// Per-instance attribute advancing every `divisor` instances.
    pub fn instanced(mut self, divisor: u32) -> Self {
        self.divisor = divisor;
        self
    }

    pub fn normalized(mut self, normalized: bool) -> Self {
        self.normalized = normalized;
        self
    }

    pub fn usage(mut self, usage: BufferUsage) -> Self {
        self.usage = usage;
        self
    }

    /// Derived vertex count (`data.len() / size`).
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn data_type(&self) -> DataType {
        self.ty
    }

    pub fn buffer(&self) -> Option<BufferHandle> {
        self.buffer
    }
}

/// Cached bounding sphere of the position attribute.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingSphere {
    pub center: Vector3<f32>,
    pub radius: f32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DrawRange {
    pub start: usize,
    pub count: usize,
}

static GEOMETRY_ID: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(1);

pub struct Geometry {
    id: u64,
    attributes: Vec<(String, Attribute)>,
    index: Option<Attribute>,
    draw_range: DrawRange,
    instanced_count: usize,
    is_instanced: bool,
    bindings: Vec<(String, VertexArrayHandle)>,
    bounds: Option<BoundingSphere>,
}

impl Geometry {
    pub fn new() -> Self {
        Self {
            id: GEOMETRY_ID.fetch_add(1, std::sync::atomic::Ordering::Relaxed),
            attributes: Vec::new(),
            index: None,
            draw_range: DrawRange::default(),
            instanced_count: 0,
            is_instanced: false,
            bindings: Vec::new(),
            bounds: None,
        }
    }

    /// Upload and register an attribute. `"index"` routes to the
    /// element-array target and defines the draw range; a per-instance
    /// attribute contributes to the global instance count, and a
    /// disagreeing second instanced attribute warns and clamps the count to
    /// the minimum. Buffer allocation failure propagates from the device.
    pub fn add_attribute(
        &mut self,
        renderer: &mut Renderer,
        name: &str,
        mut attr: Attribute,
    ) -> Result<(), DeviceError> {
        attr.ty = attr.data.data_type();
        if attr.size <= 0 {
            attr.size = 1;
        }
        attr.count = attr.data.len() / attr.size as usize;
        attr.buffer = Some(renderer.device_mut().create_buffer()?);
        upload_attribute(renderer, name, &mut attr, true);

        if attr.divisor > 0 {
            self.is_instanced = true;
            let candidate = attr.count * attr.divisor as usize;
            if self.instanced_count != 0 && self.instanced_count != candidate {
                warn!(
                    "instanced attribute '{}' disagrees on instance count ({} vs {}), clamping to the minimum",
                    name, candidate, self.instanced_count
                );
                self.instanced_count = self.instanced_count.min(candidate);
            } else {
                self.instanced_count = candidate;
            }
        } else if name == INDEX {
            self.draw_range.count = attr.count;
        } else if self.index.is_none() {
            self.draw_range.count = self.draw_range.count.max(attr.count);
        }

        if name == INDEX {
            self.index = Some(attr);
        } else if let Some(existing) = self.attribute_mut(name) {
            *existing = attr;
        } else {
            self.attributes.push((name.to_string(), attr));
        }
        if name == "position" {
            self.bounds = None;
        }
        Ok(())
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        if name == INDEX {
            return self.index.as_ref();
        }
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, a)| a)
    }

    pub fn attribute_mut(&mut self, name: &str) -> Option<&mut Attribute> {
        if name == INDEX {
            return self.index.as_mut();
        }
        self.attributes
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, a)| a)
    }

    pub fn index(&self) -> Option<&Attribute> {
        self.index.as_ref()
    }

    pub fn is_instanced(&self) -> bool {
        self.is_instanced
    }

    pub fn instanced_count(&self) -> usize {
        self.instanced_count
    }

    pub fn draw_range(&self) -> DrawRange {
        self.draw_range
    }

    /// Explicit override for partial draws.
    pub fn set_draw_range(&mut self, start: usize, count: usize) {
        self.draw_range = DrawRange { start, count };
    }

    /// Explicit override of the derived instance count.
    pub fn set_instanced_count(&mut self, count: usize) {
        self.instanced_count = count;
    }

    /// Re-upload one attribute's data immediately, outside a draw.
    pub fn update_attribute(&mut self, renderer: &mut Renderer, name: &str) {
        if name == INDEX {
            if let Some(index) = &mut self.index {
                upload_attribute(renderer, INDEX, index, true);
            }
            return;
        }
        if let Some((_, attr)) = self.attributes.iter_mut().find(|(n, _)| n == name) {
            upload_attribute(renderer, name, attr, true);
        }
        if name == "position" {
            self.bounds = None;
        }
    }

    /// Bounding sphere of the `position` attribute, computed once and
    /// cached. `None` when there is no position data; such geometry is
    /// treated as never-culled by the camera.
    pub fn bounding_sphere(&mut self) -> Option<BoundingSphere> {
        if self.bounds.is_some() {
            return self.bounds;
        }
        let position = self.attribute("position")?;
        let AttributeData::F32(data) = &position.data else {
            return None;
        };
        let size = position.size as usize;
        if size < 2 || data.len() < size {
            return None;
        }

        let mut min = Vector3::new(f32::MAX, f32::MAX, f32::MAX);
        let mut max = Vector3::new(f32::MIN, f32::MIN, f32::MIN);
        for vertex in data.chunks_exact(size) {
            let p = Vector3::new(vertex[0], vertex[1], if size > 2 { vertex[2] } else { 0.0 });
            min = Vector3::new(min.x.min(p.x), min.y.min(p.y), min.z.min(p.z));
            max = Vector3::new(max.x.max(p.x), max.y.max(p.y), max.z.max(p.z));
        }
        let center = (min + max) / 2.0;
        let mut radius: f32 = 0.0;
        for vertex in data.chunks_exact(size) {
            let p = Vector3::new(vertex[0], vertex[1], if size > 2 { vertex[2] } else { 0.0 });
            let d = p - center;
            radius = radius.max(d.x * d.x + d.y * d.y + d.z * d.z);
        }
        self.bounds = Some(BoundingSphere {
            center,
            radius: radius.sqrt(),
        });
        self.bounds
    }

    /// Bind this geometry for `program` if the renderer does not already
    /// have this pairing live, then dispatch the draw call: indexed or
    /// array, instanced or plain, over the draw range.
    pub fn draw(
        &mut self,
        renderer: &mut Renderer,
        program: &Program,
        mode: DrawMode,
    ) -> Result<(), DeviceError> {
        if !program.is_linked() {
            return Ok(());
        }
        let key = format!("{}#{}", program.attribute_layout_key(), self.id);
        if renderer.bound_geometry_key() != Some(key.as_str()) {
            if renderer.caps().vertex_array_objects {
                let vao = match self.binding(&key) {
                    Some(vao) => vao,
                    None => self.create_binding(renderer, program, &key)?,
                };
                renderer.bind_vertex_array(Some(vao));
            } else {
                self.bind_attributes(renderer, program);
            }
            renderer.set_bound_geometry_key(key);
        }

        self.flush_updates(renderer);

        let DrawRange { start, count } = self.draw_range;
        let instancing = renderer.caps().instancing;
        if self.is_instanced && !instancing {
            warn!("device lacks instancing support, drawing a single instance");
        }
        match (&self.index, self.is_instanced && instancing) {
            (Some(index), true) => renderer.device_mut().draw_elements_instanced(
                mode,
                count as i32,
                index.ty,
                index.offset + start * index.ty.byte_size(),
                self.instanced_count as i32,
            ),
            (Some(index), false) => renderer.device_mut().draw_elements(
                mode,
                count as i32,
                index.ty,
                index.offset + start * index.ty.byte_size(),
            ),
            (None, true) => renderer.device_mut().draw_arrays_instanced(
                mode,
                start as i32,
                count as i32,
                self.instanced_count as i32,
            ),
            (None, false) => renderer
                .device_mut()
                .draw_arrays(mode, start as i32, count as i32),
        }
        Ok(())
    }

    /// Release all device buffers and cached bindings.
    pub fn remove(&mut self, renderer: &mut Renderer) {
        for (_, vao) in self.bindings.drain(..) {
            renderer.delete_vertex_array(vao);
        }
        for (_, attr) in &mut self.attributes {
            if let Some(buffer) = attr.buffer.take() {
                renderer.device_mut().delete_buffer(buffer);
            }
        }
        if let Some(index) = &mut self.index
            && let Some(buffer) = index.buffer.take()
        {
            renderer.device_mut().delete_buffer(buffer);
        }
    }

    fn binding(&self, key: &str) -> Option<VertexArrayHandle> {
        self.bindings
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, vao)| *vao)
    }

    /// Compile the vertex binding for one program layout and cache it.
    fn create_binding(
        &mut self,
        renderer: &mut Renderer,
        program: &Program,
        key: &str,
    ) -> Result<VertexArrayHandle, DeviceError> {
        let vao = renderer.device_mut().create_vertex_array()?;
        renderer.bind_vertex_array(Some(vao));
        self.bind_attributes(renderer, program);
        self.bindings.push((key.to_string(), vao));
        Ok(vao)
    }

    /// Point every attribute the program declares at our buffers. An
    /// attribute the program expects but we lack only warns; the draw
    /// proceeds with whatever is bound.
    fn bind_attributes(&self, renderer: &mut Renderer, program: &Program) {
        let instancing = renderer.caps().instancing;
        for active in program.attributes() {
            let Some(attr) = self.attribute(&active.name) else {
                warn!(
                    "geometry is missing attribute '{}' required by the program",
                    active.name
                );
                continue;
            };
            let Some(buffer) = attr.buffer else {
                continue;
            };
            renderer.bind_buffer(BufferTarget::Array, buffer);
            renderer.device_mut().enable_vertex_attrib(active.location);
            renderer.device_mut().vertex_attrib_pointer(
                active.location,
                attr.size,
                attr.ty,
                attr.normalized,
                attr.stride,
                attr.offset,
            );
            if attr.divisor > 0 {
                if instancing {
                    renderer
                        .device_mut()
                        .vertex_attrib_divisor(active.location, attr.divisor);
                } else {
                    warn!(
                        "attribute '{}' requests instancing but the device does not support it",
                        active.name
                    );
                }
            }
        }
        if let Some(index) = &self.index
            && let Some(buffer) = index.buffer
        {
            renderer.bind_buffer(BufferTarget::ElementArray, buffer);
        }
    }

    /// Re-upload any attribute the caller flagged with `needs_update`.
    fn flush_updates(&mut self, renderer: &mut Renderer) {
        for (name, attr) in &mut self.attributes {
            if attr.needs_update {
                upload_attribute(renderer, name, attr, false);
                if name == "position" {
                    self.bounds = None;
                }
            }
        }
        if let Some(index) = &mut self.index
            && index.needs_update
        {
            // Our own binding is live here, so refreshing the element-array
            // bind inside it is correct.
            upload_attribute(renderer, INDEX, index, false);
        }
    }
}

impl Default for Geometry {
    fn default() -> Self {
        Self::new()
    }
}

fn upload_attribute(renderer: &mut Renderer, name: &str, attr: &mut Attribute, detach_vao: bool) {
    let Some(buffer) = attr.buffer else {
        return;
    };
    let target = if name == INDEX {
        // Element-array binds are captured by whatever VAO is live; when
        // uploading outside a draw, detach it so the upload cannot clobber
        // another geometry's binding.
        if detach_vao {
            renderer.bind_vertex_array(None);
        }
        BufferTarget::ElementArray
    } else {
        BufferTarget::Array
    };
    renderer.bind_buffer(target, buffer);
    renderer
        .device_mut()
        .buffer_data(target, attr.data.bytes(), attr.usage);
    attr.count = attr.data.len() / attr.size.max(1) as usize;
    attr.needs_update = false;
}
