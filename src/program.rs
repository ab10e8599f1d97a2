//! Shader programs: compilation, uniform diffing and texture units.
//!
//! A [`Program`] compiles vertex/fragment source through the device, then
//! introspects the active uniforms once and classifies each name into a
//! [`UniformIdent`] (plain, struct member or struct-array member) so that
//! per-draw resolution is a plain match instead of repeated string parsing.
//!
//! [`Program::use_program`] diffs every supplied value against the last one
//! sent to that location and skips redundant uploads; array values flatten
//! into reusable scratch buffers keyed by length. Texture-valued uniforms
//! get their device units from the caller's pins unless a collision was
//! ever observed for this program, after which assignment is strictly
//! sequential (the flag is sticky, amortizing the collision check).
//!
//! Compile and link failures are surfaced as diagnostics (source annotated
//! with line numbers) but still produce an inert object; this mirrors how
//! the device itself tolerates broken programs without raising.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicUsize, Ordering};

use cgmath::{Matrix3, Matrix4};
use fxhash::FxHashMap;
use log::{error, warn};

use crate::device::{
    ActiveAttribute, BlendEquation, BlendFactor, Capability, CullFace, DepthFunc, FrontFace,
    ProgramHandle, ShaderStage, UniformKind, UniformLocation,
};
use crate::renderer::Renderer;
use crate::texture::Texture;

/// Cap on missing-uniform warnings so a per-frame misconfiguration cannot
/// flood the log.
const WARN_LIMIT: usize = 100;

static WARN_COUNT: AtomicUsize = AtomicUsize::new(0);

fn warn_capped(args: std::fmt::Arguments) {
    let n = WARN_COUNT.fetch_add(1, Ordering::Relaxed);
    if n < WARN_LIMIT {
        warn!("{}", args);
        if n + 1 == WARN_LIMIT {
            warn!("uniform warning limit reached, suppressing further warnings");
        }
    }
}

/// A uniform value supplied by the caller. The shape is decided when the
/// value is declared, not re-sniffed on every upload.
#[derive(Clone, Debug, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Int(i32),
    Bool(bool),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    Mat3([f32; 9]),
    Mat4([f32; 16]),
    FloatArray(Vec<f32>),
    IntArray(Vec<i32>),
    Vec2Array(Vec<[f32; 2]>),
    Vec3Array(Vec<[f32; 3]>),
    Vec4Array(Vec<[f32; 4]>),
    Mat3Array(Vec<[f32; 9]>),
    Mat4Array(Vec<[f32; 16]>),
    Texture(Texture),
    TextureArray(Vec<Texture>),
    Struct(FxHashMap<String, UniformValue>),
    StructArray(Vec<FxHashMap<String, UniformValue>>),
}

impl From<f32> for UniformValue {
    fn from(v: f32) -> Self {
        UniformValue::Float(v)
    }
}

impl From<i32> for UniformValue {
    fn from(v: i32) -> Self {
        UniformValue::Int(v)
    }
}

impl From<bool> for UniformValue {
    fn from(v: bool) -> Self {
        UniformValue::Bool(v)
    }
}

impl From<[f32; 2]> for UniformValue {
    fn from(v: [f32; 2]) -> Self {
        UniformValue::Vec2(v)
    }
}

impl From<[f32; 3]> for UniformValue {
    fn from(v: [f32; 3]) -> Self {
        UniformValue::Vec3(v)
    }
}

impl From<[f32; 4]> for UniformValue {
    fn from(v: [f32; 4]) -> Self {
        UniformValue::Vec4(v)
    }
}

impl From<cgmath::Vector2<f32>> for UniformValue {
    fn from(v: cgmath::Vector2<f32>) -> Self {
        UniformValue::Vec2(v.into())
    }
}

impl From<cgmath::Vector3<f32>> for UniformValue {
    fn from(v: cgmath::Vector3<f32>) -> Self {
        UniformValue::Vec3(v.into())
    }
}

impl From<cgmath::Vector4<f32>> for UniformValue {
    fn from(v: cgmath::Vector4<f32>) -> Self {
        UniformValue::Vec4(v.into())
    }
}

impl From<Matrix3<f32>> for UniformValue {
    fn from(m: Matrix3<f32>) -> Self {
        UniformValue::Mat3(mat3_to_array(&m))
    }
}

impl From<Matrix4<f32>> for UniformValue {
    fn from(m: Matrix4<f32>) -> Self {
        UniformValue::Mat4(mat4_to_array(&m))
    }
}

impl From<Texture> for UniformValue {
    fn from(t: Texture) -> Self {
        UniformValue::Texture(t)
    }
}

pub(crate) fn mat4_to_array(m: &Matrix4<f32>) -> [f32; 16] {
    let cols: [[f32; 4]; 4] = (*m).into();
    let mut out = [0.0; 16];
    for (i, col) in cols.iter().enumerate() {
        out[i * 4..i * 4 + 4].copy_from_slice(col);
    }
    out
}

pub(crate) fn mat3_to_array(m: &Matrix3<f32>) -> [f32; 9] {
    let cols: [[f32; 3]; 3] = (*m).into();
    let mut out = [0.0; 9];
    for (i, col) in cols.iter().enumerate() {
        out[i * 3..i * 3 + 3].copy_from_slice(col);
    }
    out
}

/// Classified shape of an active uniform name, parsed once at link time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UniformIdent {
    Plain(String),
    StructMember { name: String, prop: String },
    StructArrayMember { name: String, index: usize, prop: String },
}

/// Parse a reported active-uniform name. Array uniforms report with a
/// trailing `[0]`, struct members as `name.prop`, struct-array members as
/// `name[i].prop`.
fn parse_ident(reported: &str) -> UniformIdent {
    let name = reported.strip_suffix("[0]").unwrap_or(reported);
    let Some(dot) = name.find('.') else {
        return UniformIdent::Plain(name.to_string());
    };
    let (base, prop) = (&name[..dot], &name[dot + 1..]);
    match (base.find('['), base.ends_with(']')) {
        (Some(open), true) => {
            let index = base[open + 1..base.len() - 1].parse().unwrap_or(0);
            UniformIdent::StructArrayMember {
                name: base[..open].to_string(),
                index,
                prop: prop.to_string(),
            }
        }
        _ => UniformIdent::StructMember {
            name: base.to_string(),
            prop: prop.to_string(),
        },
    }
}

struct UniformEntry {
    ident: UniformIdent,
    reported_name: String,
    kind: UniformKind,
    location: UniformLocation,
    last_f: Vec<f32>,
    last_i: Vec<i32>,
    sent: bool,
}

/// Blend function of a program's render-state block. `alpha` switches to
/// the separate-alpha form.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BlendFuncState {
    pub src: BlendFactor,
    pub dst: BlendFactor,
    pub alpha: Option<(BlendFactor, BlendFactor)>,
}

pub struct Program {
    handle: Option<ProgramHandle>,
    entries: Vec<UniformEntry>,
    attributes: Vec<ActiveAttribute>,
    attribute_key: String,
    /// Caller-supplied uniform values, resolved against the active uniform
    /// set on every [`Program::use_program`].
    pub uniforms: FxHashMap<String, UniformValue>,

    // Render-state block, applied through the renderer's cached setters.
    pub transparent: bool,
    pub cull_face: Option<CullFace>,
    pub front_face: FrontFace,
    pub depth_test: bool,
    pub depth_write: bool,
    pub depth_func: DepthFunc,
    pub blend_func: Option<BlendFuncState>,
    pub blend_equation: BlendEquation,

    /// Sticky: once any texture-unit collision is seen, every texture
    /// uniform of this program is assigned sequentially from then on.
    assign_texture_units: bool,
    flatten_cache: FxHashMap<usize, Vec<f32>>,
}

impl Program {
    /// Compile and link. Failures log the diagnostic (with line-numbered
    /// source) and yield an inert program: `is_linked()` is false and
    /// `use_program` is a warned no-op.
    pub fn new(renderer: &mut Renderer, vertex: &str, fragment: &str) -> Self {
        let device = renderer.device_mut();

        let vs = match device.compile_shader(ShaderStage::Vertex, vertex) {
            Ok(vs) => vs,
            Err(info_log) => {
                error!(
                    "vertex shader failed to compile: {}\n{}",
                    info_log,
                    number_lines(vertex)
                );
                return Self::inert();
            }
        };
        let fs = match device.compile_shader(ShaderStage::Fragment, fragment) {
            Ok(fs) => fs,
            Err(info_log) => {
                error!(
                    "fragment shader failed to compile: {}\n{}",
                    info_log,
                    number_lines(fragment)
                );
                device.delete_shader(vs);
                return Self::inert();
            }
        };
        let handle = match device.link_program(vs, fs) {
            Ok(handle) => handle,
            Err(info_log) => {
                error!("program failed to link: {}", info_log);
                device.delete_shader(vs);
                device.delete_shader(fs);
                return Self::inert();
            }
        };
        device.delete_shader(vs);
        device.delete_shader(fs);

        let mut entries = Vec::new();
        for uniform in device.active_uniforms(handle) {
            let Some(location) = device.uniform_location(handle, &uniform.name) else {
                continue;
            };
            entries.push(UniformEntry {
                ident: parse_ident(&uniform.name),
                reported_name: uniform.name,
                kind: uniform.kind,
                location,
                last_f: Vec::new(),
                last_i: Vec::new(),
                sent: false,
            });
        }

        let mut attributes = device.active_attributes(handle);
        attributes.sort_by_key(|a| a.location);
        let mut attribute_key = String::new();
        for attr in &attributes {
            let _ = write!(attribute_key, "{}:{},", attr.location, attr.name);
        }

        Self {
            handle: Some(handle),
            entries,
            attributes,
            attribute_key,
            ..Self::inert()
        }
    }

    fn inert() -> Self {
        Self {
            handle: None,
            entries: Vec::new(),
            attributes: Vec::new(),
            attribute_key: String::new(),
            uniforms: FxHashMap::default(),
            transparent: false,
            cull_face: Some(CullFace::Back),
            front_face: FrontFace::Ccw,
            depth_test: true,
            depth_write: true,
            depth_func: DepthFunc::Less,
            blend_func: None,
            blend_equation: BlendEquation::Add,
            assign_texture_units: false,
            flatten_cache: FxHashMap::default(),
        }
    }

    pub fn is_linked(&self) -> bool {
        self.handle.is_some()
    }

    pub fn handle(&self) -> Option<ProgramHandle> {
        self.handle
    }

    /// Active attributes sorted by location.
    pub fn attributes(&self) -> &[ActiveAttribute] {
        &self.attributes
    }

    /// Stable key describing this program's attribute-location layout;
    /// geometry bindings are cached per distinct key.
    pub fn attribute_layout_key(&self) -> &str {
        &self.attribute_key
    }

    /// Bind (if not already active), upload changed uniforms, bind textures
    /// and apply the render-state block. `flip_faces` swaps the front-face
    /// winding for nodes with a negative-determinant world scale.
    pub fn use_program(&mut self, renderer: &mut Renderer, flip_faces: bool) {
        let Some(handle) = self.handle else {
            warn_capped(format_args!(
                "use_program called on a program that failed to compile or link"
            ));
            return;
        };
        renderer.use_program_handle(handle);

        if !self.assign_texture_units && has_unit_collision(&self.entries, &self.uniforms) {
            self.assign_texture_units = true;
        }

        let mut next_unit: u32 = 0;
        for entry in self.entries.iter_mut() {
            let Some(value) = lookup(&self.uniforms, &entry.ident) else {
                warn_capped(format_args!(
                    "no value supplied for active uniform '{}'",
                    entry.reported_name
                ));
                continue;
            };
            upload_entry(
                renderer,
                entry,
                value,
                &mut self.flatten_cache,
                self.assign_texture_units,
                &mut next_unit,
            );
        }

        self.apply_state(renderer, flip_faces);
    }

    /// Release the device program. The object stays inert afterwards.
    pub fn remove(&mut self, renderer: &mut Renderer) {
        if let Some(handle) = self.handle.take() {
            renderer.device_mut().delete_program(handle);
        }
    }

    fn apply_state(&self, renderer: &mut Renderer, flip_faces: bool) {
        if self.depth_test {
            renderer.enable(Capability::DepthTest);
        } else {
            renderer.disable(Capability::DepthTest);
        }
        renderer.set_depth_mask(self.depth_write);
        renderer.set_depth_func(self.depth_func);

        match self.cull_face {
            Some(face) => {
                renderer.enable(Capability::CullFace);
                renderer.set_cull_face(face);
            }
            None => renderer.disable(Capability::CullFace),
        }
        let winding = if flip_faces {
            match self.front_face {
                FrontFace::Ccw => FrontFace::Cw,
                FrontFace::Cw => FrontFace::Ccw,
            }
        } else {
            self.front_face
        };
        renderer.set_front_face(winding);

        let blend = self.blend_func.or_else(|| {
            self.transparent.then_some(BlendFuncState {
                src: BlendFactor::SrcAlpha,
                dst: BlendFactor::OneMinusSrcAlpha,
                alpha: None,
            })
        });
        match blend {
            Some(func) => {
                renderer.enable(Capability::Blend);
                renderer.set_blend_func(func.src, func.dst, func.alpha);
                renderer.set_blend_equation(self.blend_equation);
            }
            None => renderer.disable(Capability::Blend),
        }
    }
}

/// Resolve a classified uniform against the supplied value map.
fn lookup<'a>(
    uniforms: &'a FxHashMap<String, UniformValue>,
    ident: &UniformIdent,
) -> Option<&'a UniformValue> {
    match ident {
        UniformIdent::Plain(name) => uniforms.get(name),
        UniformIdent::StructMember { name, prop } => match uniforms.get(name)? {
            UniformValue::Struct(members) => members.get(prop),
            _ => None,
        },
        UniformIdent::StructArrayMember { name, index, prop } => match uniforms.get(name)? {
            UniformValue::StructArray(elements) => elements.get(*index)?.get(prop),
            _ => None,
        },
    }
}

/// Pre-pass over all texture uniforms: true when any two resolve to the
/// same pinned device unit.
fn has_unit_collision(
    entries: &[UniformEntry],
    uniforms: &FxHashMap<String, UniformValue>,
) -> bool {
    let mut seen: Vec<u32> = Vec::new();
    for entry in entries {
        if !entry.kind.is_sampler() {
            continue;
        }
        let units: Vec<u32> = match lookup(uniforms, &entry.ident) {
            Some(UniformValue::Texture(t)) => vec![t.unit],
            Some(UniformValue::TextureArray(ts)) => ts.iter().map(|t| t.unit).collect(),
            _ => continue,
        };
        for unit in units {
            if seen.contains(&unit) {
                return true;
            }
            seen.push(unit);
        }
    }
    false
}

fn upload_entry(
    renderer: &mut Renderer,
    entry: &mut UniformEntry,
    value: &UniformValue,
    flatten_cache: &mut FxHashMap<usize, Vec<f32>>,
    sequential_units: bool,
    next_unit: &mut u32,
) {
    match (entry.kind, value) {
        (UniformKind::Float, UniformValue::Float(v)) => send_floats(renderer, entry, &[*v]),
        (UniformKind::Float, UniformValue::FloatArray(v)) => send_floats(renderer, entry, v),
        (UniformKind::FloatVec2, UniformValue::Vec2(v)) => send_floats(renderer, entry, v),
        (UniformKind::FloatVec3, UniformValue::Vec3(v)) => send_floats(renderer, entry, v),
        (UniformKind::FloatVec4, UniformValue::Vec4(v)) => send_floats(renderer, entry, v),
        (UniformKind::Mat3, UniformValue::Mat3(v)) => send_floats(renderer, entry, v),
        (UniformKind::Mat4, UniformValue::Mat4(v)) => send_floats(renderer, entry, v),
        (UniformKind::FloatVec2, UniformValue::Vec2Array(v)) => {
            let flat = flatten(flatten_cache, v.iter().map(|e| e.as_slice()), 2 * v.len());
            send_float_buffer(renderer, entry, flatten_cache, flat);
        }
        (UniformKind::FloatVec3, UniformValue::Vec3Array(v)) => {
            let flat = flatten(flatten_cache, v.iter().map(|e| e.as_slice()), 3 * v.len());
            send_float_buffer(renderer, entry, flatten_cache, flat);
        }
        (UniformKind::FloatVec4, UniformValue::Vec4Array(v)) => {
            let flat = flatten(flatten_cache, v.iter().map(|e| e.as_slice()), 4 * v.len());
            send_float_buffer(renderer, entry, flatten_cache, flat);
        }
        (UniformKind::Mat3, UniformValue::Mat3Array(v)) => {
            let flat = flatten(flatten_cache, v.iter().map(|e| e.as_slice()), 9 * v.len());
            send_float_buffer(renderer, entry, flatten_cache, flat);
        }
        (UniformKind::Mat4, UniformValue::Mat4Array(v)) => {
            let flat = flatten(flatten_cache, v.iter().map(|e| e.as_slice()), 16 * v.len());
            send_float_buffer(renderer, entry, flatten_cache, flat);
        }
        (UniformKind::Int, UniformValue::Int(v)) => send_ints(renderer, entry, &[*v]),
        (UniformKind::Int, UniformValue::IntArray(v)) => send_ints(renderer, entry, v),
        (UniformKind::Bool, UniformValue::Bool(v)) => send_ints(renderer, entry, &[*v as i32]),
        (UniformKind::Sampler2D | UniformKind::SamplerCube, UniformValue::Texture(texture)) => {
            let unit = if sequential_units {
                let unit = *next_unit;
                *next_unit += 1;
                unit
            } else {
                texture.unit
            };
            send_ints(renderer, entry, &[unit as i32]);
            renderer.bind_texture_unit(unit, texture.target, texture.handle);
        }
        (UniformKind::Sampler2D | UniformKind::SamplerCube, UniformValue::TextureArray(ts)) => {
            let mut units = Vec::with_capacity(ts.len());
            for texture in ts {
                let unit = if sequential_units {
                    let unit = *next_unit;
                    *next_unit += 1;
                    unit
                } else {
                    texture.unit
                };
                units.push(unit as i32);
                renderer.bind_texture_unit(unit, texture.target, texture.handle);
            }
            send_ints(renderer, entry, &units);
        }
        (kind, _) => warn_capped(format_args!(
            "value supplied for uniform '{}' does not match its declared type {:?}",
            entry.reported_name, kind
        )),
    }
}

/// Flatten fixed-size elements into a reusable scratch buffer keyed by the
/// flattened length; returns the key for [`send_float_buffer`].
fn flatten<'a>(
    cache: &mut FxHashMap<usize, Vec<f32>>,
    elements: impl Iterator<Item = &'a [f32]>,
    len: usize,
) -> usize {
    let buf = cache.entry(len).or_insert_with(|| Vec::with_capacity(len));
    buf.clear();
    for element in elements {
        buf.extend_from_slice(element);
    }
    len
}

fn send_float_buffer(
    renderer: &mut Renderer,
    entry: &mut UniformEntry,
    cache: &mut FxHashMap<usize, Vec<f32>>,
    key: usize,
) {
    // Move the scratch buffer out so it can be borrowed alongside the entry.
    let buf = cache.remove(&key).unwrap_or_default();
    send_floats(renderer, entry, &buf);
    cache.insert(key, buf);
}

/// Upload float components if they differ from the last-sent value.
fn send_floats(renderer: &mut Renderer, entry: &mut UniformEntry, data: &[f32]) {
    if entry.sent && entry.last_f.as_slice() == data {
        return;
    }
    entry.sent = true;
    entry.last_f.clear();
    entry.last_f.extend_from_slice(data);
    entry.last_i.clear();

    let device = renderer.device_mut();
    match entry.kind {
        UniformKind::Float if data.len() == 1 => device.uniform1f(entry.location, data[0]),
        UniformKind::Float => device.uniform1fv(entry.location, data),
        UniformKind::FloatVec2 => device.uniform2fv(entry.location, data),
        UniformKind::FloatVec3 => device.uniform3fv(entry.location, data),
        UniformKind::FloatVec4 => device.uniform4fv(entry.location, data),
        UniformKind::Mat3 => device.uniform_matrix3fv(entry.location, data),
        UniformKind::Mat4 => device.uniform_matrix4fv(entry.location, data),
        _ => {}
    }
}

/// Upload int components (including sampler units) if changed.
fn send_ints(renderer: &mut Renderer, entry: &mut UniformEntry, data: &[i32]) {
    if entry.sent && entry.last_i.as_slice() == data {
        return;
    }
    entry.sent = true;
    entry.last_i.clear();
    entry.last_i.extend_from_slice(data);
    entry.last_f.clear();

    let device = renderer.device_mut();
    if data.len() == 1 {
        device.uniform1i(entry.location, data[0]);
    } else {
        device.uniform1iv(entry.location, data);
    }
}

/// Annotate shader source with 1-based line numbers for diagnostics.
fn number_lines(source: &str) -> String {
    let mut out = String::new();
    for (i, line) in source.lines().enumerate() {
        let _ = writeln!(out, "{:>4}: {}", i + 1, line);
    }
    out
}
