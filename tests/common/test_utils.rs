use glint::device::trace::{ProgramStub, TraceDevice};
use glint::device::{ActiveAttribute, ActiveUniform, Capabilities, UniformKind};
use glint::geometry::{Attribute, AttributeData};
use glint::{Geometry, Program, Renderer};

pub(crate) const VERTEX_SRC: &str = "void main() { gl_Position = vec4(0.0); }";
pub(crate) const FRAGMENT_SRC: &str = "void main() {}";

pub(crate) fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Renderer over a recording device plus a probe handle into the same log.
pub(crate) fn test_renderer() -> (Renderer, TraceDevice) {
    test_renderer_with(Capabilities::default())
}

pub(crate) fn test_renderer_with(caps: Capabilities) -> (Renderer, TraceDevice) {
    init_logger();
    let device = TraceDevice::with_capabilities(caps);
    let probe = device.clone();
    (Renderer::new(Box::new(device), 800, 600), probe)
}

pub(crate) fn active_uniform(name: &str, kind: UniformKind) -> ActiveUniform {
    ActiveUniform {
        name: name.to_string(),
        kind,
        size: 1,
    }
}

pub(crate) fn active_attribute(name: &str, location: u32) -> ActiveAttribute {
    ActiveAttribute {
        name: name.to_string(),
        location,
    }
}

/// Link a program whose introspection results are scripted on the device.
pub(crate) fn stubbed_program(
    renderer: &mut Renderer,
    device: &TraceDevice,
    uniforms: Vec<ActiveUniform>,
    attributes: Vec<ActiveAttribute>,
) -> Program {
    device.stub_program(ProgramStub::new(uniforms, attributes));
    Program::new(renderer, VERTEX_SRC, FRAGMENT_SRC)
}

/// A program with a single `position` attribute and no uniforms.
pub(crate) fn position_program(renderer: &mut Renderer, device: &TraceDevice) -> Program {
    stubbed_program(
        renderer,
        device,
        vec![],
        vec![active_attribute("position", 0)],
    )
}

/// Four-vertex planar quad, non-indexed.
pub(crate) fn quad_geometry(renderer: &mut Renderer) -> Geometry {
    let mut geometry = Geometry::new();
    geometry
        .add_attribute(
            renderer,
            "position",
            Attribute::new(
                3,
                AttributeData::F32(vec![
                    -1.0, -1.0, 0.0, //
                    1.0, -1.0, 0.0, //
                    -1.0, 1.0, 0.0, //
                    1.0, 1.0, 0.0,
                ]),
            ),
        )
        .unwrap();
    geometry
}
