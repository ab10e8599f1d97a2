mod common;

use common::test_utils::{active_uniform, stubbed_program, test_renderer};
use fxhash::FxHashMap;
use glint::device::trace::TraceCall;
use glint::device::{TextureHandle, TextureTarget, UniformKind, UniformLocation};
use glint::program::UniformValue;
use glint::texture::Texture;

#[test]
fn should_upload_plain_uniforms_and_skip_unchanged_values() {
    let (mut renderer, device) = test_renderer();
    let mut program = stubbed_program(
        &mut renderer,
        &device,
        vec![active_uniform("opacity", UniformKind::Float)],
        vec![],
    );
    program.uniforms.insert("opacity".into(), 0.5.into());

    program.use_program(&mut renderer, false);
    program.use_program(&mut renderer, false);
    assert_eq!(device.count(|c| matches!(c, TraceCall::Uniform1f(..))), 1);

    program.uniforms.insert("opacity".into(), 0.75.into());
    program.use_program(&mut renderer, false);
    assert_eq!(
        device.filtered(|c| matches!(c, TraceCall::Uniform1f(..))),
        vec![
            TraceCall::Uniform1f(UniformLocation(0), 0.5),
            TraceCall::Uniform1f(UniformLocation(0), 0.75),
        ]
    );

    // The program itself is also only bound once.
    assert_eq!(device.count(|c| matches!(c, TraceCall::UseProgram(_))), 1);
}

#[test]
fn should_resolve_struct_members() {
    let (mut renderer, device) = test_renderer();
    let mut program = stubbed_program(
        &mut renderer,
        &device,
        vec![active_uniform("light.intensity", UniformKind::Float)],
        vec![],
    );
    let mut light = FxHashMap::default();
    light.insert("intensity".to_string(), UniformValue::Float(2.0));
    program
        .uniforms
        .insert("light".into(), UniformValue::Struct(light));

    program.use_program(&mut renderer, false);

    assert_eq!(
        device.filtered(|c| matches!(c, TraceCall::Uniform1f(..))),
        vec![TraceCall::Uniform1f(UniformLocation(0), 2.0)]
    );
}

#[test]
fn should_resolve_struct_array_members() {
    let (mut renderer, device) = test_renderer();
    let mut program = stubbed_program(
        &mut renderer,
        &device,
        vec![
            active_uniform("lights[0].color", UniformKind::FloatVec3),
            active_uniform("lights[1].color", UniformKind::FloatVec3),
        ],
        vec![],
    );
    let element = |r: f32| {
        let mut m = FxHashMap::default();
        m.insert("color".to_string(), UniformValue::Vec3([r, 0.0, 0.0]));
        m
    };
    program.uniforms.insert(
        "lights".into(),
        UniformValue::StructArray(vec![element(0.25), element(0.5)]),
    );

    program.use_program(&mut renderer, false);

    assert_eq!(
        device.filtered(|c| matches!(c, TraceCall::Uniform3fv(..))),
        vec![
            TraceCall::Uniform3fv(UniformLocation(0), vec![0.25, 0.0, 0.0]),
            TraceCall::Uniform3fv(UniformLocation(1), vec![0.5, 0.0, 0.0]),
        ]
    );
}

#[test]
fn should_flatten_vector_array_values() {
    let (mut renderer, device) = test_renderer();
    let mut program = stubbed_program(
        &mut renderer,
        &device,
        vec![active_uniform("palette[0]", UniformKind::FloatVec3)],
        vec![],
    );
    program.uniforms.insert(
        "palette".into(),
        UniformValue::Vec3Array(vec![[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]),
    );

    program.use_program(&mut renderer, false);

    assert_eq!(
        device.filtered(|c| matches!(c, TraceCall::Uniform3fv(..))),
        vec![TraceCall::Uniform3fv(
            UniformLocation(0),
            vec![1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
        )]
    );
}

#[test]
fn should_skip_declared_uniforms_without_values() {
    let (mut renderer, device) = test_renderer();
    let mut program = stubbed_program(
        &mut renderer,
        &device,
        vec![active_uniform("missing", UniformKind::FloatVec4)],
        vec![],
    );

    program.use_program(&mut renderer, false);

    assert_eq!(device.count(|c| matches!(c, TraceCall::Uniform4fv(..))), 0);
}

#[test]
fn should_bind_textures_to_their_pinned_units() {
    let (mut renderer, device) = test_renderer();
    let mut program = stubbed_program(
        &mut renderer,
        &device,
        vec![active_uniform("map", UniformKind::Sampler2D)],
        vec![],
    );
    let texture = Texture {
        handle: TextureHandle(42),
        target: TextureTarget::D2,
        unit: 3,
    };
    program.uniforms.insert("map".into(), texture.into());

    program.use_program(&mut renderer, false);

    assert_eq!(
        device.filtered(|c| matches!(c, TraceCall::Uniform1i(..))),
        vec![TraceCall::Uniform1i(UniformLocation(0), 3)]
    );
    assert_eq!(
        device.filtered(|c| matches!(c, TraceCall::BindTexture(..))),
        vec![TraceCall::BindTexture(TextureTarget::D2, TextureHandle(42))]
    );
    assert_eq!(
        device.filtered(|c| matches!(c, TraceCall::ActiveTexture(_))),
        vec![TraceCall::ActiveTexture(3)]
    );
}

#[test]
fn should_switch_to_sequential_units_on_a_collision() {
    let (mut renderer, device) = test_renderer();
    let mut program = stubbed_program(
        &mut renderer,
        &device,
        vec![
            active_uniform("map_a", UniformKind::Sampler2D),
            active_uniform("map_b", UniformKind::Sampler2D),
        ],
        vec![],
    );
    let texture = |handle: u32| Texture {
        handle: TextureHandle(handle),
        target: TextureTarget::D2,
        unit: 0,
    };
    program.uniforms.insert("map_a".into(), texture(1).into());
    program.uniforms.insert("map_b".into(), texture(2).into());

    program.use_program(&mut renderer, false);

    // Both pinned unit 0: the whole program falls back to sequential units.
    assert_eq!(
        device.filtered(|c| matches!(c, TraceCall::Uniform1i(..))),
        vec![
            TraceCall::Uniform1i(UniformLocation(0), 0),
            TraceCall::Uniform1i(UniformLocation(1), 1),
        ]
    );
}

#[test]
fn should_number_texture_array_units_contiguously() {
    let (mut renderer, device) = test_renderer();
    let mut program = stubbed_program(
        &mut renderer,
        &device,
        vec![active_uniform("shadow_maps[0]", UniformKind::Sampler2D)],
        vec![],
    );
    let texture = |handle: u32| Texture {
        handle: TextureHandle(handle),
        target: TextureTarget::D2,
        unit: 0,
    };
    program.uniforms.insert(
        "shadow_maps".into(),
        UniformValue::TextureArray(vec![texture(1), texture(2), texture(3)]),
    );

    program.use_program(&mut renderer, false);

    // Three textures pinned to the same unit collide; the array receives
    // sequential units instead.
    assert_eq!(
        device.filtered(|c| matches!(c, TraceCall::Uniform1iv(..))),
        vec![TraceCall::Uniform1iv(UniformLocation(0), vec![0, 1, 2])]
    );
    assert_eq!(
        device.filtered(|c| matches!(c, TraceCall::ActiveTexture(_))),
        vec![
            TraceCall::ActiveTexture(0),
            TraceCall::ActiveTexture(1),
            TraceCall::ActiveTexture(2),
        ]
    );
}

#[test]
fn should_stay_inert_when_compilation_fails() {
    let (mut renderer, device) = test_renderer();
    device.fail_next_compile("syntax error");

    let mut program = glint::Program::new(&mut renderer, "bad source", "void main() {}");
    assert!(!program.is_linked());

    program.use_program(&mut renderer, false);
    assert_eq!(device.count(|c| matches!(c, TraceCall::UseProgram(_))), 0);
}
