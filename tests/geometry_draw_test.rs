mod common;

use common::test_utils::{position_program, quad_geometry, test_renderer, test_renderer_with};
use glint::device::trace::TraceCall;
use glint::device::{Capabilities, DataType, DrawMode};
use glint::geometry::{Attribute, AttributeData};

#[test]
fn should_draw_the_full_non_indexed_range() {
    let (mut renderer, device) = test_renderer();
    let program = position_program(&mut renderer, &device);
    let mut geometry = quad_geometry(&mut renderer);

    geometry
        .draw(&mut renderer, &program, DrawMode::TriangleStrip)
        .unwrap();

    assert_eq!(
        device.filtered(|c| matches!(c, TraceCall::DrawArrays { .. })),
        vec![TraceCall::DrawArrays {
            mode: DrawMode::TriangleStrip,
            first: 0,
            count: 4,
        }]
    );
}

#[test]
fn should_compile_the_vertex_binding_once_per_program_layout() {
    let (mut renderer, device) = test_renderer();
    let program = position_program(&mut renderer, &device);
    let mut geometry = quad_geometry(&mut renderer);

    geometry
        .draw(&mut renderer, &program, DrawMode::Triangles)
        .unwrap();
    geometry
        .draw(&mut renderer, &program, DrawMode::Triangles)
        .unwrap();

    assert_eq!(
        device.count(|c| matches!(c, TraceCall::CreateVertexArray(_))),
        1
    );
    // The second draw finds the pairing already live and skips the rebind.
    assert_eq!(
        device.count(|c| matches!(c, TraceCall::BindVertexArray(Some(_)))),
        1
    );
    assert_eq!(device.count(|c| matches!(c, TraceCall::DrawArrays { .. })), 2);
}

#[test]
fn should_dispatch_indexed_draws_over_the_element_buffer() {
    let (mut renderer, device) = test_renderer();
    let program = position_program(&mut renderer, &device);
    let mut geometry = quad_geometry(&mut renderer);
    geometry
        .add_attribute(
            &mut renderer,
            "index",
            Attribute::new(1, AttributeData::U16(vec![0, 1, 2, 2, 1, 3])),
        )
        .unwrap();

    geometry
        .draw(&mut renderer, &program, DrawMode::Triangles)
        .unwrap();

    assert_eq!(
        device.filtered(|c| matches!(c, TraceCall::DrawElements { .. })),
        vec![TraceCall::DrawElements {
            mode: DrawMode::Triangles,
            count: 6,
            ty: DataType::U16,
            offset: 0,
        }]
    );
}

#[test]
fn should_offset_partial_indexed_draws_in_bytes() {
    let (mut renderer, device) = test_renderer();
    let program = position_program(&mut renderer, &device);
    let mut geometry = quad_geometry(&mut renderer);
    geometry
        .add_attribute(
            &mut renderer,
            "index",
            Attribute::new(1, AttributeData::U16(vec![0, 1, 2, 2, 1, 3])),
        )
        .unwrap();
    geometry.set_draw_range(3, 3);

    geometry
        .draw(&mut renderer, &program, DrawMode::Triangles)
        .unwrap();

    assert_eq!(
        device.filtered(|c| matches!(c, TraceCall::DrawElements { .. })),
        vec![TraceCall::DrawElements {
            mode: DrawMode::Triangles,
            count: 3,
            ty: DataType::U16,
            offset: 6,
        }]
    );
}

#[test]
fn should_clamp_disagreeing_instance_counts() {
    let (mut renderer, _device) = test_renderer();
    let mut geometry = quad_geometry(&mut renderer);

    geometry
        .add_attribute(
            &mut renderer,
            "offset",
            Attribute::new(3, AttributeData::F32(vec![0.0; 12])).instanced(1),
        )
        .unwrap();
    assert_eq!(geometry.instanced_count(), 4);

    geometry
        .add_attribute(
            &mut renderer,
            "tint",
            Attribute::new(3, AttributeData::F32(vec![0.0; 6])).instanced(1),
        )
        .unwrap();
    assert_eq!(geometry.instanced_count(), 2);
}

#[test]
fn should_draw_instanced_with_the_derived_count() {
    let (mut renderer, device) = test_renderer();
    let program = position_program(&mut renderer, &device);
    let mut geometry = quad_geometry(&mut renderer);
    geometry
        .add_attribute(
            &mut renderer,
            "offset",
            Attribute::new(3, AttributeData::F32(vec![0.0; 9])).instanced(1),
        )
        .unwrap();

    geometry
        .draw(&mut renderer, &program, DrawMode::Triangles)
        .unwrap();

    assert_eq!(
        device.filtered(|c| matches!(c, TraceCall::DrawArraysInstanced { .. })),
        vec![TraceCall::DrawArraysInstanced {
            mode: DrawMode::Triangles,
            first: 0,
            count: 4,
            instances: 3,
        }]
    );
}

#[test]
fn should_dispatch_instanced_indexed_draws_with_the_byte_offset() {
    let (mut renderer, device) = test_renderer();
    let program = position_program(&mut renderer, &device);
    let mut geometry = quad_geometry(&mut renderer);
    geometry
        .add_attribute(
            &mut renderer,
            "index",
            Attribute::new(1, AttributeData::U16(vec![0, 1, 2, 2, 1, 3])),
        )
        .unwrap();
    geometry
        .add_attribute(
            &mut renderer,
            "offset",
            Attribute::new(3, AttributeData::F32(vec![0.0; 9])).instanced(1),
        )
        .unwrap();
    geometry.set_draw_range(3, 3);

    geometry
        .draw(&mut renderer, &program, DrawMode::Triangles)
        .unwrap();

    assert_eq!(
        device.filtered(|c| matches!(c, TraceCall::DrawElementsInstanced { .. })),
        vec![TraceCall::DrawElementsInstanced {
            mode: DrawMode::Triangles,
            count: 3,
            ty: DataType::U16,
            offset: 6,
            instances: 3,
        }]
    );
}

#[test]
fn should_fall_back_to_plain_binds_without_vertex_array_support() {
    let caps = Capabilities {
        vertex_array_objects: false,
        ..Capabilities::default()
    };
    let (mut renderer, device) = test_renderer_with(caps);
    let program = position_program(&mut renderer, &device);
    let mut geometry = quad_geometry(&mut renderer);

    geometry
        .draw(&mut renderer, &program, DrawMode::Triangles)
        .unwrap();

    assert_eq!(
        device.count(|c| matches!(c, TraceCall::CreateVertexArray(_))),
        0
    );
    assert_eq!(
        device.count(|c| matches!(c, TraceCall::VertexAttribPointer { .. })),
        1
    );
    assert_eq!(device.count(|c| matches!(c, TraceCall::DrawArrays { .. })), 1);
}

#[test]
fn should_reupload_flagged_attributes_before_drawing() {
    let (mut renderer, device) = test_renderer();
    let program = position_program(&mut renderer, &device);
    let mut geometry = quad_geometry(&mut renderer);
    geometry
        .draw(&mut renderer, &program, DrawMode::Triangles)
        .unwrap();
    device.clear();

    let position = geometry.attribute_mut("position").unwrap();
    if let AttributeData::F32(data) = &mut position.data {
        data[0] = 5.0;
    }
    position.needs_update = true;
    geometry
        .draw(&mut renderer, &program, DrawMode::Triangles)
        .unwrap();

    assert_eq!(device.count(|c| matches!(c, TraceCall::BufferData { .. })), 1);
}
