mod common;

use std::cell::RefCell;
use std::rc::Rc;

use cgmath::{Deg, Vector3};
use common::test_utils::{
    active_attribute, position_program, quad_geometry, stubbed_program, test_renderer,
};
use glint::device::trace::TraceCall;
use glint::geometry::{Attribute, AttributeData, Geometry};
use glint::scene::Mesh;
use glint::{Camera, RenderOptions, Scene};

#[test]
fn should_cull_meshes_outside_the_frustum() {
    let (mut renderer, device) = test_renderer();
    let program = Rc::new(RefCell::new(position_program(&mut renderer, &device)));
    let mut scene = Scene::new();

    let inside = Rc::new(RefCell::new(quad_geometry(&mut renderer)));
    let outside = Rc::new(RefCell::new(quad_geometry(&mut renderer)));
    let visible = scene.create_mesh(Mesh::new(inside, program.clone()));
    let culled = scene.create_mesh(Mesh::new(outside, program.clone()));
    scene
        .node_mut(visible)
        .unwrap()
        .transform
        .set_position(Vector3::new(0.0, 0.0, -5.0));
    scene
        .node_mut(culled)
        .unwrap()
        .transform
        .set_position(Vector3::new(100.0, 0.0, -5.0));

    let mut camera = Camera::new(Deg(60.0), 1.0, 0.1, 100.0);
    renderer
        .render(&mut scene, Some(&mut camera), RenderOptions::default())
        .unwrap();

    assert_eq!(device.count(|c| matches!(c, TraceCall::DrawArrays { .. })), 1);
}

#[test]
fn should_respect_the_per_mesh_opt_out() {
    let (mut renderer, device) = test_renderer();
    let program = Rc::new(RefCell::new(position_program(&mut renderer, &device)));
    let mut scene = Scene::new();

    let geometry = Rc::new(RefCell::new(quad_geometry(&mut renderer)));
    let mut mesh = Mesh::new(geometry, program.clone());
    mesh.frustum_culled = false;
    let id = scene.create_mesh(mesh);
    scene
        .node_mut(id)
        .unwrap()
        .transform
        .set_position(Vector3::new(100.0, 0.0, -5.0));

    let mut camera = Camera::new(Deg(60.0), 1.0, 0.1, 100.0);
    renderer
        .render(&mut scene, Some(&mut camera), RenderOptions::default())
        .unwrap();

    assert_eq!(device.count(|c| matches!(c, TraceCall::DrawArrays { .. })), 1);
}

#[test]
fn should_skip_culling_when_disabled_per_frame() {
    let (mut renderer, device) = test_renderer();
    let program = Rc::new(RefCell::new(position_program(&mut renderer, &device)));
    let mut scene = Scene::new();

    let geometry = Rc::new(RefCell::new(quad_geometry(&mut renderer)));
    let id = scene.create_mesh(Mesh::new(geometry, program.clone()));
    scene
        .node_mut(id)
        .unwrap()
        .transform
        .set_position(Vector3::new(100.0, 0.0, -5.0));

    let mut camera = Camera::new(Deg(60.0), 1.0, 0.1, 100.0);
    let opts = RenderOptions {
        frustum_cull: false,
        ..RenderOptions::default()
    };
    renderer.render(&mut scene, Some(&mut camera), opts).unwrap();

    assert_eq!(device.count(|c| matches!(c, TraceCall::DrawArrays { .. })), 1);
}

#[test]
fn should_never_cull_geometry_without_position_data() {
    let (mut renderer, device) = test_renderer();
    let program = Rc::new(RefCell::new(stubbed_program(
        &mut renderer,
        &device,
        vec![],
        vec![active_attribute("uv", 0)],
    )));
    let mut scene = Scene::new();

    let mut geometry = Geometry::new();
    geometry
        .add_attribute(
            &mut renderer,
            "uv",
            Attribute::new(2, AttributeData::F32(vec![0.0; 8])),
        )
        .unwrap();
    let id = scene.create_mesh(Mesh::new(Rc::new(RefCell::new(geometry)), program.clone()));
    scene
        .node_mut(id)
        .unwrap()
        .transform
        .set_position(Vector3::new(100.0, 0.0, -5.0));

    let mut camera = Camera::new(Deg(60.0), 1.0, 0.1, 100.0);
    renderer
        .render(&mut scene, Some(&mut camera), RenderOptions::default())
        .unwrap();

    assert_eq!(device.count(|c| matches!(c, TraceCall::DrawArrays { .. })), 1);
}

#[test]
fn should_retain_a_sphere_touching_a_plane_exactly() {
    let mut camera = Camera::new(Deg(60.0), 1.0, 0.1, 10.0);
    camera.orthographic(-1.0, 1.0, -1.0, 1.0, 0.1, 10.0);
    camera.update_matrix_world(None);
    camera.update_frustum();

    let center = Vector3::new(-2.0, 0.0, -5.0);
    // Distance to the left plane is exactly -radius.
    assert!(camera.frustum_intersects_sphere(center, 1.0));
    assert!(!camera.frustum_intersects_sphere(center, 0.9));
}

#[test]
fn should_account_for_world_scale_in_the_sphere_radius() {
    let (mut renderer, device) = test_renderer();
    let program = Rc::new(RefCell::new(position_program(&mut renderer, &device)));
    let mut scene = Scene::new();

    // Unit quad scaled far enough to poke back into the view volume.
    let geometry = Rc::new(RefCell::new(quad_geometry(&mut renderer)));
    let id = scene.create_mesh(Mesh::new(geometry, program.clone()));
    {
        let node = scene.node_mut(id).unwrap();
        node.transform.set_position(Vector3::new(20.0, 0.0, -5.0));
        node.transform.set_scale(Vector3::new(20.0, 20.0, 20.0));
    }

    let mut camera = Camera::new(Deg(60.0), 1.0, 0.1, 100.0);
    renderer
        .render(&mut scene, Some(&mut camera), RenderOptions::default())
        .unwrap();

    assert_eq!(device.count(|c| matches!(c, TraceCall::DrawArrays { .. })), 1);
}
