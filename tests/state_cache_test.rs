mod common;

use common::test_utils::test_renderer;
use glint::device::trace::TraceCall;
use glint::device::{BlendFactor, Capability, TextureHandle, TextureTarget};

#[test]
fn should_issue_redundant_state_changes_once() {
    let (mut renderer, device) = test_renderer();

    renderer.enable(Capability::DepthTest);
    renderer.enable(Capability::DepthTest);
    renderer.set_depth_mask(true);
    renderer.set_depth_mask(true);
    renderer.set_blend_func(BlendFactor::SrcAlpha, BlendFactor::OneMinusSrcAlpha, None);
    renderer.set_blend_func(BlendFactor::SrcAlpha, BlendFactor::OneMinusSrcAlpha, None);

    assert_eq!(device.count(|c| matches!(c, TraceCall::Enable(_))), 1);
    assert_eq!(device.count(|c| matches!(c, TraceCall::DepthMask(_))), 1);
    assert_eq!(device.count(|c| matches!(c, TraceCall::BlendFunc(..))), 1);
}

#[test]
fn should_reissue_after_a_real_toggle() {
    let (mut renderer, device) = test_renderer();

    renderer.enable(Capability::Blend);
    renderer.disable(Capability::Blend);
    renderer.enable(Capability::Blend);

    assert_eq!(
        device.filtered(|c| matches!(c, TraceCall::Enable(_) | TraceCall::Disable(_))),
        vec![
            TraceCall::Enable(Capability::Blend),
            TraceCall::Disable(Capability::Blend),
            TraceCall::Enable(Capability::Blend),
        ]
    );
}

#[test]
fn should_track_texture_bindings_per_unit() {
    let (mut renderer, device) = test_renderer();
    let tex_a = TextureHandle(7);
    let tex_b = TextureHandle(8);

    renderer.bind_texture_unit(0, TextureTarget::D2, tex_a);
    renderer.bind_texture_unit(0, TextureTarget::D2, tex_a);
    renderer.bind_texture_unit(1, TextureTarget::D2, tex_b);
    // Unit 0 still holds tex_a, no rebind needed.
    renderer.bind_texture_unit(0, TextureTarget::D2, tex_a);

    assert_eq!(device.count(|c| matches!(c, TraceCall::BindTexture(..))), 2);
    assert_eq!(
        device.filtered(|c| matches!(c, TraceCall::ActiveTexture(_))),
        vec![TraceCall::ActiveTexture(0), TraceCall::ActiveTexture(1)]
    );
}

#[test]
fn should_reach_the_device_again_after_invalidation() {
    let (mut renderer, device) = test_renderer();

    renderer.enable(Capability::DepthTest);
    renderer.invalidate_state();
    renderer.enable(Capability::DepthTest);

    assert_eq!(device.count(|c| matches!(c, TraceCall::Enable(_))), 2);
}
