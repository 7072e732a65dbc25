/// Frame-level behaviour of an instrumented page: the armed window, the selection, the freeze,
/// and what the shader swap leaves behind.
///
/// Run with:   cargo test --test injection_window
mod common;

use image::Rgba;
use lyon::math::Size;
use visbug::{
    BugCatalog, BugClass, BugDescriptor, CaptureDocument, FrameRenderer, InjectionClient, Page,
    SceneNode, SceneRenderer, SetupError, SwapperConfig,
};
use visbug_test_scenes::{
    build_main_scene, descriptor, find, pixel_mismatches, single_bar_scene, HeadlessPage,
    SoftHost, BROKEN_FRAGMENT, MAIN_SCENE_SELECTION,
};

use common::{canvas, init_tracing, instrumented_page};

#[test]
fn main_scene_renders_every_node_kind() {
    init_tracing();
    let (scene, root, expectations) = build_main_scene();
    let mut page = HeadlessPage::new(scene, root, canvas());

    page.render_now();

    let image = page.screenshot(None).unwrap();
    let mismatches = pixel_mismatches(&image, &expectations);
    assert!(
        mismatches.is_empty(),
        "{} wrong pixel(s):\n{}",
        mismatches.len(),
        mismatches.join("\n")
    );
}

#[test]
fn one_frame_budget_freezes_after_two_frames_with_one_injected_node() {
    init_tracing();
    let (scene, root, bar) = single_bar_scene();
    let (mut page, client) = instrumented_page(scene, root);

    assert_eq!(client.inject_bug("appearance", 1).unwrap(), BugClass::Appearance);
    assert!(client.is_selection_pending());

    page.render_now();
    assert!(!client.is_frozen());
    assert_eq!(client.selection(), vec![bar]);
    assert_eq!(client.frames_until_freeze(), 0);

    page.render_now();
    assert!(client.is_frozen());
    assert_eq!(page.frames_rendered(), 2);

    let document = CaptureDocument::from_json(&client.serialize().unwrap()).unwrap();
    assert_eq!(document.injected(), vec![bar]);
    assert_eq!(document.surface, Some(canvas()));

    // Inverted red, still on screen while frozen.
    let image = page.screenshot(None).unwrap();
    assert_eq!(*image.get_pixel(300, 120), Rgba([0, 255, 255, 255]));

    page.render_now();
    assert_eq!(page.frames_rendered(), 2, "a frozen page draws nothing");
}

#[test]
fn zero_budget_freezes_after_the_first_frame() {
    init_tracing();
    let (scene, root, _) = single_bar_scene();
    let (mut page, client) = instrumented_page(scene, root);

    client.inject(BugClass::State, 0).unwrap();
    page.render_now();

    assert!(client.is_frozen());
    assert_eq!(client.active_bug(), BugClass::None);
    assert!(client.selection().is_empty());
}

#[test]
fn default_rule_picks_the_large_on_screen_leaves() {
    init_tracing();
    let (scene, root, _) = build_main_scene();
    let (mut page, client) = instrumented_page(scene, root);

    client.inject(BugClass::Layout, 0).unwrap();
    page.render_now();

    let document = CaptureDocument::from_json(&client.serialize().unwrap()).unwrap();
    let scene = page.scene();
    let mut injected: Vec<String> = document
        .injected()
        .into_iter()
        .map(|id| scene.node(id).unwrap().label.clone())
        .collect();
    injected.sort();
    let mut expected: Vec<String> = MAIN_SCENE_SELECTION.iter().map(|s| s.to_string()).collect();
    expected.sort();
    assert_eq!(injected, expected);

    // Shared and small nodes are never drawn with a defect.
    let icon = find(scene, root, "icon").unwrap();
    assert!(!scene.node(icon).unwrap().injected);
}

#[test]
fn selection_is_fixed_for_the_whole_window() {
    init_tracing();
    let (mut scene, root, bar) = single_bar_scene();
    let grower = scene.add_child(
        root,
        SceneNode::shape_rect("grower", 5.0, 5.0)
            .at(100.0, 300.0)
            .with_tint(0x00FF00),
    );
    let mut page = common::instrumented_page(scene, root).0;
    let client = page.client().unwrap();

    // Starts tiny, and qualifies from the second frame on.
    let mut frame = 0;
    page = page.with_animation(move |scene, _| {
        frame += 1;
        if frame > 1 {
            if let Some(node) = scene.node_mut(grower) {
                node.size = Some(Size::new(300.0, 50.0));
            }
        }
    });

    client.inject(BugClass::Rendering, 3).unwrap();
    for _ in 0..3 {
        page.render_now();
        assert_eq!(client.selection(), vec![bar]);
    }
    page.render_now();

    assert!(client.is_frozen());
    let document = CaptureDocument::from_json(&client.serialize().unwrap()).unwrap();
    assert_eq!(document.injected(), vec![bar]);
}

#[test]
fn custom_predicate_replaces_the_default_rule() {
    init_tracing();
    let (mut scene, root, bar) = single_bar_scene();
    let dot = scene.add_child(root, SceneNode::shape_rect("dot", 4.0, 4.0).at(50.0, 50.0));
    let (mut page, client) = instrumented_page(scene, root);

    client.set_custom_selection_logic("label", |node| node.label == "dot");
    client.inject(BugClass::Appearance, 0).unwrap();
    page.render_now();

    let document = CaptureDocument::from_json(&client.serialize().unwrap()).unwrap();
    assert_eq!(document.injected(), vec![dot]);
    assert!(!document.injected().contains(&bar));
}

#[test]
fn unfreeze_resumes_and_clears_stale_tags() {
    init_tracing();
    let (scene, root, bar) = single_bar_scene();
    let (mut page, client) = instrumented_page(scene, root);

    client.inject(BugClass::Appearance, 0).unwrap();
    page.render_now();
    assert!(page.scene().node(bar).unwrap().injected);

    client.unfreeze();
    assert!(client.serialize().is_none());
    page.render_now();

    assert!(!client.is_frozen());
    assert!(!page.scene().node(bar).unwrap().injected);
    let image = page.screenshot(None).unwrap();
    assert_eq!(*image.get_pixel(300, 120), Rgba([255, 0, 0, 255]));
}

#[test]
fn second_instrumentation_is_refused() {
    init_tracing();
    let (scene, root, _) = single_bar_scene();
    let (mut page, client) = instrumented_page(scene, root);

    assert_eq!(page.install(&client), Err(SetupError::AlreadyInstrumented));

    let rejected = client
        .instrument(SceneRenderer::new(SoftHost::new(10, 10)), SwapperConfig::default())
        .err()
        .expect("session already instrumented");
    assert_eq!(rejected.error, SetupError::AlreadyInstrumented);
    assert_eq!(rejected.renderer.surface().width, 10);

    // The first instrumentation keeps working.
    client.inject(BugClass::State, 0).unwrap();
    page.render_now();
    assert!(client.is_frozen());
}

#[test]
fn link_failure_draws_without_a_defect() {
    init_tracing();
    let appearance = descriptor(BugClass::Appearance);
    let catalog = BugCatalog::default()
        .with(BugDescriptor::new(
            BugClass::Appearance,
            appearance.vertex_source,
            BROKEN_FRAGMENT,
        ))
        .unwrap();
    let (scene, root, bar) = single_bar_scene();
    let mut page = HeadlessPage::new(scene, root, canvas());
    let client = InjectionClient::new(catalog);
    page.install(&client).unwrap();

    client.inject(BugClass::Appearance, 1).unwrap();
    page.render_now();
    page.render_now();

    assert!(client.is_frozen());
    let image = page.screenshot(None).unwrap();
    assert_eq!(*image.get_pixel(300, 120), Rgba([255, 0, 0, 255]));
    assert!(!page.scene().node(bar).unwrap().injected);
    let swapper = page.swapper().unwrap();
    assert!(!swapper.is_active());
    assert_eq!(swapper.cached_programs(), 0);
}

#[test]
fn swap_round_trip_restores_the_host_binding() {
    init_tracing();
    let (scene, root, _) = single_bar_scene();
    let (mut page, client) = instrumented_page(scene, root);
    let before = page.host().unwrap().binding().clone();

    client.inject(BugClass::Layout, 2).unwrap();
    for _ in 0..3 {
        page.render_now();
    }

    let host = page.host().unwrap();
    assert_eq!(host.binding(), &before);
    assert_eq!(host.gpu().current_program(), Some(before.program));
    assert_eq!(host.gpu().stray_writes, 0);
    assert_eq!(page.swapper().unwrap().cached_programs(), 1);
}
