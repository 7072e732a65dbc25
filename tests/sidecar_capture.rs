/// Sidecar documents of the main scene: reproducible, faithful to sharing, and readable back
/// into a table.
///
/// Run with:   cargo test --test sidecar_capture
mod common;

use visbug::capture::{deserialize, serialize};
use visbug::{BugClass, CaptureDocument, NodeTable, Page};
use visbug_test_scenes::{build_main_scene, find};

use common::{canvas, init_tracing, instrumented_page};

#[test]
fn serialization_is_byte_reproducible() {
    init_tracing();
    let (mut scene, root, _) = build_main_scene();
    scene.update_world(root);

    let first = serialize(&scene, root, Some(canvas())).unwrap();
    let second = serialize(&scene, root, Some(canvas())).unwrap();

    assert_eq!(first, second);
}

#[test]
fn frozen_sidecar_matches_a_direct_serialization() {
    init_tracing();
    let (scene, root, _) = build_main_scene();
    let (mut page, client) = instrumented_page(scene, root);

    page.render_now();
    let scene = page.scene().clone();
    client.inject(BugClass::None, 0).unwrap();
    page.render_now();

    assert!(client.is_frozen());
    assert_eq!(
        client.serialize().unwrap(),
        serialize(page.scene(), root, Some(canvas())).unwrap()
    );
    // Nothing moved between the two frames.
    assert_eq!(
        serialize(&scene, root, Some(canvas())).unwrap(),
        client.serialize().unwrap()
    );
}

#[test]
fn shared_icon_is_written_once_with_its_first_parent() {
    init_tracing();
    let (mut scene, root, _) = build_main_scene();
    scene.update_world(root);
    let panel = find(&scene, root, "panel").unwrap();

    let document = CaptureDocument::capture(&scene, root, None);

    let icons: Vec<_> = document
        .nodes
        .iter()
        .filter(|entry| entry.label == "icon")
        .collect();
    assert_eq!(icons.len(), 1);
    let parent = icons[0].parent.unwrap();
    assert_eq!(document.nodes[parent].id, panel.0);

    let toolbar = document
        .nodes
        .iter()
        .find(|entry| entry.label == "toolbar")
        .unwrap();
    assert_eq!(toolbar.children.len(), 1);
    assert_eq!(document.nodes[toolbar.children[0]].label, "icon");
}

#[test]
fn hero_sprites_share_one_texture_entry() {
    init_tracing();
    let (mut scene, root, _) = build_main_scene();
    scene.update_world(root);

    let document = CaptureDocument::capture(&scene, root, None);

    let textures: Vec<usize> = document
        .nodes
        .iter()
        .filter(|entry| entry.label.starts_with("hero"))
        .filter_map(|entry| entry.texture)
        .collect();
    assert_eq!(textures.len(), 2);
    assert_eq!(textures[0], textures[1]);
    assert_eq!(
        document.textures[textures[0]].url.as_deref(),
        Some("assets/hero.png")
    );
}

#[test]
fn table_from_sidecar_matches_table_from_scene() {
    init_tracing();
    let (mut scene, root, _) = build_main_scene();
    scene.update_world(root);
    let json = serialize(&scene, root, None).unwrap();

    let live = NodeTable::from_scene(&scene, root);
    let restored = NodeTable::from_sidecar(&json).unwrap();
    let (rebuilt, rebuilt_root) = deserialize(&json).unwrap();

    assert_eq!(live, restored);
    assert_eq!(rebuilt.leaves(rebuilt_root).len(), live.len());
}
