use std::f32::consts::FRAC_PI_4;
use std::sync::Arc;

use visbug::{NodeId, SceneGraph, SceneNode, Texture};

use crate::expectations::ExpectedPixel;

// ── Layout constants ─────────────────────────────────────────────────────────

pub const CANVAS_WIDTH: u32 = 800;
pub const CANVAS_HEIGHT: u32 = 600;

pub const BAR_COLOR: u32 = 0xFF0000;
pub const NEIGHBOUR_COLOR: u32 = 0x0000FF;
const BANNER_COLOR: u32 = 0x3366CC;
const BADGE_COLOR: u32 = 0x00AA00;

/// Labels of the nodes the default rule picks in the main scene, in selection order.
pub const MAIN_SCENE_SELECTION: [&str; 6] =
    ["banner", "title", "hero", "hero-shadow", "tilted", "button"];

/// The first node under `root` (breadth-first) with `label`.
pub fn find(scene: &SceneGraph, root: NodeId, label: &str) -> Option<NodeId> {
    let mut queue = std::collections::VecDeque::from([root]);
    let mut seen = std::collections::HashSet::new();
    while let Some(id) = queue.pop_front() {
        if !seen.insert(id) {
            continue;
        }
        let node = scene.node(id)?;
        if node.label == label {
            return Some(id);
        }
        queue.extend(node.children().iter().copied());
    }
    None
}

/// One 400×50 bar at (100, 100): large enough for the default rule on the 800×600 canvas.
pub fn single_bar_scene() -> (SceneGraph, NodeId, NodeId) {
    let mut scene = SceneGraph::new();
    let stage = scene.add_node(SceneNode::container("stage"));
    let bar = scene.add_child(
        stage,
        SceneNode::shape_rect("bar", 400.0, 50.0)
            .at(100.0, 100.0)
            .with_tint(BAR_COLOR),
    );
    (scene, stage, bar)
}

/// The bar plus a 20×10 neighbour drawn right after it. The neighbour is too small to select.
pub fn bar_with_neighbour_scene() -> (SceneGraph, NodeId, NodeId, NodeId) {
    let (mut scene, stage, bar) = single_bar_scene();
    let neighbour = scene.add_child(
        stage,
        SceneNode::shape_rect("neighbour", 20.0, 10.0)
            .at(520.0, 110.0)
            .with_tint(NEIGHBOUR_COLOR),
    );
    (scene, stage, bar, neighbour)
}

/// Builds the main test scene and returns the pixel expectations for an undisturbed frame.
///
/// Covers every node kind, a shared texture, a rotated shape, a nested container, a child listed
/// under two parents, a node too small to select and one outside the canvas.
pub fn build_main_scene() -> (SceneGraph, NodeId, Vec<ExpectedPixel>) {
    let mut scene = SceneGraph::new();
    let mut expectations = Vec::new();
    let stage = scene.add_node(SceneNode::container("stage"));

    scene.add_child(
        stage,
        SceneNode::shape_rect("banner", 600.0, 40.0)
            .at(100.0, 20.0)
            .with_tint(BANNER_COLOR),
    );
    expectations.push(ExpectedPixel::opaque(300, 40, BANNER_COLOR, "banner"));

    scene.add_child(
        stage,
        SceneNode::text("title", "Score 0", 200.0, 30.0)
            .at(300.0, 80.0)
            .with_tint(0xFFCC00),
    );
    expectations.push(ExpectedPixel::opaque(400, 95, 0xFFCC00, "title"));

    let hero_texture = Arc::new(Texture::from_url("assets/hero.png", 64.0, 64.0));
    scene.add_child(
        stage,
        SceneNode::sprite("hero", Arc::clone(&hero_texture)).at(50.0, 200.0),
    );
    expectations.push(ExpectedPixel::opaque(80, 230, 0xFFFFFF, "hero"));
    scene.add_child(
        stage,
        SceneNode::sprite("hero-shadow", hero_texture)
            .at(130.0, 200.0)
            .with_alpha(0.5),
    );
    expectations.push(ExpectedPixel::rgba(160, 230, [128, 128, 128, 128], "hero-shadow"));

    scene.add_child(
        stage,
        SceneNode::shape_rect("badge", 10.0, 10.0)
            .at(700.0, 500.0)
            .with_tint(BADGE_COLOR),
    );
    expectations.push(ExpectedPixel::opaque(705, 505, BADGE_COLOR, "badge"));

    scene.add_child(
        stage,
        SceneNode::shape_rect("off-screen", 200.0, 50.0)
            .at(900.0, 100.0)
            .with_tint(0xFF00FF),
    );

    let mut tilted = SceneNode::shape_rect("tilted", 100.0, 20.0)
        .at(400.0, 300.0)
        .with_tint(0x884400);
    tilted.transform.rotation = FRAC_PI_4;
    scene.add_child(stage, tilted);
    expectations.push(ExpectedPixel::opaque(428, 340, 0x884400, "tilted"));

    let panel = scene.add_child(stage, SceneNode::container("panel").at(500.0, 350.0));
    scene.add_child(
        panel,
        SceneNode::shape_rect("button", 120.0, 40.0)
            .at(10.0, 10.0)
            .with_tint(0x222222),
    );
    expectations.push(ExpectedPixel::opaque(570, 380, 0x222222, "button"));
    let icon = scene.add_child(
        panel,
        SceneNode::shape_rect("icon", 16.0, 16.0)
            .at(140.0, 10.0)
            .with_tint(0xEEEEEE),
    );
    let toolbar = scene.add_child(stage, SceneNode::container("toolbar"));
    scene.share_child(toolbar, icon);
    expectations.push(ExpectedPixel::opaque(648, 368, 0xEEEEEE, "icon"));

    expectations.push(ExpectedPixel::cleared(5, 5, "background"));
    expectations.push(ExpectedPixel::cleared(790, 590, "background corner"));

    (scene, stage, expectations)
}
