//! The `scene` module holds the retained scene graph the engine observes.
//!
//! Nodes live in an arena ([`SceneGraph`]) and refer to each other by [`NodeId`]. A node may be
//! listed as a child of several parents, and every node keeps a back-reference to the parent that
//! owns it, so the graph is neither a tree nor acyclic. Traversals in this crate always carry a
//! seen-set.
//!
//! ```rust
//! use visbug::{SceneGraph, SceneNode};
//!
//! let mut scene = SceneGraph::new();
//! let stage = scene.add_node(SceneNode::container("stage"));
//! let panel = scene.add_child(stage, SceneNode::shape_rect("panel", 400.0, 50.0));
//! scene.node_mut(panel).unwrap().transform.position = (100.0, 100.0).into();
//!
//! scene.update_world(stage);
//! let bounds = scene.node(panel).unwrap().bounds.unwrap();
//! assert_eq!((bounds.min.x, bounds.max.x), (100.0, 500.0));
//! ```

use std::sync::Arc;

use ahash::{HashSet, HashSetExt};
use lyon::math::{point, Angle, Point, Size, Transform, Vector};
use lyon::path::Path;
use smallvec::SmallVec;
use tracing::trace;

/// Axis-aligned bounds in surface pixels.
pub type Bounds = lyon::math::Box2D;

/// Tint value meaning "no tint" (white).
pub const NO_TINT: u32 = 0xFF_FF_FF;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A texture asset. Sprites that show the same image share one `Arc<Texture>`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Texture {
    /// Where the image was loaded from, if it came from a URL.
    pub url: Option<String>,
    /// Inline source (for example a data URI), if any.
    pub src: Option<String>,
    /// Sub-rectangle of the image that this texture shows: x, y, width, height.
    pub frame: [f32; 4],
}

impl Texture {
    pub fn from_url(url: impl Into<String>, width: f32, height: f32) -> Self {
        Self {
            url: Some(url.into()),
            src: None,
            frame: [0.0, 0.0, width, height],
        }
    }
}

/// Local transform of a node relative to its parent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeTransform {
    pub position: Vector,
    pub scale: Vector,
    /// Rotation in radians.
    pub rotation: f32,
}

impl Default for NodeTransform {
    fn default() -> Self {
        Self {
            position: Vector::zero(),
            scale: Vector::new(1.0, 1.0),
            rotation: 0.0,
        }
    }
}

impl NodeTransform {
    /// Scale, then rotate, then translate.
    pub fn to_matrix(&self) -> Transform {
        Transform::scale(self.scale.x, self.scale.y)
            .then_rotate(Angle::radians(self.rotation))
            .then_translate(self.position)
    }
}

/// World-space quad of a node's drawable content, in drawing order
/// (top-left, top-right, bottom-right, bottom-left before transformation).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quad(pub [Point; 4]);

impl Quad {
    /// The eight coordinates as `x0, y0, x1, y1, ...`.
    pub fn to_array(&self) -> [f32; 8] {
        let mut out = [0.0; 8];
        for (i, corner) in self.0.iter().enumerate() {
            out[i * 2] = corner.x;
            out[i * 2 + 1] = corner.y;
        }
        out
    }

    pub fn from_array(values: [f32; 8]) -> Self {
        Self([
            point(values[0], values[1]),
            point(values[2], values[3]),
            point(values[4], values[5]),
            point(values[6], values[7]),
        ])
    }

    pub fn aabb(&self) -> Bounds {
        Bounds::from_points(self.0.iter().copied())
    }
}

/// How a node presents in a capture table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeClass {
    Text,
    Image,
    Shape,
}

impl NodeClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeClass::Text => "text",
            NodeClass::Image => "image",
            NodeClass::Shape => "shape",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SceneNode {
    pub label: String,
    pub visible: bool,
    pub transform: NodeTransform,
    /// Local extent of the node's own content. Composites have none.
    pub size: Option<Size>,
    pub tint: Option<u32>,
    pub alpha: Option<f32>,
    pub text: Option<String>,
    pub texture: Option<Arc<Texture>>,
    pub is_sprite: bool,
    pub geometry: Option<Path>,
    pub vertices: Option<Quad>,
    pub bounds: Option<Bounds>,
    /// Set when the node was drawn with a defect program. Analysis only.
    pub injected: bool,
    pub(crate) bounds_dirty: bool,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: SmallVec<[NodeId; 4]>,
}

impl SceneNode {
    fn blank(label: &str) -> Self {
        Self {
            label: label.to_string(),
            visible: true,
            transform: NodeTransform::default(),
            size: None,
            tint: None,
            alpha: None,
            text: None,
            texture: None,
            is_sprite: false,
            geometry: None,
            vertices: None,
            bounds: None,
            injected: false,
            bounds_dirty: true,
            parent: None,
            children: SmallVec::new(),
        }
    }

    pub fn container(label: &str) -> Self {
        Self::blank(label)
    }

    pub fn sprite(label: &str, texture: Arc<Texture>) -> Self {
        let mut node = Self::blank(label);
        node.size = Some(Size::new(texture.frame[2], texture.frame[3]));
        node.texture = Some(texture);
        node.is_sprite = true;
        node
    }

    /// Text nodes are sprites of their rasterized glyphs, so they carry a texture as well.
    pub fn text(label: &str, text: &str, width: f32, height: f32) -> Self {
        let mut node = Self::blank(label);
        node.text = Some(text.to_string());
        node.size = Some(Size::new(width, height));
        node.texture = Some(Arc::new(Texture {
            url: None,
            src: None,
            frame: [0.0, 0.0, width, height],
        }));
        node.is_sprite = true;
        node
    }

    pub fn shape(label: &str, geometry: Path) -> Self {
        let mut node = Self::blank(label);
        let extent = lyon::algorithms::aabb::bounding_box(geometry.iter());
        node.size = Some(Size::new(extent.max.x.max(0.0), extent.max.y.max(0.0)));
        node.geometry = Some(geometry);
        node
    }

    pub fn shape_rect(label: &str, width: f32, height: f32) -> Self {
        Self::shape(label, rect_path(width, height))
    }

    pub fn with_tint(mut self, tint: u32) -> Self {
        self.tint = Some(tint);
        self
    }

    pub fn with_alpha(mut self, alpha: f32) -> Self {
        self.alpha = Some(alpha);
        self
    }

    pub fn at(mut self, x: f32, y: f32) -> Self {
        self.transform.position = Vector::new(x, y);
        self
    }

    /// Priority is text, then textured sprite, then geometry.
    pub fn class(&self) -> Option<NodeClass> {
        if self.text.is_some() {
            Some(NodeClass::Text)
        } else if self.texture.is_some() && self.is_sprite {
            Some(NodeClass::Image)
        } else if self.geometry.is_some() {
            Some(NodeClass::Shape)
        } else {
            None
        }
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}

pub(crate) fn rect_path(width: f32, height: f32) -> Path {
    let mut builder = Path::builder();
    builder.begin(point(0.0, 0.0));
    builder.line_to(point(width, 0.0));
    builder.line_to(point(width, height));
    builder.line_to(point(0.0, height));
    builder.close();
    builder.build()
}

#[derive(Debug, Clone, Default)]
pub struct SceneGraph {
    nodes: Vec<SceneNode>,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node: SceneNode) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    /// Adds `node` as the last child of `parent` and points its back-reference at `parent`.
    pub fn add_child(&mut self, parent: NodeId, mut node: SceneNode) -> NodeId {
        node.parent = Some(parent);
        let id = self.add_node(node);
        if let Some(parent_node) = self.nodes.get_mut(parent.0) {
            parent_node.children.push(id);
        }
        id
    }

    /// Lists an existing node as a child of another parent as well, without re-parenting it.
    pub fn share_child(&mut self, parent: NodeId, child: NodeId) {
        if child.0 >= self.nodes.len() {
            return;
        }
        if let Some(parent_node) = self.nodes.get_mut(parent.0) {
            parent_node.children.push(child);
        }
    }

    pub fn node(&self, id: NodeId) -> Option<&SceneNode> {
        self.nodes.get(id.0)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut SceneNode> {
        self.nodes.get_mut(id.0)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(id.0)
            .map(|node| node.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id.0).and_then(|node| node.parent)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn is_leaf(&self, id: NodeId) -> bool {
        self.children(id).is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len()).map(NodeId)
    }

    pub(crate) fn set_parent(&mut self, id: NodeId, parent: Option<NodeId>) {
        if let Some(node) = self.nodes.get_mut(id.0) {
            node.parent = parent;
        }
    }

    pub(crate) fn push_child_raw(&mut self, parent: NodeId, child: NodeId) {
        if let Some(node) = self.nodes.get_mut(parent.0) {
            node.children.push(child);
        }
    }

    /// Every leaf reachable from `root`, breadth-first. Shared subtrees are visited once, and a
    /// root without children is itself a leaf.
    pub fn leaves(&self, root: NodeId) -> Vec<NodeId> {
        let mut leaves = Vec::new();
        if self.node(root).is_none() {
            return leaves;
        }

        let mut seen = HashSet::new();
        let mut queue = std::collections::VecDeque::new();
        seen.insert(root);
        queue.push_back(root);

        while let Some(id) = queue.pop_front() {
            let children = self.children(id);
            if children.is_empty() {
                leaves.push(id);
                continue;
            }
            for &child in children {
                if seen.insert(child) {
                    queue.push_back(child);
                }
            }
        }

        leaves
    }

    /// Composes local transforms along the parent chain. A malformed parent cycle stops the walk.
    pub fn world_transform(&self, id: NodeId) -> Transform {
        let mut transform = Transform::identity();
        let mut seen = HashSet::new();
        let mut current = Some(id);

        while let Some(node_id) = current {
            if !seen.insert(node_id) {
                break;
            }
            let Some(node) = self.node(node_id) else {
                break;
            };
            transform = transform.then(&node.transform.to_matrix());
            current = node.parent;
        }

        transform
    }

    /// Recomputes the world quad and bounds of `id` from the current transforms.
    ///
    /// Composites take the union of their children's bounds, recomputing those first.
    pub fn recompute_bounds(&mut self, id: NodeId) -> Option<Bounds> {
        let mut visiting = HashSet::new();
        self.recompute_bounds_inner(id, &mut visiting)
    }

    fn recompute_bounds_inner(
        &mut self,
        id: NodeId,
        visiting: &mut HashSet<NodeId>,
    ) -> Option<Bounds> {
        if !visiting.insert(id) {
            // Visited earlier in this pass: a shared child or a cycle. Reuse its bounds.
            return self.node(id).and_then(|node| node.bounds);
        }

        let world = self.world_transform(id);
        let node = self.node(id)?;
        let children: SmallVec<[NodeId; 4]> = node.children.clone();

        let own_quad = node.size.map(|size| {
            let corners = [
                point(0.0, 0.0),
                point(size.width, 0.0),
                point(size.width, size.height),
                point(0.0, size.height),
            ];
            Quad(corners.map(|corner| world.transform_point(corner)))
        });

        let mut bounds = own_quad.map(|quad| quad.aabb());
        for child in children {
            if let Some(child_bounds) = self.recompute_bounds_inner(child, visiting) {
                bounds = Some(match bounds {
                    Some(existing) => existing.union(&child_bounds),
                    None => child_bounds,
                });
            }
        }

        let node = self.node_mut(id)?;
        node.vertices = own_quad;
        node.bounds = bounds;
        node.bounds_dirty = false;
        trace!(node = %id, ?bounds, "recomputed bounds");
        bounds
    }

    /// Brings world geometry up to date for every node reachable from `root`, once each.
    pub fn update_world(&mut self, root: NodeId) {
        if self.node(root).is_some() {
            self.recompute_bounds(root);
        }
    }

    pub fn clear_injected_tags(&mut self) {
        for node in &mut self.nodes {
            node.injected = false;
        }
    }

    pub fn injected_nodes(&self) -> Vec<NodeId> {
        self.ids()
            .filter(|id| self.nodes[id.0].injected)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage_with_panel() -> (SceneGraph, NodeId, NodeId) {
        let mut scene = SceneGraph::new();
        let stage = scene.add_node(SceneNode::container("stage"));
        let panel = scene.add_child(stage, SceneNode::shape_rect("panel", 40.0, 10.0).at(5.0, 5.0));
        (scene, stage, panel)
    }

    #[test]
    fn leaves_of_childless_root_is_root() {
        let mut scene = SceneGraph::new();
        let root = scene.add_node(SceneNode::container("lonely"));

        assert_eq!(scene.leaves(root), vec![root]);
    }

    #[test]
    fn leaves_visit_shared_children_once() {
        let mut scene = SceneGraph::new();
        let stage = scene.add_node(SceneNode::container("stage"));
        let left = scene.add_child(stage, SceneNode::container("left"));
        let right = scene.add_child(stage, SceneNode::container("right"));
        let shared = scene.add_child(left, SceneNode::shape_rect("shared", 1.0, 1.0));
        scene.share_child(right, shared);
        let solo = scene.add_child(right, SceneNode::shape_rect("solo", 1.0, 1.0));

        assert_eq!(scene.leaves(stage), vec![shared, solo]);
    }

    #[test]
    fn leaves_terminate_on_child_cycles() {
        let mut scene = SceneGraph::new();
        let stage = scene.add_node(SceneNode::container("stage"));
        let group = scene.add_child(stage, SceneNode::container("group"));
        scene.share_child(group, stage);
        let leaf = scene.add_child(group, SceneNode::shape_rect("leaf", 1.0, 1.0));

        assert_eq!(scene.leaves(stage), vec![leaf]);
    }

    #[test]
    fn recompute_bounds_follows_parent_transforms() {
        let (mut scene, stage, panel) = stage_with_panel();
        scene.node_mut(stage).unwrap().transform.position = Vector::new(100.0, 50.0);

        let bounds = scene.recompute_bounds(panel).unwrap();

        assert_eq!(bounds.min, point(105.0, 55.0));
        assert_eq!(bounds.max, point(145.0, 65.0));
        assert!(!scene.node(panel).unwrap().bounds_dirty);
    }

    #[test]
    fn composite_bounds_are_union_of_children() {
        let (mut scene, stage, _) = stage_with_panel();
        scene.add_child(stage, SceneNode::shape_rect("far", 10.0, 10.0).at(90.0, 90.0));

        let bounds = scene.recompute_bounds(stage).unwrap();

        assert_eq!(bounds.min, point(5.0, 5.0));
        assert_eq!(bounds.max, point(100.0, 100.0));
        assert!(scene.node(stage).unwrap().vertices.is_none());
    }

    #[test]
    fn shared_child_counts_toward_every_parent() {
        let mut scene = SceneGraph::new();
        let stage = scene.add_node(SceneNode::container("stage"));
        let left = scene.add_child(stage, SceneNode::container("left"));
        let right = scene.add_child(stage, SceneNode::container("right"));
        let shared = scene.add_child(left, SceneNode::shape_rect("shared", 8.0, 4.0).at(2.0, 3.0));
        scene.share_child(right, shared);

        scene.recompute_bounds(stage);

        let shared_bounds = scene.node(shared).unwrap().bounds.unwrap();
        assert_eq!(scene.node(left).unwrap().bounds, Some(shared_bounds));
        assert_eq!(scene.node(right).unwrap().bounds, Some(shared_bounds));
    }

    #[test]
    fn bounds_terminate_on_child_cycles() {
        let mut scene = SceneGraph::new();
        let stage = scene.add_node(SceneNode::container("stage"));
        let group = scene.add_child(stage, SceneNode::container("group"));
        scene.share_child(group, stage);
        scene.add_child(group, SceneNode::shape_rect("leaf", 6.0, 6.0));

        let bounds = scene.recompute_bounds(stage).unwrap();

        assert_eq!(bounds.max, point(6.0, 6.0));
    }

    #[test]
    fn rotated_quad_keeps_corner_order() {
        let (mut scene, _, panel) = stage_with_panel();
        scene.node_mut(panel).unwrap().transform.rotation = std::f32::consts::FRAC_PI_2;

        scene.recompute_bounds(panel);
        let quad = scene.node(panel).unwrap().vertices.unwrap();

        // 90 degrees clockwise in y-down space: the top-right corner swings below the origin.
        assert!((quad.0[1].x - 5.0).abs() < 1e-4);
        assert!((quad.0[1].y - 45.0).abs() < 1e-4);
    }

    #[test]
    fn class_prefers_text_over_sprite() {
        let text = SceneNode::text("score", "100", 20.0, 10.0);
        let sprite = SceneNode::sprite("hero", Arc::new(Texture::from_url("hero.png", 8.0, 8.0)));
        let shape = SceneNode::shape_rect("wall", 3.0, 3.0);
        let container = SceneNode::container("group");

        assert_eq!(text.class(), Some(NodeClass::Text));
        assert_eq!(sprite.class(), Some(NodeClass::Image));
        assert_eq!(shape.class(), Some(NodeClass::Shape));
        assert_eq!(container.class(), None);
    }

    #[test]
    fn texture_without_sprite_flag_falls_through_to_geometry() {
        let mut node = SceneNode::shape_rect("tiling", 3.0, 3.0);
        node.texture = Some(Arc::new(Texture::default()));

        assert_eq!(node.class(), Some(NodeClass::Shape));
    }
}
