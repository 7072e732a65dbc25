//! Flat, fixed-column records of the drawable leaves of a scene graph.
//!
//! Each classifiable leaf becomes one [`NodeRecord`]. Absent fields fall back to fixed defaults:
//! visibility `false`, tint [`NO_TINT`], alpha `1.0`, and an empty cell for anything else. Text
//! and shape rows leave the asset and frame cells empty. Rows are appended in breadth-first
//! traversal order.

use crate::error::CaptureError;
use crate::scene::{NodeClass, NodeId, SceneGraph, SceneNode, NO_TINT};

use super::sidecar;

/// Column names, in order.
pub const COLUMNS: [&str; 23] = [
    "string_type_of_node",
    "string_asset_url",
    "string_asset_src",
    "float_frame_x",
    "float_frame_y",
    "float_frame_width",
    "float_frame_height",
    "bool_is_visible",
    "float_rotation",
    "float_vertex_0_x",
    "float_vertex_0_y",
    "float_vertex_1_x",
    "float_vertex_1_y",
    "float_vertex_2_x",
    "float_vertex_2_y",
    "float_vertex_3_x",
    "float_vertex_3_y",
    "float_bounds_min_x",
    "float_bounds_min_y",
    "float_bounds_max_x",
    "float_bounds_max_y",
    "int_tint_as_decimal",
    "float_alpha_channel",
];

/// The placeholder written for an absent value.
pub const EMPTY: &str = "";

#[derive(Debug, Clone, PartialEq)]
pub struct NodeRecord {
    pub kind: NodeClass,
    pub asset_url: Option<String>,
    pub asset_src: Option<String>,
    /// x, y, width, height of the texture frame.
    pub frame: Option<[f32; 4]>,
    pub visible: bool,
    pub rotation: f32,
    pub vertices: Option<[f32; 8]>,
    /// min x, min y, max x, max y.
    pub bounds: Option<[f32; 4]>,
    pub tint: u32,
    pub alpha: f32,
}

fn push_optional<const N: usize>(cells: &mut Vec<String>, values: Option<[f32; N]>) {
    match values {
        Some(values) => cells.extend(values.iter().map(|value| value.to_string())),
        None => cells.extend(std::iter::repeat(EMPTY.to_string()).take(N)),
    }
}

impl NodeRecord {
    /// The record as one cell per entry of [`COLUMNS`].
    pub fn cells(&self) -> Vec<String> {
        let mut cells = Vec::with_capacity(COLUMNS.len());
        cells.push(self.kind.as_str().to_string());
        cells.push(self.asset_url.clone().unwrap_or_default());
        cells.push(self.asset_src.clone().unwrap_or_default());
        push_optional(&mut cells, self.frame);
        cells.push(self.visible.to_string());
        cells.push(self.rotation.to_string());
        push_optional(&mut cells, self.vertices);
        push_optional(&mut cells, self.bounds);
        cells.push(self.tint.to_string());
        cells.push(self.alpha.to_string());
        cells
    }
}

/// Reads one node into a record. Nodes that are neither text, image nor shape yield `None`.
pub fn extract(node: &SceneNode) -> Option<NodeRecord> {
    let kind = node.class()?;
    let (asset_url, asset_src, frame) = match (kind, node.texture.as_ref()) {
        (NodeClass::Image, Some(texture)) => {
            (texture.url.clone(), texture.src.clone(), Some(texture.frame))
        }
        _ => (None, None, None),
    };

    Some(NodeRecord {
        kind,
        asset_url,
        asset_src,
        frame,
        visible: node.visible,
        rotation: node.transform.rotation,
        vertices: node.vertices.map(|quad| quad.to_array()),
        bounds: node
            .bounds
            .map(|bounds| [bounds.min.x, bounds.min.y, bounds.max.x, bounds.max.y]),
        tint: node.tint.unwrap_or(NO_TINT),
        alpha: node.alpha.unwrap_or(1.0),
    })
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeTable {
    rows: Vec<NodeRecord>,
}

impl NodeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// One row per classifiable leaf under `root`.
    pub fn from_scene(scene: &SceneGraph, root: NodeId) -> Self {
        let mut table = Self::new();
        for leaf in scene.leaves(root) {
            if let Some(record) = scene.node(leaf).and_then(extract) {
                table.push(record);
            }
        }
        table
    }

    /// Reads a sidecar written at freeze time.
    pub fn from_sidecar(json: &str) -> Result<Self, CaptureError> {
        let (scene, root) = sidecar::deserialize(json)?;
        Ok(Self::from_scene(&scene, root))
    }

    pub fn push(&mut self, record: NodeRecord) {
        self.rows.push(record);
    }

    pub fn rows(&self) -> &[NodeRecord] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::scene::Texture;

    #[test]
    fn image_row_carries_asset_and_frame() {
        let mut scene = SceneGraph::new();
        let texture = Arc::new(Texture::from_url("assets/hero.png", 32.0, 48.0));
        let hero = scene.add_node(SceneNode::sprite("hero", texture).at(10.0, 20.0).with_alpha(0.5));
        scene.recompute_bounds(hero);

        let record = extract(scene.node(hero).unwrap()).unwrap();
        let cells = record.cells();

        assert_eq!(cells.len(), COLUMNS.len());
        assert_eq!(cells[0], "image");
        assert_eq!(cells[1], "assets/hero.png");
        assert_eq!(cells[2], EMPTY);
        assert_eq!(&cells[3..7], &["0", "0", "32", "48"]);
        assert_eq!(cells[7], "true");
        assert_eq!(&cells[17..21], &["10", "20", "42", "68"]);
        assert_eq!(cells[21], "16777215");
        assert_eq!(cells[22], "0.5");
    }

    #[test]
    fn text_row_leaves_asset_cells_empty() {
        let node = SceneNode::text("label", "hello", 40.0, 12.0).with_tint(0x00FF00);

        let cells = extract(&node).unwrap().cells();

        assert_eq!(cells[0], "text");
        assert!(cells[1..7].iter().all(|cell| cell.is_empty()));
        // Never positioned, so no vertices or bounds either.
        assert!(cells[9..21].iter().all(|cell| cell.is_empty()));
        assert_eq!(cells[21], "65280");
        assert_eq!(cells[22], "1");
    }

    #[test]
    fn containers_produce_no_row() {
        assert!(extract(&SceneNode::container("group")).is_none());
    }

    #[test]
    fn table_lists_classifiable_leaves_in_traversal_order() {
        let mut scene = SceneGraph::new();
        let stage = scene.add_node(SceneNode::container("stage"));
        let group = scene.add_child(stage, SceneNode::container("group"));
        scene.add_child(group, SceneNode::shape_rect("wall", 10.0, 10.0));
        scene.add_child(stage, SceneNode::text("title", "T", 10.0, 10.0));
        scene.add_child(stage, SceneNode::container("empty"));

        let table = NodeTable::from_scene(&scene, stage);

        let kinds: Vec<_> = table.rows().iter().map(|row| row.kind).collect();
        assert_eq!(kinds, vec![NodeClass::Text, NodeClass::Shape]);
    }
}
