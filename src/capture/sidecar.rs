//! Index-referenced serialization of a scene graph.
//!
//! The graph shares children between parents and carries parent back-references, so nodes are
//! written once each into an identity table and refer to each other by table index. Textures are
//! tabled the same way, keyed by `Arc` identity, so sprites that shared a texture share it again
//! after [`deserialize`]. Volatile host state (dirty flags) is never written.
//!
//! Serialization is a pure function of the graph: the walk order is fixed (breadth-first from
//! the root, children in order, then the parent back-reference) and there are no hash-ordered
//! collections in the document.
//!
//! Non-finite floats are written as `"NaN"`, `"inf"` or `"-inf"`. Vector geometry is written as
//! its outline flattened to line segments.

use std::sync::Arc;

use ahash::{HashMap, HashMapExt};
use lyon::math::{point, Point, Size, Vector};
use lyon::path::iterator::PathIterator;
use lyon::path::{Path, PathEvent};
use serde::{Deserialize, Serialize};
use tracing::trace;

use super::float;
use crate::error::CaptureError;
use crate::host::Surface;
use crate::scene::{Bounds, NodeId, Quad, SceneGraph, SceneNode, Texture};

pub const FORMAT_VERSION: u32 = 1;

/// Curves are flattened to within this distance of the true outline.
const OUTLINE_TOLERANCE: f32 = 0.01;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextureEntry {
    pub url: Option<String>,
    pub src: Option<String>,
    #[serde(with = "float::array")]
    pub frame: [f32; 4],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeEntry {
    /// The node's id in the live graph.
    pub id: usize,
    pub label: String,
    pub visible: bool,
    #[serde(with = "float::array")]
    pub position: [f32; 2],
    #[serde(with = "float::array")]
    pub scale: [f32; 2],
    #[serde(with = "float::scalar")]
    pub rotation: f32,
    #[serde(with = "float::option_array")]
    pub size: Option<[f32; 2]>,
    pub tint: Option<u32>,
    #[serde(with = "float::option")]
    pub alpha: Option<f32>,
    pub text: Option<String>,
    /// Index into the texture table.
    pub texture: Option<usize>,
    pub is_sprite: bool,
    /// Local-space outline of the vector geometry, one entry per subpath.
    pub geometry: Option<Vec<Contour>>,
    #[serde(with = "float::option_array")]
    pub vertices: Option<[f32; 8]>,
    #[serde(with = "float::option_array")]
    pub bounds: Option<[f32; 4]>,
    pub injected: bool,
    /// Index into the node table.
    pub parent: Option<usize>,
    /// Indices into the node table.
    pub children: Vec<usize>,
}

/// One subpath of an outline, curves flattened to line segments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contour {
    #[serde(with = "float::points")]
    pub points: Vec<[f32; 2]>,
    pub closed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureDocument {
    pub version: u32,
    pub surface: Option<Surface>,
    /// Index of the root in `nodes`.
    pub root: usize,
    pub nodes: Vec<NodeEntry>,
    pub textures: Vec<TextureEntry>,
}

fn bounds_to_array(bounds: &Bounds) -> [f32; 4] {
    [bounds.min.x, bounds.min.y, bounds.max.x, bounds.max.y]
}

fn array_to_bounds(values: [f32; 4]) -> Bounds {
    Bounds::new(point(values[0], values[1]), point(values[2], values[3]))
}

fn outline(path: &Path) -> Vec<Contour> {
    let mut contours = Vec::new();
    let mut points = Vec::new();
    for event in path.iter().flattened(OUTLINE_TOLERANCE) {
        match event {
            PathEvent::Begin { at } => {
                points.clear();
                points.push(at.to_array());
            }
            PathEvent::Line { to, .. } => points.push(to.to_array()),
            PathEvent::End { close, .. } => contours.push(Contour {
                points: std::mem::take(&mut points),
                closed: close,
            }),
            PathEvent::Quadratic { .. } | PathEvent::Cubic { .. } => {}
        }
    }
    contours
}

fn path_from_outline(contours: &[Contour]) -> Path {
    let to_point = |[x, y]: [f32; 2]| -> Point { point(x, y) };
    let mut builder = Path::builder();
    for contour in contours {
        let Some((first, rest)) = contour.points.split_first() else {
            continue;
        };
        builder.begin(to_point(*first));
        for next in rest {
            builder.line_to(to_point(*next));
        }
        builder.end(contour.closed);
    }
    builder.build()
}

impl CaptureDocument {
    /// Tables every node reachable from `root` through child links or parent back-references.
    pub fn capture(scene: &SceneGraph, root: NodeId, surface: Option<Surface>) -> Self {
        let mut index_of: HashMap<NodeId, usize> = HashMap::new();
        let mut order: Vec<NodeId> = Vec::new();
        if scene.node(root).is_some() {
            index_of.insert(root, 0);
            order.push(root);
        }

        let mut cursor = 0;
        while cursor < order.len() {
            let id = order[cursor];
            cursor += 1;
            let neighbours = scene.children(id).iter().copied().chain(scene.parent(id));
            for next in neighbours {
                if scene.node(next).is_none() || index_of.contains_key(&next) {
                    continue;
                }
                index_of.insert(next, order.len());
                order.push(next);
            }
        }

        let mut texture_index: HashMap<*const Texture, usize> = HashMap::new();
        let mut textures = Vec::new();
        let mut nodes = Vec::with_capacity(order.len());
        for id in &order {
            let Some(node) = scene.node(*id) else {
                continue;
            };
            let texture = node.texture.as_ref().map(|texture| {
                *texture_index.entry(Arc::as_ptr(texture)).or_insert_with(|| {
                    textures.push(TextureEntry {
                        url: texture.url.clone(),
                        src: texture.src.clone(),
                        frame: texture.frame,
                    });
                    textures.len() - 1
                })
            });

            nodes.push(NodeEntry {
                id: id.0,
                label: node.label.clone(),
                visible: node.visible,
                position: node.transform.position.to_array(),
                scale: node.transform.scale.to_array(),
                rotation: node.transform.rotation,
                size: node.size.map(|size| size.to_array()),
                tint: node.tint,
                alpha: node.alpha,
                text: node.text.clone(),
                texture,
                is_sprite: node.is_sprite,
                geometry: node.geometry.as_ref().map(outline),
                vertices: node.vertices.map(|quad| quad.to_array()),
                bounds: node.bounds.as_ref().map(bounds_to_array),
                injected: node.injected,
                parent: node.parent().and_then(|parent| index_of.get(&parent).copied()),
                children: node
                    .children()
                    .iter()
                    .filter_map(|child| index_of.get(child).copied())
                    .collect(),
            });
        }

        trace!(nodes = nodes.len(), textures = textures.len(), "captured scene graph");
        Self {
            version: FORMAT_VERSION,
            surface,
            root: 0,
            nodes,
            textures,
        }
    }

    pub fn to_json(&self) -> Result<String, CaptureError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, CaptureError> {
        let document: CaptureDocument = serde_json::from_str(json)?;
        if document.version != FORMAT_VERSION {
            return Err(CaptureError::UnsupportedVersion(document.version));
        }
        Ok(document)
    }

    /// Live-graph ids of the nodes that were drawn with a defect program.
    pub fn injected(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|entry| entry.injected)
            .map(|entry| NodeId(entry.id))
            .collect()
    }

    fn check_index(index: usize, len: usize) -> Result<usize, CaptureError> {
        if index < len {
            Ok(index)
        } else {
            Err(CaptureError::DanglingReference { index, len })
        }
    }

    /// Rebuilds the graph. Node `i` of the table becomes `NodeId(i)`, so the root is `NodeId(0)`
    /// unless the document is empty.
    pub fn to_scene(&self) -> Result<(SceneGraph, NodeId), CaptureError> {
        let node_count = self.nodes.len();
        if node_count == 0 {
            return Err(CaptureError::DanglingReference {
                index: self.root,
                len: 0,
            });
        }
        let root = Self::check_index(self.root, node_count)?;

        let textures: Vec<Arc<Texture>> = self
            .textures
            .iter()
            .map(|entry| {
                Arc::new(Texture {
                    url: entry.url.clone(),
                    src: entry.src.clone(),
                    frame: entry.frame,
                })
            })
            .collect();

        let mut scene = SceneGraph::new();
        for entry in &self.nodes {
            let mut node = SceneNode::container(&entry.label);
            node.visible = entry.visible;
            node.transform.position = Vector::new(entry.position[0], entry.position[1]);
            node.transform.scale = Vector::new(entry.scale[0], entry.scale[1]);
            node.transform.rotation = entry.rotation;
            node.size = entry.size.map(|size| Size::new(size[0], size[1]));
            node.tint = entry.tint;
            node.alpha = entry.alpha;
            node.text = entry.text.clone();
            node.texture = match entry.texture {
                Some(index) => Some(textures[Self::check_index(index, textures.len())?].clone()),
                None => None,
            };
            node.is_sprite = entry.is_sprite;
            node.geometry = entry.geometry.as_deref().map(path_from_outline);
            node.vertices = entry.vertices.map(Quad::from_array);
            node.bounds = entry.bounds.map(array_to_bounds);
            node.bounds_dirty = node.bounds.is_none();
            node.injected = entry.injected;
            scene.add_node(node);
        }

        for (index, entry) in self.nodes.iter().enumerate() {
            let id = NodeId(index);
            let parent = match entry.parent {
                Some(parent) => Some(NodeId(Self::check_index(parent, node_count)?)),
                None => None,
            };
            scene.set_parent(id, parent);
            for child in &entry.children {
                scene.push_child_raw(id, NodeId(Self::check_index(*child, node_count)?));
            }
        }

        Ok((scene, NodeId(root)))
    }
}

/// Serializes the graph reachable from `root` to the sidecar's JSON form.
pub fn serialize(
    scene: &SceneGraph,
    root: NodeId,
    surface: Option<Surface>,
) -> Result<String, CaptureError> {
    CaptureDocument::capture(scene, root, surface).to_json()
}

pub fn deserialize(json: &str) -> Result<(SceneGraph, NodeId), CaptureError> {
    CaptureDocument::from_json(json)?.to_scene()
}
