//! Picks the leaf nodes that receive the active defect.
//!
//! A leaf qualifies when it lies fully inside the surface and passes the acceptance predicate.
//! The default predicate prefers elongated, visually salient regions: at least 10% of the surface
//! along one axis and 2% along the other. Tiny decorations and full-frame backgrounds both miss.

use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::host::Surface;
use crate::scene::{NodeId, SceneGraph, SceneNode};

/// Fractions of the surface a node must cover to be picked by the default predicate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionThresholds {
    /// Required share along the longer axis.
    pub major: f64,
    /// Required share along the other axis.
    pub minor: f64,
}

impl Default for SelectionThresholds {
    fn default() -> Self {
        Self {
            major: 0.10,
            minor: 0.02,
        }
    }
}

/// A caller-supplied acceptance predicate and the name it was registered under.
#[derive(Clone)]
pub struct CustomPredicate {
    predicate: Rc<dyn Fn(&SceneNode) -> bool>,
    param_name: String,
}

impl CustomPredicate {
    pub fn new(param_name: impl Into<String>, predicate: impl Fn(&SceneNode) -> bool + 'static) -> Self {
        Self {
            predicate: Rc::new(predicate),
            param_name: param_name.into(),
        }
    }

    pub fn param_name(&self) -> &str {
        &self.param_name
    }

    pub fn accepts(&self, node: &SceneNode) -> bool {
        (self.predicate)(node)
    }
}

impl fmt::Debug for CustomPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomPredicate")
            .field("param_name", &self.param_name)
            .finish_non_exhaustive()
    }
}

/// Bounds are present, finite, and strictly inside `[0, width] × [0, height]`.
pub fn within_surface(node: &SceneNode, surface: Surface) -> bool {
    let Some(bounds) = node.bounds else {
        return false;
    };
    let values = [bounds.min.x, bounds.min.y, bounds.max.x, bounds.max.y];
    if values.iter().any(|value| !value.is_finite()) {
        return false;
    }

    bounds.min.x > 0.0
        && bounds.max.x < surface.width as f32
        && bounds.min.y > 0.0
        && bounds.max.y < surface.height as f32
}

/// The default acceptance rule: `major` × `minor` or `minor` × `major` coverage of the surface.
pub fn default_accept(node: &SceneNode, surface: Surface, thresholds: SelectionThresholds) -> bool {
    let Some(bounds) = node.bounds else {
        return false;
    };
    if surface.width == 0 || surface.height == 0 {
        return false;
    }

    let width_share = (bounds.max.x as f64 - bounds.min.x as f64) / surface.width as f64;
    let height_share = (bounds.max.y as f64 - bounds.min.y as f64) / surface.height as f64;

    (width_share >= thresholds.major && height_share >= thresholds.minor)
        || (width_share >= thresholds.minor && height_share >= thresholds.major)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CandidateSelector {
    pub thresholds: SelectionThresholds,
}

impl CandidateSelector {
    pub fn new(thresholds: SelectionThresholds) -> Self {
        Self { thresholds }
    }

    /// Leaves under `root` that pass both predicates, in breadth-first order.
    ///
    /// Every leaf's bounds are recomputed from the current transforms first, so lazily updated
    /// bounds (after a camera pan, say) never decide the outcome.
    pub fn select<P, A>(
        &self,
        scene: &mut SceneGraph,
        root: NodeId,
        bounds_predicate: P,
        accept_predicate: A,
    ) -> Vec<NodeId>
    where
        P: Fn(&SceneNode) -> bool,
        A: Fn(&SceneNode) -> bool,
    {
        let leaves = scene.leaves(root);
        let mut selected = Vec::new();
        for leaf in leaves.iter().copied() {
            scene.recompute_bounds(leaf);
            let Some(node) = scene.node(leaf) else {
                continue;
            };
            if bounds_predicate(node) && accept_predicate(node) {
                selected.push(leaf);
            }
        }

        debug!(
            leaves = leaves.len(),
            selected = selected.len(),
            "candidate selection"
        );
        selected
    }

    /// [`select`](Self::select) with the on-surface check and either `custom` or the default
    /// acceptance rule.
    pub fn select_on_surface(
        &self,
        scene: &mut SceneGraph,
        root: NodeId,
        surface: Surface,
        custom: Option<&CustomPredicate>,
    ) -> Vec<NodeId> {
        let thresholds = self.thresholds;
        match custom {
            Some(custom) => self.select(
                scene,
                root,
                |node| within_surface(node, surface),
                |node| custom.accepts(node),
            ),
            None => self.select(
                scene,
                root,
                |node| within_surface(node, surface),
                |node| default_accept(node, surface, thresholds),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SQUARE: Surface = Surface {
        width: 1000,
        height: 1000,
    };

    fn placed(width: f32, height: f32) -> SceneNode {
        let mut scene = SceneGraph::new();
        let id = scene.add_node(SceneNode::shape_rect("sample", width, height).at(10.0, 10.0));
        scene.recompute_bounds(id);
        scene.node(id).unwrap().clone()
    }

    fn accepted(width: f32, height: f32) -> bool {
        default_accept(&placed(width, height), SQUARE, SelectionThresholds::default())
    }

    #[test]
    fn ten_by_two_percent_is_selected() {
        assert!(accepted(100.0, 20.0));
        assert!(accepted(20.0, 100.0));
    }

    #[test]
    fn just_under_ten_percent_is_not() {
        assert!(!accepted(99.0, 20.0));
    }

    #[test]
    fn small_square_is_not() {
        assert!(!accepted(20.0, 20.0));
    }

    #[test]
    fn half_surface_is_selected() {
        assert!(accepted(500.0, 500.0));
    }

    #[test]
    fn touching_surface_edge_is_outside() {
        let mut scene = SceneGraph::new();
        let edge = scene.add_node(SceneNode::shape_rect("edge", 100.0, 20.0));
        scene.recompute_bounds(edge);

        assert!(!within_surface(scene.node(edge).unwrap(), SQUARE));
        assert!(within_surface(&placed(100.0, 20.0), SQUARE));
    }

    #[test]
    fn nan_bounds_are_outside() {
        let mut node = placed(100.0, 20.0);
        if let Some(bounds) = node.bounds.as_mut() {
            bounds.max.x = f32::NAN;
        }

        assert!(!within_surface(&node, SQUARE));
    }

    #[test]
    fn select_recomputes_stale_bounds() {
        let mut scene = SceneGraph::new();
        let stage = scene.add_node(SceneNode::container("stage"));
        let bar = scene.add_child(stage, SceneNode::shape_rect("bar", 400.0, 50.0).at(100.0, 100.0));
        scene.update_world(stage);
        // Pan the camera off-surface without refreshing bounds.
        scene.node_mut(stage).unwrap().transform.position = (2000.0, 0.0).into();

        let selected = CandidateSelector::default().select_on_surface(
            &mut scene,
            stage,
            Surface::new(800, 600),
            None,
        );

        assert!(selected.is_empty());
        assert_eq!(scene.node(bar).unwrap().bounds.unwrap().min.x, 2100.0);
    }

    #[test]
    fn custom_predicate_replaces_default_rule() {
        let mut scene = SceneGraph::new();
        let stage = scene.add_node(SceneNode::container("stage"));
        let tiny = scene.add_child(stage, SceneNode::shape_rect("tiny", 4.0, 4.0).at(50.0, 50.0));
        scene.add_child(stage, SceneNode::shape_rect("wide", 400.0, 50.0).at(100.0, 100.0));
        let custom = CustomPredicate::new("node", |node| node.label == "tiny");

        let selected = CandidateSelector::default().select_on_surface(
            &mut scene,
            stage,
            Surface::new(800, 600),
            Some(&custom),
        );

        assert_eq!(selected, vec![tiny]);
        assert_eq!(custom.param_name(), "node");
    }
}
