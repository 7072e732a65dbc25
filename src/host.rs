//! Seams between the engine and the host renderer.
//!
//! A host renderer is split into three entry points the engine can decorate:
//!
//! - [`FrameRenderer`]: the single top-level "render a frame" call.
//! - [`NodeDraw`]: the per-node draw call the frame traversal routes every node through.
//! - [`RenderHost`]: the batching backend underneath, whose flush and program bookkeeping the
//!   shader swapper needs.
//!
//! [`SceneRenderer`] is the stock traversal that ties them together.

use ahash::{HashSet, HashSetExt};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::gpu::{ProgramBackend, ProgramState};
use crate::scene::{NodeId, SceneGraph};

/// Pixel size of the rendering surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Surface {
    pub width: u32,
    pub height: u32,
}

impl Surface {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// The batching renderer underneath a scene traversal.
pub trait RenderHost {
    type Backend: ProgramBackend;

    fn surface(&self) -> Surface;

    fn begin_frame(&mut self);

    /// Adds the node's own geometry to the current batch. Nodes without drawable content are
    /// skipped.
    fn draw_node(&mut self, scene: &SceneGraph, id: NodeId);

    /// Submits everything batched so far with the program the binding currently points at.
    fn flush(&mut self);

    fn end_frame(&mut self);

    fn program_state(&mut self) -> ProgramState<'_, Self::Backend>;
}

/// Per-node draw entry point.
pub trait NodeDraw<H: RenderHost> {
    fn draw(&mut self, host: &mut H, scene: &mut SceneGraph, id: NodeId);
}

/// The host's own, unmodified per-node draw.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostDraw;

impl<H: RenderHost> NodeDraw<H> for HostDraw {
    fn draw(&mut self, host: &mut H, scene: &mut SceneGraph, id: NodeId) {
        host.draw_node(scene, id);
    }
}

/// The top-level render-frame entry point.
pub trait FrameRenderer {
    fn render(&mut self, scene: &mut SceneGraph, root: NodeId);

    fn surface(&self) -> Surface;

    /// Whether this renderer already carries the engine's frame hooks.
    fn is_instrumented(&self) -> bool {
        false
    }
}

/// Frame traversal over a [`RenderHost`], routing every node through `D`.
pub struct SceneRenderer<H, D = HostDraw> {
    host: H,
    draw: D,
}

impl<H: RenderHost> SceneRenderer<H, HostDraw> {
    pub fn new(host: H) -> Self {
        Self {
            host,
            draw: HostDraw,
        }
    }
}

impl<H: RenderHost, D: NodeDraw<H>> SceneRenderer<H, D> {
    pub fn with_draw(host: H, draw: D) -> Self {
        Self { host, draw }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn node_draw(&self) -> &D {
        &self.draw
    }

    /// Replaces the per-node draw with a decorated version of itself.
    pub fn map_draw<E, F>(self, wrap: F) -> SceneRenderer<H, E>
    where
        E: NodeDraw<H>,
        F: FnOnce(D) -> E,
    {
        SceneRenderer {
            host: self.host,
            draw: wrap(self.draw),
        }
    }

    pub fn into_parts(self) -> (H, D) {
        (self.host, self.draw)
    }
}

impl<H: RenderHost, D: NodeDraw<H>> FrameRenderer for SceneRenderer<H, D> {
    /// Depth-first, pre-order, children in order. Invisible nodes hide their subtree. A node
    /// shared by several parents is drawn once, at its first occurrence.
    fn render(&mut self, scene: &mut SceneGraph, root: NodeId) {
        scene.update_world(root);
        self.host.begin_frame();

        let mut seen = HashSet::new();
        let mut stack = vec![root];
        let mut drawn = 0usize;
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            let Some(node) = scene.node(id) else {
                continue;
            };
            if !node.visible {
                continue;
            }
            stack.extend(node.children().iter().rev().copied());

            self.draw.draw(&mut self.host, scene, id);
            drawn += 1;
        }

        self.host.flush();
        self.host.end_frame();
        trace!(drawn, "frame rendered");
    }

    fn surface(&self) -> Surface {
        self.host.surface()
    }
}
