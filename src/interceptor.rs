//! Decorators around the host's render entry points.
//!
//! [`RendererInterceptor`] wraps the top-level frame call and runs the session's frame hooks
//! around it. [`PerNodeRenderInterceptor`] wraps the per-node draw call and swaps the defect
//! program in around the draws of selected nodes. Both are built once, at instrumentation time,
//! and own the entry point they decorate.

use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::bug::BugDescriptor;
use crate::error::SetupError;
use crate::gpu::ProgramBackend;
use crate::host::{FrameRenderer, NodeDraw, RenderHost, Surface};
use crate::scene::{NodeId, SceneGraph};
use crate::swapper::{ShaderProgramSwapper, SwapperConfig};

// ── Frame hooks ──────────────────────────────────────────────────────────────

/// Hooks run around every frame that is actually drawn.
pub trait FrameHooks {
    /// A frozen loop draws nothing and runs no hooks.
    fn is_frozen(&self) -> bool;

    /// Runs after the frame's root and surface are known, before anything is drawn.
    fn before_frame(&self, scene: &mut SceneGraph, root: NodeId, surface: Surface);

    fn after_frame(&self, scene: &mut SceneGraph, root: NodeId);
}

/// A wrapper construction that was refused. Hands the renderer back untouched.
#[derive(Debug)]
pub struct Rejected<R> {
    pub error: SetupError,
    pub renderer: R,
}

pub struct RendererInterceptor<R, K> {
    inner: R,
    hooks: K,
}

impl<R: FrameRenderer, K: FrameHooks> RendererInterceptor<R, K> {
    /// Fails when `inner` already carries frame hooks, since that would draw every frame twice.
    pub fn wrap(inner: R, hooks: K) -> Result<Self, Rejected<R>> {
        if inner.is_instrumented() {
            warn!("renderer is already instrumented; not wrapping again");
            return Err(Rejected {
                error: SetupError::AlreadyInstrumented,
                renderer: inner,
            });
        }
        Ok(Self { inner, hooks })
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: FrameRenderer, K: FrameHooks> FrameRenderer for RendererInterceptor<R, K> {
    fn render(&mut self, scene: &mut SceneGraph, root: NodeId) {
        if self.hooks.is_frozen() {
            trace!("frozen; frame skipped");
            return;
        }

        let surface = self.inner.surface();
        self.hooks.before_frame(scene, root, surface);
        self.inner.render(scene, root);
        self.hooks.after_frame(scene, root);
    }

    fn surface(&self) -> Surface {
        self.inner.surface()
    }

    fn is_instrumented(&self) -> bool {
        true
    }
}

// ── Per-node draw ────────────────────────────────────────────────────────────

/// Answers, per node, whether it is drawn with a defect program and which one.
pub trait DefectPlan {
    /// `None` when no defect is armed, the selection is not computed yet, or `id` is not in it.
    fn defect_for(&self, id: NodeId) -> Option<Arc<BugDescriptor>>;
}

pub struct PerNodeRenderInterceptor<B: ProgramBackend, D, P> {
    inner: D,
    plan: P,
    swapper: ShaderProgramSwapper<B>,
}

impl<B: ProgramBackend, D, P: DefectPlan> PerNodeRenderInterceptor<B, D, P> {
    pub fn new(inner: D, plan: P, config: SwapperConfig) -> Self {
        Self {
            inner,
            plan,
            swapper: ShaderProgramSwapper::new(config),
        }
    }

    pub fn swapper(&self) -> &ShaderProgramSwapper<B> {
        &self.swapper
    }

    pub fn into_inner(self) -> D {
        self.inner
    }
}

impl<H, D, P> NodeDraw<H> for PerNodeRenderInterceptor<H::Backend, D, P>
where
    H: RenderHost,
    D: NodeDraw<H>,
    P: DefectPlan,
{
    fn draw(&mut self, host: &mut H, scene: &mut SceneGraph, id: NodeId) {
        let Some(descriptor) = self.plan.defect_for(id) else {
            self.inner.draw(host, scene, id);
            return;
        };

        // The defect draw must not share a batch with anything drawn normally.
        host.flush();
        if let Err(err) = self.swapper.activate(host.program_state(), &descriptor) {
            warn!(node = %id, bug = %descriptor.class, %err, "defect not applied; drawing normally");
            self.inner.draw(host, scene, id);
            return;
        }

        if let Some(node) = scene.node_mut(id) {
            node.injected = true;
        }
        debug!(node = %id, bug = %descriptor.class, "drawing node with defect program");
        self.inner.draw(host, scene, id);
        host.flush();

        if let Err(err) = self.swapper.deactivate(host.program_state()) {
            warn!(node = %id, %err, "defect program was not active at restore");
        }
    }
}
