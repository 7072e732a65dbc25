//! The per-page session: one context object shared by every interceptor.
//!
//! [`InjectionClient`] is a cheap handle (`Rc<RefCell<_>>`) to the state of one instrumented page:
//! the freeze countdown, the armed defect and its selection, and the sidecar captured at freeze.
//! Everything runs on the page's render thread, inside the host's own frame call, so the handle
//! is deliberately `!Send`. Borrows of the session never span a call back into the host.
//!
//! ```rust
//! use visbug::{BugClass, BugCatalog, InjectionClient};
//!
//! let client = InjectionClient::new(BugCatalog::default());
//! // Not instrumented yet, so nothing can be armed.
//! assert!(client.inject_bug("layout", 1).is_err());
//! assert_eq!(client.active_bug(), BugClass::None);
//! assert_eq!(client.frames_until_freeze(), -1);
//! ```

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use ahash::{HashSet, HashSetExt};
use tracing::{debug, error, info, warn};

use crate::bug::{BugCatalog, BugClass, BugDescriptor};
use crate::capture::sidecar;
use crate::error::{InjectionError, SetupError};
use crate::freeze::{FreezeScheduler, Tick};
use crate::gpu::ProgramBackend;
use crate::host::{FrameRenderer, NodeDraw, RenderHost, SceneRenderer, Surface};
use crate::interceptor::{
    DefectPlan, FrameHooks, PerNodeRenderInterceptor, Rejected, RendererInterceptor,
};
use crate::scene::{NodeId, SceneGraph, SceneNode};
use crate::selection::{CandidateSelector, CustomPredicate, SelectionThresholds};
use crate::swapper::SwapperConfig;

/// A host renderer with both entry points instrumented.
pub type InstrumentedRenderer<H, D> = RendererInterceptor<
    SceneRenderer<H, PerNodeRenderInterceptor<<H as RenderHost>::Backend, D, InjectionClient>>,
    InjectionClient,
>;

#[derive(Debug, Default)]
enum Selection {
    #[default]
    Idle,
    /// Armed; computed on the next frame.
    Pending,
    Ready {
        order: Vec<NodeId>,
        members: HashSet<NodeId>,
    },
}

#[derive(Debug, Default)]
struct Session {
    scheduler: FreezeScheduler,
    catalog: BugCatalog,
    selector: CandidateSelector,
    custom: Option<CustomPredicate>,
    active_bug: BugClass,
    descriptor: Option<Arc<BugDescriptor>>,
    selection: Selection,
    root: Option<NodeId>,
    surface: Option<Surface>,
    sidecar: Option<String>,
    renderer_wrapped: bool,
    node_draw_wrapped: bool,
    stale_tags: bool,
}

impl Session {
    /// Ends the armed window: captures the sidecar and disarms.
    fn capture_and_disarm(&mut self, scene: &SceneGraph, root: NodeId) {
        match sidecar::serialize(scene, root, self.surface) {
            Ok(json) => self.sidecar = Some(json),
            Err(err) => {
                error!(%err, "could not serialize scene graph at freeze");
                self.sidecar = None;
            }
        }
        self.selection = Selection::Idle;
        self.active_bug = BugClass::None;
        self.descriptor = None;
    }
}

#[derive(Clone, Default)]
pub struct InjectionClient {
    session: Rc<RefCell<Session>>,
}

impl std::fmt::Debug for InjectionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InjectionClient")
            .field("session", &self.session.borrow())
            .finish()
    }
}

impl InjectionClient {
    pub fn new(catalog: BugCatalog) -> Self {
        Self::with_thresholds(catalog, SelectionThresholds::default())
    }

    pub fn with_thresholds(catalog: BugCatalog, thresholds: SelectionThresholds) -> Self {
        let session = Session {
            catalog,
            selector: CandidateSelector::new(thresholds),
            ..Session::default()
        };
        Self {
            session: Rc::new(RefCell::new(session)),
        }
    }

    // ── Instrumentation ──────────────────────────────────────────────────────

    /// Wraps the frame entry point with this session's hooks.
    pub fn wrap_renderer<R: FrameRenderer>(
        &self,
        renderer: R,
    ) -> Result<RendererInterceptor<R, InjectionClient>, Rejected<R>> {
        if self.session.borrow().renderer_wrapped {
            warn!("session already wraps a renderer");
            return Err(Rejected {
                error: SetupError::AlreadyInstrumented,
                renderer,
            });
        }
        let wrapped = RendererInterceptor::wrap(renderer, self.clone())?;
        self.session.borrow_mut().renderer_wrapped = true;
        Ok(wrapped)
    }

    /// Wraps the per-node draw entry point so selected nodes draw with the defect program.
    pub fn wrap_node_draw<B: ProgramBackend, D>(
        &self,
        draw: D,
        config: SwapperConfig,
    ) -> PerNodeRenderInterceptor<B, D, InjectionClient> {
        self.session.borrow_mut().node_draw_wrapped = true;
        PerNodeRenderInterceptor::new(draw, self.clone(), config)
    }

    /// Instruments both entry points of a scene renderer.
    ///
    /// A second call on the same session is refused and hands the renderer back.
    pub fn instrument<H, D>(
        &self,
        renderer: SceneRenderer<H, D>,
        config: SwapperConfig,
    ) -> Result<InstrumentedRenderer<H, D>, Rejected<SceneRenderer<H, D>>>
    where
        H: RenderHost,
        D: NodeDraw<H>,
    {
        if self.is_instrumented() || self.session.borrow().renderer_wrapped {
            warn!("session is already instrumented");
            return Err(Rejected {
                error: SetupError::AlreadyInstrumented,
                renderer,
            });
        }

        let renderer: SceneRenderer<H, PerNodeRenderInterceptor<H::Backend, D, InjectionClient>> =
            renderer.map_draw(|draw| self.wrap_node_draw(draw, config));
        match self.wrap_renderer(renderer) {
            Ok(instrumented) => {
                info!("renderer instrumented");
                Ok(instrumented)
            }
            Err(rejected) => {
                self.session.borrow_mut().node_draw_wrapped = false;
                Err(Rejected {
                    error: rejected.error,
                    renderer: rejected.renderer.map_draw(|draw| draw.into_inner()),
                })
            }
        }
    }

    pub fn is_instrumented(&self) -> bool {
        let session = self.session.borrow();
        session.renderer_wrapped && session.node_draw_wrapped
    }

    /// Whether a frame has been drawn since instrumentation.
    pub fn has_frame_reference(&self) -> bool {
        self.session.borrow().root.is_some()
    }

    pub fn last_surface(&self) -> Option<Surface> {
        self.session.borrow().surface
    }

    // ── Arming ───────────────────────────────────────────────────────────────

    /// Arms `name` for `frames` more frames after the next one.
    ///
    /// An unknown name, or a class with no program in the catalog, is logged and armed as
    /// `none`: the countdown and the capture still happen. Returns the class actually armed.
    pub fn inject_bug(&self, name: &str, frames: u32) -> Result<BugClass, InjectionError> {
        let class = match name.parse::<BugClass>() {
            Ok(class) => class,
            Err(err) => {
                if !self.is_instrumented() {
                    error!(%err, "inject_bug before instrumentation");
                    return Err(InjectionError::NotInstrumented);
                }
                error!(%err, "proceeding without a defect");
                BugClass::None
            }
        };
        self.inject(class, frames)
    }

    pub fn inject(&self, class: BugClass, frames: u32) -> Result<BugClass, InjectionError> {
        if !self.is_instrumented() {
            error!(bug = %class, "inject_bug before instrumentation");
            return Err(InjectionError::NotInstrumented);
        }

        let mut session = self.session.borrow_mut();
        let descriptor = if class.is_none() {
            None
        } else {
            let descriptor = session.catalog.descriptor(class);
            if descriptor.is_none() {
                error!(err = %InjectionError::NoProgram(class), "proceeding without a defect");
            }
            descriptor
        };
        let armed = descriptor
            .as_ref()
            .map(|descriptor| descriptor.class)
            .unwrap_or(BugClass::None);

        if session.scheduler.is_frozen() {
            session.sidecar = None;
        }
        session.active_bug = armed;
        session.selection = if armed.is_none() {
            Selection::Idle
        } else {
            Selection::Pending
        };
        session.descriptor = descriptor;
        session.stale_tags = true;
        session.scheduler.arm(frames);
        info!(bug = %armed, frames, "bug armed");
        Ok(armed)
    }

    /// Cancels an armed window that has not frozen. Tags it already placed are cleared on the
    /// next frame. Returns `false` when nothing was counting down.
    pub fn disarm(&self) -> bool {
        let mut session = self.session.borrow_mut();
        if !session.scheduler.disarm() {
            return false;
        }
        session.selection = Selection::Idle;
        session.active_bug = BugClass::None;
        session.descriptor = None;
        session.stale_tags = true;
        true
    }

    pub fn active_bug(&self) -> BugClass {
        self.session.borrow().active_bug
    }

    /// The current selection, in breadth-first order. Empty until computed.
    pub fn selection(&self) -> Vec<NodeId> {
        match &self.session.borrow().selection {
            Selection::Ready { order, .. } => order.clone(),
            Selection::Idle | Selection::Pending => Vec::new(),
        }
    }

    pub fn is_selection_pending(&self) -> bool {
        matches!(self.session.borrow().selection, Selection::Pending)
    }

    // ── Selection criteria ───────────────────────────────────────────────────

    pub fn set_custom_selection_logic(
        &self,
        param_name: &str,
        predicate: impl Fn(&SceneNode) -> bool + 'static,
    ) {
        self.set_custom_predicate(CustomPredicate::new(param_name, predicate));
    }

    pub fn set_custom_predicate(&self, predicate: CustomPredicate) {
        debug!(param = predicate.param_name(), "custom selection logic installed");
        self.session.borrow_mut().custom = Some(predicate);
    }

    pub fn clear_custom_selection_logic(&self) {
        if self.session.borrow_mut().custom.take().is_some() {
            debug!("custom selection logic cleared");
        }
    }

    pub fn custom_param_name(&self) -> Option<String> {
        self.session
            .borrow()
            .custom
            .as_ref()
            .map(|custom| custom.param_name().to_string())
    }

    // ── Freezing ─────────────────────────────────────────────────────────────

    /// Freezes now and captures `scene` from the last observed root.
    pub fn freeze(&self, scene: &SceneGraph) -> Result<(), SetupError> {
        let mut session = self.session.borrow_mut();
        let Some(root) = session.root else {
            return Err(SetupError::NoFrameObserved);
        };
        if !session.scheduler.freeze() {
            debug!("already frozen");
            return Ok(());
        }
        session.capture_and_disarm(scene, root);
        Ok(())
    }

    /// Resumes the loop and drops the captured sidecar. Injected tags are cleared on the next
    /// frame.
    pub fn unfreeze(&self) {
        let mut session = self.session.borrow_mut();
        if session.scheduler.unfreeze() {
            session.sidecar = None;
            session.stale_tags = true;
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.session.borrow().scheduler.is_frozen()
    }

    /// `-1` inactive, `0` freezes after the next frame, `n` counting.
    pub fn frames_until_freeze(&self) -> i64 {
        self.session.borrow().scheduler.frames_remaining()
    }

    /// The sidecar captured at the last freeze.
    pub fn serialize(&self) -> Option<String> {
        self.session.borrow().sidecar.clone()
    }
}

impl FrameHooks for InjectionClient {
    fn is_frozen(&self) -> bool {
        InjectionClient::is_frozen(self)
    }

    fn before_frame(&self, scene: &mut SceneGraph, root: NodeId, surface: Surface) {
        let (pending, custom, selector) = {
            let mut session = self.session.borrow_mut();
            session.root = Some(root);
            session.surface = Some(surface);
            if std::mem::take(&mut session.stale_tags) {
                scene.clear_injected_tags();
            }
            (
                matches!(session.selection, Selection::Pending),
                session.custom.clone(),
                session.selector,
            )
        };
        if !pending {
            return;
        }

        // Custom predicates are user code; run them with the session released.
        let order = selector.select_on_surface(scene, root, surface, custom.as_ref());
        info!(selected = order.len(), "injection selection computed");

        let mut session = self.session.borrow_mut();
        if matches!(session.selection, Selection::Pending) {
            let members = order.iter().copied().collect::<HashSet<_>>();
            session.selection = Selection::Ready { order, members };
        }
    }

    fn after_frame(&self, scene: &mut SceneGraph, root: NodeId) {
        let mut session = self.session.borrow_mut();
        if session.scheduler.tick() == Tick::Froze {
            session.capture_and_disarm(scene, root);
        }
    }
}

impl DefectPlan for InjectionClient {
    fn defect_for(&self, id: NodeId) -> Option<Arc<BugDescriptor>> {
        let session = self.session.borrow();
        match &session.selection {
            Selection::Ready { members, .. } if members.contains(&id) => session.descriptor.clone(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instrumented_client() -> InjectionClient {
        let client = InjectionClient::new(BugCatalog::default());
        {
            let mut session = client.session.borrow_mut();
            session.renderer_wrapped = true;
            session.node_draw_wrapped = true;
        }
        client
    }

    fn stage_with_bar() -> (SceneGraph, NodeId, NodeId) {
        let mut scene = SceneGraph::new();
        let stage = scene.add_node(SceneNode::container("stage"));
        let bar = scene.add_child(stage, SceneNode::shape_rect("bar", 400.0, 50.0).at(100.0, 100.0));
        (scene, stage, bar)
    }

    #[test]
    fn inject_requires_instrumentation() {
        let client = InjectionClient::new(BugCatalog::default());

        assert_eq!(
            client.inject(BugClass::Layout, 0),
            Err(InjectionError::NotInstrumented)
        );
        assert_eq!(client.frames_until_freeze(), -1);
    }

    #[test]
    fn unknown_name_arms_none() {
        let client = instrumented_client();

        assert_eq!(client.inject_bug("fizzbuzz", 2), Ok(BugClass::None));
        assert_eq!(client.active_bug(), BugClass::None);
        assert_eq!(client.frames_until_freeze(), 2);
        assert!(!client.is_selection_pending());
    }

    #[test]
    fn class_without_program_arms_none() {
        let client = instrumented_client();

        assert_eq!(client.inject_bug("layout", 0), Ok(BugClass::None));
    }

    #[test]
    fn freeze_needs_an_observed_frame() {
        let client = instrumented_client();
        let (scene, _, _) = stage_with_bar();

        assert_eq!(client.freeze(&scene), Err(SetupError::NoFrameObserved));
    }

    #[test]
    fn countdown_freezes_and_captures_in_after_frame() {
        let client = instrumented_client();
        let (mut scene, stage, _) = stage_with_bar();
        client.inject(BugClass::None, 1).unwrap();

        for _ in 0..2 {
            assert!(!client.is_frozen());
            client.before_frame(&mut scene, stage, Surface::new(800, 600));
            client.after_frame(&mut scene, stage);
        }

        assert!(client.is_frozen());
        assert!(client.serialize().is_some());
        assert!(client.has_frame_reference());

        client.unfreeze();
        assert!(client.serialize().is_none());
        assert_eq!(client.frames_until_freeze(), -1);
    }

    #[test]
    fn stale_tags_are_cleared_on_first_frame_after_unfreeze() {
        let client = instrumented_client();
        let (mut scene, stage, bar) = stage_with_bar();
        client.before_frame(&mut scene, stage, Surface::new(800, 600));
        client.freeze(&scene).unwrap();
        scene.node_mut(bar).unwrap().injected = true;

        client.unfreeze();
        client.before_frame(&mut scene, stage, Surface::new(800, 600));

        assert!(scene.injected_nodes().is_empty());
    }

    #[test]
    fn disarm_drops_the_armed_defect_and_its_tags() {
        let client = instrumented_client();
        client.session.borrow_mut().catalog = BugCatalog::default()
            .with(BugDescriptor::new(
                BugClass::Appearance,
                "attribute vec2 aVertexPosition; attribute vec2 aTextureCoord; \
                 attribute vec4 aColor; attribute float aTextureId; void main() {}",
                "void main() {}",
            ))
            .unwrap();
        let (mut scene, stage, bar) = stage_with_bar();
        client.inject(BugClass::Appearance, 3).unwrap();
        client.before_frame(&mut scene, stage, Surface::new(800, 600));
        assert!(client.defect_for(bar).is_some());
        scene.node_mut(bar).unwrap().injected = true;

        assert!(client.disarm());

        assert_eq!(client.active_bug(), BugClass::None);
        assert_eq!(client.frames_until_freeze(), -1);
        assert!(client.defect_for(bar).is_none());
        client.before_frame(&mut scene, stage, Surface::new(800, 600));
        assert!(scene.injected_nodes().is_empty());
        assert!(!client.disarm());
    }

    #[test]
    fn custom_logic_can_be_set_and_cleared() {
        let client = instrumented_client();
        client.set_custom_selection_logic("sprite", |node| node.visible);

        assert_eq!(client.custom_param_name().as_deref(), Some("sprite"));
        client.clear_custom_selection_logic();
        assert_eq!(client.custom_param_name(), None);
    }
}
