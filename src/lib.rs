//! Just-in-time visual bug injection for retained-mode 2D renderers.
//!
//! The engine decorates a host renderer's two draw entry points (the frame call and the per-node
//! draw), arms a defect class for a bounded window of frames, draws the selected nodes with the
//! defect's program, freezes the loop at the end of the window and captures the untouched scene
//! graph alongside the surface.

#[cfg(feature = "glow")]
pub use glow;

mod bug;
pub mod capture;
mod client;
mod config;
mod driver;
mod error;
mod freeze;
mod gpu;
mod host;
mod interceptor;
mod scene;
mod selection;
mod swapper;

pub use bug::{BugCatalog, BugClass, BugDescriptor};
pub use capture::{CaptureDocument, CaptureRecord, CaptureStore, NodeRecord, NodeTable};
pub use client::{InjectionClient, InstrumentedRenderer};
pub use config::EngineConfig;
pub use driver::{Page, RenderOverride, RetryPolicy, SnapshotDriver, SnapshotOptions};
pub use error::{CaptureError, CatalogError, DriverError, InjectionError, SetupError};
pub use freeze::{FreezeScheduler, FreezeState, Tick};
pub use gpu::{
    AttributeLayout, ProgramBackend, ProgramBinding, ProgramError, ProgramState, UniformKind,
    UniformSlot, UniformValue,
};
pub use host::{FrameRenderer, HostDraw, NodeDraw, RenderHost, SceneRenderer, Surface};
pub use interceptor::{
    DefectPlan, FrameHooks, PerNodeRenderInterceptor, Rejected, RendererInterceptor,
};
pub use scene::{
    Bounds, NodeClass, NodeId, NodeTransform, Quad, SceneGraph, SceneNode, Texture, NO_TINT,
};
pub use selection::{
    default_accept, within_surface, CandidateSelector, CustomPredicate, SelectionThresholds,
};
pub use swapper::{RelocationRecord, SavedUniform, ShaderProgramSwapper, SwapperConfig};
