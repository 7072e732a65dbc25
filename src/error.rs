use thiserror::Error;

use crate::bug::BugClass;

// ── Setup ────────────────────────────────────────────────────────────────────

/// Failures while wiring the engine into a renderer. These abort the operation that hit them.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SetupError {
    #[error("renderer has not been instrumented")]
    NotInstrumented,
    #[error("renderer is already instrumented; wrapping it again would draw every frame twice")]
    AlreadyInstrumented,
    #[error("no frame has been rendered through the instrumented renderer yet")]
    NoFrameObserved,
}

// ── Injection ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InjectionError {
    #[error("unknown bug `{0}`; expected one of appearance, layout, rendering, state, none")]
    UnknownBug(String),
    #[error("bug `{0}` has no program registered in the catalog")]
    NoProgram(BugClass),
    #[error("cannot inject a bug before the renderer and per-node draw are instrumented")]
    NotInstrumented,
}

// ── Catalog ──────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("`none` is reserved and cannot carry a program")]
    ReservedClass,
    #[error("vertex program for `{class}` does not declare attribute `{attribute}`")]
    MissingAttribute { class: BugClass, attribute: String },
    #[error("shader scan pattern failed to build: {0}")]
    Pattern(#[from] regex::Error),
}

// ── Capture ──────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("capture io failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("sidecar is not valid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("capture image failed: {0}")]
    Image(#[from] image::ImageError),
    #[error("sidecar format version {0} is not supported")]
    UnsupportedVersion(u32),
    #[error("sidecar references entry {index} but only {len} entries exist")]
    DanglingReference { index: usize, len: usize },
    #[error("capture name `{0}` is empty or contains a path separator")]
    InvalidName(String),
    #[error("screenshot is empty")]
    EmptyScreenshot,
}

// ── Driver ───────────────────────────────────────────────────────────────────

/// Everything a driver-facing snapshot call can fail with.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error(transparent)]
    Setup(#[from] SetupError),
    #[error(transparent)]
    Injection(#[from] InjectionError),
    #[error(transparent)]
    Capture(#[from] CaptureError),
}
