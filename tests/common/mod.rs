#![allow(dead_code)]

use std::time::Duration;

use image::RgbaImage;
use tempfile::TempDir;
use visbug::{
    CaptureError, CaptureStore, InjectionClient, NodeId, Page, SceneGraph, SetupError,
    SnapshotDriver, Surface,
};
use visbug_test_scenes::{full_catalog, HeadlessPage, CANVAS_HEIGHT, CANVAS_WIDTH};

/// Routes engine logs to the test output. `RUST_LOG=visbug=debug` for more.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn canvas() -> Surface {
    Surface::new(CANVAS_WIDTH, CANVAS_HEIGHT)
}

/// A page on the standard canvas with the full defect catalog installed.
pub fn instrumented_page(scene: SceneGraph, root: NodeId) -> (HeadlessPage, InjectionClient) {
    let mut page = HeadlessPage::new(scene, root, canvas());
    let client = InjectionClient::new(full_catalog());
    page.install(&client).expect("fresh page accepts instrumentation");
    (page, client)
}

pub fn driver_in_tempdir<P: Page + 'static>(page: P) -> (SnapshotDriver<P>, TempDir) {
    let dir = tempfile::tempdir().expect("temp dir");
    let driver = SnapshotDriver::new(page, CaptureStore::new(dir.path()), full_catalog());
    (driver, dir)
}

/// A headless page that records every wait it is asked for. A stalled one never draws.
pub struct RecordingPage {
    pub inner: HeadlessPage,
    pub waits: Vec<Duration>,
    pub stalled: bool,
}

impl RecordingPage {
    pub fn new(inner: HeadlessPage) -> Self {
        Self {
            inner,
            waits: Vec::new(),
            stalled: false,
        }
    }

    pub fn stalled(inner: HeadlessPage) -> Self {
        Self {
            stalled: true,
            ..Self::new(inner)
        }
    }
}

impl Page for RecordingPage {
    fn client(&self) -> Option<InjectionClient> {
        self.inner.client()
    }

    fn scene(&self) -> &SceneGraph {
        self.inner.scene()
    }

    fn install(&mut self, client: &InjectionClient) -> Result<(), SetupError> {
        self.inner.install(client)
    }

    fn wait(&mut self, duration: Duration) {
        self.waits.push(duration);
        if !self.stalled {
            self.inner.wait(duration);
        }
    }

    fn render_now(&mut self) {
        if !self.stalled {
            self.inner.render_now();
        }
    }

    fn screenshot(&mut self, surface: Option<Surface>) -> Result<RgbaImage, CaptureError> {
        self.inner.screenshot(surface)
    }
}
