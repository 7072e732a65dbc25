//! The automation-facing side: arm, wait for the freeze, capture.
//!
//! The driver never blocks on the page. It polls in-page state with a bounded [`RetryPolicy`] and,
//! once the budget runs out, freezes the page itself and captures whatever is on the surface.
//! A slow page yields a capture without its defect rather than a wedged test run.

use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::bug::BugCatalog;
use crate::capture::{CaptureRecord, CaptureStore};
use crate::client::InjectionClient;
use crate::error::{CaptureError, DriverError, SetupError};
use crate::host::Surface;
use crate::scene::{SceneGraph, SceneNode};
use crate::selection::CustomPredicate;

/// The page under test as the automation layer sees it.
pub trait Page {
    /// The session installed by [`install`](Self::install), if any.
    fn client(&self) -> Option<InjectionClient>;

    fn scene(&self) -> &SceneGraph;

    /// Instruments the page's renderer with `client`.
    fn install(&mut self, client: &InjectionClient) -> Result<(), SetupError>;

    /// Lets the page run for `duration`.
    fn wait(&mut self, duration: Duration);

    /// Renders one frame right now, for pages that only draw on input.
    fn render_now(&mut self);

    /// Reads back the surface. `surface` overrides the size the page reports.
    fn screenshot(&mut self, surface: Option<Surface>) -> Result<RgbaImage, CaptureError>;
}

/// Bounded polling of in-page state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Nominal frame rate used to turn a frame budget into a wait.
    pub frame_rate: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            frame_rate: 60.0,
        }
    }
}

impl RetryPolicy {
    /// Half a frame for a zero budget, otherwise the whole budget.
    pub fn delay_for(&self, frames: u32) -> Duration {
        let frame_rate = if self.frame_rate > 0.0 {
            self.frame_rate
        } else {
            60.0
        };
        if frames == 0 {
            Duration::from_secs_f64(0.5 / frame_rate)
        } else {
            Duration::from_secs_f64(frames as f64 / frame_rate)
        }
    }
}

pub type RenderOverride = Rc<dyn Fn(&mut dyn Page)>;

#[derive(Clone, Default)]
pub struct SnapshotOptions {
    /// Frames to draw with the defect before freezing. `0` freezes after the first frame.
    pub frames: u32,
    /// Surface size to capture, when the page cannot report the right one.
    pub surface: Option<Surface>,
    /// Replaces the default acceptance rule for this capture.
    pub custom_predicate: Option<CustomPredicate>,
    /// Render a frame on every poll, for pages that only draw on input.
    pub force_render: bool,
    /// How the forced frame is rendered. Defaults to [`Page::render_now`].
    pub render_override: Option<RenderOverride>,
}

impl fmt::Debug for SnapshotOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotOptions")
            .field("frames", &self.frames)
            .field("surface", &self.surface)
            .field("custom_predicate", &self.custom_predicate)
            .field("force_render", &self.force_render)
            .field("render_override", &self.render_override.is_some())
            .finish()
    }
}

impl SnapshotOptions {
    pub fn frames(mut self, frames: u32) -> Self {
        self.frames = frames;
        self
    }

    pub fn surface(mut self, surface: Surface) -> Self {
        self.surface = Some(surface);
        self
    }

    pub fn custom_predicate(
        mut self,
        param_name: &str,
        predicate: impl Fn(&SceneNode) -> bool + 'static,
    ) -> Self {
        self.custom_predicate = Some(CustomPredicate::new(param_name, predicate));
        self
    }

    pub fn force_render(mut self, force: bool) -> Self {
        self.force_render = force;
        self
    }

    pub fn render_with(mut self, render: impl Fn(&mut dyn Page) + 'static) -> Self {
        self.force_render = true;
        self.render_override = Some(Rc::new(render));
        self
    }
}

pub struct SnapshotDriver<P> {
    page: P,
    store: CaptureStore,
    catalog: BugCatalog,
    retry: RetryPolicy,
}

impl<P: Page + 'static> SnapshotDriver<P> {
    pub fn new(page: P, store: CaptureStore, catalog: BugCatalog) -> Self {
        Self {
            page,
            store,
            catalog,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn page(&self) -> &P {
        &self.page
    }

    pub fn page_mut(&mut self) -> &mut P {
        &mut self.page
    }

    /// Instruments the page once. Later calls return the installed session.
    pub fn inject_client(&mut self) -> Result<InjectionClient, DriverError> {
        if let Some(client) = self.page.client() {
            debug!("client already injected");
            return Ok(client);
        }
        let client = InjectionClient::new(self.catalog.clone());
        self.page.install(&client)?;
        info!("client injected");
        Ok(client)
    }

    pub fn set_custom_selection_logic(
        &mut self,
        param_name: &str,
        predicate: impl Fn(&SceneNode) -> bool + 'static,
    ) -> Result<(), DriverError> {
        self.inject_client()?
            .set_custom_selection_logic(param_name, predicate);
        Ok(())
    }

    pub fn clear_custom_selection_logic(&mut self) -> Result<(), DriverError> {
        self.inject_client()?.clear_custom_selection_logic();
        Ok(())
    }

    /// Captures the page as it is, without a defect.
    pub fn take_snapshot(&mut self, name: &str) -> Result<CaptureRecord, DriverError> {
        let client = self.inject_client()?;
        self.await_first_frame(&client)?;
        client.freeze(self.page.scene())?;
        self.capture(&client, name, None)
    }

    /// Arms `bug`, waits for the page to freeze at the end of the window, and captures.
    ///
    /// An unknown `bug` is logged and captured as `none`. On failure the armed window is
    /// cancelled and the page released. A per-capture predicate never outlives the call.
    pub fn take_snapshot_with_bug(
        &mut self,
        name: &str,
        bug: &str,
        options: SnapshotOptions,
    ) -> Result<CaptureRecord, DriverError> {
        let client = self.inject_client()?;
        let restore_custom = options.custom_predicate.is_some();
        if let Some(predicate) = options.custom_predicate.clone() {
            client.set_custom_predicate(predicate);
        }

        let outcome = self.snapshot_armed(&client, name, bug, &options);
        if let Err(err) = &outcome {
            if client.disarm() {
                warn!(%err, "snapshot failed; armed defect cancelled");
            }
            client.unfreeze();
        }
        if restore_custom {
            client.clear_custom_selection_logic();
        }
        outcome
    }

    fn snapshot_armed(
        &mut self,
        client: &InjectionClient,
        name: &str,
        bug: &str,
        options: &SnapshotOptions,
    ) -> Result<CaptureRecord, DriverError> {
        let armed = client.inject_bug(bug, options.frames)?;
        let mut frozen = false;
        for attempt in 1..=self.retry.max_attempts {
            if options.force_render {
                match &options.render_override {
                    Some(render) => {
                        let page: &mut dyn Page = &mut self.page;
                        render(page);
                    }
                    None => self.page.render_now(),
                }
            }
            let delay = self.poll_delay(client);
            self.page.wait(delay);
            if client.is_frozen() {
                frozen = true;
                break;
            }
            debug!(attempt, remaining = client.frames_until_freeze(), "waiting for freeze");
        }

        if !frozen {
            warn!(
                bug = %armed,
                attempts = self.retry.max_attempts,
                "page did not freeze in time; capturing anyway"
            );
            self.await_first_frame(client)?;
            client.freeze(self.page.scene())?;
        }

        self.capture(client, name, options.surface)
    }

    /// Long enough for the frames still left in the countdown.
    fn poll_delay(&self, client: &InjectionClient) -> Duration {
        let remaining = u32::try_from(client.frames_until_freeze()).unwrap_or(0);
        self.retry.delay_for(remaining)
    }

    /// Polls until the instrumented renderer has drawn a frame, rendering one per attempt.
    fn await_first_frame(&mut self, client: &InjectionClient) -> Result<(), SetupError> {
        for attempt in 1..=self.retry.max_attempts {
            if client.has_frame_reference() {
                return Ok(());
            }
            debug!(attempt, "waiting for the first instrumented frame");
            self.page.render_now();
            self.page.wait(self.retry.delay_for(0));
        }
        if client.has_frame_reference() {
            Ok(())
        } else {
            Err(SetupError::NoFrameObserved)
        }
    }

    fn capture(
        &mut self,
        client: &InjectionClient,
        name: &str,
        surface: Option<Surface>,
    ) -> Result<CaptureRecord, DriverError> {
        let outcome = self.write_capture(client, name, surface);
        client.unfreeze();
        outcome
    }

    fn write_capture(
        &mut self,
        client: &InjectionClient,
        name: &str,
        surface: Option<Surface>,
    ) -> Result<CaptureRecord, DriverError> {
        let surface = surface.or_else(|| client.last_surface());
        let image = self.page.screenshot(surface)?;
        let sidecar = client.serialize().ok_or(SetupError::NoFrameObserved)?;
        let record = self.store.write(name, &image, &sidecar)?;
        info!(name, "snapshot captured");
        Ok(record)
    }
}
