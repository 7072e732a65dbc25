//! A headless page: a scene, a [`SoftHost`] renderer and a frame loop driven by `wait`.

use std::time::Duration;

use image::RgbaImage;
use tracing::debug;
use visbug::{
    CaptureError, FrameRenderer, HostDraw, InjectionClient, InstrumentedRenderer, NodeId, Page,
    SceneGraph, SceneRenderer, SetupError, ShaderProgramSwapper, Surface, SwapperConfig,
};

use crate::host::{SoftHost, BACKGROUND};
use crate::soft_gpu::SoftGpu;

type Animation = Box<dyn FnMut(&mut SceneGraph, NodeId)>;

enum PageRenderer {
    Plain(SceneRenderer<SoftHost>),
    Instrumented(InstrumentedRenderer<SoftHost, HostDraw>),
    /// Only observed while `install` swaps one for the other.
    Detached,
}

pub struct HeadlessPage {
    renderer: PageRenderer,
    scene: SceneGraph,
    root: NodeId,
    client: Option<InjectionClient>,
    swapper_config: SwapperConfig,
    /// Whether the page renders on its own while time passes.
    ticking: bool,
    frame_rate: f64,
    animation: Option<Animation>,
}

impl HeadlessPage {
    pub fn new(scene: SceneGraph, root: NodeId, surface: Surface) -> Self {
        Self {
            renderer: PageRenderer::Plain(SceneRenderer::new(SoftHost::new(
                surface.width,
                surface.height,
            ))),
            scene,
            root,
            client: None,
            swapper_config: SwapperConfig::default(),
            ticking: true,
            frame_rate: 60.0,
            animation: None,
        }
    }

    /// A page that only renders when asked to.
    pub fn input_driven(mut self) -> Self {
        self.ticking = false;
        self
    }

    pub fn with_frame_rate(mut self, frame_rate: f64) -> Self {
        self.frame_rate = frame_rate;
        self
    }

    pub fn with_swapper_config(mut self, config: SwapperConfig) -> Self {
        self.swapper_config = config;
        self
    }

    /// Runs before every frame, like a game's update step.
    pub fn with_animation(mut self, animation: impl FnMut(&mut SceneGraph, NodeId) + 'static) -> Self {
        self.animation = Some(Box::new(animation));
        self
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn scene_mut(&mut self) -> &mut SceneGraph {
        &mut self.scene
    }

    pub fn host(&self) -> Option<&SoftHost> {
        match &self.renderer {
            PageRenderer::Plain(renderer) => Some(renderer.host()),
            PageRenderer::Instrumented(renderer) => Some(renderer.inner().host()),
            PageRenderer::Detached => None,
        }
    }

    pub fn frames_rendered(&self) -> u64 {
        self.host().map(|host| host.frames).unwrap_or(0)
    }

    /// The instrumented renderer's shader swapper, once installed.
    pub fn swapper(&self) -> Option<&ShaderProgramSwapper<SoftGpu>> {
        match &self.renderer {
            PageRenderer::Instrumented(renderer) => Some(renderer.inner().node_draw().swapper()),
            PageRenderer::Plain(_) | PageRenderer::Detached => None,
        }
    }
}

impl Page for HeadlessPage {
    fn client(&self) -> Option<InjectionClient> {
        self.client.clone()
    }

    fn scene(&self) -> &SceneGraph {
        &self.scene
    }

    fn install(&mut self, client: &InjectionClient) -> Result<(), SetupError> {
        match std::mem::replace(&mut self.renderer, PageRenderer::Detached) {
            PageRenderer::Plain(renderer) => match client.instrument(renderer, self.swapper_config) {
                Ok(instrumented) => {
                    self.renderer = PageRenderer::Instrumented(instrumented);
                    self.client = Some(client.clone());
                    Ok(())
                }
                Err(rejected) => {
                    self.renderer = PageRenderer::Plain(rejected.renderer);
                    Err(rejected.error)
                }
            },
            other => {
                self.renderer = other;
                Err(SetupError::AlreadyInstrumented)
            }
        }
    }

    fn wait(&mut self, duration: Duration) {
        if !self.ticking {
            return;
        }
        let frames = (duration.as_secs_f64() * self.frame_rate).ceil().max(1.0) as u64;
        debug!(frames, "page ticking");
        for _ in 0..frames {
            self.render_now();
        }
    }

    fn render_now(&mut self) {
        let frozen = self.client.as_ref().is_some_and(|client| client.is_frozen());
        if let (false, Some(animation)) = (frozen, self.animation.as_mut()) {
            animation(&mut self.scene, self.root);
        }
        match &mut self.renderer {
            PageRenderer::Plain(renderer) => renderer.render(&mut self.scene, self.root),
            PageRenderer::Instrumented(renderer) => renderer.render(&mut self.scene, self.root),
            PageRenderer::Detached => {}
        }
    }

    fn screenshot(&mut self, surface: Option<Surface>) -> Result<RgbaImage, CaptureError> {
        let Some(host) = self.host() else {
            return Err(CaptureError::EmptyScreenshot);
        };
        let target = host.target();
        let image = match surface {
            Some(surface) if surface != host_surface(target) => {
                let mut resized = RgbaImage::from_pixel(surface.width, surface.height, BACKGROUND);
                for y in 0..surface.height.min(target.height()) {
                    for x in 0..surface.width.min(target.width()) {
                        resized.put_pixel(x, y, *target.get_pixel(x, y));
                    }
                }
                resized
            }
            _ => target.clone(),
        };
        if image.width() == 0 || image.height() == 0 {
            return Err(CaptureError::EmptyScreenshot);
        }
        Ok(image)
    }
}

fn host_surface(target: &RgbaImage) -> Surface {
    Surface::new(target.width(), target.height())
}
