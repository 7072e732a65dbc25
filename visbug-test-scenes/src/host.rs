//! A batching host renderer that rasterizes on the CPU.
//!
//! Nodes are queued as quads and only reach the target on [`RenderHost::flush`], which binds the
//! program the host's [`ProgramBinding`] points at, uploads the batch uniforms through the cached
//! locations, and fills every queued quad with that program's effect. This mirrors the way a GPU
//! batch renderer depends on its uniform-location cache being right.

use image::{Rgba, RgbaImage};
use lyon::math::Point;
use tracing::warn;
use visbug::{
    AttributeLayout, NodeId, ProgramBackend, ProgramBinding, ProgramState, RenderHost, SceneGraph,
    Surface, UniformKind, UniformValue, NO_TINT,
};

use crate::shaders::{DEFAULT_FRAGMENT, DEFAULT_VERTEX};
use crate::soft_gpu::{ProgramEffect, SoftGpu};

/// Uniforms the batch program declares.
pub const BATCH_UNIFORMS: [(&str, UniformKind); 4] = [
    ("projectionMatrix", UniformKind::Mat3),
    ("translationMatrix", UniformKind::Mat3),
    ("tint", UniformKind::Vec4),
    ("uSamplers", UniformKind::SamplerArray(16)),
];

const IDENTITY: [f32; 9] = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];

/// Clear color: fully transparent.
pub const BACKGROUND: Rgba<u8> = Rgba([0, 0, 0, 0]);

#[derive(Debug, Clone, Copy)]
struct QueuedQuad {
    corners: [Point; 4],
    color: [u8; 4],
}

/// Column-major 3x3 matrix applied to a 2D point.
fn apply(matrix: &[f32; 9], point: Point) -> (f32, f32) {
    (
        matrix[0] * point.x + matrix[3] * point.y + matrix[6],
        matrix[1] * point.x + matrix[4] * point.y + matrix[7],
    )
}

fn edge(a: (f32, f32), b: (f32, f32), p: (f32, f32)) -> f32 {
    (b.0 - a.0) * (p.1 - a.1) - (b.1 - a.1) * (p.0 - a.0)
}

fn blend(dst: Rgba<u8>, src: [u8; 4]) -> Rgba<u8> {
    if src[3] == 255 {
        return Rgba(src);
    }
    let alpha = src[3] as f32 / 255.0;
    let inverse = 1.0 - alpha;
    let mut out = [0u8; 4];
    for channel in 0..3 {
        out[channel] =
            (src[channel] as f32 * alpha + dst.0[channel] as f32 * inverse).round() as u8;
    }
    out[3] = ((alpha + dst.0[3] as f32 / 255.0 * inverse) * 255.0).round() as u8;
    Rgba(out)
}

pub struct SoftHost {
    gpu: SoftGpu,
    binding: ProgramBinding<SoftGpu>,
    surface: Surface,
    target: RgbaImage,
    batch: Vec<QueuedQuad>,
    /// Flushes that submitted at least one quad.
    pub flushes: usize,
    pub frames: u64,
}

impl SoftHost {
    pub fn new(width: u32, height: u32) -> Self {
        let mut gpu = SoftGpu::new();
        let layout = AttributeLayout::batch_default();
        let program = gpu
            .compile_program(DEFAULT_VERTEX, DEFAULT_FRAGMENT, &layout)
            .expect("batch program links");
        let binding = ProgramBinding::for_program(&mut gpu, program, layout, &BATCH_UNIFORMS);
        gpu.use_program(program);

        Self {
            gpu,
            binding,
            surface: Surface::new(width, height),
            target: RgbaImage::from_pixel(width, height, BACKGROUND),
            batch: Vec::new(),
            flushes: 0,
            frames: 0,
        }
    }

    pub fn target(&self) -> &RgbaImage {
        &self.target
    }

    pub fn gpu(&self) -> &SoftGpu {
        &self.gpu
    }

    pub fn binding(&self) -> &ProgramBinding<SoftGpu> {
        &self.binding
    }

    /// Maps surface pixels to clip space, y down.
    fn projection(&self) -> [f32; 9] {
        let width = self.surface.width.max(1) as f32;
        let height = self.surface.height.max(1) as f32;
        [
            2.0 / width,
            0.0,
            0.0,
            0.0,
            -2.0 / height,
            0.0,
            -1.0,
            1.0,
            1.0,
        ]
    }

    fn upload_batch_uniforms(&mut self) {
        let values = [
            ("projectionMatrix", UniformValue::Mat3(self.projection())),
            ("translationMatrix", UniformValue::Mat3(IDENTITY)),
            ("tint", UniformValue::Vec4([1.0; 4])),
            ("uSamplers", UniformValue::sampler_units(16)),
        ];
        for (name, value) in values {
            self.gpu.set_uniform(self.binding.location_of(name), &value);
        }
    }

    fn matrix(&self, program: crate::soft_gpu::ProgramId, name: &str) -> Option<[f32; 9]> {
        match self.gpu.value(program, name) {
            Some(UniformValue::Mat3(matrix)) => Some(matrix),
            _ => None,
        }
    }

    fn fill(
        &mut self,
        quad: QueuedQuad,
        effect: ProgramEffect,
        projection: &[f32; 9],
        translation: &[f32; 9],
        tint: [f32; 4],
    ) {
        let clip_w = if effect == ProgramEffect::Layout { 2.0 } else { 1.0 };
        let width = self.target.width() as f32;
        let height = self.target.height() as f32;
        let corners = quad.corners.map(|corner| {
            let (x, y) = apply(translation, corner);
            let (clip_x, clip_y) = apply(projection, Point::new(x, y));
            (
                (clip_x / clip_w + 1.0) * 0.5 * width,
                (1.0 - clip_y / clip_w) * 0.5 * height,
            )
        });

        let mut color = [0u8; 4];
        for channel in 0..4 {
            color[channel] = (quad.color[channel] as f32 * tint[channel].clamp(0.0, 1.0)).round() as u8;
        }
        match effect {
            ProgramEffect::Appearance => {
                for channel in color.iter_mut().take(3) {
                    *channel = 255 - *channel;
                }
            }
            ProgramEffect::State => {
                let grey = (0.299 * color[0] as f32 + 0.587 * color[1] as f32 + 0.114 * color[2] as f32)
                    .round() as u8;
                color = [grey, grey, grey, color[3]];
            }
            ProgramEffect::Default | ProgramEffect::Layout | ProgramEffect::Rendering => {}
        }

        let min_x = corners.iter().map(|c| c.0).fold(f32::INFINITY, f32::min).floor().max(0.0);
        let min_y = corners.iter().map(|c| c.1).fold(f32::INFINITY, f32::min).floor().max(0.0);
        let max_x = corners.iter().map(|c| c.0).fold(f32::NEG_INFINITY, f32::max).ceil().min(width);
        let max_y = corners.iter().map(|c| c.1).fold(f32::NEG_INFINITY, f32::max).ceil().min(height);
        if !(min_x < max_x && min_y < max_y) {
            return;
        }

        for y in min_y as u32..max_y as u32 {
            if effect == ProgramEffect::Rendering && y % 2 == 1 {
                continue;
            }
            for x in min_x as u32..max_x as u32 {
                let center = (x as f32 + 0.5, y as f32 + 0.5);
                let sides = [
                    edge(corners[0], corners[1], center),
                    edge(corners[1], corners[2], center),
                    edge(corners[2], corners[3], center),
                    edge(corners[3], corners[0], center),
                ];
                let inside = sides.iter().all(|side| *side >= 0.0)
                    || sides.iter().all(|side| *side <= 0.0);
                if inside {
                    let pixel = self.target.get_pixel_mut(x, y);
                    *pixel = blend(*pixel, color);
                }
            }
        }
    }
}

impl RenderHost for SoftHost {
    type Backend = SoftGpu;

    fn surface(&self) -> Surface {
        self.surface
    }

    fn begin_frame(&mut self) {
        for pixel in self.target.pixels_mut() {
            *pixel = BACKGROUND;
        }
        self.batch.clear();
    }

    fn draw_node(&mut self, scene: &SceneGraph, id: NodeId) {
        let Some(node) = scene.node(id) else {
            return;
        };
        if node.class().is_none() {
            return;
        }
        let Some(quad) = node.vertices else {
            return;
        };

        let tint = node.tint.unwrap_or(NO_TINT);
        let alpha = node.alpha.unwrap_or(1.0).clamp(0.0, 1.0);
        self.batch.push(QueuedQuad {
            corners: quad.0,
            color: [
                (tint >> 16 & 0xFF) as u8,
                (tint >> 8 & 0xFF) as u8,
                (tint & 0xFF) as u8,
                (alpha * 255.0).round() as u8,
            ],
        });
    }

    fn flush(&mut self) {
        if self.batch.is_empty() {
            return;
        }

        self.gpu.use_program(self.binding.program);
        self.upload_batch_uniforms();
        let Some(program) = self.gpu.current_program() else {
            warn!("batch program is gone; dropping batch");
            self.batch.clear();
            return;
        };
        let effect = self.gpu.effect(program).unwrap_or(ProgramEffect::Default);
        let Some(projection) = self.matrix(program, "projectionMatrix") else {
            warn!("program has no projection; dropping batch");
            self.batch.clear();
            return;
        };
        let translation = self.matrix(program, "translationMatrix").unwrap_or(IDENTITY);
        let tint = match self.gpu.value(program, "tint") {
            Some(UniformValue::Vec4(tint)) => tint,
            _ => [1.0; 4],
        };

        let quads = std::mem::take(&mut self.batch);
        for quad in quads {
            self.fill(quad, effect, &projection, &translation, tint);
        }
        self.flushes += 1;
    }

    fn end_frame(&mut self) {
        self.frames += 1;
    }

    fn program_state(&mut self) -> ProgramState<'_, SoftGpu> {
        ProgramState {
            backend: &mut self.gpu,
            binding: &mut self.binding,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use visbug::SceneNode;

    #[test]
    fn nothing_reaches_the_target_before_flush() {
        let mut host = SoftHost::new(40, 40);
        let mut scene = SceneGraph::new();
        let square = scene.add_node(SceneNode::shape_rect("square", 10.0, 10.0).at(5.0, 5.0).with_tint(0xFF0000));
        scene.update_world(square);

        host.begin_frame();
        host.draw_node(&scene, square);
        assert_eq!(*host.target().get_pixel(10, 10), BACKGROUND);

        host.flush();
        assert_eq!(*host.target().get_pixel(10, 10), Rgba([255, 0, 0, 255]));
        assert_eq!(*host.target().get_pixel(2, 2), BACKGROUND);
        assert_eq!(host.flushes, 1);
    }
}
