//! `ProgramBackend` over a real OpenGL (ES) context through `glow`.

use glow::HasContext;
use tracing::warn;

use super::{AttributeLayout, ProgramBackend, ProgramError, UniformKind, UniformValue};

unsafe fn compile_stage(
    gl: &glow::Context,
    stage: u32,
    source: &str,
) -> Result<glow::Shader, String> {
    let shader = gl.create_shader(stage)?;
    gl.shader_source(shader, source);
    gl.compile_shader(shader);
    if !gl.get_shader_compile_status(shader) {
        let log = gl.get_shader_info_log(shader);
        gl.delete_shader(shader);
        return Err(log);
    }
    Ok(shader)
}

/// Components a read-back of `kind` fills. Sampler arrays are not read back.
fn components(kind: UniformKind) -> Option<usize> {
    match kind {
        UniformKind::Float | UniformKind::Int => Some(1),
        UniformKind::Vec2 => Some(2),
        UniformKind::Vec4 => Some(4),
        UniformKind::Mat3 => Some(9),
        UniformKind::SamplerArray(_) => None,
    }
}

fn float_value(kind: UniformKind, v: &[f32]) -> Option<UniformValue> {
    match kind {
        UniformKind::Float => v.first().copied().map(UniformValue::Float),
        UniformKind::Vec2 => v.try_into().ok().map(UniformValue::Vec2),
        UniformKind::Vec4 => v.try_into().ok().map(UniformValue::Vec4),
        UniformKind::Mat3 => v.try_into().ok().map(UniformValue::Mat3),
        UniformKind::Int | UniformKind::SamplerArray(_) => None,
    }
}

impl ProgramBackend for glow::Context {
    type Program = glow::Program;
    type Location = glow::UniformLocation;

    fn compile_program(
        &mut self,
        vertex_source: &str,
        fragment_source: &str,
        attributes: &AttributeLayout,
    ) -> Result<Self::Program, ProgramError> {
        unsafe {
            let vs = compile_stage(self, glow::VERTEX_SHADER, vertex_source)
                .map_err(ProgramError::VertexCompile)?;
            let fs = match compile_stage(self, glow::FRAGMENT_SHADER, fragment_source) {
                Ok(fs) => fs,
                Err(log) => {
                    self.delete_shader(vs);
                    return Err(ProgramError::FragmentCompile(log));
                }
            };

            let program = match self.create_program() {
                Ok(program) => program,
                Err(message) => {
                    self.delete_shader(vs);
                    self.delete_shader(fs);
                    return Err(ProgramError::Create(message));
                }
            };
            self.attach_shader(program, vs);
            self.attach_shader(program, fs);
            // Geometry buffers are shared with the batch program, so slots must line up.
            for (name, slot) in attributes.iter() {
                self.bind_attrib_location(program, slot, name);
            }
            self.link_program(program);

            self.detach_shader(program, vs);
            self.detach_shader(program, fs);
            self.delete_shader(vs);
            self.delete_shader(fs);

            if !self.get_program_link_status(program) {
                let log = self.get_program_info_log(program);
                HasContext::delete_program(self, program);
                return Err(ProgramError::Link(log));
            }

            Ok(program)
        }
    }

    fn delete_program(&mut self, program: Self::Program) {
        unsafe { HasContext::delete_program(self, program) }
    }

    fn use_program(&mut self, program: Self::Program) {
        unsafe { HasContext::use_program(self, Some(program)) }
    }

    fn uniform_location(&mut self, program: Self::Program, name: &str) -> Option<Self::Location> {
        unsafe { self.get_uniform_location(program, name) }
    }

    fn uniform_value(
        &mut self,
        program: Self::Program,
        location: &Self::Location,
        kind: UniformKind,
    ) -> Option<UniformValue> {
        let len = components(kind)?;
        unsafe {
            if kind == UniformKind::Int {
                let mut v = [0i32; 1];
                self.get_uniform_i32(program, location, &mut v);
                return Some(UniformValue::Int(v[0]));
            }
            let mut v = vec![0.0f32; len];
            self.get_uniform_f32(program, location, &mut v);
            float_value(kind, &v)
        }
    }

    fn set_uniform(&mut self, location: Option<&Self::Location>, value: &UniformValue) {
        unsafe {
            match value {
                UniformValue::Float(v) => self.uniform_1_f32(location, *v),
                UniformValue::Vec2(v) => self.uniform_2_f32_slice(location, v),
                UniformValue::Vec4(v) => self.uniform_4_f32_slice(location, v),
                UniformValue::Mat3(v) => self.uniform_matrix_3_f32_slice(location, false, v),
                UniformValue::Int(v) => self.uniform_1_i32(location, *v),
                UniformValue::IntArray(v) => self.uniform_1_i32_slice(location, v),
            }
            let error = self.get_error();
            if error != glow::NO_ERROR {
                warn!(error, "uniform upload raised a GL error");
            }
        }
    }
}
