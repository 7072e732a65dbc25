//! A software `ProgramBackend`.
//!
//! Shader text is not executed. A program's behaviour is picked by the `#define SHADER_NAME <name>`
//! line in its sources, and its uniforms are whatever the sources declare with `uniform`. Linking
//! fails when the name is unknown or either stage lacks `void main`, which is enough to exercise
//! every path of the swapper.

use regex::Regex;
use visbug::{AttributeLayout, ProgramBackend, ProgramError, UniformKind, UniformValue};

/// What a linked program does to the quads it draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramEffect {
    /// Flat fill with the vertex color.
    Default,
    /// Inverted color.
    Appearance,
    /// Divides clip-space `w` by two, pulling geometry halfway towards the surface centre.
    Layout,
    /// Drops every odd scanline.
    Rendering,
    /// Greyscale.
    State,
}

impl ProgramEffect {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "default" => Some(ProgramEffect::Default),
            "appearance" => Some(ProgramEffect::Appearance),
            "layout" => Some(ProgramEffect::Layout),
            "rendering" => Some(ProgramEffect::Rendering),
            "state" => Some(ProgramEffect::State),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramId(u32);

#[derive(Debug, Clone, PartialEq)]
pub struct UniformLocation {
    program: ProgramId,
    index: usize,
}

#[derive(Debug)]
struct SoftProgram {
    effect: ProgramEffect,
    uniforms: Vec<(String, Option<UniformValue>)>,
    deleted: bool,
}

#[derive(Debug, Default)]
pub struct SoftGpu {
    programs: Vec<SoftProgram>,
    current: Option<ProgramId>,
    /// Writes that targeted a program other than the one in use. GL ignores these silently.
    pub stray_writes: usize,
}

fn shader_name(sources: &[&str]) -> Option<String> {
    let pattern = Regex::new(r"#define\s+SHADER_NAME\s+(\w+)").expect("valid pattern");
    sources
        .iter()
        .find_map(|source| pattern.captures(source))
        .map(|captures| captures[1].to_string())
}

fn declared_uniforms(sources: &[&str]) -> Vec<String> {
    let pattern = Regex::new(r"uniform\s+\w+\s+(?:\w+\s+)?(\w+)\s*(?:\[\s*\d+\s*\])?\s*;")
        .expect("valid pattern");
    let mut names: Vec<String> = Vec::new();
    for source in sources {
        for captures in pattern.captures_iter(source) {
            let name = captures[1].to_string();
            if !names.contains(&name) {
                names.push(name);
            }
        }
    }
    names
}

impl SoftGpu {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_program(&self) -> Option<ProgramId> {
        self.current
    }

    pub fn effect(&self, program: ProgramId) -> Option<ProgramEffect> {
        self.program(program).map(|program| program.effect)
    }

    /// The value stored in `program` under `name`.
    pub fn value(&self, program: ProgramId, name: &str) -> Option<UniformValue> {
        self.program(program)?
            .uniforms
            .iter()
            .find(|(uniform, _)| uniform == name)
            .and_then(|(_, value)| value.clone())
    }

    pub fn live_programs(&self) -> usize {
        self.programs.iter().filter(|program| !program.deleted).count()
    }

    fn program(&self, program: ProgramId) -> Option<&SoftProgram> {
        self.programs
            .get(program.0 as usize)
            .filter(|program| !program.deleted)
    }
}

impl ProgramBackend for SoftGpu {
    type Program = ProgramId;
    type Location = UniformLocation;

    fn compile_program(
        &mut self,
        vertex_source: &str,
        fragment_source: &str,
        _attributes: &AttributeLayout,
    ) -> Result<ProgramId, ProgramError> {
        if !vertex_source.contains("void main") {
            return Err(ProgramError::VertexCompile(
                "ERROR: 0:1: 'main' : function not defined".to_string(),
            ));
        }
        if !fragment_source.contains("void main") {
            return Err(ProgramError::FragmentCompile(
                "ERROR: 0:1: 'main' : function not defined".to_string(),
            ));
        }

        let sources = [vertex_source, fragment_source];
        let name = shader_name(&sources)
            .ok_or_else(|| ProgramError::Link("missing SHADER_NAME".to_string()))?;
        let effect = ProgramEffect::from_name(&name)
            .ok_or_else(|| ProgramError::Link(format!("unknown program `{name}`")))?;

        self.programs.push(SoftProgram {
            effect,
            uniforms: declared_uniforms(&sources)
                .into_iter()
                .map(|name| (name, None))
                .collect(),
            deleted: false,
        });
        Ok(ProgramId((self.programs.len() - 1) as u32))
    }

    fn delete_program(&mut self, program: ProgramId) {
        if let Some(program) = self.programs.get_mut(program.0 as usize) {
            program.deleted = true;
        }
        if self.current == Some(program) {
            self.current = None;
        }
    }

    fn use_program(&mut self, program: ProgramId) {
        self.current = self.program(program).map(|_| program);
    }

    fn uniform_location(&mut self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        self.program(program)?
            .uniforms
            .iter()
            .position(|(uniform, _)| uniform == name)
            .map(|index| UniformLocation { program, index })
    }

    fn uniform_value(
        &mut self,
        program: ProgramId,
        location: &UniformLocation,
        _kind: UniformKind,
    ) -> Option<UniformValue> {
        if location.program != program {
            return None;
        }
        self.program(program)?
            .uniforms
            .get(location.index)
            .and_then(|(_, value)| value.clone())
    }

    fn set_uniform(&mut self, location: Option<&UniformLocation>, value: &UniformValue) {
        let Some(location) = location else {
            return;
        };
        if self.current != Some(location.program) {
            self.stray_writes += 1;
            return;
        }
        if let Some(program) = self.programs.get_mut(location.program.0 as usize) {
            if let Some(slot) = program.uniforms.get_mut(location.index) {
                slot.1 = Some(value.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shaders::{DEFAULT_FRAGMENT, DEFAULT_VERTEX};

    #[test]
    fn program_behaviour_comes_from_shader_name() {
        let mut gpu = SoftGpu::new();
        let program = gpu
            .compile_program(DEFAULT_VERTEX, DEFAULT_FRAGMENT, &AttributeLayout::default())
            .unwrap();

        assert_eq!(gpu.effect(program), Some(ProgramEffect::Default));
        assert!(gpu.uniform_location(program, "projectionMatrix").is_some());
        assert!(gpu.uniform_location(program, "uSamplers").is_some());
        assert!(gpu.uniform_location(program, "aColor").is_none());
    }

    #[test]
    fn unknown_shader_name_fails_to_link() {
        let mut gpu = SoftGpu::new();
        let fragment = DEFAULT_FRAGMENT.replace("SHADER_NAME default", "SHADER_NAME sparkle");

        let err = gpu
            .compile_program(DEFAULT_VERTEX, &fragment, &AttributeLayout::default())
            .unwrap_err();

        assert!(matches!(err, ProgramError::Link(_)));
    }

    #[test]
    fn writes_to_a_program_not_in_use_are_dropped() {
        let mut gpu = SoftGpu::new();
        let layout = AttributeLayout::default();
        let first = gpu
            .compile_program(DEFAULT_VERTEX, DEFAULT_FRAGMENT, &layout)
            .unwrap();
        let second = gpu
            .compile_program(DEFAULT_VERTEX, DEFAULT_FRAGMENT, &layout)
            .unwrap();
        let location = gpu.uniform_location(first, "tint");

        gpu.use_program(second);
        gpu.set_uniform(location.as_ref(), &UniformValue::Vec4([0.0; 4]));

        assert_eq!(gpu.value(first, "tint"), None);
        assert_eq!(gpu.stray_writes, 1);
    }
}
