//! GPU program model shared by the host renderer and the shader swapper.
//!
//! The host renderer batches every node through one default program and keeps its own cache of
//! uniform locations for that program ([`ProgramBinding`]). Swapping a defect program in for a
//! single draw means rewriting that cache, so the model here is deliberately GL-shaped: programs
//! are linked with explicit attribute slots, uniforms are addressed by location, and values can be
//! read back from a program.

#[cfg(feature = "glow")]
mod glow_backend;

use std::fmt::Debug;
use std::hash::Hash;

use thiserror::Error;

/// Errors raised while building or swapping GPU programs.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProgramError {
    #[error("vertex shader failed to compile: {0}")]
    VertexCompile(String),
    #[error("fragment shader failed to compile: {0}")]
    FragmentCompile(String),
    #[error("program failed to link: {0}")]
    Link(String),
    #[error("backend could not create a program object: {0}")]
    Create(String),
    #[error("program for `{0}` failed to link earlier; not retrying")]
    PreviouslyFailed(String),
    #[error("a defect program is already active")]
    AlreadyActive,
    #[error("no defect program is active")]
    NotActive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformKind {
    Float,
    Vec2,
    Vec4,
    Mat3,
    Int,
    /// Array of sampler units. Values cannot be read back portably.
    SamplerArray(u8),
}

#[derive(Debug, Clone, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Vec2([f32; 2]),
    Vec4([f32; 4]),
    /// Column-major 3x3 matrix.
    Mat3([f32; 9]),
    Int(i32),
    IntArray(Vec<i32>),
}

impl UniformValue {
    /// Sampler units `0..count`, the binding the batch renderer always uses.
    pub fn sampler_units(count: u8) -> Self {
        UniformValue::IntArray((0..count as i32).collect())
    }

    pub fn kind(&self) -> UniformKind {
        match self {
            UniformValue::Float(_) => UniformKind::Float,
            UniformValue::Vec2(_) => UniformKind::Vec2,
            UniformValue::Vec4(_) => UniformKind::Vec4,
            UniformValue::Mat3(_) => UniformKind::Mat3,
            UniformValue::Int(_) => UniformKind::Int,
            UniformValue::IntArray(values) => {
                UniformKind::SamplerArray(values.len().min(u8::MAX as usize) as u8)
            }
        }
    }
}

/// Attribute-name to slot assignments a program must be linked with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeLayout {
    slots: Vec<(String, u32)>,
}

impl AttributeLayout {
    pub fn new<I, S>(slots: I) -> Self
    where
        I: IntoIterator<Item = (S, u32)>,
        S: Into<String>,
    {
        Self {
            slots: slots
                .into_iter()
                .map(|(name, slot)| (name.into(), slot))
                .collect(),
        }
    }

    /// The batch renderer's convention: position, texture coordinate, color and texture index.
    pub fn batch_default() -> Self {
        Self::new([
            ("aVertexPosition", 3),
            ("aTextureCoord", 1),
            ("aColor", 0),
            ("aTextureId", 2),
        ])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.slots.iter().map(|(name, slot)| (name.as_str(), *slot))
    }

    pub fn slot_of(&self, name: &str) -> Option<u32> {
        self.iter()
            .find(|(attribute, _)| *attribute == name)
            .map(|(_, slot)| slot)
    }
}

impl Default for AttributeLayout {
    fn default() -> Self {
        Self::batch_default()
    }
}

/// A GL-like context able to link programs and address their uniforms.
pub trait ProgramBackend {
    type Program: Copy + Eq + Hash + Debug;
    type Location: Clone + PartialEq + Debug;

    fn compile_program(
        &mut self,
        vertex_source: &str,
        fragment_source: &str,
        attributes: &AttributeLayout,
    ) -> Result<Self::Program, ProgramError>;

    fn delete_program(&mut self, program: Self::Program);

    fn use_program(&mut self, program: Self::Program);

    fn uniform_location(&mut self, program: Self::Program, name: &str) -> Option<Self::Location>;

    /// Reads the value currently stored in `program` at `location`.
    fn uniform_value(
        &mut self,
        program: Self::Program,
        location: &Self::Location,
        kind: UniformKind,
    ) -> Option<UniformValue>;

    /// Writes to the program in use. A missing location is a no-op, as in GL.
    fn set_uniform(&mut self, location: Option<&Self::Location>, value: &UniformValue);
}

/// One uniform the host's default program declares, with the location the host will use for it.
#[derive(Debug, Clone, PartialEq)]
pub struct UniformSlot<L> {
    pub name: String,
    pub kind: UniformKind,
    pub location: Option<L>,
}

/// The host renderer's bookkeeping for its batch program.
///
/// The host reads `program` when it binds for a batch flush and addresses uniforms through
/// `uniforms[..].location`. Both are rewritten while a defect program is active.
pub struct ProgramBinding<B: ProgramBackend> {
    pub program: B::Program,
    pub attributes: AttributeLayout,
    pub uniforms: Vec<UniformSlot<B::Location>>,
}

// Manual impls: the backend itself (a GL context) is neither `Clone` nor `PartialEq`.
impl<B: ProgramBackend> Clone for ProgramBinding<B> {
    fn clone(&self) -> Self {
        Self {
            program: self.program,
            attributes: self.attributes.clone(),
            uniforms: self.uniforms.clone(),
        }
    }
}

impl<B: ProgramBackend> PartialEq for ProgramBinding<B> {
    fn eq(&self, other: &Self) -> bool {
        self.program == other.program
            && self.attributes == other.attributes
            && self.uniforms == other.uniforms
    }
}

impl<B: ProgramBackend> Debug for ProgramBinding<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgramBinding")
            .field("program", &self.program)
            .field("attributes", &self.attributes)
            .field("uniforms", &self.uniforms)
            .finish()
    }
}

impl<B: ProgramBackend> ProgramBinding<B> {
    /// Builds the bookkeeping for `program`, looking up the location of every declared uniform.
    pub fn for_program(
        backend: &mut B,
        program: B::Program,
        attributes: AttributeLayout,
        declared: &[(&str, UniformKind)],
    ) -> Self {
        let uniforms = declared
            .iter()
            .map(|&(name, kind)| UniformSlot {
                name: name.to_string(),
                kind,
                location: backend.uniform_location(program, name),
            })
            .collect();

        Self {
            program,
            attributes,
            uniforms,
        }
    }

    pub fn uniform(&self, name: &str) -> Option<&UniformSlot<B::Location>> {
        self.uniforms.iter().find(|slot| slot.name == name)
    }

    pub fn location_of(&self, name: &str) -> Option<&B::Location> {
        self.uniform(name).and_then(|slot| slot.location.as_ref())
    }
}

/// Mutable view of the host's GPU context and its batch-program bookkeeping.
pub struct ProgramState<'a, B: ProgramBackend> {
    pub backend: &'a mut B,
    pub binding: &'a mut ProgramBinding<B>,
}
