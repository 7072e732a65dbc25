//! Swaps a defect program in for the host's batch program around a single draw.
//!
//! The host addresses every uniform through its own location cache ([`ProgramBinding`]). While a
//! defect program is active those cached locations must point into the defect program, and they
//! must point back into the batch program the moment it is restored, or later unrelated draws will
//! write to stale locations. [`ShaderProgramSwapper::activate`] rewrites the cache and
//! [`ShaderProgramSwapper::deactivate`] undoes it from the saved [`RelocationRecord`].

use std::num::NonZeroUsize;
use std::sync::Arc;

use ahash::{HashMap, HashMapExt};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::bug::{BugClass, BugDescriptor};
use crate::gpu::{ProgramBackend, ProgramError, ProgramState, UniformKind, UniformValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwapperConfig {
    /// How many linked defect programs stay resident.
    pub program_cache_capacity: usize,
}

impl Default for SwapperConfig {
    fn default() -> Self {
        Self {
            program_cache_capacity: 8,
        }
    }
}

/// A host uniform's location before the swap.
#[derive(Debug, Clone, PartialEq)]
pub struct SavedUniform<L> {
    pub name: String,
    pub location: Option<L>,
    /// Value pushed onto the defect program, if one could be read.
    pub value: Option<UniformValue>,
}

/// Everything needed to restore the host after a swap.
pub struct RelocationRecord<B: ProgramBackend> {
    pub class: BugClass,
    pub original_program: B::Program,
    pub defect_program: B::Program,
    pub uniforms: Vec<SavedUniform<B::Location>>,
}

impl<B: ProgramBackend> std::fmt::Debug for RelocationRecord<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelocationRecord")
            .field("class", &self.class)
            .field("original_program", &self.original_program)
            .field("defect_program", &self.defect_program)
            .field("uniforms", &self.uniforms)
            .finish()
    }
}

struct CachedProgram<P> {
    descriptor: Arc<BugDescriptor>,
    program: P,
}

pub struct ShaderProgramSwapper<B: ProgramBackend> {
    programs: LruCache<BugClass, CachedProgram<B::Program>>,
    failed: HashMap<BugClass, Arc<BugDescriptor>>,
    active: Option<RelocationRecord<B>>,
}

impl<B: ProgramBackend> Default for ShaderProgramSwapper<B> {
    fn default() -> Self {
        Self::new(SwapperConfig::default())
    }
}

impl<B: ProgramBackend> ShaderProgramSwapper<B> {
    pub fn new(config: SwapperConfig) -> Self {
        let capacity = NonZeroUsize::new(config.program_cache_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            programs: LruCache::new(capacity),
            failed: HashMap::new(),
            active: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn active_record(&self) -> Option<&RelocationRecord<B>> {
        self.active.as_ref()
    }

    pub fn cached_programs(&self) -> usize {
        self.programs.len()
    }

    /// Makes the defect program for `descriptor` current and relocates the host's uniforms onto
    /// it.
    ///
    /// Calling this while a swap is active leaves everything untouched and returns
    /// [`ProgramError::AlreadyActive`].
    pub fn activate(
        &mut self,
        state: ProgramState<'_, B>,
        descriptor: &Arc<BugDescriptor>,
    ) -> Result<&RelocationRecord<B>, ProgramError> {
        if self.active.is_some() {
            warn!(bug = %descriptor.class, "defect program already active; ignoring activate");
            return Err(ProgramError::AlreadyActive);
        }

        let ProgramState { backend, binding } = state;
        let defect_program = self.program_for(backend, &binding.attributes, descriptor)?;
        let original_program = binding.program;

        backend.use_program(defect_program);
        let mut saved = Vec::with_capacity(binding.uniforms.len());
        for slot in binding.uniforms.iter_mut() {
            let value = match slot.kind {
                // Sampler arrays cannot be read back portably; the batch renderer always binds
                // units 0..n.
                UniformKind::SamplerArray(count) => Some(UniformValue::sampler_units(count)),
                kind => slot
                    .location
                    .as_ref()
                    .and_then(|location| backend.uniform_value(original_program, location, kind)),
            };

            let relocated = backend.uniform_location(defect_program, &slot.name);
            if relocated.is_none() {
                warn!(uniform = %slot.name, bug = %descriptor.class, "defect program lacks uniform");
            }
            if let Some(value) = &value {
                backend.set_uniform(relocated.as_ref(), value);
            }

            saved.push(SavedUniform {
                name: slot.name.clone(),
                location: std::mem::replace(&mut slot.location, relocated),
                value,
            });
        }
        binding.program = defect_program;

        debug!(bug = %descriptor.class, uniforms = saved.len(), "defect program active");
        Ok(&*self.active.insert(RelocationRecord {
            class: descriptor.class,
            original_program,
            defect_program,
            uniforms: saved,
        }))
    }

    /// Restores the host's program and every relocated uniform location.
    pub fn deactivate(
        &mut self,
        state: ProgramState<'_, B>,
    ) -> Result<RelocationRecord<B>, ProgramError> {
        let Some(record) = self.active.take() else {
            warn!("deactivate without an active defect program");
            return Err(ProgramError::NotActive);
        };

        let ProgramState { backend, binding } = state;
        for saved in &record.uniforms {
            match binding
                .uniforms
                .iter_mut()
                .find(|slot| slot.name == saved.name)
            {
                Some(slot) => slot.location = saved.location.clone(),
                None => warn!(uniform = %saved.name, "uniform vanished from host bookkeeping"),
            }
        }
        binding.program = record.original_program;
        backend.use_program(record.original_program);

        debug!(bug = %record.class, "defect program restored");
        Ok(record)
    }

    /// Releases every cached program. Must not be called mid-swap.
    pub fn clear(&mut self, backend: &mut B) {
        if self.active.is_some() {
            warn!("refusing to clear program cache during an active swap");
            return;
        }
        while let Some((_, cached)) = self.programs.pop_lru() {
            backend.delete_program(cached.program);
        }
        self.failed.clear();
    }

    fn program_for(
        &mut self,
        backend: &mut B,
        attributes: &crate::gpu::AttributeLayout,
        descriptor: &Arc<BugDescriptor>,
    ) -> Result<B::Program, ProgramError> {
        let class = descriptor.class;
        if let Some(failed) = self.failed.get(&class) {
            if Arc::ptr_eq(failed, descriptor) {
                return Err(ProgramError::PreviouslyFailed(class.to_string()));
            }
        }
        if let Some(cached) = self.programs.get(&class) {
            if Arc::ptr_eq(&cached.descriptor, descriptor) {
                return Ok(cached.program);
            }
        }

        let program = match backend.compile_program(
            &descriptor.vertex_source,
            &descriptor.fragment_source,
            attributes,
        ) {
            Ok(program) => program,
            Err(err) => {
                error!(bug = %class, %err, "defect program failed to build");
                self.failed.insert(class, descriptor.clone());
                return Err(err);
            }
        };
        self.failed.remove(&class);

        let cached = CachedProgram {
            descriptor: descriptor.clone(),
            program,
        };
        if let Some((_, evicted)) = self.programs.push(class, cached) {
            backend.delete_program(evicted.program);
        }
        debug!(bug = %class, "linked defect program");
        Ok(program)
    }
}
