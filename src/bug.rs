//! The closed set of defect classes and the programs that render them.
//!
//! Each class other than [`BugClass::None`] is bound to one vertex/fragment program pair. The
//! catalog never interprets shader text beyond checking that a vertex program declares the
//! attributes the host's geometry buffers feed, since a program that does not would link but draw
//! garbage from the shared buffers.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use ahash::{HashMap, HashMapExt};
use regex::Regex;
use tracing::debug;

use crate::error::{CatalogError, InjectionError};
use crate::gpu::AttributeLayout;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum BugClass {
    #[default]
    None,
    Appearance,
    Layout,
    Rendering,
    State,
}

impl BugClass {
    pub const ALL: [BugClass; 5] = [
        BugClass::None,
        BugClass::Appearance,
        BugClass::Layout,
        BugClass::Rendering,
        BugClass::State,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BugClass::None => "none",
            BugClass::Appearance => "appearance",
            BugClass::Layout => "layout",
            BugClass::Rendering => "rendering",
            BugClass::State => "state",
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, BugClass::None)
    }
}

impl fmt::Display for BugClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BugClass {
    type Err = InjectionError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        BugClass::ALL
            .into_iter()
            .find(|class| class.as_str() == name)
            .ok_or_else(|| InjectionError::UnknownBug(name.to_string()))
    }
}

/// A defect class together with the program pair that draws it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BugDescriptor {
    pub class: BugClass,
    pub vertex_source: String,
    pub fragment_source: String,
}

impl BugDescriptor {
    pub fn new(
        class: BugClass,
        vertex_source: impl Into<String>,
        fragment_source: impl Into<String>,
    ) -> Self {
        Self {
            class,
            vertex_source: vertex_source.into(),
            fragment_source: fragment_source.into(),
        }
    }
}

/// Maps defect classes to their programs.
///
/// Descriptors are handed out as `Arc`s. Replacing an entry produces a new `Arc`, which is how
/// the swapper notices that a cached (or previously failed) program is out of date.
#[derive(Debug, Clone)]
pub struct BugCatalog {
    attributes: AttributeLayout,
    entries: HashMap<BugClass, Arc<BugDescriptor>>,
}

impl Default for BugCatalog {
    fn default() -> Self {
        Self::new(AttributeLayout::batch_default())
    }
}

impl BugCatalog {
    /// An empty catalog that validates vertex programs against `attributes`.
    pub fn new(attributes: AttributeLayout) -> Self {
        Self {
            attributes,
            entries: HashMap::new(),
        }
    }

    /// Registers (or replaces) the program pair for `descriptor.class`.
    pub fn register(&mut self, descriptor: BugDescriptor) -> Result<(), CatalogError> {
        if descriptor.class.is_none() {
            return Err(CatalogError::ReservedClass);
        }
        if let Some(attribute) = missing_attribute(&descriptor.vertex_source, &self.attributes)? {
            return Err(CatalogError::MissingAttribute {
                class: descriptor.class,
                attribute,
            });
        }

        debug!(bug = %descriptor.class, "registered defect program");
        self.entries.insert(descriptor.class, Arc::new(descriptor));
        Ok(())
    }

    /// Builder form of [`register`](Self::register).
    pub fn with(mut self, descriptor: BugDescriptor) -> Result<Self, CatalogError> {
        self.register(descriptor)?;
        Ok(self)
    }

    /// The program pair for `class`. `None` never has one.
    pub fn descriptor(&self, class: BugClass) -> Option<Arc<BugDescriptor>> {
        self.entries.get(&class).cloned()
    }

    pub fn contains(&self, class: BugClass) -> bool {
        self.entries.contains_key(&class)
    }

    /// Registered classes in declaration order.
    pub fn classes(&self) -> Vec<BugClass> {
        BugClass::ALL
            .into_iter()
            .filter(|class| self.contains(*class))
            .collect()
    }

    pub fn attributes(&self) -> &AttributeLayout {
        &self.attributes
    }
}

/// Strips GLSL line (`//`) and block (`/* … */`) comments.
fn strip_comments(source: &str) -> Result<String, regex::Error> {
    let no_block = Regex::new(r"(?s)/\*.*?\*/")?.replace_all(source, "");
    Ok(Regex::new(r"//[^\n]*")?
        .replace_all(&no_block, "")
        .into_owned())
}

/// First attribute of `layout` the vertex program does not declare, if any.
///
/// Accepts both `attribute vec2 aName;` and `in vec2 aName;`, with an optional precision
/// qualifier or `layout(...)` prefix.
fn missing_attribute(
    vertex_source: &str,
    layout: &AttributeLayout,
) -> Result<Option<String>, regex::Error> {
    let stripped = strip_comments(vertex_source)?;
    for (name, _) in layout.iter() {
        let declaration = Regex::new(&format!(
            r"\b(?:attribute|in)\s+(?:(?:lowp|mediump|highp)\s+)?\w+\s+{}\s*;",
            regex::escape(name)
        ))?;
        if !declaration.is_match(&stripped) {
            return Ok(Some(name.to_string()));
        }
    }
    Ok(None)
}
