//! Tag registry: the startup-loaded map of tag names to source addresses.
//!
//! The registry is populated once during startup and then shared read-only
//! (typically behind an `Arc`). There is deliberately no runtime mutation
//! API: tag topology changes are rare and must not race with live polling,
//! so adding a tag requires a restart.

use crate::model::Tag;
use std::collections::HashMap;
use thiserror::Error;

/// Errors raised by registry operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistryError {
    /// The named tag is not registered.
    #[error("unknown tag: {0}")]
    UnknownTag(String),

    /// A tag with the same name was already registered.
    #[error("duplicate tag: {0}")]
    DuplicateTag(String),
}

/// Immutable-after-load mapping from tag name to source address.
///
/// Iteration via [`TagRegistry::all`] preserves registration order, which
/// keeps poll rounds and snapshots deterministic.
#[derive(Debug, Clone, Default)]
pub struct TagRegistry {
    tags: Vec<Tag>,
    by_name: HashMap<String, usize>,
}

impl TagRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tag. Startup only; fails if the name is already taken.
    pub fn register(&mut self, tag: Tag) -> Result<(), RegistryError> {
        if self.by_name.contains_key(&tag.name) {
            return Err(RegistryError::DuplicateTag(tag.name));
        }
        self.by_name.insert(tag.name.clone(), self.tags.len());
        self.tags.push(tag);
        Ok(())
    }

    /// Build a registry from an iterator of tags.
    pub fn from_tags(tags: impl IntoIterator<Item = Tag>) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for tag in tags {
            registry.register(tag)?;
        }
        Ok(registry)
    }

    /// Resolve a tag name to its source address.
    pub fn resolve(&self, name: &str) -> Result<&str, RegistryError> {
        self.get(name)
            .map(|tag| tag.address.as_str())
            .ok_or_else(|| RegistryError::UnknownTag(name.to_string()))
    }

    /// Look up the full tag record by name.
    pub fn get(&self, name: &str) -> Option<&Tag> {
        self.by_name.get(name).map(|&idx| &self.tags[idx])
    }

    /// Whether a tag name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// All registered tags, in registration order.
    pub fn all(&self) -> &[Tag] {
        &self.tags
    }

    /// Number of registered tags.
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}
