//! Explicit tag → constructor registry for fusers.
//!
//! Nothing is registered implicitly; a model builder creates a registry,
//! registers what it needs (or starts from [`FuserRegistry::with_builtins`]),
//! and builds fusers from their configs.

use crate::error::{Error, Result};
use crate::fusers::{ConvFuser, Fuser, FuserConfig};
use std::collections::BTreeMap;

pub type FuserBuilder = fn(&FuserConfig) -> Result<Box<dyn Fuser>>;

#[derive(Default)]
pub struct FuserRegistry {
    builders: BTreeMap<String, FuserBuilder>,
}

impl FuserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every fuser this crate ships.
    pub fn with_builtins() -> Result<Self> {
        let mut registry = Self::new();
        register_builtin_fusers(&mut registry)?;
        Ok(registry)
    }

    /// Registers `builder` under `tag`. A tag can only be registered once.
    pub fn register(&mut self, tag: impl Into<String>, builder: FuserBuilder) -> Result<()> {
        let tag = tag.into();
        if self.builders.contains_key(&tag) {
            return Err(Error::DuplicateFuser(tag));
        }
        tracing::debug!(tag = %tag, "registered fuser");
        self.builders.insert(tag, builder);
        Ok(())
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.builders.contains_key(tag)
    }

    /// Registered tags, sorted.
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.builders.keys().map(String::as_str)
    }

    /// Looks up `config.kind` and runs its constructor.
    pub fn build(&self, config: &FuserConfig) -> Result<Box<dyn Fuser>> {
        let builder = self
            .builders
            .get(&config.kind)
            .ok_or_else(|| Error::UnknownFuser(config.kind.clone()))?;
        builder(config)
    }
}

pub fn register_builtin_fusers(registry: &mut FuserRegistry) -> Result<()> {
    registry.register(ConvFuser::TYPE, ConvFuser::build)
}
