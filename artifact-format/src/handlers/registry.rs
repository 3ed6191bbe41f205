//! The handler registry (spec.md §3.5, §4.5, §9): a `map<type_string, fn()
//! -> PayloadHandler>` the reader consults when instantiating one handler
//! per payload index off `header-info.payloads[*].type`. A `null` type
//! always resolves to `BootstrapArtifact`; an unregistered non-null type
//! falls back to `Generic` rather than aborting the read.

use std::collections::BTreeMap;

use super::{BootstrapArtifact, Error, Generic, Handler, Result};

type Constructor = Box<dyn Fn() -> Box<dyn Handler> + Send + Sync>;

pub struct HandlerRegistry {
    constructors: BTreeMap<String, Constructor>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        HandlerRegistry { constructors: BTreeMap::new() }
    }

    /// A registry with `"rootfs-image"` pre-registered for the given
    /// Artifact version (1, 2, or 3); callers add their own module-image
    /// type constructors on top of this.
    pub fn with_default_rootfs(version: u32) -> Self {
        let mut registry = HandlerRegistry::new();
        let ctor: Constructor = match version {
            1 => Box::new(|| Box::new(super::RootfsV1::default()) as Box<dyn Handler>),
            2 => Box::new(|| Box::new(super::RootfsV2::default()) as Box<dyn Handler>),
            _ => Box::new(|| Box::new(super::RootfsV3::default()) as Box<dyn Handler>),
        };
        registry.constructors.insert("rootfs-image".to_string(), ctor);
        registry
    }

    /// Registers a constructor for a non-`rootfs-image` payload type, e.g.
    /// a module-image flavor the caller wants deserialized into a typed
    /// `ModuleImage` rather than falling back to `Generic`. Duplicate
    /// registration for the same type string is a configuration error.
    pub fn register(&mut self, type_name: impl Into<String>, ctor: impl Fn() -> Box<dyn Handler> + Send + Sync + 'static) -> Result<()> {
        let type_name = type_name.into();
        if self.constructors.contains_key(&type_name) {
            return Err(Error::DuplicateHandlerType(type_name));
        }
        self.constructors.insert(type_name, Box::new(ctor));
        Ok(())
    }

    /// Instantiates the handler for one payload's declared type: `None`
    /// (bootstrap) always yields `BootstrapArtifact`; a registered type
    /// yields a fresh instance from its constructor; anything else yields
    /// `Generic`.
    pub fn instantiate(&self, type_name: Option<&str>) -> Box<dyn Handler> {
        match type_name {
            None => Box::new(BootstrapArtifact),
            Some(type_name) => match self.constructors.get(type_name) {
                Some(ctor) => ctor(),
                None => Box::new(Generic::new(type_name.to_string())),
            },
        }
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_type_instantiates_bootstrap() {
        let registry = HandlerRegistry::new();
        let handler = registry.instantiate(None);
        assert_eq!(handler.update_type(), None);
    }

    #[test]
    fn default_rootfs_registration_resolves_by_version() {
        let registry = HandlerRegistry::with_default_rootfs(3);
        let handler = registry.instantiate(Some("rootfs-image"));
        assert_eq!(handler.update_type(), Some("rootfs-image".to_string()));
    }

    #[test]
    fn unregistered_type_falls_back_to_generic() {
        let registry = HandlerRegistry::new();
        let handler = registry.instantiate(Some("unknown-module-type"));
        assert!(handler.accepts_unknown_data_files());
        assert_eq!(handler.update_type(), Some("unknown-module-type".to_string()));
    }

    #[test]
    fn duplicate_registration_is_an_error() {
        let mut registry = HandlerRegistry::new();
        registry.register("delta-image", || Box::new(super::super::ModuleImage::new("delta-image", Vec::new()).unwrap())).unwrap();
        let err = registry.register("delta-image", || Box::new(super::super::ModuleImage::new("delta-image", Vec::new()).unwrap())).unwrap_err();
        assert!(matches!(err, Error::DuplicateHandlerType(t) if t == "delta-image"));
    }
}
