/// Platform lookup by configured name
use std::collections::HashMap;

use super::Platform;
use crate::{Error, Result};

/// Produces a fresh platform holding its default configuration
pub type PlatformFactory = fn() -> Box<dyn Platform>;

/// Mapping from platform name to factory.
///
/// Built once at startup and only read afterwards.
#[derive(Default)]
pub struct PlatformRegistry {
    factories: HashMap<&'static str, PlatformFactory>,
}

impl PlatformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every platform shipped in this crate
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register("aks", || Box::new(super::aks::Aks::default()));
        registry.register("hcloud", || Box::new(super::hcloud::Hcloud::default()));
        registry
    }

    /// Register a platform factory.
    ///
    /// # Panics
    ///
    /// Panics if `name` is already registered.
    pub fn register(&mut self, name: &'static str, factory: PlatformFactory) {
        if self.factories.insert(name, factory).is_some() {
            panic!("platform with name {:?} registered twice", name);
        }
    }

    pub fn get(&self, name: &str) -> Result<PlatformFactory> {
        self.factories
            .get(name)
            .copied()
            .ok_or_else(|| Error::UnknownPlatform {
                name: name.to_string(),
                known: self.names().into_iter().map(str::to_string).collect(),
            })
    }

    /// Fresh platform with default configuration
    pub fn create(&self, name: &str) -> Result<Box<dyn Platform>> {
        Ok((self.get(name)?)())
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.factories.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_platforms() {
        let registry = PlatformRegistry::builtin();
        assert_eq!(registry.names(), ["aks", "hcloud"]);
        assert_eq!(registry.create("aks").unwrap().name(), "aks");
        assert_eq!(registry.create("hcloud").unwrap().name(), "hcloud");
    }

    #[test]
    fn test_each_create_is_fresh() {
        let registry = PlatformRegistry::builtin();
        let a = registry.create("aks").unwrap();
        let b = registry.create("aks").unwrap();
        assert_eq!(a.meta(), b.meta());
        assert_eq!(a.meta().expected_nodes, 0);
    }

    #[test]
    fn test_unknown_platform_lists_known_names() {
        let registry = PlatformRegistry::builtin();
        match registry.get("gcp") {
            Err(Error::UnknownPlatform { name, known }) => {
                assert_eq!(name, "gcp");
                assert_eq!(known, ["aks", "hcloud"]);
            }
            Err(other) => panic!("unexpected error: {:?}", other),
            Ok(_) => panic!("gcp should not be registered"),
        }
    }

    #[test]
    #[should_panic(expected = "registered twice")]
    fn test_duplicate_registration_panics() {
        let mut registry = PlatformRegistry::builtin();
        registry.register("aks", || Box::new(crate::platform::aks::Aks::default()));
    }
}
