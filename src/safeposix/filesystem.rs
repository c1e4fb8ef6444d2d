// Path handler registry
//
// There is no directory tree: a path either names a registered handler
// exactly, or it does not exist.

use std::sync::Arc;

use crate::interface::{self, StatData};
use crate::safeposix::stream::{ResourceHandle, StreamResult};

/// A factory bound to one exact path.
pub trait PathHandler: Send + Sync {
    /// Instantiates a handle for descriptor `fd`. `None` means the backend
    /// refused, which the dispatcher reports as `EACCES`.
    fn open(&self, fd: i32, path: &str, flags: i32) -> Option<Arc<dyn ResourceHandle>>;

    fn stat(&self, path: &str) -> StreamResult<StatData>;
}

#[derive(Default)]
pub struct PathRegistry {
    handlers: interface::RustHashMap<String, Arc<dyn PathHandler>>,
}

impl PathRegistry {
    pub fn new() -> PathRegistry {
        PathRegistry { handlers: interface::RustHashMap::new() }
    }

    /// Registering the same path twice is a configuration bug and panics.
    pub fn register(&mut self, path: &str, handler: Arc<dyn PathHandler>) {
        assert!(!self.handlers.contains_key(path), "path handler for {} registered twice", path);
        log::debug!("registered path handler for {}", path);
        self.handlers.insert(path.to_string(), handler);
    }

    // exact match, no normalization of any kind
    pub fn resolve(&self, path: &str) -> Option<Arc<dyn PathHandler>> {
        self.handlers.get(path).cloned()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.handlers.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn clear(&mut self) {
        self.handlers.clear();
    }
}

#[cfg(test)]
mod registry_tests {
    use super::*;
    use crate::safeposix::devices::DevNullHandler;

    #[test]
    fn resolve_is_exact() {
        let mut registry = PathRegistry::new();
        registry.register("/dev/null", Arc::new(DevNullHandler));
        assert!(registry.resolve("/dev/null").is_some());
        assert!(registry.resolve("/dev/null/").is_none());
        assert!(registry.resolve("dev/null").is_none());
        assert!(registry.resolve("/dev/./null").is_none());
        assert!(registry.resolve("/dev").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    #[should_panic(expected = "registered twice")]
    fn duplicate_registration_panics() {
        let mut registry = PathRegistry::new();
        registry.register("/dev/null", Arc::new(DevNullHandler));
        registry.register("/dev/null", Arc::new(DevNullHandler));
    }
}
