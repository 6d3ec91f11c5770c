//! Engine runtime resolution
//!
//! Locates and loads the test engine module independent of the host
//! process's own library search path, and hands out releasable engine
//! sessions.

#![allow(dead_code)]

mod dylib;
mod paths;

pub use dylib::DylibEngineFactory;
pub use paths::{CandidateSet, ResolutionPaths, ENGINE_MODULE_BASENAME, RUNTIME_DIR_ENV};

use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::models::{PackageDescriptor, TestFilter};

/// Failure while resolving the engine runtime
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("cannot establish own module location")]
    AnchorUnavailable,

    #[error("engine module not found: {0}")]
    EngineModuleMissing(PathBuf),

    #[error("target assembly not found: {0}")]
    TargetMissing(PathBuf),

    #[error("not a loadable module: {0}")]
    InvalidModule(PathBuf),

    #[error("failed to load module {path}")]
    Load {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },

    #[error("engine entry symbol `{0}` missing")]
    EntrySymbol(String),

    #[error("engine module failed to initialize")]
    EngineInit,
}

/// Failure raised through the engine while discovering or running tests
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine session already released")]
    Released,

    #[error("engine symbol `{symbol}` unavailable")]
    Symbol {
        symbol: String,
        #[source]
        source: libloading::Error,
    },

    #[error("malformed engine payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("test engine failure: {0}")]
    Execution(String),
}

/// A live engine session driven through an [`EngineHandle`].
pub trait EngineSession {
    /// Discover tests in the packaged assembly without running them
    fn explore(
        &mut self,
        package: &PackageDescriptor,
        filter: &TestFilter,
    ) -> Result<String, EngineError>;

    /// Execute tests in the packaged assembly and collect outcomes
    fn run(
        &mut self,
        package: &PackageDescriptor,
        filter: &TestFilter,
    ) -> Result<String, EngineError>;

    /// Tear the session down; must be idempotent
    fn unload(&mut self);
}

/// Produces a usable engine instance for a target assembly.
///
/// The production implementation loads the engine module dynamically;
/// tests substitute scripted engines through this seam.
pub trait EngineFactory {
    fn resolve(&self, target: &Path) -> Result<EngineHandle, ResolveError>;
}

/// Opaque, releasable engine instance.
///
/// At most one handle is live per explore/run call. Release happens exactly
/// once: explicitly on the normal paths, through Drop on every other.
pub struct EngineHandle {
    session: Option<Box<dyn EngineSession>>,
}

impl EngineHandle {
    pub fn new(session: Box<dyn EngineSession>) -> Self {
        Self {
            session: Some(session),
        }
    }

    pub fn explore(
        &mut self,
        package: &PackageDescriptor,
        filter: &TestFilter,
    ) -> Result<String, EngineError> {
        self.session
            .as_mut()
            .ok_or(EngineError::Released)?
            .explore(package, filter)
    }

    pub fn run(
        &mut self,
        package: &PackageDescriptor,
        filter: &TestFilter,
    ) -> Result<String, EngineError> {
        self.session
            .as_mut()
            .ok_or(EngineError::Released)?
            .run(package, filter)
    }

    /// Unload the underlying session. Safe to call more than once.
    pub fn release(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.unload();
        }
    }

    pub fn is_released(&self) -> bool {
        self.session.is_none()
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingSession {
        unloads: Arc<AtomicUsize>,
    }

    impl EngineSession for CountingSession {
        fn explore(
            &mut self,
            _package: &PackageDescriptor,
            _filter: &TestFilter,
        ) -> Result<String, EngineError> {
            Ok("<test-run/>".to_string())
        }

        fn run(
            &mut self,
            _package: &PackageDescriptor,
            _filter: &TestFilter,
        ) -> Result<String, EngineError> {
            Ok("<test-run/>".to_string())
        }

        fn unload(&mut self) {
            self.unloads.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn handle(unloads: Arc<AtomicUsize>) -> EngineHandle {
        EngineHandle::new(Box::new(CountingSession { unloads }))
    }

    #[test]
    fn test_release_is_idempotent() {
        let unloads = Arc::new(AtomicUsize::new(0));
        let mut h = handle(unloads.clone());

        h.release();
        h.release();
        assert!(h.is_released());
        assert_eq!(unloads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_releases() {
        let unloads = Arc::new(AtomicUsize::new(0));
        {
            let _h = handle(unloads.clone());
        }
        assert_eq!(unloads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_explore_after_release_fails() {
        let unloads = Arc::new(AtomicUsize::new(0));
        let mut h = handle(unloads);
        h.release();

        let package = PackageDescriptor::new("/tmp/libsuite.so");
        let result = h.explore(&package, &TestFilter::all());
        assert!(matches!(result, Err(EngineError::Released)));
    }
}
